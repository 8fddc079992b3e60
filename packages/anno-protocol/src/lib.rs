//! Wire types shared between the explorer client and the matrix server.
//!
//! Column data travels as JSON. Float columns use `null` for non-finite
//! values because JSON has no NaN.

use serde::{Deserialize, Serialize};

/// Which columns of a field a fetch asks for.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColumnSelector {
    All,
    Labels {
        labels: Vec<String>,
    },
    /// Columns of `X` selected by a predicate on an annotation column,
    /// e.g. `var.gene_id == "TP53"`.
    Where {
        field: String,
        column: String,
        value: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum WireData {
    Float32(Vec<Option<f32>>),
    Int32(Vec<i32>),
    Boolean(Vec<bool>),
    String(Vec<String>),
}

impl WireData {
    pub fn len(&self) -> usize {
        match self {
            WireData::Float32(v) => v.len(),
            WireData::Int32(v) => v.len(),
            WireData::Boolean(v) => v.len(),
            WireData::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WireColumn {
    pub label: String,
    pub data: WireData,
}

/// Response body of every column fetch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ColumnBatch {
    #[serde(rename = "nRows")]
    pub n_rows: usize,
    pub columns: Vec<WireColumn>,
}

/// Display parameters published by the server's `config` endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ServerParameters {
    #[serde(default, rename = "max-category-items")]
    pub max_category_items: Option<usize>,
    #[serde(default, rename = "clip-quantiles")]
    pub clip_quantiles: Option<[f64; 2]>,
    #[serde(default, rename = "dataset-title")]
    pub dataset_title: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub parameters: ServerParameters,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConfigResponse {
    pub config: ServerConfig,
}
