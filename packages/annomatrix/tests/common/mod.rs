//! Shared fixture for the annomatrix integration tests.
//!
//! Five cells and three genes. `age` is the continuous column the clip
//! tests use; `notes` is the only writable column.

#![allow(dead_code)]

use annomatrix::{x_label, AnnoMatrix, Column, DataFrame, MemorySource, RowIndex, Schema};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;

pub const AGES: [f32; 5] = [1.0, 5.0, 10.0, 50.0, 99.0];
pub const GENES: [&str; 3] = ["TP53", "BRCA1", "EGFR"];

pub fn schema() -> Schema {
    serde_json::from_value(json!({
        "dataframe": { "nObs": 5, "nVar": 3, "type": "float32" },
        "annotations": {
            "obs": {
                "index": "name_0",
                "columns": [
                    { "name": "name_0", "type": "string" },
                    { "name": "age", "type": "float32" },
                    { "name": "louvain", "type": "categorical", "categories": ["a", "b"] },
                    { "name": "notes", "type": "categorical", "categories": ["x", "y"], "writable": true }
                ]
            },
            "var": {
                "index": "gene_id",
                "columns": [
                    { "name": "gene_id", "type": "string" },
                    { "name": "n_counts", "type": "int32" }
                ]
            }
        }
    }))
    .expect("fixture schema")
}

pub fn source() -> MemorySource {
    let obs = DataFrame::new(
        RowIndex::identity(5),
        [
            ("name_0", Column::from(vec!["c0", "c1", "c2", "c3", "c4"])),
            ("age", Column::from(AGES.to_vec())),
            ("louvain", Column::from(vec!["a", "b", "a", "b", "a"])),
            ("notes", Column::from(vec!["x"; 5])),
        ],
    )
    .expect("obs");
    let var = DataFrame::new(
        RowIndex::identity(3),
        [
            ("gene_id", Column::from(GENES.to_vec())),
            // int on the wire, cast to the schema's int32
            ("n_counts", Column::from(vec![10.0f32, 20.0, 30.0])),
        ],
    )
    .expect("var");
    let x = DataFrame::new(
        RowIndex::identity(5),
        (0..3).map(|g| {
            let values: Vec<f32> = (0..5).map(|c| (g * 10 + c) as f32).collect();
            (x_label(g), Column::from(values))
        }),
    )
    .expect("X");
    MemorySource::new(obs, var, x)
}

/// A loader over the fixture dataset.
pub fn loader() -> (Arc<MemorySource>, Arc<AnnoMatrix>) {
    let source = Arc::new(source());
    let matrix = AnnoMatrix::loader(schema(), source.clone());
    (source, matrix)
}

/// A loader whose fetches wait for a permit on `gate`.
pub fn gated_loader(gate: Arc<Notify>) -> (Arc<MemorySource>, Arc<AnnoMatrix>) {
    let source = Arc::new(source().with_gate(gate));
    let matrix = AnnoMatrix::loader(schema(), source.clone());
    (source, matrix)
}

/// Float values of a single-column frame.
pub fn floats(df: &DataFrame, label: &str) -> Vec<f32> {
    df.col(label)
        .ok()
        .and_then(Column::to_f32_vec)
        .expect("numeric column")
}

pub fn strings(df: &DataFrame, label: &str) -> Vec<String> {
    let col = df.col(label).expect("column");
    (0..col.len())
        .filter_map(|row| col.get(row))
        .map(|v| v.to_string())
        .collect()
}
