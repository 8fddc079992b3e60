//! Dataset schema as published by the server at bootstrap.
//!
//! Schemas are immutable; every mutation returns a new value and the old one
//! keeps serving the matrices that still reference it.

use crate::error::{AnnoError, Result};
use crate::types::{ColumnValue, Field, Label};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Categorical,
    Float32,
    Int32,
    Boolean,
    String,
}

impl DType {
    /// Numeric, non-categorical data. Only these columns are clipped or
    /// range-selected.
    pub fn is_continuous(&self) -> bool {
        matches!(self, DType::Float32 | DType::Int32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Categorical => "categorical",
            DType::Float32 => "float32",
            DType::Int32 => "int32",
            DType::Boolean => "boolean",
            DType::String => "string",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub name: Label,
    #[serde(rename = "type")]
    pub dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<ColumnValue>>,
    #[serde(default)]
    pub writable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<Label>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            categories: None,
            writable: false,
        }
    }

    /// A user-editable categorical column, the shape created by annotation actions.
    pub fn writable_categorical(name: impl Into<Label>, categories: Vec<ColumnValue>) -> Self {
        Self {
            name: name.into(),
            dtype: DType::Categorical,
            categories: Some(categories),
            writable: true,
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.dtype.is_continuous()
    }

    pub fn has_category(&self, value: &ColumnValue) -> bool {
        self.categories
            .as_ref()
            .is_some_and(|cats| cats.iter().any(|c| c == value))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnnotationSchema {
    pub index: Label,
    pub columns: Vec<ColumnSchema>,
}

impl AnnotationSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut ColumnSchema> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn labels(&self) -> Vec<Label> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Annotations {
    pub obs: AnnotationSchema,
    pub var: AnnotationSchema,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DataFrameSchema {
    #[serde(rename = "nObs")]
    pub n_obs: usize,
    #[serde(rename = "nVar")]
    pub n_var: usize,
    #[serde(rename = "type")]
    pub dtype: DType,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Schema {
    pub dataframe: DataFrameSchema,
    pub annotations: Annotations,
}

impl Schema {
    pub fn annotations(&self, field: Field) -> Result<&AnnotationSchema> {
        match field {
            Field::Obs => Ok(&self.annotations.obs),
            Field::Var => Ok(&self.annotations.var),
            // X is a dense matrix without annotation columns
            Field::X => Err(AnnoError::UnknownField(SmolStr::new_static("X"))),
        }
    }

    /// Schema of a column in any field. `X` columns are synthesized from the
    /// matrix value type, and must name a valid var offset.
    pub fn column_schema(&self, field: Field, label: &str) -> Option<ColumnSchema> {
        match field {
            Field::Obs => self.annotations.obs.column(label).cloned(),
            Field::Var => self.annotations.var.column(label).cloned(),
            Field::X => label
                .parse::<usize>()
                .ok()
                .filter(|&offset| offset < self.dataframe.n_var)
                .map(|_| ColumnSchema::new(label, self.dataframe.dtype)),
        }
    }

    pub fn has_column(&self, field: Field, label: &str) -> bool {
        self.column_schema(field, label).is_some()
    }

    /// The named obs column, if it exists and is writable.
    pub fn writable_obs_column(&self, name: &str) -> Result<&ColumnSchema> {
        let col = self
            .annotations
            .obs
            .column(name)
            .ok_or_else(|| AnnoError::unknown_column(Field::Obs, name))?;
        if !col.writable {
            return Err(AnnoError::ReadOnlyColumn(col.name.clone()));
        }
        Ok(col)
    }

    pub fn with_obs_column(&self, col: ColumnSchema) -> Result<Schema> {
        if self.annotations.obs.column(&col.name).is_some() {
            return Err(AnnoError::DuplicateLabel(col.name));
        }
        let mut next = self.clone();
        next.annotations.obs.columns.push(col);
        Ok(next)
    }

    pub fn without_obs_column(&self, name: &str) -> Result<Schema> {
        self.writable_obs_column(name)?;
        let mut next = self.clone();
        next.annotations.obs.columns.retain(|c| c.name != name);
        Ok(next)
    }

    pub fn with_renamed_obs_column(&self, old: &str, new: &str) -> Result<Schema> {
        self.writable_obs_column(old)?;
        if self.annotations.obs.column(new).is_some() {
            return Err(AnnoError::DuplicateLabel(SmolStr::new(new)));
        }
        let mut next = self.clone();
        if let Some(col) = next.annotations.obs.column_mut(old) {
            col.name = SmolStr::new(new);
        }
        Ok(next)
    }

    /// Append `category` to a writable categorical column. Errors if present.
    pub fn with_category(&self, name: &str, category: &ColumnValue) -> Result<Schema> {
        let col = self.writable_obs_column(name)?;
        if col.has_category(category) {
            return Err(AnnoError::DuplicateLabel(SmolStr::new(category.to_string())));
        }
        Ok(self.ensure_category(name, category))
    }

    /// Append `category` unless it is already present.
    pub(crate) fn ensure_category(&self, name: &str, category: &ColumnValue) -> Schema {
        let mut next = self.clone();
        if let Some(col) = next.annotations.obs.column_mut(name) {
            let cats = col.categories.get_or_insert_with(Vec::new);
            if !cats.iter().any(|c| c == category) {
                cats.push(category.clone());
            }
        }
        next
    }

    pub fn without_category(&self, name: &str, category: &ColumnValue) -> Result<Schema> {
        let col = self.writable_obs_column(name)?;
        if !col.has_category(category) {
            return Err(AnnoError::UnknownCategory {
                column: col.name.clone(),
                category: SmolStr::new(category.to_string()),
            });
        }
        let mut next = self.clone();
        if let Some(cats) = next
            .annotations
            .obs
            .column_mut(name)
            .and_then(|c| c.categories.as_mut())
        {
            cats.retain(|c| c != category);
        }
        Ok(next)
    }
}
