use crate::error::{AnnoError, Result};
use crate::schema::DType;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;

/// A single cell value, used for categories, fills and selections.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum ColumnValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(SmolStr),
}

impl ColumnValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Int(i) => Some(*i as f64),
            ColumnValue::Float(f) => Some(*f as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ColumnValue::Bool(_) => "boolean",
            ColumnValue::Int(_) => "int32",
            ColumnValue::Float(_) => "float32",
            ColumnValue::Str(_) => "string",
        }
    }
}

// Numbers compare by value across Int/Float; NaN equals nothing.
impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ColumnValue::Bool(a), ColumnValue::Bool(b)) => a == b,
            (ColumnValue::Str(a), ColumnValue::Str(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Bool(b) => write!(f, "{b}"),
            ColumnValue::Int(i) => write!(f, "{i}"),
            ColumnValue::Float(x) => write!(f, "{x}"),
            ColumnValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::Str(SmolStr::new(s))
    }
}

impl From<f32> for ColumnValue {
    fn from(x: f32) -> Self {
        ColumnValue::Float(x)
    }
}

impl From<i32> for ColumnValue {
    fn from(i: i32) -> Self {
        ColumnValue::Int(i)
    }
}

impl From<bool> for ColumnValue {
    fn from(b: bool) -> Self {
        ColumnValue::Bool(b)
    }
}

/// Typed, immutable column data. Cloning shares the buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Float32(Arc<[f32]>),
    Int32(Arc<[i32]>),
    Bool(Arc<[bool]>),
    Str(Arc<[SmolStr]>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float32(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage type. Categorical is a schema notion and never reported here.
    pub fn dtype(&self) -> DType {
        match self {
            Column::Float32(_) => DType::Float32,
            Column::Int32(_) => DType::Int32,
            Column::Bool(_) => DType::Boolean,
            Column::Str(_) => DType::String,
        }
    }

    pub fn get(&self, row: usize) -> Option<ColumnValue> {
        match self {
            Column::Float32(v) => v.get(row).map(|x| ColumnValue::Float(*x)),
            Column::Int32(v) => v.get(row).map(|x| ColumnValue::Int(*x)),
            Column::Bool(v) => v.get(row).map(|x| ColumnValue::Bool(*x)),
            Column::Str(v) => v.get(row).map(|x| ColumnValue::Str(x.clone())),
        }
    }

    /// Whether the value at `row` equals `value`.
    pub fn matches(&self, row: usize, value: &ColumnValue) -> bool {
        match (self, value) {
            (Column::Str(v), ColumnValue::Str(s)) => v.get(row) == Some(s),
            (Column::Bool(v), ColumnValue::Bool(b)) => v.get(row) == Some(b),
            _ => self.get(row).is_some_and(|x| &x == value),
        }
    }

    /// Numeric view of the column, `None` for bool and string columns.
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        match self {
            Column::Float32(v) => Some(v.to_vec()),
            Column::Int32(v) => Some(v.iter().map(|x| *x as f32).collect()),
            _ => None,
        }
    }

    /// Rows at `positions`, in that order.
    pub fn take(&self, positions: &[usize]) -> Column {
        match self {
            Column::Float32(v) => Column::Float32(positions.iter().map(|&i| v[i]).collect()),
            Column::Int32(v) => Column::Int32(positions.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(positions.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(positions.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// A column of `len` copies of `value`, stored as `dtype` requires.
    pub fn filled(label: &str, dtype: DType, value: &ColumnValue, len: usize) -> Result<Column> {
        let mismatch = || AnnoError::TypeMismatch {
            column: SmolStr::new(label),
            expected: dtype.to_string(),
            got: value.kind().to_string(),
        };
        let col = match (dtype, value) {
            (DType::Float32, v) => Column::Float32(vec![v.as_f64().ok_or_else(mismatch)? as f32; len].into()),
            (DType::Int32, ColumnValue::Int(i)) => Column::Int32(vec![*i; len].into()),
            (DType::Boolean, ColumnValue::Bool(b)) => Column::Bool(vec![*b; len].into()),
            (DType::String, ColumnValue::Str(s)) => Column::Str(vec![s.clone(); len].into()),
            (DType::Categorical, ColumnValue::Str(s)) => Column::Str(vec![s.clone(); len].into()),
            (DType::Categorical, ColumnValue::Int(i)) => Column::Int32(vec![*i; len].into()),
            (DType::Categorical, ColumnValue::Bool(b)) => Column::Bool(vec![*b; len].into()),
            _ => return Err(mismatch()),
        };
        Ok(col)
    }

    /// Copy of the column with the rows at `positions` set to `value`.
    pub fn with_values_at(&self, label: &str, positions: &[usize], value: &ColumnValue) -> Result<Column> {
        let mismatch = || AnnoError::TypeMismatch {
            column: SmolStr::new(label),
            expected: self.dtype().to_string(),
            got: value.kind().to_string(),
        };
        let col = match (self, value) {
            (Column::Float32(v), val) => {
                let x = val.as_f64().ok_or_else(mismatch)? as f32;
                let mut out = v.to_vec();
                positions.iter().for_each(|&i| out[i] = x);
                Column::Float32(out.into())
            }
            (Column::Int32(v), ColumnValue::Int(x)) => {
                let mut out = v.to_vec();
                positions.iter().for_each(|&i| out[i] = *x);
                Column::Int32(out.into())
            }
            (Column::Bool(v), ColumnValue::Bool(x)) => {
                let mut out = v.to_vec();
                positions.iter().for_each(|&i| out[i] = *x);
                Column::Bool(out.into())
            }
            (Column::Str(v), ColumnValue::Str(x)) => {
                let mut out = v.to_vec();
                positions.iter().for_each(|&i| out[i] = x.clone());
                Column::Str(out.into())
            }
            _ => return Err(mismatch()),
        };
        Ok(col)
    }

    /// Copy of the column with every `old` replaced by `new`.
    pub fn replace_value(&self, label: &str, old: &ColumnValue, new: &ColumnValue) -> Result<Column> {
        let positions: Vec<usize> = (0..self.len()).filter(|&i| self.matches(i, old)).collect();
        if positions.is_empty() {
            return Ok(self.clone());
        }
        self.with_values_at(label, &positions, new)
    }

    /// Convert the storage to what `dtype` expects. Only numeric widening
    /// and narrowing is supported; categorical accepts any storage.
    pub fn cast(&self, label: &str, dtype: DType) -> Result<Column> {
        match (self, dtype) {
            (_, DType::Categorical) => Ok(self.clone()),
            (c, d) if c.dtype() == d => Ok(self.clone()),
            (Column::Int32(v), DType::Float32) => {
                Ok(Column::Float32(v.iter().map(|x| *x as f32).collect()))
            }
            (Column::Float32(v), DType::Int32) if v.iter().all(|x| x.fract() == 0.0) => {
                Ok(Column::Int32(v.iter().map(|x| *x as i32).collect()))
            }
            _ => Err(AnnoError::TypeMismatch {
                column: SmolStr::new(label),
                expected: dtype.to_string(),
                got: self.dtype().to_string(),
            }),
        }
    }
}

impl From<Vec<f32>> for Column {
    fn from(v: Vec<f32>) -> Self {
        Column::Float32(v.into())
    }
}

impl From<Vec<i32>> for Column {
    fn from(v: Vec<i32>) -> Self {
        Column::Int32(v.into())
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Column::Bool(v.into())
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Str(v.into_iter().map(SmolStr::new).collect())
    }
}

#[cfg(test)]
mod column_test {
    use super::*;

    #[test]
    fn test_value_numeric_equality() {
        assert_eq!(ColumnValue::Int(3), ColumnValue::Float(3.0));
        assert_ne!(ColumnValue::Float(f32::NAN), ColumnValue::Float(f32::NAN));
        assert_ne!(ColumnValue::from("3"), ColumnValue::Int(3));
    }

    #[test]
    fn test_take_preserves_order() {
        let col = Column::from(vec!["a", "b", "c", "d"]);
        assert_eq!(col.take(&[3, 0]), Column::from(vec!["d", "a"]));
    }

    #[test]
    fn test_filled_rejects_wrong_kind() {
        let err = Column::filled("flag", DType::Boolean, &ColumnValue::from("yes"), 2).unwrap_err();
        assert!(matches!(err, AnnoError::TypeMismatch { .. }));
        let ok = Column::filled("score", DType::Float32, &ColumnValue::Int(2), 2).unwrap();
        assert_eq!(ok, Column::from(vec![2.0f32, 2.0]));
    }

    #[test]
    fn test_replace_value() {
        let col = Column::from(vec!["x", "y", "x"]);
        let out = col
            .replace_value("c", &ColumnValue::from("x"), &ColumnValue::from("z"))
            .unwrap();
        assert_eq!(out, Column::from(vec!["z", "y", "z"]));
    }

    #[test]
    fn test_cast_int_to_float() {
        let col = Column::from(vec![1i32, 2]);
        assert_eq!(col.cast("n", DType::Float32).unwrap(), Column::from(vec![1.0f32, 2.0]));
        assert!(Column::from(vec![true]).cast("b", DType::Float32).is_err());
    }
}
