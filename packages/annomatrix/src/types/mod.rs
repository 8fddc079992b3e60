mod column;
mod query;
mod row_index;

pub use column::{Column, ColumnValue};
pub use query::{Query, WhereQuery};
pub use row_index::RowIndex;

use crate::error::AnnoError;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::str::FromStr;

pub type FastMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FastSet<K> = std::collections::HashSet<K, BuildHasherDefault<FxHasher>>;

/// Column label within a field's store.
///
/// `X` columns are labelled by the decimal var offset of the gene they hold.
pub type Label = SmolStr;

/// Persistent row identity. Equal to the row's offset in the full dataset.
pub type RowLabel = u32;

/// The three fields of an annotated matrix.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    #[serde(rename = "obs")]
    Obs,
    #[serde(rename = "var")]
    Var,
    #[serde(rename = "X")]
    X,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Obs => "obs",
            Field::Var => "var",
            Field::X => "X",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = AnnoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "obs" => Ok(Field::Obs),
            "var" => Ok(Field::Var),
            "X" => Ok(Field::X),
            other => Err(AnnoError::UnknownField(SmolStr::new(other))),
        }
    }
}

/// Label of the `X` column holding the gene at `var_offset`.
#[inline]
pub fn x_label(var_offset: usize) -> Label {
    SmolStr::new(var_offset.to_string())
}
