// src/lib.rs

pub mod actions;
pub mod crossfilter;
pub mod dataframe;
pub mod error;
pub mod matrix;
pub mod schema;
pub mod source;
pub mod types;
pub mod where_cache;

// Re-export commonly used types for convenience
pub use actions::{clip_matrix, reset_subset_matrix, subset_matrix, Explorer, ExplorerDefaults, ExplorerEvent};
pub use crossfilter::{Crossfilter, Selection};
pub use dataframe::{DataFrame, Summary};
pub use error::{AnnoError, Result};
pub use matrix::{AnnoMatrix, ClipRange, MapFn, ViewKind};
pub use schema::{ColumnSchema, DType, Schema};
pub use source::{MemorySource, RemoteSource, Selector};
pub use types::{x_label, Column, ColumnValue, FastMap, Field, Label, Query, RowIndex, RowLabel, WhereQuery};
pub use where_cache::WhereCache;
