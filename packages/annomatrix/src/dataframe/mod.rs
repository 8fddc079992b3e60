//! Immutable column store.
//!
//! A `DataFrame` is an ordered set of equal-length, uniquely labelled
//! columns plus the row index they are aligned to. Every operation returns a
//! new frame; untouched columns are shared, not copied.

mod summary;

pub use summary::{CategoricalSummary, ContinuousSummary, Summary};

use crate::error::{AnnoError, Result};
use crate::types::{Column, Label, RowIndex};
use indexmap::IndexMap;
use smol_str::SmolStr;

#[derive(Clone, Debug, PartialEq)]
pub struct DataFrame {
    row_index: RowIndex,
    columns: IndexMap<Label, Column>,
}

impl DataFrame {
    /// A frame with rows but no columns.
    pub fn empty(row_index: RowIndex) -> Self {
        Self {
            row_index,
            columns: IndexMap::new(),
        }
    }

    pub fn new<I, L>(row_index: RowIndex, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, Column)>,
        L: Into<Label>,
    {
        columns
            .into_iter()
            .try_fold(Self::empty(row_index), |df, (label, col)| df.add_col(label, col))
    }

    pub fn n_rows(&self) -> usize {
        self.row_index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn row_index(&self) -> &RowIndex {
        &self.row_index
    }

    pub fn labels(&self) -> Vec<Label> {
        self.columns.keys().cloned().collect()
    }

    pub fn has_col(&self, label: &str) -> bool {
        self.columns.contains_key(label)
    }

    pub fn col(&self, label: &str) -> Result<&Column> {
        self.columns.get(label).ok_or_else(|| AnnoError::UnknownColumn {
            field: None,
            column: SmolStr::new(label),
        })
    }

    pub fn col_at(&self, idx: usize) -> Option<(&Label, &Column)> {
        self.columns.get_index(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Column)> {
        self.columns.iter()
    }

    /// Cell lookup by row label.
    pub fn at(&self, row_label: u32, col: &str) -> Result<Option<crate::types::ColumnValue>> {
        let column = self.col(col)?;
        Ok(self.row_index.offset_of(row_label).and_then(|pos| column.get(pos)))
    }

    pub fn add_col(&self, label: impl Into<Label>, column: Column) -> Result<DataFrame> {
        let label = label.into();
        if self.columns.contains_key(&label) {
            return Err(AnnoError::DuplicateLabel(label));
        }
        self.check_len(&label, &column)?;
        let mut next = self.clone();
        next.columns.insert(label, column);
        Ok(next)
    }

    /// Replace the column if present, append it otherwise.
    pub fn with_col(&self, label: impl Into<Label>, column: Column) -> Result<DataFrame> {
        let label = label.into();
        self.check_len(&label, &column)?;
        let mut next = self.clone();
        next.columns.insert(label, column);
        Ok(next)
    }

    pub fn drop_col(&self, label: &str) -> Result<DataFrame> {
        if !self.has_col(label) {
            return Err(AnnoError::UnknownColumn {
                field: None,
                column: SmolStr::new(label),
            });
        }
        let mut next = self.clone();
        next.columns.shift_remove(label);
        Ok(next)
    }

    /// Like `drop_col`, but absent labels are not an error. Used to evict
    /// cached copies that may or may not be resident.
    pub fn without_col(&self, label: &str) -> DataFrame {
        let mut next = self.clone();
        next.columns.shift_remove(label);
        next
    }

    /// Rename in place, keeping the column's position.
    pub fn rename_col(&self, old: &str, new: impl Into<Label>) -> Result<DataFrame> {
        let new = new.into();
        if self.has_col(&new) {
            return Err(AnnoError::DuplicateLabel(new));
        }
        let idx = self.columns.get_index_of(old).ok_or_else(|| AnnoError::UnknownColumn {
            field: None,
            column: SmolStr::new(old),
        })?;
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (label, col))| {
                let label = if i == idx { new.clone() } else { label.clone() };
                (label, col.clone())
            })
            .collect();
        Ok(DataFrame {
            row_index: self.row_index.clone(),
            columns,
        })
    }

    /// Columns of `other` not already present here, appended. Frames must
    /// share a row count; the existing row index is kept.
    pub fn with_cols_from(&self, other: &DataFrame) -> Result<DataFrame> {
        if other.n_rows() != self.n_rows() {
            return Err(AnnoError::invariant(format!(
                "cannot merge {} rows into a frame of {}",
                other.n_rows(),
                self.n_rows()
            )));
        }
        let mut next = self.clone();
        for (label, col) in other.iter() {
            next.columns.entry(label.clone()).or_insert_with(|| col.clone());
        }
        Ok(next)
    }

    /// Only the named columns, in the given order.
    pub fn select(&self, labels: &[Label]) -> Result<DataFrame> {
        let columns = labels
            .iter()
            .map(|label| Ok((label.clone(), self.col(label)?.clone())))
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(DataFrame {
            row_index: self.row_index.clone(),
            columns,
        })
    }

    /// Same data, aligned to a different row index of the same length.
    pub fn with_row_index(&self, row_index: RowIndex) -> Result<DataFrame> {
        if row_index.len() != self.n_rows() {
            return Err(AnnoError::invariant(format!(
                "row index of length {} does not fit {} rows",
                row_index.len(),
                self.n_rows()
            )));
        }
        Ok(DataFrame {
            row_index,
            columns: self.columns.clone(),
        })
    }

    /// Rows whose labels appear in `target`, in `target` order.
    pub fn subset(&self, target: &RowIndex) -> Result<DataFrame> {
        let positions = self.row_index.positions_of(target)?;
        Ok(DataFrame {
            row_index: target.clone(),
            columns: self
                .columns
                .iter()
                .map(|(label, col)| (label.clone(), col.take(&positions)))
                .collect(),
        })
    }

    /// Replace every column with `f(label, column, index)`. Shape and labels
    /// are preserved; a column of the wrong length is an error.
    pub fn map_columns<F>(&self, f: F) -> Result<DataFrame>
    where
        F: Fn(&Label, &Column, usize) -> Result<Column> + Send + Sync,
    {
        let entries: Vec<(usize, (&Label, &Column))> = self.columns.iter().enumerate().collect();

        #[cfg(feature = "parallel")]
        let mapped: Result<Vec<(Label, Column)>> = {
            use rayon::prelude::*;
            entries
                .into_par_iter()
                .map(|(idx, (label, col))| Ok((label.clone(), f(label, col, idx)?)))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let mapped: Result<Vec<(Label, Column)>> = entries
            .into_iter()
            .map(|(idx, (label, col))| Ok((label.clone(), f(label, col, idx)?)))
            .collect();

        let mut columns = IndexMap::with_capacity(self.columns.len());
        for (label, col) in mapped? {
            self.check_len(&label, &col)?;
            columns.insert(label, col);
        }
        Ok(DataFrame {
            row_index: self.row_index.clone(),
            columns,
        })
    }

    pub fn summarize(&self, label: &str, categorical: bool) -> Result<Summary> {
        let col = self.col(label)?;
        Ok(Summary::of(col, categorical))
    }

    fn check_len(&self, label: &Label, column: &Column) -> Result<()> {
        if column.len() != self.n_rows() {
            return Err(AnnoError::invariant(format!(
                "column '{label}' has {} rows, frame has {}",
                column.len(),
                self.n_rows()
            )));
        }
        Ok(())
    }
}
