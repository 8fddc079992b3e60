//! Row selection state over one matrix.
//!
//! A crossfilter is a set of named dimensions, each holding a predicate and
//! the row mask it produced. Selecting returns a new crossfilter. When the
//! matrix is replaced by a subset, clip or reset the crossfilter is built
//! again from scratch; only annotation edits, which keep every row in place,
//! carry dimensions over through [`Crossfilter::rebase`].

use crate::error::{AnnoError, Result};
use crate::matrix::AnnoMatrix;
use crate::types::{Column, ColumnValue, FastSet, Field, Label, Query, RowIndex, RowLabel};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

/// Predicate of one dimension. Multiple values or ranges are OR-ed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum Selection {
    All,
    None,
    Exact(Vec<ColumnValue>),
    /// Inclusive `[lo, hi]` ranges.
    Ranges(Vec<(f32, f32)>),
    Rows(Vec<RowLabel>),
    /// Complement of the inner selection.
    Not(Box<Selection>),
}

#[derive(Clone, Debug)]
struct Dimension {
    field: Field,
    columns: Vec<Label>,
    selection: Selection,
    mask: Arc<[bool]>,
}

#[derive(Clone, Debug)]
pub struct Crossfilter {
    matrix: Arc<AnnoMatrix>,
    dimensions: IndexMap<SmolStr, Dimension>,
}

impl Crossfilter {
    pub fn new(matrix: Arc<AnnoMatrix>) -> Self {
        Self {
            matrix,
            dimensions: IndexMap::new(),
        }
    }

    pub fn matrix(&self) -> &Arc<AnnoMatrix> {
        &self.matrix
    }

    /// Name under which a column query's dimension is stored.
    pub fn dimension_name(field: Field, query: &Query) -> SmolStr {
        SmolStr::new(format!("{field}/{query}"))
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.dimensions.keys()
    }

    pub fn selection(&self, name: &str) -> Option<&Selection> {
        self.dimensions.get(name).map(|d| &d.selection)
    }

    /// Select rows by the values of one obs or X column. Replaces any
    /// previous selection on the same dimension.
    pub async fn select(&self, field: Field, query: impl Into<Query>, selection: Selection) -> Result<Crossfilter> {
        let query = query.into();
        if field == Field::Var {
            return Err(AnnoError::invariant("var columns are not aligned to rows"));
        }
        let df = self.matrix.fetch(field, query.clone()).await?;
        let (label, column) = match (df.n_cols(), df.col_at(0)) {
            (1, Some(entry)) => entry,
            (n, _) => {
                return Err(AnnoError::invariant(format!(
                    "a dimension needs exactly one column, {query} selects {n}"
                )))
            }
        };
        let mask = mask_for(&selection, Some((label, column)), df.row_index())?;
        let name = Self::dimension_name(field, &query);
        debug!(dimension = %name, selected = count(&mask), "select");
        Ok(self.with_dimension(
            name,
            Dimension {
                field,
                columns: vec![label.clone()],
                selection,
                mask: mask.into(),
            },
        ))
    }

    /// Select rows directly by persistent label, as a brush or lasso does.
    /// Labels outside the matrix are ignored.
    pub fn select_rows(&self, name: &str, rows: Vec<RowLabel>) -> Result<Crossfilter> {
        let selection = Selection::Rows(rows);
        let mask = mask_for(&selection, None, self.matrix.row_index())?;
        Ok(self.with_dimension(
            SmolStr::new(name),
            Dimension {
                field: Field::Obs,
                columns: Vec::new(),
                selection,
                mask: mask.into(),
            },
        ))
    }

    /// Drop a dimension. Unknown names are a no-op.
    pub fn deselect(&self, name: &str) -> Crossfilter {
        let mut next = self.clone();
        next.dimensions.shift_remove(name);
        next
    }

    /// Complement one dimension. Its rows flip; the other dimensions still
    /// intersect as before. Inverting twice restores the original selection.
    pub fn invert(&self, name: &str) -> Result<Crossfilter> {
        let dim = self
            .dimensions
            .get(name)
            .ok_or_else(|| AnnoError::invariant(format!("no dimension named '{name}'")))?;
        let selection = match &dim.selection {
            Selection::Not(inner) => Selection::clone(inner),
            other => Selection::Not(Box::new(other.clone())),
        };
        let mask: Arc<[bool]> = dim.mask.iter().map(|on| !on).collect();
        debug!(dimension = %name, selected = count(&mask), "invert");
        Ok(self.with_dimension(
            SmolStr::new(name),
            Dimension {
                field: dim.field,
                columns: dim.columns.clone(),
                selection,
                mask,
            },
        ))
    }

    fn with_dimension(&self, name: SmolStr, dimension: Dimension) -> Crossfilter {
        let mut next = self.clone();
        next.dimensions.insert(name, dimension);
        next
    }

    /// One flag per row of the matrix: AND across dimensions.
    pub fn all_selected_mask(&self) -> Vec<bool> {
        let mut mask = vec![true; self.matrix.n_obs()];
        for dim in self.dimensions.values() {
            mask.iter_mut().zip(dim.mask.iter()).for_each(|(m, d)| *m &= *d);
        }
        mask
    }

    pub fn count_selected(&self) -> usize {
        count(&self.all_selected_mask())
    }

    /// Persistent labels of the selected rows, in row order.
    pub fn all_selected_labels(&self) -> Vec<RowLabel> {
        self.all_selected_mask()
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .filter_map(|(pos, _)| self.matrix.row_index().label_at(pos))
            .collect()
    }

    /// Move to a matrix produced by an annotation edit. Rows must be
    /// unchanged; dimensions over the `touched` obs columns are dropped.
    pub fn rebase(&self, matrix: Arc<AnnoMatrix>, touched: &[&str]) -> Result<Crossfilter> {
        if matrix.row_index() != self.matrix.row_index() {
            return Err(AnnoError::invariant("crossfilter rebase across different rows"));
        }
        let dimensions = self
            .dimensions
            .iter()
            .filter(|(_, d)| !(d.field == Field::Obs && d.columns.iter().any(|c| touched.contains(&c.as_str()))))
            .map(|(name, d)| (name.clone(), d.clone()))
            .collect();
        Ok(Crossfilter { matrix, dimensions })
    }
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|on| **on).count()
}

/// Row mask of `selection` over `column` (or over `rows` for row selections).
fn mask_for(selection: &Selection, column: Option<(&Label, &Column)>, rows: &RowIndex) -> Result<Vec<bool>> {
    let n = rows.len();
    let mask = match selection {
        Selection::All => vec![true; n],
        Selection::None => vec![false; n],
        Selection::Not(inner) => mask_for(inner, column, rows)?.into_iter().map(|on| !on).collect(),
        Selection::Rows(labels) => {
            let wanted: FastSet<RowLabel> = labels.iter().copied().collect();
            rows.iter().map(|label| wanted.contains(&label)).collect()
        }
        Selection::Exact(values) => {
            let (_, col) = column.ok_or_else(|| AnnoError::invariant("value selection without a column"))?;
            (0..n).map(|row| values.iter().any(|v| col.matches(row, v))).collect()
        }
        Selection::Ranges(ranges) => {
            let (label, col) = column.ok_or_else(|| AnnoError::invariant("range selection without a column"))?;
            let values = col.to_f32_vec().ok_or_else(|| AnnoError::TypeMismatch {
                column: label.clone(),
                expected: "float32".to_string(),
                got: col.dtype().to_string(),
            })?;
            values
                .iter()
                .map(|&x| ranges.iter().any(|&(lo, hi)| x >= lo && x <= hi))
                .collect()
        }
    };
    Ok(mask)
}
