//! The obs mutation family. Every edit returns a new matrix; the receiver is
//! left untouched.
//!
//! The loader applies an edit to its schema and resident store. A view hands
//! the edit to its parent and rebuilds itself over the result, dropping its
//! own cached copies of the columns the edit touched.

use super::{AnnoMatrix, Resident, ViewKind};
use crate::error::{AnnoError, Result};
use crate::schema::{ColumnSchema, DType, Schema};
use crate::types::{Column, ColumnValue, Field, Label, Query, RowLabel};
use futures::future::{BoxFuture, FutureExt};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug)]
enum ObsEdit {
    AddCategory {
        column: Label,
        category: ColumnValue,
    },
    RemoveCategory {
        column: Label,
        category: ColumnValue,
        unassigned: ColumnValue,
    },
    AddColumn {
        schema: ColumnSchema,
        initial: ColumnValue,
    },
    DropColumn {
        column: Label,
    },
    RenameColumn {
        old: Label,
        new: Label,
    },
    SetValues {
        column: Label,
        rows: Vec<RowLabel>,
        value: ColumnValue,
    },
    ResetValues {
        column: Label,
        old: ColumnValue,
        new: ColumnValue,
    },
}

impl ObsEdit {
    fn name(&self) -> &'static str {
        match self {
            ObsEdit::AddCategory { .. } => "add-category",
            ObsEdit::RemoveCategory { .. } => "remove-category",
            ObsEdit::AddColumn { .. } => "add-column",
            ObsEdit::DropColumn { .. } => "drop-column",
            ObsEdit::RenameColumn { .. } => "rename-column",
            ObsEdit::SetValues { .. } => "set-values",
            ObsEdit::ResetValues { .. } => "reset-values",
        }
    }

    /// Obs columns whose cached data no longer matches after the edit.
    fn stale_columns(&self) -> Vec<&str> {
        match self {
            ObsEdit::AddCategory { .. } | ObsEdit::AddColumn { .. } => Vec::new(),
            ObsEdit::RenameColumn { old, new } => vec![old.as_str(), new.as_str()],
            ObsEdit::RemoveCategory { column, .. }
            | ObsEdit::DropColumn { column }
            | ObsEdit::SetValues { column, .. }
            | ObsEdit::ResetValues { column, .. } => vec![column.as_str()],
        }
    }
}

impl AnnoMatrix {
    /// Add `category` to a writable categorical obs column.
    pub fn add_obs_anno_category(self: &Arc<Self>, column: &str, category: impl Into<ColumnValue>) -> Result<Arc<Self>> {
        self.edit(&ObsEdit::AddCategory {
            column: SmolStr::new(column),
            category: category.into(),
        })
    }

    /// Remove `category` from a writable obs column, moving its rows to
    /// `unassigned`.
    pub fn remove_obs_anno_category(
        self: &Arc<Self>,
        column: &str,
        category: impl Into<ColumnValue>,
        unassigned: impl Into<ColumnValue>,
    ) -> BoxFuture<'static, Result<Arc<Self>>> {
        self.edit_loaded(ObsEdit::RemoveCategory {
            column: SmolStr::new(column),
            category: category.into(),
            unassigned: unassigned.into(),
        })
    }

    /// Add an obs column with every row set to `initial`.
    pub fn add_obs_column(self: &Arc<Self>, schema: ColumnSchema, initial: impl Into<ColumnValue>) -> Result<Arc<Self>> {
        self.edit(&ObsEdit::AddColumn {
            schema,
            initial: initial.into(),
        })
    }

    pub fn drop_obs_column(self: &Arc<Self>, column: &str) -> Result<Arc<Self>> {
        self.edit(&ObsEdit::DropColumn {
            column: SmolStr::new(column),
        })
    }

    pub fn rename_obs_column(self: &Arc<Self>, old: &str, new: &str) -> BoxFuture<'static, Result<Arc<Self>>> {
        self.edit_loaded(ObsEdit::RenameColumn {
            old: SmolStr::new(old),
            new: SmolStr::new(new),
        })
    }

    /// Set the rows with the given persistent labels to `value`.
    pub fn set_obs_column_values(
        self: &Arc<Self>,
        column: &str,
        rows: Vec<RowLabel>,
        value: impl Into<ColumnValue>,
    ) -> BoxFuture<'static, Result<Arc<Self>>> {
        self.edit_loaded(ObsEdit::SetValues {
            column: SmolStr::new(column),
            rows,
            value: value.into(),
        })
    }

    /// Replace every `old` in the column with `new`.
    pub fn reset_obs_column_values(
        self: &Arc<Self>,
        column: &str,
        old: impl Into<ColumnValue>,
        new: impl Into<ColumnValue>,
    ) -> BoxFuture<'static, Result<Arc<Self>>> {
        self.edit_loaded(ObsEdit::ResetValues {
            column: SmolStr::new(column),
            old: old.into(),
            new: new.into(),
        })
    }

    /// Edits that rewrite or relabel column data need the column resident
    /// at the loader, since the remote only knows the original.
    fn edit_loaded(self: &Arc<Self>, edit: ObsEdit) -> BoxFuture<'static, Result<Arc<Self>>> {
        let this = Arc::clone(self);
        async move {
            let column = match &edit {
                ObsEdit::RemoveCategory { column, .. }
                | ObsEdit::SetValues { column, .. }
                | ObsEdit::ResetValues { column, .. }
                | ObsEdit::RenameColumn { old: column, .. } => column.clone(),
                _ => return this.edit(&edit),
            };
            this.schema.writable_obs_column(&column)?;
            this.root().fetch(Field::Obs, Query::column(column)).await?;
            this.edit(&edit)
        }
        .boxed()
    }

    fn edit(self: &Arc<Self>, edit: &ObsEdit) -> Result<Arc<Self>> {
        let next = match (&self.kind, self.view_of()) {
            (ViewKind::Loader { .. }, _) | (_, None) => self.edit_local(edit)?,
            (_, Some(parent)) => {
                let parent = parent.edit(edit)?;
                self.rebase(parent, &edit.stale_columns())
            }
        };
        info!(matrix = self.id, next = next.id, edit = edit.name(), "obs edit applied");
        Ok(next)
    }

    fn root(self: &Arc<Self>) -> Arc<Self> {
        let mut node = self;
        while let Some(parent) = node.view_of() {
            node = parent;
        }
        Arc::clone(node)
    }

    /// This view over `parent`, with the stale obs columns evicted.
    fn rebase(&self, parent: Arc<Self>, stale: &[&str]) -> Arc<Self> {
        let resident = self.resident_snapshot().without_obs_columns(stale);
        Self::build(
            Arc::clone(&parent.schema),
            self.n_var,
            self.row_index.clone(),
            self.kind.with_parent(parent),
            Some(resident),
        )
    }

    fn edit_local(&self, edit: &ObsEdit) -> Result<Arc<Self>> {
        let mut resident = self.resident_snapshot();
        let schema = match edit {
            ObsEdit::AddCategory { column, category } => self.schema.with_category(column, category)?,
            ObsEdit::RemoveCategory {
                column,
                category,
                unassigned,
            } => {
                let schema = self
                    .schema
                    .without_category(column, category)?
                    .ensure_category(column, unassigned);
                let data = resident_obs(&resident, column)?.replace_value(column, category, unassigned)?;
                resident.obs = resident.obs.with_col(column.clone(), data)?;
                schema
            }
            ObsEdit::AddColumn { schema: col, initial } => {
                let mut schema = self.schema.with_obs_column(col.clone())?;
                if col.dtype == DType::Categorical {
                    schema = schema.ensure_category(&col.name, initial);
                }
                let data = Column::filled(&col.name, col.dtype, initial, self.n_obs)?;
                resident.obs = resident.obs.add_col(col.name.clone(), data)?;
                schema
            }
            ObsEdit::DropColumn { column } => {
                let schema = self.schema.without_obs_column(column)?;
                resident = resident.without_obs_columns(&[column.as_str()]);
                schema
            }
            ObsEdit::RenameColumn { old, new } => {
                let schema = self.schema.with_renamed_obs_column(old, new)?;
                resident_obs(&resident, old)?;
                resident.obs = resident.obs.rename_col(old, new.clone())?;
                resident.where_cache = resident.where_cache.without_label(Field::Obs, old);
                schema
            }
            ObsEdit::SetValues { column, rows, value } => {
                let schema = self.categorized(column, value)?;
                let positions = rows
                    .iter()
                    .map(|&label| {
                        self.row_index
                            .offset_of(label)
                            .ok_or_else(|| AnnoError::invariant(format!("row label {label} not present")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let data = resident_obs(&resident, column)?.with_values_at(column, &positions, value)?;
                resident.obs = resident.obs.with_col(column.clone(), data)?;
                schema
            }
            ObsEdit::ResetValues { column, old, new } => {
                let schema = self.categorized(column, new)?;
                let data = resident_obs(&resident, column)?.replace_value(column, old, new)?;
                resident.obs = resident.obs.with_col(column.clone(), data)?;
                schema
            }
        };
        Ok(Self::build(
            Arc::new(schema),
            self.n_var,
            self.row_index.clone(),
            self.kind.clone(),
            Some(resident),
        ))
    }

    /// Schema in which `value` is a category of `column`, when it is categorical.
    fn categorized(&self, column: &str, value: &ColumnValue) -> Result<Schema> {
        let col = self.schema.writable_obs_column(column)?;
        if col.dtype == DType::Categorical {
            Ok(self.schema.ensure_category(column, value))
        } else {
            Ok(self.schema.as_ref().clone())
        }
    }
}

fn resident_obs<'a>(resident: &'a Resident, column: &str) -> Result<&'a Column> {
    resident
        .obs
        .col(column)
        .map_err(|_| AnnoError::invariant(format!("obs column '{column}' is not resident at the loader")))
}
