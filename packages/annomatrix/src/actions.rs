//! The only place views are stacked or popped, plus the session state the
//! UI drives: current matrix, crossfilter and clip quantiles.
//!
//! Every action computes its next state first and commits it only on
//! success, so a failed action leaves the session as it was and reports an
//! [`ExplorerEvent::Error`] instead.

use crate::crossfilter::{Crossfilter, Selection};
use crate::error::Result;
use crate::matrix::{AnnoMatrix, ClipRange};
use crate::schema::ColumnSchema;
use crate::types::{ColumnValue, Field, Label, Query, RowLabel};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

/// Category value given to rows no label has been assigned to.
pub const UNASSIGNED: &str = "unassigned";

/// Clip `matrix` to `[qmin, qmax]`. An existing clip is replaced, never
/// stacked.
pub fn clip_matrix(matrix: &Arc<AnnoMatrix>, qmin: f64, qmax: f64) -> Result<Arc<AnnoMatrix>> {
    match matrix.view_of() {
        Some(parent) if matrix.is_clipped() => AnnoMatrix::clip(parent, qmin, qmax),
        _ => AnnoMatrix::clip(matrix, qmin, qmax),
    }
}

/// Restrict `matrix` to the rows set in `mask`. A clip stays outermost: the
/// subset goes beneath it and the clip is recomputed over the subset.
pub fn subset_matrix(matrix: &Arc<AnnoMatrix>, mask: &[bool]) -> Result<Arc<AnnoMatrix>> {
    match (matrix.clip_range(), matrix.view_of()) {
        (Some(range), Some(parent)) => {
            let subset = AnnoMatrix::isubset_mask(parent, mask)?;
            AnnoMatrix::clip(&subset, range.min, range.max)
        }
        _ => AnnoMatrix::isubset_mask(matrix, mask),
    }
}

/// Pop every view down to the loader, then re-apply the clip if one was
/// active.
pub fn reset_subset_matrix(matrix: &Arc<AnnoMatrix>) -> Result<Arc<AnnoMatrix>> {
    let range = matrix.clip_range();
    let mut root = matrix;
    while let Some(parent) = root.view_of() {
        root = parent;
    }
    match range {
        Some(range) => AnnoMatrix::clip(root, range.min, range.max),
        None => Ok(Arc::clone(root)),
    }
}

/// Display defaults, overridden by the server's config at bootstrap.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExplorerDefaults {
    pub clip_quantiles: ClipRange,
    pub max_category_items: usize,
}

impl Default for ExplorerDefaults {
    fn default() -> Self {
        Self {
            clip_quantiles: ClipRange::FULL,
            max_category_items: 1000,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExplorerEvent {
    InitComplete { n_obs: usize, n_var: usize },
    ClipQuantiles { min: f64, max: f64 },
    SubsetToSelection { n_obs: usize },
    ResetSubset { n_obs: usize },
    SelectionChanged { dimension: SmolStr, selected: usize },
    AnnotationChanged { column: Label, action: &'static str },
    Error { message: String },
}

/// Session state over one dataset.
#[derive(Debug)]
pub struct Explorer {
    matrix: Arc<AnnoMatrix>,
    crossfilter: Crossfilter,
    clip: ClipRange,
    defaults: ExplorerDefaults,
    needs_save: bool,
    events: mpsc::UnboundedSender<ExplorerEvent>,
}

impl Explorer {
    /// Start a session over `matrix`. The configured clip quantiles are
    /// applied when they are not the full range.
    pub fn new(
        matrix: Arc<AnnoMatrix>,
        defaults: ExplorerDefaults,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ExplorerEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let clip = defaults.clip_quantiles;
        let matrix = if clip.is_full() {
            matrix
        } else {
            clip_matrix(&matrix, clip.min, clip.max)?
        };
        let explorer = Self {
            crossfilter: Crossfilter::new(Arc::clone(&matrix)),
            matrix,
            clip,
            defaults,
            needs_save: false,
            events: tx,
        };
        info!(matrix = explorer.matrix.id(), "explorer initialized");
        explorer.emit(ExplorerEvent::InitComplete {
            n_obs: explorer.matrix.n_obs(),
            n_var: explorer.matrix.n_var(),
        });
        Ok((explorer, rx))
    }

    pub fn matrix(&self) -> &Arc<AnnoMatrix> {
        &self.matrix
    }

    pub fn crossfilter(&self) -> &Crossfilter {
        &self.crossfilter
    }

    pub fn clip_quantiles(&self) -> ClipRange {
        self.clip
    }

    pub fn defaults(&self) -> &ExplorerDefaults {
        &self.defaults
    }

    /// Annotation edits made since the last [`Explorer::mark_saved`].
    pub fn needs_save(&self) -> bool {
        self.needs_save
    }

    pub fn mark_saved(&mut self) {
        self.needs_save = false;
    }

    fn emit(&self, event: ExplorerEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    /// Report a failed action.
    fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!(error = %e, "action failed");
            self.emit(ExplorerEvent::Error { message: e.to_string() });
        }
        result
    }

    fn replace_matrix(&mut self, matrix: Arc<AnnoMatrix>) {
        self.crossfilter = Crossfilter::new(Arc::clone(&matrix));
        self.matrix = matrix;
    }

    // ---- view stack ----

    #[instrument(skip(self), fields(matrix = self.matrix.id()))]
    pub fn clip(&mut self, qmin: f64, qmax: f64) -> Result<()> {
        let matrix = self.check(clip_matrix(&self.matrix, qmin, qmax))?;
        let range = self.check(ClipRange::new(qmin, qmax))?;
        self.replace_matrix(matrix);
        self.clip = range;
        self.emit(ExplorerEvent::ClipQuantiles { min: qmin, max: qmax });
        Ok(())
    }

    #[instrument(skip(self), fields(matrix = self.matrix.id()))]
    pub fn subset(&mut self) -> Result<()> {
        let mask = self.crossfilter.all_selected_mask();
        let matrix = self.check(subset_matrix(&self.matrix, &mask))?;
        self.replace_matrix(matrix);
        self.emit(ExplorerEvent::SubsetToSelection {
            n_obs: self.matrix.n_obs(),
        });
        Ok(())
    }

    #[instrument(skip(self), fields(matrix = self.matrix.id()))]
    pub fn reset_subset(&mut self) -> Result<()> {
        let matrix = self.check(reset_subset_matrix(&self.matrix))?;
        self.replace_matrix(matrix);
        self.emit(ExplorerEvent::ResetSubset {
            n_obs: self.matrix.n_obs(),
        });
        Ok(())
    }

    // ---- selection ----

    async fn select(&mut self, field: Field, query: Query, selection: Selection) -> Result<()> {
        let dimension = Crossfilter::dimension_name(field, &query);
        let next = self.crossfilter.select(field, query, selection).await;
        self.crossfilter = self.check(next)?;
        self.emit_selection(dimension);
        Ok(())
    }

    fn emit_selection(&self, dimension: SmolStr) {
        self.emit(ExplorerEvent::SelectionChanged {
            dimension,
            selected: self.crossfilter.count_selected(),
        });
    }

    /// Select the rows whose obs `column` holds any of `values`.
    pub async fn select_categorical(&mut self, column: &str, values: Vec<ColumnValue>) -> Result<()> {
        self.select(Field::Obs, Query::column(column), Selection::Exact(values)).await
    }

    /// Select every row (`on`) or none, by obs `column`.
    pub async fn select_categorical_all(&mut self, column: &str, on: bool) -> Result<()> {
        let selection = if on { Selection::All } else { Selection::None };
        self.select(Field::Obs, Query::column(column), selection).await
    }

    /// Select the rows whose value is within `[lo, hi]`.
    pub async fn select_continuous(&mut self, field: Field, query: impl Into<Query>, lo: f32, hi: f32) -> Result<()> {
        self.select(field, query.into(), Selection::Ranges(vec![(lo, hi)])).await
    }

    pub fn deselect(&mut self, field: Field, query: impl Into<Query>) {
        let dimension = Crossfilter::dimension_name(field, &query.into());
        self.crossfilter = self.crossfilter.deselect(&dimension);
        self.emit_selection(dimension);
    }

    /// Brush or lasso selection by row label.
    pub fn select_rows(&mut self, name: &str, rows: Vec<RowLabel>) -> Result<()> {
        let next = self.crossfilter.select_rows(name, rows);
        self.crossfilter = self.check(next)?;
        self.emit_selection(SmolStr::new(name));
        Ok(())
    }

    /// Complement the selection of one dimension.
    pub fn invert_selection(&mut self, name: &str) -> Result<()> {
        let next = self.crossfilter.invert(name);
        self.crossfilter = self.check(next)?;
        self.emit_selection(SmolStr::new(name));
        Ok(())
    }

    pub fn deselect_rows(&mut self, name: &str) {
        self.crossfilter = self.crossfilter.deselect(name);
        self.emit_selection(SmolStr::new(name));
    }

    // ---- annotation ----

    fn commit_annotation(&mut self, matrix: Result<Arc<AnnoMatrix>>, touched: &[&str], action: &'static str) -> Result<()> {
        let matrix = self.check(matrix)?;
        let crossfilter = self.check(self.crossfilter.rebase(Arc::clone(&matrix), touched))?;
        self.matrix = matrix;
        self.crossfilter = crossfilter;
        self.needs_save = true;
        if let Some(column) = touched.first() {
            self.emit(ExplorerEvent::AnnotationChanged {
                column: SmolStr::new(column),
                action,
            });
        }
        Ok(())
    }

    /// New writable categorical obs column with every row unassigned.
    pub fn create_category(&mut self, name: &str) -> Result<()> {
        let schema = ColumnSchema::writable_categorical(name, vec![ColumnValue::from(UNASSIGNED)]);
        let next = self.matrix.add_obs_column(schema, UNASSIGNED);
        self.commit_annotation(next, &[name], "create-category")
    }

    pub async fn rename_category(&mut self, old: &str, new: &str) -> Result<()> {
        let next = self.matrix.rename_obs_column(old, new).await;
        self.commit_annotation(next, &[old, new], "rename-category")
    }

    pub fn delete_category(&mut self, name: &str) -> Result<()> {
        let next = self.matrix.drop_obs_column(name);
        self.commit_annotation(next, &[name], "delete-category")
    }

    pub fn create_label(&mut self, category: &str, label: &str) -> Result<()> {
        let next = self.matrix.add_obs_anno_category(category, label);
        self.commit_annotation(next, &[category], "create-label")
    }

    /// Remove `label`; its rows become unassigned.
    pub async fn delete_label(&mut self, category: &str, label: &str) -> Result<()> {
        let next = self.matrix.remove_obs_anno_category(category, label, UNASSIGNED).await;
        self.commit_annotation(next, &[category], "delete-label")
    }

    pub async fn rename_label(&mut self, category: &str, old: &str, new: &str) -> Result<()> {
        let next = self.matrix.remove_obs_anno_category(category, old, new).await;
        self.commit_annotation(next, &[category], "rename-label")
    }

    /// Assign `label` to every currently selected row.
    pub async fn label_selection(&mut self, category: &str, label: &str) -> Result<()> {
        let rows = self.crossfilter.all_selected_labels();
        let next = self.matrix.set_obs_column_values(category, rows, label).await;
        self.commit_annotation(next, &[category], "label-selection")
    }
}
