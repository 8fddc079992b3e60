use super::clip::{clip_column, ClipRange};
use super::AnnoMatrix;
use crate::dataframe::DataFrame;
use crate::error::{AnnoError, Result};
use crate::schema::ColumnSchema;
use crate::source::{RemoteSource, Selector};
use crate::types::{Column, Field, Label, Query};
use crate::where_cache::WhereCache;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Per-column transform of a map view: `(field, label, schema, data, frame)`.
pub type MapFn =
    Arc<dyn Fn(Field, &Label, &ColumnSchema, &Column, &DataFrame) -> Result<Column> + Send + Sync>;

/// What a node in the view chain does with data fetched through it.
#[derive(Clone)]
pub enum ViewKind {
    /// Root node; fetches from the remote.
    Loader { source: Arc<dyn RemoteSource> },
    /// Restricts obs and X to the node's row index. `var` passes through.
    RowSubset { parent: Arc<AnnoMatrix> },
    /// Applies a transform to every fetched column.
    Map { parent: Arc<AnnoMatrix>, map: MapFn },
    /// Quantile clip of continuous obs and X columns. Always outermost.
    Clip { parent: Arc<AnnoMatrix>, range: ClipRange },
}

impl ViewKind {
    pub fn parent(&self) -> Option<&Arc<AnnoMatrix>> {
        match self {
            ViewKind::Loader { .. } => None,
            ViewKind::RowSubset { parent } | ViewKind::Map { parent, .. } | ViewKind::Clip { parent, .. } => {
                Some(parent)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::Loader { .. } => "loader",
            ViewKind::RowSubset { .. } => "row-subset",
            ViewKind::Map { .. } => "map",
            ViewKind::Clip { .. } => "clip",
        }
    }

    /// Same transform over a different parent.
    pub(super) fn with_parent(&self, parent: Arc<AnnoMatrix>) -> ViewKind {
        match self {
            ViewKind::Loader { source } => ViewKind::Loader {
                source: Arc::clone(source),
            },
            ViewKind::RowSubset { .. } => ViewKind::RowSubset { parent },
            ViewKind::Map { map, .. } => ViewKind::Map {
                parent,
                map: Arc::clone(map),
            },
            ViewKind::Clip { range, .. } => ViewKind::Clip { parent, range: *range },
        }
    }
}

impl fmt::Debug for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Loader { source } => f.debug_struct("Loader").field("source", source).finish(),
            ViewKind::RowSubset { parent } => f.debug_struct("RowSubset").field("parent", &parent.id()).finish(),
            ViewKind::Map { parent, .. } => f.debug_struct("Map").field("parent", &parent.id()).finish(),
            ViewKind::Clip { parent, range } => f
                .debug_struct("Clip")
                .field("parent", &parent.id())
                .field("range", range)
                .finish(),
        }
    }
}

impl AnnoMatrix {
    /// Produce the data for `query` at this node, plus the where-cache delta
    /// to merge. A `None` delta marks a pass-through that is not cached here.
    pub(super) async fn do_load(&self, field: Field, query: &Query) -> Result<(Option<WhereCache>, DataFrame)> {
        match &self.kind {
            ViewKind::Loader { source } => self.load_remote(source.as_ref(), field, query).await,
            ViewKind::RowSubset { parent } => {
                let df = parent.fetch(field, query.clone()).await?;
                if field == Field::Var {
                    return Ok((None, df));
                }
                let subset = df.subset(&self.row_index)?;
                let delta = WhereCache::create(field, query, &subset.labels());
                Ok((Some(delta), subset))
            }
            ViewKind::Map { parent, map } => {
                let df = parent.fetch(field, query.clone()).await?;
                let mapped = self.map_frame(field, &df, |label, schema, col| map(field, label, schema, col, &df))?;
                let delta = WhereCache::create(field, query, &mapped.labels());
                Ok((Some(delta), mapped))
            }
            ViewKind::Clip { parent, range } => {
                let df = parent.fetch(field, query.clone()).await?;
                let clipped = self.map_frame(field, &df, |_, schema, col| clip_column(field, schema, col, *range))?;
                let delta = WhereCache::create(field, query, &clipped.labels());
                Ok((Some(delta), clipped))
            }
        }
    }

    fn map_frame<F>(&self, field: Field, df: &DataFrame, f: F) -> Result<DataFrame>
    where
        F: Fn(&Label, &ColumnSchema, &Column) -> Result<Column> + Send + Sync,
    {
        df.map_columns(|label, col, _| {
            let schema = self
                .schema
                .column_schema(field, label)
                .ok_or_else(|| AnnoError::unknown_column(field, label.clone()))?;
            f(label, &schema, col)
        })
    }

    /// Fetch the labels of `query` not yet resident and normalize the
    /// response to this matrix's rows and the schema's column types.
    #[instrument(skip(self, source), fields(matrix = self.id))]
    async fn load_remote(
        &self,
        source: &dyn RemoteSource,
        field: Field,
        query: &Query,
    ) -> Result<(Option<WhereCache>, DataFrame)> {
        let rows = self.rows(field);
        let selector = match query {
            Query::Where(w) => Selector::Where(w.clone()),
            _ => {
                let labels = query.explicit_labels().unwrap_or_default();
                let missing: Vec<Label> = {
                    let resident = self.resident.load();
                    let store = resident.store(field);
                    labels.iter().filter(|l| !store.has_col(l)).cloned().collect()
                };
                if missing.is_empty() {
                    // completed by a load that raced this one
                    return Ok((Some(WhereCache::create(field, query, &labels)), DataFrame::empty(rows)));
                }
                Selector::Labels(missing)
            }
        };

        debug!(%field, ?selector, "remote fetch");
        let fetched = source
            .fetch(field, &selector)
            .await
            .inspect_err(|e| warn!(%field, error = %e, "remote fetch failed"))?;
        let df = self.normalize(field, &selector, fetched)?;

        let labels = query.explicit_labels().unwrap_or_else(|| df.labels());
        Ok((Some(WhereCache::create(field, query, &labels)), df))
    }

    fn normalize(&self, field: Field, selector: &Selector, fetched: DataFrame) -> Result<DataFrame> {
        let rows = self.rows(field);
        if fetched.n_rows() != rows.len() {
            return Err(AnnoError::remote(
                None,
                format!("{field} response has {} rows, expected {}", fetched.n_rows(), rows.len()),
            ));
        }
        if let Selector::Labels(labels) = selector {
            if let Some(missing) = labels.iter().find(|l| !fetched.has_col(l)) {
                return Err(AnnoError::remote(None, format!("{field} response is missing column '{missing}'")));
            }
        }

        let mut columns = Vec::with_capacity(fetched.n_cols());
        for (label, col) in fetched.iter() {
            let schema = self
                .schema
                .column_schema(field, label)
                .ok_or_else(|| AnnoError::remote(None, format!("{field} response has unknown column '{label}'")))?;
            columns.push((label.clone(), col.cast(label, schema.dtype)?));
        }
        DataFrame::new(rows, columns)
    }
}
