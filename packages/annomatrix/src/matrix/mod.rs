//! Versioned, lazily loaded handles onto a remote annotated matrix.
//!
//! An [`AnnoMatrix`] is either the loader (the only node that talks to the
//! remote) or a view over a parent matrix. Instances are immutable apart from
//! their grow-only resident cache; mutations return new instances.
//!
//! # Fetch protocol
//!
//! 1. Validate the query against the schema.
//! 2. Answer from the resident store if the where-cache says every label is there.
//! 3. Otherwise join the in-flight load for the same `(field, query)`, or start one.
//! 4. The load walks the view chain through `do_load`, then merges its result
//!    into the resident store with a compare-and-swap.
//!
//! Failed loads merge nothing.

mod clip;
mod mutate;
mod view;

pub use clip::{clip_values, ClipRange};
pub use view::{MapFn, ViewKind};

use crate::dataframe::DataFrame;
use crate::error::{AnnoError, Result};
use crate::schema::Schema;
use crate::source::RemoteSource;
use crate::types::{FastMap, Field, Query, RowIndex, RowLabel};
use crate::where_cache::WhereCache;
use arc_swap::ArcSwap;
use futures::future::{self, BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

static NEXT_MATRIX_ID: AtomicU64 = AtomicU64::new(1);

type PendingFetch = Shared<BoxFuture<'static, Result<DataFrame>>>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FetchKey {
    field: Field,
    query: Query,
}

/// Columns this instance has materialized, per field.
#[derive(Clone, Debug)]
pub(crate) struct Resident {
    obs: DataFrame,
    var: DataFrame,
    x: DataFrame,
    where_cache: WhereCache,
}

impl Resident {
    fn empty(obs_rows: &RowIndex, n_var: usize) -> Self {
        Self {
            obs: DataFrame::empty(obs_rows.clone()),
            var: DataFrame::empty(RowIndex::identity(n_var)),
            x: DataFrame::empty(obs_rows.clone()),
            where_cache: WhereCache::new(),
        }
    }

    fn store(&self, field: Field) -> &DataFrame {
        match field {
            Field::Obs => &self.obs,
            Field::Var => &self.var,
            Field::X => &self.x,
        }
    }

    fn store_mut(&mut self, field: Field) -> &mut DataFrame {
        match field {
            Field::Obs => &mut self.obs,
            Field::Var => &mut self.var,
            Field::X => &mut self.x,
        }
    }

    fn merged(&self, field: Field, delta: &WhereCache, df: &DataFrame) -> Result<Resident> {
        let mut next = self.clone();
        *next.store_mut(field) = self.store(field).with_cols_from(df)?;
        next.where_cache = self.where_cache.merge(delta);
        Ok(next)
    }

    /// Copy with the obs columns in `labels` evicted.
    fn without_obs_columns(&self, labels: &[&str]) -> Resident {
        let mut next = self.clone();
        for label in labels {
            next.obs = next.obs.without_col(label);
            next.where_cache = next.where_cache.without_label(Field::Obs, label);
        }
        next
    }
}

/// One version of the dataset at a given transformation depth.
pub struct AnnoMatrix {
    id: u64,
    schema: Arc<Schema>,
    n_obs: usize,
    n_var: usize,
    row_index: RowIndex,
    kind: ViewKind,
    resident: ArcSwap<Resident>,
    inflight: Mutex<FastMap<FetchKey, WeakShared<BoxFuture<'static, Result<DataFrame>>>>>,
}

impl fmt::Debug for AnnoMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnoMatrix")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("n_obs", &self.n_obs)
            .field("n_var", &self.n_var)
            .finish()
    }
}

impl AnnoMatrix {
    /// The root of every chain. `schema` comes from the bootstrap request.
    pub fn loader(schema: Schema, source: Arc<dyn RemoteSource>) -> Arc<Self> {
        let row_index = RowIndex::identity(schema.dataframe.n_obs);
        let n_var = schema.dataframe.n_var;
        let matrix = Self::build(Arc::new(schema), n_var, row_index, ViewKind::Loader { source }, None);
        info!(matrix = matrix.id, n_obs = matrix.n_obs, n_var, "loader created");
        matrix
    }

    fn build(
        schema: Arc<Schema>,
        n_var: usize,
        row_index: RowIndex,
        kind: ViewKind,
        resident: Option<Resident>,
    ) -> Arc<Self> {
        let resident = resident.unwrap_or_else(|| Resident::empty(&row_index, n_var));
        Arc::new(Self {
            id: NEXT_MATRIX_ID.fetch_add(1, Ordering::Relaxed),
            schema,
            n_obs: row_index.len(),
            n_var,
            row_index,
            kind,
            resident: ArcSwap::from_pointee(resident),
            inflight: Mutex::new(FastMap::default()),
        })
    }

    /// A view applying `map` to every column fetched through it.
    pub fn map_view(parent: &Arc<Self>, map: MapFn) -> Result<Arc<Self>> {
        parent.ensure_not_clipped("map")?;
        let kind = ViewKind::Map {
            parent: Arc::clone(parent),
            map,
        };
        Ok(Self::build(parent.schema.clone(), parent.n_var, parent.row_index.clone(), kind, None))
    }

    /// A quantile clip over `parent`. Clip views must be outermost, so a
    /// clipped parent is rejected; re-clip by wrapping its `view_of()`.
    pub fn clip(parent: &Arc<Self>, qmin: f64, qmax: f64) -> Result<Arc<Self>> {
        parent.ensure_not_clipped("clip")?;
        let range = ClipRange::new(qmin, qmax)?;
        let kind = ViewKind::Clip {
            parent: Arc::clone(parent),
            range,
        };
        let view = Self::build(parent.schema.clone(), parent.n_var, parent.row_index.clone(), kind, None);
        info!(matrix = view.id, parent = parent.id, qmin, qmax, "clip view created");
        Ok(view)
    }

    /// A view over the rows of `parent` at `positions`.
    pub fn isubset(parent: &Arc<Self>, positions: &[usize]) -> Result<Arc<Self>> {
        let row_index = parent.row_index.isubset(positions)?;
        parent.row_subset(row_index)
    }

    /// A view over the rows of `parent` where `mask` is set.
    pub fn isubset_mask(parent: &Arc<Self>, mask: &[bool]) -> Result<Arc<Self>> {
        let row_index = parent.row_index.isubset_mask(mask)?;
        parent.row_subset(row_index)
    }

    /// A view over the rows with the given persistent labels.
    pub fn subset_rows(parent: &Arc<Self>, labels: Vec<RowLabel>) -> Result<Arc<Self>> {
        let row_index = RowIndex::from_labels(labels)?;
        parent.row_index.positions_of(&row_index)?;
        parent.row_subset(row_index)
    }

    fn row_subset(self: &Arc<Self>, row_index: RowIndex) -> Result<Arc<Self>> {
        self.ensure_not_clipped("row subset")?;
        let kind = ViewKind::RowSubset {
            parent: Arc::clone(self),
        };
        let view = Self::build(self.schema.clone(), self.n_var, row_index, kind, None);
        info!(matrix = view.id, parent = self.id, n_obs = view.n_obs, "row subset view created");
        Ok(view)
    }

    fn ensure_not_clipped(&self, what: &str) -> Result<()> {
        if self.is_clipped() {
            return Err(AnnoError::invariant(format!(
                "cannot stack a {what} view over a clip view"
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn n_var(&self) -> usize {
        self.n_var
    }

    pub fn row_index(&self) -> &RowIndex {
        &self.row_index
    }

    pub fn kind(&self) -> &ViewKind {
        &self.kind
    }

    pub fn is_view(&self) -> bool {
        self.kind.parent().is_some()
    }

    /// The matrix this view derives from; `None` for the loader.
    pub fn view_of(&self) -> Option<&Arc<AnnoMatrix>> {
        self.kind.parent()
    }

    pub fn is_clipped(&self) -> bool {
        matches!(self.kind, ViewKind::Clip { .. })
    }

    pub fn clip_range(&self) -> Option<ClipRange> {
        match &self.kind {
            ViewKind::Clip { range, .. } => Some(*range),
            _ => None,
        }
    }

    /// Kind names from this node down to the loader.
    pub fn view_chain(&self) -> Vec<&'static str> {
        let mut chain = vec![self.kind.name()];
        let mut node = self.view_of();
        while let Some(m) = node {
            chain.push(m.kind.name());
            node = m.view_of();
        }
        chain
    }

    /// Rows of `field` at this node. `var` is never row-subset.
    pub fn rows(&self, field: Field) -> RowIndex {
        match field {
            Field::Obs | Field::X => self.row_index.clone(),
            Field::Var => RowIndex::identity(self.n_var),
        }
    }

    /// Whether `query` would be answered without loading.
    pub fn is_resident(&self, field: Field, query: &Query) -> bool {
        self.resolve_resident(field, query).is_some()
    }

    /// Fetch the columns `query` names in `field`, in query order.
    ///
    /// Concurrent fetches of the same `(field, query)` on one instance share
    /// a single load.
    pub fn fetch(self: &Arc<Self>, field: Field, query: impl Into<Query>) -> BoxFuture<'static, Result<DataFrame>> {
        let this = Arc::clone(self);
        let query = query.into();
        async move { this.fetch_coalesced(field, query).await }.boxed()
    }

    /// Every schema column of `obs` or `var`.
    pub fn fetch_all(self: &Arc<Self>, field: Field) -> BoxFuture<'static, Result<DataFrame>> {
        match self.schema.annotations(field) {
            Ok(annotations) => self.fetch(field, Query::Columns { labels: annotations.labels() }),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    async fn fetch_coalesced(self: Arc<Self>, field: Field, query: Query) -> Result<DataFrame> {
        self.validate(field, &query)?;

        if let Some(df) = self.resolve_resident(field, &query) {
            debug!(matrix = self.id, %field, %query, "resident hit");
            return Ok(df);
        }

        let pending = self.pending_fetch(field, query);
        pending.await
    }

    fn pending_fetch(self: &Arc<Self>, field: Field, query: Query) -> PendingFetch {
        let key = FetchKey { field, query };
        let mut inflight = self.inflight.lock();
        if let Some(pending) = inflight.get(&key).and_then(WeakShared::upgrade) {
            debug!(matrix = self.id, %field, query = %key.query, "joining in-flight fetch");
            return pending;
        }

        let this = Arc::clone(self);
        let owned_key = key.clone();
        let pending = async move {
            let result = this.load_and_merge(owned_key.field, &owned_key.query).await;
            this.inflight.lock().remove(&owned_key);
            result
        }
        .boxed()
        .shared();
        // loads whose waiters all dropped never reach their own removal
        inflight.retain(|_, weak| weak.upgrade().is_some());
        if let Some(weak) = pending.downgrade() {
            inflight.insert(key, weak);
        }
        pending
    }

    async fn load_and_merge(&self, field: Field, query: &Query) -> Result<DataFrame> {
        let (delta, df) = self.do_load(field, query).await?;
        let Some(delta) = delta else {
            // pass-through load, nothing derived to keep
            return Ok(df);
        };

        let mut failure = None;
        self.resident.rcu(|current| match current.merged(field, &delta, &df) {
            Ok(next) => {
                failure = None;
                next
            }
            Err(e) => {
                failure = Some(e);
                Resident::clone(current)
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }

        self.resolve_resident(field, query).ok_or_else(|| {
            AnnoError::invariant(format!("{field} {query} not resident after load"))
        })
    }

    fn resolve_resident(&self, field: Field, query: &Query) -> Option<DataFrame> {
        let resident = self.resident.load();
        let labels = resident.where_cache.resolve(field, query)?;
        let store = resident.store(field);
        if !labels.iter().all(|l| store.has_col(l)) {
            return None;
        }
        store.select(&labels).ok()
    }

    fn validate(&self, field: Field, query: &Query) -> Result<()> {
        match query {
            Query::Column { label } => self.validate_label(field, label),
            Query::Columns { labels } => labels.iter().try_for_each(|l| self.validate_label(field, l)),
            Query::Where(w) => {
                if field != Field::X || w.field == Field::X {
                    return Err(AnnoError::invariant(format!(
                        "predicate queries select X columns through obs or var, got {field} via {}",
                        w.field
                    )));
                }
                self.validate_label(w.field, &w.column)
            }
        }
    }

    fn validate_label(&self, field: Field, label: &str) -> Result<()> {
        if self.schema.has_column(field, label) {
            Ok(())
        } else {
            Err(AnnoError::unknown_column(field, label))
        }
    }

    pub(crate) fn resident_snapshot(&self) -> Resident {
        Resident::clone(&self.resident.load())
    }
}
