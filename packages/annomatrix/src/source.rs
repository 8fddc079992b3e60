//! The remote fetch contract consumed by the loader, and an in-memory
//! implementation of it.

use crate::dataframe::DataFrame;
use crate::error::{AnnoError, Result};
use crate::types::{x_label, ColumnValue, Field, Label, RowIndex, WhereQuery};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Columns requested from the remote in one round trip.
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    All,
    Labels(Vec<Label>),
    Where(WhereQuery),
}

/// A dataset server. Implementations return frames whose row count matches
/// the field (`obs`/`X`: all observations, `var`: all variables) and must
/// report transport or server failure as [`AnnoError::RemoteFetch`], never
/// as an empty frame.
#[async_trait]
pub trait RemoteSource: Send + Sync + fmt::Debug {
    async fn fetch(&self, field: Field, selector: &Selector) -> Result<DataFrame>;
}

/// A complete dataset held in memory.
///
/// Counts requests and can hold them open or fail them, which makes it the
/// stand-in for a server in tests and offline sessions.
#[derive(Debug)]
pub struct MemorySource {
    obs: DataFrame,
    var: DataFrame,
    x: DataFrame,
    requests: AtomicUsize,
    log: Mutex<Vec<(Field, Selector)>>,
    gate: Option<Arc<Notify>>,
    fail_next: Mutex<Option<AnnoError>>,
}

impl MemorySource {
    /// `x` columns must be labelled by var offset (see [`x_label`]).
    pub fn new(obs: DataFrame, var: DataFrame, x: DataFrame) -> Self {
        Self {
            obs,
            var,
            x,
            requests: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            gate: None,
            fail_next: Mutex::new(None),
        }
    }

    /// Every fetch waits for a permit on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// The next fetch fails with `err`; later fetches succeed.
    pub fn fail_next(&self, err: AnnoError) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Field, Selector)> {
        self.log.lock().clone()
    }

    fn store(&self, field: Field) -> &DataFrame {
        match field {
            Field::Obs => &self.obs,
            Field::Var => &self.var,
            Field::X => &self.x,
        }
    }

    fn resolve_where(&self, query: &WhereQuery) -> Result<Vec<Label>> {
        if query.field == Field::X {
            return Err(AnnoError::invariant("where queries select through obs or var"));
        }
        let column = self
            .store(query.field)
            .col(&query.column)
            .map_err(|_| AnnoError::unknown_column(query.field, query.column.clone()))?;
        let value = ColumnValue::from(query.value.as_str());
        Ok((0..column.len())
            .filter(|&row| column.matches(row, &value))
            .map(x_label)
            .collect())
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn fetch(&self, field: Field, selector: &Selector) -> Result<DataFrame> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push((field, selector.clone()));
        debug!(%field, ?selector, "memory source fetch");

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }

        let store = self.store(field);
        let labels = match selector {
            Selector::All => store.labels(),
            Selector::Labels(labels) => labels.clone(),
            Selector::Where(query) => self.resolve_where(query)?,
        };
        let df = store
            .select(&labels)
            .map_err(|e| AnnoError::remote(Some(404), e.to_string()))?;
        // the wire carries no row labels; positions are the identity
        df.with_row_index(RowIndex::identity(store.n_rows()))
    }
}
