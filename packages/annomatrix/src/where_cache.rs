//! Grow-only record of which queries are already answered by a matrix's
//! resident column store.
//!
//! Updates are values: `create` builds a delta, `merge` unions it into a new
//! cache. An entry only says which labels a query maps to; residency also
//! requires those labels to be present in the store, so a column evicted by
//! a mutation is never reported resident.

use crate::dataframe::DataFrame;
use crate::types::{FastMap, Field, Label, Query};
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WhereCache {
    fields: FastMap<Field, FastMap<Query, Arc<[Label]>>>,
}

impl WhereCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delta recording `labels` as the answer to `query` in `field`.
    pub fn create(field: Field, query: &Query, labels: &[Label]) -> WhereCache {
        let mut cache = WhereCache::default();
        cache
            .fields
            .entry(field)
            .or_default()
            .insert(query.clone(), labels.into());
        cache
    }

    /// Union of `self` and `delta`. Existing entries win; merging the same
    /// entry twice is a no-op.
    pub fn merge(&self, delta: &WhereCache) -> WhereCache {
        let mut next = self.clone();
        for (field, entries) in &delta.fields {
            let target = next.fields.entry(*field).or_default();
            for (query, labels) in entries {
                target.entry(query.clone()).or_insert_with(|| labels.clone());
            }
        }
        next
    }

    /// Labels `query` maps to. Explicit column queries answer themselves;
    /// predicate queries need a recorded entry.
    pub fn resolve(&self, field: Field, query: &Query) -> Option<Vec<Label>> {
        if let Some(labels) = query.explicit_labels() {
            return Some(labels);
        }
        self.fields
            .get(&field)
            .and_then(|entries| entries.get(query))
            .map(|labels| labels.to_vec())
    }

    /// Whether `query` can be answered from `store` without a fetch.
    pub fn is_resident(&self, field: Field, query: &Query, store: &DataFrame) -> bool {
        self.resolve(field, query)
            .is_some_and(|labels| labels.iter().all(|l| store.has_col(l)))
    }

    /// Copy without the entries of `field` that mention `label`. Used when a
    /// mutation replaces the owning matrix and a column goes stale.
    pub fn without_label(&self, field: Field, label: &str) -> WhereCache {
        let mut next = self.clone();
        if let Some(entries) = next.fields.get_mut(&field) {
            entries.retain(|_, labels| !labels.iter().any(|l| l == label));
        }
        next
    }

    pub fn len(&self, field: Field) -> usize {
        self.fields.get(&field).map(|e| e.len()).unwrap_or(0)
    }
}
