//! In-memory `SearchIndex`
//!
//! Same merge semantics as the Elasticsearch client: upserts and partial
//! updates merge objects recursively, `null` counts as missing. Failure
//! injection hooks let tests simulate rejected items and outages.
//! `time_window` is not evaluated.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{
    BulkFailure, BulkOutcome, FieldPatch, MissingFieldQuery, SearchIndex, SearchPage, SortKey,
    StoredDocument,
};
use crate::error::{Dependency, DependencyError};
use crate::logic::features::FeatureDocument;

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Value>,
    reject_ids: HashSet<String>,
    fail_bulk: bool,
    updates: Vec<(String, &'static str)>,
    bulk_calls: usize,
}

#[derive(Default)]
pub struct MemoryIndex {
    inner: Mutex<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored source
    pub fn get_raw(&self, id: &str) -> Option<Value> {
        self.inner.lock().docs.get(id).cloned()
    }

    pub fn get(&self, id: &str) -> Option<FeatureDocument> {
        self.get_raw(id).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.lock().docs.keys().cloned().collect()
    }

    /// Seed a document as-is, bypassing upsert
    pub fn insert(&self, doc: &FeatureDocument) {
        if let Ok(value) = serde_json::to_value(doc) {
            self.inner.lock().docs.insert(doc.doc_id(), value);
        }
    }

    /// Bulk items with these ids fail with HTTP 429
    pub fn reject_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.lock();
        inner.reject_ids = ids.into_iter().map(Into::into).collect();
    }

    /// Every bulk request fails as a transient outage
    pub fn set_bulk_outage(&self, down: bool) {
        self.inner.lock().fail_bulk = down;
    }

    /// `(doc id, field)` of every partial update applied so far
    pub fn updates(&self) -> Vec<(String, &'static str)> {
        self.inner.lock().updates.clone()
    }

    pub fn bulk_calls(&self) -> usize {
        self.inner.lock().bulk_calls
    }
}

/// Recursive object merge; non-object values replace
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                let nested = value.is_object() && dst.get(key).map_or(false, Value::is_object);
                if nested {
                    if let Some(existing) = dst.get_mut(key) {
                        merge(existing, value);
                    }
                } else {
                    dst.insert(key.clone(), value.clone());
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Dotted path lookup; `null` and absent are both missing
fn has_field(source: &Value, path: &str) -> bool {
    let mut current = source;
    for part in path.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => {
                // Flat keys containing dots ("@timestamp" style) are looked up whole
                return source.get(path).map(|v| !v.is_null()).unwrap_or(false);
            }
        }
    }
    !current.is_null()
}

impl Inner {
    fn sorted(&self, keep: impl Fn(&Value) -> bool) -> Vec<StoredDocument> {
        let mut docs: Vec<StoredDocument> = self
            .docs
            .iter()
            .filter(|(_, v)| keep(v))
            .filter_map(|(id, v)| {
                let doc: FeatureDocument = serde_json::from_value(v.clone()).ok()?;
                Some(StoredDocument {
                    id: id.clone(),
                    sort: SortKey::of(&doc),
                    doc,
                })
            })
            .collect();
        docs.sort_by(|a, b| a.sort.cmp(&b.sort));
        docs
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert_batch(&self, docs: &[FeatureDocument]) -> Result<BulkOutcome, DependencyError> {
        let mut inner = self.inner.lock();
        inner.bulk_calls += 1;
        if inner.fail_bulk {
            return Err(DependencyError::transient(Dependency::SearchIndex, "simulated outage"));
        }

        let mut outcome = BulkOutcome::default();
        for doc in docs {
            let id = doc.doc_id();
            if inner.reject_ids.contains(&id) {
                outcome.failed.push(BulkFailure {
                    id,
                    status: 429,
                    reason: "simulated rejection".to_string(),
                });
                continue;
            }

            let value = serde_json::to_value(doc)
                .map_err(|e| DependencyError::invalid(Dependency::SearchIndex, e.to_string()))?;
            match inner.docs.entry(id) {
                Entry::Occupied(mut entry) => merge(entry.get_mut(), &value),
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
            outcome.written += 1;
        }
        Ok(outcome)
    }

    async fn find_missing(&self, query: &MissingFieldQuery) -> Result<SearchPage, DependencyError> {
        let inner = self.inner.lock();
        let docs: Vec<StoredDocument> = inner
            .sorted(|v| !has_field(v, query.field))
            .into_iter()
            .filter(|d| query.after.as_ref().map_or(true, |after| d.sort > *after))
            .take(query.size)
            .collect();

        Ok(SearchPage {
            hits: docs.len(),
            last_sort: docs.last().map(|d| d.sort.clone()),
            docs,
        })
    }

    async fn update_fields(&self, id: &str, patch: &FieldPatch) -> Result<(), DependencyError> {
        let mut inner = self.inner.lock();
        let existing = inner.docs.get_mut(id).ok_or_else(|| DependencyError::Rejected {
            service: Dependency::SearchIndex,
            status: 404,
            message: format!("document {} not found", id),
        })?;
        merge(existing, &patch.to_partial());
        inner.updates.push((id.to_string(), patch.field()));
        Ok(())
    }

    async fn find_with_fields(
        &self,
        required: &[&str],
        limit: usize,
    ) -> Result<Vec<StoredDocument>, DependencyError> {
        let inner = self.inner.lock();
        let mut docs = inner.sorted(|v| required.iter().all(|f| has_field(v, f)));
        docs.truncate(limit);
        Ok(docs)
    }
}
