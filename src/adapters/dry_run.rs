use crate::adapters::memory::merge_patch;
use crate::domain::ports::{EntityStore, Query};
use crate::utils::error::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reads go to the wrapped store; writes are logged and answered with the
/// record as it would look, without persisting anything.
#[derive(Debug)]
pub struct DryRunStore<S: EntityStore> {
    inner: S,
    planned_writes: AtomicUsize,
}

impl<S: EntityStore> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            planned_writes: AtomicUsize::new(0),
        }
    }

    pub fn planned_writes(&self) -> usize {
        self.planned_writes.load(Ordering::Relaxed)
    }
}

impl<S: EntityStore> EntityStore for DryRunStore<S> {
    async fn list(&self, entity: &str) -> Result<Vec<Value>> {
        self.inner.list(entity).await
    }

    async fn filter(&self, entity: &str, query: &Query) -> Result<Vec<Value>> {
        self.inner.filter(entity, query).await
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Value> {
        self.inner.get(entity, id).await
    }

    async fn create(&self, entity: &str, mut record: Value) -> Result<Value> {
        let n = self.planned_writes.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(obj) = record.as_object_mut() {
            obj.entry("id")
                .or_insert_with(|| Value::String(format!("dry-run-{}", n)));
        }
        tracing::info!("🔍 [dry-run] create {}: {}", entity, record);
        Ok(record)
    }

    async fn update(&self, entity: &str, id: &str, patch: Value) -> Result<Value> {
        self.planned_writes.fetch_add(1, Ordering::Relaxed);
        tracing::info!("🔍 [dry-run] update {} {}: {}", entity, id, patch);
        let mut current = self.inner.get(entity, id).await?;
        merge_patch(&mut current, patch);
        Ok(current)
    }
}
