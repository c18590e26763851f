use crate::domain::model::{EmailMessage, Entity};
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::{BillingError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-process entity store with the same CRUD semantics as the remote API.
/// Backs fixtures and tests; ids are assigned as `<entity>-<n>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<Value>>>,
    next_id: AtomicU64,
    failing_ids: Mutex<HashSet<String>>,
    failing_creates: Mutex<Vec<Query>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts typed records, assigning ids to those without one.
    pub fn seed<E: Entity>(&self, records: &[E]) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let value = serde_json::to_value(record)?;
            ids.push(self.insert(E::NAME, value)?);
        }
        Ok(ids)
    }

    pub fn seed_raw(&self, entity: &str, records: Vec<Value>) -> Result<Vec<String>> {
        records
            .into_iter()
            .map(|record| self.insert(entity, record))
            .collect()
    }

    /// Makes every write to the record with this id fail with HTTP 500.
    pub fn fail_writes_for(&self, id: &str) {
        if let Ok(mut ids) = self.failing_ids.lock() {
            ids.insert(id.to_string());
        }
    }

    /// Makes every create of a record matching `query` fail with HTTP 500.
    pub fn fail_creates_matching(&self, query: Query) {
        if let Ok(mut queries) = self.failing_creates.lock() {
            queries.push(query);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut ids) = self.failing_ids.lock() {
            ids.clear();
        }
        if let Ok(mut queries) = self.failing_creates.lock() {
            queries.clear();
        }
    }

    pub fn records(&self, entity: &str) -> Vec<Value> {
        self.tables
            .lock()
            .map(|tables| tables.get(entity).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn all<E: Entity>(&self) -> Result<Vec<E>> {
        self.records(E::NAME)
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(BillingError::from))
            .collect()
    }

    fn insert(&self, entity: &str, mut record: Value) -> Result<String> {
        let obj = record
            .as_object_mut()
            .ok_or_else(|| BillingError::invalid_data(format!("{} record must be an object", entity)))?;

        let id = match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                let id = format!("{}-{}", entity.to_lowercase(), n);
                obj.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        self.lock_tables()?
            .entry(entity.to_string())
            .or_default()
            .push(record);
        Ok(id)
    }

    fn lock_tables(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<Value>>>> {
        self.tables.lock().map_err(|_| BillingError::StorageError {
            message: "memory store lock poisoned".to_string(),
        })
    }

    fn check_writable(&self, entity: &str, id: &str) -> Result<()> {
        let failing = self
            .failing_ids
            .lock()
            .map(|ids| ids.contains(id))
            .unwrap_or(false);
        if failing {
            return Err(BillingError::ApiStatusError {
                method: "PUT".to_string(),
                url: format!("memory://entities/{}/{}", entity, id),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn merge_patch(record: &mut Value, patch: Value) {
    if let (Some(target), Value::Object(fields)) = (record.as_object_mut(), patch) {
        for (key, value) in fields {
            target.insert(key, value);
        }
    }
}

impl EntityStore for MemoryStore {
    async fn list(&self, entity: &str) -> Result<Vec<Value>> {
        Ok(self.records(entity))
    }

    async fn filter(&self, entity: &str, query: &Query) -> Result<Vec<Value>> {
        Ok(self
            .records(entity)
            .into_iter()
            .filter(|record| query.matches(record))
            .collect())
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Value> {
        self.records(entity)
            .into_iter()
            .find(|record| record.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| BillingError::not_found(entity, id))
    }

    async fn create(&self, entity: &str, record: Value) -> Result<Value> {
        let failing = self
            .failing_creates
            .lock()
            .map(|queries| queries.iter().any(|q| q.matches(&record)))
            .unwrap_or(false);
        if failing {
            return Err(BillingError::ApiStatusError {
                method: "POST".to_string(),
                url: format!("memory://entities/{}", entity),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        let id = self.insert(entity, record)?;
        self.get(entity, &id).await
    }

    async fn update(&self, entity: &str, id: &str, patch: Value) -> Result<Value> {
        self.check_writable(entity, id)?;
        let mut tables = self.lock_tables()?;
        let record = tables
            .get_mut(entity)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| BillingError::not_found(entity, id))?;
        merge_patch(record, patch);
        Ok(record.clone())
    }
}

/// Keeps every email instead of sending it.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| BillingError::StorageError {
                message: "notifier lock poisoned".to_string(),
            })?
            .push(message.clone());
        Ok(())
    }
}
