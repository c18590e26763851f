use crate::config::StoreSettings;
use crate::domain::model::{EmailMessage, Entity};
use crate::domain::policy::BillingPolicy;
use crate::utils::error::{BillingError, Result};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Equality filter on entity fields, the shape the entity API's `filter`
/// call accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(Map<String, Value>);

impl Query {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| record.get(field).unwrap_or(&Value::Null) == expected)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

/// Untyped CRUD access to the remote entity store.
pub trait EntityStore: Send + Sync {
    fn list(&self, entity: &str) -> impl Future<Output = Result<Vec<Value>>> + Send;

    fn filter(
        &self,
        entity: &str,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    fn get(&self, entity: &str, id: &str) -> impl Future<Output = Result<Value>> + Send;

    fn create(&self, entity: &str, record: Value) -> impl Future<Output = Result<Value>> + Send;

    /// Merges `patch` into the stored record and returns the result.
    fn update(
        &self,
        entity: &str,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = Result<Value>> + Send;
}

pub trait Notifier: Send + Sync {
    fn send_email(&self, message: &EmailMessage) -> impl Future<Output = Result<()>> + Send;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(&self, path: &str, data: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn store_settings(&self) -> &StoreSettings;
    fn policy(&self) -> &BillingPolicy;
    fn report_prefix(&self) -> Option<&str>;
}

/// A stored record that does not match its entity's shape.
#[derive(Debug)]
pub struct Rejected {
    pub id: String,
    pub record: Value,
    pub error: BillingError,
}

impl Rejected {
    /// String field of the raw record, for callers that only need a key.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.record.get(name).and_then(Value::as_str)
    }
}

/// Result of decoding a listing: the records that decoded, and the rest.
#[derive(Debug)]
pub struct Decoded<E> {
    pub records: Vec<E>,
    pub rejected: Vec<Rejected>,
}

impl<E> Decoded<E> {
    /// All-or-nothing view, for callers that cannot act on a partial listing.
    pub fn into_strict(self) -> Result<Vec<E>> {
        match self.rejected.into_iter().next() {
            Some(rejected) => Err(rejected.error),
            None => Ok(self.records),
        }
    }
}

/// Typed view over an [`EntityStore`].
pub struct Entities<S: EntityStore> {
    store: Arc<S>,
}

impl<S: EntityStore> Clone for Entities<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> Entities<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists every record. Records that fail to decode are returned in
    /// [`Decoded::rejected`] instead of failing the whole listing.
    pub async fn list<E: Entity>(&self) -> Result<Decoded<E>> {
        let records = self.store.list(E::NAME).await?;
        Ok(decode_all(records))
    }

    pub async fn filter<E: Entity>(&self, query: &Query) -> Result<Decoded<E>> {
        let records = self.store.filter(E::NAME, query).await?;
        Ok(decode_all(records))
    }

    pub async fn get<E: Entity>(&self, id: &str) -> Result<E> {
        let record = self.store.get(E::NAME, id).await?;
        decode(record)
    }

    pub async fn create<E: Entity>(&self, entity: &E) -> Result<E> {
        let record = serde_json::to_value(entity)?;
        let created = self.store.create(E::NAME, record).await?;
        decode(created)
    }

    pub async fn update<E: Entity>(&self, id: &str, patch: Value) -> Result<E> {
        if !patch.is_object() {
            return Err(BillingError::invalid_data(format!(
                "update patch for {} '{}' must be an object",
                E::NAME,
                id
            )));
        }
        let updated = self.store.update(E::NAME, id, patch).await?;
        decode(updated)
    }
}

fn record_id(record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => "?".to_string(),
    }
}

fn decode<E: Entity>(record: Value) -> Result<E> {
    let id = record_id(&record);
    serde_json::from_value(record).map_err(|e| {
        BillingError::invalid_data(format!("{} '{}' could not be decoded: {}", E::NAME, id, e))
    })
}

fn decode_all<E: Entity>(records: Vec<Value>) -> Decoded<E> {
    let mut decoded = Decoded {
        records: Vec::with_capacity(records.len()),
        rejected: Vec::new(),
    };
    for record in records {
        match decode(record.clone()) {
            Ok(entity) => decoded.records.push(entity),
            Err(error) => decoded.rejected.push(Rejected {
                id: record_id(&record),
                record,
                error,
            }),
        }
    }
    decoded
}
