use crate::config::StoreSettings;
use crate::domain::model::EmailMessage;
use crate::domain::ports::{EntityStore, Notifier, Query};
use crate::utils::error::{BillingError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Entity store backed by the hosted entity REST API.
///
/// Routes follow `{base_url}/entities/{Entity}[/{id}]`. Reads are retried on
/// transport errors and 5xx/429 responses; writes are sent once.
#[derive(Debug, Clone)]
pub struct HttpEntityStore {
    client: Client,
    base_url: Url,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpEntityStore {
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .default_headers(build_headers(settings)?)
            .build()?;

        let base_url = Url::parse(&settings.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| BillingError::InvalidConfigValueError {
                field: "store.base_url".to_string(),
                value: settings.base_url.clone(),
                reason: "not an absolute http(s) URL".to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            retry_attempts: settings.retry_attempts,
            retry_delay: Duration::from_secs(settings.retry_delay_seconds),
        })
    }

    /// Email sender sharing this store's connection pool and credentials.
    pub fn notifier(&self, from_name: &str) -> HttpNotifier {
        HttpNotifier {
            client: self.client.clone(),
            endpoint: self.join(&["integrations", "Core", "SendEmail"]),
            from_name: from_name.to_string(),
        }
    }

    /// Appends percent-encoded path segments to the base URL.
    fn join(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }

    fn entity_url(&self, entity: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => self.join(&["entities", entity, id]),
            None => self.join(&["entities", entity]),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: Option<&Query>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let retries = if method == Method::GET {
            self.retry_attempts
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), url, query, body).await {
                Err(e) if attempt < retries && e.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(
                        "⚠️ {} {} failed ({}), retry {}/{}",
                        method,
                        url,
                        e,
                        attempt,
                        retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: Option<&Query>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut request = self.client.request(method.clone(), url);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            request = request.query(&[("q", query.to_json())]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!("{} {}", method, url);
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::ApiStatusError {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn build_headers(settings: &StoreSettings) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(key) = &settings.api_key {
        headers.insert("api_key", header_value("store.api_key", key)?);
    }

    for (name, value) in &settings.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            BillingError::InvalidConfigValueError {
                field: "store.headers".to_string(),
                value: name.clone(),
                reason: e.to_string(),
            }
        })?;
        headers.insert(header_name, header_value("store.headers", value)?);
    }

    Ok(headers)
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| BillingError::InvalidConfigValueError {
        field: field.to_string(),
        value: "<redacted>".to_string(),
        reason: e.to_string(),
    })
}

/// List endpoints answer with a bare array; some deployments wrap it.
fn into_records(entity: &str, payload: Value) -> Result<Vec<Value>> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("items").or_else(|| obj.remove("data")) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(BillingError::invalid_data(format!(
                "{} list response is not an array",
                entity
            ))),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err(BillingError::invalid_data(format!(
            "{} list response is not an array",
            entity
        ))),
    }
}

impl EntityStore for HttpEntityStore {
    async fn list(&self, entity: &str) -> Result<Vec<Value>> {
        let url = self.entity_url(entity, None);
        let payload = self.send(Method::GET, &url, None, None).await?;
        into_records(entity, payload)
    }

    async fn filter(&self, entity: &str, query: &Query) -> Result<Vec<Value>> {
        let url = self.entity_url(entity, None);
        let payload = self.send(Method::GET, &url, Some(query), None).await?;
        into_records(entity, payload)
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Value> {
        let url = self.entity_url(entity, Some(id));
        match self.send(Method::GET, &url, None, None).await {
            Err(BillingError::ApiStatusError { status: 404, .. }) => {
                Err(BillingError::not_found(entity, id))
            }
            other => other,
        }
    }

    async fn create(&self, entity: &str, record: Value) -> Result<Value> {
        let url = self.entity_url(entity, None);
        match self.send(Method::POST, &url, None, Some(&record)).await? {
            // without the stored record there is no id to link against
            Value::Null => Err(BillingError::invalid_data(format!(
                "{} was created but the response carried no record",
                entity
            ))),
            created => Ok(created),
        }
    }

    async fn update(&self, entity: &str, id: &str, patch: Value) -> Result<Value> {
        let url = self.entity_url(entity, Some(id));
        match self.send(Method::PUT, &url, None, Some(&patch)).await {
            Err(BillingError::ApiStatusError { status: 404, .. }) => {
                Err(BillingError::not_found(entity, id))
            }
            Ok(Value::Null) => {
                tracing::debug!("{} {} updated without a body, reading it back", entity, id);
                self.get(entity, id).await
            }
            other => other,
        }
    }
}

/// Sends mail through the platform's `Core.SendEmail` integration.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
    from_name: String,
}

impl Notifier for HttpNotifier {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        let body = json!({
            "to": message.to,
            "subject": message.subject,
            "body": message.body,
            "from_name": self.from_name,
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BillingError::ApiStatusError {
                method: "POST".to_string(),
                url: self.endpoint.clone(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        tracing::debug!("📧 Email sent to {}: {}", message.to, message.subject);
        Ok(())
    }
}

/// Used when notifications are disabled.
#[derive(Debug, Clone, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        tracing::debug!("Notifications disabled, dropping email to {}", message.to);
        Ok(())
    }
}
