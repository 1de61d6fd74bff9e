use crate::models::EventRecord;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when fetching the event catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog response is malformed: {0}")]
    Malformed(String),

    #[error("Catalog response has an unexpected shape: {0}")]
    Shape(String),
}

/// Client for the external event catalog
///
/// One GET per request, bounded by the configured timeout, never retried.
/// Bodies larger than `max_bytes` are refused as malformed.
pub struct CatalogClient {
    endpoint: String,
    client: Client,
    max_bytes: usize,
}

impl CatalogClient {
    pub fn new(endpoint: String, timeout: Duration, max_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            client,
            max_bytes,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the catalog; records come back in the order the service sent them
    pub async fn fetch(&self) -> Result<Vec<EventRecord>, CatalogError> {
        tracing::debug!("Fetching catalog from: {}", self.endpoint);

        let mut response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(describe(&e)))?;

        if !response.status().is_success() {
            return Err(CatalogError::Unavailable(format!(
                "catalog returned {}",
                response.status()
            )));
        }

        let limit = self.max_bytes;
        let too_large = || CatalogError::Malformed(format!("body exceeds {} bytes", limit));
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CatalogError::Unavailable(describe(&e)))?
        {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        let records = parse_catalog(&body)?;
        tracing::debug!("Catalog returned {} records", records.len());

        Ok(records)
    }
}

/// Parse and shape-check a catalog body
///
/// The body must be a JSON array whose every element is an object.
pub fn parse_catalog(body: &[u8]) -> Result<Vec<EventRecord>, CatalogError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| CatalogError::Malformed(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(CatalogError::Shape(format!(
                "expected an array of events, got {}",
                json_type(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(EventRecord::from_fields(fields)),
            other => Err(CatalogError::Shape(format!(
                "entry {} is {}, not an object",
                index,
                json_type(&other)
            ))),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
