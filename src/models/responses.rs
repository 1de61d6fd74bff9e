use serde::{Deserialize, Serialize};
use crate::models::domain::EventRecord;

/// Response for the recognition endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub encontrado_em: Vec<EventRecord>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub erro: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { erro: message.into() }
    }
}
