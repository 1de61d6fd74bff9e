use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when asking the verifier for a decision
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("verifier returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid verifier response: {0}")]
    InvalidResponse(String),

    #[error("verifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("cannot read image {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A pair of stored images to compare
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub reference: PathBuf,
    pub candidate: PathBuf,
    /// When false the verifier must treat images without a clearly
    /// detectable face as ordinary inputs instead of rejecting them.
    pub enforce_detection: bool,
}

/// Verifier decision for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Face-similarity capability
#[async_trait]
pub trait FaceVerifier: Send + Sync {
    /// Name of this verifier for logging.
    fn name(&self) -> &str;

    /// Decide whether both images show the same person.
    async fn verify(&self, request: &VerifyRequest) -> Result<Verification, VerifierError>;
}

/// Optional knobs forwarded verbatim to the DeepFace service
#[derive(Debug, Clone, Default)]
pub struct DeepFaceOptions {
    pub model_name: Option<String>,
    pub detector_backend: Option<String>,
    pub distance_metric: Option<String>,
}

/// Client for a DeepFace-compatible HTTP API (`POST {endpoint}/verify`)
///
/// Both images are sent inline as base64 data URIs, so the service does
/// not need access to this process's storage.
pub struct DeepFaceClient {
    endpoint: String,
    client: Client,
    options: DeepFaceOptions,
}

impl DeepFaceClient {
    pub fn new(
        endpoint: String,
        timeout: Duration,
        options: DeepFaceOptions,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            client,
            options,
        })
    }

    fn verify_url(&self) -> String {
        format!("{}/verify", self.endpoint.trim_end_matches('/'))
    }

    fn build_payload(&self, img1: String, img2: String, enforce_detection: bool) -> Value {
        let mut payload = Map::new();
        payload.insert("img1".to_string(), Value::String(img1));
        payload.insert("img2".to_string(), Value::String(img2));
        payload.insert("enforce_detection".to_string(), Value::Bool(enforce_detection));

        let optional = [
            ("model_name", &self.options.model_name),
            ("detector_backend", &self.options.detector_backend),
            ("distance_metric", &self.options.distance_metric),
        ];
        for (field, value) in optional {
            if let Some(value) = value {
                payload.insert(field.to_string(), Value::String(value.clone()));
            }
        }

        Value::Object(payload)
    }
}

#[async_trait]
impl FaceVerifier for DeepFaceClient {
    fn name(&self) -> &str {
        "deepface"
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<Verification, VerifierError> {
        let img1 = encode_data_uri(&request.reference).await?;
        let img2 = encode_data_uri(&request.candidate).await?;
        let payload = self.build_payload(img1, img2, request.enforce_detection);

        let response = self
            .client
            .post(self.verify_url())
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(VerifierError::Api { status, body });
        }

        let json: Value = response.json().await?;
        parse_verification(json)
    }
}

/// Extract a [`Verification`] from a verifier response body
///
/// `verified` must be a boolean; everything else is optional.
pub fn parse_verification(json: Value) -> Result<Verification, VerifierError> {
    match json.get("verified") {
        Some(Value::Bool(_)) => {}
        Some(other) => {
            return Err(VerifierError::InvalidResponse(format!(
                "`verified` is not a boolean: {}",
                other
            )))
        }
        None => {
            return Err(VerifierError::InvalidResponse(
                "missing `verified` field".to_string(),
            ))
        }
    }

    serde_json::from_value(json).map_err(|e| VerifierError::InvalidResponse(e.to_string()))
}

async fn encode_data_uri(path: &Path) -> Result<String, VerifierError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| VerifierError::Input {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(format!("data:{};base64,{}", mime_for(path), STANDARD.encode(bytes)))
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "image/jpeg",
    }
}
