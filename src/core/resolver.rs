use crate::models::{ArtifactKind, CandidateImage, EventRecord, FailureCause, SkipReason};
use crate::services::storage::{extension_from_url, RequestScope};
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while downloading a candidate photo
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image host returned {0}")]
    Status(reqwest::StatusCode),

    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// State of one record after resolution
#[derive(Debug)]
pub enum Resolution {
    Ready(CandidateImage),
    Skipped(SkipReason),
    Failed(FailureCause),
}

/// Turns a catalog record into a stored, confirmed candidate image
pub struct CandidateResolver {
    client: Client,
    max_image_bytes: usize,
}

impl CandidateResolver {
    pub fn new(timeout: Duration, max_image_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_image_bytes,
        })
    }

    /// Resolve one record. Never returns early out of the batch: every
    /// problem becomes a `Skipped` or `Failed` resolution.
    ///
    /// Storage keys are allocated through `scope`, so whatever gets written
    /// here is released with the rest of the request.
    pub async fn resolve(&self, record: &EventRecord, scope: &RequestScope) -> Resolution {
        let url = match parse_photo_url(record.photo_url()) {
            Ok(url) => url,
            Err(reason) => return Resolution::Skipped(reason),
        };

        let bytes = match self.download(&url).await {
            Ok(bytes) => bytes,
            Err(e) => return Resolution::Failed(FailureCause::Download(e.to_string())),
        };

        let extension = extension_from_url(&url);
        let key = scope.allocate(ArtifactKind::Candidate, extension.as_deref());

        let path = match scope.write(&key, &bytes).await {
            Ok(path) => path,
            Err(e) => return Resolution::Failed(FailureCause::Storage(e.to_string())),
        };

        if let Err(e) = scope.confirm(&key, bytes.len()).await {
            return Resolution::Failed(FailureCause::Integrity(e.to_string()));
        }

        Resolution::Ready(CandidateImage {
            key,
            path,
            size: bytes.len(),
        })
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, DownloadError> {
        let mut response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        let limit = self.max_image_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(DownloadError::TooLarge { limit });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > limit {
                return Err(DownloadError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::trace!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

/// Validate a record's photo URL
///
/// Only absolute http(s) URLs are downloadable.
pub fn parse_photo_url(raw: Option<&str>) -> Result<Url, SkipReason> {
    let raw = raw.ok_or(SkipReason::MissingUrl)?;
    let url = Url::parse(raw).map_err(|_| SkipReason::MalformedUrl)?;

    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(SkipReason::MalformedUrl),
    }
}
