use crate::core::engine::{Comparison, MatchEngine};
use crate::core::resolver::{CandidateResolver, Resolution};
use crate::models::{
    ArtifactKind, BatchResult, EventRecord, FailureCause, MatchOutcome, ReferenceImage,
    ReferenceUpload,
};
use crate::services::catalog::{CatalogClient, CatalogError};
use crate::services::storage::{
    extension_from_content_type, extension_from_file_name, RequestScope, TempStore,
};
use crate::services::verifier::FaceVerifier;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

/// Message returned when the request carries no reference image
pub const MISSING_INPUT_MESSAGE: &str = "Envie uma imagem";

const REFERENCE_STORAGE_MESSAGE: &str = "could not store the reference image";

/// Everything the pipeline needs to know, passed in at construction
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub catalog_endpoint: String,
    pub catalog_timeout: Duration,
    pub catalog_max_bytes: usize,
    pub download_timeout: Duration,
    pub max_image_bytes: usize,
    pub verify_timeout: Duration,
    /// Number of records evaluated at once; 1 means strictly sequential
    pub concurrency: usize,
}

/// Reasons a whole request is turned down
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("{}", MISSING_INPUT_MESSAGE)]
    MissingInput,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl Rejection {
    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::MissingInput => 400,
            Rejection::Catalog(CatalogError::Unavailable(_)) => 503,
            Rejection::Catalog(_) | Rejection::Internal(_) => 500,
        }
    }
}

/// Drives one recognition request from upload to matched records
///
/// # Pipeline Stages
/// 1. Store the reference image
/// 2. Fetch the catalog
/// 3. Resolve and compare every record, in catalog order
/// 4. Release every temporary file of the request
pub struct Orchestrator {
    store: Arc<TempStore>,
    catalog: CatalogClient,
    resolver: CandidateResolver,
    engine: MatchEngine,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        store: Arc<TempStore>,
        verifier: Arc<dyn FaceVerifier>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            store,
            catalog: CatalogClient::new(
                config.catalog_endpoint,
                config.catalog_timeout,
                config.catalog_max_bytes,
            )?,
            resolver: CandidateResolver::new(config.download_timeout, config.max_image_bytes)?,
            engine: MatchEngine::new(verifier, config.verify_timeout),
            concurrency: config.concurrency.max(1),
        })
    }

    /// Run the full pipeline for one request
    ///
    /// Returns the matched records in catalog order. Once the reference
    /// image is accepted, every key allocated for the request is released
    /// before this returns, whichever branch was taken.
    pub async fn run(&self, upload: Option<ReferenceUpload>) -> Result<BatchResult, Rejection> {
        let upload = match upload {
            Some(upload) if !upload.bytes.is_empty() => upload,
            _ => return Err(Rejection::MissingInput),
        };

        let span = tracing::info_span!("recognize", request_id = %uuid::Uuid::new_v4());
        async move {
            let scope = self.store.scope();
            let result = self.process(&scope, upload).await;
            scope.release_all().await;

            match &result {
                Ok(batch) => tracing::info!(
                    "Batch completed: {} matched, {} not matched, {} skipped, {} failed",
                    batch.summary.matched,
                    batch.summary.not_matched,
                    batch.summary.skipped,
                    batch.summary.failed
                ),
                Err(rejection) => tracing::warn!("Request rejected: {}", rejection),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        scope: &RequestScope,
        upload: ReferenceUpload,
    ) -> Result<BatchResult, Rejection> {
        let reference = store_reference(scope, upload).await?;
        tracing::debug!("Reference stored as {} ({} bytes)", reference.key, reference.size);

        let records = self.catalog.fetch().await?;
        tracing::info!("Evaluating {} catalog records", records.len());

        let reference = &reference;
        let result = futures::stream::iter(records)
            .map(|record| self.evaluate_guarded(record, reference, scope))
            .buffered(self.concurrency)
            .collect::<BatchResult>()
            .await;

        Ok(result)
    }

    /// Evaluate one record, turning a panic anywhere inside into `Failed`
    async fn evaluate_guarded(
        &self,
        record: EventRecord,
        reference: &ReferenceImage,
        scope: &RequestScope,
    ) -> MatchOutcome {
        let fallback = record.clone();

        match AssertUnwindSafe(self.evaluate(record, reference, scope))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                tracing::error!("Evaluating {} panicked: {}", fallback.label(), message);
                MatchOutcome::Failed {
                    record: fallback,
                    cause: FailureCause::Unexpected(message),
                }
            }
        }
    }

    async fn evaluate(
        &self,
        record: EventRecord,
        reference: &ReferenceImage,
        scope: &RequestScope,
    ) -> MatchOutcome {
        let candidate = match self.resolver.resolve(&record, scope).await {
            Resolution::Ready(candidate) => candidate,
            Resolution::Skipped(reason) => {
                tracing::debug!("Skipping {}: {}", record.label(), reason);
                return MatchOutcome::Skipped { record, reason };
            }
            Resolution::Failed(cause) => {
                tracing::warn!("Could not prepare {}: {}", record.label(), cause);
                return MatchOutcome::Failed { record, cause };
            }
        };

        match self.engine.compare(reference, &candidate).await {
            Comparison::Matched { score } => {
                tracing::info!("Match found in {} (distance: {:?})", record.label(), score);
                MatchOutcome::Matched { record, score }
            }
            Comparison::NotMatched { score } => {
                tracing::debug!("No match in {} (distance: {:?})", record.label(), score);
                MatchOutcome::NotMatched { record, score }
            }
            Comparison::VerifierError(e) => {
                tracing::warn!(
                    "{} failed on {}: {}",
                    self.engine.verifier_name(),
                    record.label(),
                    e
                );
                MatchOutcome::Failed {
                    record,
                    cause: FailureCause::Verifier(e.to_string()),
                }
            }
        }
    }
}

async fn store_reference(
    scope: &RequestScope,
    upload: ReferenceUpload,
) -> Result<ReferenceImage, Rejection> {
    let extension = upload
        .content_type
        .as_deref()
        .and_then(extension_from_content_type)
        .map(str::to_string)
        .or_else(|| upload.file_name.as_deref().and_then(extension_from_file_name));

    let key = scope.allocate(ArtifactKind::Reference, extension.as_deref());
    let path = scope.write(&key, &upload.bytes).await.map_err(|e| {
        tracing::error!("Failed to store reference image: {}", e);
        Rejection::Internal(REFERENCE_STORAGE_MESSAGE.to_string())
    })?;

    Ok(ReferenceImage {
        key,
        path,
        size: upload.bytes.len(),
    })
}
