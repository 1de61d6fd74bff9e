// Model exports
pub mod domain;
pub mod responses;

pub use domain::{
    ArtifactKind, BatchResult, CandidateImage, EventRecord, FailureCause, MatchOutcome,
    OutcomeSummary, ReferenceImage, ReferenceUpload, SkipReason, StorageKey,
};
pub use responses::{ErrorResponse, HealthResponse, RecognizeResponse};
