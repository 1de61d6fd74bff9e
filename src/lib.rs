//! Facefind - finds the catalog events whose photos show a given person
//!
//! A reference photo is compared against the photo of every event in a
//! remote catalog through a face-similarity verifier; the events judged to
//! match are returned in catalog order. Temporary image files are released
//! at the end of every request, whatever happened along the way.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{Orchestrator, PipelineConfig, Rejection};
pub use models::{BatchResult, EventRecord, MatchOutcome, ReferenceUpload};
pub use services::{FaceVerifier, TempStore, Verification, VerifierError, VerifyRequest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Verify that the library exports work correctly
        let result = BatchResult::default();
        assert!(result.matched.is_empty());
        assert_eq!(Rejection::MissingInput.status_code(), 400);
    }
}
