// Service exports
pub mod catalog;
pub mod storage;
pub mod verifier;

pub use catalog::{parse_catalog, CatalogClient, CatalogError};
pub use storage::{ReleaseReport, RequestScope, StorageError, TempStore};
pub use verifier::{DeepFaceClient, DeepFaceOptions, FaceVerifier, Verification, VerifierError, VerifyRequest};
