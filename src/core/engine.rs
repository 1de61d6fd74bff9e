use crate::models::{CandidateImage, ReferenceImage};
use crate::services::verifier::{FaceVerifier, VerifierError, VerifyRequest};
use std::sync::Arc;
use std::time::Duration;

/// Verifier decision for one candidate
#[derive(Debug)]
pub enum Comparison {
    /// `score` is the verifier's distance, kept for logging only
    Matched { score: Option<f64> },
    NotMatched { score: Option<f64> },
    VerifierError(VerifierError),
}

/// Compares the reference image against candidates through a [`FaceVerifier`]
///
/// Face detection is never enforced, and a verifier failure is returned as
/// [`Comparison::VerifierError`] rather than propagated.
#[derive(Clone)]
pub struct MatchEngine {
    verifier: Arc<dyn FaceVerifier>,
    timeout: Duration,
}

impl MatchEngine {
    pub fn new(verifier: Arc<dyn FaceVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    pub fn verifier_name(&self) -> &str {
        self.verifier.name()
    }

    pub async fn compare(&self, reference: &ReferenceImage, candidate: &CandidateImage) -> Comparison {
        let request = VerifyRequest {
            reference: reference.path.clone(),
            candidate: candidate.path.clone(),
            enforce_detection: false,
        };

        let verification = match tokio::time::timeout(self.timeout, self.verifier.verify(&request)).await {
            Ok(Ok(verification)) => verification,
            Ok(Err(e)) => return Comparison::VerifierError(e),
            Err(_) => return Comparison::VerifierError(VerifierError::Timeout(self.timeout)),
        };

        tracing::trace!(
            "{} verdict for {}: verified={} distance={:?} threshold={:?}",
            self.verifier.name(),
            candidate.key,
            verification.verified,
            verification.distance,
            verification.threshold
        );

        // Only the boolean decides; distance is carried through for logs
        if verification.verified {
            Comparison::Matched {
                score: verification.distance,
            }
        } else {
            Comparison::NotMatched {
                score: verification.distance,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactKind, StorageKey};
    use crate::services::verifier::Verification;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedVerifier {
        verdict: Result<Verification, ()>,
        delay: Duration,
        seen_enforce: Mutex<Vec<bool>>,
    }

    impl FixedVerifier {
        fn returning(verified: bool, distance: Option<f64>) -> Self {
            Self {
                verdict: Ok(Verification {
                    verified,
                    distance,
                    threshold: Some(0.4),
                    model: None,
                }),
                delay: Duration::ZERO,
                seen_enforce: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FaceVerifier for FixedVerifier {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn verify(&self, request: &VerifyRequest) -> Result<Verification, VerifierError> {
            self.seen_enforce.lock().unwrap().push(request.enforce_detection);
            tokio::time::sleep(self.delay).await;
            self.verdict
                .clone()
                .map_err(|_| VerifierError::InvalidResponse("scripted failure".to_string()))
        }
    }

    fn images() -> (ReferenceImage, CandidateImage) {
        let reference = ReferenceImage {
            key: StorageKey::new(ArtifactKind::Reference, "jpg"),
            path: "ref.jpg".into(),
            size: 3,
        };
        let candidate = CandidateImage {
            key: StorageKey::new(ArtifactKind::Candidate, "jpg"),
            path: "cand.jpg".into(),
            size: 4,
        };
        (reference, candidate)
    }

    #[tokio::test]
    async fn test_verified_is_the_sole_basis() {
        let (reference, candidate) = images();

        // A large distance does not veto a positive verdict
        let verifier = Arc::new(FixedVerifier::returning(true, Some(9.0)));
        let engine = MatchEngine::new(verifier.clone(), Duration::from_secs(1));
        assert!(matches!(
            engine.compare(&reference, &candidate).await,
            Comparison::Matched { score: Some(s) } if s == 9.0
        ));
        assert_eq!(*verifier.seen_enforce.lock().unwrap(), vec![false]);

        let engine = MatchEngine::new(Arc::new(FixedVerifier::returning(false, Some(0.01))), Duration::from_secs(1));
        assert!(matches!(
            engine.compare(&reference, &candidate).await,
            Comparison::NotMatched { .. }
        ));
    }

    #[tokio::test]
    async fn test_verifier_error_is_contained() {
        let (reference, candidate) = images();
        let verifier = FixedVerifier {
            verdict: Err(()),
            ..FixedVerifier::returning(true, None)
        };
        let engine = MatchEngine::new(Arc::new(verifier), Duration::from_secs(1));

        assert!(matches!(
            engine.compare(&reference, &candidate).await,
            Comparison::VerifierError(VerifierError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_verifier_timeout() {
        let (reference, candidate) = images();
        let verifier = FixedVerifier {
            delay: Duration::from_secs(5),
            ..FixedVerifier::returning(true, None)
        };
        let engine = MatchEngine::new(Arc::new(verifier), Duration::from_millis(20));

        assert!(matches!(
            engine.compare(&reference, &candidate).await,
            Comparison::VerifierError(VerifierError::Timeout(_))
        ));
    }
}
