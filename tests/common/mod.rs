//! Shared fixtures for pipeline and HTTP tests.
//!
//! The catalog and image hosts are served by a mockito server, storage
//! lives in a temporary directory, and face verification is scripted from
//! the candidate image's bytes.

#![allow(dead_code)]

use async_trait::async_trait;
use facefind::services::{FaceVerifier, TempStore, Verification, VerifierError, VerifyRequest};
use facefind::{Orchestrator, PipelineConfig, ReferenceUpload};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Candidate bytes the scripted verifier accepts as the reference person
pub const SAME_PERSON: &[u8] = b"same-person";
/// Candidate bytes the scripted verifier rejects
pub const SOMEONE_ELSE: &[u8] = b"someone-else";
/// Candidate bytes that make the scripted verifier return an error
pub const BROKEN: &[u8] = b"broken";
/// Candidate bytes that make the scripted verifier panic
pub const PANIC: &[u8] = b"panic";

/// Verifier whose verdict depends only on the candidate image content
///
/// Both images are read from storage on every call, so a candidate that
/// was not actually written fails the comparison.
#[derive(Default)]
pub struct ScriptedVerifier {
    calls: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedVerifier {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FaceVerifier for ScriptedVerifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<Verification, VerifierError> {
        assert!(!request.enforce_detection, "face detection must not be enforced");

        let read = |path: &std::path::Path| {
            std::fs::read(path).map_err(|source| VerifierError::Input {
                path: path.to_path_buf(),
                source,
            })
        };
        read(request.reference.as_path())?;
        let candidate = read(request.candidate.as_path())?;
        self.calls.lock().unwrap().push(candidate.clone());

        match candidate.as_slice() {
            SAME_PERSON => Ok(Verification {
                verified: true,
                distance: Some(0.21),
                threshold: Some(0.4),
                model: Some("scripted".to_string()),
            }),
            BROKEN => Err(VerifierError::InvalidResponse("scripted failure".to_string())),
            PANIC => panic!("scripted verifier panic"),
            _ => Ok(Verification {
                verified: false,
                distance: Some(0.87),
                threshold: Some(0.4),
                model: Some("scripted".to_string()),
            }),
        }
    }
}

/// Mock hosts, storage root and verifier for one test
pub struct Fixture {
    pub server: mockito::ServerGuard,
    pub storage: TempDir,
    pub verifier: Arc<ScriptedVerifier>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self {
            server: mockito::Server::new_async().await,
            storage: tempfile::tempdir().unwrap(),
            verifier: Arc::new(ScriptedVerifier::default()),
        }
    }

    pub fn catalog_endpoint(&self) -> String {
        format!("{}/wp-json/meus/v1/eventos", self.server.url())
    }

    pub fn photo_url(&self, name: &str) -> String {
        format!("{}/fotos/{}", self.server.url(), name)
    }

    /// Serve `records` as the catalog
    pub async fn serve_catalog(&mut self, records: &Value) -> mockito::Mock {
        self.server
            .mock("GET", "/wp-json/meus/v1/eventos")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(records.to_string())
            .create_async()
            .await
    }

    /// Serve raw `body` as the catalog
    pub async fn serve_raw_catalog(&mut self, status: usize, body: &str) -> mockito::Mock {
        self.server
            .mock("GET", "/wp-json/meus/v1/eventos")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }

    /// Serve `bytes` as the photo `name`
    pub async fn serve_photo(&mut self, name: &str, bytes: &[u8]) -> mockito::Mock {
        self.server
            .mock("GET", format!("/fotos/{}", name).as_str())
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(bytes)
            .create_async()
            .await
    }

    pub async fn serve_missing_photo(&mut self, name: &str) -> mockito::Mock {
        self.server
            .mock("GET", format!("/fotos/{}", name).as_str())
            .with_status(404)
            .create_async()
            .await
    }

    /// Expect no photo download at all
    pub async fn forbid_photo_downloads(&mut self) -> mockito::Mock {
        self.server
            .mock("GET", mockito::Matcher::Regex(r"^/fotos/".to_string()))
            .expect(0)
            .create_async()
            .await
    }

    pub fn config(&self, catalog_endpoint: String) -> PipelineConfig {
        PipelineConfig {
            catalog_endpoint,
            catalog_timeout: Duration::from_millis(500),
            catalog_max_bytes: 1024 * 1024,
            download_timeout: Duration::from_secs(5),
            max_image_bytes: 1024 * 1024,
            verify_timeout: Duration::from_secs(5),
            concurrency: 1,
        }
    }

    pub async fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(self.config(self.catalog_endpoint())).await
    }

    pub async fn orchestrator_with(&self, config: PipelineConfig) -> Orchestrator {
        let store = Arc::new(TempStore::open(self.storage.path()).await.unwrap());
        Orchestrator::new(config, store, self.verifier.clone()).unwrap()
    }

    /// Orchestrator whose storage root vanished after startup
    pub async fn orchestrator_without_storage(&self) -> Orchestrator {
        let root = self.storage.path().join("gone");
        let store = Arc::new(TempStore::open(&root).await.unwrap());
        std::fs::remove_dir(&root).unwrap();
        Orchestrator::new(self.config(self.catalog_endpoint()), store, self.verifier.clone()).unwrap()
    }

    /// Expect the catalog never to be requested
    pub async fn forbid_catalog(&mut self) -> mockito::Mock {
        self.server
            .mock("GET", "/wp-json/meus/v1/eventos")
            .expect(0)
            .create_async()
            .await
    }

    /// Number of files still present in the storage root
    pub fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.storage.path()).unwrap().count()
    }
}

pub fn upload(bytes: &[u8]) -> Option<ReferenceUpload> {
    Some(ReferenceUpload {
        bytes: bytes.to_vec(),
        content_type: Some("image/jpeg".to_string()),
        file_name: Some("../../etc/passwd.jpg".to_string()),
    })
}

/// Endpoint that accepts connections and never answers
pub fn hanging_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    format!("http://{}/wp-json/meus/v1/eventos", addr)
}

/// Endpoint on a port nobody listens on
pub fn unreachable_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/wp-json/meus/v1/eventos", addr)
}
