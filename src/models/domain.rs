use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// What a temporary artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Reference,
    Candidate,
}

impl ArtifactKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Reference => "ref",
            ArtifactKind::Candidate => "cand",
        }
    }
}

/// Unique name of one file in temporary storage
///
/// The name is built from a random UUID and a sanitised extension, never
/// from an uploaded filename or a URL segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub kind: ArtifactKind,
    pub id: Uuid,
    pub extension: String,
}

impl StorageKey {
    pub fn new(kind: ArtifactKind, extension: impl Into<String>) -> Self {
        Self {
            kind,
            id: Uuid::new_v4(),
            extension: extension.into(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}.{}", self.kind.prefix(), self.id.simple(), self.extension)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Probe image as received from the client, before it is stored
#[derive(Debug, Clone)]
pub struct ReferenceUpload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Client-supplied filename. Only its extension is ever consulted.
    pub file_name: Option<String>,
}

/// Probe image once persisted for the current request
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub key: StorageKey,
    pub path: PathBuf,
    pub size: usize,
}

/// Downloaded photo of one catalog record
#[derive(Debug, Clone)]
pub struct CandidateImage {
    pub key: StorageKey,
    pub path: PathBuf,
    pub size: usize,
}

/// One entry of the event catalog
///
/// The record keeps every field it was fetched with so that a matched
/// record is returned to the caller exactly as the catalog produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord(Map<String, Value>);

impl EventRecord {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Identifier as text, whether the catalog sends it as a string or a number
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        ["titulo", "title", "nome"]
            .iter()
            .find_map(|field| self.0.get(*field).and_then(Value::as_str))
    }

    /// Photo URL, if the record carries a non-empty string under `foto_url`
    ///
    /// Anything else (absent, `null`, `false`, blank) counts as no photo.
    pub fn photo_url(&self) -> Option<&str> {
        self.0
            .get("foto_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Short human-readable name for log lines
    pub fn label(&self) -> String {
        match (self.id(), self.title()) {
            (Some(id), Some(title)) => format!("{} ({})", id, title),
            (Some(id), None) => id,
            (None, Some(title)) => title.to_string(),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

/// Why a record was left out without being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingUrl,
    MalformedUrl,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingUrl => "missing-url",
            SkipReason::MalformedUrl => "malformed-url",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why evaluating a record failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("download failed: {0}")]
    Download(String),

    #[error("storage failed: {0}")]
    Storage(String),

    #[error("stored image could not be confirmed: {0}")]
    Integrity(String),

    #[error("verifier failed: {0}")]
    Verifier(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Result of evaluating one catalog record against the reference
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched { record: EventRecord, score: Option<f64> },
    NotMatched { record: EventRecord, score: Option<f64> },
    Skipped { record: EventRecord, reason: SkipReason },
    Failed { record: EventRecord, cause: FailureCause },
}

/// Per-outcome counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub matched: usize,
    pub not_matched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Matched records of one batch, in catalog order
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub matched: Vec<EventRecord>,
    pub summary: OutcomeSummary,
}

impl BatchResult {
    /// Fold one outcome into the result; only `Matched` keeps its record.
    ///
    /// Outcomes must be pushed in catalog order.
    pub fn push(&mut self, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::Matched { record, .. } => {
                self.summary.matched += 1;
                self.matched.push(record);
            }
            MatchOutcome::NotMatched { .. } => self.summary.not_matched += 1,
            MatchOutcome::Skipped { .. } => self.summary.skipped += 1,
            MatchOutcome::Failed { .. } => self.summary.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.summary.matched + self.summary.not_matched + self.summary.skipped + self.summary.failed
    }
}

impl Extend<MatchOutcome> for BatchResult {
    fn extend<I: IntoIterator<Item = MatchOutcome>>(&mut self, iter: I) {
        for outcome in iter {
            self.push(outcome);
        }
    }
}

impl FromIterator<MatchOutcome> for BatchResult {
    fn from_iter<I: IntoIterator<Item = MatchOutcome>>(iter: I) -> Self {
        let mut result = BatchResult::default();
        result.extend(iter);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> EventRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_storage_key_file_name() {
        let key = StorageKey::new(ArtifactKind::Candidate, "png");
        let name = key.file_name();

        assert!(name.starts_with("cand-"));
        assert!(name.ends_with(".png"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_storage_keys_are_unique() {
        let a = StorageKey::new(ArtifactKind::Reference, "jpg");
        let b = StorageKey::new(ArtifactKind::Reference, "jpg");
        assert_ne!(a.file_name(), b.file_name());
    }

    #[test]
    fn test_photo_url_variants() {
        assert_eq!(
            record(json!({"foto_url": " https://x.test/a.jpg "})).photo_url(),
            Some("https://x.test/a.jpg")
        );
        assert_eq!(record(json!({"foto_url": ""})).photo_url(), None);
        assert_eq!(record(json!({"foto_url": false})).photo_url(), None);
        assert_eq!(record(json!({"foto_url": null})).photo_url(), None);
        assert_eq!(record(json!({"id": 3})).photo_url(), None);
    }

    #[test]
    fn test_record_passthrough() {
        let raw = json!({"id": 7, "titulo": "Show", "foto_url": "https://x.test/a.jpg", "extra": {"k": [1, 2]}});
        let rec = record(raw.clone());

        assert_eq!(rec.id().as_deref(), Some("7"));
        assert_eq!(rec.title(), Some("Show"));
        assert_eq!(serde_json::to_value(&rec).unwrap(), raw);
    }

    #[test]
    fn test_batch_result_keeps_only_matches_in_order() {
        let r1 = record(json!({"id": 1}));
        let r2 = record(json!({"id": 2}));
        let r3 = record(json!({"id": 3}));

        let result: BatchResult = vec![
            MatchOutcome::Matched { record: r1.clone(), score: Some(0.2) },
            MatchOutcome::Failed { record: r2, cause: FailureCause::Download("404".into()) },
            MatchOutcome::Matched { record: r3.clone(), score: None },
        ]
        .into_iter()
        .collect();

        assert_eq!(result.matched, vec![r1, r3]);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.total(), 3);
    }
}
