// Core pipeline exports
pub mod engine;
pub mod orchestrator;
pub mod resolver;

pub use engine::{Comparison, MatchEngine};
pub use orchestrator::{Orchestrator, PipelineConfig, Rejection, MISSING_INPUT_MESSAGE};
pub use resolver::{parse_photo_url, CandidateResolver, DownloadError, Resolution};
