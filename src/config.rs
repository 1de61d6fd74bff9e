use crate::core::PipelineConfig;
use crate::services::verifier::DeepFaceOptions;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    #[serde(default)]
    #[validate(nested)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    #[validate(nested)]
    pub download: DownloadSettings,
    #[serde(default)]
    #[validate(nested)]
    pub verifier: VerifierSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
    #[serde(default = "default_max_upload_bytes")]
    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CatalogSettings {
    #[serde(default = "default_catalog_endpoint")]
    #[validate(url)]
    pub endpoint: String,
    #[serde(default = "default_catalog_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    #[serde(default = "default_catalog_max_bytes")]
    #[validate(range(min = 1))]
    pub max_bytes: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            endpoint: default_catalog_endpoint(),
            timeout_secs: default_catalog_timeout(),
            max_bytes: default_catalog_max_bytes(),
        }
    }
}

fn default_catalog_endpoint() -> String {
    "https://dev-ab2l.pantheonsite.io/wp-json/meus/v1/eventos".to_string()
}
fn default_catalog_timeout() -> u64 { 15 }
fn default_catalog_max_bytes() -> usize { 5 * 1024 * 1024 }

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DownloadSettings {
    #[serde(default = "default_download_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    #[serde(default = "default_max_image_bytes")]
    #[validate(range(min = 1))]
    pub max_image_bytes: usize,
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 32))]
    pub concurrency: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout(),
            max_image_bytes: default_max_image_bytes(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_download_timeout() -> u64 { 20 }
fn default_max_image_bytes() -> usize { 10 * 1024 * 1024 }
fn default_concurrency() -> usize { 1 }

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifierSettings {
    #[serde(default = "default_verifier_endpoint")]
    #[validate(url)]
    pub endpoint: String,
    #[serde(default = "default_verifier_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    pub model_name: Option<String>,
    pub detector_backend: Option<String>,
    pub distance_metric: Option<String>,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            endpoint: default_verifier_endpoint(),
            timeout_secs: default_verifier_timeout(),
            model_name: None,
            detector_backend: None,
            distance_metric: None,
        }
    }
}

fn default_verifier_endpoint() -> String { "http://127.0.0.1:5005".to_string() }
fn default_verifier_timeout() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { upload_dir: default_upload_dir() }
    }
}

fn default_upload_dir() -> PathBuf { PathBuf::from("uploads") }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with FACEFIND__)
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., FACEFIND__CATALOG__ENDPOINT -> catalog.endpoint
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Pipeline view of the settings, handed to the orchestrator
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            catalog_endpoint: self.catalog.endpoint.clone(),
            catalog_timeout: Duration::from_secs(self.catalog.timeout_secs),
            catalog_max_bytes: self.catalog.max_bytes,
            download_timeout: Duration::from_secs(self.download.timeout_secs),
            max_image_bytes: self.download.max_image_bytes,
            verify_timeout: Duration::from_secs(self.verifier.timeout_secs),
            concurrency: self.download.concurrency,
        }
    }

    pub fn deepface_options(&self) -> DeepFaceOptions {
        DeepFaceOptions {
            model_name: self.verifier.model_name.clone(),
            detector_backend: self.verifier.detector_backend.clone(),
            distance_metric: self.verifier.distance_metric.clone(),
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("FACEFIND")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
