use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use facefind::config::Settings;
use facefind::routes::{self, recognize::AppState};
use facefind::services::{DeepFaceClient, TempStore};
use facefind::Orchestrator;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use validator::Validate;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

fn init_logging(level: &str, format: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Configuration comes first so that logging can honour it
    let settings = Settings::load();
    let (level, format) = match &settings {
        Ok(s) => (s.logging.level.clone(), s.logging.format.clone()),
        Err(_) => ("info".to_string(), "compact".to_string()),
    };
    init_logging(&level, &format);

    info!("Starting facefind recognition service...");

    let settings = settings.map_err(|e| startup_error("Failed to load configuration", e))?;
    settings
        .validate()
        .map_err(|e| startup_error("Invalid configuration", e))?;

    info!("Configuration loaded successfully");

    let store = Arc::new(
        TempStore::open(settings.storage.upload_dir.clone())
            .await
            .map_err(|e| startup_error("Failed to prepare upload directory", e))?,
    );

    info!("Temporary storage at {}", settings.storage.upload_dir.display());

    let verifier = Arc::new(
        DeepFaceClient::new(
            settings.verifier.endpoint.clone(),
            Duration::from_secs(settings.verifier.timeout_secs),
            settings.deepface_options(),
        )
        .map_err(|e| startup_error("Failed to create verifier client", e))?,
    );

    info!("Verifier client initialized ({})", settings.verifier.endpoint);

    let orchestrator = Orchestrator::new(settings.pipeline(), store, verifier)
        .map_err(|e| startup_error("Failed to create HTTP clients", e))?;

    info!(
        "Pipeline ready (catalog: {}, concurrency: {})",
        settings.catalog.endpoint, settings.download.concurrency
    );

    // Build application state
    let app_state = AppState {
        orchestrator: Arc::new(orchestrator),
        max_upload_bytes: settings.server.max_upload_bytes,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
