use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::Orchestrator;
use crate::models::{ErrorResponse, HealthResponse, RecognizeResponse, ReferenceUpload};

/// Multipart field carrying the reference image
pub const IMAGE_FIELD: &str = "imagem";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub max_upload_bytes: usize,
}

/// Configure all recognition routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/", web::get().to(home))
        .route("/health", web::get().to(health_check))
        .route("/reconhecer", web::post().to(recognize));
}

async fn home() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body("API no ar!")
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Recognition endpoint
///
/// POST /reconhecer
///
/// Multipart body with the reference photo in the `imagem` field.
/// Responds with the matched catalog events:
/// ```json
/// { "encontrado_em": [ { "id": 1, "foto_url": "...", ... } ] }
/// ```
async fn recognize(state: web::Data<AppState>, payload: Multipart) -> impl Responder {
    let upload = match read_reference(payload, state.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(e) => {
            tracing::info!("Rejected upload: {}", e);
            return HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string()));
        }
    };

    match state.orchestrator.run(upload).await {
        Ok(result) => HttpResponse::Ok().json(RecognizeResponse {
            encontrado_em: result.matched,
        }),
        Err(rejection) => {
            let status = StatusCode::from_u16(rejection.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status).json(ErrorResponse::new(rejection.to_string()))
        }
    }
}

/// Errors that can occur while reading the upload
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Imagem excede o limite de {0} bytes")]
    TooLarge(usize),
}

/// Pull the reference image out of the multipart body
///
/// A body that is not multipart, is cut short, or has no non-empty
/// `imagem` field yields `Ok(None)`; the orchestrator turns that into a
/// missing-input rejection. Other fields are drained and ignored.
pub async fn read_reference(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<Option<ReferenceUpload>, UploadError> {
    let mut upload = None;

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) => {
                tracing::debug!("Unreadable multipart body: {}", e);
                break;
            }
        };

        if upload.is_some() || field.name() != Some(IMAGE_FIELD) {
            while let Some(Ok(_)) = field.next().await {}
            continue;
        }

        let content_type = field.content_type().map(|mime| mime.essence_str().to_string());
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::debug!("Upload interrupted: {}", e);
                    return Ok(None);
                }
            };
            if bytes.len() + chunk.len() > max_bytes {
                return Err(UploadError::TooLarge(max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        if !bytes.is_empty() {
            upload = Some(ReferenceUpload {
                bytes,
                content_type,
                file_name,
            });
        }
    }

    Ok(upload)
}
