//! Defines routes for the file hosting service.
//!
//! ## Structure
//! - `GET    /`              — listing page with fresh signed download links
//! - `POST   /upload`        — multipart upload (body capped at 16 MiB)
//! - `POST   /delete/{id}`   — delete one file and its metadata
//! - `GET    /download/{key}` — signed download, verified before streaming
//! - `GET    /healthz`, `GET /readyz` — probes
//!
//! The router carries shared state (`FileService`) to all handlers.

use crate::{
    handlers::{
        file_handlers::{delete_file, download, index, upload},
        health_handlers::{healthz, readyz},
    },
    services::file_service::FileService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Hard cap on upload request bodies. Oversized requests are rejected by
/// the extractor before the upload workflow runs.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Build and return the router for all routes.
pub fn routes() -> Router<FileService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // UI and file lifecycle
        .route("/", get(index))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/delete/{id}", post(delete_file))
        .route("/download/{key}", get(download))
}
