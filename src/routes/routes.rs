//! Defines routes for the photo API.
//!
//! ## Structure
//! - **Photo endpoints**
//!   - `POST   /photos`      — multipart upload (`image` + optional `displayName`)
//!   - `GET    /photos`      — list every photo
//!   - `GET    /photos/{id}` — fetch one photo
//!   - `PUT    /photos/{id}` — rename (`{"displayName": "..."}`)
//!   - `DELETE /photos/{id}` — delete object, then record
//!
//! - **Object endpoint** (local backend only)
//!   - `GET    /objects/{*key}` — stored bytes behind a public URL
//!
//! CORS is wide open (`*`) and every request gets a tracing span.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::get_object,
        photo_handlers::{create_photo, delete_photo, get_photo, list_photos, rename_photo},
    },
    services::photo_service::PhotoService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build and return the router for all photo routes.
///
/// The router carries shared state (`PhotoService`) to all handlers.
pub fn routes(max_upload_bytes: usize) -> Router<PhotoService> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/photos",
            get(list_photos)
                .post(create_photo)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/photos/{id}",
            get(get_photo).put(rename_photo).delete(delete_photo),
        )
        .route("/objects/{*key}", get(get_object))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
