//! Serves stored photo bytes when the local backend is in use, so that the
//! public URLs it hands out resolve against this service.

use crate::{errors::AppError, services::photo_service::PhotoService};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

/// GET `/objects/{*key}`
pub async fn get_object(
    State(service): State<PhotoService>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    if !service.objects.serves_locally() {
        return Err(AppError::not_found("objects are served by the external store"));
    }

    let object = service.fetch_object(&key).await?;
    let length = object.bytes.len();

    let mut response = Response::new(Body::from(object.bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    Ok(response)
}
