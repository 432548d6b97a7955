//! HTTP handlers for the `/photos` resource.
//! Multipart parsing and JSON shaping only; ordering and consistency rules
//! live in `PhotoService`.

use crate::{
    errors::AppError,
    models::photo::PhotoView,
    services::photo_service::{NewPhoto, PhotoError, PhotoService},
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Multipart field names accepted for the image payload.
const FILE_FIELDS: [&str; 2] = ["image", "file"];
/// Multipart field names accepted for the label.
const NAME_FIELDS: [&str; 2] = ["displayName", "name"];

/// Body for `PUT /photos/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePhotoReq {
    #[serde(alias = "name")]
    pub display_name: Option<String>,
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// POST `/photos` — multipart upload with an `image` file and optional `displayName`.
pub async fn create_photo(
    State(service): State<PhotoService>,
    mut multipart: Multipart,
) -> Result<Json<PhotoView>, AppError> {
    let mut upload: Option<NewPhoto> = None;
    let mut display_name = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if FILE_FIELDS.contains(&name.as_str()) {
            let original_filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let content = field.bytes().await.map_err(multipart_error)?;
            upload = Some(NewPhoto {
                content,
                content_type,
                original_filename,
                display_name: None,
            });
        } else if NAME_FIELDS.contains(&name.as_str()) {
            display_name = Some(field.text().await.map_err(multipart_error)?);
        } else {
            tracing::debug!(field = %name, "ignoring unknown multipart field");
        }
    }

    let mut upload = upload.ok_or(PhotoError::MissingFile)?;
    upload.display_name = display_name;

    let photo = service.create_photo(upload).await?;
    Ok(Json(photo))
}

/// GET `/photos` — every record with a freshly derived URL.
pub async fn list_photos(
    State(service): State<PhotoService>,
) -> Result<Json<Vec<PhotoView>>, AppError> {
    Ok(Json(service.list_photos().await?))
}

/// GET `/photos/{id}`
pub async fn get_photo(
    State(service): State<PhotoService>,
    Path(id): Path<i64>,
) -> Result<Json<PhotoView>, AppError> {
    Ok(Json(service.get_photo(id).await?))
}

/// PUT `/photos/{id}` — rename.
pub async fn rename_photo(
    State(service): State<PhotoService>,
    Path(id): Path<i64>,
    Json(payload): Json<RenamePhotoReq>,
) -> Result<Json<PhotoView>, AppError> {
    let name = payload
        .display_name
        .ok_or_else(|| AppError::bad_request("displayName is required"))?;
    Ok(Json(service.rename_photo(id, &name).await?))
}

/// DELETE `/photos/{id}`
pub async fn delete_photo(
    State(service): State<PhotoService>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    service.delete_photo(id).await?;
    Ok(Json(json!({ "message": "Deleted" })))
}
