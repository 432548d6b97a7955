//! Represents a photo's metadata record and its client-facing view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Label used when an upload carries no display name.
pub const UNTITLED: &str = "Untitled";

/// A stored photo's metadata.
///
/// The binary content lives in the object store under `storage_key`; this row
/// only points at it. The public URL is never stored here.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct PhotoRecord {
    /// Counter-assigned identifier, strictly increasing and immutable.
    pub id: i64,

    /// Key of the content in the object store (random token + extension).
    pub storage_key: String,

    /// User-supplied label. The only mutable field.
    pub display_name: String,

    /// MIME type recorded at upload.
    pub content_type: String,

    /// Size of the stored content in bytes.
    pub size_bytes: i64,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// JSON body returned for a photo: `{id, displayName, url, createdAt}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoView {
    pub id: i64,
    pub display_name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl PhotoView {
    pub fn new(record: &PhotoRecord, url: String) -> Self {
        Self {
            id: record.id,
            display_name: record.display_name.clone(),
            url,
            created_at: record.created_at,
        }
    }
}

/// Normalize an optional label, falling back to [`UNTITLED`] when blank.
pub fn display_name_or_default(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNTITLED.to_string(),
    }
}
