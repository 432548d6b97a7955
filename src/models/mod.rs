//! Core data models for the photo service.
//!
//! `PhotoRecord` maps to the `photos` table via `sqlx::FromRow`; `PhotoView`
//! is the JSON shape returned to clients.

pub mod photo;
