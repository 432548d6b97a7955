pub mod id_allocator;
pub mod object_store;
pub mod photo_repository;
pub mod photo_service;
pub mod s3_store;
