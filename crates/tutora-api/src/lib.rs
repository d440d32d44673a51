//! HTTP API layer for Tutora
//!
//! actix-web handlers over [`tutora_services::AppServices`]. Callers are
//! identified by bearer tokens (see `tutora-auth`); every domain error maps
//! to a status code through `AppError`'s `ResponseError` impl.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::{configure, health_check, Services};
