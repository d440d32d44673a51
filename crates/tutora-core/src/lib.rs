//! Tutora Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Tutora tutoring marketplace backend. It includes:
//!
//! - Domain models (bookings, series, sessions, enrollments, wallets)
//! - Storage traits covering one database transaction
//! - Collaborator traits (identity lookups, video rooms, notifications)
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
