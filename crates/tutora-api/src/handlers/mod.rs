//! HTTP request handlers
//!
//! Every handler is generic over the [`Store`] so the same routes serve
//! PostgreSQL in production and the in-memory store in tests.

pub mod availability;
pub mod bookings;
pub mod series;
pub mod sessions;
pub mod wallet;

use actix_web::{web, HttpResponse};
use tracing::warn;
use tutora_core::traits::Store;
use tutora_core::AppError;
use tutora_services::AppServices;
use validator::Validate;

/// Shared service bundle as actix app data
pub type Services<S> = web::Data<AppServices<S>>;

/// Run `validator` rules, mapping failures to a 400
pub(crate) fn validate<T: Validate>(value: &T, what: &str) -> Result<(), AppError> {
    value.validate().map_err(|e| {
        warn!("{} validation failed: {}", what, e);
        AppError::Validation(e.to_string())
    })
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "tutora-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Mount every route under `/api/v1`
pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(availability::configure::<S>)
            .configure(bookings::configure::<S>)
            .configure(series::configure::<S>)
            .configure(sessions::configure::<S>)
            .configure(wallet::configure::<S>),
    );
}
