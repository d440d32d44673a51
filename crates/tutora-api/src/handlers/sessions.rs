//! Session lifecycle and join handlers

use super::Services;
use crate::dto::ApiResponse;
use actix_web::{web, HttpResponse};
use tracing::instrument;
use tutora_auth::{AuthenticatedUser, TeacherUser};
use tutora_core::traits::Store;
use tutora_core::AppError;
use uuid::Uuid;

/// GET /api/v1/sessions/{id}
#[instrument(skip(services, user))]
pub async fn get_session<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let view = services
        .sessions
        .get_session(&user.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(view)))
}

/// POST /api/v1/sessions/{id}/start
#[instrument(skip(services, teacher))]
pub async fn start_session<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let session = services
        .sessions
        .start_session(&teacher.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// POST /api/v1/sessions/{id}/complete
#[instrument(skip(services, teacher))]
pub async fn complete_session<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let session = services
        .sessions
        .complete_session(&teacher.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// POST /api/v1/sessions/{id}/cancel
#[instrument(skip(services, teacher))]
pub async fn cancel_session<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let session = services
        .sessions
        .cancel_session(&teacher.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// Room id and join token; a 502 means the provider failed and the join
/// can be retried
///
/// POST /api/v1/sessions/{id}/join
#[instrument(skip(services, user))]
pub async fn join_session<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let ticket = services
        .sessions
        .join_session(&user.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ticket)))
}

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sessions")
            .route("/{id}", web::get().to(get_session::<S>))
            .route("/{id}/start", web::post().to(start_session::<S>))
            .route("/{id}/complete", web::post().to(complete_session::<S>))
            .route("/{id}/cancel", web::post().to(cancel_session::<S>))
            .route("/{id}/join", web::post().to(join_session::<S>)),
    );
}
