//! Series, enrollment and roster handlers

use super::{validate, Services};
use crate::dto::{
    AddSessionsRequest, ApiResponse, CreateSeriesRequest, ForChildRequest, InviteStudentsRequest,
};
use actix_web::{web, HttpResponse};
use tracing::{info, instrument};
use tutora_auth::{AuthenticatedUser, TeacherUser};
use tutora_core::traits::Store;
use tutora_core::AppError;
use uuid::Uuid;

fn for_child(req: Option<web::Json<ForChildRequest>>) -> Option<Uuid> {
    req.and_then(|r| r.into_inner().for_child_id)
}

/// POST /api/v1/series
#[instrument(skip(services, teacher, req))]
pub async fn create_series<S: Store>(
    services: Services<S>,
    teacher: TeacherUser,
    req: web::Json<CreateSeriesRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req, "Series")?;

    let series = services
        .series
        .create_series(&teacher.caller(), req.into_inner().into_input()?)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(series)))
}

/// Series with roster counts
///
/// GET /api/v1/series/{id}
#[instrument(skip(services, _user))]
pub async fn get_series<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let summary = services.series.get_series(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(summary)))
}

/// GET /api/v1/series/{id}/sessions
#[instrument(skip(services, _user))]
pub async fn list_series_sessions<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let sessions = services.series.list_sessions(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(sessions)))
}

/// POST /api/v1/series/{id}/sessions
#[instrument(skip(services, teacher, req))]
pub async fn add_sessions<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
    req: web::Json<AddSessionsRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req, "Sessions")?;

    let sessions = services
        .series
        .add_sessions(&teacher.caller(), path.into_inner(), req.into_inner().starts)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(sessions)))
}

/// POST /api/v1/series/{id}/finalize
#[instrument(skip(services, teacher))]
pub async fn finalize_series<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let series = services
        .series
        .finalize(&teacher.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(series)))
}

/// GET /api/v1/series/{id}/enrollments
#[instrument(skip(services, user))]
pub async fn list_enrollments<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let enrollments = services
        .series
        .list_enrollments(&user.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(enrollments)))
}

/// POST /api/v1/series/{id}/invitations
#[instrument(skip(services, teacher, req))]
pub async fn invite_students<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
    req: web::Json<InviteStudentsRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req, "Invitation")?;

    let invited = services
        .series
        .invite(&teacher.caller(), path.into_inner(), req.into_inner().student_ids)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(invited)))
}

/// POST /api/v1/series/{id}/invitations/accept
#[instrument(skip(services, user, req))]
pub async fn accept_invitation<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
    req: Option<web::Json<ForChildRequest>>,
) -> Result<HttpResponse, AppError> {
    let acceptance = services
        .series
        .accept_invitation(&user.caller(), path.into_inner(), for_child(req))
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(acceptance)))
}

/// POST /api/v1/series/{id}/invitations/decline
#[instrument(skip(services, user, req))]
pub async fn decline_invitation<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
    req: Option<web::Json<ForChildRequest>>,
) -> Result<HttpResponse, AppError> {
    let enrollment = services
        .series
        .decline_invitation(&user.caller(), path.into_inner(), for_child(req))
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(enrollment)))
}

/// POST /api/v1/series/{id}/join-requests
#[instrument(skip(services, user, req))]
pub async fn request_to_join<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
    req: Option<web::Json<ForChildRequest>>,
) -> Result<HttpResponse, AppError> {
    let enrollment = services
        .series
        .request_to_join(&user.caller(), path.into_inner(), for_child(req))
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(enrollment)))
}

/// Accepting debits one star from the teacher's wallet
///
/// POST /api/v1/series/{id}/join-requests/{student_id}/accept
#[instrument(skip(services, teacher))]
pub async fn accept_request<S: Store>(
    services: Services<S>,
    path: web::Path<(Uuid, Uuid)>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let (series_id, student_id) = path.into_inner();
    let acceptance = services
        .series
        .accept_request(&teacher.caller(), series_id, student_id)
        .await?;

    info!(
        %series_id,
        %student_id,
        amount = %acceptance.deduction.amount,
        "Join request accepted via API"
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(acceptance)))
}

/// POST /api/v1/series/{id}/join-requests/{student_id}/decline
#[instrument(skip(services, teacher))]
pub async fn decline_request<S: Store>(
    services: Services<S>,
    path: web::Path<(Uuid, Uuid)>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let (series_id, student_id) = path.into_inner();
    let enrollment = services
        .series
        .decline_request(&teacher.caller(), series_id, student_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(enrollment)))
}

/// The removal always stands; the body reports what happened to the star
///
/// DELETE /api/v1/series/{id}/students/{student_id}
#[instrument(skip(services, teacher))]
pub async fn remove_student<S: Store>(
    services: Services<S>,
    path: web::Path<(Uuid, Uuid)>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let (series_id, student_id) = path.into_inner();
    let outcome = services
        .series
        .remove_student(&teacher.caller(), series_id, student_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
}

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/series")
            .route("", web::post().to(create_series::<S>))
            .route("/{id}", web::get().to(get_series::<S>))
            .route("/{id}/sessions", web::get().to(list_series_sessions::<S>))
            .route("/{id}/sessions", web::post().to(add_sessions::<S>))
            .route("/{id}/finalize", web::post().to(finalize_series::<S>))
            .route("/{id}/enrollments", web::get().to(list_enrollments::<S>))
            .route("/{id}/invitations", web::post().to(invite_students::<S>))
            .route("/{id}/invitations/accept", web::post().to(accept_invitation::<S>))
            .route("/{id}/invitations/decline", web::post().to(decline_invitation::<S>))
            .route("/{id}/join-requests", web::post().to(request_to_join::<S>))
            .route(
                "/{id}/join-requests/{student_id}/accept",
                web::post().to(accept_request::<S>),
            )
            .route(
                "/{id}/join-requests/{student_id}/decline",
                web::post().to(decline_request::<S>),
            )
            .route(
                "/{id}/students/{student_id}",
                web::delete().to(remove_student::<S>),
            ),
    );
}
