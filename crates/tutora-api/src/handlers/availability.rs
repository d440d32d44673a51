//! Availability and slot check handlers

use super::{validate, Services};
use crate::dto::{ApiResponse, SetAvailabilityRequest, SlotCheckParams};
use actix_web::{web, HttpResponse};
use tracing::{debug, instrument};
use tutora_auth::{AuthenticatedUser, TeacherUser};
use tutora_core::traits::Store;
use tutora_core::AppError;
use uuid::Uuid;

/// Replace the caller's weekly windows
///
/// PUT /api/v1/availability
#[instrument(skip(services, teacher, req))]
pub async fn set_availability<S: Store>(
    services: Services<S>,
    teacher: TeacherUser,
    req: web::Json<SetAvailabilityRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req, "Availability")?;

    let slots = services
        .availability
        .set(&teacher.caller(), req.into_inner().slots)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(slots)))
}

/// GET /api/v1/teachers/{id}/availability
#[instrument(skip(services, _user))]
pub async fn list_availability<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let slots = services.availability.list(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(slots)))
}

/// Advisory check; a taken slot is a 200 with `ok: false`
///
/// GET /api/v1/teachers/{id}/slot-check
#[instrument(skip(services, _user, query))]
pub async fn check_slot<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    query: web::Query<SlotCheckParams>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    validate(&*query, "Slot check")?;
    let teacher_id = path.into_inner();
    debug!(%teacher_id, date = %query.date, "Checking slot");

    let check = services
        .conflicts
        .check(
            teacher_id,
            &query.date,
            query.session_type,
            &query.start_time,
            &query.end_time,
        )
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(check)))
}

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/availability", web::put().to(set_availability::<S>))
        .service(
            web::scope("/teachers/{id}")
                .route("/availability", web::get().to(list_availability::<S>))
                .route("/slot-check", web::get().to(check_slot::<S>)),
        );
}
