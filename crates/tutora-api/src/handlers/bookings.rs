//! Booking request handlers

use super::{validate, Services};
use crate::dto::{
    AcceptBookingRequest, ApiResponse, BookingListParams, CreateBookingRequest,
    DeclineBookingRequest,
};
use actix_web::{web, HttpResponse};
use tracing::{info, instrument};
use tutora_auth::{AuthenticatedUser, TeacherUser};
use tutora_core::traits::Store;
use tutora_core::AppError;
use uuid::Uuid;

/// POST /api/v1/bookings
#[instrument(skip(services, user, req))]
pub async fn create_booking<S: Store>(
    services: Services<S>,
    user: AuthenticatedUser,
    req: web::Json<CreateBookingRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req, "Booking")?;

    let booking = services
        .bookings
        .create(&user.caller(), req.into_inner().into())
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(booking)))
}

/// Teacher inbox or student history depending on the caller
///
/// GET /api/v1/bookings
#[instrument(skip(services, user, query))]
pub async fn list_bookings<S: Store>(
    services: Services<S>,
    user: AuthenticatedUser,
    query: web::Query<BookingListParams>,
) -> Result<HttpResponse, AppError> {
    validate(&*query, "Booking filters")?;

    let page = services
        .bookings
        .list(&user.caller(), query.query(), &query.pagination.to_pagination())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/v1/bookings/{id}
#[instrument(skip(services, user))]
pub async fn get_booking<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let booking = services.bookings.get(&user.caller(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

/// The body is optional; an empty accept merges or creates a series
///
/// POST /api/v1/bookings/{id}/accept
#[instrument(skip(services, teacher, req))]
pub async fn accept_booking<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
    req: Option<web::Json<AcceptBookingRequest>>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    validate(&req, "Booking acceptance")?;

    let booking_id = path.into_inner();
    let acceptance = services
        .bookings
        .accept(&teacher.caller(), booking_id, req.into_input()?)
        .await?;

    info!(
        %booking_id,
        session_id = %acceptance.session_id,
        merged = acceptance.merged,
        "Booking accepted via API"
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(acceptance)))
}

/// POST /api/v1/bookings/{id}/decline
#[instrument(skip(services, teacher, req))]
pub async fn decline_booking<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    teacher: TeacherUser,
    req: web::Json<DeclineBookingRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req, "Booking decline")?;

    let booking = services
        .bookings
        .decline(&teacher.caller(), path.into_inner(), &req.reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

/// Student or booking parent withdraws a pending request
///
/// POST /api/v1/bookings/{id}/cancel
#[instrument(skip(services, user))]
pub async fn cancel_booking<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let booking = services
        .bookings
        .cancel(&user.caller(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .route("", web::post().to(create_booking::<S>))
            .route("", web::get().to(list_bookings::<S>))
            .route("/{id}", web::get().to(get_booking::<S>))
            .route("/{id}/accept", web::post().to(accept_booking::<S>))
            .route("/{id}/decline", web::post().to(decline_booking::<S>))
            .route("/{id}/cancel", web::post().to(cancel_booking::<S>)),
    );
}
