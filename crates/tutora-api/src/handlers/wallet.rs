//! Star wallet handlers

use super::{validate, Services};
use crate::dto::{ApiResponse, BuyCreditsRequest, ReviewPurchaseRequest, WalletHistoryParams};
use actix_web::{web, HttpResponse};
use tracing::{info, instrument};
use tutora_auth::{AdminUser, TeacherUser};
use tutora_core::traits::Store;
use tutora_core::AppError;
use uuid::Uuid;

/// GET /api/v1/wallet
#[instrument(skip(services, teacher))]
pub async fn get_wallet<S: Store>(
    services: Services<S>,
    teacher: TeacherUser,
) -> Result<HttpResponse, AppError> {
    let wallet = services.ledger.wallet(&teacher.caller()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(wallet)))
}

/// GET /api/v1/wallet/transactions
#[instrument(skip(services, teacher, query))]
pub async fn wallet_history<S: Store>(
    services: Services<S>,
    teacher: TeacherUser,
    query: web::Query<WalletHistoryParams>,
) -> Result<HttpResponse, AppError> {
    validate(&*query, "Pagination")?;

    let page = services
        .ledger
        .history(&teacher.caller(), &query.to_pagination())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Records a pending purchase for admin review
///
/// POST /api/v1/wallet/purchases
#[instrument(skip(services, teacher, req))]
pub async fn buy_credits<S: Store>(
    services: Services<S>,
    teacher: TeacherUser,
    req: web::Json<BuyCreditsRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req, "Purchase")?;
    let amount = req.checked_amount()?;

    let purchase = services
        .ledger
        .buy_credits(&teacher.caller(), amount, req.into_inner().payment_reference)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        purchase,
        "Purchase recorded, awaiting review",
    )))
}

/// GET /api/v1/admin/purchases
#[instrument(skip(services, admin))]
pub async fn pending_purchases<S: Store>(
    services: Services<S>,
    admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    let pending = services.ledger.pending_purchases(&admin.caller()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(pending)))
}

/// POST /api/v1/admin/purchases/{id}/review
#[instrument(skip(services, admin, req))]
pub async fn review_purchase<S: Store>(
    services: Services<S>,
    path: web::Path<Uuid>,
    admin: AdminUser,
    req: web::Json<ReviewPurchaseRequest>,
) -> Result<HttpResponse, AppError> {
    let transaction_id = path.into_inner();
    let reviewed = services
        .ledger
        .review_purchase(&admin.caller(), transaction_id, req.approve)
        .await?;

    info!(
        %transaction_id,
        admin_id = %admin.user_id,
        approve = req.approve,
        "Purchase reviewed"
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(reviewed)))
}

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/wallet")
            .route("", web::get().to(get_wallet::<S>))
            .route("/transactions", web::get().to(wallet_history::<S>))
            .route("/purchases", web::post().to(buy_credits::<S>)),
    )
    .service(
        web::scope("/admin/purchases")
            .route("", web::get().to(pending_purchases::<S>))
            .route("/{id}/review", web::post().to(review_purchase::<S>)),
    );
}
