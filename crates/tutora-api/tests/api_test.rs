//! HTTP-level tests over the in-memory store

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tutora_api::configure;
use tutora_auth::{Claims, JwtService};
use tutora_core::models::UserRole;
use tutora_core::traits::SystemClock;
use tutora_core::AppConfig;
use tutora_db::{MemoryDirectory, MemoryNotificationSink, MemoryStore};
use tutora_services::{AppServices, LocalRoomProvider};
use uuid::Uuid;

const SECRET: &str = "api-test-secret";

fn services() -> AppServices<MemoryStore> {
    let config: AppConfig = serde_json::from_value(json!({
        "server": {},
        "database": { "url": "postgres://localhost/tutora_test" },
        "auth": { "jwt_secret": SECRET }
    }))
    .unwrap();

    AppServices::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryDirectory::new()),
        Arc::new(MemoryNotificationSink::new()),
        Arc::new(LocalRoomProvider::new()),
        Arc::new(SystemClock),
        &config,
    )
    .unwrap()
}

fn bearer(jwt: &JwtService, id: Uuid, role: UserRole) -> (&'static str, String) {
    let token = jwt.create_token(&Claims::new(id, role)).unwrap();
    ("Authorization", format!("Bearer {}", token))
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

macro_rules! app {
    ($jwt:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($jwt.clone()))
                .app_data(web::Data::new(services()))
                .configure(configure::<MemoryStore>),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_health_check() {
    let jwt = Arc::new(JwtService::new(SECRET, 3600));
    let app = app!(jwt);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
}

#[actix_rt::test]
async fn test_missing_token_is_rejected() {
    let jwt = Arc::new(JwtService::new(SECRET, 3600));
    let app = app!(jwt);

    let req = test::TestRequest::get().uri("/api/v1/wallet").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_student_cannot_open_wallet() {
    let jwt = Arc::new(JwtService::new(SECRET, 3600));
    let app = app!(jwt);

    let req = test::TestRequest::get()
        .uri("/api/v1/wallet")
        .insert_header(bearer(&jwt, Uuid::new_v4(), UserRole::Student))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");
}

#[actix_rt::test]
async fn test_invalid_availability_is_400() {
    let jwt = Arc::new(JwtService::new(SECRET, 3600));
    let app = app!(jwt);

    let req = test::TestRequest::put()
        .uri("/api/v1/availability")
        .insert_header(bearer(&jwt, Uuid::new_v4(), UserRole::Teacher))
        .set_json(json!({
            "slots": [{ "day_of_week": 1, "start_time": "14:00", "end_time": "09:00" }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_individual_booking_flow() {
    let jwt = Arc::new(JwtService::new(SECRET, 3600));
    let app = app!(jwt);

    let teacher = Uuid::new_v4();
    let student = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let req = test::TestRequest::put()
        .uri("/api/v1/availability")
        .insert_header(bearer(&jwt, teacher, UserRole::Teacher))
        .set_json(json!({
            "slots": [{ "day_of_week": 1, "start_time": "09:00", "end_time": "17:00" }]
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    // 2030-01-07 is a Monday
    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/teachers/{}/slot-check?date=2030-01-07&start_time=10:00&end_time=11:00",
            teacher
        ))
        .insert_header(bearer(&jwt, student, UserRole::Student))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["ok"], true);

    let req = test::TestRequest::post()
        .uri("/api/v1/bookings")
        .insert_header(bearer(&jwt, student, UserRole::Student))
        .set_json(json!({
            "teacher_id": teacher,
            "session_type": "individual",
            "requested_date": "2030-01-07",
            "start_time": "10:00",
            "end_time": "11:00"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let booking_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "pending");

    // No stars yet
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/bookings/{}/accept", booking_id))
        .insert_header(bearer(&jwt, teacher, UserRole::Teacher))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);

    let req = test::TestRequest::post()
        .uri("/api/v1/wallet/purchases")
        .insert_header(bearer(&jwt, teacher, UserRole::Teacher))
        .set_json(json!({ "amount": "1000", "payment_reference": "CCP-7781" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let purchase_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/admin/purchases/{}/review", purchase_id))
        .insert_header(bearer(&jwt, admin, UserRole::Admin))
        .set_json(json!({ "approve": true }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/bookings/{}/accept", booking_id))
        .insert_header(bearer(&jwt, teacher, UserRole::Teacher))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["booking"]["status"], "accepted");
    assert_eq!(body["data"]["merged"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/wallet")
        .insert_header(bearer(&jwt, teacher, UserRole::Teacher))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(decimal(&body["data"]["balance"]), dec!(900));

    // Accepting twice is a state conflict
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/bookings/{}/accept", booking_id))
        .insert_header(bearer(&jwt, teacher, UserRole::Teacher))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::CONFLICT
    );
}
