//! Bearer token authentication for Tutora
//!
//! Tokens are issued elsewhere; this crate verifies them (HS256) and turns
//! them into the [`Caller`](tutora_core::models::Caller) that services
//! authorize against.
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use tutora_auth::TeacherUser;
//!
//! async fn teacher_only(user: TeacherUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({ "teacher_id": user.user_id }))
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AdminUser, AuthenticatedUser, TeacherUser};
