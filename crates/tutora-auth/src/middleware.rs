//! Actix-web request extractors
//!
//! Handlers take an extractor and hand `caller()` to the services, which do
//! all ownership checks. The role-specific extractors only short-circuit
//! routes that are reserved to one role.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use std::sync::Arc;
use tracing::{debug, warn};
use tutora_core::error::AppError;
use tutora_core::models::{Caller, UserRole};
use uuid::Uuid;

/// Bearer token from the Authorization header
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Authenticated user extractor
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use tutora_auth::AuthenticatedUser;
///
/// async fn whoami(user: AuthenticatedUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({
///         "user_id": user.user_id,
///         "role": user.role
///     }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn caller(&self) -> Caller {
        self.claims.caller()
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let jwt_service = match req.app_data::<web::Data<Arc<JwtService>>>() {
            Some(service) => service.get_ref().clone(),
            None => {
                warn!("JwtService not found in app data");
                return ready(Err(AppError::Internal(
                    "authentication service not configured".to_string(),
                )
                .into()));
            }
        };

        let token = match extract_token_from_request(req) {
            Some(t) => t,
            None => {
                debug!("No bearer token in request");
                return ready(Err(AppError::Unauthenticated(
                    "no bearer token provided".to_string(),
                )
                .into()));
            }
        };

        match jwt_service.validate_token(&token) {
            Ok(claims) => ready(Ok(AuthenticatedUser {
                user_id: claims.sub,
                role: claims.role,
                claims,
            })),
            Err(e) => {
                warn!(error = %e, "Token validation failed");
                ready(Err(e.into()))
            }
        }
    }
}

fn require(user: AuthenticatedUser, role: UserRole) -> Result<AuthenticatedUser, actix_web::Error> {
    if user.role != role {
        warn!(
            user_id = %user.user_id,
            role = %user.role,
            "Route reserved to {}",
            role
        );
        return Err(AppError::Unauthorized(format!("{} role required", role)).into());
    }
    Ok(user)
}

/// Teacher-only routes (availability, wallet, series management)
#[derive(Debug, Clone)]
pub struct TeacherUser(pub AuthenticatedUser);

impl std::ops::Deref for TeacherUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for TeacherUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        ready(
            AuthenticatedUser::from_request(req, payload)
                .into_inner()
                .and_then(|user| require(user, UserRole::Teacher))
                .map(TeacherUser),
        )
    }
}

/// Admin-only routes (purchase review)
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl std::ops::Deref for AdminUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        ready(
            AuthenticatedUser::from_request(req, payload)
                .into_inner()
                .and_then(|user| require(user, UserRole::Admin))
                .map(AdminUser),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;

    fn jwt() -> Arc<JwtService> {
        Arc::new(JwtService::new("middleware-test-secret", 3600))
    }

    fn request_with(jwt: &Arc<JwtService>, header: Option<String>) -> HttpRequest {
        let mut req = TestRequest::default().app_data(web::Data::new(jwt.clone()));
        if let Some(value) = header {
            req = req.insert_header(("Authorization", value));
        }
        req.to_http_request()
    }

    fn token(jwt: &JwtService, role: UserRole) -> (Uuid, String) {
        let id = Uuid::new_v4();
        (id, jwt.create_token(&Claims::new(id, role)).unwrap())
    }

    #[actix_rt::test]
    async fn test_bearer_token_yields_caller() {
        let jwt = jwt();
        let (id, token) = token(&jwt, UserRole::Student);
        let req = request_with(&jwt, Some(format!("Bearer {}", token)));

        let user = AuthenticatedUser::extract(&req).await.unwrap();
        assert_eq!(user.caller(), Caller::student(id));
    }

    #[actix_rt::test]
    async fn test_missing_token_is_401() {
        let jwt = jwt();
        let req = request_with(&jwt, None);

        let err = AuthenticatedUser::extract(&req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_role_extractors() {
        let jwt = jwt();
        let (_, teacher_token) = token(&jwt, UserRole::Teacher);

        let req = request_with(&jwt, Some(format!("Bearer {}", teacher_token)));
        assert!(TeacherUser::extract(&req).await.is_ok());

        let req = request_with(&jwt, Some(format!("Bearer {}", teacher_token)));
        let err = AdminUser::extract(&req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::FORBIDDEN);
    }
}
