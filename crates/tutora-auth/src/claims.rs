//! JWT Claims structure
//!
//! Tokens are issued by the identity service; this crate only verifies them.
//! `sub` carries the user id and `role` one of student, parent, teacher or
//! admin.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tutora_core::models::{Caller, UserRole};
use uuid::Uuid;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Uuid,

    /// User role
    pub role: UserRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims; the expiration is filled in by `JwtService`
    ///
    /// # Examples
    ///
    /// ```
    /// use tutora_auth::Claims;
    /// use tutora_core::models::UserRole;
    /// use uuid::Uuid;
    ///
    /// let id = Uuid::new_v4();
    /// let claims = Claims::new(id, UserRole::Teacher);
    /// assert_eq!(claims.sub, id);
    /// assert_eq!(claims.exp, 0);
    /// ```
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            sub: user_id,
            role,
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    /// Create new claims expiring `expires_in_secs` from now
    pub fn with_expiration(user_id: Uuid, role: UserRole, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in_secs);

        Self {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    /// The verified identity handed to services
    pub fn caller(&self) -> Caller {
        Caller::new(self.sub, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_with_expiration() {
        let id = Uuid::new_v4();
        let claims = Claims::with_expiration(id, UserRole::Parent, 3600);
        assert!(!claims.is_expired());

        let now = Utc::now().timestamp();
        assert!(claims.exp > now);
        assert!(claims.exp <= now + 3600);
    }

    #[test]
    fn test_expired_claims() {
        let mut claims = Claims::new(Uuid::new_v4(), UserRole::Student);
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        assert!(claims.is_expired());
    }

    #[test]
    fn test_caller_from_claims() {
        let id = Uuid::new_v4();
        let caller = Claims::new(id, UserRole::Admin).caller();
        assert_eq!(caller.user_id, id);
        assert_eq!(caller.role, UserRole::Admin);
    }

    #[test]
    fn test_wire_format() {
        let id = Uuid::new_v4();
        let claims = Claims::new(id, UserRole::Teacher);
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["sub"], id.to_string());
        assert_eq!(json["role"], "teacher");
    }
}
