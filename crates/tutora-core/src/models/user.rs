//! Caller identity
//!
//! The core never authenticates anyone; it receives an already-verified
//! [`Caller`] and checks ownership against it.

use crate::error::AppError;
use crate::AppResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User role enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Learner booking sessions for themselves
    #[default]
    Student,
    /// Guardian acting on behalf of a verified child
    Parent,
    /// Owner of availability, series and a star wallet
    Teacher,
    /// Platform staff (purchase approval)
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Student => write!(f, "student"),
            UserRole::Parent => write!(f, "parent"),
            UserRole::Teacher => write!(f, "teacher"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl UserRole {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "student" => Some(UserRole::Student),
            "parent" => Some(UserRole::Parent),
            "teacher" => Some(UserRole::Teacher),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// The authenticated principal performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Caller {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn student(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Student)
    }

    pub fn parent(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Parent)
    }

    pub fn teacher(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Teacher)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Admin)
    }

    /// Fails with `Unauthorized` unless the caller has `role`
    pub fn require_role(&self, role: UserRole) -> AppResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "{} role required, caller is {}",
                role, self.role
            )))
        }
    }

    /// Fails with `Unauthorized` unless the caller is `owner_id`
    pub fn require_owner(&self, owner_id: Uuid, what: &str) -> AppResult<()> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!("caller does not own this {}", what)))
        }
    }
}
