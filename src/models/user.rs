use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Staff,
    Member,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Staff => "staff",
            UserRole::Member => "member",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(UserRole::Staff),
            "member" => Ok(UserRole::Member),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> UserRole {
        if self.is_staff {
            UserRole::Staff
        } else {
            UserRole::Member
        }
    }
}

// Request/Response DTOs

/// Login body. Built from raw JSON so a missing or non-string field is an
/// `InvalidRequest` rather than a deserializer rejection.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn from_json(body: &Value) -> Result<Self, ApiError> {
        let field = |name: &str| -> Result<String, ApiError> {
            match body.get(name) {
                Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(Value::String(_)) | None | Some(Value::Null) => {
                    Err(ApiError::InvalidRequest(format!("{name}: This field is required.")))
                }
                Some(_) => Err(ApiError::InvalidRequest(format!("{name}: Not a valid string."))),
            }
        };
        Ok(Self {
            username: field("username")?,
            password: field("password")?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub user: UserProfile,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

impl From<&User> for UserProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            is_staff: u.is_staff,
        }
    }
}
