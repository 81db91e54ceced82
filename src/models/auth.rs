use serde::{Deserialize, Serialize};

use super::user::UserRole;

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

/// Claims embedded in the JWT refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String, // user id
    pub jti: String, // refresh token UUID (to enable revocation)
    pub exp: i64,
    pub iat: i64,
}

/// Caller identity decoded from a valid access token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn can_write(&self) -> bool {
        self.role == UserRole::Staff
    }
}
