//! JWT minting and decoding. Access and refresh tokens are signed with
//! different secrets, so one can never be replayed as the other.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    auth::{AuthenticatedUser, Claims, RefreshClaims},
    user::User,
};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is invalid or expired.")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Token contained no recognizable user identification.")]
    MalformedClaims,
}

/// A freshly minted refresh token. Only `jti` and `expires_at` are ever kept
/// server-side.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: i64,
}

impl IssuedRefresh {
    /// Seconds of life left at `now`.
    pub fn max_age(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }
}

#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: i64,
    refresh_ttl: i64,
    validation: Validation,
}

impl TokenService {
    pub fn new(access_secret: &str, refresh_secret: &str, access_ttl: u64, refresh_ttl: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Revocation entries are purged exactly at expiry; a leeway would let a
        // purged token decode again.
        validation.leeway = 0;

        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl: access_ttl as i64,
            refresh_ttl: refresh_ttl as i64,
            validation,
        }
    }

    pub fn refresh_ttl(&self) -> i64 {
        self.refresh_ttl
    }

    pub fn issue_access(&self, user: &User) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role(),
            iat: now,
            exp: now + self.access_ttl,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)?;
        Ok(token)
    }

    pub fn issue_refresh(&self, user_id: i64) -> anyhow::Result<IssuedRefresh> {
        let now = Utc::now().timestamp();
        let jti = Uuid::new_v4();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            iat: now,
            exp: now + self.refresh_ttl,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)?;
        Ok(IssuedRefresh {
            token,
            jti,
            expires_at: claims.exp,
        })
    }

    pub fn decode_access(&self, token: &str) -> Result<AuthenticatedUser, TokenError> {
        let claims = decode::<Claims>(token, &self.access_decoding, &self.validation)?.claims;
        Ok(AuthenticatedUser {
            user_id: claims.sub.parse().map_err(|_| TokenError::MalformedClaims)?,
            username: claims.username,
            role: claims.role,
        })
    }

    /// Signature and expiry only; revocation is the session store's job.
    pub fn decode_refresh(&self, token: &str) -> Result<VerifiedRefresh, TokenError> {
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation)?.claims;
        Ok(VerifiedRefresh {
            user_id: claims.sub.parse().map_err(|_| TokenError::MalformedClaims)?,
            jti: claims.jti.parse().map_err(|_| TokenError::MalformedClaims)?,
            expires_at: claims.exp,
        })
    }
}

/// Typed view of a refresh token whose signature and expiry checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedRefresh {
    pub user_id: i64,
    pub jti: Uuid,
    pub expires_at: i64,
}
