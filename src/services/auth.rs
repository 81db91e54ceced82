use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        user::{LoginRequest, LoginResponse, UserProfile},
    },
    services::{
        metrics::{LOGINS_COUNTER, REFRESH_COUNTER},
        sessions::{SessionStore, Successor},
        tokens::{IssuedRefresh, TokenService},
        users::Authenticator,
    },
};

const INVALID_CREDENTIALS: &str = "Invalid credentials.";
const NO_REFRESH_TOKEN: &str = "No refresh token provided.";
const BLACKLISTED: &str = "Token is blacklisted.";

/// Successful login: the body to return and the refresh token for the cookie.
pub struct LoginOutcome {
    pub response: LoginResponse,
    pub refresh: IssuedRefresh,
}

pub struct RefreshOutcome {
    pub access: String,
    /// Set only when rotation is enabled.
    pub rotated: Option<IssuedRefresh>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    LoggedOut,
    AlreadyLoggedOut,
}

impl LogoutOutcome {
    pub fn detail(self) -> &'static str {
        match self {
            LogoutOutcome::LoggedOut => "Logged out successfully.",
            LogoutOutcome::AlreadyLoggedOut => "Already logged out.",
        }
    }
}

/// Issues, verifies, rotates and revokes credentials.
pub struct AuthService {
    tokens: TokenService,
    sessions: Arc<SessionStore>,
    directory: Arc<dyn Authenticator>,
    rotate_refresh_tokens: bool,
}

impl AuthService {
    pub fn new(
        tokens: TokenService,
        sessions: Arc<SessionStore>,
        directory: Arc<dyn Authenticator>,
        rotate_refresh_tokens: bool,
    ) -> Self {
        Self {
            tokens,
            sessions,
            directory,
            rotate_refresh_tokens,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn directory(&self) -> &Arc<dyn Authenticator> {
        &self.directory
    }

    /// Only staff may hold a session; anyone else gets the same generic
    /// rejection as a wrong password.
    pub async fn login(&self, req: &LoginRequest) -> Result<LoginOutcome, ApiError> {
        let user = self
            .directory
            .authenticate(&req.username, &req.password)
            .await?
            .filter(|u| u.is_active && u.is_staff);

        let Some(user) = user else {
            LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            info!("Login rejected for username={}", req.username);
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        };

        let access = self.tokens.issue_access(&user)?;
        let refresh = self.tokens.issue_refresh(user.id)?;
        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        info!("Login: user={} id={}", user.username, user.id);

        Ok(LoginOutcome {
            response: LoginResponse {
                access,
                user: UserProfile::from(&user),
                detail: "Login successful.".into(),
            },
            refresh,
        })
    }

    /// Exchange a refresh token for a new access token, rotating the refresh
    /// token when enabled. Of two calls presenting the same token, at most one
    /// rotates; the other sees it blacklisted.
    pub async fn refresh(&self, raw: Option<&str>) -> Result<RefreshOutcome, ApiError> {
        let result = self.try_refresh(raw).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(ApiError::Unauthorized(_)) => "rejected",
            Err(_) => "error",
        };
        REFRESH_COUNTER.with_label_values(&[outcome]).inc();
        result
    }

    async fn try_refresh(&self, raw: Option<&str>) -> Result<RefreshOutcome, ApiError> {
        let raw = raw.ok_or_else(|| ApiError::unauthorized(NO_REFRESH_TOKEN))?;
        let presented = self
            .tokens
            .decode_refresh(raw)
            .map_err(|e| ApiError::unauthorized(e.to_string()))?;

        if self.sessions.is_revoked(&presented.jti) {
            warn!("Refresh with revoked token jti={} user={}", presented.jti, presented.user_id);
            return Err(ApiError::unauthorized(BLACKLISTED));
        }

        let user = self
            .directory
            .find_active(presented.user_id)
            .await?
            .ok_or_else(|| ApiError::unauthorized("User not found or inactive."))?;

        let access = self.tokens.issue_access(&user)?;
        if !self.rotate_refresh_tokens {
            return Ok(RefreshOutcome {
                access,
                rotated: None,
            });
        }

        let next = self.tokens.issue_refresh(user.id)?;
        let successor = Successor {
            jti: next.jti,
            expires_at: next.expires_at,
        };
        if !self
            .sessions
            .rotate(presented.jti, presented.expires_at, successor)
        {
            warn!("Refresh lost rotation race jti={} user={}", presented.jti, user.id);
            return Err(ApiError::unauthorized(BLACKLISTED));
        }

        Ok(RefreshOutcome {
            access,
            rotated: Some(next),
        })
    }

    /// Revoke the session behind `raw`. Never fails: a token that no longer
    /// decodes or is already revoked means the session is already over.
    pub fn logout(&self, raw: &str) -> LogoutOutcome {
        let presented = match self.tokens.decode_refresh(raw) {
            Ok(p) => p,
            Err(e) => {
                info!("Logout with unusable refresh token: {e}");
                return LogoutOutcome::AlreadyLoggedOut;
            }
        };

        if self
            .sessions
            .revoke_lineage(presented.jti, presented.expires_at)
            > 0
        {
            info!("Logout: user={} jti={}", presented.user_id, presented.jti);
            LogoutOutcome::LoggedOut
        } else {
            LogoutOutcome::AlreadyLoggedOut
        }
    }

    pub fn verify(&self, access: &str) -> Result<AuthenticatedUser, ApiError> {
        self.tokens
            .decode_access(access)
            .map_err(|e| ApiError::unauthorized(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::users::MemoryAuthenticator;

    struct Fixture {
        auth: Arc<AuthService>,
        directory: Arc<MemoryAuthenticator>,
    }

    fn fixture(rotate: bool) -> Fixture {
        let directory = Arc::new(MemoryAuthenticator::new(4));
        directory.add_user("admin", "correct horse", true).unwrap();
        directory.add_user("viewer", "viewer pw", false).unwrap();
        let auth = Arc::new(AuthService::new(
            TokenService::new("access-secret", "refresh-secret", 300, 3_600),
            Arc::new(SessionStore::in_memory()),
            directory.clone(),
            rotate,
        ));
        Fixture { auth, directory }
    }

    fn creds(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn login_issues_pair_for_staff() {
        let f = fixture(true);
        let outcome = f.auth.login(&creds("admin", "correct horse")).await.unwrap();
        let user = f.auth.verify(&outcome.response.access).unwrap();
        assert_eq!(user.username, "admin");
        assert!(user.can_write());
        assert!(f.auth.tokens().decode_refresh(&outcome.refresh.token).is_ok());
    }

    #[tokio::test]
    async fn login_rejections_are_indistinguishable() {
        let f = fixture(true);
        for (u, p) in [("admin", "wrong"), ("ghost", "x"), ("viewer", "viewer pw")] {
            match f.auth.login(&creds(u, p)).await {
                Err(ApiError::Unauthorized(detail)) => assert_eq!(detail, "Invalid credentials."),
                other => panic!("unexpected outcome for {u}: {:?}", other.err()),
            }
        }
    }

    #[tokio::test]
    async fn rotated_out_token_never_refreshes_again() {
        let f = fixture(true);
        let login = f.auth.login(&creds("admin", "correct horse")).await.unwrap();

        let first = f.auth.refresh(Some(&login.refresh.token)).await.unwrap();
        let rotated = first.rotated.expect("rotation enabled");
        assert_ne!(rotated.jti, login.refresh.jti);

        let replay = f.auth.refresh(Some(&login.refresh.token)).await;
        assert!(matches!(replay, Err(ApiError::Unauthorized(ref d)) if d == "Token is blacklisted."));

        // The successor keeps working.
        assert!(f.auth.refresh(Some(&rotated.token)).await.is_ok());
    }

    #[tokio::test]
    async fn without_rotation_the_token_stays_valid() {
        let f = fixture(false);
        let login = f.auth.login(&creds("admin", "correct horse")).await.unwrap();
        for _ in 0..3 {
            let outcome = f.auth.refresh(Some(&login.refresh.token)).await.unwrap();
            assert!(outcome.rotated.is_none());
        }
        assert!(f.auth.sessions().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refresh_with_one_token_has_one_winner() {
        let f = fixture(true);
        let login = f.auth.login(&creds("admin", "correct horse")).await.unwrap();

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let auth = f.auth.clone();
                let token = login.refresh.token.clone();
                tokio::spawn(async move { auth.refresh(Some(&token)).await })
            })
            .collect();

        let mut wins = 0;
        let mut blacklisted = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => wins += 1,
                Err(ApiError::Unauthorized(d)) if d == "Token is blacklisted." => blacklisted += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((wins, blacklisted), (1, 1));
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_ends_rotated_sessions() {
        let f = fixture(true);
        let login = f.auth.login(&creds("admin", "correct horse")).await.unwrap();
        let rotated = f
            .auth
            .refresh(Some(&login.refresh.token))
            .await
            .unwrap()
            .rotated
            .unwrap();

        // Logging out with the stale token still kills the rotated one.
        assert_eq!(f.auth.logout(&login.refresh.token), LogoutOutcome::LoggedOut);
        assert!(f.auth.refresh(Some(&rotated.token)).await.is_err());

        assert_eq!(f.auth.logout(&login.refresh.token), LogoutOutcome::AlreadyLoggedOut);
        assert_eq!(f.auth.logout("garbage"), LogoutOutcome::AlreadyLoggedOut);
    }

    #[tokio::test]
    async fn refresh_rejects_missing_and_deactivated() {
        let f = fixture(true);
        assert!(matches!(
            f.auth.refresh(None).await,
            Err(ApiError::Unauthorized(ref d)) if d == "No refresh token provided."
        ));

        let login = f.auth.login(&creds("admin", "correct horse")).await.unwrap();
        f.directory.set_active(login.response.user.id, false);
        assert!(matches!(f.auth.refresh(Some(&login.refresh.token)).await, Err(ApiError::Unauthorized(_))));
        // A rejected refresh does not burn the token.
        assert!(!f.auth.sessions().is_revoked(&login.refresh.jti));
    }
}
