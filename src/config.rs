use std::env;

use crate::services::cookies::{CookiePolicy, SameSite};

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent means the process runs on in-memory stores.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expiry_seconds: u64,
    pub jwt_refresh_expiry_seconds: u64,
    pub rotate_refresh_tokens: bool,
    pub cookie: CookiePolicy,
    pub subscriber_queue_size: usize,
    pub revocation_sweep_seconds: u64,
    pub cors_allowed_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    // Seed account for in-memory mode
    pub dev_admin_username: Option<String>,
    pub dev_admin_password: Option<String>,
}

impl Config {
    /// Defaults used when the matching env var is unset.
    pub fn new(jwt_secret: impl Into<String>, jwt_refresh_secret: impl Into<String>) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.into(),
            jwt_refresh_secret: jwt_refresh_secret.into(),
            jwt_expiry_seconds: 300,
            jwt_refresh_expiry_seconds: 86_400,
            rotate_refresh_tokens: true,
            cookie: CookiePolicy::default(),
            subscriber_queue_size: 64,
            revocation_sweep_seconds: 600,
            cors_allowed_origins: Vec::new(),
            host: "0.0.0.0".into(),
            port: 8000,
            dev_admin_username: None,
            dev_admin_password: None,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new(required("JWT_SECRET")?, required("JWT_REFRESH_SECRET")?);
        let defaults = config.clone();

        config.database_url = optional("DATABASE_URL");
        config.jwt_expiry_seconds = parsed("JWT_EXPIRY_SECONDS", defaults.jwt_expiry_seconds)?;
        config.jwt_refresh_expiry_seconds =
            parsed("JWT_REFRESH_EXPIRY_SECONDS", defaults.jwt_refresh_expiry_seconds)?;
        config.rotate_refresh_tokens =
            parsed("ROTATE_REFRESH_TOKENS", defaults.rotate_refresh_tokens)?;
        config.cookie = CookiePolicy {
            secure: parsed("AUTH_COOKIE_SECURE", defaults.cookie.secure)?,
            path: env::var("AUTH_COOKIE_PATH").unwrap_or(defaults.cookie.path),
            same_site: match optional("AUTH_COOKIE_SAMESITE") {
                Some(v) => v.parse::<SameSite>()?,
                None => defaults.cookie.same_site,
            },
        };
        config.subscriber_queue_size =
            parsed("SUBSCRIBER_QUEUE_SIZE", defaults.subscriber_queue_size)?;
        config.revocation_sweep_seconds =
            parsed("REVOCATION_SWEEP_SECONDS", defaults.revocation_sweep_seconds)?;
        config.cors_allowed_origins = optional("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        config.host = env::var("HOST").unwrap_or(defaults.host);
        config.port = parsed("PORT", defaults.port)?;
        config.dev_admin_username = optional("DEV_ADMIN_USERNAME");
        config.dev_admin_password = optional("DEV_ADMIN_PASSWORD");

        if config.jwt_secret == config.jwt_refresh_secret {
            anyhow::bail!("JWT_SECRET and JWT_REFRESH_SECRET must differ");
        }
        Ok(config)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        None => Ok(default),
    }
}
