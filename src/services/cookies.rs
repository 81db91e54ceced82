//! The refresh-token side channel.
//!
//! Every cookie mutation is computed by [`refresh_cookie`], a pure function of
//! the mutation and the policy, so the exact `Set-Cookie` line can be tested
//! without building a response.

use axum::http::{header, HeaderMap};

use crate::services::tokens::IssuedRefresh;

pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl std::fmt::Display for SameSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SameSite {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(anyhow::anyhow!("Unknown SameSite value: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    /// Scope of the cookie; only the auth endpoints ever see it.
    pub path: String,
    pub same_site: SameSite,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            secure: true,
            path: "/api/accounts/".into(),
            same_site: SameSite::Lax,
        }
    }
}

/// What to do with the client's refresh cookie.
#[derive(Debug, Clone, Copy)]
pub enum CookieMutation<'a> {
    Set(&'a IssuedRefresh),
    Clear,
}

/// Render the `Set-Cookie` value for a mutation. `now` is a unix timestamp;
/// `Max-Age` is the remaining lifetime of the token being set.
pub fn refresh_cookie(mutation: CookieMutation<'_>, policy: &CookiePolicy, now: i64) -> String {
    let (value, max_age) = match mutation {
        CookieMutation::Set(issued) => (issued.token.as_str(), issued.max_age(now)),
        CookieMutation::Clear => ("", 0),
    };
    let mut cookie = format!(
        "{REFRESH_COOKIE}={value}; HttpOnly; SameSite={}; Path={}; Max-Age={max_age}",
        policy.same_site, policy.path
    );
    if policy.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extract a named cookie value from request headers.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| part.trim().strip_prefix(&prefix).map(str::to_string))
        .filter(|v| !v.is_empty())
}
