use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        user::{LoginRequest, UserProfile},
    },
    services::cookies::{get_cookie, refresh_cookie, CookieMutation, REFRESH_COOKIE},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

/// Append the `Set-Cookie` line for `mutation` to `response`.
fn with_refresh_cookie(mut response: Response, mutation: CookieMutation<'_>, state: &AppState) -> Response {
    let cookie = refresh_cookie(mutation, &state.config.cookie, Utc::now().timestamp());
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
            response
        }
        Err(e) => ApiError::Internal(anyhow::anyhow!("Unencodable refresh cookie: {e}")).into_response(),
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let req = LoginRequest::from_json(&body)?;
    let outcome = state.auth.login(&req).await?;

    let response = Json(outcome.response).into_response();
    Ok(with_refresh_cookie(response, CookieMutation::Set(&outcome.refresh), &state))
}

/// The refresh token is read from the cookie only; a body is ignored.
pub async fn refresh_token(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let raw = get_cookie(&headers, REFRESH_COOKIE);

    match state.auth.refresh(raw.as_deref()).await {
        Ok(outcome) => {
            let response = Json(json!({ "access": outcome.access })).into_response();
            match outcome.rotated {
                Some(next) => with_refresh_cookie(response, CookieMutation::Set(&next), &state),
                None => response,
            }
        }
        Err(e) => with_refresh_cookie(e.into_response(), CookieMutation::Clear, &state),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Response {
    let response = match get_cookie(&headers, REFRESH_COOKIE) {
        None => ApiError::InvalidRequest("No refresh token provided.".into()).into_response(),
        Some(raw) => {
            let outcome = state.auth.logout(&raw);
            (StatusCode::OK, Json(json!({ "detail": outcome.detail() }))).into_response()
        }
    };
    with_refresh_cookie(response, CookieMutation::Clear, &state)
}

/// Body-token verification; `200 {}` when valid.
pub async fn verify_token(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    state.auth.verify(&body.token)?;
    Ok(Json(json!({})))
}

/// Bearer-token verification.
pub async fn verify_bearer(user: AuthenticatedUser) -> Json<Value> {
    Json(json!({
        "detail": "Token is valid.",
        "user_id": user.user_id,
        "role": user.role,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfile>, ApiError> {
    let found = state
        .auth
        .directory()
        .find_active(user.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found or inactive."))?;
    Ok(Json(UserProfile::from(&found)))
}
