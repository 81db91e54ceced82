use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "topic": state.topic.name(),
            "subscribers": state.topic.member_count(),
            "revoked_tokens": state.auth.sessions().len(),
        })),
    )
}
