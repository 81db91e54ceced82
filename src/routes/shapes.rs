use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ApiError,
    middleware::auth::StaffUser,
    models::shape::{CreateShapeRequest, Shape, ShapePatch, UpdateShapeRequest},
    AppState,
};

// Reads are public; writes require a staff access token.

pub async fn list_shapes(State(state): State<AppState>) -> Result<Json<Vec<Shape>>, ApiError> {
    Ok(Json(state.shapes.list().await?))
}

pub async fn get_shape(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Shape>, ApiError> {
    state.shapes.get(id).await?.map(Json).ok_or(ApiError::NotFound)
}

pub async fn create_shape(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    payload: Result<Json<CreateShapeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Shape>), ApiError> {
    let Json(body) = payload?;
    let new = body.validate()?;
    let shape = state.shapes.create(new).await?;
    tracing::debug!("Shape {} created by {}", shape.id, user.username);
    Ok((StatusCode::CREATED, Json(shape)))
}

/// PUT: every field required.
pub async fn replace_shape(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Path(id): Path<i64>,
    payload: Result<Json<CreateShapeRequest>, JsonRejection>,
) -> Result<Json<Shape>, ApiError> {
    let Json(body) = payload?;
    let patch = ShapePatch::from(body.validate()?);
    state.shapes.update(id, patch).await?.map(Json).ok_or(ApiError::NotFound)
}

/// PATCH: only the fields present change.
pub async fn update_shape(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateShapeRequest>, JsonRejection>,
) -> Result<Json<Shape>, ApiError> {
    let Json(body) = payload?;
    let patch = body.validate()?;
    state.shapes.update(id, patch).await?.map(Json).ok_or(ApiError::NotFound)
}

pub async fn delete_shape(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.shapes.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
