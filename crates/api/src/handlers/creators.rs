use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use crowdspace_core::CreatorInput;
use store::{Creator, CreatorDetail};

use crate::{json_body, parse_id, ApiError, AppState};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Creator>>, ApiError> {
    let creators = state
        .store
        .list_creators()
        .map_err(|e| ApiError::internal("Failed to fetch creators", e))?;
    Ok(Json(creators))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreatorInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Creator>), ApiError> {
    let input = json_body(payload)?;
    let creator = state
        .directory
        .create_creator(input)
        .await
        .map_err(|e| ApiError::from_directory(e, "Failed to create creator"))?;
    Ok((StatusCode::CREATED, Json(creator)))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CreatorDetail>, ApiError> {
    let id = parse_id(&id, "Creator")?;
    state
        .store
        .get_creator(id)
        .map_err(|e| ApiError::internal("Failed to fetch creator", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Creator"))
}

/// Deleting a creator also deletes their projects.
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "Creator")?;
    let removed = state
        .store
        .delete_creator(id)
        .map_err(|e| ApiError::internal("Failed to delete creator", e))?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Creator"))
    }
}
