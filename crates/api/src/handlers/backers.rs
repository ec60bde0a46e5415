use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use crowdspace_core::BackerInput;
use store::{Backer, BackerDetail};

use crate::{json_body, parse_id, ApiError, AppState};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Backer>>, ApiError> {
    let backers = state
        .store
        .list_backers()
        .map_err(|e| ApiError::internal("Failed to fetch backers", e))?;
    Ok(Json(backers))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<BackerInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Backer>), ApiError> {
    let input = json_body(payload)?;
    let backer = state
        .directory
        .create_backer(input)
        .await
        .map_err(|e| ApiError::from_directory(e, "Failed to create backer"))?;
    Ok((StatusCode::CREATED, Json(backer)))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BackerDetail>, ApiError> {
    let id = parse_id(&id, "Backer")?;
    state
        .store
        .get_backer(id)
        .map_err(|e| ApiError::internal("Failed to fetch backer", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Backer"))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<BackerInput>, JsonRejection>,
) -> Result<Json<Backer>, ApiError> {
    let id = parse_id(&id, "Backer")?;
    let input = json_body(payload)?;
    let backer = state
        .directory
        .update_backer(id, input)
        .await
        .map_err(|e| ApiError::from_directory(e, "Failed to update backer"))?;
    Ok(Json(backer))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "Backer")?;
    let removed = state
        .store
        .delete_backer(id)
        .map_err(|e| ApiError::internal("Failed to delete backer", e))?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Backer"))
    }
}
