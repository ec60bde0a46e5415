use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use crowdspace_core::{PledgeInput, ProjectInput};
use serde::Deserialize;
use store::{Project, ProjectDetail};

use crate::{json_body, parse_id, ApiError, AppState, FilterParams};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(flatten)]
    pub filters: FilterParams,
    /// Case-insensitive substring over title and description.
    pub q: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Project>>, ApiError> {
    let filter = params.filters.to_filter()?;
    let q = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let projects = state
        .store
        .list_projects(&filter, q)
        .map_err(|e| ApiError::internal("Failed to fetch projects", e))?;
    Ok(Json(projects))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<ProjectInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let input = json_body(payload)?;
    let project = state
        .directory
        .create_project(input)
        .await
        .map_err(|e| ApiError::from_directory(e, "Failed to create project"))?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetail>, ApiError> {
    let id = parse_id(&id, "Project")?;
    state
        .store
        .get_project(id)
        .map_err(|e| ApiError::internal("Failed to fetch project", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Project"))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProjectInput>, JsonRejection>,
) -> Result<Json<Project>, ApiError> {
    let id = parse_id(&id, "Project")?;
    let input = json_body(payload)?;
    let project = state
        .directory
        .update_project(id, input)
        .await
        .map_err(|e| ApiError::from_directory(e, "Failed to update project"))?;
    Ok(Json(project))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "Project")?;
    let removed = state
        .store
        .delete_project(id)
        .map_err(|e| ApiError::internal("Failed to delete project", e))?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Project"))
    }
}

pub async fn pledge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PledgeInput>, JsonRejection>,
) -> Result<Json<Project>, ApiError> {
    let id = parse_id(&id, "Project")?;
    let input = json_body(payload)?;
    let project = state
        .directory
        .add_pledge(id, input)
        .await
        .map_err(|e| ApiError::from_directory(e, "Failed to record pledge"))?;
    Ok(Json(project))
}
