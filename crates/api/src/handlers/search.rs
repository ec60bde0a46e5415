use axum::{
    extract::{Query, State},
    Json,
};
use search::ScoredProject;
use serde::Deserialize;

use crate::{ApiError, AppState, FilterParams};

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    #[serde(flatten)]
    pub filters: FilterParams,
}

/// `GET /api/search?query=...&status=&platform=&category=`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ScoredProject>>, ApiError> {
    let filter = params.filters.to_filter()?;
    let query = params.query.unwrap_or_default();
    let results = state.search.search(&query, &filter).await?;
    Ok(Json(results))
}
