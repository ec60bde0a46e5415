use axum::{http::StatusCode, response::IntoResponse, Json};
use crowdspace_core::DirectoryError;
use log::error;
use search::SearchError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    /// Logged with its cause; clients only see the public message.
    #[error("{public}: {cause}")]
    Internal { public: &'static str, cause: String },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    pub fn internal(public: &'static str, cause: impl std::fmt::Display) -> Self {
        ApiError::Internal { public, cause: format!("{cause:#}") }
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg.clone(),
            ApiError::Internal { public, .. } => public.to_string(),
        }
    }

    /// Map a directory failure, using `public` for anything unexpected.
    pub fn from_directory(err: DirectoryError, public: &'static str) -> Self {
        match err {
            DirectoryError::Validation(msg) => ApiError::BadRequest(msg),
            DirectoryError::NotFound(what) => ApiError::not_found(what),
            DirectoryError::Storage(e) => ApiError::internal(public, e),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::internal("Search failed", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{} -> {}", status, self);
        }
        let body = Json(ErrorResponse { error: self.public_message() });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed::EmbedError;

    #[test]
    fn search_errors_map_to_status_codes() {
        let bad: ApiError = SearchError::Validation("query parameter is required".into()).into();
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.public_message(), "query parameter is required");

        let provider: ApiError = SearchError::Embedding(EmbedError::Configuration("GOOGLE_API_KEY is not set".into())).into();
        assert_eq!(provider.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(provider.public_message(), "Search failed");
    }

    #[test]
    fn directory_errors_map_to_status_codes() {
        let missing = ApiError::from_directory(DirectoryError::NotFound("Project"), "Failed to update project");
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.public_message(), "Project not found");

        let storage = ApiError::from_directory(
            DirectoryError::Storage(anyhow::anyhow!("disk full")),
            "Failed to update project",
        );
        assert_eq!(storage.public_message(), "Failed to update project");
        assert!(storage.to_string().contains("disk full"));
    }
}
