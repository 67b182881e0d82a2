//! Error types shared by the storage, analysis and HTTP layers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failures while reading or interpreting a goniometry file
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Unsupported file format '{0}'. Use .csv or .xlsx")]
    UnsupportedFormat(String),

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("File is missing the required Time/Angle columns. Found: {}", found.join(", "))]
    MissingColumns { found: Vec<String> },

    #[error("File has no valid values in the time column")]
    NoValidTime,

    #[error("No angle column with valid values was found")]
    NoValidAngles,

    #[error("Parser task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Failures in the patient/user database
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("User '{0}' already exists")]
    DuplicateUser(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Errors returned from HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Access denied")]
    AccessDenied,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many failed attempts, retry in {0} minutes")]
    LockedOut(i64),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Storage(StorageError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateUser(name) => ApiError::Conflict(format!("User '{}' already exists", name)),
            StorageError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Storage(other),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(err.body_text());
        }
        ApiError::Validation(format!("Invalid upload: {}", err.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::LockedOut(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Analysis(AnalysisError::Io(_)) => StatusCode::NOT_FOUND,
            ApiError::Analysis(AnalysisError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(AnalysisError::Worker(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Analysis(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used as the `error` field of the JSON body
    fn label(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "Invalid request",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::AccessDenied => "Access denied",
            ApiError::NotFound(_) => "Not found",
            ApiError::Conflict(_) => "Conflict",
            ApiError::LockedOut(_) => "Account locked",
            ApiError::PayloadTooLarge(_) => "Upload too large",
            ApiError::Analysis(AnalysisError::Worker(_)) => "Internal error",
            ApiError::Analysis(_) => "Could not analyse file",
            ApiError::Storage(_) => "Storage failure",
            ApiError::Internal(_) => "Internal error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        (
            status,
            Json(json!({
                "error": self.label(),
                "details": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_lists_found() {
        let err = AnalysisError::MissingColumns {
            found: vec!["Frame".to_string(), "Knee".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "File is missing the required Time/Angle columns. Found: Frame, Knee"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Analysis(AnalysisError::NoValidTime).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            ApiError::from(StorageError::DuplicateUser("ana".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::LockedOut(3).status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_crashed_parse_is_a_server_error() {
        let join_err = tokio::task::spawn_blocking(|| -> u8 { panic!("parser crashed") })
            .await
            .unwrap_err();
        let err = ApiError::from(AnalysisError::from(join_err));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ApiError::from(AnalysisError::Io(missing)).status(), StatusCode::NOT_FOUND);
    }
}
