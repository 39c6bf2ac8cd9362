use spin_sdk::http::Response;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Duplicate(_) => 409,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        // Internal details stay in the logs.
        let message = match &err {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = serde_json::json!({ "error": message }).to_string();

        Response::builder()
            .status(err.status())
            .header("Content-Type", "application/json")
            .body(body)
            .build()
    }
}
