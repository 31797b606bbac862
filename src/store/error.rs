use thiserror::Error;

/// Errors from the spreadsheet and object store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Google API error (HTTP {status}) on {operation}: {message}")]
    Api {
        status: u16,
        operation: &'static str,
        message: String,
    },

    #[error("Unexpected response from {operation}: {message}")]
    Response {
        operation: &'static str,
        message: String,
    },

    #[error("Access token unavailable: {0}")]
    Auth(#[source] anyhow::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Quota (429) and server-side (5xx) failures, plus transport errors,
    /// are worth another attempt. Everything else is a caller error.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            StoreError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StoreError::Response { .. } | StoreError::Auth(_) | StoreError::Json(_) => false,
        }
    }
}

/// Turn a non-success response into [`StoreError::Api`], keeping the body
/// for diagnostics.
pub(crate) async fn check_status(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(StoreError::Api {
        status: status.as_u16(),
        operation,
        message,
    })
}
