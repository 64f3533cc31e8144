//! ---
//! cd_section: "05-networking-external-interfaces"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "HTTP error responses for certificate operations."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use certdesk_store::StoreError;
use serde::Serialize;
use tracing::{error, warn};

/// Body of every non-2xx JSON response and of plain acknowledgements.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Map a store failure to a status code and log it once.
    pub fn from_store(operation: &'static str, err: StoreError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(operation, kind = err.kind(), error = %err, "certificate operation failed");
        } else {
            warn!(operation, kind = err.kind(), error = %err, "certificate operation rejected");
        }
        Self::new(status, err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(MessageResponse::new(self.message))).into_response()
    }
}

fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound { .. } | StoreError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Connection { .. }
        | StoreError::ManifestCorrupt { .. }
        | StoreError::Transport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
