//! HTTP-facing errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lobby_tracker::{ExportError, UnknownJurisdiction};

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    UnknownJurisdiction(#[from] UnknownJurisdiction),

    #[error("template error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) | WebError::UnknownJurisdiction(_) => StatusCode::BAD_REQUEST,
            WebError::Render(_) | WebError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type WebResult<T> = Result<T, WebError>;
