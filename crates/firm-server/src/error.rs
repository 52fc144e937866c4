use axum::extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use firm_bridge::BridgeError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// A request parameter could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An extractor refused the request before it reached a handler body.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("store error: {0}")]
    Store(#[from] firm_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] firm_ledger::LedgerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::Bridge(e) => match e {
                BridgeError::InvalidArgument(_) | BridgeError::Validation(_) => {
                    StatusCode::BAD_REQUEST
                }
                BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
                BridgeError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
                BridgeError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let mut body = json!({ "error": self.to_string() });
        if let Self::Bridge(BridgeError::Validation(report)) = &self {
            body["violations"] = json!(report.violations);
        }
        (status, Json(body)).into_response()
    }
}

macro_rules! impl_from_rejection {
    ($($rejection:ty),* $(,)?) => {
        $(
            impl From<$rejection> for ServerError {
                fn from(rejection: $rejection) -> Self {
                    Self::Rejected {
                        status: rejection.status(),
                        message: rejection.body_text(),
                    }
                }
            }
        )*
    };
}

impl_from_rejection!(JsonRejection, PathRejection, QueryRejection, BytesRejection);

pub type ServerResult<T> = Result<T, ServerError>;
