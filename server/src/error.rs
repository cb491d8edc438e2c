use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use esg_shared::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Misconfigured(String),
    #[error("upstream model {model} rejected the request with status {status}")]
    UpstreamFatal {
        model: String,
        status: StatusCode,
        details: String,
    },
    #[error("all upstream models failed, last status {status}")]
    UpstreamExhausted { status: StatusCode, details: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// How a failed attempt affects the fallback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying against the next candidate.
    Transient,
    /// The request itself is at fault; retrying would fail the same way.
    Fatal,
}

impl FailureClass {
    pub fn of(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS => FailureClass::Transient,
            s if s.is_client_error() => FailureClass::Fatal,
            _ => FailureClass::Transient,
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Misconfigured(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::UpstreamFatal { status, .. }
            | GatewayError::UpstreamExhausted { status, .. } => *status,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            GatewayError::BadRequest(msg) | GatewayError::Misconfigured(msg) => {
                ErrorBody::new(msg.clone())
            }
            GatewayError::UpstreamFatal {
                status, details, ..
            }
            | GatewayError::UpstreamExhausted { status, details } => ErrorBody {
                error: "All upstream models failed.".to_string(),
                details: Some(details.clone()),
                status: Some(status.as_u16()),
            },
            GatewayError::Internal(_) => {
                ErrorBody::new("Unexpected error while contacting the model.")
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::Internal(e) => {
                tracing::error!("Error calling completion provider: {:#}", e)
            }
            GatewayError::UpstreamFatal { .. } => tracing::warn!("Stopping fallback: {}", self),
            _ => {}
        }
        (self.status(), Json(self.body())).into_response()
    }
}
