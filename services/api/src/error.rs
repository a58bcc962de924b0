use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sightline_core::api_types::ErrorBody;

/// Everything a route can fail with, mapped onto the `{error, details,
/// hint}` body the clients understand.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    /// A credential the route needs is not configured. Never retried.
    #[error("{provider} API key not configured")]
    ConfigurationMissing { provider: &'static str, hint: String },
    /// The upstream provider answered with a non-success status.
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: String,
    },
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn missing_key(provider: &'static str, var: &str) -> Self {
        Self::ConfigurationMissing {
            provider,
            hint: format!("Please set {var} environment variable"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ConfigurationMissing { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream { status, .. } => *status,
        }
    }

    /// Replaces the generic message of an upstream or internal failure with
    /// one naming what the route was doing.
    pub fn context(self, message: &str) -> Self {
        match self {
            Self::Upstream {
                status, details, ..
            } => Self::Upstream {
                status,
                message: message.to_string(),
                details,
            },
            Self::Internal(cause) => {
                tracing::error!("{}: {}", message, cause);
                Self::Internal(message.to_string())
            }
            other => other,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let body = match self {
            Self::ConfigurationMissing { hint, .. } => ErrorBody {
                error,
                details: None,
                hint: Some(hint),
            },
            Self::Upstream { details, .. } => ErrorBody {
                error,
                details: Some(details),
                hint: None,
            },
            Self::BadRequest(_) | Self::Internal(_) => ErrorBody {
                error,
                details: None,
                hint: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::missing_key("xAI", "XAI_API_KEY").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let upstream = ApiError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Upstream request failed".into(),
            details: "slow down".into(),
        };
        assert_eq!(upstream.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn context_keeps_upstream_details() {
        let err = ApiError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            message: "Upstream request failed".into(),
            details: "model overloaded".into(),
        }
        .context("Failed to analyze image");

        match err {
            ApiError::Upstream {
                status,
                message,
                details,
            } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "Failed to analyze image");
                assert_eq!(details, "model overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_key_message_and_hint() {
        let err = ApiError::missing_key("OpenAI", "OPENAI_API_KEY");
        assert_eq!(err.to_string(), "OpenAI API key not configured");
        assert!(matches!(
            err,
            ApiError::ConfigurationMissing { hint, .. } if hint == "Please set OPENAI_API_KEY environment variable"
        ));
    }
}
