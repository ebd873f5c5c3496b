//! Error types for the scan-to-login server.
//!
//! [`AppError`] unifies the failures the client-facing endpoints can report
//! and implements [`axum::response::IntoResponse`] so handlers can return
//! `Result<…, AppError>` directly. The webhook endpoint never surfaces
//! correlation failures through it; see [`crate::correlator`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scanlogin_platform::PlatformError;
use serde_json::json;

use crate::store::StoreError;

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A call to the upstream platform failed or timed out.
    #[error("upstream platform unavailable: {0}")]
    Upstream(#[from] PlatformError),

    /// No session exists for the requested scene.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The request is missing a required parameter.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Webhook signature missing or wrong.
    #[error("signature verification failed")]
    Forbidden,

    /// A server-side fault the caller cannot act on.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(scene) => Self::NotFound(scene.to_string()),
            StoreError::DuplicateScene(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::warn!(%status, error = %self, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use scanlogin_models::SceneId;

    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (
                AppError::Upstream(PlatformError::Status(503)),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::NotFound("zzz".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (
                AppError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn duplicate_scene_is_internal() {
        let scene = SceneId::parse("abc123").unwrap();
        let err = AppError::from(StoreError::DuplicateScene(scene));
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn missing_scene_is_not_found() {
        let scene = SceneId::parse("zzz").unwrap();
        let err = AppError::from(StoreError::NotFound(scene));
        assert!(matches!(err, AppError::NotFound(ref s) if s == "zzz"));
    }
}
