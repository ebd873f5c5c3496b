//! HTTP client for the login server's client endpoints.

use reqwest::StatusCode;
use scanlogin_models::{NewSessionResponse, SceneId, SessionView};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Failures talking to the login server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("server returned {status}: {message}")]
    Server { status: StatusCode, message: String },
}

impl ClientError {
    /// Whether the server reported the session as gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Server { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Thin wrapper over the session endpoints.
#[derive(Debug, Clone)]
pub struct LoginClient {
    http: reqwest::Client,
    base: String,
}

impl LoginClient {
    pub fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// `POST /session/new`
    pub async fn new_session(&self) -> Result<NewSessionResponse, ClientError> {
        let res = self
            .http
            .post(format!("{}/session/new", self.base))
            .send()
            .await?;
        decode(res).await
    }

    /// `GET /session/{scene}`
    pub async fn poll(&self, scene: &SceneId) -> Result<SessionView, ClientError> {
        let res = self
            .http
            .get(format!("{}/session/{scene}", self.base))
            .send()
            .await?;
        decode(res).await
    }

    /// `GET /healthz`
    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        let res = self.http.get(format!("{}/healthz", self.base)).send().await?;
        decode(res).await
    }
}

async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json().await?);
    }
    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Server { status, message })
}
