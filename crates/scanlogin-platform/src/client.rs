//! HTTP implementation of [`PlatformApi`].
//!
//! Every platform endpoint answers `200 OK` even for business errors and
//! signals failure with a non-zero `errcode` in the body, so each reply is
//! first decoded as a loose JSON value and checked before being mapped onto
//! the typed response.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use scanlogin_models::SceneId;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::api::{AccessToken, PlatformApi, QrTicket, SubscriberInfo};
use crate::error::PlatformError;

/// Default base URL of the platform API.
pub const DEFAULT_API_BASE: &str = "https://api.weixin.qq.com";

/// Configuration for [`PlatformClient`].
#[derive(Clone)]
pub struct PlatformClientConfig {
    /// Account app id.
    pub app_id: String,
    /// Account app secret.
    pub app_secret: String,
    /// Base URL, without trailing slash.
    pub api_base: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
}

impl fmt::Debug for PlatformClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformClientConfig")
            .field("app_id", &self.app_id)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PlatformClientConfig {
    /// Configuration for the public platform with a 10 second timeout.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Point the client at another base URL (e.g. the mock platform).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.app_id.is_empty() {
            return Err(PlatformError::Config("app_id cannot be empty".into()));
        }
        if self.app_secret.is_empty() {
            return Err(PlatformError::Config("app_secret cannot be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(PlatformError::Config("timeout cannot be zero".into()));
        }
        Ok(())
    }
}

/// reqwest-backed platform client.
#[derive(Clone, Debug)]
pub struct PlatformClient {
    http: reqwest::Client,
    config: PlatformClientConfig,
}

impl PlatformClient {
    /// Build a client; fails on invalid configuration.
    pub fn new(config: PlatformClientConfig) -> Result<Self, PlatformError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// The client configuration.
    pub fn config(&self) -> &PlatformClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn fetch_access_token(&self) -> Result<AccessToken, PlatformError> {
        debug!(app_id = %self.config.app_id, "requesting access token");
        let res = self
            .http
            .get(self.endpoint("/cgi-bin/token"))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
            ])
            .send()
            .await?;
        decode_reply(res).await
    }

    async fn create_scene_qrcode(
        &self,
        access_token: &str,
        scene: &SceneId,
        expire_seconds: u64,
    ) -> Result<QrTicket, PlatformError> {
        debug!(scene = %scene, expire_seconds, "requesting scene QR code");
        let res = self
            .http
            .post(self.endpoint("/cgi-bin/qrcode/create"))
            .query(&[("access_token", access_token)])
            .json(&json!({
                "expire_seconds": expire_seconds,
                "action_name": "QR_STR_SCENE",
                "action_info": { "scene": { "scene_str": scene.as_str() } },
            }))
            .send()
            .await?;
        decode_reply(res).await
    }

    async fn subscriber_info(
        &self,
        access_token: &str,
        openid: &str,
    ) -> Result<SubscriberInfo, PlatformError> {
        debug!(openid, "requesting subscriber info");
        let res = self
            .http
            .get(self.endpoint("/cgi-bin/user/info"))
            .query(&[
                ("access_token", access_token),
                ("openid", openid),
                ("lang", "zh_CN"),
            ])
            .send()
            .await?;
        decode_reply(res).await
    }
}

async fn decode_reply<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, PlatformError> {
    let status = res.status();
    if !status.is_success() {
        return Err(PlatformError::Status(status.as_u16()));
    }
    let body: serde_json::Value = res.json().await?;
    check_reply(body)
}

/// Reject bodies carrying a non-zero `errcode`, then decode the rest.
fn check_reply<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, PlatformError> {
    let code = body["errcode"].as_i64().unwrap_or(0);
    if code != 0 {
        return Err(PlatformError::Api {
            code,
            message: body["errmsg"].as_str().unwrap_or_default().to_string(),
        });
    }
    Ok(serde_json::from_value(body)?)
}
