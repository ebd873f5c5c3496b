//! Credential-aware facade over [`PlatformApi`].
//!
//! Login code asks for "a QR code for this scene" or "this user's profile";
//! [`Platform`] fetches the access token from the [`CredentialCache`],
//! performs the call, and invalidates the token if the platform rejects it.
//! It never retries: the failing call is reported to its caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use scanlogin_models::SceneId;

use crate::api::{PlatformApi, SubscriberInfo};
use crate::credential::{Credential, CredentialCache, DEFAULT_CREDENTIAL_MARGIN_SECS};
use crate::error::PlatformError;

/// Default base URL of the QR image endpoint.
pub const DEFAULT_QRCODE_BASE: &str = "https://mp.weixin.qq.com/cgi-bin/showqrcode";

/// Settings for [`Platform`].
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    /// Safety margin subtracted from token lifetimes.
    pub credential_margin: Duration,
    /// Base URL of the QR image endpoint.
    pub qrcode_base: String,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            credential_margin: Duration::from_secs(DEFAULT_CREDENTIAL_MARGIN_SECS.unsigned_abs()),
            qrcode_base: DEFAULT_QRCODE_BASE.to_string(),
        }
    }
}

/// A minted scannable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneCode {
    /// Platform ticket.
    pub ticket: String,
    /// URL of the rendered QR image.
    pub image_url: String,
    /// Lifetime in seconds reported by the platform.
    pub expire_seconds: u64,
}

/// Platform calls with credential handling folded in.
#[derive(Clone)]
pub struct Platform {
    api: Arc<dyn PlatformApi>,
    credentials: Arc<CredentialCache>,
    qrcode_base: String,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("qrcode_base", &self.qrcode_base)
            .finish_non_exhaustive()
    }
}

impl Platform {
    /// Wrap `api` with a fresh credential cache.
    pub fn new(api: Arc<dyn PlatformApi>, settings: PlatformSettings) -> Self {
        let margin = chrono::Duration::from_std(settings.credential_margin)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_CREDENTIAL_MARGIN_SECS));
        let credentials = Arc::new(CredentialCache::new(api.clone(), margin));
        Self {
            api,
            credentials,
            qrcode_base: settings.qrcode_base,
        }
    }

    /// The shared credential cache.
    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Mint a temporary QR code bound to `scene`.
    pub async fn mint_scene_code(
        &self,
        scene: &SceneId,
        ttl: Duration,
    ) -> Result<SceneCode, PlatformError> {
        let requested = ttl.as_secs();
        let ticket = self
            .with_credential(|token| async move {
                self.api.create_scene_qrcode(&token, scene, requested).await
            })
            .await?;

        let image_url = Url::parse_with_params(&self.qrcode_base, &[("ticket", &ticket.ticket)])
            .map_err(|e| PlatformError::Config(format!("invalid QR code base URL: {e}")))?;

        let expire_seconds = u64::try_from(ticket.expire_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .unwrap_or(requested);

        Ok(SceneCode {
            ticket: ticket.ticket,
            image_url: image_url.to_string(),
            expire_seconds,
        })
    }

    /// Fetch the profile and subscription flag of `openid`.
    pub async fn subscriber_state(&self, openid: &str) -> Result<SubscriberInfo, PlatformError> {
        self.with_credential(|token| async move { self.api.subscriber_info(&token, openid).await })
            .await
    }

    async fn with_credential<T, F, Fut>(&self, call: F) -> Result<T, PlatformError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let credential: Credential = self.credentials.get().await?;
        let result = call(credential.value.clone()).await;
        if let Err(e) = &result {
            if e.is_credential_rejected() {
                self.credentials.invalidate(&credential).await;
            }
        }
        result
    }
}
