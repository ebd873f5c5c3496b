//! The upstream calls, as a trait.
//!
//! [`PlatformApi`] is the seam between the login core and the network.
//! [`crate::PlatformClient`] implements it over HTTP; tests implement it with
//! call-counting stubs.

use async_trait::async_trait;
use scanlogin_models::SceneId;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Access token issued by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Bearer value passed as `access_token` on every other call.
    pub access_token: String,
    /// Lifetime in seconds as declared by the platform.
    pub expires_in: i64,
}

/// Temporary QR code ticket bound to a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrTicket {
    /// Ticket used to fetch the QR image.
    pub ticket: String,
    /// Lifetime in seconds; `0` if the platform omitted it.
    #[serde(default)]
    pub expire_seconds: i64,
    /// Content encoded in the QR image.
    #[serde(default)]
    pub url: String,
}

/// Subscriber profile as returned by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberInfo {
    /// `1` if the user follows the account.
    #[serde(default)]
    pub subscribe: i32,
    /// OpenID of the user.
    #[serde(default)]
    pub openid: String,
    /// Remark the account operator attached to the user.
    #[serde(default)]
    pub remark: String,
    /// Nickname, when the platform still provides it.
    #[serde(default)]
    pub nickname: String,
}

impl SubscriberInfo {
    /// Whether the user currently follows the account.
    pub fn is_subscribed(&self) -> bool {
        self.subscribe == 1
    }

    /// Label attached to a completed session: the remark, if any.
    pub fn display_label(&self) -> Option<String> {
        let remark = self.remark.trim();
        (!remark.is_empty()).then(|| remark.to_string())
    }
}

/// The black-box calls made against the platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Obtain a fresh account-level access token.
    async fn fetch_access_token(&self) -> Result<AccessToken, PlatformError>;

    /// Mint a temporary string-scene QR code valid for `expire_seconds`.
    async fn create_scene_qrcode(
        &self,
        access_token: &str,
        scene: &SceneId,
        expire_seconds: u64,
    ) -> Result<QrTicket, PlatformError>;

    /// Look up a user's relationship with the account.
    async fn subscriber_info(
        &self,
        access_token: &str,
        openid: &str,
    ) -> Result<SubscriberInfo, PlatformError>;
}
