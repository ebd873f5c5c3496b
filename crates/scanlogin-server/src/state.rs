//! Shared application state.

use std::sync::Arc;

use scanlogin_platform::{
    Platform, PlatformClient, PlatformClientConfig, PlatformError, PlatformSettings,
};
use tracing::info;

use crate::config::AppConfig;
use crate::correlator::EventCorrelator;
use crate::login::LoginFront;
use crate::store::SessionStore;

/// State shared across all Axum handlers.
#[derive(Debug)]
pub struct AppState {
    /// Session issuing and polling.
    pub login: LoginFront,
    /// Webhook event handling.
    pub correlator: EventCorrelator,
    /// The session store both of the above operate on.
    pub sessions: Arc<SessionStore>,
    /// Token webhook signatures are checked against.
    pub webhook_token: String,
}

impl AppState {
    /// Wire the HTTP platform client, credential cache and session store.
    pub fn from_config(config: &AppConfig) -> Result<Self, PlatformError> {
        let client = PlatformClient::new(
            PlatformClientConfig::new(&config.app_id, &config.app_secret)
                .with_api_base(&config.api_base)
                .with_timeout(config.upstream_timeout),
        )?;
        info!(api_base = %config.api_base, app_id = %config.app_id, "platform client configured");

        let platform = Platform::new(
            Arc::new(client),
            PlatformSettings {
                credential_margin: config.credential_margin,
                qrcode_base: config.qrcode_base.clone(),
            },
        );
        let sessions = Arc::new(SessionStore::new());

        Ok(Self {
            login: LoginFront::new(
                sessions.clone(),
                platform.clone(),
                config.qr_ttl,
                config.poll_policy,
            ),
            correlator: EventCorrelator::new(sessions.clone(), platform),
            sessions,
            webhook_token: config.webhook_token.clone(),
        })
    }
}
