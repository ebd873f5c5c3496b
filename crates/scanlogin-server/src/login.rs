//! Client-facing login operations: issuing sessions and answering polls.

use std::sync::Arc;
use std::time::Duration;

use scanlogin_models::{NewSessionResponse, SceneId, SessionView};
use scanlogin_platform::Platform;
use tracing::{error, info};

use crate::error::AppError;
use crate::store::{SessionStore, StoreError};

/// What a poll does with a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPolicy {
    /// Polls are pure reads; the sweeper removes sessions.
    #[default]
    Retain,
    /// The poll that first observes completion removes the session.
    ConsumeCompleted,
}

/// Issues sessions and answers polls.
#[derive(Debug, Clone)]
pub struct LoginFront {
    sessions: Arc<SessionStore>,
    platform: Platform,
    qr_ttl: Duration,
    poll_policy: PollPolicy,
}

impl LoginFront {
    pub fn new(
        sessions: Arc<SessionStore>,
        platform: Platform,
        qr_ttl: Duration,
        poll_policy: PollPolicy,
    ) -> Self {
        Self {
            sessions,
            platform,
            qr_ttl,
            poll_policy,
        }
    }

    /// Mint a scannable code for a fresh scene and record a pending session.
    pub async fn new_session(&self) -> Result<NewSessionResponse, AppError> {
        let scene = SceneId::generate();
        let code = self.platform.mint_scene_code(&scene, self.qr_ttl).await?;

        let ttl = i64::try_from(code.expire_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        let session = self
            .sessions
            .create(scene, code.image_url, ttl)
            .await
            .inspect_err(|e| {
                if let StoreError::DuplicateScene(scene) = e {
                    error!(scene = %scene, "generated scene collided with a live session");
                }
            })?;

        info!(scene = %session.scene, expires_at = %session.expires_at, "login session issued");
        Ok(NewSessionResponse {
            scene: session.scene,
            qrcode_url: session.qrcode_url,
            ticket: code.ticket,
            expires_at: session.expires_at,
        })
    }

    /// Report the current state of the session for `scene`.
    pub async fn poll(&self, scene: &SceneId) -> Result<SessionView, AppError> {
        let session = match self.poll_policy {
            PollPolicy::Retain => self.sessions.get(scene).await?,
            PollPolicy::ConsumeCompleted => self.sessions.read_consuming(scene).await?,
        };
        Ok(session.to_view())
    }
}
