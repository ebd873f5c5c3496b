//! In-memory session store.
//!
//! Maps [`SceneId`]s to [`LoginSession`]s. This is the single source of
//! truth for login progress: the login front creates and reads records, the
//! correlator completes them and the sweeper evicts them. Nothing else
//! mutates a session.
//!
//! All operations take the map lock for in-memory work only; callers must
//! not (and cannot) hold it across an upstream call.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use scanlogin_models::{LoginSession, SceneId, SessionStatus};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `create` was called with a scene that is already present.
    #[error("scene {0} already exists")]
    DuplicateScene(SceneId),

    /// No record for the scene (never created, or evicted).
    #[error("no session for scene {0}")]
    NotFound(SceneId),
}

/// Result of a successful [`SessionStore::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// This call moved the session from pending to completed.
    Completed(LoginSession),
    /// The session was already completed; nothing changed.
    AlreadyCompleted(LoginSession),
}

impl CompleteOutcome {
    /// The session after the call.
    pub fn session(&self) -> &LoginSession {
        match self {
            Self::Completed(s) | Self::AlreadyCompleted(s) => s,
        }
    }
}

/// Concurrent map of login sessions keyed by scene.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SceneId, LoginSession>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending session valid for `ttl` from now.
    ///
    /// An existing record is never overwritten.
    pub async fn create(
        &self,
        scene: SceneId,
        qrcode_url: impl Into<String>,
        ttl: Duration,
    ) -> Result<LoginSession, StoreError> {
        let session = LoginSession::new(scene.clone(), qrcode_url, Utc::now(), ttl);
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&scene) {
            return Err(StoreError::DuplicateScene(scene));
        }
        sessions.insert(scene, session.clone());
        debug!(scene = %session.scene, expires_at = %session.expires_at, "session created");
        Ok(session)
    }

    /// Fetch a snapshot of the session for `scene`.
    pub async fn get(&self, scene: &SceneId) -> Result<LoginSession, StoreError> {
        self.sessions
            .read()
            .await
            .get(scene)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(scene.clone()))
    }

    /// Complete the session for `scene` if it is still pending.
    ///
    /// The first caller wins; later calls leave the record untouched and
    /// report [`CompleteOutcome::AlreadyCompleted`].
    pub async fn complete(
        &self,
        scene: &SceneId,
        subject: &str,
        display_label: Option<String>,
    ) -> Result<CompleteOutcome, StoreError> {
        debug_assert!(!subject.is_empty(), "completion requires a subject");

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(scene)
            .ok_or_else(|| StoreError::NotFound(scene.clone()))?;

        match session.status {
            SessionStatus::Completed => Ok(CompleteOutcome::AlreadyCompleted(session.clone())),
            SessionStatus::Pending => {
                session.status = SessionStatus::Completed;
                session.subject = Some(subject.to_string());
                session.display_label = display_label;
                Ok(CompleteOutcome::Completed(session.clone()))
            }
        }
    }

    /// Read the session and, if it is completed, remove it in the same step.
    ///
    /// Pending sessions are returned and kept.
    pub async fn read_consuming(&self, scene: &SceneId) -> Result<LoginSession, StoreError> {
        let mut sessions = self.sessions.write().await;
        let completed = sessions
            .get(scene)
            .ok_or_else(|| StoreError::NotFound(scene.clone()))?
            .is_completed();

        if completed {
            sessions
                .remove(scene)
                .ok_or_else(|| StoreError::NotFound(scene.clone()))
        } else {
            sessions
                .get(scene)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(scene.clone()))
        }
    }

    /// Remove every session that expired more than `grace` before `now`.
    ///
    /// Returns the number of sessions removed.
    pub async fn evict_expired(&self, now: DateTime<Utc>, grace: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_evictable(now, grace));
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "expired sessions evicted");
        }
        evicted
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no sessions are held.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
