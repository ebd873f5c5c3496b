//! Webhook event correlation.
//!
//! Turns a verified inbound event into at most one session completion. The
//! order of checks matters:
//!
//! 1. events that cannot complete a login are ignored;
//! 2. the scene is derived from the event key and must name a live session;
//! 3. an already-completed session short-circuits without an upstream call;
//! 4. the subscriber's current state is fetched and must show a follow;
//! 5. the store performs the compare-and-set completion.
//!
//! No store lock is held while the subscriber lookup is in flight, so two
//! deliveries for the same scene may both reach step 5. The store resolves
//! that race; the loser reports [`Correlation::AlreadyCompleted`].

use std::sync::Arc;

use scanlogin_models::{EventKind, InboundEvent, SceneId};
use scanlogin_platform::{Platform, PlatformError};
use tracing::debug;

use crate::store::{CompleteOutcome, SessionStore, StoreError};

/// What happened to a handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// Not a login event.
    Ignored(EventKind),
    /// This event completed the session.
    Completed {
        /// Scene that was completed.
        scene: SceneId,
        /// Subject now bound to it.
        subject: String,
    },
    /// The session had already been completed by an earlier event.
    AlreadyCompleted {
        /// Scene the event referred to.
        scene: SceneId,
        /// Subject bound by the earlier event.
        subject: String,
    },
}

/// Reasons an event was dropped. None of them change any session.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    /// The event lacks a usable scene key or subject.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// No session for the scene; unknown, or already evicted.
    #[error("no session for scene {0}")]
    NotFound(SceneId),

    /// The subscriber lookup says the user does not follow the account.
    #[error("{subject} is not subscribed (scene {scene})")]
    NotSubscribed {
        /// Scene the event referred to.
        scene: SceneId,
        /// Subject that scanned.
        subject: String,
    },

    /// The subscriber lookup failed.
    #[error("subscriber lookup failed: {0}")]
    Upstream(#[from] PlatformError),
}

/// Applies inbound events to the session store.
#[derive(Debug, Clone)]
pub struct EventCorrelator {
    sessions: Arc<SessionStore>,
    platform: Platform,
}

impl EventCorrelator {
    pub fn new(sessions: Arc<SessionStore>, platform: Platform) -> Self {
        Self { sessions, platform }
    }

    /// Correlate one event with its session.
    pub async fn handle(&self, event: &InboundEvent) -> Result<Correlation, CorrelationError> {
        if !event.is_login_event() {
            return Ok(Correlation::Ignored(event.kind));
        }

        let scene = event
            .scene()
            .map_err(|e| CorrelationError::InvalidEvent(e.to_string()))?;
        let subject = event.subject.trim();
        if subject.is_empty() {
            return Err(CorrelationError::InvalidEvent(
                "event carries no subject".into(),
            ));
        }

        let session = self.sessions.get(&scene).await.map_err(not_found)?;
        if let (true, Some(bound)) = (session.is_completed(), session.subject) {
            debug!(scene = %scene, "redelivered event for completed session");
            return Ok(Correlation::AlreadyCompleted {
                scene,
                subject: bound,
            });
        }

        let info = self.platform.subscriber_state(subject).await?;
        if !info.is_subscribed() {
            return Err(CorrelationError::NotSubscribed {
                scene,
                subject: subject.to_string(),
            });
        }

        let outcome = self
            .sessions
            .complete(&scene, subject, info.display_label())
            .await
            .map_err(not_found)?;
        let bound = outcome.session().subject.clone().unwrap_or_default();
        Ok(match outcome {
            CompleteOutcome::Completed(_) => Correlation::Completed {
                scene,
                subject: bound,
            },
            CompleteOutcome::AlreadyCompleted(_) => Correlation::AlreadyCompleted {
                scene,
                subject: bound,
            },
        })
    }
}

fn not_found(err: StoreError) -> CorrelationError {
    match err {
        StoreError::NotFound(scene) | StoreError::DuplicateScene(scene) => {
            CorrelationError::NotFound(scene)
        }
    }
}
