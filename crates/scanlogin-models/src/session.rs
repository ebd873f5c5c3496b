//! Login session records and their public projections.
//!
//! A [`LoginSession`] is created when a client asks for a scannable code and
//! completed once the platform reports that a subscribed user scanned it.
//! Clients never see the record itself, only [`NewSessionResponse`] and
//! [`SessionView`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::scene::SceneId;

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Progress of a login attempt. The only transition is `Pending → Completed`.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
pub enum SessionStatus {
    /// Waiting for the code to be scanned.
    #[serde(rename = "pending")]
    #[strum(to_string = "pending")]
    Pending,
    /// A subscribed user scanned the code.
    #[serde(rename = "ok", alias = "subscribed")]
    #[strum(to_string = "ok", serialize = "subscribed")]
    Completed,
}

// ---------------------------------------------------------------------------
// LoginSession
// ---------------------------------------------------------------------------

/// Server-side record of one login attempt.
///
/// `subject` is `Some` exactly when `status` is [`SessionStatus::Completed`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    /// Correlation token embedded in the scannable code.
    pub scene: SceneId,
    /// Current progress.
    pub status: SessionStatus,
    /// Platform OpenID of the user who completed the login.
    pub subject: Option<String>,
    /// Annotation taken from the subscriber profile at completion.
    pub display_label: Option<String>,
    /// Image URL of the scannable code.
    pub qrcode_url: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the scannable code stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl LoginSession {
    /// Build a pending session valid for `ttl` from `created_at`.
    ///
    /// A `ttl` reaching past the representable range saturates at
    /// [`DateTime::<Utc>::MAX_UTC`].
    pub fn new(
        scene: SceneId,
        qrcode_url: impl Into<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            scene,
            status: SessionStatus::Pending,
            subject: None,
            display_label: None,
            qrcode_url: qrcode_url.into(),
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Returns `true` once the login has been completed.
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Returns `true` if the record may be dropped at `now`, i.e. it expired
    /// more than `grace` ago. A deadline past the representable range is
    /// never reached.
    pub fn is_evictable(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.expires_at
            .checked_add_signed(grace)
            .is_some_and(|deadline| deadline < now)
    }

    /// Public projection returned to polling clients.
    pub fn to_view(&self) -> SessionView {
        SessionView {
            scene: self.scene.clone(),
            status: self.status,
            subject: self.subject.clone(),
            display_label: self.display_label.clone(),
            expires_at: self.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// Response of the new-session endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewSessionResponse {
    /// Scene the client polls with.
    pub scene: SceneId,
    /// Image URL of the scannable code.
    pub qrcode_url: String,
    /// Raw platform ticket, for clients that render the code themselves.
    pub ticket: String,
    /// When the code stops being valid.
    pub expires_at: DateTime<Utc>,
}

/// Response of the poll endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Scene being polled.
    pub scene: SceneId,
    /// Current progress.
    pub status: SessionStatus,
    /// OpenID of the user, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Profile annotation, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_label: Option<String>,
    /// When the code stops being valid.
    pub expires_at: DateTime<Utc>,
}
