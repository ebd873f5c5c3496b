//! Webhook payloads.
//!
//! The platform POSTs an XML document ([`PlatformMessage`]) for every
//! user interaction with the account. Only two event kinds matter for login:
//!
//! * `subscribe`: a user who did not follow the account scanned the code and
//!   followed it; `EventKey` is `qrscene_{scene}`.
//! * `SCAN`: a user who already follows the account scanned the code;
//!   `EventKey` is the bare scene.
//!
//! Everything else is classified as [`EventKind::Other`] and ignored.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::scene::SceneId;

/// Prefix the platform puts in front of the scene on `subscribe` events.
pub const SUBSCRIBE_SCENE_PREFIX: &str = "qrscene_";

// ---------------------------------------------------------------------------
// PlatformMessage
// ---------------------------------------------------------------------------

/// Raw webhook document as delivered by the platform.
///
/// Unknown elements (e.g. `Content` on text messages) are ignored.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename = "xml")]
pub struct PlatformMessage {
    /// Account that received the message.
    #[serde(rename = "ToUserName", default)]
    pub to_user_name: String,
    /// OpenID of the sender.
    #[serde(rename = "FromUserName", default)]
    pub from_user_name: String,
    /// Unix timestamp set by the platform.
    #[serde(rename = "CreateTime", default)]
    pub create_time: i64,
    /// Message type; `event` for the notifications handled here.
    #[serde(rename = "MsgType", default)]
    pub msg_type: String,
    /// Event name (`subscribe`, `SCAN`, `unsubscribe`, ...).
    #[serde(rename = "Event", default)]
    pub event: String,
    /// Scene key bound to the scanned code.
    #[serde(rename = "EventKey", default)]
    pub event_key: String,
    /// Ticket of the scanned code.
    #[serde(rename = "Ticket", default)]
    pub ticket: String,
}

impl PlatformMessage {
    /// Build the event the platform sends when `subject` scans the code for
    /// `scene`. A first-time follower produces `subscribe`, a returning
    /// follower produces `SCAN`.
    pub fn scene_event(
        account: &str,
        subject: &str,
        scene: &SceneId,
        ticket: &str,
        first_follow: bool,
        create_time: i64,
    ) -> Self {
        let (event, event_key) = if first_follow {
            ("subscribe", format!("{SUBSCRIBE_SCENE_PREFIX}{scene}"))
        } else {
            ("SCAN", scene.to_string())
        };
        Self {
            to_user_name: account.to_string(),
            from_user_name: subject.to_string(),
            create_time,
            msg_type: "event".to_string(),
            event: event.to_string(),
            event_key,
            ticket: ticket.to_string(),
        }
    }

    /// Decode a webhook body.
    pub fn from_xml(body: &str) -> Result<Self, ModelError> {
        quick_xml::de::from_str(body).map_err(|e| ModelError::MalformedMessage(e.to_string()))
    }

    /// Encode as the XML document the platform would send.
    pub fn to_xml(&self) -> Result<String, ModelError> {
        quick_xml::se::to_string(self).map_err(|e| ModelError::MalformedMessage(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// InboundEvent
// ---------------------------------------------------------------------------

/// Classification of a webhook message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    /// First follow through a scene code.
    Subscribed,
    /// Existing follower scanned a scene code.
    Scanned,
    /// Anything else.
    Other,
}

impl EventKind {
    /// Classify a message from its `MsgType` and `Event` fields.
    pub fn classify(msg_type: &str, event: &str) -> Self {
        if !msg_type.trim().eq_ignore_ascii_case("event") {
            return Self::Other;
        }
        let event = event.trim();
        if event.eq_ignore_ascii_case("subscribe") {
            Self::Subscribed
        } else if event.eq_ignore_ascii_case("scan") {
            Self::Scanned
        } else {
            Self::Other
        }
    }
}

/// A webhook message reduced to what correlation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Which kind of notification this is.
    pub kind: EventKind,
    /// `EventKey` exactly as received.
    pub scene_key: String,
    /// OpenID of the user who scanned.
    pub subject: String,
}

impl InboundEvent {
    /// Returns `true` if the event can complete a login.
    pub fn is_login_event(&self) -> bool {
        matches!(self.kind, EventKind::Subscribed | EventKind::Scanned)
    }

    /// Derive the scene this event refers to.
    ///
    /// `subscribe` keys lose their [`SUBSCRIBE_SCENE_PREFIX`]; `SCAN` keys are
    /// used verbatim. An empty result is an error.
    pub fn scene(&self) -> Result<SceneId, ModelError> {
        let key = match self.kind {
            EventKind::Subscribed => self
                .scene_key
                .strip_prefix(SUBSCRIBE_SCENE_PREFIX)
                .unwrap_or(&self.scene_key),
            EventKind::Scanned | EventKind::Other => &self.scene_key,
        };
        SceneId::parse(key)
    }
}

impl From<&PlatformMessage> for InboundEvent {
    fn from(msg: &PlatformMessage) -> Self {
        Self {
            kind: EventKind::classify(&msg.msg_type, &msg.event),
            scene_key: msg.event_key.clone(),
            subject: msg.from_user_name.clone(),
        }
    }
}
