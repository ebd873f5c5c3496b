//! HTTP surface: client endpoints and the platform webhook.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::routing::get;
use scanlogin_models::{InboundEvent, NewSessionResponse, PlatformMessage, SceneId, SessionView};
use scanlogin_platform::signature::verify_signature;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::correlator::{Correlation, CorrelationError};
use crate::error::AppError;
use crate::state::AppState;

/// Body the platform expects in reply to every webhook delivery.
pub const WEBHOOK_ACK: &str = "success";

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/session/new", get(new_session).post(new_session))
        .route("/session/{scene}", get(poll_session))
        .route("/login/check", get(check_login))
        .route("/wechat/message", get(verify_webhook).post(receive_webhook))
        .route("/healthz", get(healthz))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Client endpoints
// ---------------------------------------------------------------------------

/// `GET|POST /session/new`: issue a scannable code for a new session.
async fn new_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NewSessionResponse>, AppError> {
    state.login.new_session().await.map(Json)
}

/// `GET /session/{scene}`: report login progress.
async fn poll_session(
    State(state): State<Arc<AppState>>,
    Path(scene): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let scene = SceneId::parse(&scene).map_err(|_| AppError::NotFound(scene))?;
    state.login.poll(&scene).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct CheckQuery {
    scene_str: Option<String>,
}

/// `GET /login/check?scene_str=…`: query-string form of the poll.
async fn check_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<SessionView>, AppError> {
    let raw = query
        .scene_str
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing scene_str".into()))?;
    let scene = SceneId::parse(&raw).map_err(|_| AppError::NotFound(raw))?;
    state.login.poll(&scene).await.map(Json)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    sessions: usize,
}

/// `GET /healthz`: liveness plus the number of sessions held.
async fn healthz(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        sessions: state.sessions.len().await,
    })
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Signature parameters appended to every webhook request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WebhookQuery {
    signature: String,
    timestamp: String,
    nonce: String,
    echostr: String,
}

impl WebhookQuery {
    fn verify(&self, token: &str) -> Result<(), AppError> {
        if verify_signature(token, &self.signature, &self.timestamp, &self.nonce) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// `GET /wechat/message`: endpoint ownership check; echoes `echostr`.
async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
) -> Result<String, AppError> {
    query.verify(&state.webhook_token)?;
    info!("webhook endpoint verified");
    Ok(query.echostr)
}

/// `POST /wechat/message`: event delivery.
///
/// Once the signature checks out the platform always gets the acknowledgement,
/// whatever correlation decides; a non-ack would only trigger redelivery.
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<&'static str, AppError> {
    query.verify(&state.webhook_token)?;

    let Ok(body) = std::str::from_utf8(&body) else {
        warn!(len = body.len(), "invalid event: webhook body is not UTF-8");
        return Ok(WEBHOOK_ACK);
    };
    let message = match PlatformMessage::from_xml(body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "invalid event: undecodable webhook body");
            return Ok(WEBHOOK_ACK);
        }
    };

    let event = InboundEvent::from(&message);
    match state.correlator.handle(&event).await {
        Ok(Correlation::Completed { scene, subject }) => {
            info!(scene = %scene, subject = %subject, "login completed");
        }
        Ok(Correlation::AlreadyCompleted { scene, subject }) => {
            info!(scene = %scene, subject = %subject, "duplicate delivery for completed login");
        }
        Ok(Correlation::Ignored(kind)) => {
            info!(kind = %kind, msg_type = %message.msg_type, "non-login message ignored");
        }
        Err(e @ CorrelationError::Upstream(_)) => {
            warn!(error = %e, subject = %event.subject, "event dropped");
        }
        Err(e) => {
            warn!(error = %e, key = %event.scene_key, "event dropped");
        }
    }
    Ok(WEBHOOK_ACK)
}
