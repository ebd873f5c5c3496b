//! Mock messaging platform for local development.
//!
//! Serves the three upstream calls the login server makes (access token,
//! scene QR code, subscriber info) from in-memory state, and exposes a
//! `/mock/*` control surface that plays the user's phone: scanning a code
//! delivers a signed scene event to the login server's webhook.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use rand::{rngs::OsRng, Rng, RngCore};
use scanlogin_models::{PlatformMessage, SceneId};
use scanlogin_platform::signature::compute_signature;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Mock upstream platform for the scan-to-login server.
#[derive(Parser, Debug, Clone)]
#[command(name = "mock-platform", about = "Mock upstream platform for scan-to-login")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 4000)]
    port: u16,
    /// App id the login server must present.
    #[arg(long, default_value = "mock-app")]
    app_id: String,
    /// App secret the login server must present.
    #[arg(long, default_value = "mock-secret")]
    app_secret: String,
    /// Shared token used to sign webhook deliveries.
    #[arg(long, default_value = "mytoken123")]
    token: String,
    /// Webhook URL scene events are delivered to.
    #[arg(long, default_value = "http://localhost:8080/wechat/message")]
    callback: String,
    /// Account id put in `ToUserName`.
    #[arg(long, default_value = "gh_mock")]
    account: String,
    /// Lifetime of issued access tokens, in seconds.
    #[arg(long, default_value_t = 7200)]
    token_ttl: i64,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct IssuedTicket {
    scene: SceneId,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    /// Access token -> expiry.
    tokens: HashMap<String, DateTime<Utc>>,
    /// Ticket -> scene it was minted for.
    tickets: HashMap<String, IssuedTicket>,
    /// Follower openid -> remark.
    followers: HashMap<String, String>,
}

struct MockState {
    args: Args,
    http: reqwest::Client,
    inner: Mutex<Inner>,
}

impl MockState {
    fn new(args: Args) -> Self {
        Self {
            args,
            http: reqwest::Client::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn token_valid(&self, token: &str) -> bool {
        self.inner()
            .tokens
            .get(token)
            .is_some_and(|expires_at| *expires_at > Utc::now())
    }
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn api_error(code: i64, message: &str) -> Json<Value> {
    Json(json!({ "errcode": code, "errmsg": message }))
}

fn invalid_credential() -> Json<Value> {
    api_error(40001, "invalid credential, access_token is invalid or not latest")
}

// ---------------------------------------------------------------------------
// Platform endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TokenParams {
    #[serde(default)]
    appid: String,
    #[serde(default)]
    secret: String,
}

async fn token(State(state): State<Arc<MockState>>, Query(params): Query<TokenParams>) -> Json<Value> {
    if params.appid != state.args.app_id {
        warn!(appid = %params.appid, "token request with unknown appid");
        return api_error(40013, "invalid appid");
    }
    if params.secret != state.args.app_secret {
        warn!("token request with wrong secret");
        return api_error(40125, "invalid appsecret");
    }

    let access_token = random_token(32);
    let expires_at = Utc::now() + Duration::seconds(state.args.token_ttl);
    state.inner().tokens.insert(access_token.clone(), expires_at);
    info!(expires_in = state.args.token_ttl, "access token issued");

    Json(json!({
        "access_token": access_token,
        "expires_in": state.args.token_ttl,
    }))
}

#[derive(Deserialize)]
struct AccessTokenParam {
    #[serde(default)]
    access_token: String,
}

async fn create_qrcode(
    State(state): State<Arc<MockState>>,
    Query(param): Query<AccessTokenParam>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if !state.token_valid(&param.access_token) {
        return invalid_credential();
    }
    if body["action_name"] != "QR_STR_SCENE" {
        return api_error(40097, "invalid args: only QR_STR_SCENE is supported");
    }
    let Ok(scene) = SceneId::parse(
        body["action_info"]["scene"]["scene_str"]
            .as_str()
            .unwrap_or_default(),
    ) else {
        return api_error(40097, "invalid args: scene_str");
    };
    let expire_seconds = body["expire_seconds"].as_i64().unwrap_or(30).clamp(60, 2_592_000);

    let ticket = random_token(24);
    state.inner().tickets.insert(
        ticket.clone(),
        IssuedTicket {
            scene: scene.clone(),
            expires_at: Utc::now() + Duration::seconds(expire_seconds),
        },
    );
    info!(scene = %scene, expire_seconds, "scene QR code minted");

    Json(json!({
        "ticket": ticket,
        "expire_seconds": expire_seconds,
        "url": format!("http://weixin.qq.com/q/{ticket}"),
    }))
}

#[derive(Deserialize)]
struct UserInfoParams {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    openid: String,
}

async fn user_info(
    State(state): State<Arc<MockState>>,
    Query(params): Query<UserInfoParams>,
) -> Json<Value> {
    if !state.token_valid(&params.access_token) {
        return invalid_credential();
    }
    if params.openid.is_empty() {
        return api_error(40003, "invalid openid");
    }
    let remark = state.inner().followers.get(&params.openid).cloned();
    Json(match remark {
        Some(remark) => json!({
            "subscribe": 1,
            "openid": params.openid,
            "remark": remark,
            "nickname": "",
        }),
        None => json!({ "subscribe": 0, "openid": params.openid }),
    })
}

#[derive(Deserialize)]
struct ShowParams {
    #[serde(default)]
    ticket: String,
}

/// Stand-in for the QR image: a text description of what the code encodes.
async fn show_qrcode(
    State(state): State<Arc<MockState>>,
    Query(params): Query<ShowParams>,
) -> impl IntoResponse {
    match state.inner().tickets.get(&params.ticket) {
        Some(issued) => (
            StatusCode::OK,
            format!("scene={} expires_at={}", issued.scene, issued.expires_at),
        ),
        None => (StatusCode::NOT_FOUND, "unknown ticket".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Control endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ScanRequest {
    /// Ticket of the scanned code; takes precedence over `scene`.
    ticket: Option<String>,
    /// Scene to scan directly, for codes this mock did not mint.
    scene: Option<String>,
    openid: String,
    /// Remark to attach when the user follows for the first time.
    #[serde(default)]
    remark: String,
}

/// `POST /mock/scan`: the user scans a code with their phone.
///
/// Unknown users follow the account and produce a `subscribe` event; known
/// followers produce `SCAN`. The event is signed and delivered to the
/// configured callback, and the callback's reply is returned.
async fn scan(
    State(state): State<Arc<MockState>>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let bad = |msg: String| (StatusCode::BAD_REQUEST, msg);

    let (scene, ticket) = match (&req.ticket, &req.scene) {
        (Some(ticket), _) => {
            let scene = state
                .inner()
                .tickets
                .get(ticket)
                .map(|issued| issued.scene.clone())
                .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown ticket {ticket}")))?;
            (scene, ticket.clone())
        }
        (None, Some(scene)) => (
            SceneId::parse(scene).map_err(|e| bad(e.to_string()))?,
            String::new(),
        ),
        (None, None) => return Err(bad("ticket or scene is required".into())),
    };
    if req.openid.is_empty() {
        return Err(bad("openid is required".into()));
    }

    let first_follow = {
        let mut inner = state.inner();
        let first = !inner.followers.contains_key(&req.openid);
        if first {
            inner.followers.insert(req.openid.clone(), req.remark.clone());
        }
        first
    };

    let now = Utc::now();
    let message = PlatformMessage::scene_event(
        &state.args.account,
        &req.openid,
        &scene,
        &ticket,
        first_follow,
        now.timestamp(),
    );
    let body = message
        .to_xml()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let timestamp = now.timestamp().to_string();
    let nonce = OsRng.gen_range(100_000_000u32..1_000_000_000).to_string();
    let signature = compute_signature(&state.args.token, &timestamp, &nonce);

    info!(scene = %scene, openid = %req.openid, event = %message.event, "delivering scan event");
    let res = state
        .http
        .post(&state.args.callback)
        .query(&[
            ("signature", signature.as_str()),
            ("timestamp", timestamp.as_str()),
            ("nonce", nonce.as_str()),
        ])
        .header(reqwest::header::CONTENT_TYPE, "text/xml")
        .body(body)
        .send()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("callback unreachable: {e}")))?;

    let status = res.status().as_u16();
    let reply = res.text().await.unwrap_or_default();
    Ok(Json(json!({
        "scene": scene,
        "event": message.event,
        "callback_status": status,
        "callback_reply": reply,
    })))
}

#[derive(Deserialize)]
struct OpenIdRequest {
    openid: String,
}

/// `POST /mock/unfollow`: the user stops following the account.
async fn unfollow(State(state): State<Arc<MockState>>, Json(req): Json<OpenIdRequest>) -> StatusCode {
    if state.inner().followers.remove(&req.openid).is_some() {
        info!(openid = %req.openid, "user unfollowed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// `POST /mock/revoke-tokens`: invalidate every issued access token.
async fn revoke_tokens(State(state): State<Arc<MockState>>) -> StatusCode {
    let revoked = std::mem::take(&mut state.inner().tokens).len();
    info!(revoked, "access tokens revoked");
    StatusCode::NO_CONTENT
}

fn app(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/cgi-bin/token", get(token))
        .route("/cgi-bin/qrcode/create", post(create_qrcode))
        .route("/cgi-bin/user/info", get(user_info))
        .route("/cgi-bin/showqrcode", get(show_qrcode))
        .route("/mock/scan", post(scan))
        .route("/mock/unfollow", post(unfollow))
        .route("/mock/revoke-tokens", post(revoke_tokens))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = format!("0.0.0.0:{}", args.port);
    info!(callback = %args.callback, app_id = %args.app_id, "mock platform configured");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "mock platform listening");
    axum::serve(listener, app(Arc::new(MockState::new(args))))
        .await
        .context("server error")
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use scanlogin_platform::signature::verify_signature;

    use super::*;

    fn args(callback: &str) -> Args {
        Args {
            port: 0,
            app_id: "mock-app".into(),
            app_secret: "mock-secret".into(),
            token: "mytoken123".into(),
            callback: callback.into(),
            account: "gh_mock".into(),
            token_ttl: 7200,
        }
    }

    fn server(callback: &str) -> TestServer {
        TestServer::new(app(Arc::new(MockState::new(args(callback))))).unwrap()
    }

    async fn access_token(server: &TestServer) -> String {
        let body: Value = server
            .get("/cgi-bin/token")
            .add_query_param("grant_type", "client_credential")
            .add_query_param("appid", "mock-app")
            .add_query_param("secret", "mock-secret")
            .await
            .json();
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn mint(server: &TestServer, token: &str, scene: &str) -> Value {
        server
            .post("/cgi-bin/qrcode/create")
            .add_query_param("access_token", token)
            .json(&json!({
                "expire_seconds": 300,
                "action_name": "QR_STR_SCENE",
                "action_info": { "scene": { "scene_str": scene } },
            }))
            .await
            .json()
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let server = server("http://127.0.0.1:9/unused");
        let body: Value = server
            .get("/cgi-bin/token")
            .add_query_param("appid", "mock-app")
            .add_query_param("secret", "nope")
            .await
            .json();
        assert_eq!(body["errcode"], 40125);
    }

    #[tokio::test]
    async fn qrcode_requires_valid_token() {
        let server = server("http://127.0.0.1:9/unused");

        let rejected = mint(&server, "forged", "abc123").await;
        assert_eq!(rejected["errcode"], 40001);

        let token = access_token(&server).await;
        let minted = mint(&server, &token, "abc123").await;
        assert_eq!(minted["expire_seconds"], 300);
        let ticket = minted["ticket"].as_str().unwrap();

        let shown = server
            .get("/cgi-bin/showqrcode")
            .add_query_param("ticket", ticket)
            .await;
        shown.assert_status_ok();
        assert!(shown.text().starts_with("scene=abc123"));
    }

    #[tokio::test]
    async fn revoked_tokens_stop_working() {
        let server = server("http://127.0.0.1:9/unused");
        let token = access_token(&server).await;
        server.post("/mock/revoke-tokens").await;

        let body: Value = server
            .get("/cgi-bin/user/info")
            .add_query_param("access_token", &token)
            .add_query_param("openid", "OPENID1")
            .await
            .json();
        assert_eq!(body["errcode"], 40001);
    }

    #[tokio::test]
    async fn scan_delivers_signed_event_and_follows() {
        let received: Arc<Mutex<Vec<(HashMap<String, String>, String)>>> = Arc::default();
        let webhook = {
            let received = received.clone();
            Router::new().route(
                "/wechat/message",
                post(move |Query(q): Query<HashMap<String, String>>, body: String| {
                    let received = received.clone();
                    async move {
                        received.lock().unwrap().push((q, body));
                        "success"
                    }
                }),
            )
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let callback = format!("http://{}/wechat/message", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, webhook).await });

        let server = server(&callback);
        let token = access_token(&server).await;
        let minted = mint(&server, &token, "abc123").await;

        let first: Value = server
            .post("/mock/scan")
            .json(&json!({ "ticket": minted["ticket"], "openid": "OPENID1", "remark": "vip" }))
            .await
            .json();
        assert_eq!(first["event"], "subscribe");
        assert_eq!(first["callback_reply"], "success");

        let second: Value = server
            .post("/mock/scan")
            .json(&json!({ "scene": "abc123", "openid": "OPENID1" }))
            .await
            .json();
        assert_eq!(second["event"], "SCAN");

        let deliveries = received.lock().unwrap().clone();
        assert_eq!(deliveries.len(), 2);
        let (query, body) = &deliveries[0];
        assert!(verify_signature(
            "mytoken123",
            &query["signature"],
            &query["timestamp"],
            &query["nonce"]
        ));
        let message = PlatformMessage::from_xml(body).unwrap();
        assert_eq!(message.event_key, "qrscene_abc123");
        assert_eq!(message.from_user_name, "OPENID1");

        let info: Value = server
            .get("/cgi-bin/user/info")
            .add_query_param("access_token", &token)
            .add_query_param("openid", "OPENID1")
            .await
            .json();
        assert_eq!(info["subscribe"], 1);
        assert_eq!(info["remark"], "vip");
    }

    #[tokio::test]
    async fn unfollowed_user_reports_unsubscribed() {
        let server = server("http://127.0.0.1:9/unused");
        let token = access_token(&server).await;
        state_follow(&server, "OPENID1").await;

        server
            .post("/mock/unfollow")
            .json(&json!({ "openid": "OPENID1" }))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let info: Value = server
            .get("/cgi-bin/user/info")
            .add_query_param("access_token", &token)
            .add_query_param("openid", "OPENID1")
            .await
            .json();
        assert_eq!(info["subscribe"], 0);
    }

    /// Make `openid` a follower; the scan's delivery fails but the follow sticks.
    async fn state_follow(server: &TestServer, openid: &str) {
        server
            .post("/mock/scan")
            .json(&json!({ "scene": "abc123", "openid": openid }))
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn scan_of_unknown_ticket_is_not_found() {
        let server = server("http://127.0.0.1:9/unused");
        server
            .post("/mock/scan")
            .json(&json!({ "ticket": "nope", "openid": "OPENID1" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
