//! Shared fixtures for the server's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scanlogin_models::SceneId;
use scanlogin_platform::{
    AccessToken, Platform, PlatformApi, PlatformError, PlatformSettings, QrTicket, SubscriberInfo,
};

use crate::correlator::EventCorrelator;
use crate::login::{LoginFront, PollPolicy};
use crate::state::AppState;
use crate::store::SessionStore;

pub const WEBHOOK_TOKEN: &str = "mytoken123";

/// In-process platform with call counters and scripted failures.
#[derive(Default)]
pub struct StubPlatform {
    token_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    fail_qrcode: AtomicBool,
    fail_profile: AtomicBool,
    /// Lifetime reported for minted codes; `0` means [`Self::QR_EXPIRE_SECONDS`].
    qr_expire_seconds: AtomicI64,
    subscribers: Mutex<HashMap<String, SubscriberInfo>>,
}

impl StubPlatform {
    pub const QR_EXPIRE_SECONDS: i64 = 300;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register `openid` as a follower with an optional remark.
    pub fn follow(&self, openid: &str, remark: &str) {
        self.subscribers.lock().unwrap().insert(
            openid.to_string(),
            SubscriberInfo {
                subscribe: 1,
                openid: openid.to_string(),
                remark: remark.to_string(),
                nickname: String::new(),
            },
        );
    }

    pub fn set_qr_expire_seconds(&self, secs: i64) {
        self.qr_expire_seconds.store(secs, Ordering::SeqCst);
    }

    pub fn fail_qrcode(&self, fail: bool) {
        self.fail_qrcode.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile(&self, fail: bool) {
        self.fail_profile.store(fail, Ordering::SeqCst);
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformApi for StubPlatform {
    async fn fetch_access_token(&self) -> Result<AccessToken, PlatformError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken {
            access_token: format!("stub-token-{n}"),
            expires_in: 7200,
        })
    }

    async fn create_scene_qrcode(
        &self,
        _access_token: &str,
        scene: &SceneId,
        _expire_seconds: u64,
    ) -> Result<QrTicket, PlatformError> {
        if self.fail_qrcode.load(Ordering::SeqCst) {
            return Err(PlatformError::Status(503));
        }
        Ok(QrTicket {
            ticket: format!("ticket-{scene}"),
            expire_seconds: match self.qr_expire_seconds.load(Ordering::SeqCst) {
                0 => Self::QR_EXPIRE_SECONDS,
                secs => secs,
            },
            url: format!("http://weixin.qq.com/q/{scene}"),
        })
    }

    async fn subscriber_info(
        &self,
        _access_token: &str,
        openid: &str,
    ) -> Result<SubscriberInfo, PlatformError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(PlatformError::Status(500));
        }
        Ok(self
            .subscribers
            .lock()
            .unwrap()
            .get(openid)
            .cloned()
            .unwrap_or_else(|| SubscriberInfo {
                openid: openid.to_string(),
                ..SubscriberInfo::default()
            }))
    }
}

pub fn platform(stub: &Arc<StubPlatform>) -> Platform {
    let api: Arc<dyn PlatformApi> = stub.clone();
    Platform::new(api, PlatformSettings::default())
}

/// Full application state over `stub`, signed with [`WEBHOOK_TOKEN`].
pub fn app_state(stub: &Arc<StubPlatform>, poll_policy: PollPolicy) -> AppState {
    let sessions = Arc::new(SessionStore::new());
    let platform = platform(stub);
    AppState {
        login: LoginFront::new(
            sessions.clone(),
            platform.clone(),
            Duration::from_secs(300),
            poll_policy,
        ),
        correlator: EventCorrelator::new(sessions.clone(), platform),
        sessions,
        webhook_token: WEBHOOK_TOKEN.to_string(),
    }
}
