//! Process-wide access token cache.
//!
//! Every upstream call needs the account access token, and the platform
//! rate-limits token issuance, so the token is fetched once and shared.
//!
//! # Refresh protocol
//!
//! ```text
//!            fresh? ──yes──▶ return (shared lock only)
//!              │ no
//!              ▼
//!      acquire refresh gate ──▶ fresh now? ──yes──▶ return
//!              │                    │ no
//!              │        earlier attempt failed while waiting? ──yes──▶ same error
//!              ▼                    │ no
//!   Idle ──▶ Refreshing ──(one upstream call)──▶ Idle
//! ```
//!
//! The gate is a mutex held across the single upstream call, so callers that
//! find the token stale queue behind it instead of issuing their own refresh.
//! Callers that find the token fresh never touch the gate.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{AccessToken, PlatformApi};
use crate::error::PlatformError;

/// Default safety margin subtracted from the declared token lifetime.
pub const DEFAULT_CREDENTIAL_MARGIN_SECS: i64 = 60;

/// Upper bound on the token lifetime the platform may declare (one day).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// A cached access token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer value.
    pub value: String,
    /// Instant after which the value must not be used.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build from a platform token, applying `margin` to its lifetime.
    ///
    /// The declared lifetime is clamped to `0..=`[`MAX_TOKEN_LIFETIME_SECS`]; a
    /// margin larger than what is left yields an already-stale credential.
    pub fn from_token(token: AccessToken, issued_at: DateTime<Utc>, margin: Duration) -> Self {
        let lifetime = Duration::seconds(token.expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS));
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .and_then(|deadline| deadline.checked_sub_signed(margin))
            .unwrap_or(issued_at);
        Self {
            value: token.access_token,
            expires_at,
        }
    }

    /// Usable at `now`: non-empty and not past its expiry.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.value.is_empty() && now < self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Whether an upstream refresh is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RefreshPhase {
    /// No refresh in flight.
    Idle,
    /// One caller is fetching a new token.
    Refreshing,
}

#[derive(Debug)]
struct CacheState {
    credential: Option<Credential>,
    phase: RefreshPhase,
    /// Completed refresh attempts, successful or not.
    attempts: u64,
    /// Message of the last attempt, if it failed.
    last_failure: Option<String>,
}

impl CacheState {
    fn fresh(&self, now: DateTime<Utc>) -> Option<&Credential> {
        self.credential.as_ref().filter(|c| c.is_fresh(now))
    }
}

/// Single-flight cache of the platform access token.
pub struct CredentialCache {
    api: Arc<dyn PlatformApi>,
    margin: Duration,
    state: RwLock<CacheState>,
    refresh_gate: Mutex<()>,
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

impl CredentialCache {
    /// Create an empty cache that refreshes through `api`.
    pub fn new(api: Arc<dyn PlatformApi>, margin: Duration) -> Self {
        Self {
            api,
            margin,
            state: RwLock::new(CacheState {
                credential: None,
                phase: RefreshPhase::Idle,
                attempts: 0,
                last_failure: None,
            }),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Return a usable credential, refreshing it if needed.
    pub async fn get(&self) -> Result<Credential, PlatformError> {
        let observed_attempts = {
            let state = self.state.read().await;
            if let Some(credential) = state.fresh(Utc::now()) {
                return Ok(credential.clone());
            }
            state.attempts
        };

        let _gate = self.refresh_gate.lock().await;

        {
            let state = self.state.read().await;
            if let Some(credential) = state.fresh(Utc::now()) {
                debug!("credential refreshed by a concurrent caller");
                return Ok(credential.clone());
            }
            if state.attempts != observed_attempts {
                if let Some(failure) = &state.last_failure {
                    return Err(PlatformError::RefreshFailed(failure.clone()));
                }
            }
        }

        self.state.write().await.phase = RefreshPhase::Refreshing;
        let result = self.api.fetch_access_token().await;
        let issued_at = Utc::now();

        let mut state = self.state.write().await;
        state.phase = RefreshPhase::Idle;
        state.attempts += 1;
        match result {
            Ok(token) => {
                let credential = Credential::from_token(token, issued_at, self.margin);
                info!(expires_at = %credential.expires_at, "access token refreshed");
                state.credential = Some(credential.clone());
                state.last_failure = None;
                Ok(credential)
            }
            Err(e) => {
                warn!(error = %e, "access token refresh failed");
                state.last_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Mark `rejected` as unusable so the next [`get`](Self::get) refreshes.
    ///
    /// A newer credential installed in the meantime is left alone.
    pub async fn invalidate(&self, rejected: &Credential) {
        let mut state = self.state.write().await;
        if let Some(current) = state.credential.as_mut() {
            if current.value == rejected.value {
                warn!("access token rejected by platform, invalidating");
                current.expires_at = current.expires_at.min(Utc::now());
            }
        }
    }

    /// Current refresh phase.
    pub async fn phase(&self) -> RefreshPhase {
        self.state.read().await.phase
    }

    /// Number of upstream refresh attempts made so far.
    pub async fn refresh_count(&self) -> u64 {
        self.state.read().await.attempts
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use scanlogin_models::SceneId;

    use super::*;
    use crate::api::{QrTicket, SubscriberInfo};

    /// Token source that counts calls, sleeps, and fails on demand.
    struct CountingSource {
        calls: AtomicUsize,
        expires_in: i64,
        latency: std::time::Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(expires_in: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in,
                latency: std::time::Duration::from_millis(50),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(7200)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlatformApi for CountingSource {
        async fn fetch_access_token(&self) -> Result<AccessToken, PlatformError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(PlatformError::Status(503));
            }
            Ok(AccessToken {
                access_token: format!("token-{n}"),
                expires_in: self.expires_in,
            })
        }

        async fn create_scene_qrcode(
            &self,
            _access_token: &str,
            _scene: &SceneId,
            _expire_seconds: u64,
        ) -> Result<QrTicket, PlatformError> {
            unreachable!("not used by cache tests")
        }

        async fn subscriber_info(
            &self,
            _access_token: &str,
            _openid: &str,
        ) -> Result<SubscriberInfo, PlatformError> {
            unreachable!("not used by cache tests")
        }
    }

    fn cache(source: &Arc<CountingSource>) -> CredentialCache {
        let api: Arc<dyn PlatformApi> = source.clone();
        CredentialCache::new(api, Duration::seconds(DEFAULT_CREDENTIAL_MARGIN_SECS))
    }

    #[test]
    fn margin_is_subtracted() {
        let now = Utc::now();
        let token = AccessToken {
            access_token: "t".into(),
            expires_in: 7200,
        };
        let credential = Credential::from_token(token, now, Duration::seconds(60));
        assert_eq!(credential.expires_at, now + Duration::seconds(7140));
        assert!(credential.is_fresh(now));
        assert!(!credential.is_fresh(credential.expires_at));
    }

    #[test]
    fn out_of_range_lifetime_is_clamped() {
        let now = Utc::now();
        let huge = AccessToken {
            access_token: "t".into(),
            expires_in: i64::MAX,
        };
        let credential = Credential::from_token(huge, now, Duration::seconds(60));
        assert_eq!(
            credential.expires_at,
            now + Duration::seconds(MAX_TOKEN_LIFETIME_SECS - 60)
        );

        let negative = AccessToken {
            access_token: "t".into(),
            expires_in: i64::MIN,
        };
        let credential = Credential::from_token(negative, now, Duration::seconds(60));
        assert!(!credential.is_fresh(now));
    }

    #[test]
    fn oversized_margin_yields_stale_credential() {
        let now = Utc::now();
        let token = AccessToken {
            access_token: "t".into(),
            expires_in: 7200,
        };
        let credential = Credential::from_token(token, now, Duration::MAX);
        assert_eq!(credential.expires_at, now);
        assert!(!credential.is_fresh(now));
    }

    #[tokio::test]
    async fn huge_declared_lifetime_does_not_panic_refresh() {
        let source = Arc::new(CountingSource::new(i64::MAX));
        let cache = cache(&source);

        let credential = cache.get().await.unwrap();
        assert!(credential.is_fresh(Utc::now()));
        cache.get().await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn empty_value_is_never_fresh() {
        let credential = Credential {
            value: String::new(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        assert!(!credential.is_fresh(Utc::now()));
    }

    #[test]
    fn debug_redacts_value() {
        let credential = Credential {
            value: "secret-token".into(),
            expires_at: Utc::now(),
        };
        assert!(!format!("{credential:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn cold_start_concurrent_callers_share_one_refresh() {
        let source = Arc::new(CountingSource::new(7200));
        let cache = cache(&source);

        let (a, b) = tokio::join!(cache.get(), cache.get());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(source.calls(), 1);
        assert_eq!(a.value, "token-1");
        assert_eq!(a, b);
        assert_eq!(cache.refresh_count().await, 1);
    }

    #[tokio::test]
    async fn fresh_credential_is_served_without_upstream_call() {
        let source = Arc::new(CountingSource::new(7200));
        let cache = cache(&source);

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn stale_credential_is_replaced() {
        // Lifetime shorter than the margin: stale as soon as it is stored.
        let source = Arc::new(CountingSource::new(30));
        let cache = cache(&source);

        assert_eq!(cache.get().await.unwrap().value, "token-1");
        assert_eq!(cache.get().await.unwrap().value, "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failure_is_shared_with_waiters_then_retried_by_newcomers() {
        let source = Arc::new(CountingSource::failing());
        let cache = cache(&source);

        let (a, b) = tokio::join!(cache.get(), cache.get());
        assert!(matches!(a, Err(PlatformError::Status(503))));
        assert!(matches!(b, Err(PlatformError::RefreshFailed(_))));
        assert_eq!(source.calls(), 1);

        // A caller arriving after the failure makes its own attempt.
        assert!(cache.get().await.is_err());
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.phase().await, RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let source = Arc::new(CountingSource::new(7200));
        let cache = cache(&source);

        let first = cache.get().await.unwrap();
        cache.invalidate(&first).await;
        let second = cache.get().await.unwrap();

        assert_ne!(first.value, second.value);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_ignores_superseded_credential() {
        let source = Arc::new(CountingSource::new(7200));
        let cache = cache(&source);

        let first = cache.get().await.unwrap();
        cache.invalidate(&first).await;
        let second = cache.get().await.unwrap();

        // A late rejection of the old value must not evict the new one.
        cache.invalidate(&first).await;
        assert_eq!(cache.get().await.unwrap(), second);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn phase_is_refreshing_during_upstream_call() {
        let source = Arc::new(CountingSource::new(7200));
        let cache = Arc::new(cache(&source));

        let task = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(cache.phase().await, RefreshPhase::Refreshing);

        task.await.unwrap().unwrap();
        assert_eq!(cache.phase().await, RefreshPhase::Idle);
    }
}
