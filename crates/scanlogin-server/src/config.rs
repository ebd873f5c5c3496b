//! Server configuration.
//!
//! Built once at startup from environment variables and used to wire the
//! shared [`crate::state::AppState`].

use std::fmt;
use std::time::Duration;

use scanlogin_platform::client::DEFAULT_API_BASE;
use scanlogin_platform::platform::DEFAULT_QRCODE_BASE;

use crate::login::PollPolicy;

/// Configuration errors reported at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set to a value that cannot be used.
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
        /// Human-readable explanation.
        reason: String,
    },
}

/// Global configuration shared across all handlers.
#[derive(Clone)]
pub struct AppConfig {
    /// Platform app id.
    pub app_id: String,
    /// Platform app secret.
    pub app_secret: String,
    /// Shared token used to sign webhook requests.
    pub webhook_token: String,
    /// Port to listen on (default `8080`).
    pub listen_port: u16,
    /// Platform API base URL.
    pub api_base: String,
    /// QR image endpoint base URL.
    pub qrcode_base: String,
    /// Lifetime requested for each scannable code.
    pub qr_ttl: Duration,
    /// How long an expired session is kept before eviction.
    pub session_grace: Duration,
    /// Period of the eviction sweep.
    pub sweep_interval: Duration,
    /// Timeout for every upstream call.
    pub upstream_timeout: Duration,
    /// Margin subtracted from the access token lifetime.
    pub credential_margin: Duration,
    /// Whether a poll that observes completion removes the session.
    pub poll_policy: PollPolicy,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_id", &self.app_id)
            .field("listen_port", &self.listen_port)
            .field("api_base", &self.api_base)
            .field("qrcode_base", &self.qrcode_base)
            .field("qr_ttl", &self.qr_ttl)
            .field("session_grace", &self.session_grace)
            .field("sweep_interval", &self.sweep_interval)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("credential_margin", &self.credential_margin)
            .field("poll_policy", &self.poll_policy)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Build the configuration from environment variables.
    ///
    /// | Variable                    | Default                                      |
    /// |-----------------------------|----------------------------------------------|
    /// | `WECHAT_APP_ID`             | required                                     |
    /// | `WECHAT_APP_SECRET`         | required                                     |
    /// | `WECHAT_TOKEN`              | required                                     |
    /// | `PORT`                      | `8080`                                       |
    /// | `WECHAT_API_BASE`           | `https://api.weixin.qq.com`                  |
    /// | `WECHAT_QRCODE_BASE`        | `https://mp.weixin.qq.com/cgi-bin/showqrcode`|
    /// | `QR_EXPIRE_SECONDS`         | `300`                                        |
    /// | `SESSION_GRACE_SECONDS`     | `300`                                        |
    /// | `SWEEP_INTERVAL_SECONDS`    | `60`                                         |
    /// | `UPSTREAM_TIMEOUT_SECONDS`  | `10`                                         |
    /// | `CREDENTIAL_MARGIN_SECONDS` | `60`                                         |
    /// | `POLL_CONSUMES_SESSION`     | `false`                                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let consume = match get("POLL_CONSUMES_SESSION") {
            Some(v) => parse_bool("POLL_CONSUMES_SESSION", &v)?,
            None => false,
        };

        Ok(Self {
            app_id: required("WECHAT_APP_ID")?,
            app_secret: required("WECHAT_APP_SECRET")?,
            webhook_token: required("WECHAT_TOKEN")?,
            listen_port: parse_or("PORT", get("PORT"), 8080)?,
            api_base: get("WECHAT_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            qrcode_base: get("WECHAT_QRCODE_BASE")
                .unwrap_or_else(|| DEFAULT_QRCODE_BASE.to_string()),
            qr_ttl: positive_secs("QR_EXPIRE_SECONDS", get("QR_EXPIRE_SECONDS"), 300)?,
            session_grace: Duration::from_secs(parse_or(
                "SESSION_GRACE_SECONDS",
                get("SESSION_GRACE_SECONDS"),
                300,
            )?),
            sweep_interval: positive_secs(
                "SWEEP_INTERVAL_SECONDS",
                get("SWEEP_INTERVAL_SECONDS"),
                60,
            )?,
            upstream_timeout: positive_secs(
                "UPSTREAM_TIMEOUT_SECONDS",
                get("UPSTREAM_TIMEOUT_SECONDS"),
                10,
            )?,
            credential_margin: Duration::from_secs(parse_or(
                "CREDENTIAL_MARGIN_SECONDS",
                get("CREDENTIAL_MARGIN_SECONDS"),
                60,
            )?),
            poll_policy: if consume {
                PollPolicy::ConsumeCompleted
            } else {
                PollPolicy::Retain
            },
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive_secs(
    name: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<Duration, ConfigError> {
    let raw = value.clone();
    match parse_or(name, value, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: raw.unwrap_or_default(),
            reason: "must be greater than zero".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
