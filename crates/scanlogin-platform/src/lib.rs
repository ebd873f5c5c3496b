//! # Scan-to-Login Platform
//!
//! Everything the login server needs to talk to the upstream messaging
//! platform.
//!
//! The crate provides:
//!
//! * [`PlatformApi`]: the three black-box calls (access token, scene QR
//!   ticket, subscriber profile), implemented over HTTP by
//!   [`PlatformClient`] and by stubs in tests.
//! * [`CredentialCache`]: the process-wide access token with
//!   double-checked, single-flight refresh.
//! * [`Platform`]: the facade that pairs the API with the cache so callers
//!   never handle tokens themselves.
//! * [`signature`]: webhook signature computation and verification.
//! * [`PlatformError`]: unified error type for all upstream failures.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use scanlogin_models::SceneId;
//! use scanlogin_platform::{Platform, PlatformClient, PlatformClientConfig, PlatformSettings};
//!
//! # async fn run() -> Result<(), scanlogin_platform::PlatformError> {
//! let client = PlatformClient::new(PlatformClientConfig::new("appid", "secret"))?;
//! let platform = Platform::new(Arc::new(client), PlatformSettings::default());
//!
//! let code = platform
//!     .mint_scene_code(&SceneId::generate(), std::time::Duration::from_secs(300))
//!     .await?;
//! println!("scan {}", code.image_url);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod credential;
pub mod error;
pub mod platform;
pub mod signature;

pub use api::{AccessToken, PlatformApi, QrTicket, SubscriberInfo};
pub use client::{PlatformClient, PlatformClientConfig};
pub use credential::{Credential, CredentialCache, RefreshPhase};
pub use error::PlatformError;
pub use platform::{Platform, PlatformSettings, SceneCode};
