//! Scene tokens.
//!
//! A [`SceneId`] is the opaque value embedded in a scannable code. The
//! platform echoes it back in the webhook when the code is scanned, which is
//! how an asynchronous event is correlated with a pending login.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Number of random bytes drawn for a generated scene (32 base64 chars).
pub const SCENE_ENTROPY_BYTES: usize = 24;

/// Longest `scene_str` the platform accepts for a string-scene QR code.
pub const SCENE_MAX_LEN: usize = 64;

/// Opaque token correlating a scannable code with a login attempt.
///
/// # Examples
///
/// ```
/// use scanlogin_models::SceneId;
///
/// let scene = SceneId::parse("abc123").unwrap();
/// assert_eq!(scene.to_string(), "abc123");
///
/// let generated = SceneId::generate();
/// assert_eq!(generated.as_str().len(), 32);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneId(String);

impl SceneId {
    /// Draw a fresh scene from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut buf = [0u8; SCENE_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut buf);
        Self(URL_SAFE_NO_PAD.encode(buf))
    }

    /// Validate an externally supplied scene value.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        if value.is_empty() {
            return Err(ModelError::InvalidScene {
                value: value.to_string(),
                reason: "must not be empty".into(),
            });
        }
        if value.len() > SCENE_MAX_LEN {
            return Err(ModelError::InvalidScene {
                value: value.to_string(),
                reason: format!("must be at most {SCENE_MAX_LEN} bytes"),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Return the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SceneId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for SceneId {
    type Error = ModelError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl AsRef<str> for SceneId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
