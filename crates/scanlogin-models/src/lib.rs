#![deny(missing_docs)]

//! # Scan-to-Login Models
//!
//! Core data types shared by the scan-to-login server, the platform client,
//! the mock platform and the terminal client.
//!
//! ## Login flow
//!
//! ```text
//! client ──POST /session/new──▶ server ──mint QR(scene)──▶ platform
//!    │                            ▲                          │
//!    │                            └──webhook(PlatformMessage)┘
//!    └──GET /session/{scene}──▶ server  (Pending → Completed)
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`scene`] | The `SceneId` correlation token and its generator |
//! | [`session`] | `LoginSession`, `SessionStatus` and the public wire DTOs |
//! | [`event`] | Webhook `PlatformMessage` and the derived `InboundEvent` |
//! | [`error`] | `ModelError` |

pub mod error;
pub mod event;
pub mod scene;
pub mod session;

// Re-export all public types at crate root for convenience.
pub use error::*;
pub use event::*;
pub use scene::*;
pub use session::*;
