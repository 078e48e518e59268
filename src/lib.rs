//! Doorwarden - Unattended Door Access Controller
//!
//! ## Architecture (10 Components)
//!
//! 1. FrameSource - Camera capture (ffmpeg MJPEG / HTTP snapshot)
//! 2. CredentialMatcher - Per-frame QR + face identity candidates
//! 3. AuthorizationPolicy - Accept/Reject decisions
//! 4. ActuatorController - Single-flight door cycle (relay + servo)
//! 5. AlertThrottle - Unknown-person alert rate limiting
//! 6. AccessLogService - Access event recording (ring buffer)
//! 7. CredentialStore - QR pass tokens
//! 8. OperatorNotifier - Outbound operator-channel dispatch
//! 9. FrameHub - Annotated frame distribution (MJPEG surface)
//! 10. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - The frame loop never blocks on anything with external latency
//! - Exactly one door cycle in flight at any time
//! - Recognition is an injected capability, not part of this crate

pub mod access_log;
pub mod actuator;
pub mod alert;
pub mod authorization;
pub mod credential_store;
pub mod frame_source;
pub mod matcher;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod recognition;
pub mod stream_hub;
pub mod web_api;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
