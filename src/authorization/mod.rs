//! AuthorizationPolicy - Accept/Reject decisions per candidate
//!
//! ## Responsibilities
//!
//! - QR token lookup against the credential store
//! - Face-match acceptance gated on door state
//! - At-most-one-trigger-per-cycle: anything arriving while the door is
//!   opening is dropped, never queued

use crate::actuator::DoorState;
use crate::credential_store::CredentialStore;
use crate::matcher::IdentityCandidate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How an access was authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
    Face,
    Qr,
    Remote,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::Face => "face",
            AccessMethod::Qr => "qr",
            AccessMethod::Remote => "remote",
        }
    }
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization outcome for one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept {
        identity: String,
        method: AccessMethod,
    },
    Reject {
        reason: RejectReason,
    },
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A door cycle is already in flight; the attempt is dropped
    DoorBusy,
    /// Token unknown or deactivated
    InvalidToken,
    /// Face with no acceptable gallery match
    Unknown,
}

/// AuthorizationPolicy instance
pub struct AuthorizationPolicy {
    credentials: Arc<CredentialStore>,
    door: DoorState,
}

impl AuthorizationPolicy {
    /// Create new AuthorizationPolicy
    pub fn new(credentials: Arc<CredentialStore>, door: DoorState) -> Self {
        Self { credentials, door }
    }

    /// Decide one candidate. Unknown faces are always rejected here; the
    /// pipeline routes them to the alert throttle separately.
    pub async fn authorize(&self, candidate: &IdentityCandidate) -> Decision {
        match candidate {
            IdentityCandidate::Qr { token, .. } => self.authorize_token(token).await,
            IdentityCandidate::Face { name, distance, .. } => {
                if self.door.is_opening() {
                    tracing::debug!(name = %name, "Face match dropped, door cycle in flight");
                    return Decision::Reject {
                        reason: RejectReason::DoorBusy,
                    };
                }
                tracing::info!(name = %name, distance = %distance, "Face match accepted");
                Decision::Accept {
                    identity: name.clone(),
                    method: AccessMethod::Face,
                }
            }
            IdentityCandidate::UnknownFace { .. } => Decision::Reject {
                reason: RejectReason::Unknown,
            },
        }
    }

    /// QR path: skip the lookup entirely while a cycle is in flight.
    pub async fn authorize_token(&self, token: &str) -> Decision {
        if self.door.is_opening() {
            tracing::debug!("QR token dropped, door cycle in flight");
            return Decision::Reject {
                reason: RejectReason::DoorBusy,
            };
        }

        match self.credentials.find_by_token(token).await {
            Some(cred) if cred.is_active => {
                tracing::info!(username = %cred.username, "QR token accepted");
                Decision::Accept {
                    identity: cred.username,
                    method: AccessMethod::Qr,
                }
            }
            Some(cred) => {
                tracing::info!(username = %cred.username, "QR token is deactivated");
                Decision::Reject {
                    reason: RejectReason::InvalidToken,
                }
            }
            None => {
                tracing::info!("Unknown QR token presented");
                Decision::Reject {
                    reason: RejectReason::InvalidToken,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::FaceRegion;

    fn region() -> FaceRegion {
        FaceRegion {
            top: 0,
            right: 10,
            bottom: 10,
            left: 0,
        }
    }

    async fn store_with_alice() -> Arc<CredentialStore> {
        use crate::credential_store::ActiveCredential;

        let store = Arc::new(CredentialStore::new());
        store
            .insert(ActiveCredential {
                username: "alice".to_string(),
                token: "abc-123".to_string(),
                is_active: true,
            })
            .await;
        store
            .insert(ActiveCredential {
                username: "mallory".to_string(),
                token: "expired-1".to_string(),
                is_active: false,
            })
            .await;
        store
    }

    #[tokio::test]
    async fn active_token_is_accepted() {
        let policy = AuthorizationPolicy::new(store_with_alice().await, DoorState::new());

        let decision = policy.authorize_token("abc-123").await;
        assert_eq!(
            decision,
            Decision::Accept {
                identity: "alice".to_string(),
                method: AccessMethod::Qr,
            }
        );
    }

    #[tokio::test]
    async fn inactive_and_unknown_tokens_are_rejected() {
        let policy = AuthorizationPolicy::new(store_with_alice().await, DoorState::new());

        assert_eq!(
            policy.authorize_token("expired-1").await,
            Decision::Reject {
                reason: RejectReason::InvalidToken
            }
        );
        assert_eq!(
            policy.authorize_token("no-such-token").await,
            Decision::Reject {
                reason: RejectReason::InvalidToken
            }
        );
    }

    #[tokio::test]
    async fn qr_is_dropped_while_door_is_opening() {
        let door = DoorState::new();
        assert!(door.begin_opening());
        let policy = AuthorizationPolicy::new(store_with_alice().await, door);

        assert_eq!(
            policy.authorize_token("abc-123").await,
            Decision::Reject {
                reason: RejectReason::DoorBusy
            }
        );
    }

    #[tokio::test]
    async fn face_match_is_accepted_when_idle_and_dropped_when_opening() {
        let door = DoorState::new();
        let policy = AuthorizationPolicy::new(store_with_alice().await, door.clone());
        let candidate = IdentityCandidate::Face {
            name: "alice".to_string(),
            distance: 0.2,
            region: region(),
        };

        assert_eq!(
            policy.authorize(&candidate).await,
            Decision::Accept {
                identity: "alice".to_string(),
                method: AccessMethod::Face,
            }
        );

        assert!(door.begin_opening());
        assert_eq!(
            policy.authorize(&candidate).await,
            Decision::Reject {
                reason: RejectReason::DoorBusy
            }
        );
    }

    #[tokio::test]
    async fn unknown_face_is_always_rejected() {
        let policy = AuthorizationPolicy::new(store_with_alice().await, DoorState::new());

        assert_eq!(
            policy
                .authorize(&IdentityCandidate::UnknownFace { region: region() })
                .await,
            Decision::Reject {
                reason: RejectReason::Unknown
            }
        );
    }
}
