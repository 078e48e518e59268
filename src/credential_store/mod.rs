//! CredentialStore - QR pass tokens
//!
//! ## Responsibilities
//!
//! - Token-keyed lookup of active credentials (exact string equality,
//!   at most one record)
//! - Pass provisioning (uuid tokens) and activation toggling

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One QR pass credential. Lookups return read-only snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveCredential {
    pub username: String,
    pub token: String,
    pub is_active: bool,
}

/// CredentialStore instance
pub struct CredentialStore {
    by_token: RwLock<HashMap<String, ActiveCredential>>,
}

impl CredentialStore {
    /// Create new CredentialStore
    pub fn new() -> Self {
        Self {
            by_token: RwLock::new(HashMap::new()),
        }
    }

    /// Exact-token lookup
    pub async fn find_by_token(&self, token: &str) -> Option<ActiveCredential> {
        let users = self.by_token.read().await;
        users.get(token).cloned()
    }

    /// Provision a new pass for a user. Usernames are unique.
    pub async fn create(&self, username: &str) -> Result<ActiveCredential> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::Validation("username must not be empty".to_string()));
        }

        let mut users = self.by_token.write().await;
        if users.values().any(|c| c.username == username) {
            return Err(Error::Conflict(format!(
                "user {} already has a pass",
                username
            )));
        }

        let credential = ActiveCredential {
            username: username.to_string(),
            token: Uuid::new_v4().to_string(),
            is_active: true,
        };
        users.insert(credential.token.clone(), credential.clone());

        tracing::info!(username = %username, "Pass provisioned");

        Ok(credential)
    }

    /// All credentials, sorted by username
    pub async fn list(&self) -> Vec<ActiveCredential> {
        let users = self.by_token.read().await;
        let mut all: Vec<ActiveCredential> = users.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        all
    }

    /// Enable or disable a user's pass
    pub async fn set_active(&self, username: &str, active: bool) -> Result<()> {
        let mut users = self.by_token.write().await;
        let cred = users
            .values_mut()
            .find(|c| c.username == username)
            .ok_or_else(|| Error::NotFound(format!("no pass for user {}", username)))?;
        cred.is_active = active;

        tracing::info!(username = %username, active = active, "Pass activation changed");

        Ok(())
    }

    /// Insert a credential with a caller-supplied token (import path,
    /// overwrites an existing record for the same token)
    pub async fn insert(&self, credential: ActiveCredential) {
        let mut users = self.by_token.write().await;
        users.insert(credential.token.clone(), credential);
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let store = CredentialStore::new();
        let cred = store.create("alice").await.unwrap();

        let found = store.find_by_token(&cred.token).await.unwrap();
        assert_eq!(found.username, "alice");
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = CredentialStore::new();
        store.create("alice").await.unwrap();

        assert!(matches!(
            store.create("alice").await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn tokens_are_unique_per_user() {
        let store = CredentialStore::new();
        let a = store.create("alice").await.unwrap();
        let b = store.create("bob").await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn deactivated_pass_is_still_findable() {
        let store = CredentialStore::new();
        let cred = store.create("alice").await.unwrap();
        store.set_active("alice", false).await.unwrap();

        let found = store.find_by_token(&cred.token).await.unwrap();
        assert!(!found.is_active);
    }

    #[tokio::test]
    async fn set_active_for_unknown_user_is_not_found() {
        let store = CredentialStore::new();
        assert!(matches!(
            store.set_active("ghost", false).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_sorted_by_username() {
        let store = CredentialStore::new();
        store.create("carol").await.unwrap();
        store.create("alice").await.unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .into_iter()
            .map(|c| c.username)
            .collect();
        assert_eq!(names, vec!["alice".to_string(), "carol".to_string()]);
    }
}
