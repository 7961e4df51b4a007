//! Token Store - persisted auth state
//!
//! Holds the access token, refresh token and current user record on top of a
//! [`Storage`] backend so a session survives restarts.

use std::sync::Arc;

use crate::storage::Storage;
use crate::types::{PartialTokens, TokenPair, UserRecord};

const ACCESS_TOKEN_KEY: &str = "accessToken";
const REFRESH_TOKEN_KEY: &str = "refreshToken";
const USER_KEY: &str = "user";

/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Returns whatever subset of the pair is stored. Empty values count as absent.
    pub fn get_tokens(&self) -> PartialTokens {
        PartialTokens {
            access_token: self.read(ACCESS_TOKEN_KEY),
            refresh_token: self.read(REFRESH_TOKEN_KEY),
        }
    }

    pub fn set_tokens(&self, tokens: &TokenPair) {
        self.storage.set_item(ACCESS_TOKEN_KEY, &tokens.access_token);
        self.storage.set_item(REFRESH_TOKEN_KEY, &tokens.refresh_token);
    }

    /// The stored user, or `None` when absent or unparseable.
    pub fn get_user(&self) -> Option<UserRecord> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                tracing::debug!("ignoring malformed stored user: {err}");
                None
            }
        }
    }

    pub fn set_user(&self, user: &UserRecord) {
        match serde_json::to_string(user) {
            Ok(raw) => self.storage.set_item(USER_KEY, &raw),
            Err(err) => tracing::warn!("failed to serialize user: {err}"),
        }
    }

    pub fn clear_auth(&self) {
        self.storage.remove_item(ACCESS_TOKEN_KEY);
        self.storage.remove_item(REFRESH_TOKEN_KEY);
        self.storage.remove_item(USER_KEY);
    }

    pub fn has_tokens(&self) -> bool {
        self.get_tokens().is_complete()
    }

    fn read(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).filter(|value| !value.is_empty())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_tokens", &self.has_tokens())
            .finish()
    }
}
