//! Authenticated session state
//!
//! Tracks the current user and wires login, registration, logout and explicit
//! refresh through to the [`TokenStore`].

use std::sync::{PoisonError, RwLock};

use crate::api::{ApiClient, ApiError, ApiResult, AuthService};
use crate::tokens::TokenStore;
use crate::types::{Credentials, RegisterResponse, UserRecord};

pub struct Session {
    client: ApiClient,
    auth: AuthService,
    tokens: TokenStore,
    user: RwLock<Option<UserRecord>>,
}

impl Session {
    pub fn new(client: ApiClient) -> Self {
        let tokens = client.tokens().clone();
        Self {
            auth: AuthService::new(client.clone()),
            client,
            tokens,
            user: RwLock::new(None),
        }
    }

    /// Pick up a persisted session. Requires both an access token and a user.
    pub fn restore(&self) -> Option<UserRecord> {
        let restored = match (self.tokens.get_tokens().access_token, self.tokens.get_user()) {
            (Some(_), Some(user)) => Some(user),
            _ => None,
        };
        if let Some(user) = &restored {
            tracing::info!(user_id = %user.id, "restored session");
        }
        self.set_current(restored.clone());
        restored
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<UserRecord> {
        let response = self
            .auth
            .login(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;

        let user = response.user();
        self.tokens.set_tokens(&response.tokens());
        self.tokens.set_user(&user);
        self.set_current(Some(user.clone()));
        tracing::info!(user_id = %user.id, "logged in");
        Ok(user)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, email: &str, password: &str) -> ApiResult<RegisterResponse> {
        self.auth
            .register(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
    }

    pub fn logout(&self) {
        self.tokens.clear_auth();
        self.set_current(None);
        tracing::info!("logged out");
    }

    /// Exchange the stored refresh token for a new pair. Any failure logs out.
    ///
    /// Shares the client's refresh slot, so it never races a refresh started
    /// by a 401.
    pub async fn refresh_auth(&self) -> bool {
        if self.tokens.get_tokens().refresh_token.is_none() {
            return false;
        }
        if self.client.refresh_tokens().await {
            return true;
        }
        tracing::warn!("session refresh failed");
        self.logout();
        false
    }

    /// Run the logout flow when an error means the session is gone.
    pub fn handle_error(&self, err: &ApiError) {
        if err.is_unauthorized() {
            self.logout();
        }
    }

    pub fn user(&self) -> Option<UserRecord> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    fn set_current(&self, user: Option<UserRecord>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}
