use super::client::ApiClient;
use super::error::ApiResult;
use crate::types::{Credentials, LoginResponse, RefreshRequest, RefreshResponse, RegisterResponse};

/// Unauthenticated calls against `/auth/*`.
#[derive(Clone, Debug)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// POST /auth/login
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse> {
        self.client
            .post_public("/auth/login", credentials, "Login failed")
            .await
    }

    /// POST /auth/register
    pub async fn register(&self, credentials: &Credentials) -> ApiResult<RegisterResponse> {
        self.client
            .post_public("/auth/register", credentials, "Registration failed")
            .await
    }

    /// POST /auth/refresh
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<RefreshResponse> {
        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.client
            .post_public("/auth/refresh", &request, "Token refresh failed")
            .await
    }
}
