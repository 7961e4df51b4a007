use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::auth::AuthService;
use super::error::{ApiError, ApiResult};
use crate::config::Config;
use crate::tokens::TokenStore;

/// A refresh that other 401'd requests can attach to.
type RefreshHandle = Shared<BoxFuture<'static, bool>>;

/// HTTP client for the chat backend.
///
/// Attaches the stored access token to every request and, on a 401, runs a
/// single coalesced refresh before retrying once. Clones share the token
/// store and the refresh slot.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    tokens: TokenStore,
    refresh_slot: Arc<Mutex<Option<RefreshHandle>>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, tokens)
    }

    /// Build a client honouring the configured base URL and timeout.
    pub fn from_config(config: &Config, tokens: TokenStore) -> ApiResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_http(builder.build()?, &config.api_base_url, tokens))
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>, tokens: TokenStore) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').into(),
            tokens,
            refresh_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    // ============================================
    // Authenticated Requests
    // ============================================

    /// Send an authenticated request, refreshing and retrying once on a 401.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> ApiResult<T> {
        self.request_with_retry(method, endpoint, body, true).await
    }

    /// Like [`request`](Self::request) but a 401 is reported as-is.
    pub async fn request_once<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> ApiResult<T> {
        self.request_with_retry(method, endpoint, body, false).await
    }

    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        retry: bool,
    ) -> ApiResult<T> {
        let response = self.send(&method, endpoint, body.as_ref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && retry {
            tracing::debug!(%method, endpoint, "access token rejected");
            if !self.refresh_tokens().await {
                return Err(ApiError::Unauthorized);
            }
            let retried = self.send(&method, endpoint, body.as_ref()).await?;
            return read_body(retried).await;
        }

        read_body(response).await
    }

    async fn send(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> ApiResult<Response> {
        let url = self.url(endpoint);
        tracing::debug!(%method, %url, "sending request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.tokens.get_tokens().access_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        data: Option<&B>,
    ) -> ApiResult<T> {
        let body = data.map(serde_json::to_value).transpose()?;
        self.request(Method::POST, endpoint, body).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        data: Option<&B>,
    ) -> ApiResult<T> {
        let body = data.map(serde_json::to_value).transpose()?;
        self.request(Method::PUT, endpoint, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(Method::DELETE, endpoint, None).await
    }

    // ============================================
    // Unauthenticated Requests
    // ============================================

    /// POST without a bearer token and without the refresh path.
    pub(crate) async fn post_public<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        data: &B,
        failure: &str,
    ) -> ApiResult<T> {
        let url = self.url(endpoint);
        tracing::debug!(%url, "sending public request");

        let response = self.http.post(&url).json(data).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_body(status.as_u16(), &text, || {
                failure.to_string()
            }));
        }
        parse_body(&text)
    }

    // ============================================
    // Token Refresh
    // ============================================

    /// Refresh the token pair, joining an in-flight refresh if there is one.
    ///
    /// Only one call to `/auth/refresh` is outstanding at any time; every
    /// caller that arrives meanwhile observes the same outcome.
    pub async fn refresh_tokens(&self) -> bool {
        let handle = {
            let mut slot = self
                .refresh_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(in_flight) => {
                    tracing::debug!("joining in-flight token refresh");
                    in_flight.clone()
                }
                None => {
                    let handle = self.start_refresh();
                    *slot = Some(handle.clone());
                    handle
                }
            }
        };

        handle.await
    }

    /// True while a refresh is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.refresh_slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    fn start_refresh(&self) -> RefreshHandle {
        let client = self.clone();
        async move {
            let refreshed = client.perform_refresh().await;
            // Settled: the next 401 starts a fresh refresh.
            client
                .refresh_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            refreshed
        }
        .boxed()
        .shared()
    }

    async fn perform_refresh(&self) -> bool {
        let Some(refresh_token) = self.tokens.get_tokens().refresh_token else {
            tracing::debug!("no refresh token stored");
            return false;
        };

        tracing::info!("refreshing access token");
        match AuthService::new(self.clone()).refresh(&refresh_token).await {
            Ok(pair) => {
                self.tokens.set_tokens(&pair);
                tracing::info!("access token refreshed");
                true
            }
            Err(err) => {
                tracing::warn!("token refresh failed: {err}");
                self.tokens.clear_auth();
                false
            }
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}

async fn read_body<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::from_body(status.as_u16(), &text, || {
            format!("Request failed with status {}", status.as_u16())
        }));
    }
    parse_body(&text)
}

/// Parse a success body; an empty body yields the type's empty value.
fn parse_body<T: DeserializeOwned>(text: &str) -> ApiResult<T> {
    if text.trim().is_empty() {
        return T::deserialize(Value::Null)
            .or_else(|_| T::deserialize(Value::Object(serde_json::Map::new())))
            .map_err(ApiError::from);
    }
    Ok(serde_json::from_str(text)?)
}
