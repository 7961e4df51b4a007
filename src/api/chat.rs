use async_trait::async_trait;

use super::client::ApiClient;
use super::error::ApiResult;
use crate::types::{ChatRequest, HistoryResponse, Message};

/// The chat calls a conversation depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(&self, prompt: &str) -> ApiResult<Message>;
    async fn history(&self) -> ApiResult<HistoryResponse>;
    async fn clear_history(&self) -> ApiResult<()>;
}

/// Authenticated `/chat` endpoints.
#[derive(Clone, Debug)]
pub struct ChatService {
    client: ApiClient,
}

impl ChatService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatBackend for ChatService {
    /// POST /chat
    async fn send_message(&self, prompt: &str) -> ApiResult<Message> {
        let request = ChatRequest {
            prompt: prompt.to_string(),
        };
        self.client.post("/chat", Some(&request)).await
    }

    /// GET /chat/history
    async fn history(&self) -> ApiResult<HistoryResponse> {
        self.client.get("/chat/history").await
    }

    /// DELETE /chat/history
    async fn clear_history(&self) -> ApiResult<()> {
        self.client.delete("/chat/history").await
    }
}
