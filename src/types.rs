use serde::{Deserialize, Serialize};

/// Access/refresh credentials issued by the auth endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Whatever subset of a [`TokenPair`] is currently stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl PartialTokens {
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
}

/// One prompt/response exchange. `timestamp` is ISO-8601.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub prompt: String,
    pub response: String,
    pub timestamp: String,
}

impl Message {
    /// Placeholder shown while the server reply is pending.
    pub fn pending(prompt: &str) -> Self {
        let now = time::OffsetDateTime::now_utc();
        Self {
            id: format!("temp-{}", now.unix_timestamp_nanos() / 1_000_000),
            prompt: prompt.to_string(),
            response: String::new(),
            timestamp: iso_timestamp(now),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.starts_with("temp-")
    }
}

pub fn iso_timestamp(at: time::OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

// ============================================
// Wire payloads
// ============================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub email: String,
}

impl LoginResponse {
    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }

    pub fn user(&self) -> UserRecord {
        UserRecord {
            id: self.user_id.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `/auth/refresh` answers with a fresh pair.
pub type RefreshResponse = TokenPair;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Error body returned by the backend on failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
