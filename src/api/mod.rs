//! API layer for the chat backend
//!
//! # Architecture
//!
//! - `client` - [`ApiClient`], bearer auth plus coalesced refresh-and-retry
//! - `auth` - login/register/refresh, sent without credentials
//! - `chat` - chat endpoints behind the [`ChatBackend`] trait
//! - `error` - [`ApiError`] taxonomy
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley::api::{ApiClient, ChatBackend, ChatService};
//! use parley::storage::FileStorage;
//! use parley::tokens::TokenStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let tokens = TokenStore::new(Arc::new(FileStorage::default_location()));
//! let chat = ChatService::new(ApiClient::new("http://localhost:8080/api", tokens));
//! let history = chat.history().await?;
//! # Ok(())
//! # }
//! ```
mod auth;
mod chat;
mod client;
mod error;

pub use auth::AuthService;
pub use chat::{ChatBackend, ChatService};
pub use client::ApiClient;
pub use error::{ApiError, ApiResult, SESSION_EXPIRED};
