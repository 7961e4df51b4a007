//! Parley - a chat client with token-refreshing API access
//!
//! - [`storage`] / [`tokens`] - persisted auth state
//! - [`api`] - HTTP client with coalesced token refresh
//! - [`session`] - login, registration and logout
//! - [`conversation`] - chat transcript with optimistic sends
//! - `mock` - in-process backend for offline use and tests
pub mod api;
pub mod config;
pub mod conversation;
#[cfg(feature = "mock")]
pub mod mock;
pub mod session;
pub mod storage;
pub mod tokens;
pub mod types;

pub use config::Config;
pub use conversation::Conversation;
pub use session::Session;
pub use tokens::TokenStore;
