//! Integration tests for session and conversation flows
//!
//! Drives the same pieces the CLI wires together against the mock backend.
#![cfg(feature = "mock")]

use std::sync::Arc;
use std::time::Duration;

use parley::api::{ApiClient, ChatService};
use parley::mock::MockServer;
use parley::storage::{FileStorage, MemoryStorage, Storage};
use parley::{Conversation, Session, TokenStore};

struct Harness {
    server: MockServer,
    client: ApiClient,
    session: Session,
    conversation: Conversation,
}

async fn harness_with(storage: Arc<dyn Storage>) -> Harness {
    harness_on(MockServer::start().await.unwrap(), storage)
}

fn harness_on(server: MockServer, storage: Arc<dyn Storage>) -> Harness {
    let client = ApiClient::new(server.base_url(), TokenStore::new(storage));
    Harness {
        session: Session::new(client.clone()),
        conversation: Conversation::new(Arc::new(ChatService::new(client.clone()))),
        client,
        server,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(MemoryStorage::new())).await
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn register_does_not_log_in() {
        let h = harness().await;

        let response = h.session.register("a@b.com", "secret").await.unwrap();
        assert_eq!(response.message, "Registration successful");
        assert!(!h.session.is_authenticated());
        assert!(!h.client.tokens().has_tokens());
    }

    #[tokio::test]
    async fn login_persists_tokens_and_user_together() {
        let h = harness().await;
        h.session.register("a@b.com", "secret").await.unwrap();

        let user = h.session.login("a@b.com", "secret").await.unwrap();
        assert_eq!(user.email, "a@b.com");
        assert!(h.session.is_authenticated());
        assert!(h.client.tokens().has_tokens());
        assert_eq!(h.client.tokens().get_user(), Some(user));
    }

    #[tokio::test]
    async fn failed_login_leaves_state_untouched() {
        let h = harness().await;
        h.session.register("a@b.com", "secret").await.unwrap();

        let err = h.session.login("a@b.com", "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid email or password");
        assert!(!h.session.is_authenticated());
        assert!(!h.client.tokens().has_tokens());
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let h = harness().await;
        h.session.register("a@b.com", "secret").await.unwrap();
        h.session.login("a@b.com", "secret").await.unwrap();

        h.session.logout();
        assert!(!h.session.is_authenticated());
        assert!(!h.client.tokens().has_tokens());
        assert_eq!(h.client.tokens().get_user(), None);
    }

    #[tokio::test]
    async fn session_is_restored_from_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(Arc::new(FileStorage::new(dir.path()))).await;
        h.session.register("a@b.com", "secret").await.unwrap();
        let user = h.session.login("a@b.com", "secret").await.unwrap();

        let client = ApiClient::new(
            h.server.base_url(),
            TokenStore::new(Arc::new(FileStorage::new(dir.path()))),
        );
        let restored = Session::new(client);
        assert_eq!(restored.restore(), Some(user));
        assert!(restored.is_authenticated());
    }

    #[tokio::test]
    async fn refresh_auth_rotates_tokens() {
        let h = harness().await;
        h.session.register("a@b.com", "secret").await.unwrap();
        h.session.login("a@b.com", "secret").await.unwrap();
        let before = h.client.tokens().get_tokens();

        assert!(h.session.refresh_auth().await);
        let after = h.client.tokens().get_tokens();
        assert!(after.is_complete());
        assert_ne!(before, after);
        assert_eq!(h.server.hits("/auth/refresh"), 1);
    }

    #[tokio::test]
    async fn refresh_auth_joins_an_in_flight_refresh() {
        let h = harness().await;
        h.session.register("a@b.com", "secret").await.unwrap();
        h.session.login("a@b.com", "secret").await.unwrap();

        let (explicit, implicit) =
            tokio::join!(h.session.refresh_auth(), h.client.refresh_tokens());
        assert!(explicit);
        assert!(implicit);
        assert_eq!(h.server.hits("/auth/refresh"), 1);
        assert!(h.session.is_authenticated());
        assert!(h.client.tokens().has_tokens());
    }

    #[tokio::test]
    async fn refresh_auth_failure_logs_out() {
        let h = harness().await;
        h.session.register("a@b.com", "secret").await.unwrap();
        h.session.login("a@b.com", "secret").await.unwrap();
        h.server.revoke_refresh_tokens();

        assert!(!h.session.refresh_auth().await);
        assert!(!h.session.is_authenticated());
        assert!(!h.client.tokens().has_tokens());
    }
}

mod conversation_tests {
    use super::*;

    async fn logged_in() -> Harness {
        log_in(harness().await).await
    }

    async fn log_in(h: Harness) -> Harness {
        h.session.register("a@b.com", "secret").await.unwrap();
        h.session.login("a@b.com", "secret").await.unwrap();
        h
    }

    #[tokio::test]
    async fn blank_prompt_never_hits_the_network() {
        let h = logged_in().await;

        assert_eq!(h.conversation.send_message("").await.unwrap(), None);
        assert_eq!(h.conversation.send_message("   \t").await.unwrap(), None);
        assert_eq!(h.server.hits("/chat"), 0);
        assert!(h.conversation.messages().is_empty());
    }

    #[tokio::test]
    async fn send_then_reload_history() {
        let h = logged_in().await;

        let reply = h
            .conversation
            .send_message("  hello there ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.prompt, "hello there");
        assert!(!reply.is_pending());
        assert_eq!(h.conversation.messages(), vec![reply.clone()]);

        h.conversation.clear_history();
        assert!(h.conversation.messages().is_empty());

        h.conversation.refresh_history().await.unwrap();
        assert_eq!(h.conversation.messages(), vec![reply]);
        assert!(!h.conversation.is_history_loading());
    }

    #[tokio::test]
    async fn send_survives_an_expired_access_token() {
        let h = logged_in().await;
        h.server.expire_access_tokens();

        let reply = h.conversation.send_message("still there?").await.unwrap();
        assert!(reply.is_some());
        assert_eq!(h.server.hits("/chat"), 2);
        assert_eq!(h.server.hits("/auth/refresh"), 1);
    }

    #[tokio::test]
    async fn expired_session_drops_pending_message_and_logs_out() {
        let h = logged_in().await;
        h.server.expire_access_tokens();
        h.server.revoke_refresh_tokens();

        let err = h.conversation.send_message("hello").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(h.conversation.messages().is_empty());

        h.session.handle_error(&err);
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn delete_history_clears_server_and_local() {
        let h = logged_in().await;
        h.conversation.send_message("one").await.unwrap();
        h.conversation.send_message("two").await.unwrap();
        assert_eq!(h.conversation.messages().len(), 2);

        h.conversation.delete_history().await.unwrap();
        assert!(h.conversation.messages().is_empty());

        h.conversation.refresh_history().await.unwrap();
        assert!(h.conversation.messages().is_empty());
    }

    #[tokio::test]
    async fn history_failure_keeps_transcript() {
        let h = logged_in().await;
        h.conversation.send_message("keep me").await.unwrap();
        h.session.logout();

        let err = h.conversation.refresh_history().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.conversation.messages().len(), 1);
    }

    #[tokio::test]
    async fn timed_out_send_does_not_block_the_next_one() {
        let server = MockServer::start_with_latency(Duration::from_millis(300))
            .await
            .unwrap();
        let h = log_in(harness_on(server, Arc::new(MemoryStorage::new()))).await;

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            h.conversation.send_message("first"),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!h.conversation.is_loading());
        assert!(h.conversation.messages().is_empty());

        let reply = h.conversation.send_message("second").await.unwrap().unwrap();
        assert_eq!(reply.prompt, "second");
        assert_eq!(h.conversation.messages(), vec![reply]);
    }
}
