use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::api::{ApiResult, ChatBackend};
use crate::types::Message;

/// In-memory chat transcript with optimistic sends.
///
/// A sent prompt shows up immediately as a pending message and is swapped
/// for the server's reply, or dropped if the send fails.
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    messages: RwLock<Vec<Message>>,
    is_loading: AtomicBool,
    is_history_loading: AtomicBool,
}

impl Conversation {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            messages: RwLock::new(Vec::new()),
            is_loading: AtomicBool::new(false),
            is_history_loading: AtomicBool::new(false),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::Acquire)
    }

    pub fn is_history_loading(&self) -> bool {
        self.is_history_loading.load(Ordering::Acquire)
    }

    /// Send a prompt. Returns `Ok(None)` without touching the network when the
    /// prompt is blank or another send is still in flight.
    pub async fn send_message(&self, prompt: &str) -> ApiResult<Option<Message>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(None);
        }
        let Some(loading) = LoadingFlag::acquire(&self.is_loading) else {
            tracing::debug!("send already in flight, ignoring prompt");
            return Ok(None);
        };

        let pending = PendingSend::push(self, Message::pending(prompt), loading);
        match self.backend.send_message(prompt).await {
            Ok(reply) => {
                pending.resolve(reply.clone());
                Ok(Some(reply))
            }
            Err(err) => {
                tracing::warn!("failed to send message: {err}");
                Err(err)
            }
        }
    }

    /// Replace the transcript with the server's history. On failure the
    /// current transcript is kept.
    pub async fn refresh_history(&self) -> ApiResult<()> {
        let result = {
            let _loading = LoadingFlag::set(&self.is_history_loading);
            self.backend.history().await
        };

        match result {
            Ok(history) => {
                *self.write() = history.messages;
                Ok(())
            }
            Err(err) => {
                tracing::error!("failed to load chat history: {err}");
                Err(err)
            }
        }
    }

    /// Clear the local transcript only.
    pub fn clear_history(&self) {
        self.write().clear();
    }

    /// Delete the history on the server, then locally.
    pub async fn delete_history(&self) -> ApiResult<()> {
        self.backend.clear_history().await?;
        self.clear_history();
        Ok(())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Message>> {
        self.messages.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Raised while an operation runs; lowered on drop, including when the
/// awaiting future is cancelled.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    /// Raise the flag unless it is already raised.
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }

    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The optimistic message of an in-flight send. Removed from the transcript
/// on drop unless [`resolve`](Self::resolve) swapped it for the reply.
struct PendingSend<'a> {
    conversation: &'a Conversation,
    id: String,
    resolved: bool,
    _loading: LoadingFlag<'a>,
}

impl<'a> PendingSend<'a> {
    fn push(conversation: &'a Conversation, message: Message, loading: LoadingFlag<'a>) -> Self {
        let id = message.id.clone();
        conversation.write().push(message);
        Self {
            conversation,
            id,
            resolved: false,
            _loading: loading,
        }
    }

    fn resolve(mut self, reply: Message) {
        if let Some(slot) = self
            .conversation
            .write()
            .iter_mut()
            .find(|m| m.id == self.id)
        {
            *slot = reply;
        }
        self.resolved = true;
    }
}

impl Drop for PendingSend<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.conversation.write().retain(|m| m.id != self.id);
        }
    }
}
