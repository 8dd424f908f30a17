//! Message stream controller.
//!
//! One controller drives the message window for whichever chat is
//! selected. Opening a chat walks `Idle → Loading → Live`: history is
//! fetched ascending by creation time, then a realtime subscription is
//! opened filtered to insertions on that chat. The previous subscription
//! is always torn down before a new one is established, so a mounted
//! window holds at most one.
//!
//! Two hazards the controller guards against:
//!
//! - a slow history fetch for a previously selected chat finishing after
//!   the user has switched away (each fetch is tagged with a generation
//!   and stale results are discarded), and
//! - a locally sent message being echoed back by the subscription
//!   (incoming rows are reconciled by message id, not blindly appended).

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};

use crate::client::{Backend, ChangeFeed};
use crate::error::{Error, Result};
use crate::storage::{AttachmentUploader, ObjectStore};
use crate::types::{AttachmentSource, Message, NewMessage};

pub(crate) const MESSAGES_TABLE: &str = "messages";

/// Caption used when an attachment is sent with no text.
pub const DEFAULT_ATTACHMENT_CAPTION: &str = "Sent an attachment";

/// Backend operations the message window depends on.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Returns all messages of a chat, ascending by creation time.
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>>;

    /// Inserts a message and returns the stored row.
    async fn insert_message(&self, message: &NewMessage) -> Result<Message>;

    /// Opens a feed of messages inserted into a chat.
    async fn subscribe_messages(&self, chat_id: &str) -> Result<ChangeFeed<Message>>;
}

#[async_trait]
impl MessageStore for Backend {
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.select_eq(MESSAGES_TABLE, "chat_id", chat_id, "created_at.asc")
            .await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        self.insert_returning(MESSAGES_TABLE, message).await
    }

    async fn subscribe_messages(&self, chat_id: &str) -> Result<ChangeFeed<Message>> {
        self.subscribe_inserts(MESSAGES_TABLE, "chat_id", chat_id)
            .await
    }
}

/// Lifecycle of the message window for the selected chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// No chat open, no subscription held.
    Idle,
    /// History fetch in flight.
    Loading,
    /// History loaded and the realtime subscription is open.
    Live,
}

/// The message window: history plus live insertions for one chat.
pub struct MessageWindow<S: MessageStore> {
    store: S,
    user_id: String,
    state: WindowState,
    chat_id: Option<String>,
    generation: u64,
    messages: Vec<Message>,
    feed: Option<ChangeFeed<Message>>,
}

impl<S: MessageStore> MessageWindow<S> {
    /// Creates an idle window for the given sender.
    pub fn new<U: Into<String>>(store: S, user_id: U) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            state: WindowState::Idle,
            chat_id: None,
            generation: 0,
            messages: Vec::new(),
            feed: None,
        }
    }

    /// Returns the window's lifecycle state.
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Returns the open chat identifier, if any.
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Returns the loaded messages, ascending by creation time.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the local sender's user identifier.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Opens a chat: tear down the old subscription, load history,
    /// subscribe to new insertions.
    ///
    /// Teardown happens before anything else so that two subscriptions
    /// never overlap, and the unsubscribe/subscribe pair is strictly
    /// sequential.
    pub async fn open(&mut self, chat_id: &str) -> Result<()> {
        self.close();
        self.chat_id = Some(chat_id.to_string());
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        self.state = WindowState::Loading;

        let history = match self.store.list_messages(chat_id).await {
            Ok(history) => history,
            Err(e) => {
                if self.generation == generation {
                    self.state = WindowState::Idle;
                }
                return Err(e);
            }
        };
        if !self.apply_history(generation, history) {
            // A newer open superseded this fetch while it was in flight.
            return Ok(());
        }

        let feed = match self.store.subscribe_messages(chat_id).await {
            Ok(feed) => feed,
            Err(e) => {
                if self.generation == generation {
                    self.state = WindowState::Idle;
                }
                return Err(e);
            }
        };
        if self.generation == generation {
            self.feed = Some(feed);
            self.state = WindowState::Live;
        }
        Ok(())
    }

    /// Replaces local history if the fetch that produced it is still
    /// current. Returns false for a stale fetch, which is discarded.
    fn apply_history(&mut self, generation: u64, history: Vec<Message>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.messages = history;
        true
    }

    /// Closes the window: the subscription is dropped (which closes the
    /// connection) and the state returns to idle.
    pub fn close(&mut self) {
        self.feed = None;
        self.chat_id = None;
        self.messages.clear();
        self.state = WindowState::Idle;
    }

    /// Merges one pushed row into the window.
    ///
    /// Reconciliation is keyed by message id: a row already present —
    /// typically the echo of a message this window just sent — is
    /// dropped. New rows are placed in creation-time order.
    fn ingest(&mut self, message: Message) -> bool {
        if self.chat_id.as_deref() != Some(message.chat_id.as_str()) {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let at = self
            .messages
            .iter()
            .rposition(|m| m.created_at <= message.created_at)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.messages.insert(at, message);
        true
    }

    /// Drains every insertion the subscription has already delivered,
    /// without blocking. Returns the newly merged messages in arrival
    /// order; duplicates dropped by [`Self::ingest`] do not appear.
    ///
    /// Callers display the returned rows rather than assuming new
    /// messages land at the tail of the window: an out-of-order row is
    /// merged mid-list but still reported here exactly once.
    ///
    /// If the server has closed the feed the window stays on its loaded
    /// history; there is no reconnection.
    pub fn poll_inserts(&mut self) -> Result<Vec<Message>> {
        let mut merged = Vec::new();
        loop {
            let next = match self.feed.as_mut() {
                Some(feed) => feed.next().now_or_never(),
                None => break,
            };
            match next {
                Some(Some(Ok(message))) => {
                    if self.ingest(message.clone()) {
                        merged.push(message);
                    }
                }
                Some(Some(Err(e))) => return Err(e),
                Some(None) => {
                    // Server closed the feed; the view goes stale.
                    self.feed = None;
                    break;
                }
                None => break,
            }
        }
        Ok(merged)
    }

    /// Sends a plain text message to the open chat.
    ///
    /// Rejects locally when no chat is open or the trimmed text is
    /// empty. The stored row is merged immediately; its later echo on
    /// the subscription is dropped by id.
    pub async fn send_text(&mut self, text: &str) -> Result<Message> {
        let chat_id = self.require_chat()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation(
                "Nothing to send: type a message or attach a file.",
                Some("content".to_string()),
            ));
        }
        let params = NewMessage::text(chat_id.as_str(), self.user_id.as_str(), text);
        let stored = self.store.insert_message(&params).await?;
        self.ingest(stored.clone());
        Ok(stored)
    }

    /// Uploads a file and sends a message referencing it.
    ///
    /// The message row is only created once the uploader has resolved a
    /// public URL; an upload failure aborts with no message created.
    /// The trimmed caption is used as content, or
    /// [`DEFAULT_ATTACHMENT_CAPTION`] when empty.
    pub async fn send_attachment<O: ObjectStore>(
        &mut self,
        uploader: &AttachmentUploader<O>,
        file: &AttachmentSource,
        caption: &str,
    ) -> Result<Message> {
        let chat_id = self.require_chat()?;
        let attachment = uploader.upload(&chat_id, file).await?;

        let caption = caption.trim();
        let caption = if caption.is_empty() {
            DEFAULT_ATTACHMENT_CAPTION
        } else {
            caption
        };
        let params = NewMessage::with_attachment(
            chat_id.as_str(),
            self.user_id.as_str(),
            caption,
            attachment,
        );
        let stored = self.store.insert_message(&params).await?;
        self.ingest(stored.clone());
        Ok(stored)
    }

    fn require_chat(&self) -> Result<String> {
        self.chat_id.clone().ok_or_else(|| {
            Error::validation("No chat is selected.", Some("chat_id".to_string()))
        })
    }
}
