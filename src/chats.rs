//! Chat list controller.
//!
//! Loads the set of chat rooms, supports creating a new room, and tracks
//! which room is selected. The controller is generic over [`ChatStore`]
//! so it can be exercised without a live backend; [`crate::Backend`]
//! provides the real implementation.

use async_trait::async_trait;

use crate::client::Backend;
use crate::error::{Error, Result};
use crate::types::{Chat, NewChat};

pub(crate) const CHATS_TABLE: &str = "chats";

/// Backend operations the chat list depends on.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Returns all chats, most recently updated first.
    async fn list_chats(&self) -> Result<Vec<Chat>>;

    /// Creates a chat and returns the stored row.
    async fn create_chat(&self, chat: &NewChat) -> Result<Chat>;
}

#[async_trait]
impl ChatStore for Backend {
    async fn list_chats(&self) -> Result<Vec<Chat>> {
        self.select_all(CHATS_TABLE, "updated_at.desc").await
    }

    async fn create_chat(&self, chat: &NewChat) -> Result<Chat> {
        self.insert_returning(CHATS_TABLE, chat).await
    }
}

/// Sidebar state: the list of chats and the user's selection.
pub struct ChatList<S: ChatStore> {
    store: S,
    chats: Vec<Chat>,
    selected: Option<String>,
}

impl<S: ChatStore> ChatList<S> {
    /// Creates an empty chat list over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            chats: Vec::new(),
            selected: None,
        }
    }

    /// Returns the loaded chats, most recently updated first.
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// Returns the selected chat identifier, if any.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Returns the loaded chat with the given identifier.
    pub fn get(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    /// Reloads the full chat list.
    ///
    /// On failure the local list is cleared and the error returned for
    /// logging: the view shows an empty list rather than stale rows.
    pub async fn refresh(&mut self) -> Result<()> {
        match self.store.list_chats().await {
            Ok(chats) => {
                self.chats = chats;
                Ok(())
            }
            Err(e) => {
                self.chats.clear();
                Err(e)
            }
        }
    }

    /// Creates a chat and prepends it to the local list.
    ///
    /// Empty or whitespace-only names are rejected locally, before any
    /// network call. The prepend is an optimistic single-item insert;
    /// no full reload is issued.
    pub async fn create(&mut self, name: &str) -> Result<&Chat> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation(
                "Chat name cannot be empty.",
                Some("name".to_string()),
            ));
        }
        let chat = self.store.create_chat(&NewChat::new(name)).await?;
        self.chats.insert(0, chat);
        Ok(&self.chats[0])
    }

    /// Selects a chat. Pure state transition; no network effect.
    pub fn select<I: Into<String>>(&mut self, id: I) {
        self.selected = Some(id.into());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use time::macros::datetime;

    use super::*;

    struct MockStore {
        calls: Arc<Mutex<Vec<String>>>,
        chats: Vec<Chat>,
        fail_list: Arc<AtomicBool>,
    }

    impl MockStore {
        fn new(chats: Vec<Chat>) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                chats,
                fail_list: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl ChatStore for MockStore {
        async fn list_chats(&self) -> Result<Vec<Chat>> {
            self.calls.lock().unwrap().push("list".to_string());
            if self.fail_list.load(Ordering::Relaxed) {
                Err(Error::api(500, "backend unavailable"))
            } else {
                Ok(self.chats.clone())
            }
        }

        async fn create_chat(&self, chat: &NewChat) -> Result<Chat> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create:{}", chat.name));
            Ok(sample("c-new", &chat.name))
        }
    }

    fn sample(id: &str, name: &str) -> Chat {
        Chat {
            id: id.to_string(),
            name: name.to_string(),
            last_message: None,
            avatar_url: None,
            updated_at: datetime!(2024-05-01 12:00:00 UTC),
        }
    }

    #[tokio::test]
    async fn whitespace_only_name_issues_no_network_call() {
        let store = MockStore::new(vec![]);
        let calls = store.calls.clone();
        let mut list = ChatList::new(store);

        for name in ["", "   ", "\t\n"] {
            let err = list.create(name).await.unwrap_err();
            assert!(err.is_validation(), "{name:?} should fail validation");
        }
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_prepends_without_reloading() {
        let store = MockStore::new(vec![sample("c1", "general")]);
        let calls = store.calls.clone();
        let mut list = ChatList::new(store);
        list.refresh().await.unwrap();

        let created = list.create("  random  ").await.unwrap();
        assert_eq!(created.name, "random");
        assert_eq!(list.chats()[0].id, "c-new");
        assert_eq!(list.chats()[1].id, "c1");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["list".to_string(), "create:random".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_refresh_clears_the_list() {
        let store = MockStore::new(vec![sample("c1", "general")]);
        let fail = store.fail_list.clone();
        let mut list = ChatList::new(store);
        list.refresh().await.unwrap();
        assert_eq!(list.chats().len(), 1);

        fail.store(true, Ordering::Relaxed);
        assert!(list.refresh().await.is_err());
        assert!(list.chats().is_empty());
    }

    #[tokio::test]
    async fn select_is_a_pure_state_transition() {
        let store = MockStore::new(vec![]);
        let calls = store.calls.clone();
        let mut list = ChatList::new(store);
        list.select("c42");
        assert_eq!(list.selected(), Some("c42"));
        assert!(calls.lock().unwrap().is_empty());
    }
}
