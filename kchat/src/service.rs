//! Record-level chat operations shared by the engine and the CLI.

use std::sync::Arc;

use kcommon::{ChatId, generate_chat_id};
use kprovider::Message;
use kstore::{ChatFilter, ChatRecord};

use crate::{ChatError, ConversationStore};

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ConversationStore>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Creates a record under `id`, or under a freshly generated id.
    pub async fn create_chat(
        &self,
        messages: Vec<Message>,
        id: Option<ChatId>,
    ) -> Result<ChatRecord, ChatError> {
        let id = id.unwrap_or_else(generate_chat_id);
        if id.is_empty() {
            return Err(ChatError::invalid_request("chat id must not be empty"));
        }

        self.store.add(ChatRecord::new(id.into_string(), messages)).await
    }

    pub async fn update_chat(
        &self,
        id: &ChatId,
        messages: Vec<Message>,
    ) -> Result<ChatRecord, ChatError> {
        let mut record = self
            .store
            .get(id.as_str())
            .await?
            .ok_or_else(|| ChatError::not_found(format!("chat '{id}' not found")))?;

        record.update_messages(messages);
        self.store.update(record).await
    }

    /// Creates the record on first save and replaces its transcript afterwards.
    pub async fn save_chat(
        &self,
        id: &ChatId,
        messages: Vec<Message>,
    ) -> Result<ChatRecord, ChatError> {
        match self.store.get(id.as_str()).await? {
            Some(mut record) => {
                record.update_messages(messages);
                self.store.update(record).await
            }
            None => self.create_chat(messages, Some(id.clone())).await,
        }
    }

    pub async fn delete_chat(&self, id: &ChatId) -> Result<bool, ChatError> {
        self.store.delete(id.as_str()).await
    }

    pub async fn get_chat(&self, id: &ChatId) -> Result<Option<ChatRecord>, ChatError> {
        self.store.get(id.as_str()).await
    }

    pub async fn list_chats(&self, filter: ChatFilter) -> Result<Vec<ChatRecord>, ChatError> {
        self.store.list(filter).await
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService").finish_non_exhaustive()
    }
}
