//! Chat record storage contracts, the `ChatStore` adapter, and an in-memory
//! implementation for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Mutex;

use kcommon::BoxFuture;
use kstore::{ChatFilter, ChatRecord, ChatStore, StoreError};

use crate::ChatError;

pub type ChatFuture<'a, T> = BoxFuture<'a, T>;

pub trait ConversationStore: Send + Sync {
    fn list<'a>(&'a self, filter: ChatFilter) -> ChatFuture<'a, Result<Vec<ChatRecord>, ChatError>>;

    fn get<'a>(&'a self, id: &'a str) -> ChatFuture<'a, Result<Option<ChatRecord>, ChatError>>;

    fn add<'a>(&'a self, record: ChatRecord) -> ChatFuture<'a, Result<ChatRecord, ChatError>>;

    fn update<'a>(&'a self, record: ChatRecord) -> ChatFuture<'a, Result<ChatRecord, ChatError>>;

    fn delete<'a>(&'a self, id: &'a str) -> ChatFuture<'a, Result<bool, ChatError>>;
}

impl ConversationStore for ChatStore {
    fn list<'a>(&'a self, filter: ChatFilter) -> ChatFuture<'a, Result<Vec<ChatRecord>, ChatError>> {
        Box::pin(async move { Ok(ChatStore::list(self, filter).await?) })
    }

    fn get<'a>(&'a self, id: &'a str) -> ChatFuture<'a, Result<Option<ChatRecord>, ChatError>> {
        Box::pin(async move { Ok(ChatStore::get(self, id).await?) })
    }

    fn add<'a>(&'a self, record: ChatRecord) -> ChatFuture<'a, Result<ChatRecord, ChatError>> {
        Box::pin(async move { Ok(ChatStore::add(self, record).await?) })
    }

    fn update<'a>(&'a self, record: ChatRecord) -> ChatFuture<'a, Result<ChatRecord, ChatError>> {
        Box::pin(async move { Ok(ChatStore::update(self, record).await?) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> ChatFuture<'a, Result<bool, ChatError>> {
        Box::pin(async move { Ok(ChatStore::delete(self, id).await?) })
    }
}

/// Records kept in a map, never written anywhere.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    records: Mutex<HashMap<String, ChatRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, ChatRecord>) -> Result<T, ChatError>,
    ) -> Result<T, ChatError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| ChatError::store("conversation store lock poisoned"))?;
        f(&mut records)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn list<'a>(&'a self, filter: ChatFilter) -> ChatFuture<'a, Result<Vec<ChatRecord>, ChatError>> {
        Box::pin(async move {
            self.with_records(|records| {
                let mut all = records.values().cloned().collect::<Vec<_>>();
                all.sort_by(|a, b| {
                    b.create_time
                        .cmp(&a.create_time)
                        .then_with(|| a.id.cmp(&b.id))
                });
                Ok(filter.apply(all))
            })
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> ChatFuture<'a, Result<Option<ChatRecord>, ChatError>> {
        Box::pin(async move { self.with_records(|records| Ok(records.get(id).cloned())) })
    }

    fn add<'a>(&'a self, record: ChatRecord) -> ChatFuture<'a, Result<ChatRecord, ChatError>> {
        Box::pin(async move {
            if record.id.is_empty() {
                return Err(StoreError::invalid_input("chat id must not be empty").into());
            }
            self.with_records(|records| {
                records.insert(record.id.clone(), record.clone());
                Ok(record)
            })
        })
    }

    fn update<'a>(&'a self, record: ChatRecord) -> ChatFuture<'a, Result<ChatRecord, ChatError>> {
        Box::pin(async move {
            self.with_records(|records| match records.get_mut(&record.id) {
                Some(existing) => {
                    *existing = record.clone();
                    Ok(record)
                }
                None => Err(ChatError::not_found(format!("chat '{}' not found", record.id))),
            })
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> ChatFuture<'a, Result<bool, ChatError>> {
        Box::pin(async move { self.with_records(|records| Ok(records.remove(id).is_some())) })
    }
}
