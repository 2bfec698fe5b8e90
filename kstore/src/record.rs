//! Persisted chat records and list filters.

use chrono::{DateTime, Utc};
use kcommon::ChatId;
use kprovider::{Message, Role};
use serde::{Deserialize, Serialize};

/// One conversation as stored on disk, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    #[serde(default, alias = "Messages")]
    pub messages: Vec<Message>,
}

impl ChatRecord {
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            create_time: now,
            update_time: now,
            messages: without_system(messages),
        }
    }

    pub fn with_create_time(mut self, create_time: DateTime<Utc>) -> Self {
        self.create_time = create_time;
        self
    }

    pub fn chat_id(&self) -> ChatId {
        ChatId::from(self.id.as_str())
    }

    /// Replaces the transcript, dropping system messages, and bumps `update_time`.
    pub fn update_messages(&mut self, messages: Vec<Message>) {
        self.messages = without_system(messages);
        self.update_time = Utc::now();
    }

    /// System messages slip in when callers build records by hand.
    pub(crate) fn strip_system(&mut self) {
        self.messages.retain(|message| message.role != Role::System);
    }
}

fn without_system(mut messages: Vec<Message>) -> Vec<Message> {
    messages.retain(|message| message.role != Role::System);
    messages
}

/// Criteria for listing chats.
///
/// A record matches when any single message satisfies every set criterion.
/// Text criteria are case-insensitive substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatFilter {
    pub keyword: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub limit: Option<usize>,
}

impl ChatFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = non_empty_lowercase(keyword.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = non_empty_lowercase(model.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = non_empty_lowercase(provider.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn has_criteria(&self) -> bool {
        self.keyword.is_some() || self.model.is_some() || self.provider.is_some()
    }

    pub fn matches(&self, record: &ChatRecord) -> bool {
        if !self.has_criteria() {
            return true;
        }

        let keyword = self.keyword.as_deref().map(str::to_lowercase);
        let model = self.model.as_deref().map(str::to_lowercase);
        let provider = self.provider.as_deref().map(str::to_lowercase);

        record.messages.iter().any(|message| {
            keyword
                .as_deref()
                .is_none_or(|keyword| message.content.contains_lowercase(keyword))
                && model
                    .as_deref()
                    .is_none_or(|model| field_contains(message.model.as_deref(), model))
                && provider
                    .as_deref()
                    .is_none_or(|provider| field_contains(message.provider.as_deref(), provider))
        })
    }

    /// Filters records already sorted newest first and applies the limit.
    pub fn apply(&self, records: impl IntoIterator<Item = ChatRecord>) -> Vec<ChatRecord> {
        records
            .into_iter()
            .filter(|record| self.matches(record))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

fn non_empty_lowercase(value: String) -> Option<String> {
    let value = value.trim().to_lowercase();
    (!value.is_empty()).then_some(value)
}

fn field_contains(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|field| !field.is_empty() && field.to_lowercase().contains(needle))
}
