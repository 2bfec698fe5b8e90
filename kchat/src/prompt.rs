//! System prompt composition.

use chrono::{DateTime, SecondsFormat, Utc};
use kstore::{MCP_PROMPT_NAME, PromptRepository};
use ktooling::ToolCatalog;

use crate::ChatError;

pub const TIME_PROMPT_PREFIX: &str = "Current time: ";

/// Builds the system prompt sent with every completion request.
///
/// The prompt starts with the current time. When the tool catalog is not
/// empty, the tool-use instructions and the rendered catalog follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemPromptComposer {
    tool_instructions: Option<String>,
}

impl SystemPromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        self.tool_instructions = (!instructions.trim().is_empty()).then_some(instructions);
        self
    }

    /// Uses the repository's `mcp` prompt as tool instructions when present.
    pub fn from_repository(prompts: &PromptRepository) -> Result<Self, ChatError> {
        let composer = Self::new();
        Ok(match prompts.by_name(MCP_PROMPT_NAME)? {
            Some(prompt) => composer.with_tool_instructions(prompt.content),
            None => composer,
        })
    }

    pub fn tool_instructions(&self) -> Option<&str> {
        self.tool_instructions.as_deref()
    }

    pub fn compose(&self, catalog: &ToolCatalog, now: DateTime<Utc>) -> String {
        let mut prompt = format!(
            "{TIME_PROMPT_PREFIX}{}\n",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        if catalog.is_empty() {
            return prompt;
        }

        prompt.push('\n');
        if let Some(instructions) = &self.tool_instructions {
            prompt.push_str(instructions.trim_end());
            prompt.push_str("\n\n");
        }
        prompt.push_str(&catalog.render());
        prompt.push('\n');
        prompt
    }
}
