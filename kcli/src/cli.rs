//! Command-line surface of the `kcli` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kchat::{ChatError, TurnReport};
use kcommon::ChatId;
use kprovider::{CancellationToken, Message, Role};
use kstore::{ChatFilter, ChatRecord};

use crate::{KcliConfig, KcliError, Runtime};

const TITLE_CHARS: usize = 60;

#[derive(Debug, Parser)]
#[command(
    name = "kcli",
    version,
    about = "Terminal chat client with MCP tool use",
    long_about = "Chat with OpenAI-compatible or Ollama models, letting them call tools on local MCP servers, and manage saved chats."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ~/.config/k-cli/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Send one message and print the reply
    Chat {
        message: String,

        /// Continue a saved chat instead of starting a new one
        #[arg(long, value_name = "ID")]
        chat_id: Option<String>,
    },

    /// List saved chats, newest first
    List {
        #[arg(long)]
        keyword: Option<String>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the transcript of a saved chat
    Show { id: String },

    /// Delete a saved chat
    Delete { id: String },
}

/// Text for stdout and whether the command reached its goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }
}

pub async fn run(cli: Cli) -> Result<CommandOutput, KcliError> {
    let config = KcliConfig::load(cli.config.as_deref())?;
    let runtime = Runtime::start(config).await?;

    let result = dispatch(&runtime, cli.command).await;
    let shutdown = runtime.shutdown().await;
    let output = result?;
    shutdown?;
    Ok(output)
}

async fn dispatch(runtime: &Runtime, command: Command) -> Result<CommandOutput, KcliError> {
    match command {
        Command::Chat { message, chat_id } => chat(runtime, &message, chat_id).await,
        Command::List {
            keyword,
            model,
            provider,
            limit,
        } => {
            let mut filter = ChatFilter::new();
            if let Some(keyword) = keyword {
                filter = filter.with_keyword(keyword);
            }
            if let Some(model) = model {
                filter = filter.with_model(model);
            }
            if let Some(provider) = provider {
                filter = filter.with_provider(provider);
            }
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            let records = runtime.chats().list_chats(filter).await?;
            Ok(CommandOutput::ok(render_list(&records)))
        }
        Command::Show { id } => {
            let id = ChatId::from(id);
            match runtime.chats().get_chat(&id).await? {
                Some(record) => Ok(CommandOutput::ok(render_transcript(&record.messages))),
                None => Err(ChatError::not_found(format!("chat {id} not found")).into()),
            }
        }
        Command::Delete { id } => {
            let id = ChatId::from(id);
            let deleted = runtime.chats().delete_chat(&id).await?;
            Ok(CommandOutput {
                text: render_delete(&id, deleted),
                success: deleted,
            })
        }
    }
}

async fn chat(
    runtime: &Runtime,
    message: &str,
    chat_id: Option<String>,
) -> Result<CommandOutput, KcliError> {
    let mut engine = runtime.engine()?;
    if let Some(chat_id) = chat_id {
        engine.resume(&ChatId::from(chat_id)).await?;
    }
    let servers = runtime.connect_tools().await?;
    tracing::debug!(phase = "cli", event = "tools_connected", servers);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let report = engine.handle_user_input(message, cancel).await;
    interrupt.abort();

    let report = report?;
    Ok(CommandOutput {
        text: render_turn(&report),
        success: report.stop_reason.is_completed(),
    })
}

pub fn render_turn(report: &TurnReport) -> String {
    let footer = if report.stop_reason.is_completed() {
        format!("[chat {}]", report.chat_id)
    } else {
        format!(
            "[chat {}] turn stopped: {}",
            report.chat_id,
            report.stop_reason.as_str()
        )
    };

    match report.reply.as_deref().map(str::trim) {
        Some(reply) if !reply.is_empty() => format!("{reply}\n\n{footer}"),
        _ => footer,
    }
}

pub fn render_list(records: &[ChatRecord]) -> String {
    if records.is_empty() {
        return "no chats found".to_string();
    }

    records
        .iter()
        .map(|record| {
            format!(
                "{}  {}  {:>3} messages  {}",
                record.id,
                record.update_time.format("%Y-%m-%d %H:%M"),
                record.messages.len(),
                title(&record.messages)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First user message, shortened to one line.
fn title(messages: &[Message]) -> String {
    let Some(first) = messages.iter().find(|message| message.role == Role::User) else {
        return String::new();
    };
    let text = first.content.as_text();
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() > TITLE_CHARS {
        let head = line.chars().take(TITLE_CHARS).collect::<String>();
        format!("{head}...")
    } else {
        line.to_string()
    }
}

pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| match (&message.server, &message.tool) {
            (Some(server), Some(tool)) if message.role != Role::User => format!(
                "{} [{server}/{tool}]: {}",
                message.role.as_str(),
                message.content.as_text()
            ),
            _ => format!("{}: {}", message.role.as_str(), message.content.as_text()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_delete(id: &ChatId, deleted: bool) -> String {
    if deleted {
        format!("deleted chat {id}")
    } else {
        format!("chat {id} not found")
    }
}
