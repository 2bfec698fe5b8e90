//! Configuration and command errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

use kchat::ChatError;
use kprovider::ProviderError;
use kstore::StoreError;
use ktooling::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Io,
    Parse,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Io, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Parse, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Invalid, message)
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for ConfigError {}

impl From<StoreError> for ConfigError {
    fn from(value: StoreError) -> Self {
        ConfigError::io(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KcliErrorKind {
    Config,
    Provider,
    Store,
    Tooling,
    Chat,
}

/// Anything that makes a command fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KcliError {
    pub kind: KcliErrorKind,
    pub message: String,
}

impl KcliError {
    pub fn new(kind: KcliErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn chat(message: impl Into<String>) -> Self {
        Self::new(KcliErrorKind::Chat, message)
    }
}

impl Display for KcliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for KcliError {}

impl From<ConfigError> for KcliError {
    fn from(value: ConfigError) -> Self {
        KcliError::new(KcliErrorKind::Config, value.to_string())
    }
}

impl From<ProviderError> for KcliError {
    fn from(value: ProviderError) -> Self {
        KcliError::new(KcliErrorKind::Provider, value.to_string())
    }
}

impl From<StoreError> for KcliError {
    fn from(value: StoreError) -> Self {
        KcliError::new(KcliErrorKind::Store, value.to_string())
    }
}

impl From<ToolError> for KcliError {
    fn from(value: ToolError) -> Self {
        KcliError::new(KcliErrorKind::Tooling, value.to_string())
    }
}

impl From<ChatError> for KcliError {
    fn from(value: ChatError) -> Self {
        KcliError::new(KcliErrorKind::Chat, value.to_string())
    }
}
