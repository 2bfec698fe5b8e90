//! Store errors for repository operations and persistence.

use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    Shutdown,
    Cancelled,
    Storage,
    Serialization,
    InvalidInput,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn shutdown() -> Self {
        Self::new(StoreErrorKind::Shutdown, "repository is shutdown")
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Cancelled, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Storage, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Serialization, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidInput, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Disconnected, message)
    }

    pub fn poisoned(what: &str) -> Self {
        Self::storage(format!("{what} lock poisoned"))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for StoreError {}
