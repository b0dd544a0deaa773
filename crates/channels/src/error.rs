use std::error::Error as StdError;

use crate::{gateway::ItemId, target::Target};

/// Crate-wide result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A target string could not be parsed.
    #[error("invalid target: {input}")]
    InvalidTarget { input: String },

    /// The target does not resolve on the remote side (deleted channel,
    /// unknown user, bot not a member).
    #[error("target does not resolve: {target}")]
    Unresolved { target: Target },

    /// The item no longer exists remotely.
    #[error("item {item_id} not found at {target}")]
    NotFound { target: Target, item_id: ItemId },

    /// The remote side refused the operation.
    #[error("permission denied: {context}")]
    Forbidden { context: String },

    /// Temporary failure (rate limit, timeout, 5xx).
    #[error("transient remote error: {message}")]
    Transient { message: String },

    /// Wrapped source error from the transport.
    #[error("remote operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Coarse classification used for log severity and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTarget,
    NotFound,
    Forbidden,
    Transient,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTarget => "invalid_target",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Transient => "transient",
        }
    }
}

impl Error {
    #[must_use]
    pub fn invalid_target(input: impl Into<String>) -> Self {
        Self::InvalidTarget {
            input: input.into(),
        }
    }

    #[must_use]
    pub fn not_found(target: Target, item_id: ItemId) -> Self {
        Self::NotFound { target, item_id }
    }

    #[must_use]
    pub fn forbidden(context: impl Into<String>) -> Self {
        Self::Forbidden {
            context: context.into(),
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTarget { .. } | Self::Unresolved { .. } => ErrorKind::InvalidTarget,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Transient { .. } | Self::External { .. } => ErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
