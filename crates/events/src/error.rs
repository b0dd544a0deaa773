use std::error::Error as StdError;

use crate::trigger::TriggerMask;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bus no longer accepts events.
    #[error("event bus is closed (dropped {kind} event)")]
    Closed { kind: TriggerMask },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
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
}

pub type Result<T> = std::result::Result<T, Error>;
