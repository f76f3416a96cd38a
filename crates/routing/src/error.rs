use std::error::Error as StdError;

/// Failures that escape the engine as `Err`.
///
/// Domain outcomes (not found, conflict, unconfigured, delivery failure) are
/// never errors; they come back as [`crate::RoutingResult`] values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A participant argument is incomplete. Indicates a caller bug.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The routing store rejected a write or read.
    #[error("routing store failed to {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_argument(message: impl std::fmt::Display) -> Self {
        Self::InvalidArgument {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn store(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Store {
            context: context.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a store context to a collaborator result.
pub(crate) trait StoreContext<T> {
    fn store_context(self, context: &str) -> Result<T>;
}

impl<T> StoreContext<T> for anyhow::Result<T> {
    fn store_context(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::store(context, e))
    }
}
