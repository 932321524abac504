use crate::command::Trigger;

/// Errors raised by the event bus, the command stack and command handlers.
///
/// The type is `Clone` so a listener failure can be attached to the
/// `error` event and still be returned to the caller of `fire`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `execute` or `can_execute` was called for a command without a handler
    #[error("no command handler registered for <{0}>")]
    UnknownCommand(String),

    /// The command stack was re-entered in a way that would corrupt the history
    #[error("illegal invocation of <{command}> while {trigger} is in progress")]
    IllegalInvocation { command: String, trigger: Trigger },

    /// `fire` was called without an event type
    #[error("no event type specified")]
    MissingEventType,

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A listener or a command handler failed
    #[error("{0}")]
    Failed(String),
}

impl Error {
    /// Creates a [`Error::Failed`] from anything printable.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
