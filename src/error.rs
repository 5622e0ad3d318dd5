use thiserror::Error;

use crate::codec::Kind;

/// Errors arising on the transports and in the command protocol.
///
/// None of these are fatal: every failure is local to one byte, one pair or
/// one message, and leaves the settings in their prior state.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transient "no data" signal from a transport queue.
    #[error("no data queued")]
    EmptyQueue,

    #[error("WiFi bridge did not acknowledge")]
    DeviceUnresponsive,

    #[error("malformed value for {token}: {raw:?}")]
    MalformedValue { token: String, raw: String },

    #[error("malformed message: got {got:?}, expected {expected}")]
    MalformedMessage { got: char, expected: &'static str },

    #[error("message exceeded {limit} bytes without a closing brace")]
    MessageTooLong { limit: usize },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    pub(crate) fn malformed_value(token: &str, raw: &str) -> Self {
        Self::MalformedValue {
            token: token.to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Dispatch table construction errors. These are configuration mistakes and
/// are caught before the table is ever used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("token {token:?} appears more than once")]
    DuplicateToken { token: &'static str },

    #[error("token {token:?}: {kind:?} values cannot be bound to a callback")]
    CallbackKind { token: &'static str, kind: Kind },

    #[error("token {token:?}: expected {expected:?}, got {got:?}")]
    KindMismatch {
        token: &'static str,
        expected: Kind,
        got: Kind,
    },
}

pub type Result<T> = std::result::Result<T, LinkError>;
