use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::term::DecodeError;

/// Errors raised by the worker bridge.
///
/// Only [`BridgeError::RemoteCall`] and [`BridgeError::Decode`] leave the
/// channel usable; everything else means the framing invariant is gone and
/// the worker should stop.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The node answered a call with `ERROR`.
    #[error("remote call failed: {message}")]
    RemoteCall { message: String },

    #[error("protocol framing violated: {0}")]
    Framing(String),

    #[error("channel closed by the node")]
    ChannelClosed,

    #[error("{operation} attempted after termination was signaled")]
    LifecycleViolation { operation: &'static str },

    #[error("channel unusable after an earlier fault")]
    Poisoned,

    #[error("no response within {0:?}")]
    CallTimeout(Duration),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] DecodeError),

    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn framing(message: impl Into<String>) -> Self {
        Self::Framing(message.into())
    }

    pub fn remote_call(message: impl Into<String>) -> Self {
        Self::RemoteCall {
            message: message.into(),
        }
    }

    /// Whether the worker must stop using the channel.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RemoteCall { .. } | Self::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
