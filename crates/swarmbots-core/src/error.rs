//! Error types shared across the SwarmBots core.

use swarmbots_index::IndexError;
use thiserror::Error;

/// Errors raised while assembling a program from builder events.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProgramError {
    /// The event stream ended while blocks were still open.
    #[error("unbalanced program: {open_blocks} block(s) left open at end of program")]
    UnbalancedProgram { open_blocks: usize },
    /// A block end arrived with no open block to close.
    #[error("unexpected block end with no open block")]
    UnexpectedBlockEnd,
    /// A command argument was out of range or not finite.
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Errors raised by agents, the world and the simulation driver.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SwarmError {
    /// A numeric argument was rejected before any state changed.
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    /// An operation ran before its preconditions were established.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The referenced agent is not part of the world.
    #[error("unknown agent")]
    UnknownAgent,
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Reject non-finite values for `name`.
pub(crate) fn ensure_finite(name: &'static str, value: f64) -> Result<f64, SwarmError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SwarmError::InvalidParameter { name, value })
    }
}
