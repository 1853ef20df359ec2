//! Shared plumbing for the `swarmbots` command-line runner.

use std::path::PathBuf;

use swarmbots_core::{ProgramError, SwarmError};
use thiserror::Error;

pub mod agents;
pub mod report;
pub mod scenario;

pub use agents::{AgentSpec, load_agent_list, parse_agent_list};
pub use report::{AgentReport, RunReport};
pub use scenario::{RegionSpec, Scenario};

/// Errors raised while loading run inputs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed agent on line {line} ({reason}): `{content}`")]
    MalformedAgent {
        line: usize,
        content: String,
        reason: &'static str,
    },
    #[error("invalid program: {0}")]
    Program(#[from] ProgramError),
    #[error("invalid world: {0}")]
    World(#[from] SwarmError),
}
