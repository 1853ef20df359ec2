//! Plain-text agent lists: one `x y` pair per line.

use std::path::Path;

use serde::{Deserialize, Serialize};
use swarmbots_core::Point;

use crate::LoadError;

/// Initial placement of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub label: String,
}

impl AgentSpec {
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Parse an agent list. Blank lines and lines starting with `#` are skipped.
pub fn parse_agent_list(text: &str) -> Result<Vec<AgentSpec>, LoadError> {
    let mut agents = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        agents.push(parse_line(idx + 1, line)?);
    }
    Ok(agents)
}

fn parse_line(line_no: usize, line: &str) -> Result<AgentSpec, LoadError> {
    let malformed = |reason: &'static str| LoadError::MalformedAgent {
        line: line_no,
        content: line.to_string(),
        reason,
    };
    let mut fields = line.split_whitespace();
    let (Some(x), Some(y)) = (fields.next(), fields.next()) else {
        return Err(malformed("expected two coordinates"));
    };
    if fields.next().is_some() {
        return Err(malformed("expected exactly two coordinates"));
    }
    let x: f64 = x.parse().map_err(|_| malformed("x is not a number"))?;
    let y: f64 = y.parse().map_err(|_| malformed("y is not a number"))?;
    if !(x.is_finite() && y.is_finite()) {
        return Err(malformed("coordinates must be finite"));
    }
    Ok(AgentSpec {
        x,
        y,
        label: String::new(),
    })
}

pub fn load_agent_list(path: &Path) -> Result<Vec<AgentSpec>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_agent_list(&text)
}
