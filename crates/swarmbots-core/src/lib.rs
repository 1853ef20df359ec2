//! Core types for SwarmBots: command trees, per-agent interpreters, the world
//! agents move in and the fixed-step simulation driver.
//!
//! A program is assembled once with a [`ProgramBuilder`], frozen into a
//! [`CommandTree`] and shared through an `Arc` by every agent that runs it.
//! Each agent owns an [`Interpreter`] holding its own cursor into that tree.

mod agent;
mod builder;
mod config;
mod error;
mod geometry;
mod interpreter;
mod program;
mod simulation;
mod world;

use slotmap::new_key_type;

pub use agent::{Agent, AgentBody};
pub use builder::{ProgramBuilder, ProgramEvent};
pub use config::SwarmConfig;
pub use error::{ProgramError, SwarmError};
pub use geometry::{Direction, Point};
pub use interpreter::{Interpreter, StepOutcome, StepReport};
pub use program::{BlockKind, Command, CommandTree, NodeId, Primitive, PrimitiveKind};
pub use simulation::{SwarmSimulator, Tick, TickSummary};
pub use world::{Region, Shape, Surroundings, TickActivity, World, WorldView};

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}
