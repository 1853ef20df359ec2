//! End-of-run summary printed by the CLI.

use serde::Serialize;
use swarmbots_core::{SwarmSimulator, TickSummary};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReport {
    pub x: f64,
    pub y: f64,
    pub label: String,
    /// Heading angle in radians, if the agent ever got one.
    pub heading: Option<f64>,
    pub speed: f64,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub ticks: u64,
    pub elapsed: f64,
    pub agents: Vec<AgentReport>,
    pub last_tick: Option<TickSummary>,
}

impl RunReport {
    #[must_use]
    pub fn from_simulator(sim: &SwarmSimulator) -> Self {
        let agents = sim
            .world()
            .all_agents()
            .map(|(_, agent)| {
                let body = agent.body();
                AgentReport {
                    x: body.position().x,
                    y: body.position().y,
                    label: body.label().to_string(),
                    heading: body.direction().map(|direction| direction.angle()),
                    speed: body.speed(),
                    finished: agent
                        .program()
                        .is_none_or(|interpreter| interpreter.is_exhausted()),
                }
            })
            .collect();
        Self {
            ticks: sim.tick().0,
            elapsed: sim.elapsed(),
            agents,
            last_tick: sim.last_summary().cloned(),
        }
    }

    #[must_use]
    pub fn signalling(&self) -> usize {
        self.agents
            .iter()
            .filter(|agent| !agent.label.is_empty())
            .count()
    }
}
