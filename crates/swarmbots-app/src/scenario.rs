//! JSON scenario files: configuration, agents, regions and one shared program.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swarmbots_core::{
    CommandTree, ProgramBuilder, ProgramEvent, Region, Shape, SwarmConfig, World,
};
use tracing::debug;

use crate::LoadError;
use crate::agents::AgentSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub label: String,
    pub shape: Shape,
}

/// Everything needed to set up a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub config: SwarmConfig,
    pub agents: Vec<AgentSpec>,
    pub regions: Vec<RegionSpec>,
    pub program: Vec<ProgramEvent>,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Assemble the program events into a command tree.
    pub fn program_tree(&self) -> Result<CommandTree, LoadError> {
        Ok(ProgramBuilder::from_events(self.program.iter().cloned())?)
    }

    /// Build a world with every agent and region placed and the program installed.
    pub fn build_world(&self) -> Result<World, LoadError> {
        self.build_world_with_random(0)
    }

    /// Like [`Scenario::build_world`], plus `extra` agents placed at random.
    pub fn build_world_with_random(&self, extra: usize) -> Result<World, LoadError> {
        let tree = Arc::new(self.program_tree()?);
        let mut world = World::new(self.config.clone())?;
        for region in &self.regions {
            world.add_region(Region::new(region.label.clone(), region.shape)?);
        }
        for agent in &self.agents {
            world.spawn_labelled_agent(agent.position(), agent.label.clone())?;
        }
        for _ in 0..extra {
            world.spawn_random_agent();
        }
        world.install_program(&tree);
        debug!(
            agents = world.agent_count(),
            regions = world.all_regions().len(),
            primitives = tree.primitive_count(),
            "scenario world built"
        );
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmbots_core::{Point, ProgramError};

    const SAMPLE: &str = r#"{
        "config": {"rng_seed": 4},
        "agents": [{"x": 4, "y": 1}, {"x": 1, "y": 4, "label": "LABEL"}],
        "regions": [
            {"label": "home", "shape": {"circle": {"center": {"x": 0, "y": 0}, "radius": 2}}},
            {"label": "dock", "shape": {"rectangle": {"corner": {"x": 5, "y": 5}, "width": 1, "height": 2}}}
        ],
        "program": [
            {"op": "move", "target": {"x": 1, "y": 1}, "speed": 1},
            {"op": "follow", "label": "LABEL", "radius": 3, "speed": 1},
            {"op": "repeat_start", "times": 2},
            {"op": "signal", "label": "X"},
            {"op": "block_end"}
        ]
    }"#;

    #[test]
    fn sample_scenario_builds_a_world() {
        let scenario = Scenario::from_json_str(SAMPLE).expect("scenario");
        assert_eq!(scenario.config.rng_seed, Some(4));
        let world = scenario.build_world().expect("world");
        assert_eq!(world.agent_count(), 2);
        assert_eq!(world.all_regions().len(), 2);
        assert!(world.is_in_region(Point::new(5.5, 7.0), "dock"));
        let labels: Vec<&str> = world.all_agents().map(|(_, a)| a.label()).collect();
        assert_eq!(labels, vec!["", "LABEL"]);
        assert!(world.all_agents().all(|(_, a)| a.program().is_some()));
    }

    #[test]
    fn random_agents_also_run_the_program() {
        let scenario = Scenario::from_json_str(SAMPLE).expect("scenario");
        let world = scenario.build_world_with_random(5).expect("world");
        assert_eq!(world.agent_count(), 7);
        assert!(world.all_agents().all(|(_, a)| a.program().is_some()));
    }

    #[test]
    fn unbalanced_program_is_reported() {
        let json = r#"{"program": [{"op": "forever_start"}, {"op": "stop"}]}"#;
        let scenario = Scenario::from_json_str(json).expect("scenario");
        assert!(matches!(
            scenario.build_world(),
            Err(LoadError::Program(ProgramError::UnbalancedProgram { open_blocks: 1 }))
        ));
    }

    #[test]
    fn invalid_region_is_rejected() {
        let json = r#"{"regions": [{"label": "bad", "shape": {"circle": {"center": {"x": 0, "y": 0}, "radius": -1}}}]}"#;
        let scenario = Scenario::from_json_str(json).expect("scenario");
        assert!(matches!(scenario.build_world(), Err(LoadError::World(_))));
    }

    #[test]
    fn unknown_ops_fail_to_parse() {
        let json = r#"{"program": [{"op": "teleport"}]}"#;
        assert!(matches!(
            Scenario::from_json_str(json),
            Err(LoadError::Json(_))
        ));
    }
}
