//! Agent registry, labelled regions and the per-tick snapshot agents observe.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use swarmbots_index::{NeighborhoodIndex, UniformGridIndex};
use tracing::{debug, trace};

use crate::AgentId;
use crate::agent::Agent;
use crate::config::SwarmConfig;
use crate::error::{SwarmError, ensure_finite};
use crate::geometry::Point;
use crate::interpreter::StepReport;
use crate::program::CommandTree;

/// Read-only view of the world an agent consults while executing a primitive.
pub trait Surroundings {
    /// Agents other than `agent` within `radius` of it, boundary included.
    fn neighbors_within(&self, agent: AgentId, radius: f64) -> BTreeSet<AgentId>;

    /// Agents other than `agent` whose label equals `label`.
    fn agents_with_label(&self, agent: AgentId, label: &str) -> BTreeSet<AgentId>;

    fn position_of(&self, agent: AgentId) -> Option<Point>;

    /// Whether `point` lies inside any region labelled `region`.
    fn is_in_region(&self, point: Point, region: &str) -> bool;
}

/// Region geometry. Boundaries count as inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Circle { center: Point, radius: f64 },
    /// Axis-aligned rectangle extending `width` and `height` from `corner`.
    Rectangle {
        corner: Point,
        width: f64,
        height: f64,
    },
}

impl Shape {
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        match *self {
            Self::Circle { center, radius } => point.distance(center) <= radius,
            Self::Rectangle {
                corner,
                width,
                height,
            } => {
                (corner.x..=corner.x + width).contains(&point.x)
                    && (corner.y..=corner.y + height).contains(&point.y)
            }
        }
    }

    fn validate(&self) -> Result<(), SwarmError> {
        match *self {
            Self::Circle { center, radius } => {
                ensure_finite("center.x", center.x)?;
                ensure_finite("center.y", center.y)?;
                ensure_non_negative("radius", radius)
            }
            Self::Rectangle {
                corner,
                width,
                height,
            } => {
                ensure_finite("corner.x", corner.x)?;
                ensure_finite("corner.y", corner.y)?;
                ensure_non_negative("width", width)?;
                ensure_non_negative("height", height)
            }
        }
    }
}

fn ensure_non_negative(name: &'static str, value: f64) -> Result<(), SwarmError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SwarmError::InvalidParameter { name, value })
    }
}

/// Labelled area used by `until` blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    label: String,
    shape: Shape,
}

impl Region {
    pub fn new(label: impl Into<String>, shape: Shape) -> Result<Self, SwarmError> {
        shape.validate()?;
        Ok(Self {
            label: label.into(),
            shape,
        })
    }

    pub fn circle(label: impl Into<String>, center: Point, radius: f64) -> Result<Self, SwarmError> {
        Self::new(label, Shape::Circle { center, radius })
    }

    pub fn rectangle(
        label: impl Into<String>,
        corner: Point,
        width: f64,
        height: f64,
    ) -> Result<Self, SwarmError> {
        Self::new(
            label,
            Shape::Rectangle {
                corner,
                width,
                height,
            },
        )
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        self.shape.contains(point)
    }
}

fn region_contains(regions: &[Region], point: Point, label: &str) -> bool {
    regions
        .iter()
        .any(|region| region.label == label && region.contains(point))
}

/// Aggregate of every agent step in one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickActivity {
    pub primitives_executed: usize,
    pub blocks_completed: usize,
    pub exhausted_programs: usize,
}

impl TickActivity {
    fn record(&mut self, report: &StepReport) {
        if report.executed.is_some() {
            self.primitives_executed += 1;
        }
        self.blocks_completed += report.blocks_completed as usize;
        if report.exhausted {
            self.exhausted_programs += 1;
        }
    }
}

/// Positions and labels of every agent frozen at the start of a tick.
///
/// All agents stepping in the same tick observe this snapshot, so the order
/// in which they run does not change what they see.
#[derive(Debug)]
pub struct WorldView<'a> {
    ids: Vec<AgentId>,
    positions: Vec<(f64, f64)>,
    labels: Vec<String>,
    slots: SecondaryMap<AgentId, usize>,
    index: UniformGridIndex,
    regions: &'a [Region],
}

impl<'a> WorldView<'a> {
    fn capture(
        agents: &SlotMap<AgentId, Agent>,
        order: &[AgentId],
        regions: &'a [Region],
        cell_size: f64,
    ) -> Result<Self, SwarmError> {
        let mut ids = Vec::with_capacity(order.len());
        let mut positions = Vec::with_capacity(order.len());
        let mut labels = Vec::with_capacity(order.len());
        let mut slots = SecondaryMap::new();
        for &id in order {
            let Some(agent) = agents.get(id) else {
                continue;
            };
            slots.insert(id, ids.len());
            ids.push(id);
            positions.push(agent.position().as_tuple());
            labels.push(agent.label().to_string());
        }
        let mut index = UniformGridIndex::new(cell_size);
        index.rebuild(&positions)?;
        Ok(Self {
            ids,
            positions,
            labels,
            slots,
            index,
            regions,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Label `agent` carried when the snapshot was taken.
    #[must_use]
    pub fn label_of(&self, agent: AgentId) -> Option<&str> {
        self.slots
            .get(agent)
            .map(|&slot| self.labels[slot].as_str())
    }
}

impl Surroundings for WorldView<'_> {
    fn neighbors_within(&self, agent: AgentId, radius: f64) -> BTreeSet<AgentId> {
        let mut found = BTreeSet::new();
        if let Some(&slot) = self.slots.get(agent) {
            self.index
                .neighbors_within(slot, radius, &mut |other, _| {
                    found.insert(self.ids[other]);
                });
        }
        found
    }

    fn agents_with_label(&self, agent: AgentId, label: &str) -> BTreeSet<AgentId> {
        self.ids
            .iter()
            .zip(&self.labels)
            .filter(|&(&id, other)| id != agent && other == label)
            .map(|(&id, _)| id)
            .collect()
    }

    fn position_of(&self, agent: AgentId) -> Option<Point> {
        self.slots.get(agent).map(|&slot| {
            let (x, y) = self.positions[slot];
            Point::new(x, y)
        })
    }

    fn is_in_region(&self, point: Point, region: &str) -> bool {
        region_contains(self.regions, point, region)
    }
}

/// Agents, regions and the shared RNG of one simulation.
#[derive(Debug)]
pub struct World {
    config: SwarmConfig,
    rng: SmallRng,
    agents: SlotMap<AgentId, Agent>,
    order: Vec<AgentId>,
    regions: Vec<Region>,
}

impl World {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: SwarmConfig) -> Result<Self, SwarmError> {
        config.validate()?;
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            rng,
            agents: SlotMap::with_key(),
            order: Vec::new(),
            regions: Vec::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Mutable access to the world's RNG.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Add an agent at `position`. Agents step in insertion order.
    pub fn spawn_agent(&mut self, position: Point) -> Result<AgentId, SwarmError> {
        self.insert(Agent::new(position))
    }

    /// Add an agent already broadcasting `label`.
    pub fn spawn_labelled_agent(
        &mut self,
        position: Point,
        label: impl Into<String>,
    ) -> Result<AgentId, SwarmError> {
        self.insert(Agent::with_label(position, label))
    }

    /// Add an agent at a uniformly random point within `spawn_extent` of the origin.
    pub fn spawn_random_agent(&mut self) -> AgentId {
        let extent = self.config.spawn_extent;
        let position = if extent > 0.0 {
            Point::new(
                self.rng.random_range(-extent..=extent),
                self.rng.random_range(-extent..=extent),
            )
        } else {
            Point::ORIGIN
        };
        let id = self.agents.insert(Agent::new(position));
        self.order.push(id);
        id
    }

    fn insert(&mut self, agent: Agent) -> Result<AgentId, SwarmError> {
        let position = agent.position();
        ensure_finite("x", position.x)?;
        ensure_finite("y", position.y)?;
        let id = self.agents.insert(agent);
        self.order.push(id);
        trace!(agent = ?id, x = position.x, y = position.y, "agent spawned");
        Ok(id)
    }

    pub fn remove_agent(&mut self, id: AgentId) -> Option<Agent> {
        let removed = self.agents.remove(id)?;
        self.order.retain(|&other| other != id);
        Some(removed)
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.order.len()
    }

    /// Agent handles in stepping order.
    #[must_use]
    pub fn agent_ids(&self) -> &[AgentId] {
        &self.order
    }

    /// Agents in stepping order.
    pub fn all_agents(&self) -> impl Iterator<Item = (AgentId, &Agent)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.agents.get(id).map(|agent| (id, agent)))
    }

    pub fn add_region(&mut self, region: Region) {
        debug!(label = region.label(), "region added");
        self.regions.push(region);
    }

    #[must_use]
    pub fn all_regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn regions_labelled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Region> + 'a {
        self.regions.iter().filter(move |region| region.label == label)
    }

    #[must_use]
    pub fn is_in_region(&self, point: Point, label: &str) -> bool {
        region_contains(&self.regions, point, label)
    }

    /// Start `tree` on every agent, replacing whatever each was running.
    pub fn install_program(&mut self, tree: &Arc<CommandTree>) {
        for agent in self.agents.values_mut() {
            agent.bind_program(Arc::clone(tree));
        }
        debug!(
            agents = self.agents.len(),
            nodes = tree.len(),
            "program installed"
        );
    }

    /// Start `tree` on a single agent.
    pub fn bind_program(&mut self, id: AgentId, tree: Arc<CommandTree>) -> Result<(), SwarmError> {
        let agent = self.agents.get_mut(id).ok_or(SwarmError::UnknownAgent)?;
        agent.bind_program(tree);
        Ok(())
    }

    /// Snapshot of current agent positions and labels for neighborhood queries.
    pub fn view(&self) -> Result<WorldView<'_>, SwarmError> {
        WorldView::capture(
            &self.agents,
            &self.order,
            &self.regions,
            self.config.index_cell_size,
        )
    }

    /// Step every agent once against a snapshot taken before the first step.
    ///
    /// Agents step into staged copies that are committed only when the whole
    /// tick succeeds. On error no agent and no RNG state changes.
    pub fn step_agents(&mut self) -> Result<TickActivity, SwarmError> {
        let view = WorldView::capture(
            &self.agents,
            &self.order,
            &self.regions,
            self.config.index_cell_size,
        )?;
        let mut rng = self.rng.clone();
        let mut staged = Vec::with_capacity(self.order.len());
        let mut activity = TickActivity::default();
        for &id in &self.order {
            let Some(agent) = self.agents.get(id) else {
                continue;
            };
            let mut next = agent.clone();
            if let Some(report) = next.step(id, &view, &mut rng)? {
                activity.record(&report);
            }
            staged.push((id, next));
        }
        drop(view);

        for (id, next) in staged {
            if let Some(agent) = self.agents.get_mut(id) {
                *agent = next;
            }
        }
        self.rng = rng;
        Ok(activity)
    }
}
