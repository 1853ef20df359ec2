//! Agent kinematics and the effect of each primitive command.

use std::sync::Arc;

use rand::{Rng, RngCore};
use serde::Serialize;
use tracing::trace;

use crate::AgentId;
use crate::error::{SwarmError, ensure_finite};
use crate::geometry::{Direction, Point};
use crate::interpreter::{Interpreter, StepReport};
use crate::program::{CommandTree, Primitive};
use crate::world::Surroundings;

/// Position, heading, speed and broadcast label of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentBody {
    position: Point,
    direction: Option<Direction>,
    speed: f64,
    label: String,
}

impl AgentBody {
    /// Stationary body at `position` with no heading and an empty label.
    #[must_use]
    pub fn new(position: Point) -> Self {
        Self {
            position,
            direction: None,
            speed: 0.0,
            label: String::new(),
        }
    }

    #[must_use]
    pub const fn position(&self) -> Point {
        self.position
    }

    #[must_use]
    pub const fn direction(&self) -> Option<Direction> {
        self.direction
    }

    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the agent currently broadcasts a non-empty label.
    #[must_use]
    pub fn is_signalling(&self) -> bool {
        !self.label.is_empty()
    }

    pub fn set_position(&mut self, position: Point) -> Result<(), SwarmError> {
        ensure_finite("x", position.x)?;
        ensure_finite("y", position.y)?;
        self.position = position;
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), SwarmError> {
        self.speed = ensure_finite("speed", speed)?;
        Ok(())
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = Some(direction);
    }

    /// Face `target`; a target equal to the current position faces east.
    pub fn head_towards(&mut self, target: Point) {
        self.direction = Some(Direction::towards(self.position, target));
    }

    pub fn stop(&mut self) {
        self.speed = 0.0;
    }

    pub fn signal(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Clear the label if it equals `label`. Returns whether it was cleared.
    pub fn unsignal(&mut self, label: &str) -> bool {
        if self.label == label {
            self.label.clear();
            true
        } else {
            false
        }
    }

    /// Advance one step of `speed` along the current heading.
    ///
    /// Fails without moving if no heading has been set yet.
    pub fn move_step(&mut self) -> Result<(), SwarmError> {
        let direction = self
            .direction
            .ok_or(SwarmError::Precondition("direction must be set before moving"))?;
        self.position = self
            .position
            .offset(direction.dx() * self.speed, direction.dy() * self.speed);
        Ok(())
    }

    /// Apply a single-tick primitive. `Wait` is driven by the interpreter and is a no-op here.
    pub(crate) fn apply(
        &mut self,
        id: AgentId,
        primitive: &Primitive,
        surroundings: &dyn Surroundings,
        rng: &mut dyn RngCore,
    ) -> Result<(), SwarmError> {
        trace!(agent = ?id, command = %primitive, "executing primitive");
        match primitive {
            Primitive::Move { target, speed } => {
                self.speed = *speed;
                self.head_towards(*target);
                Ok(())
            }
            Primitive::RandomMove {
                corner1,
                corner2,
                speed,
            } => {
                let target = Point::new(
                    sample_between(rng, corner1.x, corner2.x),
                    sample_between(rng, corner1.y, corner2.y),
                );
                self.speed = *speed;
                self.head_towards(target);
                self.move_step()
            }
            Primitive::Signal { label } => {
                self.signal(label.as_str());
                Ok(())
            }
            Primitive::Unsignal { label } => {
                self.unsignal(label);
                Ok(())
            }
            Primitive::Follow { radius, speed, .. } => {
                self.follow(id, *radius, *speed, surroundings, rng)
            }
            Primitive::Stop => {
                self.stop();
                Ok(())
            }
            Primitive::Wait { .. } => Ok(()),
        }
    }

    /// Wander within `radius`, then steer toward nearby agents sharing this agent's label.
    ///
    /// Peers are agents within `radius` (inclusive) whose label equals this
    /// agent's current label. With at least one peer the heading points at
    /// their centroid; otherwise the random wander heading stands. Either way
    /// the agent takes one step.
    fn follow(
        &mut self,
        id: AgentId,
        radius: f64,
        speed: f64,
        surroundings: &dyn Surroundings,
        rng: &mut dyn RngCore,
    ) -> Result<(), SwarmError> {
        self.speed = speed;
        let wander = self.position.offset(
            sample_between(rng, -radius, radius),
            sample_between(rng, -radius, radius),
        );
        self.head_towards(wander);

        let neighbors = surroundings.neighbors_within(id, radius);
        if !neighbors.is_empty() {
            let peers = surroundings.agents_with_label(id, &self.label);
            let centre = Point::centroid(
                neighbors
                    .intersection(&peers)
                    .filter_map(|&peer| surroundings.position_of(peer)),
            );
            if let Some(centre) = centre {
                trace!(agent = ?id, x = centre.x, y = centre.y, "following peers");
                self.head_towards(centre);
            }
        }
        self.move_step()
    }
}

/// Inclusive uniform sample between `a` and `b` in either order.
fn sample_between(rng: &mut dyn RngCore, a: f64, b: f64) -> f64 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    if low == high {
        low
    } else {
        rng.random_range(low..=high)
    }
}

/// An agent body plus the interpreter running its program, if any.
#[derive(Debug, Clone)]
pub struct Agent {
    body: AgentBody,
    program: Option<Interpreter>,
}

impl Agent {
    #[must_use]
    pub fn new(position: Point) -> Self {
        Self {
            body: AgentBody::new(position),
            program: None,
        }
    }

    #[must_use]
    pub fn with_label(position: Point, label: impl Into<String>) -> Self {
        let mut agent = Self::new(position);
        agent.body.signal(label);
        agent
    }

    #[must_use]
    pub const fn body(&self) -> &AgentBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut AgentBody {
        &mut self.body
    }

    #[must_use]
    pub const fn position(&self) -> Point {
        self.body.position
    }

    #[must_use]
    pub const fn direction(&self) -> Option<Direction> {
        self.body.direction
    }

    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.body.speed
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.body.label
    }

    #[must_use]
    pub const fn program(&self) -> Option<&Interpreter> {
        self.program.as_ref()
    }

    /// Start `tree` from its first command, replacing any running program.
    pub fn bind_program(&mut self, tree: Arc<CommandTree>) {
        self.program = Some(Interpreter::new(tree));
    }

    pub fn unbind_program(&mut self) -> Option<Interpreter> {
        self.program.take()
    }

    /// Run one interpreter step. Agents without a program do nothing.
    pub fn step(
        &mut self,
        id: AgentId,
        surroundings: &dyn Surroundings,
        rng: &mut dyn RngCore,
    ) -> Result<Option<StepReport>, SwarmError> {
        match self.program.as_mut() {
            Some(interpreter) => interpreter
                .step(id, &mut self.body, surroundings, rng)
                .map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::{SeedableRng, rngs::SmallRng};
    use slotmap::SlotMap;

    use super::*;

    const EPS: f64 = 1e-9;

    /// Fixed neighborhood answering from explicit sets.
    #[derive(Default)]
    struct Fixed {
        neighbors: BTreeSet<AgentId>,
        peers: BTreeSet<AgentId>,
        positions: Vec<(AgentId, Point)>,
    }

    impl Surroundings for Fixed {
        fn neighbors_within(&self, _agent: AgentId, _radius: f64) -> BTreeSet<AgentId> {
            self.neighbors.clone()
        }

        fn agents_with_label(&self, _agent: AgentId, _label: &str) -> BTreeSet<AgentId> {
            self.peers.clone()
        }

        fn position_of(&self, agent: AgentId) -> Option<Point> {
            self.positions
                .iter()
                .find(|(id, _)| *id == agent)
                .map(|(_, point)| *point)
        }

        fn is_in_region(&self, _point: Point, _region: &str) -> bool {
            false
        }
    }

    fn ids(count: usize) -> Vec<AgentId> {
        let mut map: SlotMap<AgentId, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn move_step_requires_heading() {
        let mut body = AgentBody::new(Point::new(1.0, 1.0));
        assert!(matches!(body.move_step(), Err(SwarmError::Precondition(_))));
        assert_eq!(body.position(), Point::new(1.0, 1.0));
    }

    #[test]
    fn move_step_uses_heading_and_speed() {
        let mut body = AgentBody::new(Point::new(1.0, 1.0));
        body.set_speed(5.0).expect("speed");
        body.head_towards(Point::new(4.0, 5.0));
        body.move_step().expect("step");
        assert!((body.position().x - 4.0).abs() < EPS);
        assert!((body.position().y - 5.0).abs() < EPS);
    }

    #[test]
    fn unsignal_only_clears_matching_label() {
        let mut body = AgentBody::new(Point::ORIGIN);
        body.signal("A");
        assert!(!body.unsignal("B"));
        assert_eq!(body.label(), "A");
        assert!(body.unsignal("A"));
        assert!(!body.is_signalling());
    }

    #[test]
    fn non_finite_speed_is_rejected() {
        let mut body = AgentBody::new(Point::ORIGIN);
        assert!(body.set_speed(f64::INFINITY).is_err());
        assert_eq!(body.speed(), 0.0);
    }

    #[test]
    fn move_primitive_turns_without_displacing() {
        let id = ids(1)[0];
        let mut rng = SmallRng::seed_from_u64(1);
        let mut body = AgentBody::new(Point::ORIGIN);
        let primitive = Primitive::Move {
            target: Point::new(0.0, 10.0),
            speed: 2.0,
        };
        body.apply(id, &primitive, &Fixed::default(), &mut rng)
            .expect("move");
        assert_eq!(body.position(), Point::ORIGIN);
        assert_eq!(body.speed(), 2.0);
        let heading = body.direction().expect("heading");
        assert!((heading.dy() - 1.0).abs() < EPS);
    }

    #[test]
    fn random_move_lands_inside_box() {
        let id = ids(1)[0];
        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..50 {
            let mut body = AgentBody::new(Point::ORIGIN);
            let primitive = Primitive::RandomMove {
                corner1: Point::new(10.0, 10.0),
                corner2: Point::new(20.0, 20.0),
                speed: 1.0,
            };
            body.apply(id, &primitive, &Fixed::default(), &mut rng)
                .expect("random move");
            let heading = body.direction().expect("heading");
            assert!(heading.dx() > 0.0 && heading.dy() > 0.0);
            assert!((body.position().distance(Point::ORIGIN) - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn follow_heads_to_single_peer() {
        let agents = ids(2);
        let (me, peer) = (agents[0], agents[1]);
        let surroundings = Fixed {
            neighbors: BTreeSet::from([peer]),
            peers: BTreeSet::from([peer]),
            positions: vec![(me, Point::new(2.0, 2.0)), (peer, Point::new(2.0, 3.0))],
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let mut body = AgentBody::new(Point::new(2.0, 2.0));
        body.signal("T");
        let primitive = Primitive::Follow {
            label: "T".to_string(),
            radius: 2.0,
            speed: 0.5,
        };
        body.apply(me, &primitive, &surroundings, &mut rng)
            .expect("follow");
        let heading = body.direction().expect("heading");
        assert!(heading.dx().abs() < EPS);
        assert!((heading.dy() - 1.0).abs() < EPS);
        assert!((body.position().y - 2.5).abs() < EPS);
    }

    #[test]
    fn follow_without_peers_wanders_one_step() {
        let agents = ids(2);
        let (me, stranger) = (agents[0], agents[1]);
        let surroundings = Fixed {
            neighbors: BTreeSet::from([stranger]),
            peers: BTreeSet::new(),
            positions: vec![(stranger, Point::new(1.0, 0.0))],
        };
        let mut rng = SmallRng::seed_from_u64(11);
        let mut body = AgentBody::new(Point::ORIGIN);
        let primitive = Primitive::Follow {
            label: String::new(),
            radius: 3.0,
            speed: 1.0,
        };
        body.apply(me, &primitive, &surroundings, &mut rng)
            .expect("follow");
        assert!(body.direction().is_some());
        assert!((body.position().distance(Point::ORIGIN) - 1.0).abs() < EPS);
    }
}
