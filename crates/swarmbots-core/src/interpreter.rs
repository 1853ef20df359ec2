//! Per-agent execution cursor over a shared [`CommandTree`].
//!
//! Each tick an interpreter executes at most one primitive. Before descending it
//! walks the chain of active blocks from the outermost inward and closes the
//! first one whose completion rule holds, along with everything nested inside
//! it. It then follows the cursor down into the next primitive, entering and
//! closing blocks on the way.

use std::sync::Arc;

use rand::RngCore;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::AgentId;
use crate::agent::AgentBody;
use crate::error::SwarmError;
use crate::program::{BlockKind, Command, CommandTree, NodeId, Primitive, PrimitiveKind};
use crate::world::Surroundings;

/// Cursor into one active block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    node: NodeId,
    index: usize,
    passes: u32,
    /// A primitive ran during the current pass.
    ran: bool,
}

/// Whether any block finished during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The cursor is still inside the same blocks it entered.
    Suspended,
    /// At least one block met its completion rule this step.
    BlockCompleted,
}

/// What a single [`Interpreter::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub outcome: StepOutcome,
    /// Primitive executed this step, or `None` for an idle step.
    pub executed: Option<PrimitiveKind>,
    pub blocks_completed: u32,
    /// The top-level sequence has run to its end.
    pub exhausted: bool,
}

/// Execution state of one agent's program.
#[derive(Debug, Clone)]
pub struct Interpreter {
    tree: Arc<CommandTree>,
    root_index: usize,
    frames: SmallVec<[Frame; 8]>,
    wait_remaining: Option<u32>,
}

impl Interpreter {
    #[must_use]
    pub fn new(tree: Arc<CommandTree>) -> Self {
        Self {
            tree,
            root_index: 0,
            frames: SmallVec::new(),
            wait_remaining: None,
        }
    }

    #[must_use]
    pub const fn tree(&self) -> &Arc<CommandTree> {
        &self.tree
    }

    /// Number of blocks the cursor is currently inside.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Blocks the cursor is inside, outermost first.
    pub fn active_blocks(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frames.iter().map(|frame| frame.node)
    }

    /// Completed passes of the innermost active block.
    #[must_use]
    pub fn current_passes(&self) -> Option<u32> {
        self.frames.last().map(|frame| frame.passes)
    }

    /// Ticks left on an in-progress `wait`.
    #[must_use]
    pub const fn wait_remaining(&self) -> Option<u32> {
        self.wait_remaining
    }

    /// Whether the top-level sequence has nothing left to run.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.frames.is_empty() && self.root_index >= self.tree.root().len()
    }

    /// Rewind to the first command.
    pub fn reset(&mut self) {
        self.root_index = 0;
        self.frames.clear();
        self.wait_remaining = None;
    }

    /// Advance the program by one tick on behalf of agent `id`.
    ///
    /// Executes at most one primitive. A `repeat` pass that runs no primitive
    /// finishes the whole repeat at once, so finite block closing always
    /// cascades within the step. Only `forever` and `until` loops without a
    /// runnable primitive hit the iteration budget and idle for the tick.
    pub fn step(
        &mut self,
        id: AgentId,
        body: &mut AgentBody,
        surroundings: &dyn Surroundings,
        rng: &mut dyn RngCore,
    ) -> Result<StepReport, SwarmError> {
        let tree = Arc::clone(&self.tree);
        let mut blocks_completed = 0u32;

        let mut depth = 0;
        while depth < self.frames.len() {
            if self.frame_completed(&tree, depth, body, surroundings) {
                self.complete_frame(&tree, id, depth, &mut blocks_completed);
                // The parent advanced and may itself be done now.
                depth = depth.saturating_sub(1);
            } else {
                depth += 1;
            }
        }

        let mut executed = None;
        // A quiet pass re-enters its whole subtree once per enclosing repeat.
        let budget = 4 * (tree.len() + 1) * (tree.depth() + 1);
        for _ in 0..budget {
            if let Some(top) = self.frames.len().checked_sub(1) {
                if self.frame_completed(&tree, top, body, surroundings) {
                    self.complete_frame(&tree, id, top, &mut blocks_completed);
                    continue;
                }
            }
            let Some(node) = self.cursor(&tree) else {
                break;
            };
            match tree.node(node) {
                Command::Block { kind, .. } => {
                    trace!(agent = ?id, block = %kind, "entering block");
                    self.frames.push(Frame {
                        node,
                        index: 0,
                        passes: 0,
                        ran: false,
                    });
                }
                Command::Primitive(primitive) => {
                    for frame in &mut self.frames {
                        frame.ran = true;
                    }
                    if self.execute(id, primitive, body, surroundings, rng)? {
                        self.advance(&tree);
                    }
                    executed = Some(primitive.kind());
                    break;
                }
            }
        }

        Ok(StepReport {
            outcome: if blocks_completed > 0 {
                StepOutcome::BlockCompleted
            } else {
                StepOutcome::Suspended
            },
            executed,
            blocks_completed,
            exhausted: self.is_exhausted(),
        })
    }

    /// Node under the cursor, or `None` past the end of the current sequence.
    fn cursor(&self, tree: &CommandTree) -> Option<NodeId> {
        match self.frames.last() {
            Some(frame) => tree.children(frame.node).get(frame.index).copied(),
            None => tree.root().get(self.root_index).copied(),
        }
    }

    fn frame_completed(
        &self,
        tree: &CommandTree,
        depth: usize,
        body: &AgentBody,
        surroundings: &dyn Surroundings,
    ) -> bool {
        let frame = self.frames[depth];
        match tree.node(frame.node) {
            Command::Block {
                kind: BlockKind::Repeat { times },
                children,
            } => children.is_empty() || frame.passes >= *times,
            Command::Block {
                kind: BlockKind::Forever,
                ..
            } => false,
            Command::Block {
                kind: BlockKind::Until { region },
                ..
            } => surroundings.is_in_region(body.position(), region),
            Command::Primitive(_) => false,
        }
    }

    /// Close the block at `depth`, abandoning everything nested inside it.
    fn complete_frame(
        &mut self,
        tree: &CommandTree,
        id: AgentId,
        depth: usize,
        blocks_completed: &mut u32,
    ) {
        if let Command::Block { kind, .. } = tree.node(self.frames[depth].node) {
            debug!(agent = ?id, block = %kind, passes = self.frames[depth].passes, "block completed");
        }
        self.frames.truncate(depth);
        self.wait_remaining = None;
        *blocks_completed += 1;
        self.advance(tree);
    }

    /// Move past the current command. Blocks wrap to their first child and
    /// count a pass; the top-level sequence does not wrap.
    ///
    /// A pass that ran no primitive left the agent unchanged, so every later
    /// pass would be empty too and a `repeat` skips straight to its last pass.
    fn advance(&mut self, tree: &CommandTree) {
        let Some(frame) = self.frames.last_mut() else {
            self.root_index += 1;
            return;
        };
        frame.index += 1;
        if frame.index < tree.children(frame.node).len() {
            return;
        }
        frame.index = 0;
        frame.passes = match tree.node(frame.node) {
            Command::Block {
                kind: BlockKind::Repeat { times },
                ..
            } if !frame.ran => frame.passes.max(*times),
            _ => frame.passes.saturating_add(1),
        };
        frame.ran = false;
    }

    /// Run `primitive`, returning whether the cursor should move past it.
    fn execute(
        &mut self,
        id: AgentId,
        primitive: &Primitive,
        body: &mut AgentBody,
        surroundings: &dyn Surroundings,
        rng: &mut dyn RngCore,
    ) -> Result<bool, SwarmError> {
        let Primitive::Wait { ticks } = primitive else {
            body.apply(id, primitive, surroundings, rng)?;
            return Ok(true);
        };
        let remaining = self.wait_remaining.unwrap_or(*ticks);
        if remaining == 0 {
            self.wait_remaining = None;
            return Ok(true);
        }
        body.move_step()?;
        let remaining = remaining - 1;
        trace!(agent = ?id, remaining, "waiting");
        if remaining == 0 {
            self.wait_remaining = None;
            Ok(true)
        } else {
            self.wait_remaining = Some(remaining);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::{SeedableRng, rngs::SmallRng};
    use slotmap::SlotMap;

    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::geometry::Point;

    /// Empty world with a single circular region named `home`.
    struct Home {
        centre: Point,
        radius: f64,
    }

    impl Surroundings for Home {
        fn neighbors_within(&self, _agent: AgentId, _radius: f64) -> BTreeSet<AgentId> {
            BTreeSet::new()
        }

        fn agents_with_label(&self, _agent: AgentId, _label: &str) -> BTreeSet<AgentId> {
            BTreeSet::new()
        }

        fn position_of(&self, _agent: AgentId) -> Option<Point> {
            None
        }

        fn is_in_region(&self, point: Point, region: &str) -> bool {
            region == "home" && point.distance(self.centre) <= self.radius
        }
    }

    const NOWHERE: Home = Home {
        centre: Point::new(1.0e9, 1.0e9),
        radius: 0.0,
    };

    struct Harness {
        id: AgentId,
        body: AgentBody,
        interpreter: Interpreter,
        rng: SmallRng,
    }

    impl Harness {
        fn new(build: impl FnOnce(&mut ProgramBuilder)) -> Self {
            let mut builder = ProgramBuilder::new();
            build(&mut builder);
            let tree = builder.end_program().expect("valid program");
            let mut ids: SlotMap<AgentId, ()> = SlotMap::with_key();
            Self {
                id: ids.insert(()),
                body: AgentBody::new(Point::ORIGIN),
                interpreter: Interpreter::new(Arc::new(tree)),
                rng: SmallRng::seed_from_u64(5),
            }
        }

        fn step_in(&mut self, surroundings: &dyn Surroundings) -> StepReport {
            self.interpreter
                .step(self.id, &mut self.body, surroundings, &mut self.rng)
                .expect("step")
        }

        fn step(&mut self) -> StepReport {
            self.step_in(&NOWHERE)
        }
    }

    #[test]
    fn repeat_runs_body_in_order_then_completes() {
        let mut harness = Harness::new(|b| {
            b.repeat_start(3)
                .and_then(|b| b.signal("A"))
                .and_then(|b| b.signal("B"))
                .and_then(|b| b.stop())
                .and_then(|b| b.block_end())
                .expect("events");
        });
        let mut kinds = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..9 {
            let report = harness.step();
            kinds.push(report.executed.expect("primitive"));
            labels.push(harness.body.label().to_string());
        }
        let expected_kinds = [PrimitiveKind::Signal, PrimitiveKind::Signal, PrimitiveKind::Stop];
        assert!(kinds.chunks(3).all(|chunk| chunk == expected_kinds));
        assert_eq!(&labels[..3], ["A", "B", "B"]);
        assert!(!harness.interpreter.is_exhausted());

        let last = harness.step();
        assert_eq!(last.executed, None);
        assert_eq!(last.outcome, StepOutcome::BlockCompleted);
        assert_eq!(last.blocks_completed, 1);
        assert!(last.exhausted);
    }

    #[test]
    fn forever_never_completes() {
        let mut harness = Harness::new(|b| {
            b.forever_start()
                .and_then(|b| b.signal("X"))
                .and_then(|b| b.unsignal("X"))
                .and_then(|b| b.block_end())
                .expect("events");
        });
        for _ in 0..1_000 {
            let report = harness.step();
            assert_eq!(report.outcome, StepOutcome::Suspended);
            assert!(report.executed.is_some());
            assert!(!report.exhausted);
        }
        assert_eq!(harness.interpreter.current_passes(), Some(500));
    }

    #[test]
    fn top_level_sequence_does_not_restart() {
        let mut harness = Harness::new(|b| {
            b.signal("once").expect("events");
        });
        assert_eq!(harness.step().executed, Some(PrimitiveKind::Signal));
        harness.body.signal("");
        for _ in 0..3 {
            let report = harness.step();
            assert_eq!(report.executed, None);
            assert!(report.exhausted);
        }
        assert_eq!(harness.body.label(), "");
    }

    #[test]
    fn nested_completion_cascades_in_one_step() {
        let mut harness = Harness::new(|b| {
            b.repeat_start(1)
                .and_then(|b| b.repeat_start(1))
                .and_then(|b| b.signal("inner"))
                .and_then(|b| b.block_end())
                .and_then(|b| b.block_end())
                .and_then(|b| b.signal("after"))
                .expect("events");
        });
        let first = harness.step();
        assert_eq!(first.executed, Some(PrimitiveKind::Signal));
        assert_eq!(harness.interpreter.depth(), 2);

        let second = harness.step();
        assert_eq!(second.blocks_completed, 2);
        assert_eq!(harness.body.label(), "after");
        assert!(second.exhausted);
    }

    #[test]
    fn repeat_zero_is_skipped_without_consuming_a_tick() {
        let mut harness = Harness::new(|b| {
            b.repeat_start(0)
                .and_then(|b| b.signal("skipped"))
                .and_then(|b| b.block_end())
                .and_then(|b| b.signal("ran"))
                .expect("events");
        });
        let report = harness.step();
        assert_eq!(report.executed, Some(PrimitiveKind::Signal));
        assert_eq!(report.blocks_completed, 1);
        assert_eq!(harness.body.label(), "ran");
    }

    #[test]
    fn primitive_free_loop_idles_instead_of_spinning() {
        let mut harness = Harness::new(|b| {
            b.forever_start()
                .and_then(|b| b.repeat_start(0))
                .and_then(|b| b.stop())
                .and_then(|b| b.block_end())
                .and_then(|b| b.block_end())
                .expect("events");
        });
        for _ in 0..5 {
            let report = harness.step();
            assert_eq!(report.executed, None);
            assert!(!report.exhausted);
        }

        let mut empty_forever = Harness::new(|b| {
            b.forever_start()
                .and_then(|b| b.block_end())
                .expect("events");
        });
        let report = empty_forever.step();
        assert_eq!(report.executed, None);
        assert_eq!(report.blocks_completed, 0);
    }

    #[test]
    fn empty_repeat_passes_finish_within_one_step() {
        let mut harness = Harness::new(|b| {
            b.repeat_start(1_000)
                .and_then(|b| b.repeat_start(0))
                .and_then(|b| b.block_end())
                .and_then(|b| b.block_end())
                .and_then(|b| b.signal("X"))
                .expect("events");
        });
        let report = harness.step();
        assert_eq!(report.executed, Some(PrimitiveKind::Signal));
        assert_eq!(report.blocks_completed, 2);
        assert_eq!(harness.body.label(), "X");
        assert!(report.exhausted);
    }

    #[test]
    fn deeply_nested_quiet_repeats_close_in_one_step() {
        let mut harness = Harness::new(|b| {
            for _ in 0..12 {
                b.repeat_start(1_000_000).expect("open");
            }
            b.repeat_start(0).expect("innermost");
            for _ in 0..13 {
                b.block_end().expect("close");
            }
            b.signal("out").expect("signal");
        });
        let report = harness.step();
        assert_eq!(report.executed, Some(PrimitiveKind::Signal));
        assert_eq!(harness.body.label(), "out");
    }

    #[test]
    fn repeat_finishes_once_its_body_goes_quiet() {
        // Once the agent is home the inner until closes immediately, so the
        // remaining outer passes run nothing and finish together.
        let home = Home {
            centre: Point::new(2.0, 0.0),
            radius: 0.0,
        };
        let mut harness = Harness::new(|b| {
            b.move_to(10.0, 0.0, 1.0)
                .and_then(|b| b.repeat_start(50))
                .and_then(|b| b.until_start("home"))
                .and_then(|b| b.wait(1))
                .and_then(|b| b.block_end())
                .and_then(|b| b.block_end())
                .and_then(|b| b.signal("home"))
                .expect("events");
        });
        harness.step_in(&home);
        harness.step_in(&home);
        harness.step_in(&home);
        assert_eq!(harness.body.label(), "");
        assert_eq!(harness.body.position(), Point::new(2.0, 0.0));
        let report = harness.step_in(&home);
        assert_eq!(report.executed, Some(PrimitiveKind::Signal));
        assert_eq!(harness.body.label(), "home");
    }

    #[test]
    fn repeat_counter_resets_on_reentry() {
        let mut harness = Harness::new(|b| {
            b.forever_start()
                .and_then(|b| b.repeat_start(2))
                .and_then(|b| b.signal("A"))
                .and_then(|b| b.block_end())
                .and_then(|b| b.signal("B"))
                .and_then(|b| b.block_end())
                .expect("events");
        });
        let labels: Vec<String> = (0..6)
            .map(|_| {
                harness.step();
                harness.body.label().to_string()
            })
            .collect();
        assert_eq!(labels, ["A", "A", "B", "A", "A", "B"]);
    }

    #[test]
    fn wait_holds_the_cursor_and_keeps_moving() {
        let mut harness = Harness::new(|b| {
            b.move_to(10.0, 0.0, 1.0)
                .and_then(|b| b.wait(3))
                .and_then(|b| b.signal("done"))
                .expect("events");
        });
        assert_eq!(harness.step().executed, Some(PrimitiveKind::Move));
        for expected_x in [1.0, 2.0, 3.0] {
            assert_eq!(harness.step().executed, Some(PrimitiveKind::Wait));
            assert!((harness.body.position().x - expected_x).abs() < 1e-9);
        }
        assert_eq!(harness.interpreter.wait_remaining(), None);
        harness.step();
        assert_eq!(harness.body.label(), "done");
    }

    #[test]
    fn wait_zero_consumes_one_tick_without_moving() {
        let mut harness = Harness::new(|b| {
            b.wait(0).and_then(|b| b.signal("next")).expect("events");
        });
        assert_eq!(harness.step().executed, Some(PrimitiveKind::Wait));
        assert_eq!(harness.body.position(), Point::ORIGIN);
        assert_eq!(harness.body.label(), "");
        harness.step();
        assert_eq!(harness.body.label(), "next");
    }

    #[test]
    fn wait_without_heading_fails() {
        let mut harness = Harness::new(|b| {
            b.wait(2).expect("events");
        });
        let result = harness
            .interpreter
            .step(harness.id, &mut harness.body, &NOWHERE, &mut harness.rng);
        assert!(matches!(result, Err(SwarmError::Precondition(_))));
    }

    #[test]
    fn until_exits_once_inside_region() {
        let home = Home {
            centre: Point::new(3.0, 0.0),
            radius: 0.5,
        };
        let mut harness = Harness::new(|b| {
            b.move_to(10.0, 0.0, 1.0)
                .and_then(|b| b.until_start("home"))
                .and_then(|b| b.wait(1))
                .and_then(|b| b.block_end())
                .and_then(|b| b.signal("arrived"))
                .expect("events");
        });
        for _ in 0..4 {
            harness.step_in(&home);
            assert_eq!(harness.body.label(), "");
        }
        let report = harness.step_in(&home);
        assert_eq!(report.outcome, StepOutcome::BlockCompleted);
        assert_eq!(harness.body.label(), "arrived");
        assert!((harness.body.position().x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_program_is_exhausted_from_the_start() {
        let mut harness = Harness::new(|_| {});
        assert!(harness.interpreter.is_exhausted());
        let report = harness.step();
        assert_eq!(report.executed, None);
        assert!(report.exhausted);
    }

    #[test]
    fn reset_rewinds_to_first_command() {
        let mut harness = Harness::new(|b| {
            b.signal("first")
                .and_then(|b| b.signal("second"))
                .expect("events");
        });
        harness.step();
        harness.step();
        assert!(harness.interpreter.is_exhausted());
        harness.interpreter.reset();
        harness.step();
        assert_eq!(harness.body.label(), "first");
    }
}
