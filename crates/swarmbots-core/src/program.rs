//! Immutable command trees shared by every agent running a program.
//!
//! A [`CommandTree`] is an arena of [`Command`] nodes addressed by [`NodeId`].
//! Block nodes own a boxed slice of child ids that is fixed when the block is
//! sealed by the [`ProgramBuilder`](crate::ProgramBuilder); nothing in the tree
//! changes afterwards. Execution progress lives in each agent's
//! [`Interpreter`](crate::Interpreter), never in the tree, which is what lets a
//! single `Arc<CommandTree>` drive any number of agents.

use std::fmt;

use serde::Serialize;

use crate::geometry::Point;

/// Handle of a node inside a [`CommandTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Single-tick actions applied to an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Primitive {
    /// Set speed and face `target`.
    Move { target: Point, speed: f64 },
    /// Face a random point of the box spanned by the corners and take one step.
    RandomMove {
        corner1: Point,
        corner2: Point,
        speed: f64,
    },
    /// Broadcast `label`.
    Signal { label: String },
    /// Stop broadcasting, but only if the current label is `label`.
    Unsignal { label: String },
    /// Steer toward same-label peers within `radius`, otherwise wander.
    Follow {
        label: String,
        radius: f64,
        speed: f64,
    },
    /// Drop speed to zero.
    Stop,
    /// Keep the current course, stepping once per tick for `ticks` ticks.
    Wait { ticks: u32 },
}

/// Fieldless discriminant of [`Primitive`], used in step reports and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Move,
    RandomMove,
    Signal,
    Unsignal,
    Follow,
    Stop,
    Wait,
}

impl PrimitiveKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::RandomMove => "random_move",
            Self::Signal => "signal",
            Self::Unsignal => "unsignal",
            Self::Follow => "follow",
            Self::Stop => "stop",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Primitive {
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Move { .. } => PrimitiveKind::Move,
            Self::RandomMove { .. } => PrimitiveKind::RandomMove,
            Self::Signal { .. } => PrimitiveKind::Signal,
            Self::Unsignal { .. } => PrimitiveKind::Unsignal,
            Self::Follow { .. } => PrimitiveKind::Follow,
            Self::Stop => PrimitiveKind::Stop,
            Self::Wait { .. } => PrimitiveKind::Wait,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { target, speed } => {
                write!(f, "move ({}, {}) speed {speed}", target.x, target.y)
            }
            Self::RandomMove {
                corner1,
                corner2,
                speed,
            } => write!(
                f,
                "random_move ({}, {})..({}, {}) speed {speed}",
                corner1.x, corner1.y, corner2.x, corner2.y
            ),
            Self::Signal { label } => write!(f, "signal {label}"),
            Self::Unsignal { label } => write!(f, "unsignal {label}"),
            Self::Follow {
                label,
                radius,
                speed,
            } => write!(f, "follow {label} radius {radius} speed {speed}"),
            Self::Stop => f.write_str("stop"),
            Self::Wait { ticks } => write!(f, "wait {ticks}"),
        }
    }
}

/// Looping constructs and their completion rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "loop", rename_all = "snake_case")]
pub enum BlockKind {
    /// Completes after `times` full passes over the body.
    Repeat { times: u32 },
    /// Never completes.
    Forever,
    /// Completes once the agent stands inside a region labelled `region`.
    Until { region: String },
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repeat { times } => write!(f, "repeat {times}"),
            Self::Forever => f.write_str("forever"),
            Self::Until { region } => write!(f, "until {region}"),
        }
    }
}

/// Node of a command tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Primitive(Primitive),
    Block {
        kind: BlockKind,
        children: Box<[NodeId]>,
    },
}

/// Write-once program shared read-only between interpreters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandTree {
    nodes: Vec<Command>,
    root: Box<[NodeId]>,
    #[serde(skip)]
    primitive_count: usize,
}

impl Default for CommandTree {
    fn default() -> Self {
        Self::empty()
    }
}

impl CommandTree {
    /// Program with no commands; every step is a no-op.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            root: Box::new([]),
            primitive_count: 0,
        }
    }

    pub(crate) fn from_parts(nodes: Vec<Command>, root: Vec<NodeId>) -> Self {
        let primitive_count = nodes
            .iter()
            .filter(|node| matches!(node, Command::Primitive(_)))
            .count();
        Self {
            nodes,
            root: root.into_boxed_slice(),
            primitive_count,
        }
    }

    /// Top-level sequence, executed once.
    #[must_use]
    pub fn root(&self) -> &[NodeId] {
        &self.root
    }

    /// Node stored at `id`.
    ///
    /// Ids are only minted by the builder of this tree, so every id handed out
    /// by [`CommandTree::root`] or [`CommandTree::children`] resolves.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Command {
        &self.nodes[id.index()]
    }

    /// Fallible lookup for ids of unknown provenance.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Command> {
        self.nodes.get(id.index())
    }

    /// Children of a block node; primitives have none.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            Command::Block { children, .. } => children,
            Command::Primitive(_) => &[],
        }
    }

    /// Total number of nodes, blocks included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of primitive nodes anywhere in the tree.
    #[must_use]
    pub const fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    /// Deepest block nesting level (0 for a flat program).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.root
            .iter()
            .map(|&id| self.depth_of(id))
            .max()
            .unwrap_or(0)
    }

    fn depth_of(&self, id: NodeId) -> usize {
        match self.node(id) {
            Command::Primitive(_) => 0,
            Command::Block { children, .. } => {
                1 + children
                    .iter()
                    .map(|&child| self.depth_of(child))
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    /// Primitives in source order, ignoring block structure.
    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> + '_ {
        let mut pending: Vec<NodeId> = self.root.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            while let Some(id) = pending.pop() {
                match self.node(id) {
                    Command::Primitive(primitive) => return Some(primitive),
                    Command::Block { children, .. } => {
                        pending.extend(children.iter().rev().copied());
                    }
                }
            }
            None
        })
    }

    fn fmt_sequence(
        &self,
        f: &mut fmt::Formatter<'_>,
        ids: &[NodeId],
        indent: usize,
    ) -> fmt::Result {
        for &id in ids {
            match self.node(id) {
                Command::Primitive(primitive) => {
                    writeln!(f, "{:indent$}{primitive}", "", indent = indent * 2)?;
                }
                Command::Block { kind, children } => {
                    writeln!(f, "{:indent$}{kind} {{", "", indent = indent * 2)?;
                    self.fmt_sequence(f, children, indent + 1)?;
                    writeln!(f, "{:indent$}}}", "", indent = indent * 2)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for CommandTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_sequence(f, &self.root, 0)
    }
}
