//! Assembles command trees from flat program event streams.

use serde::{Deserialize, Serialize};

use crate::error::ProgramError;
use crate::geometry::Point;
use crate::program::{BlockKind, Command, CommandTree, NodeId, Primitive};

/// One declaration emitted by a program parser.
///
/// Block openings (`repeat_start`, `until_start`, `forever_start`) must be
/// balanced by a later `block_end`; everything emitted in between becomes the
/// body of the innermost open block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProgramEvent {
    Move {
        target: Point,
        speed: f64,
    },
    RandomMove {
        corner1: Point,
        corner2: Point,
        speed: f64,
    },
    Signal {
        label: String,
    },
    Unsignal {
        label: String,
    },
    Follow {
        label: String,
        radius: f64,
        speed: f64,
    },
    Stop,
    Wait {
        ticks: i64,
    },
    RepeatStart {
        times: i64,
    },
    UntilStart {
        label: String,
    },
    ForeverStart,
    BlockEnd,
}

impl ProgramEvent {
    /// Whether the event produces a primitive node.
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        !matches!(
            self,
            Self::RepeatStart { .. } | Self::UntilStart { .. } | Self::ForeverStart | Self::BlockEnd
        )
    }
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    children: Vec<NodeId>,
}

/// Stack-based builder turning [`ProgramEvent`]s into a [`CommandTree`].
///
/// The first rejected event poisons the builder: later events and
/// [`ProgramBuilder::end_program`] report the same error, so a stream that
/// failed anywhere never produces a tree.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    nodes: Vec<Command>,
    root: Vec<NodeId>,
    frames: Vec<OpenBlock>,
    error: Option<ProgramError>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a complete event stream.
    pub fn from_events<I>(events: I) -> Result<CommandTree, ProgramError>
    where
        I: IntoIterator<Item = ProgramEvent>,
    {
        let mut builder = Self::new();
        for event in events {
            builder.apply(event)?;
        }
        builder.end_program()
    }

    /// Discard any partial program and start a fresh one.
    pub fn begin_program(&mut self) {
        *self = Self::default();
    }

    /// Finish the program, returning the sealed tree.
    ///
    /// The builder is reset whether or not the program was accepted.
    pub fn end_program(&mut self) -> Result<CommandTree, ProgramError> {
        let builder = std::mem::take(self);
        if let Some(error) = builder.error {
            return Err(error);
        }
        if !builder.frames.is_empty() {
            return Err(ProgramError::UnbalancedProgram {
                open_blocks: builder.frames.len(),
            });
        }
        Ok(CommandTree::from_parts(builder.nodes, builder.root))
    }

    /// Number of blocks opened and not yet closed.
    #[must_use]
    pub fn open_blocks(&self) -> usize {
        self.frames.len()
    }

    /// Feed one event.
    pub fn apply(&mut self, event: ProgramEvent) -> Result<&mut Self, ProgramError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if let Err(error) = self.apply_event(event) {
            self.error = Some(error.clone());
            return Err(error);
        }
        Ok(self)
    }

    pub fn move_to(&mut self, x: f64, y: f64, speed: f64) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::Move {
            target: Point::new(x, y),
            speed,
        })
    }

    pub fn random_move(
        &mut self,
        corner1: Point,
        corner2: Point,
        speed: f64,
    ) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::RandomMove {
            corner1,
            corner2,
            speed,
        })
    }

    pub fn signal(&mut self, label: impl Into<String>) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::Signal {
            label: label.into(),
        })
    }

    pub fn unsignal(&mut self, label: impl Into<String>) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::Unsignal {
            label: label.into(),
        })
    }

    pub fn follow(
        &mut self,
        label: impl Into<String>,
        radius: f64,
        speed: f64,
    ) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::Follow {
            label: label.into(),
            radius,
            speed,
        })
    }

    pub fn stop(&mut self) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::Stop)
    }

    pub fn wait(&mut self, ticks: i64) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::Wait { ticks })
    }

    pub fn repeat_start(&mut self, times: i64) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::RepeatStart { times })
    }

    pub fn until_start(&mut self, label: impl Into<String>) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::UntilStart {
            label: label.into(),
        })
    }

    pub fn forever_start(&mut self) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::ForeverStart)
    }

    pub fn block_end(&mut self) -> Result<&mut Self, ProgramError> {
        self.apply(ProgramEvent::BlockEnd)
    }

    fn apply_event(&mut self, event: ProgramEvent) -> Result<(), ProgramError> {
        let primitive = match event {
            ProgramEvent::Move { target, speed } => Primitive::Move {
                target: check_point("target", target)?,
                speed: check_finite("speed", speed)?,
            },
            ProgramEvent::RandomMove {
                corner1,
                corner2,
                speed,
            } => Primitive::RandomMove {
                corner1: check_point("corner1", corner1)?,
                corner2: check_point("corner2", corner2)?,
                speed: check_finite("speed", speed)?,
            },
            ProgramEvent::Signal { label } => Primitive::Signal { label },
            ProgramEvent::Unsignal { label } => Primitive::Unsignal { label },
            ProgramEvent::Follow {
                label,
                radius,
                speed,
            } => {
                let radius = check_finite("radius", radius)?;
                if radius < 0.0 {
                    return Err(ProgramError::InvalidParameter {
                        name: "radius",
                        value: radius,
                    });
                }
                Primitive::Follow {
                    label,
                    radius,
                    speed: check_finite("speed", speed)?,
                }
            }
            ProgramEvent::Stop => Primitive::Stop,
            ProgramEvent::Wait { ticks } => Primitive::Wait {
                ticks: check_count("ticks", ticks)?,
            },
            ProgramEvent::RepeatStart { times } => {
                let times = check_count("times", times)?;
                self.open(BlockKind::Repeat { times });
                return Ok(());
            }
            ProgramEvent::UntilStart { label } => {
                self.open(BlockKind::Until { region: label });
                return Ok(());
            }
            ProgramEvent::ForeverStart => {
                self.open(BlockKind::Forever);
                return Ok(());
            }
            ProgramEvent::BlockEnd => return self.close(),
        };
        self.emit(Command::Primitive(primitive));
        Ok(())
    }

    fn open(&mut self, kind: BlockKind) {
        self.frames.push(OpenBlock {
            kind,
            children: Vec::new(),
        });
    }

    fn close(&mut self) -> Result<(), ProgramError> {
        let frame = self.frames.pop().ok_or(ProgramError::UnexpectedBlockEnd)?;
        self.emit(Command::Block {
            kind: frame.kind,
            children: frame.children.into_boxed_slice(),
        });
        Ok(())
    }

    fn emit(&mut self, command: Command) {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(command);
        match self.frames.last_mut() {
            Some(frame) => frame.children.push(id),
            None => self.root.push(id),
        }
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<f64, ProgramError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProgramError::InvalidParameter { name, value })
    }
}

fn check_point(name: &'static str, point: Point) -> Result<Point, ProgramError> {
    check_finite(name, point.x)?;
    check_finite(name, point.y)?;
    Ok(point)
}

fn check_count(name: &'static str, value: i64) -> Result<u32, ProgramError> {
    u32::try_from(value).map_err(|_| ProgramError::InvalidParameter {
        name,
        value: value as f64,
    })
}
