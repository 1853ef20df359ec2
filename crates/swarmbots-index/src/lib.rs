//! Spatial indexing abstractions for agent neighborhood queries.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from agent positions.
    fn rebuild(&mut self, positions: &[(f64, f64)]) -> Result<(), IndexError>;

    /// Visit every other agent whose distance to `agent_idx` is at most `radius`.
    ///
    /// The visitor receives the neighbor's dense index and its squared distance.
    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    );
}

type CellKey = (i64, i64);

/// Uniform grid bucketing agents into square cells of `cell_size` world units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing agents.
    pub cell_size: f64,
    #[serde(skip)]
    positions: Vec<(f64, f64)>,
    #[serde(skip)]
    buckets: HashMap<CellKey, Vec<usize>>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            positions: Vec::new(),
            buckets: HashMap::new(),
        }
    }

    /// Number of positions indexed by the last rebuild.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when the last rebuild indexed no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn cell_of(&self, (x, y): (f64, f64)) -> CellKey {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    fn visit_bucket(
        &self,
        members: &[usize],
        agent_idx: usize,
        origin: (f64, f64),
        radius: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    ) {
        for &other in members {
            if other == agent_idx {
                continue;
            }
            let (ox, oy) = self.positions[other];
            let dx = ox - origin.0;
            let dy = oy - origin.1;
            let dist_sq = dx * dx + dy * dy;
            // Compare distances, not squares: squaring the radius can round a
            // boundary point outside.
            if dist_sq.sqrt() <= radius {
                visitor(other, OrderedFloat(dist_sq));
            }
        }
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f64, f64)]) -> Result<(), IndexError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.buckets.clear();
        for (idx, &position) in positions.iter().enumerate() {
            let key = self.cell_of(position);
            self.buckets.entry(key).or_default().push(idx);
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    ) {
        let Some(&origin) = self.positions.get(agent_idx) else {
            return;
        };
        if radius.is_nan() || radius < 0.0 {
            return;
        }

        let span = (radius / self.cell_size).ceil();
        let cells_in_window = (2.0 * span + 1.0) * (2.0 * span + 1.0);
        // Large windows over sparse grids are cheaper as a bucket sweep.
        if !cells_in_window.is_finite() || cells_in_window > self.buckets.len() as f64 {
            for members in self.buckets.values() {
                self.visit_bucket(members, agent_idx, origin, radius, visitor);
            }
            return;
        }

        let span = span as i64;
        let (cx, cy) = self.cell_of(origin);
        for gx in (cx - span)..=(cx + span) {
            for gy in (cy - span)..=(cy + span) {
                if let Some(members) = self.buckets.get(&(gx, gy)) {
                    self.visit_bucket(members, agent_idx, origin, radius, visitor);
                }
            }
        }
    }
}
