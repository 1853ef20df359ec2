//! Planar points and headings.

use serde::{Deserialize, Serialize};

use crate::error::SwarmError;

/// 2D position in world units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Self = Self::new(0.0, 0.0);

    /// Construct a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Point displaced by `(dx, dy)`.
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Tuple form consumed by the spatial index.
    #[must_use]
    pub const fn as_tuple(self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Arithmetic mean of `points`, or `None` when empty.
    #[must_use]
    pub fn centroid<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut count = 0usize;
        let mut sum = Self::ORIGIN;
        for point in points {
            sum.x += point.x;
            sum.y += point.y;
            count += 1;
        }
        (count > 0).then(|| Self::new(sum.x / count as f64, sum.y / count as f64))
    }
}

/// Heading expressed as per-axis multipliers, each within `[-1, 1]`.
///
/// Headings built from an angle (see [`Direction::from_angle`] and
/// [`Direction::towards`]) are unit length. [`Direction::new`] accepts any pair of
/// in-range components and does not normalise them.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Direction {
    dx: f64,
    dy: f64,
}

impl Direction {
    /// Heading along the positive x axis.
    pub const EAST: Self = Self { dx: 1.0, dy: 0.0 };

    /// Build a heading from raw components, rejecting anything outside `[-1, 1]`.
    pub fn new(dx: f64, dy: f64) -> Result<Self, SwarmError> {
        Ok(Self {
            dx: check_component("dx", dx)?,
            dy: check_component("dy", dy)?,
        })
    }

    /// Unit heading at `radians` measured counter-clockwise from the x axis.
    #[must_use]
    pub fn from_angle(radians: f64) -> Self {
        let radians = if radians.is_finite() { radians } else { 0.0 };
        Self {
            dx: radians.cos().clamp(-1.0, 1.0),
            dy: radians.sin().clamp(-1.0, 1.0),
        }
    }

    /// Unit heading pointing from `from` toward `to`.
    ///
    /// Coincident points yield [`Direction::EAST`].
    #[must_use]
    pub fn towards(from: Point, to: Point) -> Self {
        Self::from_angle((to.y - from.y).atan2(to.x - from.x))
    }

    #[must_use]
    pub const fn dx(self) -> f64 {
        self.dx
    }

    #[must_use]
    pub const fn dy(self) -> f64 {
        self.dy
    }

    /// Angle of the heading in radians, within `(-π, π]`.
    #[must_use]
    pub fn angle(self) -> f64 {
        self.dy.atan2(self.dx)
    }
}

fn check_component(name: &'static str, value: f64) -> Result<f64, SwarmError> {
    if (-1.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SwarmError::InvalidParameter { name, value })
    }
}
