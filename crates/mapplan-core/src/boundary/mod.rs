//! Map boundary polygon: geometry, ring edits and the gesture-level editor.

mod editor;
mod ring;

pub use editor::{BoundaryEditor, EditOutcome, VertexHandle, HANDLE_RADIUS_DIVISOR};
pub use ring::{
    flatten_ring, insert_point_least_distance, remove_point_at_index, set_point_at_index,
};

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spatial reference used for new boundaries (WGS 84).
pub const DEFAULT_SRID: i32 = 4326;

/// Minimum number of distinct vertices a boundary ring may have.
pub const MIN_DISTINCT_VERTICES: usize = 4;

/// Errors raised by boundary edits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundaryError {
    #[error("Map has no boundary")]
    MissingBoundary,
    #[error("Vertex index {index} out of bounds for ring with {len} distinct vertices")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Cannot remove a vertex from a ring with {distinct} distinct vertices")]
    TooFewVertices { distinct: usize },
    #[error("Boundary ring is not closed")]
    NotClosed,
    #[error("Boundary ring has only {distinct} distinct vertices")]
    Degenerate { distinct: usize },
}

/// Which boundary gesture handler is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryEditMode {
    Add,
    Move,
    Remove,
    #[default]
    None,
}

/// Polygon geometry of a map's outline.
///
/// Ring 0 is the boundary ring. Its first and last points are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapGeometry {
    /// Spatial reference identifier.
    pub srid: i32,
    pub rings: Vec<Vec<Point>>,
}

impl MapGeometry {
    /// Build a geometry from a single ring in [`DEFAULT_SRID`].
    pub fn from_ring(ring: Vec<Point>) -> Self {
        Self {
            srid: DEFAULT_SRID,
            rings: vec![ring],
        }
    }

    /// Build a closed rectangular boundary.
    pub fn rectangle(rect: Rect) -> Self {
        Self::from_ring(vec![
            Point::new(rect.x0, rect.y0),
            Point::new(rect.x1, rect.y0),
            Point::new(rect.x1, rect.y1),
            Point::new(rect.x0, rect.y1),
            Point::new(rect.x0, rect.y0),
        ])
    }

    /// The boundary ring (ring 0).
    pub fn outer_ring(&self) -> &[Point] {
        self.rings.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct vertices of the boundary ring (closing point excluded).
    pub fn distinct_vertex_count(&self) -> usize {
        self.outer_ring().len().saturating_sub(1)
    }

    /// Whether the boundary ring is closed.
    pub fn is_closed(&self) -> bool {
        let ring = self.outer_ring();
        match (ring.first(), ring.last()) {
            (Some(first), Some(last)) => ring.len() > 1 && first == last,
            _ => false,
        }
    }

    /// Check ring closure and the minimum vertex count.
    pub fn validate(&self) -> Result<(), BoundaryError> {
        if !self.is_closed() {
            return Err(BoundaryError::NotClosed);
        }
        let distinct = self.distinct_vertex_count();
        if distinct < MIN_DISTINCT_VERTICES {
            return Err(BoundaryError::Degenerate { distinct });
        }
        Ok(())
    }

    /// Bounding box of the boundary ring.
    pub fn bounds(&self) -> Option<Rect> {
        let mut points = self.outer_ring().iter();
        let first = points.next()?;
        Some(points.fold(Rect::from_points(*first, *first), |acc, p| {
            acc.union_pt(*p)
        }))
    }

    /// Copy of this geometry with a replaced boundary ring.
    pub(crate) fn with_outer_ring(&self, ring: Vec<Point>) -> Self {
        let mut rings = self.rings.clone();
        match rings.first_mut() {
            Some(first) => *first = ring,
            None => rings.push(ring),
        }
        Self {
            srid: self.srid,
            rings,
        }
    }
}

#[cfg(test)]
pub(crate) fn square() -> MapGeometry {
    MapGeometry::rectangle(Rect::new(0.0, 0.0, 10.0, 10.0))
}
