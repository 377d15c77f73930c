//! Point-level edits of the boundary ring.
//!
//! Every edit takes the current geometry by reference and returns a new one.
//! Indices address distinct vertices: `0..distinct_vertex_count()`. The closing
//! duplicate is never addressed directly; it follows vertex 0.

use super::{BoundaryError, MapGeometry, MIN_DISTINCT_VERTICES};
use kurbo::Point;

/// Insert `point` on the ring edge where it adds the least perimeter.
///
/// For every edge `(p_i, p_{i+1})` the cost is
/// `|p_i - new| + |new - p_{i+1}| - |p_i - p_{i+1}|`. The point is inserted
/// after the cheapest edge; ties go to the lowest edge index.
pub fn insert_point_least_distance(
    geometry: &MapGeometry,
    point: Point,
) -> Result<MapGeometry, BoundaryError> {
    let ring = geometry.outer_ring();
    if ring.len() < 2 {
        return Err(BoundaryError::MissingBoundary);
    }

    let mut best_edge = 0;
    let mut best_cost = f64::INFINITY;
    for (i, edge) in ring.windows(2).enumerate() {
        let cost = edge[0].distance(point) + point.distance(edge[1]) - edge[0].distance(edge[1]);
        if cost < best_cost {
            best_cost = cost;
            best_edge = i;
        }
    }

    let mut new_ring = ring.to_vec();
    new_ring.insert(best_edge + 1, point);
    Ok(geometry.with_outer_ring(new_ring))
}

/// Replace the vertex at `index`, keeping the ring closed.
pub fn set_point_at_index(
    geometry: &MapGeometry,
    point: Point,
    index: usize,
) -> Result<MapGeometry, BoundaryError> {
    let distinct = geometry.distinct_vertex_count();
    if index >= distinct {
        return Err(BoundaryError::IndexOutOfBounds {
            index,
            len: distinct,
        });
    }

    let mut new_ring = geometry.outer_ring().to_vec();
    new_ring[index] = point;
    if index == 0 {
        let last = new_ring.len() - 1;
        new_ring[last] = point;
    }
    Ok(geometry.with_outer_ring(new_ring))
}

/// Remove the vertex at `index`, keeping the ring closed.
///
/// Refused when the ring is already at the minimum vertex count.
pub fn remove_point_at_index(
    geometry: &MapGeometry,
    index: usize,
) -> Result<MapGeometry, BoundaryError> {
    let distinct = geometry.distinct_vertex_count();
    if index >= distinct {
        return Err(BoundaryError::IndexOutOfBounds {
            index,
            len: distinct,
        });
    }
    if distinct <= MIN_DISTINCT_VERTICES {
        return Err(BoundaryError::TooFewVertices { distinct });
    }

    // Work on the open ring, then close it again.
    let mut open: Vec<Point> = geometry.outer_ring()[..distinct].to_vec();
    open.remove(index);
    open.push(open[0]);
    Ok(geometry.with_outer_ring(open))
}

/// Interleave the ring's coordinates as `[x0, y0, x1, y1, ...]`.
pub fn flatten_ring(ring: &[Point]) -> Vec<f64> {
    ring.iter().flat_map(|p| [p.x, p.y]).collect()
}
