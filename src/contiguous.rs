//! Contiguous-path fill (spec.md component C5): expands the sparse output
//! of `pathfinder::find_path` into a dense sequence where every adjacent
//! pair differs by at most one cell in each axis.

use crate::error::{Error, Result};
use crate::geometry::{Coordinate, ShapeType};
use crate::grid::PathId;

/// Whether a diagonal move needs its orthogonal intermediate cell filled
/// in: only for thin lines, where adjacent wide shapes wouldn't already
/// overlap (spec.md §4.3).
pub fn diagonal_needs_fill(design_rule_radius_cells: f64) -> bool {
    design_rule_radius_cells < 1.0
}

/// Classifies one step between adjacent sparse-path coordinates into the
/// shape type it paints: a Z-change is a via (up or down depending on
/// direction), anything else is a trace segment.
fn shape_for_step(from: Coordinate, to: Coordinate) -> ShapeType {
    if to.z > from.z {
        ShapeType::ViaUp
    } else if to.z < from.z {
        ShapeType::ViaDown
    } else {
        ShapeType::Trace
    }
}

/// Expands a sparse path (as produced by `pathfinder::find_path`, using
/// moves from the 18-move set) into a contiguous sequence with an
/// associated shape type per cell, validating that every inter-segment
/// jump is a legal single move (spec.md §4.3, §7).
///
/// `exit_if_invalid_jump=false` permits sub-maps where a path may
/// legitimately leave and re-enter the region of interest (spec.md §7);
/// in that mode an invalid jump is simply passed through unfilled rather
/// than treated as a fatal error.
pub fn fill(
    path: PathId,
    sparse: &[Coordinate],
    thin_trace: bool,
    exit_if_invalid_jump: bool,
) -> Result<Vec<(Coordinate, ShapeType)>> {
    if sparse.is_empty() {
        return Ok(Vec::new());
    }
    let mut dense = Vec::with_capacity(sparse.len() * 2);
    dense.push((sparse[0], ShapeType::Trace));

    for window in sparse.windows(2) {
        let (from, to) = (window[0], window[1]);
        let (dx, dy, dz) = from.delta(&to);

        let is_legal_jump = matches!(
            (dx.abs(), dy.abs(), dz.abs()),
            (0, 0, 1) | (1, 0, 0) | (0, 1, 0) | (1, 1, 0) | (2, 1, 0) | (1, 2, 0)
        );
        if !is_legal_jump {
            if exit_if_invalid_jump {
                return Err(Error::InvalidJump { path, from, to });
            } else {
                dense.push((to, shape_for_step(from, to)));
                continue;
            }
        }

        match (dx.abs(), dy.abs(), dz.abs()) {
            (2, 1, 0) => {
                // Knight move (dx=2,dy=1): intermediates are the midpoint
                // on X and the destination's Y (spec.md §4.3).
                let mid_x = ((from.x as i32 + to.x as i32) / 2) as u16;
                dense.push((Coordinate::new(mid_x, from.y, from.z), ShapeType::Trace));
                dense.push((Coordinate::new(mid_x, to.y, from.z), ShapeType::Trace));
            }
            (1, 2, 0) => {
                let mid_y = ((from.y as i32 + to.y as i32) / 2) as u16;
                dense.push((Coordinate::new(from.x, mid_y, from.z), ShapeType::Trace));
                dense.push((Coordinate::new(to.x, mid_y, from.z), ShapeType::Trace));
            }
            (1, 1, 0) => {
                if thin_trace {
                    // Single orthogonal intermediate; either axis works
                    // geometrically, the original prefers holding X fixed.
                    dense.push((Coordinate::new(from.x, to.y, from.z), ShapeType::Trace));
                }
            }
            _ => {}
        }

        dense.push((to, shape_for_step(from, to)));
    }

    Ok(dense)
}

/// Validates that every adjacent pair in an already-dense path differs by
/// at most one cell per axis (used by the round-trip property in spec.md
/// §8: sparse -> contiguous -> recomputed sparse).
pub fn is_contiguous(dense: &[(Coordinate, ShapeType)]) -> bool {
    dense.windows(2).all(|w| {
        let (dx, dy, dz) = w[0].0.delta(&w[1].0);
        dx.abs() <= 1 && dy.abs() <= 1 && dz.abs() <= 1
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_knight_move_with_two_intermediates() {
        let sparse = vec![Coordinate::new(0, 0, 0), Coordinate::new(2, 1, 0)];
        let dense = fill(0, &sparse, false, true).unwrap();
        assert!(is_contiguous(&dense));
        assert_eq!(dense.len(), 4);
    }

    #[test]
    fn thin_diagonal_gets_intermediate_thick_does_not() {
        let sparse = vec![Coordinate::new(0, 0, 0), Coordinate::new(1, 1, 0)];
        let thin = fill(0, &sparse, true, true).unwrap();
        let thick = fill(0, &sparse, false, true).unwrap();
        assert_eq!(thin.len(), 3);
        assert_eq!(thick.len(), 2);
        assert!(is_contiguous(&thin));
        assert!(is_contiguous(&thick));
    }

    #[test]
    fn via_step_preserves_layer_transition() {
        let sparse = vec![Coordinate::new(3, 3, 0), Coordinate::new(3, 3, 1)];
        let dense = fill(0, &sparse, false, true).unwrap();
        assert_eq!(dense, vec![
            (Coordinate::new(3, 3, 0), ShapeType::Trace),
            (Coordinate::new(3, 3, 1), ShapeType::ViaUp),
        ]);
    }

    #[test]
    fn invalid_jump_is_fatal_by_default() {
        let sparse = vec![Coordinate::new(0, 0, 0), Coordinate::new(5, 5, 0)];
        let err = fill(0, &sparse, false, true);
        assert!(err.is_err());
    }

    #[test]
    fn invalid_jump_is_tolerated_for_submaps() {
        let sparse = vec![Coordinate::new(0, 0, 0), Coordinate::new(5, 5, 0)];
        let dense = fill(0, &sparse, false, false).unwrap();
        assert_eq!(dense.len(), 2);
    }
}
