//! Congestion store operations: evaporation (component C2) and
//! post-routing deposition (component C6), per spec.md §4.4.

use rayon::prelude::*;

use crate::design_rules::InteractionTables;
use crate::geometry::{Coordinate, ShapeType};
use crate::grid::{Grid, PathId};

/// One "traversal" of a cell is represented internally as this many
/// congestion units, so that `evaporate` can apply an integer percentage
/// without introducing large rounding error for low traversal counts.
pub const ONE_TRAVERSAL: u32 = 100;

/// Congestion contributed by a path's own footprint at its own center
/// cells, discouraging a path from looping back over itself (spec.md
/// §4.4). Expressed as a fraction of `ONE_TRAVERSAL`.
pub const SELF_REPELLENT_FRACTION: f64 = 0.10;

/// Reserved path id: the "universal repellent", seeded once at setup into
/// forbidden/risky cells and exempt from evaporation forever (spec.md §3).
pub fn universal_repellent_id(num_paths: u32, num_pseudo_paths: u32) -> PathId {
    num_paths + num_pseudo_paths
}

/// Evaporates every non-exempt congestion entry in the grid by
/// `rate_percent`, in parallel over disjoint cell chunks, per the
/// concurrency note in spec.md §4.4/§5: each worker mutates only its own
/// chunk, and compaction (which can shrink allocations) stays within that
/// same single pass since `Cell::evaporate` already compacts in place.
pub fn evaporate(grid: &mut Grid, rate_percent: u32, universal_repellent: PathId) {
    let num_threads = rayon::current_num_threads().max(1);
    let total_cells = grid.cells().len();
    let chunk_len = (total_cells / num_threads).max(1);

    grid.cells_par_chunks_mut(chunk_len).for_each(|chunk| {
        for cell in chunk.iter_mut() {
            cell.evaporate(rate_percent, |p| p == universal_repellent);
        }
    });
}

/// A single path's dense (contiguous) centerline, annotated with the
/// shape-type occupying each cell — produced by `contiguous::fill`.
pub struct DenseTrace<'a> {
    pub path: PathId,
    pub subset: u8,
    pub cells: &'a [(Coordinate, ShapeType)],
}

/// Deposits fresh congestion for one routed path: `ONE_TRAVERSAL` at every
/// centerline cell and every cell within the (subset, shape-type)
/// interaction radius of it, plus a small self-repellent addition at the
/// centerline cells themselves (spec.md §4.4). Single-threaded by design
/// (§5): depositing paths one at a time keeps per-cell list growth owned
/// by a single writer.
pub fn deposit(
    grid: &mut Grid,
    trace: &DenseTrace<'_>,
    tables: &InteractionTables,
    dr_set_of: impl Fn(Coordinate) -> u8,
) {
    for &(center, shape) in trace.cells {
        let dr_set = dr_set_of(center);
        grid.cell_mut(center).add_path_center(trace.path, trace.subset, shape);

        let radius = tables
            .cong_radius_between(
                (dr_set, trace.subset, shape),
                (dr_set, trace.subset, shape),
            )
            .unwrap_or(0.0);
        let r = radius.ceil() as i32;

        for dz in -1..=1 {
            for dy in -r..=r {
                for dx in -r..=r {
                    if (dx * dx + dy * dy) as f64 > radius * radius {
                        continue;
                    }
                    let cand = Coordinate::new(
                        (center.x as i32 + dx).max(0) as u16,
                        (center.y as i32 + dy).max(0) as u16,
                        (center.z as i32 + dz).max(0) as u8,
                    );
                    if !grid.in_bounds(cand) {
                        continue;
                    }
                    let amount = if cand == center {
                        ONE_TRAVERSAL + (ONE_TRAVERSAL as f64 * SELF_REPELLENT_FRACTION) as u32
                    } else {
                        ONE_TRAVERSAL
                    };
                    let idx = (cand.x as u32, cand.y as u32, cand.z as u32);
                    let _ = grid
                        .cell_mut(cand)
                        .add_congestion(trace.path, trace.subset, shape, amount, idx);
                }
            }
        }
    }
}

/// Parallel marking of `near_a_net` for every cell within the per-layer
/// `maxInteractionRadiusCells` of any contiguous path's centerline (spec.md
/// §4.7 step 6). One-bit idempotent writes, so races are benign even when
/// sharded across rayon worker threads, matching the concurrency note in
/// spec.md §5.
pub fn mark_near_a_net(
    grid: &mut Grid,
    traces: &[DenseTrace<'_>],
    tables: &InteractionTables,
    dr_set_of: impl Fn(Coordinate) -> u8 + Sync,
) {
    // Compute the set of cells to mark up front (read-only pass over all
    // traces), then apply the idempotent writes; this keeps the mutable
    // borrow of `grid` out of the parallel closure.
    let mut to_mark: Vec<Coordinate> = traces
        .par_iter()
        .flat_map(|trace| {
            trace
                .cells
                .par_iter()
                .flat_map(|&(center, shape)| {
                    let dr_set = dr_set_of(center);
                    let radius = tables
                        .cong_radius_between(
                            (dr_set, trace.subset, shape),
                            (dr_set, trace.subset, shape),
                        )
                        .unwrap_or(0.0)
                        .ceil() as i32;
                    let mut out = Vec::new();
                    for dy in -radius..=radius {
                        for dx in -radius..=radius {
                            out.push(Coordinate::new(
                                (center.x as i32 + dx).max(0) as u16,
                                (center.y as i32 + dy).max(0) as u16,
                                center.z,
                            ));
                        }
                    }
                    out
                })
                .collect::<Vec<_>>()
        })
        .collect();
    to_mark.retain(|c| grid.in_bounds(*c));

    for c in to_mark {
        grid.cell_mut(c).flags.near_a_net = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design_rules::{build_interaction_tables, DesignRuleSet, DesignRuleSubset};
    use crate::geometry::NUM_SHAPE_TYPES;

    fn simple_subset() -> DesignRuleSubset {
        DesignRuleSubset {
            name: "default".into(),
            line_width_cells: 1.0,
            via_up_diameter_cells: 1.0,
            via_down_diameter_cells: 1.0,
            spacing_cells: [[1.0; NUM_SHAPE_TYPES]; NUM_SHAPE_TYPES],
            trace_cost_multiplier: 1.0,
            via_up_cost_multiplier: 1.0,
            via_down_cost_multiplier: 1.0,
            pin_swap_trace_cost_multiplier: 1.0,
            pin_swap_via_up_cost_multiplier: 1.0,
            pin_swap_via_down_cost_multiplier: 1.0,
            diff_pair_pitch_cells: None,
            is_pseudo_net: false,
            allowed_directions: crate::design_rules::DirectionMask::ANY,
        }
    }

    #[test]
    fn deposit_then_full_evaporate_returns_to_pre_deposit_state() {
        let mut grid = Grid::new(10, 10, 1).unwrap();
        let sets = vec![DesignRuleSet {
            name: "set0".into(),
            subsets: vec![simple_subset()],
        }];
        let tables = build_interaction_tables(&sets);
        let cells = vec![(Coordinate::new(5, 5, 0), ShapeType::Trace)];
        let trace = DenseTrace {
            path: 1,
            subset: 0,
            cells: &cells,
        };
        deposit(&mut grid, &trace, &tables, |_| 0);
        assert!(grid.cell(Coordinate::new(5, 5, 0)).num_traversing_paths() > 0);

        evaporate(&mut grid, 100, universal_repellent_id(1, 0));
        for cell in grid.cells() {
            assert_eq!(cell.num_traversing_paths(), 0);
        }
    }

    #[test]
    fn universal_repellent_constant_across_iterations() {
        let mut grid = Grid::new(4, 4, 1).unwrap();
        let repellent = universal_repellent_id(1, 0);
        let idx = (0, 0, 0);
        grid.cell_mut(Coordinate::new(0, 0, 0))
            .add_congestion(repellent, 0, ShapeType::Trace, 12345, idx)
            .unwrap();
        for _ in 0..5 {
            evaporate(&mut grid, 10, repellent);
        }
        assert_eq!(
            grid.cell(Coordinate::new(0, 0, 0))
                .congestion_for(repellent, 0, ShapeType::Trace),
            12345
        );
    }
}
