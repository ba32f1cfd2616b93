//! Design-rule checking (spec.md component C4): shape-aware spacing
//! enforcement between traces, up-vias, and down-vias, and the
//! DRC-pair bitset that deduplicates violation records within one scan
//! (spec.md §4.2, §4.2.1, §4.6).

use crate::collections::AHashMap;
use crate::design_rules::InteractionTables;
use crate::geometry::{Coordinate, ShapeType};
use crate::grid::{Grid, PathId};

pub const MAX_RECORDED_DRCS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct DrcRecord {
    pub at: Coordinate,
    pub path_a: PathId,
    pub shape_a: ShapeType,
    pub path_b: PathId,
    pub shape_b: ShapeType,
    pub min_spacing_cells: f64,
    pub distance_cells: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DrcReport {
    pub records: Vec<DrcRecord>,
    pub per_path_drc_count: AHashMap<PathId, u32>,
    pub per_layer_drc_count: Vec<u32>,
    pub total_drc_cells: u32,
}

/// A packed-byte bitset addressed by the canonical pair index from
/// `pair_index`. Used to deduplicate a DRC violation within one scan so
/// re-encountering the same (cell, foreign path, foreign shape-type)
/// doesn't record or count it twice (spec.md §4.2.1).
pub struct DrcBitset {
    bytes: Vec<u8>,
}

impl DrcBitset {
    pub fn new(num_paths: u32) -> Self {
        let max_pairs = (num_paths as u64 * num_paths.saturating_sub(1) as u64 / 2).max(1);
        let num_bits = max_pairs * 9; // 3x3 shape-type combinations
        let num_bytes = ((num_bits + 7) / 8) as usize;
        Self {
            bytes: vec![0u8; num_bytes.max(1)],
        }
    }

    pub fn test(&self, index: u64) -> bool {
        let byte = index / 8;
        let bit = index % 8;
        self.bytes
            .get(byte as usize)
            .map(|b| (b >> bit) & 1 != 0)
            .unwrap_or(false)
    }

    pub fn set(&mut self, index: u64) {
        let byte = (index / 8) as usize;
        let bit = index % 8;
        if byte >= self.bytes.len() {
            self.bytes.resize(byte + 1, 0);
        }
        self.bytes[byte] |= 1 << bit;
    }
}

/// Canonical, order-independent bit index for an unordered pair of
/// (path, shape-type) entries, following spec.md §4.2.1/§4.6: canonicalize
/// by swapping so `path_a > path_b`, carrying the shapes along with their
/// paths, so `pair_index(a, sa, b, sb) == pair_index(b, sb, a, sa)`.
pub fn pair_index(path_a: PathId, shape_a: ShapeType, path_b: PathId, shape_b: ShapeType) -> u64 {
    debug_assert_ne!(path_a, path_b, "DRC pairs are always between distinct paths");
    let (hi_path, hi_shape, lo_path, lo_shape) = if path_a > path_b {
        (path_a, shape_a, path_b, shape_b)
    } else {
        (path_b, shape_b, path_a, shape_a)
    };
    let pair_idx = hi_path as u64 * (hi_path.saturating_sub(1)) as u64 / 2 + lo_path as u64;
    let shape_idx = hi_shape.index() as u64 * 3 + lo_shape.index() as u64;
    pair_idx * 9 + shape_idx
}

/// Runs the DRC scan over every cell flagged `near_a_net` holding at least
/// one path-center entry, comparing it against every other path-center
/// entry in cells within the precomputed interaction radius (spec.md
/// §4.2). Sets `Cell::flags.drc_flag_trace`/`drc_flag_via_above`, and
/// accumulates up to `MAX_RECORDED_DRCS` detailed records.
pub fn check(
    grid: &mut Grid,
    tables: &InteractionTables,
    dr_set_of: impl Fn(Coordinate) -> u8,
) -> DrcReport {
    let mut report = DrcReport::default();
    report.per_layer_drc_count = vec![0; grid.layers as usize];
    let mut seen = DrcBitset::new(4096);

    // Snapshot the coordinates of every path-center so the scan doesn't
    // need to borrow `grid` mutably and immutably at once.
    let width = grid.width;
    let height = grid.height;
    let layers = grid.layers;
    let mut centers: Vec<(Coordinate, PathId, u8, ShapeType)> = Vec::new();
    for z in 0..layers {
        for y in 0..height {
            for x in 0..width {
                let c = Coordinate::new(x, y, z);
                if !grid.cell(c).flags.near_a_net {
                    continue;
                }
                for entry in grid.cell(c).path_center_entries() {
                    centers.push((c, entry.path, entry.subset, entry.shape));
                }
            }
        }
    }

    for (i, &(c_i, path_i, subset_i, shape_i)) in centers.iter().enumerate() {
        let dr_set_i = dr_set_of(c_i);
        for &(c_j, path_j, subset_j, shape_j) in centers.iter().skip(i + 1) {
            if path_i == path_j {
                continue;
            }
            if c_i.z != c_j.z {
                continue;
            }
            let dr_set_j = dr_set_of(c_j);
            let dx = c_i.x as f64 - c_j.x as f64;
            let dy = c_i.y as f64 - c_j.y as f64;
            let dist_sq = dx * dx + dy * dy;

            let radius = tables
                .drc_radius_between((dr_set_i, subset_i, shape_i), (dr_set_j, subset_j, shape_j))
                .unwrap_or(0.0);
            if dist_sq >= radius * radius {
                continue;
            }

            let key = pair_index(path_i, shape_i, path_j, shape_j);
            if seen.test(key) {
                continue;
            }
            seen.set(key);

            grid.cell_mut(c_i).flags.drc_flag_trace = shape_i == ShapeType::Trace || grid.cell(c_i).flags.drc_flag_trace;
            if shape_i != ShapeType::Trace {
                grid.cell_mut(c_i).flags.drc_flag_via_above = true;
            }

            report.total_drc_cells += 1;
            *report.per_path_drc_count.entry(path_i).or_insert(0) += 1;
            *report.per_path_drc_count.entry(path_j).or_insert(0) += 1;
            if let Some(slot) = report.per_layer_drc_count.get_mut(c_i.z as usize) {
                *slot += 1;
            }

            if report.records.len() < MAX_RECORDED_DRCS {
                report.records.push(DrcRecord {
                    at: c_i,
                    path_a: path_i,
                    shape_a: shape_i,
                    path_b: path_j,
                    shape_b: shape_j,
                    min_spacing_cells: radius,
                    distance_cells: dist_sq.sqrt(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_index_is_symmetric() {
        let a = pair_index(5, ShapeType::Trace, 2, ShapeType::ViaUp);
        let b = pair_index(2, ShapeType::ViaUp, 5, ShapeType::Trace);
        assert_eq!(a, b);
    }

    #[test]
    fn pair_index_distinguishes_different_pairs() {
        let a = pair_index(5, ShapeType::Trace, 2, ShapeType::ViaUp);
        let b = pair_index(5, ShapeType::Trace, 3, ShapeType::ViaUp);
        assert_ne!(a, b);
    }

    #[test]
    fn bitset_round_trips() {
        let mut bs = DrcBitset::new(100);
        let idx = pair_index(10, ShapeType::Trace, 3, ShapeType::Trace);
        assert!(!bs.test(idx));
        bs.set(idx);
        assert!(bs.test(idx));
    }
}
