//! The static + dynamic 3-D cell grid (spec.md component C1) and the
//! congestion-entry/path-center data each cell carries (component C3 of
//! §3's data model).
//!
//! Static fields are built once from user input and never change after
//! `Grid::new`. Dynamic congestion is mutated only by `congestion::deposit`
//! (single-threaded, after routing) and `congestion::evaporate` (parallel
//! decrement + single-threaded compaction) — never during `pathfinder`,
//! per the shared-resource policy in spec.md §5.

use serde::{Deserialize, Serialize};

use crate::collections::InlineVec;
use crate::design_rules::DirectionMask;
use crate::error::{Error, Result};
use crate::geometry::{Coordinate, ShapeType, MAX_Z_LAYERS, NUM_SHAPE_TYPES};

pub type PathId = u32;
pub type SwapZoneId = u8; // 0 = none, else 1..=255

/// Maximum number of distinct (path, subset, shape-type) entries a single
/// cell may carry, bounded by the 12-bit field in the original format
/// (spec.md §3, §7).
pub const MAX_TRAVERSING_PATHS: u32 = 4095;

/// One (path, subset, shape-type) -> traversal-count entry in a cell's
/// congestion list. `traversals` is stored ×100 (one "traversal" = 100,
/// `congestion::ONE_TRAVERSAL`) so evaporation can apply a percentage
/// without large rounding error, and capped at the 24-bit saturation value
/// from spec.md §6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongestionEntry {
    pub path: PathId,
    pub subset: u8,
    pub shape: ShapeType,
    pub traversals_x100: u32,
}

pub const MAX_CONGESTION_TRAVERSALS_X100: u32 = 16_777_215; // 2^24 - 1

impl CongestionEntry {
    fn key(&self) -> (PathId, u8, ShapeType) {
        (self.path, self.subset, self.shape)
    }
}

/// One (path, shape-type) flag recording that a path's *centerline* (as
/// opposed to its congestion footprint) passes through this cell. Used by
/// the DRC scan and by contiguous-fill bookkeeping. Carries `subset` too,
/// since the DRC scan's interaction-radius lookup is keyed by
/// (DR-set, subset, shape-type), not just shape-type (spec.md §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCenterEntry {
    pub path: PathId,
    pub subset: u8,
    pub shape: ShapeType,
}

/// Transient, per-iteration flags cleared at the start of every iteration
/// (spec.md §4.7 step 2, resolving open question 9b: cleared explicitly,
/// not as a side effect of rendering).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientFlags {
    pub explored: bool,
    pub near_a_net: bool,
    pub drc_flag_trace: bool,
    pub drc_flag_via_above: bool,
}

/// One (X,Y,Z) cell. Static fields are set once at grid construction;
/// `congestion`/`path_centers` are the only fields mutated during routing,
/// and only outside the `findPath` read-only window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub design_rule_set: u8,
    pub trace_cost_multiplier_index: u8,
    pub via_up_cost_multiplier_index: u8,
    pub via_down_cost_multiplier_index: u8,
    pub swap_zone: SwapZoneId,

    pub forbidden_trace_barrier: bool,
    pub forbidden_up_via_barrier: bool,
    pub forbidden_down_via_barrier: bool,

    /// Per-(subset, shape-type) bit: proximity to a hard barrier makes
    /// this cell unwalkable for that combination. Derived once from the
    /// static barrier fields of neighboring cells within the DRC radius.
    pub forbidden_proximity_barrier: u64,
    /// Analogous mask for proximity to a pin-swap-zone boundary.
    pub forbidden_proximity_pin_swap: u64,

    congestion: InlineVec<CongestionEntry>,
    path_centers: InlineVec<PathCenterEntry>,

    pub flags: TransientFlags,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            design_rule_set: 0,
            trace_cost_multiplier_index: 0,
            via_up_cost_multiplier_index: 0,
            via_down_cost_multiplier_index: 0,
            swap_zone: 0,
            forbidden_trace_barrier: false,
            forbidden_up_via_barrier: false,
            forbidden_down_via_barrier: false,
            forbidden_proximity_barrier: 0,
            forbidden_proximity_pin_swap: 0,
            congestion: InlineVec::new(),
            path_centers: InlineVec::new(),
            flags: TransientFlags::default(),
        }
    }
}

impl Cell {
    pub fn is_swap_zone(&self) -> bool {
        self.swap_zone != 0
    }

    pub fn barrier_for(&self, shape: ShapeType) -> bool {
        match shape {
            ShapeType::Trace => self.forbidden_trace_barrier,
            ShapeType::ViaUp => self.forbidden_up_via_barrier,
            ShapeType::ViaDown => self.forbidden_down_via_barrier,
        }
    }

    fn proximity_bit(subset: u8, shape: ShapeType) -> u64 {
        1u64 << (subset as u32 * NUM_SHAPE_TYPES as u32 + shape.index() as u32)
    }

    pub fn proximity_forbidden(&self, subset: u8, shape: ShapeType) -> bool {
        self.forbidden_proximity_barrier & Self::proximity_bit(subset, shape) != 0
    }

    pub fn pin_swap_proximity_forbidden(&self, subset: u8, shape: ShapeType) -> bool {
        self.forbidden_proximity_pin_swap & Self::proximity_bit(subset, shape) != 0
    }

    pub fn set_proximity_forbidden(&mut self, subset: u8, shape: ShapeType) {
        self.forbidden_proximity_barrier |= Self::proximity_bit(subset, shape);
    }

    pub fn set_pin_swap_proximity_forbidden(&mut self, subset: u8, shape: ShapeType) {
        self.forbidden_proximity_pin_swap |= Self::proximity_bit(subset, shape);
    }

    /// Fully walkable iff neither a hard barrier nor a proximity-forbidden
    /// bit is set for this (subset, shape-type).
    pub fn is_walkable(&self, subset: u8, shape: ShapeType) -> bool {
        !self.barrier_for(shape) && !self.proximity_forbidden(subset, shape)
    }

    pub fn num_traversing_paths(&self) -> usize {
        self.congestion.len()
    }

    pub fn congestion_entries(&self) -> &[CongestionEntry] {
        &self.congestion
    }

    pub fn path_center_entries(&self) -> &[PathCenterEntry] {
        &self.path_centers
    }

    pub fn congestion_for(&self, path: PathId, subset: u8, shape: ShapeType) -> u32 {
        self.congestion
            .iter()
            .find(|e| e.key() == (path, subset, shape))
            .map(|e| e.traversals_x100)
            .unwrap_or(0)
    }

    /// Adds `amount` (already scaled ×100) to the matching congestion
    /// entry, creating it if absent. Enforces the invariant that a cell
    /// holds at most one entry per (path, subset, shape-type) and the
    /// 4095-entry-per-cell / 24-bit-traversal-count caps from spec.md §7.
    pub fn add_congestion(
        &mut self,
        path: PathId,
        subset: u8,
        shape: ShapeType,
        amount: u32,
        at: (u32, u32, u32),
    ) -> Result<()> {
        if let Some(entry) = self
            .congestion
            .iter_mut()
            .find(|e| e.key() == (path, subset, shape))
        {
            let new_total = entry.traversals_x100.saturating_add(amount);
            if new_total > MAX_CONGESTION_TRAVERSALS_X100 {
                log::warn!(
                    "congestion at ({},{},{}) for path {} saturated at {} traversals x100",
                    at.0,
                    at.1,
                    at.2,
                    path,
                    MAX_CONGESTION_TRAVERSALS_X100
                );
            }
            entry.traversals_x100 = new_total.min(MAX_CONGESTION_TRAVERSALS_X100);
            return Ok(());
        }
        if self.congestion.len() as u32 >= MAX_TRAVERSING_PATHS {
            return Err(Error::TraversingPathCapacityExceeded {
                x: at.0,
                y: at.1,
                z: at.2,
                max: MAX_TRAVERSING_PATHS,
            });
        }
        self.congestion.push(CongestionEntry {
            path,
            subset,
            shape,
            traversals_x100: amount.min(MAX_CONGESTION_TRAVERSALS_X100),
        });
        Ok(())
    }

    /// Applies evaporation to every entry in this cell, removing any that
    /// reach zero and compacting the backing list (spec.md §4.4). `keep`
    /// decides which entries are exempt (the universal repellent).
    pub fn evaporate(&mut self, rate_percent: u32, keep: impl Fn(PathId) -> bool) {
        for entry in self.congestion.iter_mut() {
            if keep(entry.path) {
                continue;
            }
            let reduced = (entry.traversals_x100 as u64 * (100 - rate_percent as u64)) / 100;
            entry.traversals_x100 = reduced as u32;
        }
        self.congestion.retain(|e| e.traversals_x100 > 0 || keep(e.path));
        if self.congestion.is_empty() {
            self.congestion.shrink_to_fit();
        }
    }

    pub fn add_path_center(&mut self, path: PathId, subset: u8, shape: ShapeType) {
        if !self.path_centers.iter().any(|e| e.path == path && e.shape == shape) {
            self.path_centers.push(PathCenterEntry { path, subset, shape });
        }
    }

    pub fn clear_path_centers_for_iteration(&mut self) {
        self.path_centers.clear();
        self.flags = TransientFlags::default();
    }
}

/// Per-layer, per-subset routing restriction: a diff-pair or sub-map
/// routing pass may be confined to a set of layers and a radius around a
/// pivot point (spec.md §4.1). Any candidate cell failing either test is
/// silently skipped by `findPath`.
#[derive(Debug, Clone)]
pub struct RoutingRestriction {
    pub allowed_layers: Vec<bool>, // indexed by Z
    pub pivot: Coordinate,
    pub radius_cells_per_layer: Vec<f64>, // indexed by Z
}

impl RoutingRestriction {
    pub fn permits(&self, c: Coordinate) -> bool {
        let z = c.z as usize;
        if z >= self.allowed_layers.len() || !self.allowed_layers[z] {
            return false;
        }
        let radius = self.radius_cells_per_layer.get(z).copied().unwrap_or(0.0);
        let dx = c.x as f64 - self.pivot.x as f64;
        let dy = c.y as f64 - self.pivot.y as f64;
        (dx * dx + dy * dy).sqrt() <= radius
    }
}

/// The full 3-D grid plus the bookkeeping derived once at setup
/// ("MapInfo" in spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub width: u16,
    pub height: u16,
    pub layers: u8,
    cells: Vec<Cell>,
    /// Per-(DR-set, subset) allowed-direction masks, resolved once from
    /// user input.
    pub subset_directions: Vec<Vec<DirectionMask>>,
}

impl Grid {
    pub fn new(width: u16, height: u16, layers: u8) -> Result<Self> {
        if layers as u32 > MAX_Z_LAYERS {
            return Err(Error::Configuration(format!(
                "{} routing layers exceeds the {}-layer limit imposed by the 5-bit Z field",
                layers, MAX_Z_LAYERS
            )));
        }
        let n = width as usize * height as usize * layers as usize;
        Ok(Self {
            width,
            height,
            layers,
            cells: vec![Cell::default(); n],
            subset_directions: Vec::new(),
        })
    }

    #[inline]
    pub fn index(&self, c: Coordinate) -> usize {
        c.x as usize
            + c.y as usize * self.width as usize
            + c.z as usize * self.width as usize * self.height as usize
    }

    #[inline]
    pub fn in_bounds(&self, c: Coordinate) -> bool {
        (c.x as u16) < self.width && (c.y as u16) < self.height && (c.z as u8) < self.layers
    }

    pub fn cell(&self, c: Coordinate) -> &Cell {
        &self.cells[self.index(c)]
    }

    pub fn cell_mut(&mut self, c: Coordinate) -> &mut Cell {
        let i = self.index(c);
        &mut self.cells[i]
    }

    pub fn try_cell(&self, c: Coordinate) -> Option<&Cell> {
        self.in_bounds(c).then(|| self.cell(c))
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Parallel chunking helper used by congestion evaporation (spec.md
    /// §4.4/§5): each worker owns a disjoint, contiguous slice of cells.
    pub fn cells_par_chunks_mut(&mut self, chunk_len: usize) -> rayon::slice::ChunksMut<'_, Cell> {
        use rayon::prelude::*;
        self.cells.par_chunks_mut(chunk_len)
    }

    pub fn direction_mask(&self, dr_set: u8, subset: u8) -> DirectionMask {
        self.subset_directions
            .get(dr_set as usize)
            .and_then(|row| row.get(subset as usize))
            .copied()
            .unwrap_or(DirectionMask::NONE)
    }
}
