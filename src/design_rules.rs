//! Design-rule sets/subsets, routing-direction masks, and the precomputed
//! interaction radii the path-finder and DRC engine consult.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{ShapeType, NUM_SHAPE_TYPES};

pub const MAX_DESIGN_RULE_SETS: usize = 16;
pub const MAX_DESIGN_RULE_SUBSETS: usize = 16;

/// The 18-bit routing-direction mask, bit-ordered exactly as spec.md §6
/// specifies: `[up dn | N S E W | NE SE SW NW | NxNE ExNE ExSE SxSE | SxSW
/// WxSW WxNW NxNW]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionMask(pub u32);

/// One of the 18 legal moves from a cell, ordered to match
/// `global_defs.h`'s transition-index enum (`E=0 .. Down=17`), which the
/// direction-mask bit layout is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    E,
    N,
    W,
    S,
    NE,
    SE,
    NW,
    SW,
    NxNE,
    ExNE,
    ExSE,
    SxSE,
    SxSW,
    WxSW,
    WxNW,
    NxNW,
    Up,
    Down,
}

pub const ALL_MOVES: [Move; 18] = [
    Move::E,
    Move::N,
    Move::W,
    Move::S,
    Move::NE,
    Move::SE,
    Move::NW,
    Move::SW,
    Move::NxNE,
    Move::ExNE,
    Move::ExSE,
    Move::SxSE,
    Move::SxSW,
    Move::WxSW,
    Move::WxNW,
    Move::NxNW,
    Move::Up,
    Move::Down,
];

impl Move {
    pub fn bit_index(self) -> u32 {
        match self {
            Move::Up => 17,
            Move::Down => 16,
            Move::N => 15,
            Move::S => 14,
            Move::E => 13,
            Move::W => 12,
            Move::NE => 11,
            Move::SE => 10,
            Move::SW => 9,
            Move::NW => 8,
            Move::NxNE => 7,
            Move::ExNE => 6,
            Move::ExSE => 5,
            Move::SxSE => 4,
            Move::SxSW => 3,
            Move::WxSW => 2,
            Move::WxNW => 1,
            Move::NxNW => 0,
        }
    }

    /// The (dx, dy, dz) delta this move represents, in cell units.
    pub fn delta(self) -> (i32, i32, i32) {
        match self {
            Move::E => (1, 0, 0),
            Move::N => (0, 1, 0),
            Move::W => (-1, 0, 0),
            Move::S => (0, -1, 0),
            Move::NE => (1, 1, 0),
            Move::SE => (1, -1, 0),
            Move::NW => (-1, 1, 0),
            Move::SW => (-1, -1, 0),
            Move::NxNE => (1, 2, 0),
            Move::ExNE => (2, 1, 0),
            Move::ExSE => (2, -1, 0),
            Move::SxSE => (1, -2, 0),
            Move::SxSW => (-1, -2, 0),
            Move::WxSW => (-2, -1, 0),
            Move::WxNW => (-2, 1, 0),
            Move::NxNW => (-1, 2, 0),
            Move::Up => (0, 0, 1),
            Move::Down => (0, 0, -1),
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(self, Move::NE | Move::SE | Move::NW | Move::SW)
    }

    pub fn is_knight(self) -> bool {
        matches!(
            self,
            Move::NxNE
                | Move::ExNE
                | Move::ExSE
                | Move::SxSE
                | Move::SxSW
                | Move::WxSW
                | Move::WxNW
                | Move::NxNW
        )
    }

    pub fn is_lateral(self) -> bool {
        !matches!(self, Move::Up | Move::Down)
    }

    pub fn is_via(self) -> bool {
        matches!(self, Move::Up | Move::Down)
    }

    /// For a knight move, the two orthogonal intermediate cells that must
    /// also be walkable (spec.md §4.1(ii), §4.3): "for a knight move
    /// (dx=2,dy=1) the two intermediates are ((px+x)/2,py) and
    /// ((px+x)/2,y)", and symmetrically on the other axis when `|dy|=2`.
    pub fn knight_intermediates(self) -> Option<[(i32, i32); 2]> {
        if !self.is_knight() {
            return None;
        }
        let (dx, dy, _) = self.delta();
        if dx.abs() == 2 {
            let mid = dx / 2;
            Some([(mid, 0), (mid, dy)])
        } else {
            let mid = dy / 2;
            Some([(0, mid), (dx, mid)])
        }
    }

    /// For a diagonal move, the single orthogonal intermediate cell
    /// (spec.md §4.3 — only consulted for thin lines).
    pub fn diagonal_intermediate(self) -> Option<(i32, i32)> {
        match self {
            Move::NE => Some((1, 0)),
            Move::SE => Some((1, 0)),
            Move::NW => Some((-1, 0)),
            Move::SW => Some((-1, 0)),
            _ => None,
        }
    }
}

impl DirectionMask {
    pub const ANY: DirectionMask = DirectionMask(0x03_FFFF);
    pub const NONE: DirectionMask = DirectionMask(0x00_0000);
    pub const ANY_LATERAL: DirectionMask = DirectionMask(0x00_FFFF);
    pub const MANHATTAN: DirectionMask = DirectionMask(0x03_F000);
    pub const X_ROUTING: DirectionMask = DirectionMask(0x03_0F00);
    pub const NORTH_SOUTH: DirectionMask = DirectionMask(0x03_C000);
    pub const EAST_WEST: DirectionMask = DirectionMask(0x03_3000);
    pub const MANHATTAN_X: DirectionMask = DirectionMask(0x03_FF00);
    pub const UP_DOWN: DirectionMask = DirectionMask(0x03_0000);

    pub fn allows(&self, mv: Move) -> bool {
        (self.0 >> mv.bit_index()) & 1 != 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.0 & !0x03_FFFF != 0 {
            return Err(Error::IllegalRouteDirections(self.0));
        }
        Ok(())
    }

    /// The "minimum allowed direction" between a source and destination
    /// cell's masks, per spec.md §4.1: the most-restrictive intersection,
    /// unless either side is `NONE` (then `NONE`), else the bitwise OR of
    /// the two as a last resort when the AND is empty. Open Question (a)
    /// in spec.md §9 flags this OR fallback as possibly masking a
    /// configuration error; we implement it literally and log a warning
    /// the first time it is observed to fire for a given mask pair.
    pub fn minimum_allowed(a: DirectionMask, b: DirectionMask) -> DirectionMask {
        if a == DirectionMask::NONE || b == DirectionMask::NONE {
            return DirectionMask::NONE;
        }
        let intersection = a.0 & b.0;
        if intersection != 0 {
            DirectionMask(intersection)
        } else {
            log::warn!(
                "direction masks {:#x} and {:#x} are strictly disjoint; falling back to their \
                 union (spec.md open question 9a) -- check for a design-rule configuration error",
                a.0,
                b.0
            );
            DirectionMask(a.0 | b.0)
        }
    }
}

/// Pairwise spacing requirement between two (subset, shape-type)
/// combinations within (or across) design-rule sets, plus the per-shape
/// radius used to derive it. Converted once, at setup, to cell units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignRuleSubset {
    pub name: String,
    pub line_width_cells: f64,
    pub via_up_diameter_cells: f64,
    pub via_down_diameter_cells: f64,
    /// Minimum center-to-center spacing, indexed `[shape_a][shape_b]`, in
    /// cell units, symmetric by construction.
    pub spacing_cells: [[f64; NUM_SHAPE_TYPES]; NUM_SHAPE_TYPES],
    /// Per-net trace/via cost multipliers used outside pin-swap zones.
    pub trace_cost_multiplier: f64,
    pub via_up_cost_multiplier: f64,
    pub via_down_cost_multiplier: f64,
    /// Much lower costs used inside a pin-swap zone (spec.md §4.1).
    pub pin_swap_trace_cost_multiplier: f64,
    pub pin_swap_via_up_cost_multiplier: f64,
    pub pin_swap_via_down_cost_multiplier: f64,
    /// Differential-pair pitch in cell units, if this subset is a
    /// diff-pair subset.
    pub diff_pair_pitch_cells: Option<f64>,
    pub is_pseudo_net: bool,
    pub allowed_directions: DirectionMask,
}

impl DesignRuleSubset {
    fn radius(&self, shape: ShapeType) -> f64 {
        match shape {
            ShapeType::Trace => self.line_width_cells / 2.0,
            ShapeType::ViaUp => self.via_up_diameter_cells / 2.0,
            ShapeType::ViaDown => self.via_down_diameter_cells / 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignRuleSet {
    pub name: String,
    pub subsets: Vec<DesignRuleSubset>,
}

/// A resolved (DR-set, subset, shape-type) triple, flattened into a single
/// "class" index. spec.md §4.2 describes the interaction table as indexed
/// by `m, n` where each "indexes a (subset, shape-type) pair"; we keep that
/// idea but additionally fold in the DR-set so a class uniquely identifies
/// one radius-bearing entity in the whole map, which is what the DRC scan
/// and congestion deposition actually need to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InteractionClass {
    pub dr_set: u8,
    pub subset: u8,
    pub shape: ShapeType,
}

fn classes(sets: &[DesignRuleSet]) -> Vec<InteractionClass> {
    let mut out = Vec::new();
    for (i, set) in sets.iter().enumerate() {
        for (m, _) in set.subsets.iter().enumerate() {
            for shape in ShapeType::all() {
                out.push(InteractionClass {
                    dr_set: i as u8,
                    subset: m as u8,
                    shape,
                });
            }
        }
    }
    out
}

/// Precomputed pairwise interaction radii between every pair of
/// (DR-set, subset, shape-type) classes present in the map (spec.md §4.2).
/// `drc_radius[a][b]` is `radius(b) + spacing(a, b)`, in cell units;
/// `drc_radius_squared` avoids a sqrt in the DRC inner loop.
/// `cong_radius` is the strictly larger table C6 uses for congestion
/// deposition and `near_a_net` marking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionTables {
    classes: Vec<(u8, u8, u8)>, // (dr_set, subset, shape index), row/col order
    pub drc_radius: Vec<Vec<f64>>,
    pub drc_radius_squared: Vec<Vec<f64>>,
    pub cong_radius: Vec<Vec<f64>>,
}

/// Extra margin added when deriving congestion-deposition radii from DRC
/// radii, matching the original's convention of depositing slightly wider
/// than the bare violation threshold so congestion "sees" a path before it
/// is already touching a neighbor.
const CONGESTION_RADIUS_MARGIN_CELLS: f64 = 1.0;

impl InteractionTables {
    fn class_index(&self, dr_set: u8, subset: u8, shape: ShapeType) -> Option<usize> {
        self.classes
            .iter()
            .position(|&(s, sub, sh)| s == dr_set && sub == subset && sh == shape.index() as u8)
    }

    pub fn drc_radius_between(
        &self,
        a: (u8, u8, ShapeType),
        b: (u8, u8, ShapeType),
    ) -> Option<f64> {
        let i = self.class_index(a.0, a.1, a.2)?;
        let j = self.class_index(b.0, b.1, b.2)?;
        Some(self.drc_radius[i][j])
    }

    pub fn cong_radius_between(
        &self,
        a: (u8, u8, ShapeType),
        b: (u8, u8, ShapeType),
    ) -> Option<f64> {
        let i = self.class_index(a.0, a.1, a.2)?;
        let j = self.class_index(b.0, b.1, b.2)?;
        Some(self.cong_radius[i][j])
    }
}

pub fn build_interaction_tables(sets: &[DesignRuleSet]) -> InteractionTables {
    let classes = classes(sets);
    let n = classes.len();
    let mut drc_radius = vec![vec![0.0_f64; n]; n];

    for (i, class_i) in classes.iter().enumerate() {
        let subset_i = &sets[class_i.dr_set as usize].subsets[class_i.subset as usize];
        for (j, class_j) in classes.iter().enumerate() {
            let subset_j = &sets[class_j.dr_set as usize].subsets[class_j.subset as usize];
            let spacing = subset_i.spacing_cells[class_i.shape.index()][class_j.shape.index()]
                .max(subset_j.spacing_cells[class_j.shape.index()][class_i.shape.index()]);
            drc_radius[i][j] = subset_j.radius(class_j.shape) + spacing;
        }
    }

    let drc_radius_squared = drc_radius
        .iter()
        .map(|row| row.iter().map(|r| r * r).collect())
        .collect();

    let cong_radius = drc_radius
        .iter()
        .map(|row| {
            row.iter()
                .map(|r| r + CONGESTION_RADIUS_MARGIN_CELLS)
                .collect()
        })
        .collect();

    InteractionTables {
        classes: classes
            .iter()
            .map(|c| (c.dr_set, c.subset, c.shape.index() as u8))
            .collect(),
        drc_radius,
        drc_radius_squared,
        cong_radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_allowed_is_intersection_when_nonempty() {
        let a = DirectionMask::MANHATTAN;
        let b = DirectionMask::ANY;
        assert_eq!(DirectionMask::minimum_allowed(a, b), DirectionMask(a.0 & b.0));
    }

    #[test]
    fn minimum_allowed_none_wins() {
        let a = DirectionMask::NONE;
        let b = DirectionMask::ANY;
        assert_eq!(DirectionMask::minimum_allowed(a, b), DirectionMask::NONE);
    }

    #[test]
    fn minimum_allowed_disjoint_falls_back_to_union() {
        let a = DirectionMask::NORTH_SOUTH;
        let b = DirectionMask::EAST_WEST;
        // both nonzero, AND is zero (disjoint lateral directions), so OR fallback applies
        assert_eq!(a.0 & b.0 & 0x00_FFFF, 0);
        let result = DirectionMask::minimum_allowed(a, b);
        assert_eq!(result.0, a.0 | b.0);
    }

    #[test]
    fn move_bit_indices_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for mv in ALL_MOVES {
            assert!(seen.insert(mv.bit_index()));
        }
    }
}
