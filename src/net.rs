//! Net and diff-pair declarations, and the `InputValues` contract the core
//! consumes (spec.md §3, §6). Parsing an input *file* into this structure
//! remains an external collaborator's job; this module only defines the
//! shape of the parsed result.

use serde::{Deserialize, Serialize};

use crate::design_rules::DesignRuleSet;
use crate::geometry::{Coordinate, Shape};
use crate::grid::{PathId, SwapZoneId};

pub const MAX_NETS: usize = 1023; // 10-bit path-number field

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
    pub start: Coordinate,
    pub end: Coordinate,
    pub diff_pair_partner: Option<usize>,
    pub design_rule_subset_override: Option<(u8, u8)>,
}

/// A declared differential pair, by index into `InputValues::nets`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiffPair {
    pub net_a: usize,
    pub net_b: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepOutZone {
    pub shape: Shape,
    pub layers: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinSwapZone {
    pub shape: Shape,
    pub layers: Vec<u8>,
    pub zone_id: SwapZoneId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignRuleZone {
    pub shape: Shape,
    pub layers: Vec<u8>,
    pub design_rule_set: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostZone {
    pub shape: Shape,
    pub layers: Vec<u8>,
    pub multiplier_index: u8,
}

/// Numeric knobs with the defaults named in spec.md §6 / `global_defs.h`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterKnobs {
    pub max_iterations: u32,
    pub user_drc_free_threshold: u32,
    pub pre_evaporation_iterations: u32,
    pub evaporation_rate_percent: u32,
    pub base_cell_cost: f64,
    pub base_diag_cost: f64,
    pub base_knight_cost: f64,
    pub base_vert_cost_microns: f64,
    pub num_iterations_to_re_equilibrate: u32,
}

impl Default for RouterKnobs {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            user_drc_free_threshold: 10,
            pre_evaporation_iterations: 2,
            evaporation_rate_percent: 10,
            base_cell_cost: 10.0,
            base_diag_cost: 14.0,
            base_knight_cost: 22.0,
            base_vert_cost_microns: 0.0,
            num_iterations_to_re_equilibrate: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputValues {
    pub map_width_microns: f64,
    pub map_height_microns: f64,
    pub cell_size_microns: f64,
    pub layer_names: Vec<String>,
    pub nets: Vec<Net>,
    pub diff_pairs: Vec<DiffPair>,
    pub design_rule_sets: Vec<DesignRuleSet>,
    pub keep_out_zones: Vec<KeepOutZone>,
    pub pin_swap_zones: Vec<PinSwapZone>,
    pub design_rule_zones: Vec<DesignRuleZone>,
    pub trace_cost_zones: Vec<CostZone>,
    pub via_cost_zones: Vec<CostZone>,
    pub knobs: RouterKnobs,
}

impl InputValues {
    pub fn num_layers(&self) -> u8 {
        self.layer_names.len() as u8
    }

    pub fn width_cells(&self) -> u16 {
        (self.map_width_microns / self.cell_size_microns).round() as u16
    }

    pub fn height_cells(&self) -> u16 {
        (self.map_height_microns / self.cell_size_microns).round() as u16
    }
}

/// Maps net/pseudo-net indices onto the dense `PathId` numbering used
/// throughout the grid: real nets first (in declaration order), then one
/// pseudo-net per diff pair, then the reserved universal-repellent id
/// (spec.md §3).
#[derive(Debug, Clone)]
pub struct PathNumbering {
    pub num_paths: u32,
    pub num_pseudo_paths: u32,
}

impl PathNumbering {
    pub fn from_input(input: &InputValues) -> Self {
        Self {
            num_paths: input.nets.len() as u32,
            num_pseudo_paths: input.diff_pairs.len() as u32,
        }
    }

    pub fn pseudo_path_id(&self, diff_pair_index: usize) -> PathId {
        self.num_paths + diff_pair_index as u32
    }

    pub fn universal_repellent(&self) -> PathId {
        self.num_paths + self.num_pseudo_paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_knobs_match_spec_defaults() {
        let knobs = RouterKnobs::default();
        assert_eq!(knobs.max_iterations, 2000);
        assert_eq!(knobs.user_drc_free_threshold, 10);
        assert_eq!(knobs.pre_evaporation_iterations, 2);
        assert_eq!(knobs.evaporation_rate_percent, 10);
    }

    #[test]
    fn pseudo_path_ids_follow_real_nets() {
        let input = InputValues {
            map_width_microns: 1000.0,
            map_height_microns: 1000.0,
            cell_size_microns: 10.0,
            layer_names: vec!["top".into()],
            nets: vec![
                Net {
                    name: "a".into(),
                    start: Coordinate::new(0, 0, 0),
                    end: Coordinate::new(1, 1, 0),
                    diff_pair_partner: None,
                    design_rule_subset_override: None,
                },
                Net {
                    name: "b".into(),
                    start: Coordinate::new(0, 0, 0),
                    end: Coordinate::new(1, 1, 0),
                    diff_pair_partner: None,
                    design_rule_subset_override: None,
                },
            ],
            diff_pairs: vec![DiffPair { net_a: 0, net_b: 1 }],
            design_rule_sets: Vec::new(),
            keep_out_zones: Vec::new(),
            pin_swap_zones: Vec::new(),
            design_rule_zones: Vec::new(),
            trace_cost_zones: Vec::new(),
            via_cost_zones: Vec::new(),
            knobs: RouterKnobs::default(),
        };
        let numbering = PathNumbering::from_input(&input);
        assert_eq!(numbering.pseudo_path_id(0), 2);
        assert_eq!(numbering.universal_repellent(), 3);
    }
}
