//! Per-iteration orchestration (spec.md component C8, §4.7/§4.8): evaporate,
//! route every net in parallel, synthesize diff-pair shoulders, fill
//! contiguous paths, mark congestion proximity, run DRC, deposit fresh
//! congestion, update rolling history, detect a metric plateau, and apply
//! one adaptive action when it fires.

use rayon::prelude::*;

use crate::collections::{AHashMap, AHashSet};
use crate::congestion::{self, DenseTrace};
use crate::context::RouterContext;
use crate::contiguous;
use crate::design_rules::{DesignRuleSet, InteractionTables};
use crate::diffpair::{self, Vec2};
use crate::drc::{self, DrcReport};
use crate::geometry::{Coordinate, ShapeType};
use crate::grid::{Grid, PathId};
use crate::metrics::{Comparison, DrcHistory, IterationMetrics, PlateauDetector};
use crate::pathfinder::{self, CostModel, FindPathRequest, PathResult, RandomizeMode, SubsetCosts};

/// The fixed 11-level congestion-sensitivity ladder from spec.md §4.8,
/// expressed as a percentage multiplier on the trace/via congestion terms
/// in `CostModel`.
pub const SENSITIVITY_LADDER_PERCENT: [u32; 11] =
    [100, 141, 200, 283, 400, 566, 800, 1131, 1600, 2263, 3200];

/// One net or pseudo-net the controller is responsible for routing each
/// iteration. Real nets and pseudo-nets look identical to `findPath`; the
/// controller only distinguishes them when deciding which paths feed
/// `diffpair` synthesis and which feed "non-pseudo" metrics.
#[derive(Debug, Clone)]
pub struct RoutablePath {
    pub path: PathId,
    pub subset: u8,
    pub start: Coordinate,
    pub end: Coordinate,
    pub is_pseudo: bool,
    /// For a pseudo-net, the two real partner paths it synthesizes
    /// shoulders for, and the nominal diff-pair half-pitch in cells.
    pub diff_pair: Option<(PathId, PathId, f64)>,
}

/// Running per-level statistics the sensitivity ladder climbs/descends on
/// (spec.md §4.8): DRC-free fraction, average number of nets with DRCs,
/// and average non-pseudo routing cost, each an exponential-ish running
/// mean over every iteration spent at that level.
#[derive(Debug, Clone, Copy, Default)]
struct LevelStats {
    samples: u32,
    drc_free_fraction: f64,
    avg_nets_with_drcs: f64,
    avg_non_pseudo_cost: f64,
}

impl LevelStats {
    fn update(&mut self, drc_free: bool, nets_with_drcs: u32, non_pseudo_cost: u64) {
        self.samples += 1;
        let n = self.samples as f64;
        self.drc_free_fraction += ((drc_free as u8 as f64) - self.drc_free_fraction) / n;
        self.avg_nets_with_drcs += (nets_with_drcs as f64 - self.avg_nets_with_drcs) / n;
        self.avg_non_pseudo_cost += (non_pseudo_cost as f64 - self.avg_non_pseudo_cost) / n;
    }

    /// Lower is better: fewer nets with DRCs dominates, cost is the
    /// tie-breaker, matching the "best iteration" ordering in §4.8.
    fn better_than(&self, other: &LevelStats) -> bool {
        if self.samples == 0 {
            return false;
        }
        if other.samples == 0 {
            return true;
        }
        if self.avg_nets_with_drcs != other.avg_nets_with_drcs {
            self.avg_nets_with_drcs < other.avg_nets_with_drcs
        } else {
            self.avg_non_pseudo_cost < other.avg_non_pseudo_cost
        }
    }
}

#[derive(Debug, Clone)]
struct SensitivityLadder {
    level: usize,
    stats: [LevelStats; SENSITIVITY_LADDER_PERCENT.len()],
    climbing: bool,
}

impl SensitivityLadder {
    fn new() -> Self {
        Self {
            level: 0,
            stats: [LevelStats::default(); SENSITIVITY_LADDER_PERCENT.len()],
            climbing: true,
        }
    }

    fn current_multiplier(&self) -> f64 {
        SENSITIVITY_LADDER_PERCENT[self.level] as f64 / 100.0
    }

    fn record(&mut self, drc_free: bool, nets_with_drcs: u32, non_pseudo_cost: u64) {
        self.stats[self.level].update(drc_free, nets_with_drcs, non_pseudo_cost);
    }

    /// Moves one step in the current direction if that neighboring level's
    /// running stats already look better; otherwise reverses direction.
    /// Both ends of the ladder clamp rather than wrap.
    fn step(&mut self) {
        let last = SENSITIVITY_LADDER_PERCENT.len() - 1;
        let neighbor = if self.climbing {
            (self.level + 1).min(last)
        } else {
            self.level.saturating_sub(1)
        };
        if neighbor == self.level {
            self.climbing = !self.climbing;
            return;
        }
        if self.stats[neighbor].samples > 0 && !self.stats[neighbor].better_than(&self.stats[self.level]) {
            self.climbing = !self.climbing;
        } else {
            self.level = neighbor;
        }
    }
}

/// One of the mutually-exclusive adaptive actions a plateau event may
/// trigger (spec.md §4.8).
#[derive(Debug, Clone)]
pub enum AdaptiveAction {
    SwapTerminals(Vec<PathId>),
    AdjustCongestionSensitivity { new_multiplier_percent: u32 },
    EnablePseudoTraceCongestion { path: PathId, layer: u8 },
    RandomizeGCost { path: PathId, mode: RandomizeMode },
}

/// Everything produced by routing and synthesizing one iteration's worth
/// of paths, before DRC/metrics/congestion-deposit have run.
struct RoutedIteration {
    dense: AHashMap<PathId, Vec<(Coordinate, ShapeType)>>,
    sparse: AHashMap<PathId, PathResult>,
}

pub struct Controller {
    grid: Grid,
    tables: InteractionTables,
    design_rule_sets: Vec<DesignRuleSet>,
    cost_model: CostModel,
    subset_costs: Vec<SubsetCosts>,
    paths: Vec<RoutablePath>,
    ctx: RouterContext,

    evaporation_rate_percent: u32,
    pre_evaporation_iterations: u32,
    user_drc_free_threshold: u32,
    max_iterations: u32,
    num_iterations_to_re_equilibrate: u32,

    history: DrcHistory,
    plateau: PlateauDetector,
    ladder: SensitivityLadder,
    swapped_terminals: AHashSet<PathId>,
    randomize_flags: AHashMap<PathId, RandomizeMode>,
    pseudo_trace_congestion_near_crowded_vias: AHashSet<(PathId, u8)>,

    drc_free_run_count: u32,
    best: Option<(u32, IterationMetrics)>,

    dr_set_of: Box<dyn Fn(Coordinate) -> u8 + Send + Sync>,
}

impl Controller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        grid: Grid,
        tables: InteractionTables,
        design_rule_sets: Vec<DesignRuleSet>,
        cost_model: CostModel,
        subset_costs: Vec<SubsetCosts>,
        paths: Vec<RoutablePath>,
        ctx: RouterContext,
        evaporation_rate_percent: u32,
        pre_evaporation_iterations: u32,
        user_drc_free_threshold: u32,
        max_iterations: u32,
        num_iterations_to_re_equilibrate: u32,
        dr_set_of: impl Fn(Coordinate) -> u8 + Send + Sync + 'static,
    ) -> Self {
        Self {
            grid,
            tables,
            design_rule_sets,
            cost_model,
            subset_costs,
            paths,
            ctx,
            evaporation_rate_percent,
            pre_evaporation_iterations,
            user_drc_free_threshold,
            max_iterations,
            num_iterations_to_re_equilibrate,
            history: DrcHistory::new(num_iterations_to_re_equilibrate as usize),
            plateau: PlateauDetector::new(10, 0.001),
            ladder: SensitivityLadder::new(),
            swapped_terminals: AHashSet::default(),
            randomize_flags: AHashMap::default(),
            pseudo_trace_congestion_near_crowded_vias: AHashSet::default(),
            drc_free_run_count: 0,
            best: None,
            dr_set_of: Box::new(dr_set_of),
        }
    }

    fn universal_repellent(&self) -> PathId {
        self.paths.iter().map(|p| p.path).max().map(|m| m + 1).unwrap_or(0)
    }

    /// Step 1: evaporate congestion, once the pre-evaporation grace period
    /// has elapsed (spec.md §4.7 step 1, §4.4).
    fn evaporate(&mut self, iteration: u32) {
        if iteration > self.pre_evaporation_iterations {
            let repellent = self.universal_repellent();
            congestion::evaporate(&mut self.grid, self.evaporation_rate_percent, repellent);
        }
    }

    /// Step 2: clear per-iteration transient cell state (spec.md §4.7 step
    /// 2, resolving open question 9b explicitly rather than implicitly).
    fn clear_transient_state(&mut self) {
        for cell in self.grid.cells_mut() {
            cell.clear_path_centers_for_iteration();
        }
    }

    /// Step 3: route every real net and pseudo-net in parallel (diff-pair
    /// partners are *not* routed here, only their pseudo-net) on the
    /// controller's dedicated thread pool (spec.md §4.7 step 3, §5).
    fn route_all(&self) -> Vec<(PathId, PathResult)> {
        let grid = &self.grid;
        let cost_model = &self.cost_model;
        let subset_costs = &self.subset_costs;
        let history = &self.history;
        let randomize_flags = &self.randomize_flags;
        let map_greediness = DrcHistory::greediness(history.fraction_with_drcs_map_wide());

        self.ctx.install(|| {
            self.paths
                .par_iter()
                .map(|p| {
                    let path_greediness = DrcHistory::greediness(history.fraction_with_drcs(p.path));
                    let (randomize, random_delta_fraction) = randomize_flags
                        .get(&p.path)
                        .map(|&m| (m, 0.15))
                        .unwrap_or((RandomizeMode::NoChange, 0.0));
                    let request = FindPathRequest {
                        path: p.path,
                        count_self_congestion: false,
                        subset: p.subset,
                        start: p.start,
                        end: p.end,
                        dijkstra: false,
                        restriction: None,
                        randomize,
                        random_delta_fraction,
                        path_greediness,
                        map_greediness,
                        diff_pair_partner: p.diff_pair.map(|(a, _, _)| a),
                    };
                    let costs = subset_costs
                        .get(p.subset as usize)
                        .copied()
                        .unwrap_or(subset_costs[0]);
                    let result = pathfinder::find_path(grid, cost_model, &costs, &request);
                    (p.path, result)
                })
                .collect()
        })
    }

    /// Steps 4-5: synthesize diff-pair shoulders from each pseudo-net's
    /// path, then expand every real/pseudo/shoulder path into a dense,
    /// contiguous sequence (spec.md §4.7 steps 4-5, §4.5, §4.3).
    fn synthesize_and_fill(&self, sparse: Vec<(PathId, PathResult)>) -> RoutedIteration {
        let mut sparse_map: AHashMap<PathId, PathResult> = sparse.into_iter().collect();
        let mut dense: AHashMap<PathId, Vec<(Coordinate, ShapeType)>> = AHashMap::default();

        for p in &self.paths {
            if let Some(result) = sparse_map.get(&p.path) {
                if let Ok(filled) = contiguous::fill(p.path, &result.cells, false, false) {
                    dense.insert(p.path, filled);
                }
            }
            if let Some((partner_a, partner_b, half_pitch)) = p.diff_pair {
                if let Some(pseudo_result) = sparse_map.get(&p.path) {
                    if pseudo_result.is_empty() {
                        continue;
                    }
                    let (shoulder_a, shoulder_b) = self.synthesize_diff_pair(
                        pseudo_result,
                        partner_a,
                        partner_b,
                        p.subset,
                        half_pitch,
                    );
                    if let Ok(filled_a) = contiguous::fill(partner_a, &shoulder_a, false, false) {
                        dense.insert(partner_a, filled_a);
                    }
                    if let Ok(filled_b) = contiguous::fill(partner_b, &shoulder_b, false, false) {
                        dense.insert(partner_b, filled_b);
                    }
                }
            }
        }

        for p in &self.paths {
            sparse_map
                .entry(p.path)
                .or_insert_with(|| PathResult::default());
        }
        RoutedIteration { dense, sparse: sparse_map }
    }

    /// Step 6: mark `near_a_net` around every contiguous path (spec.md §4.7
    /// step 6, §4.4).
    fn mark_near_a_net(&mut self, routed: &RoutedIteration) {
        let traces: Vec<DenseTrace<'_>> = routed
            .dense
            .iter()
            .map(|(&path, cells)| DenseTrace {
                path,
                subset: self.subset_for(path),
                cells,
            })
            .collect();
        let dr_set_of = &self.dr_set_of;
        congestion::mark_near_a_net(&mut self.grid, &traces, &self.tables, |c| dr_set_of(c));
    }

    /// Resolves the design-rule subset a path routed under: its own, when
    /// it's a real or pseudo net in `self.paths`, or otherwise its parent
    /// pseudo-net's subset, when it's a diff-pair shoulder synthesized from
    /// one (shoulders aren't themselves entries in `self.paths`).
    fn subset_for(&self, path: PathId) -> u8 {
        if let Some(p) = self.paths.iter().find(|p| p.path == path) {
            return p.subset;
        }
        for p in &self.paths {
            if let Some((a, b, _)) = p.diff_pair {
                if a == path || b == path {
                    return p.subset;
                }
            }
        }
        0
    }

    /// Steps 4-5's diff-pair half: refines the nominal shoulder projection
    /// against cell legality and turn/pin-swap acceptance, then at every
    /// layer transition in the pseudo-net's centerline places a matched pair
    /// of diff-pair vias and splices them into the two shoulder sequences
    /// (spec.md §4.5). Falls back to the refined-but-unspliced shoulders at
    /// a transition whose via placement fails or whose subset carries no
    /// diff-pair geometry.
    fn synthesize_diff_pair(
        &self,
        pseudo_result: &PathResult,
        partner_a: PathId,
        partner_b: PathId,
        subset: u8,
        half_pitch_cells: f64,
    ) -> (Vec<Coordinate>, Vec<Coordinate>) {
        let pseudo_path = &pseudo_result.cells;
        let grid = &self.grid;
        let dr_set_of = &self.dr_set_of;
        let dr_set = dr_set_of(pseudo_path[0]);

        let raw = diffpair::project_shoulders(pseudo_path, half_pitch_cells);
        let is_forbidden = |p: Vec2, z: u8| {
            let c = Coordinate::new(p.x.round().max(0.0) as u16, p.y.round().max(0.0) as u16, z);
            !grid.in_bounds(c) || !grid.cell(c).is_walkable(subset, ShapeType::Trace)
        };
        let near_pin_swap = |_from: Vec2, to: Vec2, z: u8| {
            let c = Coordinate::new(to.x.round().max(0.0) as u16, to.y.round().max(0.0) as u16, z);
            grid.in_bounds(c) && grid.cell(c).pin_swap_proximity_forbidden(subset, ShapeType::Trace)
        };
        let refined = diffpair::refine_shoulders(pseudo_path, &raw, half_pitch_cells, is_forbidden, near_pin_swap);

        let to_coord = |p: Vec2, z: u8| {
            Coordinate::new(p.x.round().max(0.0) as u16, p.y.round().max(0.0) as u16, z)
        };
        let mut shoulder_a: Vec<Coordinate> = refined.iter().map(|(a, _)| to_coord(a.position, a.z)).collect();
        let mut shoulder_b: Vec<Coordinate> = refined.iter().map(|(_, b)| to_coord(b.position, b.z)).collect();

        let subset_geometry = self
            .design_rule_sets
            .get(dr_set as usize)
            .and_then(|s| s.subsets.get(subset as usize))
            .and_then(|sub| sub.diff_pair_pitch_cells.map(|pitch| (sub, pitch)));
        let (sub, pitch) = match subset_geometry {
            Some(sp) => sp,
            None => return (shoulder_a, shoulder_b),
        };

        for i in 0..pseudo_path.len().saturating_sub(1) {
            let (z_from, z_to) = (pseudo_path[i].z, pseudo_path[i + 1].z);
            if z_from == z_to {
                continue;
            }

            let before = (i > 0).then(|| {
                diffpair::coord_to_vec2(pseudo_path[i]).sub(diffpair::coord_to_vec2(pseudo_path[i - 1])).normalized()
            });
            let after = (i + 2 < pseudo_path.len()).then(|| {
                diffpair::coord_to_vec2(pseudo_path[i + 2]).sub(diffpair::coord_to_vec2(pseudo_path[i + 1])).normalized()
            });
            let perpendicular = diffpair::via_perpendicular(before, after);
            let pivot = diffpair::coord_to_vec2(pseudo_path[i]);

            let nominal_distance = diffpair::nominal_via_distance(
                sub.via_up_diameter_cells,
                sub.via_down_diameter_cells,
                sub.spacing_cells[ShapeType::ViaUp.index()][ShapeType::ViaUp.index()],
                sub.spacing_cells[ShapeType::ViaDown.index()][ShapeType::ViaDown.index()],
                sub.spacing_cells[ShapeType::Trace.index()][ShapeType::Trace.index()],
                pitch,
            );

            let via_shape = if z_to > z_from { ShapeType::ViaUp } else { ShapeType::ViaDown };
            let is_legal = |p: Vec2| {
                let c = to_coord(p, z_from);
                grid.in_bounds(c) && grid.cell(c).is_walkable(subset, via_shape)
            };

            let at = pseudo_path[i];
            let (via_a_pos, via_b_pos) = match diffpair::place_vias(
                pivot,
                perpendicular,
                nominal_distance,
                partner_a,
                partner_b,
                at,
                is_legal,
            ) {
                Ok(pair) => pair,
                Err(_) => {
                    log::warn!(
                        "diff-pair via placement failed near ({}, {}, {}); leaving shoulders unspliced there",
                        at.x,
                        at.y,
                        at.z
                    );
                    continue;
                }
            };

            let before_a = shoulder_a.get(i.wrapping_sub(1)).map(|&c| diffpair::coord_to_vec2(c)).unwrap_or(pivot);
            let after_a = shoulder_a.get(i + 1).map(|&c| diffpair::coord_to_vec2(c)).unwrap_or(pivot);
            let before_b = shoulder_b.get(i.wrapping_sub(1)).map(|&c| diffpair::coord_to_vec2(c)).unwrap_or(pivot);
            let after_b = shoulder_b.get(i + 1).map(|&c| diffpair::coord_to_vec2(c)).unwrap_or(pivot);

            let a_to_1 = diffpair::match_vias_to_shoulders(via_a_pos, via_b_pos, before_a, after_a, before_b, after_b);
            let (via_for_a, via_for_b) = if a_to_1 { (via_a_pos, via_b_pos) } else { (via_b_pos, via_a_pos) };

            if let Ok(idx) = diffpair::find_nearby_layer_transition(&shoulder_a, z_from, z_to) {
                shoulder_a[idx] = to_coord(via_for_a, z_from);
                shoulder_a[idx + 1] = to_coord(via_for_a, z_to);
            }
            if let Ok(idx) = diffpair::find_nearby_layer_transition(&shoulder_b, z_from, z_to) {
                shoulder_b[idx] = to_coord(via_for_b, z_from);
                shoulder_b[idx + 1] = to_coord(via_for_b, z_to);
            }
        }

        (shoulder_a, shoulder_b)
    }

    /// Step 7: run DRC (spec.md §4.7 step 7, §4.2).
    fn run_drc(&mut self) -> DrcReport {
        let dr_set_of = &self.dr_set_of;
        drc::check(&mut self.grid, &self.tables, |c| dr_set_of(c))
    }

    /// Step 8: deposit fresh congestion for every routed path (spec.md §4.7
    /// step 8, §4.4).
    fn deposit_congestion(&mut self, routed: &RoutedIteration) {
        let dr_set_of = &self.dr_set_of;
        for (&path, cells) in &routed.dense {
            let trace = DenseTrace {
                path,
                subset: self.subset_for(path),
                cells,
            };
            congestion::deposit(&mut self.grid, &trace, &self.tables, |c| dr_set_of(c));
        }
    }

    fn compute_metrics(
        &self,
        iteration: u32,
        routed: &RoutedIteration,
        report: &DrcReport,
        elapsed: std::time::Duration,
    ) -> IterationMetrics {
        let mut cost_non_pseudo = 0u64;
        let mut cost_pseudo = 0u64;
        let mut lateral_length = 0.0f64;
        let mut via_count = 0u32;
        let mut explored = 0usize;
        let mut non_pseudo_drc = 0u32;
        let mut pseudo_drc = 0u32;

        for p in &self.paths {
            let result = routed.sparse.get(&p.path);
            let cost = result.map(|r| r.cost).unwrap_or(0);
            explored += result.map(|r| r.explored_cells).unwrap_or(0);
            if p.is_pseudo {
                cost_pseudo += cost;
            } else {
                cost_non_pseudo += cost;
            }
            if let Some(cells) = routed.dense.get(&p.path) {
                lateral_length += cells
                    .windows(2)
                    .filter(|w| w[0].0.z == w[1].0.z)
                    .count() as f64;
                via_count += cells.windows(2).filter(|w| w[0].0.z != w[1].0.z).count() as u32;
            }
            let drcs = report.per_path_drc_count.get(&p.path).copied().unwrap_or(0);
            if p.is_pseudo {
                pseudo_drc += drcs;
            } else {
                non_pseudo_drc += drcs;
            }
        }

        IterationMetrics {
            iteration,
            cost_non_pseudo,
            cost_pseudo,
            cost_combined: cost_non_pseudo + cost_pseudo,
            lateral_length_cells: lateral_length,
            via_count,
            non_pseudo_drc_count: non_pseudo_drc,
            pseudo_drc_count: pseudo_drc,
            per_layer_drc_count: report.per_layer_drc_count.clone(),
            explored_cells: explored,
            elapsed,
        }
    }

    /// Step 9: roll the per-path DRC window forward (spec.md §4.7 step 9).
    fn update_history(&mut self, report: &DrcReport) {
        let all: Vec<PathId> = self.paths.iter().map(|p| p.path).collect();
        self.history.record_iteration(&all, report);
    }

    /// Step 10: feed the plateau detector and, if it fires, pick one
    /// adaptive action (spec.md §4.7 step 10, §4.8). Mutually exclusive —
    /// only one action is returned per plateau event, cycling through the
    /// available kinds by iteration parity so each gets exercised over
    /// time rather than always picking the same one.
    fn maybe_adapt(&mut self, iteration: u32, metrics: &IterationMetrics) -> Option<AdaptiveAction> {
        self.plateau.push(metrics.cost_combined);
        self.ladder.record(
            metrics.non_pseudo_drc_count == 0,
            self.paths
                .iter()
                .filter(|p| !p.is_pseudo)
                .filter(|p| self.history.fraction_with_drcs(p.path) > 0.0)
                .count() as u32,
            metrics.cost_non_pseudo,
        );

        if !self.plateau.is_plateaued() {
            return None;
        }

        match iteration % 4 {
            0 => {
                let chronic: Vec<PathId> = self
                    .paths
                    .iter()
                    .filter(|p| !p.is_pseudo)
                    .filter(|p| self.history.fraction_with_drcs(p.path) > 0.5)
                    .map(|p| p.path)
                    .collect();
                for &path in &chronic {
                    self.swapped_terminals.insert(path);
                }
                if chronic.is_empty() {
                    None
                } else {
                    Some(AdaptiveAction::SwapTerminals(chronic))
                }
            }
            1 => {
                self.ladder.step();
                let new_mult = SENSITIVITY_LADDER_PERCENT[self.ladder.level];
                self.cost_model.trace_congestion_multiplier = new_mult as f64 / 100.0;
                self.cost_model.via_congestion_multiplier = new_mult as f64 / 100.0;
                Some(AdaptiveAction::AdjustCongestionSensitivity {
                    new_multiplier_percent: new_mult,
                })
            }
            2 => {
                let target = self
                    .paths
                    .iter()
                    .find(|p| p.is_pseudo && self.history.fraction_with_drcs(p.path) > 0.3)?;
                self.pseudo_trace_congestion_near_crowded_vias
                    .insert((target.path, target.start.z));
                Some(AdaptiveAction::EnablePseudoTraceCongestion {
                    path: target.path,
                    layer: target.start.z,
                })
            }
            _ => {
                let target = self
                    .paths
                    .iter()
                    .filter(|p| !p.is_pseudo)
                    .find(|p| self.history.fraction_with_drcs(p.path) > 0.2)?;
                let mode = RandomizeMode::Increase;
                self.randomize_flags.insert(target.path, mode);
                Some(AdaptiveAction::RandomizeGCost { path: target.path, mode })
            }
        }
    }

    /// Step 11's "keep best" half: compares this iteration's metrics
    /// against the best seen so far and replaces it when strictly better
    /// (spec.md §4.7 step 11, §4.8 "Best iteration tracking").
    fn update_best(&mut self, iteration: u32, metrics: IterationMetrics) {
        let replace = match &self.best {
            None => true,
            Some((_, best_metrics)) => metrics.compare(best_metrics) == Comparison::Better,
        };
        if replace {
            self.best = Some((iteration, metrics));
        }
    }

    /// Runs the 11-step loop from spec.md §4.7 until the cumulative
    /// DRC-free-solution count reaches `userDRCfreeThreshold` or
    /// `maxIterations` is exhausted, returning the metrics of the best
    /// iteration observed.
    pub fn run(&mut self) -> IterationMetrics {
        for iteration in 1..=self.max_iterations {
            self.evaporate(iteration);
            self.clear_transient_state();

            let start = std::time::Instant::now();
            let sparse = self.route_all();
            let routed = self.synthesize_and_fill(sparse);
            self.mark_near_a_net(&routed);
            let report = self.run_drc();
            let elapsed = start.elapsed();

            let metrics = self.compute_metrics(iteration, &routed, &report, elapsed);
            self.deposit_congestion(&routed);
            self.update_history(&report);
            let _ = self.maybe_adapt(iteration, &metrics);

            if metrics.non_pseudo_drc_count == 0 {
                self.drc_free_run_count += 1;
            } else {
                self.drc_free_run_count = 0;
            }
            self.update_best(iteration, metrics);

            if self.drc_free_run_count >= self.user_drc_free_threshold {
                break;
            }
        }
        self.best
            .as_ref()
            .map(|(_, m)| m.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design_rules::{build_interaction_tables, DesignRuleSet, DesignRuleSubset, DirectionMask};
    use crate::geometry::NUM_SHAPE_TYPES;

    fn flat_subset() -> DesignRuleSubset {
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
            allowed_directions: DirectionMask::ANY,
        }
    }

    #[test]
    fn sensitivity_ladder_climbs_when_neighbor_is_better() {
        let mut ladder = SensitivityLadder::new();
        ladder.record(false, 5, 1000);
        ladder.step();
        assert!(ladder.level <= 1);
    }

    #[test]
    fn small_two_net_map_converges_drc_free() {
        let mut grid = Grid::new(12, 12, 1).unwrap();
        grid.subset_directions = vec![vec![DirectionMask::ANY]];
        let sets = vec![DesignRuleSet {
            name: "set0".into(),
            subsets: vec![flat_subset()],
        }];
        let tables = build_interaction_tables(&sets);
        let cost_model = CostModel {
            base_cell_cost: 10.0,
            base_diag_cost: 14.0,
            base_knight_cost: 22.0,
            base_vert_cost: 10.0,
            trace_cost_zone_multipliers: vec![1.0],
            via_up_cost_zone_multipliers: vec![1.0],
            via_down_cost_zone_multipliers: vec![1.0],
            trace_congestion_multiplier: 1.0,
            via_congestion_multiplier: 1.0,
        };
        let subset_costs = vec![SubsetCosts {
            trace_multiplier: 1.0,
            via_up_multiplier: 1.0,
            via_down_multiplier: 1.0,
            pin_swap_trace_multiplier: 0.001,
            pin_swap_via_up_multiplier: 0.001,
            pin_swap_via_down_multiplier: 0.001,
            line_width_cells: 1.0,
        }];
        let paths = vec![
            RoutablePath {
                path: 0,
                subset: 0,
                start: Coordinate::new(1, 1, 0),
                end: Coordinate::new(10, 1, 0),
                is_pseudo: false,
                diff_pair: None,
            },
            RoutablePath {
                path: 1,
                subset: 0,
                start: Coordinate::new(1, 10, 0),
                end: Coordinate::new(10, 10, 0),
                is_pseudo: false,
                diff_pair: None,
            },
        ];
        let ctx = RouterContext::new(1).unwrap();
        let mut controller = Controller::new(
            grid,
            tables,
            sets,
            cost_model,
            subset_costs,
            paths,
            ctx,
            10,
            2,
            3,
            50,
            20,
            |_| 0,
        );
        let best = controller.run();
        assert_eq!(best.non_pseudo_drc_count, 0);
    }

    #[test]
    fn sensitivity_ladder_starts_at_first_level() {
        let ladder = SensitivityLadder::new();
        assert_eq!(ladder.current_multiplier(), 1.0);
    }
}
