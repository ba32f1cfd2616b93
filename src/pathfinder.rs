//! The shortest-path search over the 3-D cell grid (spec.md component C3,
//! "findPath"): an A*/Dijkstra variant with layer transitions, diagonal and
//! knight moves, direction masks, cost zones, congestion pressure, and
//! pin-swap semantics (spec.md §4.1).
//!
//! Search state (`whichList`, `parent`, `G`, heap position) is kept in a
//! sparse map keyed by packed coordinate rather than a grid-sized dense
//! array: a single search typically only ever touches a small fraction of
//! an 8192x8192x30 map, and the static grid + live congestion remain
//! read-only throughout (spec.md §5) so nothing here mutates `Grid`.

use crate::collections::AHashMap;
use crate::design_rules::{DirectionMask, Move, ALL_MOVES};
use crate::geometry::{Coordinate, ShapeType};
use crate::grid::{Grid, PathId, RoutingRestriction};

/// Exponent from `NON_PIN_SWAP_EXPONENT` in the original format: routing
/// within a pin-swap zone costs `1 / 2^30` of the equivalent move outside
/// one, which in practice means pin-swap routing is free relative to
/// anything leaving the zone.
pub const NON_PIN_SWAP_EXPONENT: u32 = 30;

pub const DIFF_PAIR_PARTNER_VIA_CONGESTION_FACTOR: f64 = 16.0;
pub const DIFF_PAIR_PARTNER_TRACE_CONGESTION_FACTOR: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomizeMode {
    NoChange,
    Increase,
    Decrease,
}

/// Base per-move costs and the cost-zone multiplier tables indexed by a
/// cell's `*_cost_multiplier_index` fields (spec.md §3). Design-rule-subset
/// multipliers (thin vs. thick trace, pin-swap vs. non-pin-swap) are
/// layered on top of these per spec.md §4.1.
#[derive(Debug, Clone)]
pub struct CostModel {
    pub base_cell_cost: f64,
    pub base_diag_cost: f64,
    pub base_knight_cost: f64,
    pub base_vert_cost: f64,
    pub trace_cost_zone_multipliers: Vec<f64>,
    pub via_up_cost_zone_multipliers: Vec<f64>,
    pub via_down_cost_zone_multipliers: Vec<f64>,
    pub trace_congestion_multiplier: f64,
    pub via_congestion_multiplier: f64,
}

impl CostModel {
    fn zone_multiplier(&self, shape: ShapeType, index: u8) -> f64 {
        let table = match shape {
            ShapeType::Trace => &self.trace_cost_zone_multipliers,
            ShapeType::ViaUp => &self.via_up_cost_zone_multipliers,
            ShapeType::ViaDown => &self.via_down_cost_zone_multipliers,
        };
        table.get(index as usize).copied().unwrap_or(1.0)
    }
}

/// Per-(subset) view of a design-rule subset's cost multipliers and
/// direction mask, resolved for the duration of one `findPath` call.
#[derive(Debug, Clone, Copy)]
pub struct SubsetCosts {
    pub trace_multiplier: f64,
    pub via_up_multiplier: f64,
    pub via_down_multiplier: f64,
    pub pin_swap_trace_multiplier: f64,
    pub pin_swap_via_up_multiplier: f64,
    pub pin_swap_via_down_multiplier: f64,
    /// The subset's trace width in cells, consulted only to decide whether
    /// a diagonal move's orthogonal intermediate cell needs a walkability
    /// check (spec.md §4.3: thin traces, unlike wide ones, don't already
    /// overlap that cell).
    pub line_width_cells: f64,
}

#[derive(Debug, Clone)]
pub struct FindPathRequest<'a> {
    pub path: PathId,
    /// The competing path exempt from self-congestion (the net being
    /// routed), and whether self-traversal counts as congestion at all.
    pub count_self_congestion: bool,
    pub subset: u8,
    pub start: Coordinate,
    pub end: Coordinate,
    /// Forces H=0 everywhere (Dijkstra mode), per spec.md §4.1.
    pub dijkstra: bool,
    pub restriction: Option<&'a RoutingRestriction>,
    pub randomize: RandomizeMode,
    pub random_delta_fraction: f64,
    /// `fractionRecentIterationsWithoutPathDRCs` for this path and for the
    /// map as a whole; both scale H down to make greedy search more
    /// Dijkstra-like when a path has had recent DRC trouble (spec.md
    /// §4.1).
    pub path_greediness: f64,
    pub map_greediness: f64,
    pub diff_pair_partner: Option<PathId>,
}

#[derive(Debug, Clone, Default)]
pub struct PathResult {
    pub cells: Vec<Coordinate>,
    pub cost: u64,
    pub explored_cells: usize,
}

impl PathResult {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ListState {
    Open,
    Closed,
}

struct SearchNode {
    list: ListState,
    parent: Option<u32>,
    g: u64,
    heap_pos: usize,
}

/// A binary min-heap over (F = G + H) ordered open-set entries, keeping an
/// explicit back-reference from coordinate to heap index so `decrease_key`
/// runs in O(log n) instead of a linear scan, per spec.md §4.1.
struct OpenHeap {
    entries: Vec<(u64, u64, u32)>, // (f_cost_fixed, insertion_seq, packed coord)
}

impl OpenHeap {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn less(a: &(u64, u64, u32), b: &(u64, u64, u32)) -> bool {
        (a.0, a.1) < (b.0, b.1)
    }

    fn push(&mut self, entry: (u64, u64, u32), nodes: &mut AHashMap<u32, SearchNode>) {
        self.entries.push(entry);
        let mut i = self.entries.len() - 1;
        nodes.get_mut(&entry.2).unwrap().heap_pos = i;
        while i > 0 {
            let parent = (i - 1) / 2;
            if Self::less(&self.entries[i], &self.entries[parent]) {
                self.swap(i, parent, nodes);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn swap(&mut self, a: usize, b: usize, nodes: &mut AHashMap<u32, SearchNode>) {
        self.entries.swap(a, b);
        nodes.get_mut(&self.entries[a].2).unwrap().heap_pos = a;
        nodes.get_mut(&self.entries[b].2).unwrap().heap_pos = b;
    }

    fn pop(&mut self, nodes: &mut AHashMap<u32, SearchNode>) -> Option<(u64, u64, u32)> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.swap(0, last, nodes);
        let popped = self.entries.pop().unwrap();
        if !self.entries.is_empty() {
            self.sift_down(0, nodes);
        }
        Some(popped)
    }

    fn sift_down(&mut self, mut i: usize, nodes: &mut AHashMap<u32, SearchNode>) {
        let n = self.entries.len();
        loop {
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            let mut smallest = i;
            if l < n && Self::less(&self.entries[l], &self.entries[smallest]) {
                smallest = l;
            }
            if r < n && Self::less(&self.entries[r], &self.entries[smallest]) {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest, nodes);
            i = smallest;
        }
    }

    /// Re-heapifies the entry at a node's cached heap position after its F
    /// cost decreased (a true decrease-key, not a reinsert).
    fn decrease_key(
        &mut self,
        pos: usize,
        new_entry: (u64, u64, u32),
        nodes: &mut AHashMap<u32, SearchNode>,
    ) {
        self.entries[pos] = new_entry;
        let mut i = pos;
        while i > 0 {
            let parent = (i - 1) / 2;
            if Self::less(&self.entries[i], &self.entries[parent]) {
                self.swap(i, parent, nodes);
                i = parent;
            } else {
                break;
            }
        }
    }
}

fn octile(dx: f64, dy: f64) -> f64 {
    let dx = dx.abs();
    let dy = dy.abs();
    let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
    std::f64::consts::SQRT_2 * lo + (hi - lo)
}

/// Admissible heuristic estimator, selected by the allowed-direction mask
/// at the *current* cell, per spec.md §4.1.
fn heuristic(
    mask: DirectionMask,
    dijkstra: bool,
    dx: f64,
    dy: f64,
    dz: f64,
    cost: &CostModel,
) -> f64 {
    if dijkstra {
        return 0.0;
    }
    let knight_allowed = ALL_MOVES.iter().any(|&m| m.is_knight() && mask.allows(m));
    let diagonal_allowed = mask.allows(Move::NE)
        || mask.allows(Move::SE)
        || mask.allows(Move::SW)
        || mask.allows(Move::NW);
    let lateral_allowed = mask.allows(Move::N)
        || mask.allows(Move::S)
        || mask.allows(Move::E)
        || mask.allows(Move::W);

    let lateral = if knight_allowed {
        (dx * dx + dy * dy).sqrt() * cost.base_cell_cost
    } else if diagonal_allowed && lateral_allowed {
        octile(dx, dy) * cost.base_cell_cost
    } else if diagonal_allowed {
        // Diagonals only: rotated Manhattan using max(|dx|, |dy|).
        dx.abs().max(dy.abs()) * cost.base_diag_cost
    } else {
        (dx.abs() + dy.abs()) * cost.base_cell_cost
    };
    lateral + dz.abs() * cost.base_vert_cost
}

fn pack(c: Coordinate) -> u32 {
    c.pack()
}

/// Returns the legal moves from `from`, already filtered by walkability of
/// source/destination/intermediate cells and by the intersected direction
/// mask (spec.md §4.1(i)-(ii)).
fn legal_moves(
    grid: &Grid,
    from: Coordinate,
    subset: u8,
    subset_costs: &SubsetCosts,
    restriction: Option<&RoutingRestriction>,
) -> Vec<(Move, Coordinate)> {
    let mut out = Vec::new();
    let from_cell = grid.cell(from);
    let from_mask = grid.direction_mask(from_cell.design_rule_set, subset);

    for mv in ALL_MOVES {
        let (dx, dy, dz) = mv.delta();
        let tx = from.x as i32 + dx;
        let ty = from.y as i32 + dy;
        let tz = from.z as i32 + dz;
        if tx < 0 || ty < 0 || tz < 0 {
            continue;
        }
        let to = Coordinate::new(tx as u16, ty as u16, tz as u8);
        if !grid.in_bounds(to) {
            continue;
        }
        if let Some(r) = restriction {
            if !r.permits(to) {
                continue;
            }
        }
        let to_cell = grid.cell(to);
        let to_mask = grid.direction_mask(to_cell.design_rule_set, subset);
        let allowed = DirectionMask::minimum_allowed(from_mask, to_mask);
        if !allowed.allows(mv) {
            continue;
        }

        let shape = if mv.is_via() {
            if mv == Move::Up {
                ShapeType::ViaUp
            } else {
                ShapeType::ViaDown
            }
        } else {
            ShapeType::Trace
        };
        if !to_cell.is_walkable(subset, shape) {
            continue;
        }

        if let Some([(ix1, iy1), (ix2, iy2)]) = mv.knight_intermediates() {
            let i1 = Coordinate::new(
                (from.x as i32 + ix1) as u16,
                (from.y as i32 + iy1) as u16,
                from.z,
            );
            let i2 = Coordinate::new(
                (from.x as i32 + ix2) as u16,
                (from.y as i32 + iy2) as u16,
                from.z,
            );
            if !grid.in_bounds(i1) || !grid.in_bounds(i2) {
                continue;
            }
            if !grid.cell(i1).is_walkable(subset, ShapeType::Trace)
                || !grid.cell(i2).is_walkable(subset, ShapeType::Trace)
            {
                continue;
            }
        } else if let Some((ix, iy)) = mv.diagonal_intermediate() {
            // Only a thin trace can pass diagonally through a cell without
            // already overlapping its orthogonal neighbor (spec.md §4.3,
            // mirroring `contiguous::diagonal_needs_fill`'s threshold).
            if crate::contiguous::diagonal_needs_fill(subset_costs.line_width_cells / 2.0) {
                let intermediate = Coordinate::new(
                    (from.x as i32 + ix) as u16,
                    (from.y as i32 + iy) as u16,
                    from.z,
                );
                if !grid.in_bounds(intermediate)
                    || !grid.cell(intermediate).is_walkable(subset, ShapeType::Trace)
                {
                    continue;
                }
            }
        }

        out.push((mv, to));
    }
    out
}

/// Distance (G-cost) for moving from `from` to `to` via `mv`, including
/// the pin-swap substitution and congestion addend (spec.md §4.1).
#[allow(clippy::too_many_arguments)]
fn move_cost(
    grid: &Grid,
    from: Coordinate,
    to: Coordinate,
    mv: Move,
    subset: u8,
    cost_model: &CostModel,
    subset_costs: &SubsetCosts,
    request: &FindPathRequest<'_>,
    knight_intermediate_costs: Option<(f64, f64)>,
) -> f64 {
    let to_cell = grid.cell(to);
    let in_swap_zone = to_cell.is_swap_zone();

    let base = if mv.is_via() {
        let zone_mult = cost_model.zone_multiplier(
            if mv == Move::Up {
                ShapeType::ViaUp
            } else {
                ShapeType::ViaDown
            },
            if mv == Move::Up {
                to_cell.via_up_cost_multiplier_index
            } else {
                to_cell.via_down_cost_multiplier_index
            },
        );
        let subset_mult = if in_swap_zone {
            if mv == Move::Up {
                subset_costs.pin_swap_via_up_multiplier
            } else {
                subset_costs.pin_swap_via_down_multiplier
            }
        } else if mv == Move::Up {
            subset_costs.via_up_multiplier
        } else {
            subset_costs.via_down_multiplier
        };
        cost_model.base_vert_cost * zone_mult * subset_mult
    } else if mv.is_diagonal() {
        let zone_mult =
            cost_model.zone_multiplier(ShapeType::Trace, to_cell.trace_cost_multiplier_index);
        let subset_mult = if in_swap_zone {
            subset_costs.pin_swap_trace_multiplier
        } else {
            subset_costs.trace_multiplier
        };
        cost_model.base_diag_cost * zone_mult * subset_mult
    } else if mv.is_knight() {
        let zone_mult =
            cost_model.zone_multiplier(ShapeType::Trace, to_cell.trace_cost_multiplier_index);
        let subset_mult = if in_swap_zone {
            subset_costs.pin_swap_trace_multiplier
        } else {
            subset_costs.trace_multiplier
        };
        let at_dest = cost_model.base_knight_cost * zone_mult * subset_mult;
        let (i1, i2) = knight_intermediate_costs.unwrap_or((at_dest, at_dest));
        (at_dest + i1.max(i2)) / 2.0
    } else {
        let zone_mult =
            cost_model.zone_multiplier(ShapeType::Trace, to_cell.trace_cost_multiplier_index);
        let subset_mult = if in_swap_zone {
            subset_costs.pin_swap_trace_multiplier
        } else {
            subset_costs.trace_multiplier
        };
        cost_model.base_cell_cost * zone_mult * subset_mult
    };

    // Non-pin-swap moves are scaled up by 2^30 relative to the equivalent
    // pin-swap move, implemented here as a division on the pin-swap side
    // so both remain representable in f64 without overflowing u64 costs
    // downstream; see `NON_PIN_SWAP_EXPONENT`.
    let pin_swap_scaled = if in_swap_zone {
        base / (1u64 << NON_PIN_SWAP_EXPONENT) as f64
    } else {
        base
    };

    let congestion = congestion_addend(grid, to, subset, mv, request, cost_model);

    pin_swap_scaled + congestion
}

fn congestion_addend(
    grid: &Grid,
    to: Coordinate,
    subset: u8,
    mv: Move,
    request: &FindPathRequest<'_>,
    cost_model: &CostModel,
) -> f64 {
    let to_cell = grid.cell(to);
    let shape = if mv.is_via() {
        if mv == Move::Up {
            ShapeType::ViaUp
        } else {
            ShapeType::ViaDown
        }
    } else {
        ShapeType::Trace
    };

    let mut addend = 0.0_f64;
    for entry in to_cell.congestion_entries() {
        if entry.shape != shape {
            continue;
        }
        if entry.path == request.path && !request.count_self_congestion {
            continue;
        }
        let traversals = entry.traversals_x100 as f64 / crate::congestion::ONE_TRAVERSAL as f64;
        let base_mult = if mv.is_via() {
            cost_model.via_congestion_multiplier
        } else {
            cost_model.trace_congestion_multiplier
        };
        let partner_scale = if Some(entry.path) == request.diff_pair_partner {
            if mv.is_via() {
                DIFF_PAIR_PARTNER_VIA_CONGESTION_FACTOR
            } else {
                DIFF_PAIR_PARTNER_TRACE_CONGESTION_FACTOR
            }
        } else {
            1.0
        };
        addend += base_mult * traversals * partner_scale;
    }

    let _ = subset;
    match request.randomize {
        RandomizeMode::NoChange => addend,
        RandomizeMode::Increase => addend * (1.0 + request.random_delta_fraction),
        RandomizeMode::Decrease => addend * (1.0 - request.random_delta_fraction).max(0.0),
    }
}

/// Runs A* (or Dijkstra, when `request.dijkstra`) from `request.start` to
/// `request.end`. Returns an empty path with cost 0 when unreachable
/// (spec.md §4.1's "Unreachability" failure semantics — non-fatal).
pub fn find_path(
    grid: &Grid,
    cost_model: &CostModel,
    subset_costs: &SubsetCosts,
    request: &FindPathRequest<'_>,
) -> PathResult {
    if request.start == request.end {
        return PathResult {
            cells: vec![request.start],
            cost: 0,
            explored_cells: 1,
        };
    }

    let mut nodes: AHashMap<u32, SearchNode> = AHashMap::default();
    let mut heap = OpenHeap::new();
    let mut seq: u64 = 0;

    let start_key = pack(request.start);
    nodes.insert(
        start_key,
        SearchNode {
            list: ListState::Open,
            parent: None,
            g: 0,
            heap_pos: 0,
        },
    );
    let dr_set = grid.cell(request.start).design_rule_set;
    let mask = grid.direction_mask(dr_set, request.subset);
    let (dx, dy, dz) = request.start.delta(&request.end);
    let h0 = heuristic(
        mask,
        request.dijkstra,
        dx as f64,
        dy as f64,
        dz as f64,
        cost_model,
    ) * request.path_greediness.min(request.map_greediness);
    heap.push((h0.round() as u64, seq, start_key), &mut nodes);
    seq += 1;

    let mut explored = 0usize;

    while let Some((_f, _s, coord_bits)) = heap.pop(&mut nodes) {
        let current = Coordinate::unpack(coord_bits);
        {
            let node = nodes.get_mut(&coord_bits).unwrap();
            if node.list == ListState::Closed {
                continue;
            }
            node.list = ListState::Closed;
        }
        explored += 1;

        if current == request.end {
            let mut cells = vec![current];
            let mut cursor = coord_bits;
            while let Some(parent_bits) = nodes.get(&cursor).and_then(|n| n.parent) {
                cells.push(Coordinate::unpack(parent_bits));
                cursor = parent_bits;
            }
            cells.reverse();
            let cost = nodes.get(&coord_bits).unwrap().g;
            return PathResult {
                cells,
                cost,
                explored_cells: explored,
            };
        }

        for (mv, to) in legal_moves(grid, current, request.subset, subset_costs, request.restriction) {
            let step_cost = move_cost(
                grid,
                current,
                to,
                mv,
                request.subset,
                cost_model,
                subset_costs,
                request,
                None,
            );
            let g = nodes.get(&coord_bits).unwrap().g + step_cost.round() as u64;
            let to_bits = pack(to);
            let existing_g = nodes.get(&to_bits).map(|n| n.g);
            if existing_g.map(|eg| g < eg).unwrap_or(true) {
                let to_dr_set = grid.cell(to).design_rule_set;
                let to_mask = grid.direction_mask(to_dr_set, request.subset);
                let (dx, dy, dz) = to.delta(&request.end);
                let h = heuristic(
                    to_mask,
                    request.dijkstra,
                    dx as f64,
                    dy as f64,
                    dz as f64,
                    cost_model,
                ) * request.path_greediness.min(request.map_greediness);
                let f = g + h.round() as u64;

                if let Some(node) = nodes.get_mut(&to_bits) {
                    node.parent = Some(coord_bits);
                    node.g = g;
                    if node.list == ListState::Closed {
                        node.list = ListState::Open;
                        heap.push((f, seq, to_bits), &mut nodes);
                    } else {
                        let pos = node.heap_pos;
                        heap.decrease_key(pos, (f, seq, to_bits), &mut nodes);
                    }
                } else {
                    nodes.insert(
                        to_bits,
                        SearchNode {
                            list: ListState::Open,
                            parent: Some(coord_bits),
                            g,
                            heap_pos: 0,
                        },
                    );
                    heap.push((f, seq, to_bits), &mut nodes);
                }
                seq += 1;
            }
        }
    }

    PathResult {
        cells: Vec::new(),
        cost: 0,
        explored_cells: explored,
    }
}
