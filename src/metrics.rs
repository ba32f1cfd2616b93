//! Per-iteration metrics and the rolling per-path DRC history the
//! controller's plateau detection and sensitivity ladder consume (spec.md
//! component C9, §4.8).

use std::collections::VecDeque;

use crate::collections::AHashMap;
use crate::drc::DrcReport;
use crate::grid::PathId;

/// Three-way comparison result used throughout the controller to decide
/// whether an iteration's outcome should replace the "best iteration so
/// far" (spec.md §4.8): lower non-pseudo DRC count wins outright, a tie
/// falls through to cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Worse,
    Equivalent,
    Better,
}

/// Everything recorded about a single completed routing iteration.
#[derive(Debug, Clone, Default)]
pub struct IterationMetrics {
    pub iteration: u32,
    pub cost_non_pseudo: u64,
    pub cost_pseudo: u64,
    pub cost_combined: u64,
    pub lateral_length_cells: f64,
    pub via_count: u32,
    pub non_pseudo_drc_count: u32,
    pub pseudo_drc_count: u32,
    pub per_layer_drc_count: Vec<u32>,
    pub explored_cells: usize,
    pub elapsed: std::time::Duration,
}

impl IterationMetrics {
    /// The key the controller's "keep best" logic orders on: fewer
    /// non-pseudo DRCs always wins; ties break on lower combined cost
    /// (spec.md §4.8).
    pub fn compare(&self, other: &IterationMetrics) -> Comparison {
        if self.non_pseudo_drc_count < other.non_pseudo_drc_count {
            Comparison::Better
        } else if self.non_pseudo_drc_count > other.non_pseudo_drc_count {
            Comparison::Worse
        } else if self.cost_combined < other.cost_combined {
            Comparison::Better
        } else if self.cost_combined > other.cost_combined {
            Comparison::Worse
        } else {
            Comparison::Equivalent
        }
    }
}

/// Rolling, per-path history of whether an iteration's routing of that
/// path carried a DRC, over the trailing `num_iterations_to_re_equilibrate`
/// window (spec.md §4.8): feeds `path_greediness` back into `findPath` so a
/// chronically-violating path routes more like Dijkstra.
#[derive(Debug, Clone)]
pub struct DrcHistory {
    window: usize,
    per_path: AHashMap<PathId, VecDeque<bool>>,
}

impl DrcHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            per_path: AHashMap::default(),
        }
    }

    pub fn record(&mut self, path: PathId, had_drc: bool) {
        let entry = self.per_path.entry(path).or_insert_with(VecDeque::new);
        entry.push_back(had_drc);
        while entry.len() > self.window {
            entry.pop_front();
        }
    }

    /// Records every path present in `report` as having had a DRC this
    /// iteration, and every path in `all_paths` absent from it as clean.
    pub fn record_iteration(&mut self, all_paths: &[PathId], report: &DrcReport) {
        for &path in all_paths {
            let had = report.per_path_drc_count.get(&path).copied().unwrap_or(0) > 0;
            self.record(path, had);
        }
    }

    pub fn fraction_with_drcs(&self, path: PathId) -> f64 {
        match self.per_path.get(&path) {
            Some(history) if !history.is_empty() => {
                history.iter().filter(|&&b| b).count() as f64 / history.len() as f64
            }
            _ => 0.0,
        }
    }

    pub fn fraction_with_drcs_map_wide(&self) -> f64 {
        let (hits, total) = self
            .per_path
            .values()
            .fold((0usize, 0usize), |(hits, total), history| {
                (hits + history.iter().filter(|&&b| b).count(), total + history.len())
            });
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Maps a fraction-with-DRCs value to the `path_greediness`/
    /// `map_greediness` multiplier `findPath` uses to scale its heuristic:
    /// 1.0 (fully greedy) when always clean, down to 0.0 (pure Dijkstra)
    /// when every recent iteration carried a DRC.
    pub fn greediness(fraction_with_drcs: f64) -> f64 {
        (1.0 - fraction_with_drcs).clamp(0.0, 1.0)
    }
}

/// Tracks whether recent iteration costs have stopped improving, per
/// spec.md §4.8: a plateau is declared once the trailing window's
/// best-to-worst spread falls under a small relative tolerance.
#[derive(Debug, Clone)]
pub struct PlateauDetector {
    window: VecDeque<u64>,
    capacity: usize,
    relative_tolerance: f64,
}

impl PlateauDetector {
    pub fn new(capacity: usize, relative_tolerance: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            relative_tolerance,
        }
    }

    pub fn push(&mut self, combined_cost: u64) {
        self.window.push_back(combined_cost);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    pub fn is_plateaued(&self) -> bool {
        if self.window.len() < self.capacity {
            return false;
        }
        let min = *self.window.iter().min().unwrap();
        let max = *self.window.iter().max().unwrap();
        if max == 0 {
            return true;
        }
        ((max - min) as f64 / max as f64) <= self.relative_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_drcs_always_wins_regardless_of_cost() {
        let better = IterationMetrics {
            non_pseudo_drc_count: 0,
            cost_combined: 1000,
            ..Default::default()
        };
        let worse = IterationMetrics {
            non_pseudo_drc_count: 1,
            cost_combined: 10,
            ..Default::default()
        };
        assert_eq!(better.compare(&worse), Comparison::Better);
    }

    #[test]
    fn tie_on_drcs_breaks_on_cost() {
        let a = IterationMetrics {
            non_pseudo_drc_count: 2,
            cost_combined: 500,
            ..Default::default()
        };
        let b = IterationMetrics {
            non_pseudo_drc_count: 2,
            cost_combined: 600,
            ..Default::default()
        };
        assert_eq!(a.compare(&b), Comparison::Better);
    }

    #[test]
    fn drc_history_window_evicts_oldest() {
        let mut history = DrcHistory::new(3);
        history.record(1, true);
        history.record(1, true);
        history.record(1, true);
        assert_eq!(history.fraction_with_drcs(1), 1.0);
        history.record(1, false);
        history.record(1, false);
        history.record(1, false);
        assert_eq!(history.fraction_with_drcs(1), 0.0);
    }

    #[test]
    fn greediness_is_inverse_of_drc_fraction() {
        assert_eq!(DrcHistory::greediness(0.0), 1.0);
        assert_eq!(DrcHistory::greediness(1.0), 0.0);
        assert!((DrcHistory::greediness(0.25) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn plateau_detector_requires_full_window() {
        let mut d = PlateauDetector::new(4, 0.01);
        d.push(1000);
        d.push(1000);
        assert!(!d.is_plateaued());
        d.push(1000);
        d.push(1000);
        assert!(d.is_plateaued());
    }

    #[test]
    fn plateau_detector_rejects_still_improving_costs() {
        let mut d = PlateauDetector::new(3, 0.01);
        d.push(1000);
        d.push(800);
        d.push(600);
        assert!(!d.is_plateaued());
    }
}
