//! End-to-end scenarios from spec.md §8, exercised against the public API
//! rather than module-internal test helpers.

use acorn::congestion;
use acorn::context::RouterContext;
use acorn::controller::{Controller, RoutablePath};
use acorn::design_rules::{build_interaction_tables, DesignRuleSet, DesignRuleSubset, DirectionMask};
use acorn::geometry::{Coordinate, ShapeType, NUM_SHAPE_TYPES};
use acorn::grid::Grid;
use acorn::pathfinder::{CostModel, FindPathRequest, RandomizeMode, SubsetCosts};

fn flat_subset(spacing: f64) -> DesignRuleSubset {
    DesignRuleSubset {
        name: "default".into(),
        line_width_cells: 1.0,
        via_up_diameter_cells: 1.0,
        via_down_diameter_cells: 1.0,
        spacing_cells: [[spacing; NUM_SHAPE_TYPES]; NUM_SHAPE_TYPES],
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

fn flat_cost_model() -> CostModel {
    CostModel {
        base_cell_cost: 10.0,
        base_diag_cost: 14.0,
        base_knight_cost: 22.0,
        base_vert_cost: 10.0,
        trace_cost_zone_multipliers: vec![1.0],
        via_up_cost_zone_multipliers: vec![1.0],
        via_down_cost_zone_multipliers: vec![1.0],
        trace_congestion_multiplier: 1.0,
        via_congestion_multiplier: 1.0,
    }
}

fn flat_subset_costs() -> SubsetCosts {
    SubsetCosts {
        trace_multiplier: 1.0,
        via_up_multiplier: 1.0,
        via_down_multiplier: 1.0,
        pin_swap_trace_multiplier: 0.001,
        pin_swap_via_up_multiplier: 0.001,
        pin_swap_via_down_multiplier: 0.001,
        line_width_cells: 1.0,
    }
}

/// Scenario 2: single net, 10x10x2, (1,1,0)->(5,5,1), ANY directions,
/// baseVertCost 10. Expect 7 lateral + 1 vertical = 8 steps.
#[test]
fn scenario_2_any_direction_with_layer_change() {
    let mut grid = Grid::new(10, 10, 2).unwrap();
    grid.subset_directions = vec![vec![DirectionMask::ANY]];

    let request = FindPathRequest {
        path: 0,
        count_self_congestion: false,
        subset: 0,
        start: Coordinate::new(1, 1, 0),
        end: Coordinate::new(5, 5, 1),
        dijkstra: false,
        restriction: None,
        randomize: RandomizeMode::NoChange,
        random_delta_fraction: 0.0,
        path_greediness: 1.0,
        map_greediness: 1.0,
        diff_pair_partner: None,
    };
    let result = acorn::pathfinder::find_path(&grid, &flat_cost_model(), &flat_subset_costs(), &request);
    assert!(!result.is_empty());
    // 8 moves total (some lateral, one vertical) -> 9 cells on the sparse path.
    assert_eq!(result.cells.len(), 9);
    let vertical_steps = result
        .cells
        .windows(2)
        .filter(|w| w[0].z != w[1].z)
        .count();
    assert_eq!(vertical_steps, 1);
}

/// Scenario 3: two parallel nets routed at exactly the design-rule minimum
/// spacing converge to zero DRCs; reducing the spacing by one cell
/// produces DRCs proportional to the overlap length.
#[test]
fn scenario_3_parallel_nets_at_and_under_minimum_spacing() {
    let run = |spacing: f64, gap: u16| -> u32 {
        let mut grid = Grid::new(20, 20, 1).unwrap();
        grid.subset_directions = vec![vec![DirectionMask::ANY_LATERAL]];
        let sets = vec![DesignRuleSet {
            name: "set0".into(),
            subsets: vec![flat_subset(spacing)],
        }];
        let tables = build_interaction_tables(&sets);

        let paths = vec![
            RoutablePath {
                path: 0,
                subset: 0,
                start: Coordinate::new(2, 5, 0),
                end: Coordinate::new(17, 5, 0),
                is_pseudo: false,
                diff_pair: None,
            },
            RoutablePath {
                path: 1,
                subset: 0,
                start: Coordinate::new(2, 5 + gap, 0),
                end: Coordinate::new(17, 5 + gap, 0),
                is_pseudo: false,
                diff_pair: None,
            },
        ];
        let ctx = RouterContext::new(1).unwrap();
        let mut controller = Controller::new(
            grid,
            tables,
            sets,
            flat_cost_model(),
            vec![flat_subset_costs()],
            paths,
            ctx,
            10,
            2,
            1,
            1,
            20,
            |_| 0,
        );
        controller.run().non_pseudo_drc_count
    };

    let at_minimum = run(2.0, 3);
    assert_eq!(at_minimum, 0);

    let under_minimum = run(2.0, 2);
    assert!(under_minimum > 0);
}

/// Scenario 4: a diff pair routed as a straight run on one layer produces
/// two parallel shoulder paths at half-pitch, each the same length as the
/// pseudo-path.
#[test]
fn scenario_4_diff_pair_straight_run() {
    use acorn::contiguous;
    use acorn::diffpair;

    let pseudo_path: Vec<Coordinate> = (0..10).map(|x| Coordinate::new(x, 5, 0)).collect();
    let half_pitch = 2.0;
    let shoulders = diffpair::project_shoulders(&pseudo_path, half_pitch);
    assert_eq!(shoulders.len(), pseudo_path.len());

    let shoulder_a: Vec<Coordinate> = shoulders
        .iter()
        .map(|(a, _)| Coordinate::new(a.position.x.round() as u16, a.position.y.round() as u16, a.z))
        .collect();
    let shoulder_b: Vec<Coordinate> = shoulders
        .iter()
        .map(|(_, b)| Coordinate::new(b.position.x.round() as u16, b.position.y.round() as u16, b.z))
        .collect();

    for c in &shoulder_a {
        assert_eq!(c.y, 7);
    }
    for c in &shoulder_b {
        assert_eq!(c.y, 3);
    }

    let filled_a = contiguous::fill(1, &shoulder_a, false, true).unwrap();
    let filled_b = contiguous::fill(2, &shoulder_b, false, true).unwrap();
    assert_eq!(filled_a.len(), filled_b.len());
}

/// Scenario 6: two nets with identical endpoints initially overlap
/// (DRCs), then congestion-driven rerouting over enough iterations drives
/// them to disjoint centerlines and zero DRCs.
#[test]
fn scenario_6_congestion_drives_identical_endpoint_nets_apart() {
    let mut grid = Grid::new(20, 20, 1).unwrap();
    grid.subset_directions = vec![vec![DirectionMask::ANY]];
    let sets = vec![DesignRuleSet {
        name: "set0".into(),
        subsets: vec![flat_subset(2.0)],
    }];
    let tables = build_interaction_tables(&sets);

    let paths = vec![
        RoutablePath {
            path: 0,
            subset: 0,
            start: Coordinate::new(2, 10, 0),
            end: Coordinate::new(17, 10, 0),
            is_pseudo: false,
            diff_pair: None,
        },
        RoutablePath {
            path: 1,
            subset: 0,
            start: Coordinate::new(2, 10, 0),
            end: Coordinate::new(17, 10, 0),
            is_pseudo: false,
            diff_pair: None,
        },
    ];
    let ctx = RouterContext::new(1).unwrap();
    let mut controller = Controller::new(
        grid,
        tables,
        sets,
        flat_cost_model(),
        vec![flat_subset_costs()],
        paths,
        ctx,
        15,
        1,
        3,
        200,
        20,
        |_| 0,
    );
    let best = controller.run();
    assert_eq!(best.non_pseudo_drc_count, 0);
}

/// Universal-repellent congestion stays constant across many evaporation
/// passes, independent of anything else happening in the grid.
#[test]
fn universal_repellent_survives_repeated_evaporation() {
    let mut grid = Grid::new(5, 5, 1).unwrap();
    let repellent = congestion::universal_repellent_id(2, 0);
    grid.cell_mut(Coordinate::new(2, 2, 0))
        .add_congestion(repellent, 0, ShapeType::Trace, 5000, (2, 2, 0))
        .unwrap();
    for _ in 0..10 {
        congestion::evaporate(&mut grid, 25, repellent);
    }
    assert_eq!(
        grid.cell(Coordinate::new(2, 2, 0))
            .congestion_for(repellent, 0, ShapeType::Trace),
        5000
    );
}
