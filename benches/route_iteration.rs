use criterion::{black_box, criterion_group, criterion_main, Criterion};

use acorn::context::RouterContext;
use acorn::controller::{Controller, RoutablePath};
use acorn::design_rules::{build_interaction_tables, DesignRuleSet, DesignRuleSubset, DirectionMask};
use acorn::geometry::{Coordinate, NUM_SHAPE_TYPES};
use acorn::grid::Grid;
use acorn::pathfinder::{CostModel, SubsetCosts};

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

fn build_controller(width: u16, height: u16, num_nets: u16) -> Controller {
    let mut grid = Grid::new(width, height, 1).unwrap();
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

    let mut paths = Vec::new();
    for n in 0..num_nets {
        let y = 1 + n % (height - 2);
        paths.push(RoutablePath {
            path: n as u32,
            subset: 0,
            start: Coordinate::new(1, y, 0),
            end: Coordinate::new(width - 2, y, 0),
            is_pseudo: false,
            diff_pair: None,
        });
    }

    let ctx = RouterContext::new(num_cpus::get()).unwrap();
    Controller::new(
        grid,
        tables,
        sets,
        cost_model,
        subset_costs,
        paths,
        ctx,
        10,
        2,
        5,
        30,
        20,
        |_| 0,
    )
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_iteration");
    group.sample_size(10);
    group.bench_function("40x40 grid, 8 nets, 30-iteration budget", |b| {
        b.iter(|| {
            let mut controller = build_controller(40, 40, 8);
            black_box(controller.run())
        })
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
