use std::collections::BTreeMap;

use orderplan_model::evaluate::{self, CostBreakdown};
use orderplan_model::extract;
use orderplan_model::{
    FixedOrder, OptimizeError, Optimizer, PriceDistribution, PriceScenarios, PriceTable, ProblemParameters,
    Supplier, Variable,
};

const TOL: f64 = 1e-6;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOL * a.abs().max(b.abs()).max(1.0)
}

/// Two suppliers with different lead times, order costs, and a starting stock
fn two_supplier_problem() -> (ProblemParameters, PriceScenarios) {
    let params = ProblemParameters::new(
        vec![30.0, 25.0, 0.0, 40.0, 35.0],
        vec![Supplier::new("s1", 0, 40.0), Supplier::new("s2", 1, 15.0)],
        vec![vec![60.0, 80.0]; 5],
    )
    .with_cost_rates(2.0, 12.0)
    .with_initial_state(5.0, 0.0);

    let scenarios = PriceScenarios::sample(
        &[
            PriceDistribution::Normal { mean: 10.0, std_dev: 1.0 },
            PriceDistribution::Normal { mean: 8.0, std_dev: 1.5 },
        ],
        5,
        4,
        7,
    )
    .unwrap();

    (params, scenarios)
}

#[test]
fn single_supplier_orders_exactly_demand() {
    let params = ProblemParameters::new(
        vec![10.0, 10.0, 10.0],
        vec![Supplier::new("s1", 0, 0.0)],
        vec![vec![100.0]; 3],
    )
    .with_cost_rates(1.0, 1.0);
    let scenarios = PriceScenarios::new(vec![PriceTable::constant(3, vec![1.0])]).unwrap();

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let matrices = result.order_matrices(&params).unwrap();

    assert!(close(result.objective_value, 30.0), "obj = {}", result.objective_value);
    for t in 0..3 {
        assert!(close(matrices.placed.get(t, "s1").unwrap(), 10.0));
    }

    let costs = CostBreakdown::evaluate(&result, &params, &scenarios).unwrap();
    assert!(costs.holding.abs() < TOL);
    assert!(costs.backlog.abs() < TOL);
    assert!(close(costs.procurement, 30.0));
}

#[test]
fn evaluator_reproduces_objective() {
    let (params, scenarios) = two_supplier_problem();

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let costs = CostBreakdown::evaluate(&result, &params, &scenarios).unwrap();

    assert!(result.proven_optimal);
    assert!(
        close(costs.total(), result.objective_value),
        "evaluated {} vs optimizer {}",
        costs.total(),
        result.objective_value
    );

    // Holding and backlog replayed from orders match the optimizer's own trajectory
    let own = extract::extract_trajectory(&result.entries, params.horizon()).unwrap();
    let (holding, backlog) = evaluate::holding_backlog_cost(&own, params.holding_cost, params.backlog_cost);
    assert!(close(holding + backlog, costs.holding + costs.backlog));
}

#[test]
fn solution_respects_bounds_and_flow_balance() {
    let (params, scenarios) = two_supplier_problem();

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let matrices = result.order_matrices(&params).unwrap();
    let trajectory = extract::extract_trajectory(&result.entries, params.horizon()).unwrap();

    for (t, s, qty) in matrices.placed.cells() {
        assert!(qty >= 0.0);
        assert!(qty <= params.capacity[t][s] + TOL);
    }
    for entry in &result.entries {
        if let Variable::OrderIndicator { .. } = entry.variable {
            assert!(entry.value == 0.0 || entry.value == 1.0);
        }
    }

    let arrived = matrices.arriving.period_totals();
    let mut prev_net = params.initial_inventory - params.initial_backlog;
    for t in 0..params.horizon() {
        let inv = trajectory.inventory[t];
        let back = trajectory.backlog[t];
        assert!(inv >= 0.0 && back >= 0.0);
        assert!(inv.min(back) < TOL, "period {t}: inventory {inv} and backlog {back}");

        let net = inv - back;
        assert!(
            close(net, prev_net + arrived[t] - params.demand[t]),
            "flow balance broken at period {t}"
        );
        prev_net = net;
    }

    // Extracted arrivals agree with shifting the order matrix by lead times
    let shifted = evaluate::arrivals_from_orders(&matrices.placed, &params.suppliers);
    for (t, s, qty) in shifted.cells() {
        assert!(close(qty, matrices.arriving.get_at(t, s)));
    }
}

#[test]
fn fixed_order_override_round_trip() {
    let s2 = Supplier::new("s2", 3, 10.0);
    let params = ProblemParameters::new(
        vec![20.0; 6],
        vec![Supplier::new("s1", 0, 10.0), s2.clone()],
        vec![vec![200.0, 200.0]; 6],
    )
    .with_cost_rates(1.0, 20.0)
    .with_fixed_orders(FixedOrder::from_raw_orders(&s2, &BTreeMap::from([(2, 125.0), (4, 60.0)]), 6));
    let scenarios = PriceScenarios::new(vec![
        PriceTable::constant(6, vec![5.0, 3.0]),
        PriceTable::constant(6, vec![6.0, 4.0]),
    ])
    .unwrap();

    // The period-4 order would arrive after the horizon and is dropped
    assert_eq!(params.fixed_orders.len(), 1);

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let matrices = result.order_matrices(&params).unwrap();

    assert!(close(matrices.placed.get(2, "s2").unwrap(), 125.0));
    assert!(close(matrices.arriving.get(5, "s2").unwrap(), 125.0));

    let costs = CostBreakdown::evaluate(&result, &params, &scenarios).unwrap();
    assert!(close(costs.total(), result.objective_value));
}

#[test]
fn override_above_capacity_is_infeasible() {
    let s2 = Supplier::new("s2", 3, 10.0);
    let mut capacity = vec![vec![200.0, 200.0]; 6];
    capacity[2][1] = 100.0;
    let params = ProblemParameters::new(vec![20.0; 6], vec![Supplier::new("s1", 0, 10.0), s2.clone()], capacity)
        .with_fixed_orders(FixedOrder::from_raw_orders(&s2, &BTreeMap::from([(2, 150.0)]), 6));
    let scenarios = PriceScenarios::new(vec![PriceTable::constant(6, vec![5.0, 3.0])]).unwrap();

    match Optimizer::default().optimize(&params, &scenarios) {
        Err(OptimizeError::Infeasible { violations }) => {
            assert!(
                violations
                    .iter()
                    .any(|v| v.constraint.contains("override[2,s2]") && v.constraint.contains("capacity[2,s2]")),
                "{violations:?}"
            );
        }
        other => panic!("expected infeasible, got {other:?}"),
    }
}

#[test]
fn inconsistent_override_fails_before_solving() {
    let params = ProblemParameters::new(vec![5.0; 3], vec![Supplier::new("s1", 1, 0.0)], vec![vec![10.0]; 3])
        .with_fixed_orders(vec![FixedOrder {
            supplier: "s7".to_string(),
            order_period: 0,
            arrival_period: 1,
            quantity: 5.0,
        }]);
    let scenarios = PriceScenarios::new(vec![PriceTable::constant(3, vec![1.0])]).unwrap();

    assert!(matches!(
        Optimizer::default().optimize(&params, &scenarios),
        Err(OptimizeError::Build(_))
    ));
}

#[test]
fn lead_time_beyond_horizon_never_orders() {
    let params = ProblemParameters::new(
        vec![5.0, 5.0, 5.0],
        vec![Supplier::new("near", 0, 1.0), Supplier::new("far", 3, 0.0)],
        vec![vec![50.0, 50.0]; 3],
    )
    .with_cost_rates(1.0, 10.0);
    // The far supplier is free but can never deliver inside the horizon
    let scenarios = PriceScenarios::new(vec![PriceTable::constant(3, vec![4.0, 0.0])]).unwrap();

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let matrices = result.order_matrices(&params).unwrap();

    assert_eq!(matrices.placed.column("far"), Some(vec![0.0; 3]));
    assert!(close(matrices.placed.column("near").unwrap().iter().sum(), 15.0));
    assert!(close(result.objective_value, 3.0 + 60.0));
}

#[test]
fn zero_demand_periods_hold_inventory() {
    let params = ProblemParameters::new(
        vec![0.0, 0.0, 8.0],
        vec![Supplier::new("s1", 0, 0.0)],
        vec![vec![100.0]; 3],
    )
    .with_cost_rates(0.5, 3.0)
    .with_initial_state(6.0, 0.0);
    let scenarios = PriceScenarios::new(vec![PriceTable::constant(3, vec![2.0])]).unwrap();

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let trajectory = extract::extract_trajectory(&result.entries, 3).unwrap();

    // Starting stock carries through the idle periods, then 2 units are bought
    assert!(close(trajectory.inventory[0], 6.0));
    assert!(close(trajectory.inventory[1], 6.0));
    assert!(close(trajectory.inventory[2], 0.0));
    assert!(close(result.objective_value, 0.5 * 12.0 + 2.0 * 2.0));
}

#[test]
fn scenario_average_error_shrinks_with_sample_size() {
    let params = ProblemParameters::new(
        vec![10.0, 20.0, 30.0],
        vec![Supplier::new("s1", 0, 0.0)],
        vec![vec![1000.0]; 3],
    )
    .with_cost_rates(100.0, 100.0);
    let distribution = [PriceDistribution::Normal { mean: 10.0, std_dev: 2.0 }];

    // Buying demand as it falls due costs 10 * 60 at the mean price
    let population = 10.0 * 60.0;
    let sigma = 2.0 * (10.0_f64.powi(2) + 20.0_f64.powi(2) + 30.0_f64.powi(2)).sqrt();

    let seeds = 0..20_u64;
    let mut mean_error = Vec::new();
    for n in [5, 50] {
        let mut total = 0.0;
        let mut sizes = Vec::new();
        for seed in seeds.clone() {
            let scenarios = PriceScenarios::sample(&distribution, 3, n, seed).unwrap();
            let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
            let error = (result.objective_value - population).abs();

            let envelope = 6.0 * sigma / (n as f64).sqrt();
            assert!(error <= envelope, "N={n}, seed {seed}: error {error} above {envelope}");
            total += error;
            sizes.push(result.entries.len());
        }
        // Order decisions are shared by every scenario, so the model does not grow with N
        assert!(sizes.iter().all(|&len| len == 3 * 4));
        mean_error.push(total / seeds.clone().count() as f64);
    }

    assert!(
        mean_error[1] < mean_error[0],
        "mean error {} at N=50 not below {} at N=5",
        mean_error[1],
        mean_error[0]
    );
}

#[test]
fn unbounded_lead_time_is_excluded() {
    let params = ProblemParameters::new(
        vec![5.0, 5.0, 5.0],
        vec![Supplier::new("near", 0, 1.0), Supplier::new("stalled", usize::MAX, 0.0)],
        vec![vec![50.0, 50.0]; 3],
    )
    .with_cost_rates(1.0, 10.0);
    let scenarios = PriceScenarios::new(vec![PriceTable::constant(3, vec![4.0, 0.0])]).unwrap();

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let matrices = result.order_matrices(&params).unwrap();

    assert_eq!(matrices.placed.column("stalled"), Some(vec![0.0; 3]));
    assert_eq!(matrices.arriving.column("stalled"), Some(vec![0.0; 3]));
    assert!(close(result.objective_value, 3.0 + 60.0));
    assert!(result.entries.iter().all(|e| !e.variable.to_string().contains("stalled")));

    let shifted = evaluate::arrivals_from_orders(&matrices.placed, &params.suppliers);
    assert!(close(shifted.total(), 15.0));
}

#[test]
fn per_scenario_costs_average_to_expected() {
    let (params, scenarios) = two_supplier_problem();

    let result = Optimizer::default().optimize(&params, &scenarios).unwrap();
    let matrices = result.order_matrices(&params).unwrap();

    let each = evaluate::per_scenario_costs(&matrices.placed, &scenarios);
    assert_eq!(each.len(), scenarios.len());
    let mean = each.iter().sum::<f64>() / each.len() as f64;
    assert!(close(mean, evaluate::expected_procurement_cost(&matrices.placed, &scenarios)));
}
