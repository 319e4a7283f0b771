//! Independent re-simulation of plan costs.
//!
//! Nothing here consults the solver: the inventory recursion is replayed from the
//! order matrices, so agreement with the optimizer's objective validates the model.

use crate::extract::{self, ExtractError};
use crate::matrix::PeriodSupplierMatrix;
use crate::optimizer::OptimizerResult;
use crate::params::{ProblemParameters, Supplier};
use crate::scenarios::{PriceScenarios, PriceTable};
use crate::variables::{ResultEntry, Variable};

/// End-of-period inventory and backlog
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub inventory: Vec<f64>,
    pub backlog: Vec<f64>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub fixed: f64,
    /// Procurement spend averaged over the scenarios
    pub procurement: f64,
    pub holding: f64,
    pub backlog: f64,
}

/// Sum of order costs over every indicator entry with a positive value
pub fn fixed_order_cost(entries: &[ResultEntry], suppliers: &[Supplier]) -> Result<f64, ExtractError> {
    let mut total = 0.0;
    for entry in entries {
        if let Variable::OrderIndicator { supplier, .. } = &entry.variable {
            if entry.value > 0.0 {
                let cost = suppliers
                    .iter()
                    .find(|s| &s.id == supplier)
                    .map(|s| s.order_cost)
                    .ok_or_else(|| ExtractError::UnknownSupplier(entry.variable.to_string()))?;
                total += cost * entry.value;
            }
        }
    }
    Ok(total)
}

/// Procurement spend of an order matrix under one price scenario
pub fn procurement_cost(placed: &PeriodSupplierMatrix, prices: &PriceTable) -> f64 {
    placed
        .cells()
        .map(|(t, s, qty)| qty * prices.price(t, s))
        .sum()
}

/// Procurement spend under each scenario individually
pub fn per_scenario_costs(placed: &PeriodSupplierMatrix, scenarios: &PriceScenarios) -> Vec<f64> {
    scenarios
        .tables()
        .iter()
        .map(|table| procurement_cost(placed, table))
        .collect()
}

pub fn expected_procurement_cost(placed: &PeriodSupplierMatrix, scenarios: &PriceScenarios) -> f64 {
    let costs = per_scenario_costs(placed, scenarios);
    costs.iter().sum::<f64>() / costs.len() as f64
}

/// Shift each supplier's orders forward by its lead time, dropping arrivals past the horizon
pub fn arrivals_from_orders(placed: &PeriodSupplierMatrix, suppliers: &[Supplier]) -> PeriodSupplierMatrix {
    let horizon = placed.horizon();
    let mut arriving = PeriodSupplierMatrix::zeros(placed.suppliers().to_vec(), horizon);
    for (t, s, qty) in placed.cells() {
        if let Some(arrival) = suppliers[s].arrival(t).filter(|&a| a < horizon) {
            arriving.add(arrival, s, qty);
        }
    }
    arriving
}

/// Replay `net[t] = net[t-1] + arriving[t] - demand[t]`, splitting the net
/// position into inventory (positive part) and backlog (negative part)
pub fn simulate_inventory(
    arriving: &PeriodSupplierMatrix,
    demand: &[f64],
    initial_inventory: f64,
    initial_backlog: f64,
) -> Trajectory {
    let mut net = initial_inventory - initial_backlog;
    let mut inventory = Vec::with_capacity(demand.len());
    let mut backlog = Vec::with_capacity(demand.len());

    for (received, &d) in arriving.period_totals().into_iter().zip(demand) {
        net += received - d;
        inventory.push(net.max(0.0));
        backlog.push((-net).max(0.0));
    }

    Trajectory { inventory, backlog }
}

/// (holding cost, backlog cost) of a trajectory
pub fn holding_backlog_cost(trajectory: &Trajectory, holding_cost: f64, backlog_cost: f64) -> (f64, f64) {
    (
        holding_cost * trajectory.inventory.iter().sum::<f64>(),
        backlog_cost * trajectory.backlog.iter().sum::<f64>(),
    )
}

impl CostBreakdown {
    /// Re-derive every cost component of an optimizer result from its extracted orders
    pub fn evaluate(
        result: &OptimizerResult,
        params: &ProblemParameters,
        scenarios: &PriceScenarios,
    ) -> Result<Self, ExtractError> {
        Self::from_entries(&result.entries, params, scenarios)
    }

    /// Cost a plan given as result entries, whichever solver produced them
    pub fn from_entries(
        entries: &[ResultEntry],
        params: &ProblemParameters,
        scenarios: &PriceScenarios,
    ) -> Result<Self, ExtractError> {
        let matrices = extract::extract_order_matrices(entries, &params.suppliers, params.horizon())?;
        let trajectory = simulate_inventory(
            &matrices.arriving,
            &params.demand,
            params.initial_inventory,
            params.initial_backlog,
        );
        let (holding, backlog) = holding_backlog_cost(&trajectory, params.holding_cost, params.backlog_cost);

        Ok(Self {
            fixed: fixed_order_cost(entries, &params.suppliers)?,
            procurement: expected_procurement_cost(&matrices.placed, scenarios),
            holding,
            backlog,
        })
    }

    pub fn total(&self) -> f64 {
        self.fixed + self.procurement + self.holding + self.backlog
    }
}
