use log::debug;
use orderplan_solver::{ConstraintOp, LpProblem};
use thiserror::Error;

use crate::params::{ProblemParameters, ValidationError};
use crate::scenarios::PriceScenarios;
use crate::variables::{ResultEntry, Variable};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error(transparent)]
    Parameters(#[from] ValidationError),
    #[error(
        "Price scenarios cover {found_periods} periods x {found_suppliers} suppliers but the problem has {periods} x {suppliers}"
    )]
    ScenarioShape {
        periods: usize,
        suppliers: usize,
        found_periods: usize,
        found_suppliers: usize,
    },
}

/// The SAA mixed-binary program for one set of parameters and price scenarios,
/// together with the meaning of every column
#[derive(Debug, Clone)]
pub struct ProcurementModel {
    pub lp_problem: LpProblem,
    pub variables: Vec<Variable>,
    /// Column of `order_quantity[t, s]`, `None` when an order could not arrive in the horizon
    order_columns: Vec<Vec<Option<usize>>>,
    indicator_columns: Vec<Vec<Option<usize>>>,
    inventory_columns: Vec<usize>,
    backlog_columns: Vec<usize>,
}

impl ProcurementModel {
    /// Lay out the variables and constraints. Order quantities and indicators are
    /// first-stage: one column per (period, supplier), shared by every scenario.
    pub fn build(params: &ProblemParameters, scenarios: &PriceScenarios) -> Result<Self, BuildError> {
        params.validate()?;

        let horizon = params.horizon();
        let n_suppliers = params.num_suppliers();
        if scenarios.horizon() != horizon || scenarios.num_suppliers() != n_suppliers {
            return Err(BuildError::ScenarioShape {
                periods: horizon,
                suppliers: n_suppliers,
                found_periods: scenarios.horizon(),
                found_suppliers: scenarios.num_suppliers(),
            });
        }

        let mut variables = Vec::new();
        let mut order_columns = vec![vec![None; n_suppliers]; horizon];
        let mut indicator_columns = vec![vec![None; n_suppliers]; horizon];

        for (t, row) in order_columns.iter_mut().enumerate() {
            for (s, supplier) in params.suppliers.iter().enumerate() {
                if params.arrives_in_horizon(t, s) {
                    row[s] = Some(variables.len());
                    variables.push(Variable::OrderQuantity {
                        period: t,
                        supplier: supplier.id.clone(),
                    });
                }
            }
        }
        for (t, row) in indicator_columns.iter_mut().enumerate() {
            for (s, supplier) in params.suppliers.iter().enumerate() {
                let Some(arrival) = supplier.arrival(t).filter(|&a| a < horizon) else {
                    continue;
                };
                row[s] = Some(variables.len());
                variables.push(Variable::OrderIndicator {
                    period: t,
                    supplier: supplier.id.clone(),
                    arrival,
                });
            }
        }
        let inventory_columns: Vec<usize> = (0..horizon)
            .map(|t| {
                variables.push(Variable::Inventory { period: t });
                variables.len() - 1
            })
            .collect();
        let backlog_columns: Vec<usize> = (0..horizon)
            .map(|t| {
                variables.push(Variable::Backlog { period: t });
                variables.len() - 1
            })
            .collect();

        let mut model = Self {
            lp_problem: LpProblem::new(variables.iter().map(ToString::to_string).collect()),
            variables,
            order_columns,
            indicator_columns,
            inventory_columns,
            backlog_columns,
        };
        for (_, _, y) in model.order_pairs() {
            model.lp_problem.set_binary(y);
        }

        model.set_objective(params, scenarios);
        model.add_order_constraints(params);
        model.add_balance_constraints(params);
        model.add_fixed_orders(params);

        debug!(
            "built model: {} periods, {} suppliers, {} scenarios, {} variables ({} binary), {} constraints",
            horizon,
            n_suppliers,
            scenarios.len(),
            model.lp_problem.num_variables(),
            model.lp_problem.binary_variables().len(),
            model.lp_problem.num_constraints()
        );

        Ok(model)
    }

    /// Active (order column, indicator column) pairs with their (period, supplier)
    fn order_pairs(&self) -> Vec<((usize, usize), usize, usize)> {
        let mut pairs = Vec::new();
        for (t, (orders, indicators)) in self.order_columns.iter().zip(&self.indicator_columns).enumerate() {
            for (s, (q, y)) in orders.iter().zip(indicators).enumerate() {
                if let (Some(q), Some(y)) = (q, y) {
                    pairs.push(((t, s), *q, *y));
                }
            }
        }
        pairs
    }

    fn row(&self, terms: &[(usize, f64)]) -> Vec<f64> {
        let mut coefficients = vec![0.0; self.lp_problem.num_variables()];
        for &(j, coef) in terms {
            coefficients[j] += coef;
        }
        coefficients
    }

    /// Average procurement spend over the scenarios, plus fixed order, holding, and backlog costs
    fn set_objective(&mut self, params: &ProblemParameters, scenarios: &PriceScenarios) {
        let mut coefficients = vec![0.0; self.lp_problem.num_variables()];
        let pairs = self.order_pairs();

        // Sum each scenario's linear spend expression, then average
        let mut spend = vec![0.0; coefficients.len()];
        for table in scenarios.tables() {
            for &((t, s), q, _) in &pairs {
                spend[q] += table.price(t, s);
            }
        }
        let n = scenarios.len() as f64;
        for (c, total) in coefficients.iter_mut().zip(spend) {
            *c += total / n;
        }

        for &((_, s), _, y) in &pairs {
            coefficients[y] = params.suppliers[s].order_cost;
        }
        for t in 0..params.horizon() {
            coefficients[self.inventory_columns[t]] = params.holding_cost;
            coefficients[self.backlog_columns[t]] = params.backlog_cost;
        }

        self.lp_problem.set_objective(coefficients, true);
    }

    fn add_order_constraints(&mut self, params: &ProblemParameters) {
        for ((t, s), q, y) in self.order_pairs() {
            let supplier = &params.suppliers[s];
            let capacity = params.capacity[t][s];
            let Variable::OrderIndicator { arrival, .. } = self.variables[y] else {
                continue;
            };

            let row = self.row(&[(q, 1.0)]);
            self.lp_problem
                .add_constraint(format!("capacity[{t},{}]", supplier.id), row, ConstraintOp::Le, capacity);

            // Any positive quantity forces the indicator on
            let row = self.row(&[(q, 1.0), (y, -capacity)]);
            self.lp_problem
                .add_constraint(format!("link[{t},{},{arrival}]", supplier.id), row, ConstraintOp::Le, 0.0);

            let row = self.row(&[(y, 1.0)]);
            self.lp_problem.add_constraint(
                format!("indicator_bound[{t},{},{arrival}]", supplier.id),
                row,
                ConstraintOp::Le,
                1.0,
            );
        }
    }

    /// inventory[t] - backlog[t] = inventory[t-1] - backlog[t-1] + arriving[t] - demand[t]
    fn add_balance_constraints(&mut self, params: &ProblemParameters) {
        for t in 0..params.horizon() {
            let mut terms = vec![(self.inventory_columns[t], 1.0), (self.backlog_columns[t], -1.0)];
            for (s, supplier) in params.suppliers.iter().enumerate() {
                // Source periods before the horizon contribute nothing
                let Some(source) = t.checked_sub(supplier.lead_time) else {
                    continue;
                };
                if let Some(q) = self.order_columns[source][s] {
                    terms.push((q, -1.0));
                }
            }

            let rhs = if t == 0 {
                params.initial_inventory - params.initial_backlog - params.demand[0]
            } else {
                terms.push((self.inventory_columns[t - 1], -1.0));
                terms.push((self.backlog_columns[t - 1], 1.0));
                -params.demand[t]
            };

            let row = self.row(&terms);
            self.lp_problem
                .add_constraint(format!("balance[{t}]"), row, ConstraintOp::Eq, rhs);
        }
    }

    fn add_fixed_orders(&mut self, params: &ProblemParameters) {
        for order in &params.fixed_orders {
            let Some(s) = params.supplier_index(&order.supplier) else {
                continue;
            };
            // Validation guarantees the arrival is inside the horizon
            let Some(q) = self.order_columns[order.order_period][s] else {
                continue;
            };
            let row = self.row(&[(q, 1.0)]);
            self.lp_problem.add_constraint(
                format!("override[{},{}]", order.order_period, order.supplier),
                row,
                ConstraintOp::Eq,
                order.quantity,
            );
        }
    }

    /// Pair every column with its solved value, cleaning solver noise around zero
    pub fn entries(&self, values: &[f64]) -> Vec<ResultEntry> {
        self.variables
            .iter()
            .zip(values)
            .map(|(variable, &value)| ResultEntry {
                variable: variable.clone(),
                value: if value.abs() < 1e-9 { 0.0 } else { value },
            })
            .collect()
    }

    pub fn order_column(&self, period: usize, supplier: usize) -> Option<usize> {
        self.order_columns.get(period)?.get(supplier).copied().flatten()
    }

    pub fn horizon(&self) -> usize {
        self.inventory_columns.len()
    }

    pub fn inventory_column(&self, period: usize) -> usize {
        self.inventory_columns[period]
    }

    pub fn backlog_column(&self, period: usize) -> usize {
        self.backlog_columns[period]
    }
}
