use std::time::{Duration, Instant};

use log::{debug, info, warn};
use orderplan_solver::{ConstraintOp, ConstraintViolation, MipOptions, MipSolver, ProblemError, SolutionStatus, Solver};
use thiserror::Error;

use crate::builder::{BuildError, ProcurementModel};
use crate::extract::{self, ExtractError, OrderMatrices};
use crate::params::ProblemParameters;
use crate::scenarios::PriceScenarios;
use crate::variables::ResultEntry;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Invalid solver configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("Malformed model: {0}")]
    Problem(#[from] ProblemError),
    #[error("Problem is infeasible{}", describe_violations(.violations))]
    Infeasible { violations: Vec<ConstraintViolation> },
    #[error("Problem is unbounded")]
    Unbounded,
    #[error("Simplex iteration limit reached")]
    IterationLimit,
    #[error("Search budget exhausted after {nodes} nodes without a feasible plan")]
    BudgetExhausted { nodes: usize },
}

fn describe_violations(violations: &[ConstraintViolation]) -> String {
    if violations.is_empty() {
        return String::new();
    }
    let details: Vec<&str> = violations.iter().map(|v| v.description.as_str()).collect();
    format!(": {}", details.join("; "))
}

/// Solver budget and tolerances. The time limit is always finite.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Wall-clock budget for branch and bound, in seconds
    pub time_limit_secs: f64,
    /// Maximum branch-and-bound nodes
    pub max_nodes: usize,
    /// Relative optimality gap at which the search stops
    pub relative_gap: f64,
    /// Simplex pivots per relaxation
    pub max_iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 60.0,
            max_nodes: 100_000,
            relative_gap: 1e-6,
            max_iterations: 50_000,
        }
    }
}

impl OptimizerConfig {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_secs = limit.as_secs_f64();
        self
    }

    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }

    pub fn with_relative_gap(mut self, gap: f64) -> Self {
        self.relative_gap = gap;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// The wall-clock budget as a `Duration`
    pub fn time_limit(&self) -> Result<Duration, OptimizeError> {
        Duration::try_from_secs_f64(self.time_limit_secs).map_err(|e| {
            OptimizeError::Config(format!("time limit of {} seconds is not usable: {e}", self.time_limit_secs))
        })
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        self.time_limit()?;
        if !self.relative_gap.is_finite() || self.relative_gap < 0.0 {
            return Err(OptimizeError::Config(format!(
                "relative gap must be non-negative, got {}",
                self.relative_gap
            )));
        }
        if self.max_iterations == 0 {
            return Err(OptimizeError::Config("max_iterations must be positive".to_string()));
        }
        Ok(())
    }

    fn mip_options(&self) -> Result<MipOptions, OptimizeError> {
        Ok(MipOptions::default()
            .with_time_limit(self.time_limit()?)
            .with_max_nodes(self.max_nodes)
            .with_relative_gap(self.relative_gap))
    }
}

/// Objective value and the full result listing of one solve
#[derive(Debug, Clone)]
pub struct OptimizerResult {
    pub objective_value: f64,
    pub entries: Vec<ResultEntry>,
    /// False when the search budget ran out before optimality was proven
    pub proven_optimal: bool,
    /// Remaining relative gap (0 when proven optimal)
    pub gap: f64,
    pub nodes: usize,
}

impl OptimizerResult {
    /// The flat `name = value` listing
    pub fn listing(&self) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .map(|e| (e.variable.to_string(), e.value))
            .collect()
    }

    pub fn order_matrices(&self, params: &ProblemParameters) -> Result<OrderMatrices, ExtractError> {
        extract::extract_order_matrices(&self.entries, &params.suppliers, params.horizon())
    }
}

/// Builds and solves the scenario-averaged procurement program
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Solve once, open-loop, over the whole horizon
    pub fn optimize(
        &self,
        params: &ProblemParameters,
        scenarios: &PriceScenarios,
    ) -> Result<OptimizerResult, OptimizeError> {
        self.config.validate()?;
        let model = ProcurementModel::build(params, scenarios)?;
        model.lp_problem.check()?;

        info!(
            "optimizing {} periods x {} suppliers over {} price scenarios",
            params.horizon(),
            params.num_suppliers(),
            scenarios.len()
        );

        let start = Instant::now();
        let options = self.config.mip_options()?;
        let lp = Solver::new().with_max_iterations(self.config.max_iterations);
        let feasibility = lp.feasibility_tolerance();
        let solution = MipSolver::new(options.clone())
            .with_lp_solver(lp.clone())
            .solve(&model.lp_problem);

        match solution.status {
            SolutionStatus::Optimal | SolutionStatus::Feasible => {}
            SolutionStatus::Infeasible => {
                return Err(OptimizeError::Infeasible {
                    violations: solution.violations,
                });
            }
            SolutionStatus::Unbounded => return Err(OptimizeError::Unbounded),
            SolutionStatus::IterationLimit => return Err(OptimizeError::IterationLimit),
            SolutionStatus::BudgetExhausted => {
                return Err(OptimizeError::BudgetExhausted { nodes: solution.nodes });
            }
        }

        let remaining = options.time_limit.saturating_sub(start.elapsed());
        let values = settle_ties(
            &model,
            options.with_time_limit(remaining),
            lp,
            &solution.values,
            solution.objective_value,
        );
        let objective_value = model.lp_problem.objective_value(&values);

        let residual = model.lp_problem.violations(&values, feasibility * 1e3);
        if let Some(worst) = residual.first() {
            warn!("solution residual above tolerance: {}", worst.description);
        }

        let proven_optimal = solution.status == SolutionStatus::Optimal;
        info!(
            "objective {:.6} after {} nodes{}",
            objective_value,
            solution.nodes,
            if proven_optimal {
                String::new()
            } else {
                format!(" (gap {:.3e})", solution.gap)
            }
        );

        Ok(OptimizerResult {
            objective_value,
            entries: model.entries(&values),
            proven_optimal,
            gap: solution.gap,
            nodes: solution.nodes,
        })
    }
}

/// Among plans costing no more than `objective` (up to rounding), the one
/// carrying the least total backlog. Keeps `values` if the search does not finish.
fn settle_ties(model: &ProcurementModel, options: MipOptions, lp: Solver, values: &[f64], objective: f64) -> Vec<f64> {
    let mut problem = model.lp_problem.clone();
    let cap = objective + lp.feasibility_tolerance() * objective.abs().max(1.0);
    problem.add_constraint(
        "objective_cap",
        problem.objective.coefficients.clone(),
        ConstraintOp::Le,
        cap,
    );

    let mut backlog = vec![0.0; problem.num_variables()];
    for t in 0..model.horizon() {
        backlog[model.backlog_column(t)] = 1.0;
    }
    problem.set_objective(backlog, true);

    let settled = MipSolver::new(options).with_lp_solver(lp).solve(&problem);
    match settled.status {
        SolutionStatus::Optimal | SolutionStatus::Feasible => settled.values,
        status => {
            debug!("tie-break search ended with {status:?}, keeping the first plan");
            values.to_vec()
        }
    }
}
