/// The result of solving an LP or mixed-binary problem
#[derive(Debug, Clone)]
pub struct Solution {
    /// Solution status
    pub status: SolutionStatus,
    /// Values for each variable (empty unless a feasible point was found)
    pub values: Vec<f64>,
    /// Objective value of `values`
    pub objective_value: f64,
    /// Relative gap between incumbent and best bound (0 when proven optimal)
    pub gap: f64,
    /// Branch-and-bound nodes explored (1 for a plain LP solve)
    pub nodes: usize,
    /// Constraint violations (populated when infeasible)
    pub violations: Vec<ConstraintViolation>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// An optimal solution was found
    Optimal,
    /// A feasible solution was found but the search budget ran out before optimality was proven
    Feasible,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The problem is unbounded
    Unbounded,
    /// The simplex iteration limit was hit
    IterationLimit,
    /// The node or time budget ran out before any feasible solution was found
    BudgetExhausted,
}

/// Information about a violated constraint
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    /// Constraint name
    pub constraint: String,
    /// Required value (from constraint RHS)
    pub required: f64,
    /// Actual value achieved
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

impl Solution {
    pub fn optimal(values: Vec<f64>, objective_value: f64) -> Self {
        Self {
            status: SolutionStatus::Optimal,
            values,
            objective_value,
            gap: 0.0,
            nodes: 1,
            violations: Vec::new(),
        }
    }

    pub fn infeasible() -> Self {
        Self::without_values(SolutionStatus::Infeasible, f64::INFINITY)
    }

    pub fn infeasible_with_violations(violations: Vec<ConstraintViolation>) -> Self {
        Self {
            violations,
            ..Self::infeasible()
        }
    }

    pub fn unbounded() -> Self {
        Self::without_values(SolutionStatus::Unbounded, f64::NEG_INFINITY)
    }

    pub fn iteration_limit() -> Self {
        Self::without_values(SolutionStatus::IterationLimit, f64::INFINITY)
    }

    pub fn budget_exhausted(nodes: usize) -> Self {
        Self {
            nodes,
            ..Self::without_values(SolutionStatus::BudgetExhausted, f64::INFINITY)
        }
    }

    fn without_values(status: SolutionStatus, objective_value: f64) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value,
            gap: f64::INFINITY,
            nodes: 1,
            violations: Vec::new(),
        }
    }

    /// Whether `values` holds a usable assignment
    pub fn has_values(&self) -> bool {
        matches!(self.status, SolutionStatus::Optimal | SolutionStatus::Feasible)
    }
}
