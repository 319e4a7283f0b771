use thiserror::Error;

use crate::solution::ConstraintViolation;

/// Represents a linear program, optionally with binary variables
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Variable names
    pub variables: Vec<String>,
    /// Domain of each variable
    pub kinds: Vec<VariableKind>,
    /// Objective function coefficients (costs)
    pub objective: Objective,
    /// Constraints
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone)]
pub struct Objective {
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Whether to minimize or maximize
    pub minimize: bool,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

/// Non-negative continuous, or restricted to {0, 1}
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableKind {
    #[default]
    Continuous,
    Binary,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("Objective has {found} coefficients but the problem has {expected} variables")]
    ObjectiveLength { expected: usize, found: usize },
    #[error("Constraint {name} has {found} coefficients but the problem has {expected} variables")]
    ConstraintLength {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Non-finite value in {0}")]
    NonFinite(String),
}

impl LpProblem {
    pub fn new(variables: Vec<String>) -> Self {
        let n = variables.len();
        Self {
            variables,
            kinds: vec![VariableKind::Continuous; n],
            objective: Objective {
                coefficients: vec![0.0; n],
                minimize: true,
            },
            constraints: Vec::new(),
        }
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, minimize: bool) {
        self.objective = Objective { coefficients, minimize };
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, coefficients: Vec<f64>, op: ConstraintOp, rhs: f64) {
        self.constraints.push(Constraint {
            name: name.into(),
            coefficients,
            op,
            rhs,
        });
    }

    /// Restrict a variable to {0, 1}. The caller is responsible for the `<= 1` row.
    pub fn set_binary(&mut self, index: usize) {
        self.kinds[index] = VariableKind::Binary;
    }

    pub fn is_binary(&self, index: usize) -> bool {
        self.kinds.get(index) == Some(&VariableKind::Binary)
    }

    pub fn binary_variables(&self) -> Vec<usize> {
        (0..self.num_variables()).filter(|&j| self.is_binary(j)).collect()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Check dimensions and finiteness before handing the problem to a solver
    pub fn check(&self) -> Result<(), ProblemError> {
        let n = self.num_variables();
        if self.objective.coefficients.len() != n {
            return Err(ProblemError::ObjectiveLength {
                expected: n,
                found: self.objective.coefficients.len(),
            });
        }
        if self.objective.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ProblemError::NonFinite("objective".to_string()));
        }
        for c in &self.constraints {
            if c.coefficients.len() != n {
                return Err(ProblemError::ConstraintLength {
                    name: c.name.clone(),
                    expected: n,
                    found: c.coefficients.len(),
                });
            }
            if !c.rhs.is_finite() || c.coefficients.iter().any(|x| !x.is_finite()) {
                return Err(ProblemError::NonFinite(c.name.clone()));
            }
        }
        Ok(())
    }

    /// Evaluate the objective at the given assignment
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .coefficients
            .iter()
            .zip(values)
            .map(|(c, v)| c * v)
            .sum()
    }

    /// Find which constraints are violated by a given assignment, worst first
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in &self.constraints {
            let lhs: f64 = c.coefficients.iter().zip(values).map(|(a, x)| a * x).sum();

            let (violation_amount, description) = match c.op {
                ConstraintOp::Le if lhs > c.rhs + tolerance => {
                    let amt = lhs - c.rhs;
                    (amt, format!("{} exceeds maximum of {:.2} by {:.2}", c.name, c.rhs, amt))
                }
                ConstraintOp::Ge if lhs < c.rhs - tolerance => {
                    let amt = c.rhs - lhs;
                    (amt, format!("{} is below minimum of {:.2} by {:.2}", c.name, c.rhs, amt))
                }
                ConstraintOp::Eq if (lhs - c.rhs).abs() > tolerance => (
                    (lhs - c.rhs).abs(),
                    format!("{} requires exactly {:.2} but got {:.2}", c.name, c.rhs, lhs),
                ),
                _ => continue,
            };

            violations.push(ConstraintViolation {
                constraint: c.name.clone(),
                required: c.rhs,
                actual: lhs,
                violation_amount,
                description,
            });
        }

        for (j, &value) in values.iter().enumerate() {
            if value < -tolerance {
                violations.push(ConstraintViolation {
                    constraint: format!("{}_nonneg", self.variables[j]),
                    required: 0.0,
                    actual: value,
                    violation_amount: -value,
                    description: format!("{} is negative ({:.4})", self.variables[j], value),
                });
            }
            if self.is_binary(j) {
                let distance = value.min((1.0 - value).abs()).abs();
                if distance > tolerance {
                    violations.push(ConstraintViolation {
                        constraint: format!("{}_integrality", self.variables[j]),
                        required: value.round(),
                        actual: value,
                        violation_amount: distance,
                        description: format!("{} must be 0 or 1 but is {:.4}", self.variables[j], value),
                    });
                }
            }
        }

        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        violations
    }
}
