mod branch;
mod problem;
mod simplex;
mod solution;

pub use branch::{MipOptions, MipSolver};
pub use problem::{Constraint, ConstraintOp, LpProblem, Objective, ProblemError, VariableKind};
pub use simplex::Solver;
pub use solution::{ConstraintViolation, Solution, SolutionStatus};
