use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::problem::{ConstraintOp, LpProblem};
use crate::simplex::Solver;
use crate::solution::{Solution, SolutionStatus};

/// Search budget and tolerances for branch and bound
#[derive(Debug, Clone)]
pub struct MipOptions {
    /// Wall-clock budget for the whole search
    pub time_limit: Duration,
    /// Maximum number of relaxations solved
    pub max_nodes: usize,
    /// Nodes that cannot beat the incumbent by this relative margin are pruned
    pub relative_gap: f64,
    /// Distance from 0 or 1 below which a binary counts as integral
    pub integrality_tolerance: f64,
}

impl Default for MipOptions {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(60),
            max_nodes: 100_000,
            relative_gap: 1e-6,
            integrality_tolerance: 1e-6,
        }
    }
}

impl MipOptions {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
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
}

/// Depth-first branch and bound over the binary variables of an `LpProblem`
#[derive(Debug, Clone, Default)]
pub struct MipSolver {
    options: MipOptions,
    lp: Solver,
}

struct Node {
    fixings: Vec<(usize, f64)>,
    /// Parent relaxation objective, in minimization sense
    bound: f64,
}

impl MipSolver {
    pub fn new(options: MipOptions) -> Self {
        Self {
            options,
            lp: Solver::new(),
        }
    }

    pub fn with_lp_solver(mut self, lp: Solver) -> Self {
        self.lp = lp;
        self
    }

    pub fn solve(&self, problem: &LpProblem) -> Solution {
        let start = Instant::now();
        let binaries = problem.binary_variables();

        let root = self.lp.solve(problem);
        if root.status != SolutionStatus::Optimal || binaries.is_empty() {
            return root;
        }

        // Work in minimization terms throughout
        let sense = if problem.objective.minimize { 1.0 } else { -1.0 };
        let mut incumbent: Option<(Vec<f64>, f64)> = None;
        let mut stack = vec![Node {
            fixings: Vec::new(),
            bound: sense * root.objective_value,
        }];
        let mut nodes = 0;

        debug!(
            "branch and bound: {} variables, {} binaries, {} constraints, root bound {:.6}",
            problem.num_variables(),
            binaries.len(),
            problem.num_constraints(),
            root.objective_value
        );

        while let Some(node) = stack.pop() {
            if nodes >= self.options.max_nodes || start.elapsed() >= self.options.time_limit {
                stack.push(node);
                break;
            }
            if let Some((_, best)) = &incumbent {
                if !self.can_improve(node.bound, *best) {
                    continue;
                }
            }
            nodes += 1;

            let relaxation = if node.fixings.is_empty() {
                root.clone()
            } else {
                self.lp.solve(&with_fixings(problem, &node.fixings))
            };

            match relaxation.status {
                SolutionStatus::Optimal => {}
                SolutionStatus::Infeasible => continue,
                SolutionStatus::Unbounded => return Solution::unbounded(),
                _ => return Solution::iteration_limit(),
            }

            let bound = sense * relaxation.objective_value;
            if let Some((_, best)) = &incumbent {
                if !self.can_improve(bound, *best) {
                    continue;
                }
            }

            match self.most_fractional(&relaxation.values, &binaries) {
                None => {
                    let mut values = relaxation.values;
                    for &j in &binaries {
                        values[j] = values[j].round();
                    }
                    let objective = sense * problem.objective_value(&values);
                    debug!("node {nodes}: new incumbent {:.6}", sense * objective);
                    incumbent = Some((values, objective));
                }
                Some(j) => {
                    let value = relaxation.values[j];
                    let (near, far) = if value >= 0.5 { (1.0, 0.0) } else { (0.0, 1.0) };
                    for fixed in [far, near] {
                        let mut fixings = node.fixings.clone();
                        fixings.push((j, fixed));
                        stack.push(Node { fixings, bound });
                    }
                }
            }
        }

        let exhausted = !stack.is_empty();
        match incumbent {
            Some((values, objective)) => {
                let gap = if exhausted {
                    let lower = stack.iter().map(|n| n.bound).fold(objective, f64::min);
                    (objective - lower).max(0.0) / objective.abs().max(1.0)
                } else {
                    0.0
                };
                let status = if exhausted {
                    warn!("search budget exhausted after {nodes} nodes; relative gap {gap:.3e}");
                    SolutionStatus::Feasible
                } else {
                    SolutionStatus::Optimal
                };
                Solution {
                    status,
                    values,
                    objective_value: sense * objective,
                    gap,
                    nodes,
                    violations: Vec::new(),
                }
            }
            None if exhausted => {
                warn!("search budget exhausted after {nodes} nodes without a feasible solution");
                Solution::budget_exhausted(nodes)
            }
            None => Solution {
                nodes,
                ..Solution::infeasible()
            },
        }
    }

    /// Whether a node with this bound could beat the incumbent by more than the gap
    fn can_improve(&self, bound: f64, incumbent: f64) -> bool {
        bound < incumbent - self.options.relative_gap * incumbent.abs().max(1.0)
    }

    fn most_fractional(&self, values: &[f64], binaries: &[usize]) -> Option<usize> {
        binaries
            .iter()
            .map(|&j| (j, (values[j] - values[j].round()).abs()))
            .filter(|&(_, frac)| frac > self.options.integrality_tolerance)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(j, _)| j)
    }
}

fn with_fixings(problem: &LpProblem, fixings: &[(usize, f64)]) -> LpProblem {
    let mut fixed = problem.clone();
    for &(j, value) in fixings {
        let mut coefficients = vec![0.0; problem.num_variables()];
        coefficients[j] = 1.0;
        fixed.add_constraint(format!("branch[{}]", problem.variables[j]), coefficients, ConstraintOp::Eq, value);
    }
    fixed
}
