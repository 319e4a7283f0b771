use std::collections::BTreeMap;

use log::trace;

use crate::problem::{Constraint, ConstraintOp, LpProblem};
use crate::solution::{ConstraintViolation, Solution};

/// Consecutive degenerate pivots tolerated before switching to Bland's rule
const DEGENERATE_STREAK_LIMIT: usize = 32;

/// Simplex solver for linear programming problems
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum pivots per phase before giving up
    max_iterations: usize,
    /// Tolerance for pivot selection
    tolerance: f64,
    /// Largest artificial residue accepted as feasible
    feasibility_tolerance: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 50_000,
            tolerance: 1e-9,
            feasibility_tolerance: 1e-7,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn feasibility_tolerance(&self) -> f64 {
        self.feasibility_tolerance
    }

    /// Solve the LP relaxation using the two-phase simplex method.
    /// Binary markers are ignored here; see `MipSolver`.
    pub fn solve(&self, problem: &LpProblem) -> Solution {
        let mut tableau = Tableau::build(problem);

        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau) {
                PhaseResult::Optimal => {}
                PhaseResult::Infeasible | PhaseResult::Unbounded => {
                    return self.analyze_conflicts(problem);
                }
                PhaseResult::IterationLimit => return Solution::iteration_limit(),
            }
        }

        match self.phase2(&mut tableau) {
            PhaseResult::Optimal => {}
            PhaseResult::Unbounded => return Solution::unbounded(),
            PhaseResult::Infeasible => return self.analyze_conflicts(problem),
            PhaseResult::IterationLimit => return Solution::iteration_limit(),
        }

        let values = tableau.values(self.tolerance);
        let objective_value = problem.objective_value(&values);
        Solution::optimal(values, objective_value)
    }

    fn phase1(&self, tableau: &mut Tableau) -> PhaseResult {
        let obj_row = tableau.obj_row();
        let n_cols = tableau.n_cols();
        let art_start = tableau.art_start();

        let orig_obj = std::mem::replace(&mut tableau.data[obj_row], vec![0.0; n_cols]);

        // Maximize -sum(artificials)
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[obj_row][j] = -1.0;
        }
        // Price out the basic artificials
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[obj_row][j] += tableau.data[i][j];
                }
            }
        }

        match self.iterate(tableau, n_cols - 1) {
            PhaseResult::Optimal => {}
            PhaseResult::Unbounded => return PhaseResult::Infeasible,
            other => return other,
        }

        let rhs_col = n_cols - 1;
        let scale = tableau.rhs_scale();
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start
                && tableau.data[i][rhs_col] > self.feasibility_tolerance * scale
            {
                return PhaseResult::Infeasible;
            }
        }

        self.drive_out_artificials(tableau);

        tableau.data[obj_row] = orig_obj;
        for i in 0..obj_row {
            let basic = tableau.basic_vars[i];
            let ratio = tableau.data[obj_row][basic];
            if ratio.abs() > self.tolerance {
                for j in 0..n_cols {
                    tableau.data[obj_row][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        PhaseResult::Optimal
    }

    /// Pivot zero-level artificials out of the basis so phase 2 cannot raise them.
    /// Rows without any structural or slack entry are redundant and left alone.
    fn drive_out_artificials(&self, tableau: &mut Tableau) {
        let art_start = tableau.art_start();
        let rhs_col = tableau.n_cols() - 1;

        for i in 0..tableau.obj_row() {
            if tableau.basic_vars[i] < art_start {
                continue;
            }
            tableau.data[i][rhs_col] = 0.0;

            let candidate = (0..art_start)
                .filter(|&j| tableau.data[i][j].abs() > self.tolerance)
                .max_by(|&a, &b| tableau.data[i][a].abs().total_cmp(&tableau.data[i][b].abs()));
            if let Some(col) = candidate {
                tableau.pivot(i, col);
            }
        }
    }

    fn phase2(&self, tableau: &mut Tableau) -> PhaseResult {
        // Artificial columns never re-enter
        let limit = tableau.art_start();
        self.iterate(tableau, limit)
    }

    /// Run pivots on columns `0..col_limit` until no column improves the objective
    fn iterate(&self, tableau: &mut Tableau, col_limit: usize) -> PhaseResult {
        let mut degenerate_streak = 0;

        for _ in 0..self.max_iterations {
            let bland = degenerate_streak >= DEGENERATE_STREAK_LIMIT;
            let Some(pivot_col) = self.find_pivot_column(tableau, col_limit, bland) else {
                return PhaseResult::Optimal;
            };
            let Some((pivot_row, ratio)) = self.find_pivot_row(tableau, pivot_col) else {
                return PhaseResult::Unbounded;
            };

            if ratio <= self.tolerance {
                degenerate_streak += 1;
            } else {
                degenerate_streak = 0;
            }
            trace!("pivot row={pivot_row} col={pivot_col} ratio={ratio:.3e} bland={bland}");
            tableau.pivot(pivot_row, pivot_col);
        }

        PhaseResult::IterationLimit
    }

    /// Most positive reduced gain, or the lowest-index positive one under Bland's rule
    fn find_pivot_column(&self, tableau: &Tableau, col_limit: usize, bland: bool) -> Option<usize> {
        let obj = &tableau.data[tableau.obj_row()];

        if bland {
            return (0..col_limit).find(|&j| obj[j] > self.tolerance);
        }

        let mut max_val = self.tolerance;
        let mut max_col = None;
        for (j, &val) in obj.iter().enumerate().take(col_limit) {
            if val > max_val {
                max_val = val;
                max_col = Some(j);
            }
        }
        max_col
    }

    /// Minimum ratio test; ties go to the lowest basic variable index
    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<(usize, f64)> {
        let rhs_col = tableau.n_cols() - 1;

        let mut best: Option<(usize, f64)> = None;
        for i in 0..tableau.obj_row() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = (tableau.data[i][rhs_col] / val).max(0.0);
            best = match best {
                None => Some((i, ratio)),
                Some((row, min_ratio)) => {
                    if ratio < min_ratio - self.tolerance
                        || ((ratio - min_ratio).abs() <= self.tolerance
                            && tableau.basic_vars[i] < tableau.basic_vars[row])
                    {
                        Some((i, ratio))
                    } else {
                        Some((row, min_ratio))
                    }
                }
            };
        }
        best
    }

    /// Explain an infeasible problem by finding constraints over the same expression
    /// whose bounds contradict each other
    fn analyze_conflicts(&self, problem: &LpProblem) -> Solution {
        let mut groups: BTreeMap<Vec<i64>, Vec<(ConstraintOp, f64, &Constraint)>> = BTreeMap::new();

        for c in &problem.constraints {
            let Some(&lead) = c.coefficients.iter().find(|x| x.abs() > self.tolerance) else {
                if !op_holds(c.op, 0.0, c.rhs, self.feasibility_tolerance) {
                    return Solution::infeasible_with_violations(vec![ConstraintViolation {
                        constraint: c.name.clone(),
                        required: c.rhs,
                        actual: 0.0,
                        violation_amount: (c.rhs).abs(),
                        description: format!("{} has no variables but requires {:.2}", c.name, c.rhs),
                    }]);
                }
                continue;
            };
            // Normalise by the leading coefficient so scaled copies share a key
            let key: Vec<i64> = c
                .coefficients
                .iter()
                .map(|&x| ((x / lead) * 1e9).round() as i64)
                .collect();
            let op = if lead < 0.0 { flip(c.op) } else { c.op };
            groups.entry(key).or_default().push((op, c.rhs / lead, c));
        }

        let mut violations = Vec::new();
        for constraints in groups.values() {
            let mut min_bound: Option<(f64, &Constraint)> = None;
            let mut max_bound: Option<(f64, &Constraint)> = None;

            for &(op, rhs, c) in constraints {
                if matches!(op, ConstraintOp::Ge | ConstraintOp::Eq)
                    && min_bound.is_none_or(|(m, _)| rhs > m)
                {
                    min_bound = Some((rhs, c));
                }
                if matches!(op, ConstraintOp::Le | ConstraintOp::Eq)
                    && max_bound.is_none_or(|(m, _)| rhs < m)
                {
                    max_bound = Some((rhs, c));
                }
            }

            if let (Some((min_val, min_c)), Some((max_val, max_c))) = (min_bound, max_bound) {
                if min_val > max_val + self.feasibility_tolerance {
                    violations.push(ConstraintViolation {
                        constraint: format!("{} vs {}", min_c.name, max_c.name),
                        required: min_val,
                        actual: max_val,
                        violation_amount: min_val - max_val,
                        description: format!(
                            "Conflict: {} requires >= {:.2} but {} requires <= {:.2}",
                            min_c.name, min_val, max_c.name, max_val
                        ),
                    });
                }
            }
        }

        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        Solution::infeasible_with_violations(violations)
    }
}

fn flip(op: ConstraintOp) -> ConstraintOp {
    match op {
        ConstraintOp::Le => ConstraintOp::Ge,
        ConstraintOp::Ge => ConstraintOp::Le,
        ConstraintOp::Eq => ConstraintOp::Eq,
    }
}

fn op_holds(op: ConstraintOp, lhs: f64, rhs: f64, tol: f64) -> bool {
    match op {
        ConstraintOp::Le => lhs <= rhs + tol,
        ConstraintOp::Ge => lhs >= rhs - tol,
        ConstraintOp::Eq => (lhs - rhs).abs() <= tol,
    }
}

/// Dense tableau; the last row is the objective (reduced gains), the last column the RHS
struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
}

impl Tableau {
    fn build(problem: &LpProblem) -> Self {
        let n_vars = problem.num_variables();
        let n_constraints = problem.num_constraints();

        // Normalise to non-negative RHS, flipping the inequality where needed
        let rows: Vec<(Vec<f64>, ConstraintOp, f64)> = problem
            .constraints
            .iter()
            .map(|c| {
                if c.rhs < 0.0 {
                    (c.coefficients.iter().map(|x| -x).collect(), flip(c.op), -c.rhs)
                } else {
                    (c.coefficients.clone(), c.op, c.rhs)
                }
            })
            .collect();

        let mut n_slack = 0;
        let mut n_artificial = 0;
        for (_, op, _) in &rows {
            match op {
                ConstraintOp::Le => n_slack += 1,
                ConstraintOp::Ge => {
                    n_slack += 1;
                    n_artificial += 1;
                }
                ConstraintOp::Eq => n_artificial += 1,
            }
        }

        let total_cols = n_vars + n_slack + n_artificial + 1;
        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; n_constraints + 1],
            basic_vars: vec![0; n_constraints],
            n_vars,
            n_slack,
            n_artificial,
        };

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;

        for (i, (coefficients, op, rhs)) in rows.into_iter().enumerate() {
            for (j, coef) in coefficients.into_iter().enumerate().take(n_vars) {
                tableau.data[i][j] = coef;
            }
            tableau.data[i][total_cols - 1] = rhs;

            match op {
                ConstraintOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0;
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Simplex maximizes, so minimization stores the negated costs as gains
        let obj_row = n_constraints;
        for (j, &coef) in problem.objective.coefficients.iter().enumerate().take(n_vars) {
            tableau.data[obj_row][j] = if problem.objective.minimize { -coef } else { coef };
        }

        tableau
    }

    fn obj_row(&self) -> usize {
        self.data.len() - 1
    }

    fn n_cols(&self) -> usize {
        self.data[0].len()
    }

    fn art_start(&self) -> usize {
        self.n_vars + self.n_slack
    }

    fn rhs_scale(&self) -> f64 {
        let rhs_col = self.n_cols() - 1;
        self.data[..self.obj_row()]
            .iter()
            .map(|row| row[rhs_col].abs())
            .fold(1.0, f64::max)
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let n_cols = self.n_cols();
        self.basic_vars[row] = col;

        let pivot_val = self.data[row][col];
        for j in 0..n_cols {
            self.data[row][j] /= pivot_val;
        }

        let pivot_row = self.data[row].clone();
        for (i, current) in self.data.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = current[col];
            if factor == 0.0 {
                continue;
            }
            for (x, p) in current.iter_mut().zip(&pivot_row) {
                *x -= factor * p;
            }
        }
    }

    fn values(&self, tolerance: f64) -> Vec<f64> {
        let rhs_col = self.n_cols() - 1;
        let mut values = vec![0.0; self.n_vars];
        for (i, &basic) in self.basic_vars.iter().enumerate() {
            if basic < self.n_vars {
                let v = self.data[i][rhs_col];
                values[basic] = if v.abs() < tolerance { 0.0 } else { v };
            }
        }
        values
    }
}

enum PhaseResult {
    Optimal,
    Unbounded,
    Infeasible,
    IterationLimit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::LpProblem;
    use crate::solution::SolutionStatus;

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y
        // Subject to:
        //   x + y <= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=11
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![3.0, 2.0], false);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 11.0).abs() < 1e-6, "obj = {} (expected 11)", solution.objective_value);
    }

    #[test]
    fn test_minimization_with_ge() {
        // Minimize: 2x + 3y subject to x + y >= 4, x <= 3, y <= 3
        // Optimal: x=3, y=1, obj=9
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![2.0, 3.0], true);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Ge, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6);
        assert!((solution.values[1] - 1.0).abs() < 1e-6);
        assert!((solution.objective_value - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_rhs_equality() {
        // inventory - backlog = -5 with both penalised: backlog = 5
        let mut problem = LpProblem::new(vec!["inv".to_string(), "back".to_string()]);
        problem.set_objective(vec![1.0, 2.0], true);
        problem.add_constraint("balance", vec![1.0, -1.0], ConstraintOp::Eq, -5.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!(solution.values[0].abs() < 1e-9);
        assert!((solution.values[1] - 5.0).abs() < 1e-9);
        assert!((solution.objective_value - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_rhs_upper_bound() {
        // -x <= -2 is x >= 2
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("floor", vec![-1.0], ConstraintOp::Le, -2.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_redundant_equalities() {
        // The second row duplicates the first; phase 1 leaves one artificial at zero
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 3.0], true);
        problem.add_constraint("a", vec![1.0, 1.0], ConstraintOp::Eq, 4.0);
        problem.add_constraint("b", vec![2.0, 2.0], ConstraintOp::Eq, 8.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 4.0).abs() < 1e-9);
        assert!((solution.objective_value - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_infeasible() {
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("lower", vec![1.0], ConstraintOp::Ge, 5.0);
        problem.add_constraint("upper", vec![1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Infeasible);
        assert_eq!(solution.violations.len(), 1);
        assert_eq!(solution.violations[0].constraint, "lower vs upper");
    }

    #[test]
    fn test_infeasible_equality_above_upper_bound() {
        let mut problem = LpProblem::new(vec!["q".to_string(), "z".to_string()]);
        problem.set_objective(vec![1.0, 0.0], true);
        problem.add_constraint("override[2,s2]", vec![1.0, 0.0], ConstraintOp::Eq, 150.0);
        problem.add_constraint("capacity[2,s2]", vec![1.0, 0.0], ConstraintOp::Le, 100.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Infeasible);
        assert!(solution.violations[0].constraint.contains("override[2,s2]"));
        assert!(solution.violations[0].constraint.contains("capacity[2,s2]"));
    }

    #[test]
    fn test_unbounded() {
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], false);
        problem.add_constraint("floor", vec![1.0], ConstraintOp::Ge, 1.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Unbounded);
    }

    #[test]
    fn test_iteration_limit_is_reported() {
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![3.0, 2.0], false);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().with_max_iterations(0).solve(&problem);

        assert_eq!(solution.status, SolutionStatus::IterationLimit);
    }
}
