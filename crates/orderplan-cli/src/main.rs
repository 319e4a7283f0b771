mod input;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use orderplan_model::evaluate::{self, CostBreakdown};
use orderplan_model::{
    OrderMatrices, Optimizer, PeriodSupplierMatrix, PriceScenarios, PriceTable, ProblemParameters, ResultEntry,
    Trajectory, Variable, extract,
};
use serde::{Deserialize, Serialize};

use crate::input::ProblemFile;

#[derive(Parser)]
#[command(name = "orderplan")]
#[command(about = "Scenario-based procurement planning under uncertain prices", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem file and print the order plan
    Solve {
        /// The JSON problem file
        file: PathBuf,
        /// Use only the first N price scenarios
        #[arg(short = 'n', long)]
        scenarios: Option<usize>,
        /// Wall-clock budget in seconds
        #[arg(long)]
        time_limit: Option<f64>,
        /// Maximum branch-and-bound nodes
        #[arg(long)]
        max_nodes: Option<usize>,
        /// Relative optimality gap
        #[arg(long)]
        gap: Option<f64>,
        /// Write the order-placed matrix to this CSV file
        #[arg(long)]
        orders_csv: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },
    /// Check a problem file for errors
    Check {
        /// The JSON problem file
        file: PathBuf,
    },
    /// Cost a saved `name -> value` listing against a problem file
    Evaluate {
        /// The JSON problem file
        file: PathBuf,
        /// A `solve --format json` report, or a bare JSON object of result entries
        listing: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

#[derive(Serialize)]
struct Report {
    /// `None` for an evaluated listing
    solve: Option<SolveSummary>,
    orders: OrderMatrices,
    trajectory: Trajectory,
    costs: CostBreakdown,
    scenario_procurement_costs: Vec<f64>,
    /// Scenario-average price per period and supplier
    mean_prices: PeriodSupplierMatrix,
    listing: BTreeMap<String, f64>,
}

#[derive(Serialize)]
struct SolveSummary {
    objective_value: f64,
    proven_optimal: bool,
    gap: f64,
    nodes: usize,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("  {cause}");
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env = if cli.debug {
        Env::default().default_filter_or("debug")
    } else {
        Env::default().default_filter_or("warn")
    };
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Commands::Solve {
            file,
            scenarios,
            time_limit,
            max_nodes,
            gap,
            orders_csv,
            format,
        } => {
            let problem = ProblemFile::load(&file)?;
            let params = problem.parameters()?;
            let mut price_scenarios = problem.scenarios()?;
            if let Some(n) = scenarios {
                price_scenarios = price_scenarios.truncated(n)?;
            }

            let mut config = problem.solver.clone();
            if let Some(secs) = time_limit {
                let limit = Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("--time-limit {secs} is not a usable number of seconds"))?;
                config = config.with_time_limit(limit);
            }
            if let Some(n) = max_nodes {
                config = config.with_max_nodes(n);
            }
            if let Some(g) = gap {
                config = config.with_relative_gap(g);
            }

            let result = Optimizer::new(config)
                .optimize(&params, &price_scenarios)
                .context("optimization failed")?;
            let summary = SolveSummary {
                objective_value: result.objective_value,
                proven_optimal: result.proven_optimal,
                gap: result.gap,
                nodes: result.nodes,
            };
            let plan = Plan {
                orders: result.order_matrices(&params)?,
                costs: CostBreakdown::evaluate(&result, &params, &price_scenarios)?,
                entries: result.entries,
            };
            let report = build_report(Some(summary), plan, &params, &price_scenarios)?;

            let drift = (report.costs.total() - result.objective_value).abs();
            if drift > 1e-6 * result.objective_value.abs().max(1.0) {
                log::warn!(
                    "re-evaluated cost {:.6} differs from objective {:.6}",
                    report.costs.total(),
                    result.objective_value
                );
            }

            if let Some(path) = orders_csv {
                report
                    .orders
                    .placed
                    .write_csv_path(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                log::info!("wrote order matrix to {}", path.display());
            }

            emit(&report, format)?;
        }
        Commands::Check { file } => {
            let problem = ProblemFile::load(&file)?;
            let params = problem.parameters()?;
            let scenarios = problem.scenarios()?;
            ensure_same_shape(&params, &scenarios)?;
            problem.solver.validate()?;

            println!("✓ {} is valid", file.display());
            println!("  {} periods", params.horizon());
            println!("  {} suppliers", params.num_suppliers());
            println!("  {} price scenarios", scenarios.len());
            println!("  {} fixed orders", params.fixed_orders.len());
        }
        Commands::Evaluate { file, listing, format } => {
            let problem = ProblemFile::load(&file)?;
            let params = problem.parameters()?;
            let scenarios = problem.scenarios()?;
            ensure_same_shape(&params, &scenarios)?;

            let listing = load_listing(&listing)?;
            let pairs: Vec<(&str, f64)> = listing.iter().map(|(name, &value)| (name.as_str(), value)).collect();
            let entries = extract::parse_listing(&pairs)?;
            let plan = Plan {
                orders: extract::extract_order_matrices(&entries, &params.suppliers, params.horizon())?,
                costs: CostBreakdown::from_entries(&entries, &params, &scenarios)?,
                entries,
            };

            let report = build_report(None, plan, &params, &scenarios)?;
            emit(&report, format)?;
        }
    }

    Ok(())
}

fn ensure_same_shape(params: &ProblemParameters, scenarios: &PriceScenarios) -> anyhow::Result<()> {
    anyhow::ensure!(
        scenarios.horizon() == params.horizon() && scenarios.num_suppliers() == params.num_suppliers(),
        "price scenarios are {} periods x {} suppliers but the problem is {} x {}",
        scenarios.horizon(),
        scenarios.num_suppliers(),
        params.horizon(),
        params.num_suppliers()
    );
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListingFile {
    Report { listing: BTreeMap<String, f64> },
    Bare(BTreeMap<String, f64>),
}

fn load_listing(path: &Path) -> anyhow::Result<BTreeMap<String, f64>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: ListingFile = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match file {
        ListingFile::Report { listing } | ListingFile::Bare(listing) => listing,
    })
}

/// A plan to report, whether solved here or read back from a listing
struct Plan {
    entries: Vec<ResultEntry>,
    orders: OrderMatrices,
    costs: CostBreakdown,
}

fn build_report(
    solve: Option<SolveSummary>,
    plan: Plan,
    params: &ProblemParameters,
    scenarios: &PriceScenarios,
) -> anyhow::Result<Report> {
    let Plan { entries, orders, costs } = plan;
    let trajectory = evaluate::simulate_inventory(
        &orders.arriving,
        &params.demand,
        params.initial_inventory,
        params.initial_backlog,
    );

    let has_state = entries
        .iter()
        .any(|e| matches!(e.variable, Variable::Inventory { .. } | Variable::Backlog { .. }));
    if has_state {
        let own = extract::extract_trajectory(&entries, params.horizon())?;
        let drift = own
            .inventory
            .iter()
            .zip(&trajectory.inventory)
            .chain(own.backlog.iter().zip(&trajectory.backlog))
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        if drift > 1e-6 {
            log::warn!("listed inventory/backlog differ from the replayed trajectory by up to {drift:.3e}");
        }
    }

    Ok(Report {
        solve,
        scenario_procurement_costs: evaluate::per_scenario_costs(&orders.placed, scenarios),
        mean_prices: price_matrix(&params.supplier_ids(), &scenarios.mean_table()),
        listing: entries.iter().map(|e| (e.variable.to_string(), e.value)).collect(),
        orders,
        trajectory,
        costs,
    })
}

fn price_matrix(suppliers: &[String], table: &PriceTable) -> PeriodSupplierMatrix {
    let mut matrix = PeriodSupplierMatrix::zeros(suppliers.to_vec(), table.horizon());
    for (t, row) in table.rows().iter().enumerate() {
        for (s, &price) in row.iter().enumerate() {
            matrix.set(t, s, price);
        }
    }
    matrix
}

fn emit(report: &Report, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Pretty => print_report(report),
    }
    Ok(())
}

fn print_report(report: &Report) {
    match &report.solve {
        Some(solve) => {
            if solve.proven_optimal {
                println!("Status: OPTIMAL");
            } else {
                println!("Status: FEASIBLE (gap {:.3e})", solve.gap);
            }
            println!("Objective: {:.2}", solve.objective_value);
            println!("Nodes: {}", solve.nodes);
        }
        None => println!("Evaluated listing of {} entries", report.listing.len()),
    }
    println!();

    print_matrix("Orders placed:", &report.orders.placed);
    print_matrix("Orders arriving:", &report.orders.arriving);
    print_matrix("Mean prices:", &report.mean_prices);

    println!("Inventory / backlog:");
    for (t, (inv, back)) in report
        .trajectory
        .inventory
        .iter()
        .zip(&report.trajectory.backlog)
        .enumerate()
    {
        println!("  {:>6} {:>12.2} {:>12.2}", t, inv, back);
    }
    println!();

    println!("Costs:");
    println!("  {:20} {:12.2}", "fixed", report.costs.fixed);
    println!("  {:20} {:12.2}", "procurement (mean)", report.costs.procurement);
    println!("  {:20} {:12.2}", "holding", report.costs.holding);
    println!("  {:20} {:12.2}", "backlog", report.costs.backlog);
    println!("  {:20} {:12.2}", "total", report.costs.total());

    let costs = &report.scenario_procurement_costs;
    if costs.len() > 1 {
        let min = costs.iter().copied().fold(f64::INFINITY, f64::min);
        let max = costs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        println!("  procurement across {} scenarios: {:.2} .. {:.2}", costs.len(), min, max);
    }
}

fn print_matrix(title: &str, matrix: &PeriodSupplierMatrix) {
    println!("{title}");
    print!("  {:>6}", "period");
    for supplier in matrix.suppliers() {
        print!(" {:>12}", supplier);
    }
    println!();
    for (t, row) in matrix.rows().iter().enumerate() {
        print!("  {:>6}", t);
        for value in row {
            print!(" {:>12.2}", value);
        }
        println!();
    }
    println!();
}
