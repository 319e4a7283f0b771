use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use orderplan_model::{
    FixedOrder, OptimizerConfig, PriceDistribution, PriceScenarios, PriceTable, ProblemParameters, Supplier,
};
use serde::Deserialize;

/// JSON problem file
#[derive(Debug, Deserialize)]
pub struct ProblemFile {
    pub demand: Vec<f64>,
    pub suppliers: Vec<Supplier>,
    /// `[period][supplier]`, suppliers in the order listed above
    pub capacity: Vec<Vec<f64>>,
    pub holding_cost: f64,
    pub backlog_cost: f64,
    #[serde(default)]
    pub initial_inventory: f64,
    #[serde(default)]
    pub initial_backlog: f64,
    /// Supplier id -> order period -> committed quantity
    #[serde(default)]
    pub fixed_orders: BTreeMap<String, BTreeMap<usize, f64>>,
    /// Explicit scenarios, `[scenario][period][supplier]`
    #[serde(default)]
    pub prices: Option<Vec<Vec<Vec<f64>>>>,
    #[serde(default)]
    pub sampling: Option<Sampling>,
    #[serde(default)]
    pub solver: OptimizerConfig,
}

#[derive(Debug, Deserialize)]
pub struct Sampling {
    /// Supplier id -> price distribution
    pub distributions: BTreeMap<String, PriceDistribution>,
    pub count: usize,
    pub seed: u64,
}

impl ProblemFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parameters(&self) -> anyhow::Result<ProblemParameters> {
        let horizon = self.demand.len();
        let mut fixed_orders = Vec::new();
        for (id, raw) in &self.fixed_orders {
            let supplier = self
                .suppliers
                .iter()
                .find(|s| &s.id == id)
                .with_context(|| format!("fixed orders reference unknown supplier {id:?}"))?;
            let orders = FixedOrder::from_raw_orders(supplier, raw, horizon);
            if orders.len() < raw.len() {
                log::info!(
                    "dropped {} fixed orders for {id} arriving after the horizon",
                    raw.len() - orders.len()
                );
            }
            fixed_orders.extend(orders);
        }

        let params = ProblemParameters::new(self.demand.clone(), self.suppliers.clone(), self.capacity.clone())
            .with_cost_rates(self.holding_cost, self.backlog_cost)
            .with_initial_state(self.initial_inventory, self.initial_backlog)
            .with_fixed_orders(fixed_orders);
        params.validate()?;
        Ok(params)
    }

    pub fn scenarios(&self) -> anyhow::Result<PriceScenarios> {
        match (&self.prices, &self.sampling) {
            (Some(_), Some(_)) => bail!("specify either `prices` or `sampling`, not both"),
            (None, None) => bail!("no price scenarios: add `prices` or `sampling`"),
            (Some(prices), None) => {
                let tables = prices.iter().cloned().map(PriceTable::new).collect();
                Ok(PriceScenarios::new(tables)?)
            }
            (None, Some(sampling)) => {
                let distributions = self
                    .suppliers
                    .iter()
                    .map(|s| {
                        sampling
                            .distributions
                            .get(&s.id)
                            .copied()
                            .with_context(|| format!("no price distribution for supplier {:?}", s.id))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Ok(PriceScenarios::sample(
                    &distributions,
                    self.demand.len(),
                    sampling.count,
                    sampling.seed,
                )?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBLEM: &str = r#"{
        "demand": [10, 12, 8, 15],
        "suppliers": [
            { "id": "s1", "lead_time": 0, "order_cost": 50 },
            { "id": "s2", "lead_time": 2, "order_cost": 20 }
        ],
        "capacity": [[100, 100], [100, 100], [100, 100], [100, 100]],
        "holding_cost": 5,
        "backlog_cost": 20,
        "fixed_orders": { "s2": { "1": 125, "3": 40 } },
        "sampling": {
            "distributions": {
                "s1": { "kind": "normal", "mean": 10, "std_dev": 1 },
                "s2": { "kind": "uniform", "low": 7, "high": 9 }
            },
            "count": 5,
            "seed": 42
        },
        "solver": { "time_limit_secs": 5 }
    }"#;

    #[test]
    fn test_parse_problem_file() {
        let file: ProblemFile = serde_json::from_str(PROBLEM).unwrap();
        let params = file.parameters().unwrap();
        let scenarios = file.scenarios().unwrap();

        assert_eq!(params.horizon(), 4);
        // Period 3 + lead time 2 falls outside the horizon
        assert_eq!(params.fixed_orders.len(), 1);
        assert_eq!(params.fixed_orders[0].arrival_period, 3);
        assert_eq!(scenarios.len(), 5);
        assert_eq!(scenarios.num_suppliers(), 2);
        assert_eq!(file.solver.time_limit_secs, 5.0);
        assert_eq!(file.solver.max_nodes, OptimizerConfig::default().max_nodes);
    }

    #[test]
    fn test_explicit_prices() {
        let mut file: ProblemFile = serde_json::from_str(PROBLEM).unwrap();
        file.sampling = None;
        file.prices = Some(vec![vec![vec![1.0, 2.0]; 4]; 3]);

        assert_eq!(file.scenarios().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_distribution() {
        let mut file: ProblemFile = serde_json::from_str(PROBLEM).unwrap();
        if let Some(sampling) = file.sampling.as_mut() {
            sampling.distributions.remove("s2");
        }

        assert!(file.scenarios().is_err());
    }
}
