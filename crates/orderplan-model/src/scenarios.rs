use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, LogNormal, Normal, Uniform};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("At least one price scenario is required")]
    NoScenarios,
    #[error("Scenario {scenario} has {found_periods} periods x {found_suppliers} suppliers, expected {periods} x {suppliers}")]
    Shape {
        scenario: usize,
        periods: usize,
        suppliers: usize,
        found_periods: usize,
        found_suppliers: usize,
    },
    #[error("Scenario {scenario} has invalid price {value} at period {period}, supplier {supplier}")]
    InvalidPrice {
        scenario: usize,
        period: usize,
        supplier: usize,
        value: f64,
    },
    #[error("Invalid price distribution: {0}")]
    InvalidDistribution(String),
}

/// Prices of one scenario, indexed `[period][supplier]`
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    prices: Vec<Vec<f64>>,
}

/// N equally weighted price realizations sharing one shape
#[derive(Debug, Clone, PartialEq)]
pub struct PriceScenarios {
    tables: Vec<PriceTable>,
}

/// Marginal price distribution of one supplier, drawn independently per period
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceDistribution {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Uniform { low: f64, high: f64 },
}

impl PriceTable {
    pub fn new(prices: Vec<Vec<f64>>) -> Self {
        Self { prices }
    }

    /// The same price row in every period
    pub fn constant(horizon: usize, prices: Vec<f64>) -> Self {
        Self {
            prices: vec![prices; horizon],
        }
    }

    pub fn price(&self, period: usize, supplier: usize) -> f64 {
        self.prices[period][supplier]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.prices
    }

    pub fn horizon(&self) -> usize {
        self.prices.len()
    }

    pub fn num_suppliers(&self) -> usize {
        self.prices.first().map_or(0, Vec::len)
    }
}

impl PriceScenarios {
    pub fn new(tables: Vec<PriceTable>) -> Result<Self, ScenarioError> {
        let first = tables.first().ok_or(ScenarioError::NoScenarios)?;
        let periods = first.horizon();
        let suppliers = first.num_suppliers();

        for (n, table) in tables.iter().enumerate() {
            if table.horizon() != periods || table.prices.iter().any(|row| row.len() != suppliers) {
                return Err(ScenarioError::Shape {
                    scenario: n,
                    periods,
                    suppliers,
                    found_periods: table.horizon(),
                    found_suppliers: table.prices.iter().map(Vec::len).max().unwrap_or(0),
                });
            }
            for (t, row) in table.prices.iter().enumerate() {
                for (s, &value) in row.iter().enumerate() {
                    if !value.is_finite() || value < 0.0 {
                        return Err(ScenarioError::InvalidPrice {
                            scenario: n,
                            period: t,
                            supplier: s,
                            value,
                        });
                    }
                }
            }
        }

        Ok(Self { tables })
    }

    /// Draw `count` scenarios from per-supplier distributions with a fixed seed.
    /// Draws are scenario-major, so the first k scenarios do not depend on `count`.
    pub fn sample(
        distributions: &[PriceDistribution],
        horizon: usize,
        count: usize,
        seed: u64,
    ) -> Result<Self, ScenarioError> {
        if count == 0 {
            return Err(ScenarioError::NoScenarios);
        }
        let samplers = distributions
            .iter()
            .map(|d| d.sampler())
            .collect::<Result<Vec<_>, _>>()?;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut tables = Vec::with_capacity(count);
        for _ in 0..count {
            let mut prices = Vec::with_capacity(horizon);
            for _ in 0..horizon {
                // Prices cannot go negative
                let row: Vec<f64> = samplers.iter().map(|s| s.draw(&mut rng).max(0.0)).collect();
                prices.push(row);
            }
            tables.push(PriceTable { prices });
        }

        Self::new(tables)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[PriceTable] {
        &self.tables
    }

    pub fn horizon(&self) -> usize {
        self.tables[0].horizon()
    }

    pub fn num_suppliers(&self) -> usize {
        self.tables[0].num_suppliers()
    }

    /// Keep the first `n` scenarios
    pub fn truncated(&self, n: usize) -> Result<Self, ScenarioError> {
        Self::new(self.tables.iter().take(n).cloned().collect())
    }

    /// Scenario-average price per period and supplier
    pub fn mean_table(&self) -> PriceTable {
        let n = self.tables.len() as f64;
        let mut prices = vec![vec![0.0; self.num_suppliers()]; self.horizon()];
        for table in &self.tables {
            for (acc, row) in prices.iter_mut().zip(&table.prices) {
                for (a, p) in acc.iter_mut().zip(row) {
                    *a += p;
                }
            }
        }
        for row in &mut prices {
            for p in row.iter_mut() {
                *p /= n;
            }
        }
        PriceTable { prices }
    }
}

enum Sampler {
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Uniform(Uniform<f64>),
}

impl Sampler {
    fn draw(&self, rng: &mut StdRng) -> f64 {
        match self {
            Sampler::Normal(d) => d.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::Uniform(d) => d.sample(rng),
        }
    }
}

impl PriceDistribution {
    fn sampler(&self) -> Result<Sampler, ScenarioError> {
        let invalid = |e: &dyn std::fmt::Display| ScenarioError::InvalidDistribution(format!("{self:?}: {e}"));
        match *self {
            PriceDistribution::Normal { mean, std_dev } => {
                // rand_distr only rejects a non-finite scale
                if !mean.is_finite() || std_dev.is_nan() || std_dev < 0.0 {
                    return Err(invalid(&"mean must be finite and std_dev non-negative"));
                }
                Normal::new(mean, std_dev).map(Sampler::Normal).map_err(|e| invalid(&e))
            }
            PriceDistribution::LogNormal { mu, sigma } => {
                if !mu.is_finite() || sigma.is_nan() || sigma < 0.0 {
                    return Err(invalid(&"mu must be finite and sigma non-negative"));
                }
                LogNormal::new(mu, sigma).map(Sampler::LogNormal).map_err(|e| invalid(&e))
            }
            PriceDistribution::Uniform { low, high } => {
                if !(low.is_finite() && high.is_finite() && low < high) {
                    return Err(invalid(&"low must be below high"));
                }
                Ok(Sampler::Uniform(Uniform::new(low, high)))
            }
        }
    }
}
