pub mod builder;
pub mod evaluate;
pub mod extract;
pub mod matrix;
pub mod optimizer;
pub mod params;
pub mod scenarios;
pub mod variables;

pub use builder::{BuildError, ProcurementModel};
pub use evaluate::{CostBreakdown, Trajectory};
pub use extract::{ExtractError, OrderMatrices};
pub use matrix::{MatrixError, PeriodSupplierMatrix};
pub use optimizer::{OptimizeError, Optimizer, OptimizerConfig, OptimizerResult};
pub use params::{FixedOrder, ProblemParameters, Supplier, ValidationError};
pub use scenarios::{PriceDistribution, PriceScenarios, PriceTable, ScenarioError};
pub use variables::{NameParseError, ResultEntry, Variable};
