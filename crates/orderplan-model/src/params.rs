use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::variables::is_valid_identifier;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Demand sequence is empty")]
    EmptyDemand,
    #[error("At least one supplier is required")]
    NoSuppliers,
    #[error("Invalid supplier id {0:?}: use letters, digits, and underscores")]
    InvalidSupplierId(String),
    #[error("Duplicate supplier id {0:?}")]
    DuplicateSupplier(String),
    #[error("Capacity table has {found} periods, expected {expected}")]
    CapacityPeriods { expected: usize, found: usize },
    #[error("Capacity for period {period} has {found} suppliers, expected {expected}")]
    CapacitySuppliers {
        period: usize,
        expected: usize,
        found: usize,
    },
    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidValue { field: String, value: f64 },
    #[error("{field} must be strictly positive, got {value}")]
    NonPositiveRate { field: String, value: f64 },
    #[error("Fixed order references unknown supplier {0:?}")]
    UnknownSupplier(String),
    #[error("Fixed order for {supplier} at period {period} is outside the horizon of {horizon} periods")]
    PeriodOutOfHorizon {
        supplier: String,
        period: usize,
        horizon: usize,
    },
    #[error(
        "Fixed order for {supplier} placed in period {order_period} must arrive in period {expected}, not {arrival_period}"
    )]
    InconsistentArrival {
        supplier: String,
        order_period: usize,
        arrival_period: usize,
        expected: usize,
    },
    #[error("Duplicate fixed order for {supplier} at period {period}")]
    DuplicateFixedOrder { supplier: String, period: usize },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Supplier {
    pub id: String,
    /// Periods between placing an order and its arrival
    pub lead_time: usize,
    /// Charged once per period in which any quantity is ordered
    pub order_cost: f64,
}

/// An already-committed order the optimizer must honour
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FixedOrder {
    pub supplier: String,
    pub order_period: usize,
    pub arrival_period: usize,
    pub quantity: f64,
}

/// Immutable inputs of one optimization run
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemParameters {
    /// Deterministic demand, one entry per period
    pub demand: Vec<f64>,
    pub suppliers: Vec<Supplier>,
    /// Upper bound on the order quantity, indexed `[period][supplier]`
    pub capacity: Vec<Vec<f64>>,
    /// Cost per unit of end-of-period inventory
    pub holding_cost: f64,
    /// Cost per unit of end-of-period backlog
    pub backlog_cost: f64,
    pub initial_inventory: f64,
    pub initial_backlog: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fixed_orders: Vec<FixedOrder>,
}

impl Supplier {
    pub fn new(id: impl Into<String>, lead_time: usize, order_cost: f64) -> Self {
        Self {
            id: id.into(),
            lead_time,
            order_cost,
        }
    }

    /// Period in which an order placed in `period` arrives, `None` past `usize::MAX`
    pub fn arrival(&self, period: usize) -> Option<usize> {
        period.checked_add(self.lead_time)
    }
}

impl FixedOrder {
    /// Convert raw `order period -> quantity` commitments into fixed orders,
    /// dropping any whose arrival falls at or beyond the horizon
    pub fn from_raw_orders(supplier: &Supplier, raw: &BTreeMap<usize, f64>, horizon: usize) -> Vec<FixedOrder> {
        raw.iter()
            .filter_map(|(&t, &quantity)| {
                let arrival = supplier.arrival(t).filter(|&a| a < horizon)?;
                Some(FixedOrder {
                    supplier: supplier.id.clone(),
                    order_period: t,
                    arrival_period: arrival,
                    quantity,
                })
            })
            .collect()
    }
}

impl ProblemParameters {
    /// Parameters with unit holding/backlog rates, no starting stock, and no fixed orders
    pub fn new(demand: Vec<f64>, suppliers: Vec<Supplier>, capacity: Vec<Vec<f64>>) -> Self {
        Self {
            demand,
            suppliers,
            capacity,
            holding_cost: 1.0,
            backlog_cost: 1.0,
            initial_inventory: 0.0,
            initial_backlog: 0.0,
            fixed_orders: Vec::new(),
        }
    }

    pub fn with_cost_rates(mut self, holding_cost: f64, backlog_cost: f64) -> Self {
        self.holding_cost = holding_cost;
        self.backlog_cost = backlog_cost;
        self
    }

    pub fn with_initial_state(mut self, inventory: f64, backlog: f64) -> Self {
        self.initial_inventory = inventory;
        self.initial_backlog = backlog;
        self
    }

    pub fn with_fixed_orders(mut self, fixed_orders: Vec<FixedOrder>) -> Self {
        self.fixed_orders = fixed_orders;
        self
    }

    /// Number of periods T
    pub fn horizon(&self) -> usize {
        self.demand.len()
    }

    pub fn num_suppliers(&self) -> usize {
        self.suppliers.len()
    }

    pub fn supplier_ids(&self) -> Vec<String> {
        self.suppliers.iter().map(|s| s.id.clone()).collect()
    }

    pub fn supplier_index(&self, id: &str) -> Option<usize> {
        self.suppliers.iter().position(|s| s.id == id)
    }

    pub fn lead_time(&self, id: &str) -> Option<usize> {
        self.suppliers.iter().find(|s| s.id == id).map(|s| s.lead_time)
    }

    /// Whether an order from supplier `s` placed in `period` arrives inside the horizon
    pub fn arrives_in_horizon(&self, period: usize, s: usize) -> bool {
        self.suppliers[s].arrival(period).is_some_and(|a| a < self.horizon())
    }

    /// Fail fast on anything the model cannot represent
    pub fn validate(&self) -> Result<(), ValidationError> {
        let horizon = self.horizon();
        if horizon == 0 {
            return Err(ValidationError::EmptyDemand);
        }
        if self.suppliers.is_empty() {
            return Err(ValidationError::NoSuppliers);
        }

        for (t, &d) in self.demand.iter().enumerate() {
            non_negative(&format!("demand[{t}]"), d)?;
        }

        let mut seen = HashSet::new();
        for supplier in &self.suppliers {
            if !is_valid_identifier(&supplier.id) {
                return Err(ValidationError::InvalidSupplierId(supplier.id.clone()));
            }
            if !seen.insert(supplier.id.as_str()) {
                return Err(ValidationError::DuplicateSupplier(supplier.id.clone()));
            }
            non_negative(&format!("order_cost[{}]", supplier.id), supplier.order_cost)?;
        }

        if self.capacity.len() != horizon {
            return Err(ValidationError::CapacityPeriods {
                expected: horizon,
                found: self.capacity.len(),
            });
        }
        for (t, row) in self.capacity.iter().enumerate() {
            if row.len() != self.suppliers.len() {
                return Err(ValidationError::CapacitySuppliers {
                    period: t,
                    expected: self.suppliers.len(),
                    found: row.len(),
                });
            }
            for (supplier, &cap) in self.suppliers.iter().zip(row) {
                non_negative(&format!("capacity[{t},{}]", supplier.id), cap)?;
            }
        }

        positive("holding_cost", self.holding_cost)?;
        positive("backlog_cost", self.backlog_cost)?;
        non_negative("initial_inventory", self.initial_inventory)?;
        non_negative("initial_backlog", self.initial_backlog)?;

        let mut pinned = HashSet::new();
        for order in &self.fixed_orders {
            let lead_time = self
                .lead_time(&order.supplier)
                .ok_or_else(|| ValidationError::UnknownSupplier(order.supplier.clone()))?;
            for period in [order.order_period, order.arrival_period] {
                if period >= horizon {
                    return Err(ValidationError::PeriodOutOfHorizon {
                        supplier: order.supplier.clone(),
                        period,
                        horizon,
                    });
                }
            }
            if order.order_period.checked_add(lead_time) != Some(order.arrival_period) {
                return Err(ValidationError::InconsistentArrival {
                    supplier: order.supplier.clone(),
                    order_period: order.order_period,
                    arrival_period: order.arrival_period,
                    expected: order.order_period.saturating_add(lead_time),
                });
            }
            if !pinned.insert((order.supplier.as_str(), order.order_period)) {
                return Err(ValidationError::DuplicateFixedOrder {
                    supplier: order.supplier.clone(),
                    period: order.order_period,
                });
            }
            non_negative(
                &format!("fixed order quantity[{},{}]", order.order_period, order.supplier),
                order.quantity,
            )?;
        }

        Ok(())
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value,
        })
    }
}

fn positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NonPositiveRate {
            field: field.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ProblemParameters {
        ProblemParameters::new(
            vec![10.0; 6],
            vec![Supplier::new("s1", 0, 50.0), Supplier::new("s2", 3, 20.0)],
            vec![vec![100.0, 200.0]; 6],
        )
        .with_cost_rates(5.0, 20.0)
    }

    #[test]
    fn test_raw_orders_drop_late_arrivals() {
        let s2 = Supplier::new("s2", 3, 20.0);
        let raw = BTreeMap::from([(1, 125.0), (2, 125.0), (3, 90.0), (5, 40.0)]);

        let fixed = FixedOrder::from_raw_orders(&s2, &raw, 6);

        assert_eq!(fixed.len(), 2);
        assert_eq!(fixed[0].order_period, 1);
        assert_eq!(fixed[0].arrival_period, 4);
        assert_eq!(fixed[1].order_period, 2);
        assert_eq!(fixed[1].arrival_period, 5);
        assert_eq!(fixed[1].quantity, 125.0);
    }

    #[test]
    fn test_valid_parameters() {
        let s2 = Supplier::new("s2", 3, 20.0);
        let fixed = FixedOrder::from_raw_orders(&s2, &BTreeMap::from([(2, 125.0)]), 6);
        let params = base().with_fixed_orders(fixed);

        assert!(params.validate().is_ok());
        assert_eq!(params.horizon(), 6);
        assert_eq!(params.lead_time("s2"), Some(3));
        assert!(params.arrives_in_horizon(2, 1));
        assert!(!params.arrives_in_horizon(3, 1));
    }

    #[test]
    fn test_configuration_errors() {
        let mut params = base();
        params.demand.clear();
        params.capacity.clear();
        assert_eq!(params.validate(), Err(ValidationError::EmptyDemand));

        let mut params = base();
        params.suppliers.clear();
        assert_eq!(params.validate(), Err(ValidationError::NoSuppliers));

        let mut params = base();
        params.suppliers[1].id = "s1".to_string();
        assert_eq!(params.validate(), Err(ValidationError::DuplicateSupplier("s1".to_string())));

        let mut params = base();
        params.suppliers[0].id = "s-1".to_string();
        assert!(matches!(params.validate(), Err(ValidationError::InvalidSupplierId(_))));

        let mut params = base();
        params.capacity.pop();
        assert!(matches!(params.validate(), Err(ValidationError::CapacityPeriods { .. })));

        let mut params = base();
        params.capacity[4].pop();
        assert!(matches!(
            params.validate(),
            Err(ValidationError::CapacitySuppliers { period: 4, .. })
        ));

        let mut params = base();
        params.demand[2] = f64::NAN;
        assert!(matches!(params.validate(), Err(ValidationError::InvalidValue { .. })));

        let params = base().with_cost_rates(0.0, 20.0);
        assert!(matches!(params.validate(), Err(ValidationError::NonPositiveRate { .. })));
    }

    #[test]
    fn test_inconsistent_overrides() {
        let order = |supplier: &str, order_period, arrival_period| FixedOrder {
            supplier: supplier.to_string(),
            order_period,
            arrival_period,
            quantity: 125.0,
        };

        let params = base().with_fixed_orders(vec![order("s9", 1, 4)]);
        assert_eq!(params.validate(), Err(ValidationError::UnknownSupplier("s9".to_string())));

        let params = base().with_fixed_orders(vec![order("s2", 4, 7)]);
        assert!(matches!(
            params.validate(),
            Err(ValidationError::PeriodOutOfHorizon { period: 7, .. })
        ));

        let params = base().with_fixed_orders(vec![order("s2", 1, 5)]);
        assert!(matches!(
            params.validate(),
            Err(ValidationError::InconsistentArrival { expected: 4, .. })
        ));

        let params = base().with_fixed_orders(vec![order("s2", 1, 4), order("s2", 1, 4)]);
        assert!(matches!(params.validate(), Err(ValidationError::DuplicateFixedOrder { .. })));
    }

    #[test]
    fn test_unbounded_lead_time_never_arrives() {
        let slow = Supplier::new("slow", usize::MAX, 1.0);
        let mut params = base();
        params.suppliers.push(slow.clone());
        for row in &mut params.capacity {
            row.push(10.0);
        }

        assert_eq!(params.validate(), Ok(()));
        assert_eq!(slow.arrival(1), None);
        let s = params.supplier_index("slow").unwrap();
        assert!((0..params.horizon()).all(|t| !params.arrives_in_horizon(t, s)));
        assert!(FixedOrder::from_raw_orders(&slow, &BTreeMap::from([(0, 5.0)]), params.horizon()).is_empty());

        let params = params.with_fixed_orders(vec![FixedOrder {
            supplier: "slow".to_string(),
            order_period: 1,
            arrival_period: 2,
            quantity: 5.0,
        }]);
        assert!(matches!(
            params.validate(),
            Err(ValidationError::InconsistentArrival { expected: usize::MAX, .. })
        ));
    }
}
