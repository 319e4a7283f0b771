use thiserror::Error;

use crate::evaluate::Trajectory;
use crate::matrix::PeriodSupplierMatrix;
use crate::params::Supplier;
use crate::variables::{NameParseError, ResultEntry, Variable};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Result entry {0} names an unknown supplier")]
    UnknownSupplier(String),
    #[error("Result entry {name} lies outside the horizon of {horizon} periods")]
    PeriodOutOfRange { name: String, horizon: usize },
}

/// Quantity ordered and quantity arriving, per period and supplier
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMatrices {
    pub placed: PeriodSupplierMatrix,
    pub arriving: PeriodSupplierMatrix,
}

/// Parse a flat `(name, value)` listing. The first malformed name aborts the parse.
pub fn parse_listing<S: AsRef<str>>(listing: &[(S, f64)]) -> Result<Vec<ResultEntry>, NameParseError> {
    listing
        .iter()
        .map(|(name, value)| {
            Ok(ResultEntry {
                variable: name.as_ref().parse()?,
                value: *value,
            })
        })
        .collect()
}

/// Rebuild the order-placed and order-arrival matrices from result entries.
/// Arrivals follow each indicator's arrival index; those beyond the horizon are dropped.
pub fn extract_order_matrices(
    entries: &[ResultEntry],
    suppliers: &[Supplier],
    horizon: usize,
) -> Result<OrderMatrices, ExtractError> {
    let ids: Vec<String> = suppliers.iter().map(|s| s.id.clone()).collect();
    let mut placed = PeriodSupplierMatrix::zeros(ids.clone(), horizon);
    let mut arriving = PeriodSupplierMatrix::zeros(ids, horizon);

    let locate = |entry: &ResultEntry, supplier: &str| -> Result<usize, ExtractError> {
        let s = placed
            .supplier_index(supplier)
            .ok_or_else(|| ExtractError::UnknownSupplier(entry.variable.to_string()))?;
        if entry.variable.period() >= horizon {
            return Err(ExtractError::PeriodOutOfRange {
                name: entry.variable.to_string(),
                horizon,
            });
        }
        Ok(s)
    };

    let mut indicators = Vec::new();
    let mut cells = Vec::new();
    for entry in entries {
        match &entry.variable {
            Variable::OrderQuantity { period, supplier } => {
                cells.push((*period, locate(entry, supplier)?, entry.value));
            }
            Variable::OrderIndicator {
                period,
                supplier,
                arrival,
            } => {
                indicators.push((*period, locate(entry, supplier)?, *arrival));
            }
            Variable::Inventory { .. } | Variable::Backlog { .. } => {}
        }
    }

    for (t, s, value) in cells {
        placed.add(t, s, value);
    }
    for (t, s, arrival) in indicators {
        if arrival < horizon {
            arriving.add(arrival, s, placed.get_at(t, s));
        }
    }

    Ok(OrderMatrices { placed, arriving })
}

/// The optimizer's own inventory and backlog per period
pub fn extract_trajectory(entries: &[ResultEntry], horizon: usize) -> Result<Trajectory, ExtractError> {
    let mut trajectory = Trajectory {
        inventory: vec![0.0; horizon],
        backlog: vec![0.0; horizon],
    };
    for entry in entries {
        let slot = match entry.variable {
            Variable::Inventory { period } => trajectory.inventory.get_mut(period),
            Variable::Backlog { period } => trajectory.backlog.get_mut(period),
            _ => continue,
        };
        let slot = slot.ok_or_else(|| ExtractError::PeriodOutOfRange {
            name: entry.variable.to_string(),
            horizon,
        })?;
        *slot = entry.value;
    }
    Ok(trajectory)
}
