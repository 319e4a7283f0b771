use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NameParseError {
    #[error("Malformed variable name {0:?}: expected kind[index,...]")]
    MissingBracket(String),
    #[error("Unknown variable kind {kind:?} in {name:?}")]
    UnknownKind { name: String, kind: String },
    #[error("Variable {name:?} has {found} indices, expected {expected}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Invalid period {token:?} in {name:?}")]
    InvalidPeriod { name: String, token: String },
    #[error("Invalid supplier id {token:?} in {name:?}")]
    InvalidSupplier { name: String, token: String },
}

/// A decision variable of the procurement model with its explicit index tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Variable {
    /// Quantity ordered from `supplier` in `period`
    OrderQuantity { period: usize, supplier: String },
    /// Whether an order placed in `period` and arriving in `arrival` is made
    OrderIndicator {
        period: usize,
        supplier: String,
        arrival: usize,
    },
    Inventory { period: usize },
    Backlog { period: usize },
}

/// One solved value from the optimizer's result listing
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
    pub variable: Variable,
    pub value: f64,
}

impl Variable {
    pub fn kind(&self) -> &'static str {
        match self {
            Variable::OrderQuantity { .. } => "order_quantity",
            Variable::OrderIndicator { .. } => "order_indicator",
            Variable::Inventory { .. } => "inventory",
            Variable::Backlog { .. } => "backlog",
        }
    }

    pub fn period(&self) -> usize {
        match self {
            Variable::OrderQuantity { period, .. }
            | Variable::OrderIndicator { period, .. }
            | Variable::Inventory { period }
            | Variable::Backlog { period } => *period,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::OrderQuantity { period, supplier } => {
                write!(f, "order_quantity[{period},{supplier}]")
            }
            Variable::OrderIndicator {
                period,
                supplier,
                arrival,
            } => write!(f, "order_indicator[{period},{supplier},{arrival}]"),
            Variable::Inventory { period } => write!(f, "inventory[{period}]"),
            Variable::Backlog { period } => write!(f, "backlog[{period}]"),
        }
    }
}

impl FromStr for Variable {
    type Err = NameParseError;

    /// Parse the bracketed form produced by `Display`, e.g. `order_indicator[2,s2,5]`
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let malformed = || NameParseError::MissingBracket(name.to_string());

        let (kind, rest) = name.split_once('[').ok_or_else(malformed)?;
        let inner = rest.strip_suffix(']').ok_or_else(malformed)?;
        if inner.contains('[') || inner.contains(']') {
            return Err(malformed());
        }
        let indices: Vec<&str> = inner.split(',').map(str::trim).collect();

        let arity = |expected: usize| {
            if indices.len() == expected {
                Ok(())
            } else {
                Err(NameParseError::Arity {
                    name: name.to_string(),
                    expected,
                    found: indices.len(),
                })
            }
        };
        let period = |token: &str| {
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                return Err(NameParseError::InvalidPeriod {
                    name: name.to_string(),
                    token: token.to_string(),
                });
            }
            token.parse::<usize>().map_err(|_| NameParseError::InvalidPeriod {
                name: name.to_string(),
                token: token.to_string(),
            })
        };
        let supplier = |token: &str| {
            if is_valid_identifier(token) {
                Ok(token.to_string())
            } else {
                Err(NameParseError::InvalidSupplier {
                    name: name.to_string(),
                    token: token.to_string(),
                })
            }
        };

        match kind.trim() {
            "order_quantity" => {
                arity(2)?;
                Ok(Variable::OrderQuantity {
                    period: period(indices[0])?,
                    supplier: supplier(indices[1])?,
                })
            }
            "order_indicator" => {
                arity(3)?;
                Ok(Variable::OrderIndicator {
                    period: period(indices[0])?,
                    supplier: supplier(indices[1])?,
                    arrival: period(indices[2])?,
                })
            }
            "inventory" => {
                arity(1)?;
                Ok(Variable::Inventory {
                    period: period(indices[0])?,
                })
            }
            "backlog" => {
                arity(1)?;
                Ok(Variable::Backlog {
                    period: period(indices[0])?,
                })
            }
            other => Err(NameParseError::UnknownKind {
                name: name.to_string(),
                kind: other.to_string(),
            }),
        }
    }
}

/// Supplier ids are non-empty runs of ASCII alphanumerics and underscores
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
