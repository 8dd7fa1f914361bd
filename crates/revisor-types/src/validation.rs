//! Structured validation failures for the data contracts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The contract a validation failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contract {
    InputPacket,
    Draft,
    Review,
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Contract::InputPacket => "input packet",
            Contract::Draft => "draft",
            Contract::Review => "review",
        };
        f.write_str(name)
    }
}

/// A contract value failed a structural or invariant check.
///
/// Names the offending field (dotted path, with list indices where relevant)
/// and the rule that was violated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{contract} validation failed on `{field}`: {rule}")]
pub struct ValidationError {
    pub contract: Contract,
    pub field: String,
    pub rule: String,
}

impl ValidationError {
    pub fn new(contract: Contract, field: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            contract,
            field: field.into(),
            rule: rule.into(),
        }
    }
}

pub(crate) fn require_non_blank(
    contract: Contract,
    field: &str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(contract, field, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn require_percentage(
    contract: Contract,
    field: &str,
    value: u32,
) -> Result<(), ValidationError> {
    if value > 100 {
        return Err(ValidationError::new(
            contract,
            field,
            format!("must be between 0 and 100, got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn require_unit_interval(
    contract: Contract,
    field: &str,
    value: f64,
) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::new(
            contract,
            field,
            format!("must be between 0.0 and 1.0, got {value}"),
        ));
    }
    Ok(())
}
