use thiserror::Error;

use crate::circuit::ComponentType;
use crate::graph::NetworkDetail;

/// Condition numbers above this are reported as an ill-posed circuit rather
/// than a generic numerical failure.
pub const ILL_CONDITIONED_THRESHOLD: f64 = 1e12;

/// Failures that stop a solve. Validation findings are returned as data instead.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// More than one isolated network of nodes
    #[error(
        "circuit has floating nodes - {count} isolated networks detected:\n{summary}",
        count = .networks.len(),
        summary = summarize_networks(.networks)
    )]
    FloatingNetwork { networks: Vec<NetworkDetail> },

    /// System matrix could not be inverted
    #[error("{}", describe_singular(.condition_number))]
    SingularSystem { condition_number: Option<f64> },

    /// Node list length does not match the component kind
    #[error("component '{name}' ({kind}) expects {expected} node(s), but has {actual}")]
    InvalidComponentShape {
        name: String,
        kind: ComponentType,
        expected: usize,
        actual: usize,
    },

    #[error("invalid parameter for component '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("invalid matrix dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl CircuitError {
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns true when the failure is an isolated-network topology problem
    pub fn is_floating_network(&self) -> bool {
        matches!(self, Self::FloatingNetwork { .. })
    }

    /// Returns true for a singular matrix whose condition number points at a
    /// topology problem rather than a numerical one
    pub fn is_ill_conditioned(&self) -> bool {
        match self {
            Self::SingularSystem { condition_number: Some(cond) } => *cond > ILL_CONDITIONED_THRESHOLD,
            _ => false,
        }
    }
}

fn summarize_networks(networks: &[NetworkDetail]) -> String {
    networks
        .iter()
        .enumerate()
        .map(|(i, network)| format!("  Network {}: {}", i + 1, network))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_singular(condition_number: &Option<f64>) -> String {
    match *condition_number {
        Some(cond) if cond > ILL_CONDITIONED_THRESHOLD => format!(
            "circuit matrix is poorly conditioned (condition number {:.2e}); most likely causes are \
             floating nodes, power and ground on disconnected networks, or parallel voltage sources \
             without series resistance",
            cond
        ),
        _ => "circuit cannot be solved; check for floating nodes or invalid connections".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singular_messages() {
        let ill = CircuitError::SingularSystem { condition_number: Some(1e15) };
        assert!(ill.is_ill_conditioned());
        assert!(ill.to_string().contains("poorly conditioned"));

        let generic = CircuitError::SingularSystem { condition_number: None };
        assert!(!generic.is_ill_conditioned());
        assert!(generic.to_string().contains("cannot be solved"));
    }

    #[test]
    fn test_shape_message() {
        let err = CircuitError::InvalidComponentShape {
            name: "GND".to_string(),
            kind: ComponentType::Ground,
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.to_string(), "component 'GND' (Ground) expects 1 node(s), but has 2");
    }
}
