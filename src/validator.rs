use std::collections::BTreeSet;
use std::fmt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::{Component, ComponentType, NodeId};
use crate::error::CircuitError;
use crate::graph::{describe_networks, ConnectivityGraph, NetworkDetail};

/// Problems that make the circuit unsolvable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Issue {
    FloatingNodes {
        message: String,
        details: Vec<NetworkDetail>,
    },
    InvalidComponentShape {
        message: String,
        component: String,
        kind: ComponentType,
        expected: usize,
        actual: usize,
    },
}

impl Issue {
    pub fn message(&self) -> &str {
        match self {
            Issue::FloatingNodes { message, .. } | Issue::InvalidComponentShape { message, .. } => message,
        }
    }
}

/// Non-fatal findings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Warning {
    MissingGround { message: String, suggestion: String },
    MissingLoad { message: String, suggestion: String },
}

impl Warning {
    pub fn message(&self) -> &str {
        match self {
            Warning::MissingGround { message, .. } | Warning::MissingLoad { message, .. } => message,
        }
    }

    pub fn suggestion(&self) -> &str {
        match self {
            Warning::MissingGround { suggestion, .. } | Warning::MissingLoad { suggestion, .. } => suggestion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    ConnectPowerToGround,
    ConnectPowerToComponents,
}

/// A proposed bridge between two isolated networks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub message: String,
    pub from_nodes: Vec<NodeId>,
    pub to_nodes: Vec<NodeId>,
    pub suggested_component: ComponentType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<Issue>,
    pub warnings: Vec<Warning>,
    pub suggestions: Vec<Suggestion>,
    pub connected_networks: Vec<BTreeSet<NodeId>>,
}

impl ValidationReport {
    /// Network details of the floating-nodes issue, if any
    pub fn floating_networks(&self) -> Option<&[NetworkDetail]> {
        self.issues.iter().find_map(|issue| match issue {
            Issue::FloatingNodes { details, .. } => Some(details.as_slice()),
            _ => None,
        })
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Validate a component list. Never fails: blocking a solve on the report is
/// the caller's decision.
pub fn validate_circuit(components: &[Component]) -> ValidationReport {
    let graph = ConnectivityGraph::from_components(components);
    let connected_networks = graph.connected_networks();

    let mut report = ValidationReport {
        is_valid: true,
        issues: Vec::new(),
        warnings: Vec::new(),
        suggestions: Vec::new(),
        connected_networks: connected_networks.clone(),
    };

    for component in components {
        if let Err(CircuitError::InvalidComponentShape { name, kind, expected, actual }) = component.validate() {
            report.is_valid = false;
            report.issues.push(Issue::InvalidComponentShape {
                message: format!("{} '{}' needs {} node(s) but has {}", kind, name, expected, actual),
                component: name,
                kind,
                expected,
                actual,
            });
        }
    }

    if connected_networks.len() > 1 {
        let details = describe_networks(&connected_networks, components);
        debug!("Found {} isolated networks", details.len());

        report.is_valid = false;
        report.suggestions.extend(suggest_connection_fixes(&details));
        report.issues.push(Issue::FloatingNodes {
            message: format!("Circuit has {} isolated networks", details.len()),
            details,
        });
    }

    if let Some(warning) = check_ground(components) {
        warn!("{}", warning.message());
        report.warnings.push(warning);
    }

    if let Some(warning) = check_load(components) {
        warn!("{}", warning.message());
        report.warnings.push(warning);
    }

    report
}

fn has_kind(components: &[Component], kind: ComponentType) -> bool {
    components.iter().any(|comp| comp.component_type == kind)
}

fn check_ground(components: &[Component]) -> Option<Warning> {
    if has_kind(components, ComponentType::VoltageSource) && !has_kind(components, ComponentType::Ground) {
        return Some(Warning::MissingGround {
            message: "Circuit has voltage sources but no explicit ground connection".to_string(),
            suggestion: "Add a ground component to provide a voltage reference".to_string(),
        });
    }
    None
}

fn check_load(components: &[Component]) -> Option<Warning> {
    if has_kind(components, ComponentType::VoltageSource) && !components.iter().any(Component::is_load) {
        return Some(Warning::MissingLoad {
            message: "Circuit has voltage sources but no load resistors".to_string(),
            suggestion: "Add resistors to create a complete current path and prevent short circuits".to_string(),
        });
    }
    None
}

/// Bridge the first power network to the first ground network (through a
/// resistor) and to the first remaining network (through a wire).
fn suggest_connection_fixes(details: &[NetworkDetail]) -> Vec<Suggestion> {
    let mut power = None;
    let mut ground = None;
    let mut other = None;

    for detail in details {
        let slot = if detail.contains_kind(ComponentType::VoltageSource) {
            &mut power
        } else if detail.contains_kind(ComponentType::Ground) {
            &mut ground
        } else {
            &mut other
        };
        if slot.is_none() {
            *slot = Some(detail);
        }
    }

    let Some(power) = power else {
        return Vec::new();
    };

    let mut suggestions = Vec::new();
    if let Some(ground) = ground {
        suggestions.push(Suggestion {
            kind: SuggestionKind::ConnectPowerToGround,
            message: "Connect power source to ground through a load resistor".to_string(),
            from_nodes: power.nodes.clone(),
            to_nodes: ground.nodes.clone(),
            suggested_component: ComponentType::Resistor,
        });
    }
    if let Some(other) = other {
        suggestions.push(Suggestion {
            kind: SuggestionKind::ConnectPowerToComponents,
            message: "Connect power source to component network".to_string(),
            from_nodes: power.nodes.clone(),
            to_nodes: other.nodes.clone(),
            suggested_component: ComponentType::Wire,
        });
    }
    suggestions
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CIRCUIT VALIDATION REPORT")?;
        writeln!(f, "{}", "=".repeat(40))?;

        if self.is_valid {
            writeln!(f, "Circuit appears valid!")?;
        } else {
            writeln!(f, "Circuit has issues that need fixing:")?;
            for issue in &self.issues {
                writeln!(f, "\n  {}", issue.message())?;
                if let Issue::FloatingNodes { details, .. } = issue {
                    for (i, detail) in details.iter().enumerate() {
                        writeln!(f, "   Network {}: {}", i + 1, detail)?;
                    }
                }
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f, "\nWarnings:")?;
            for warning in &self.warnings {
                writeln!(f, "   - {}", warning.message())?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f, "\nSuggestions to fix issues:")?;
            for suggestion in &self.suggestions {
                writeln!(
                    f,
                    "   - {} ({}: {:?} -> {:?})",
                    suggestion.message, suggestion.suggested_component, suggestion.from_nodes, suggestion.to_nodes
                )?;
            }
        }

        Ok(())
    }
}
