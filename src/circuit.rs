use std::fmt;
use serde::{Deserialize, Serialize};

use crate::error::CircuitError;
use crate::Result;

/// Electrical node identifier assigned by the caller (e.g. from a grid position).
///
/// Identifiers are opaque: they need not be contiguous or small.
pub type NodeId = usize;

/// The reserved reference node. It never gets a matrix row.
pub const GROUND: NodeId = 0;

/// Implicit series resistance of a wire, in ohms.
pub const WIRE_RESISTANCE: f64 = 1e-6;

/// Types of circuit components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    Resistor,
    Wire,
    Ground,
    VoltageSource,
}

impl ComponentType {
    /// Number of terminals a component of this kind must have
    pub fn terminal_count(&self) -> usize {
        match self {
            ComponentType::Ground => 1,
            ComponentType::Resistor | ComponentType::Wire | ComponentType::VoltageSource => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComponentType::Resistor => "Resistor",
            ComponentType::Wire => "Wire",
            ComponentType::Ground => "Ground",
            ComponentType::VoltageSource => "VoltageSource",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Circuit component/element.
///
/// `nodes[0]` is the "from"/positive terminal. `value` holds the resistance
/// for resistors and wires, the signed voltage for sources and is unused for
/// ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub component_type: ComponentType,
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub value: f64,
}

impl Component {
    pub fn new_resistor(name: impl Into<String>, node1: NodeId, node2: NodeId, resistance: f64) -> Self {
        Component {
            name: name.into(),
            component_type: ComponentType::Resistor,
            nodes: vec![node1, node2],
            value: resistance,
        }
    }

    pub fn new_wire(name: impl Into<String>, node1: NodeId, node2: NodeId) -> Self {
        Component {
            name: name.into(),
            component_type: ComponentType::Wire,
            nodes: vec![node1, node2],
            value: WIRE_RESISTANCE,
        }
    }

    pub fn new_ground(name: impl Into<String>, node: NodeId) -> Self {
        Component {
            name: name.into(),
            component_type: ComponentType::Ground,
            nodes: vec![node],
            value: 0.0,
        }
    }

    pub fn new_voltage_source(name: impl Into<String>, node_pos: NodeId, node_neg: NodeId, voltage: f64) -> Self {
        Component {
            name: name.into(),
            component_type: ComponentType::VoltageSource,
            nodes: vec![node_pos, node_neg],
            value: voltage,
        }
    }

    /// Resistance in ohms for resistive elements
    pub fn resistance(&self) -> Option<f64> {
        match self.component_type {
            ComponentType::Resistor => Some(self.value),
            ComponentType::Wire if self.value > 0.0 => Some(self.value),
            ComponentType::Wire => Some(WIRE_RESISTANCE),
            _ => None,
        }
    }

    /// Source voltage, for voltage sources only
    pub fn voltage(&self) -> Option<f64> {
        match self.component_type {
            ComponentType::VoltageSource => Some(self.value),
            _ => None,
        }
    }

    /// Returns true for a resistor with nonzero resistance
    pub fn is_load(&self) -> bool {
        self.component_type == ComponentType::Resistor && self.value != 0.0
    }

    /// Conductance used when stamping a passive element.
    ///
    /// A zero-resistance resistor is modeled as a near-short with
    /// `short_conductance` siemens.
    pub fn conductance(&self, short_conductance: f64) -> Option<f64> {
        let resistance = self.resistance()?;
        if resistance > 0.0 {
            Some(1.0 / resistance)
        } else {
            Some(short_conductance)
        }
    }

    /// Ohm's law current from `nodes[0]` to `nodes[1]` for passive elements.
    ///
    /// Zero-resistance resistors report 0 A.
    pub fn ohmic_current(&self, v_from: f64, v_to: f64) -> Option<f64> {
        let resistance = self.resistance()?;
        if resistance == 0.0 {
            Some(0.0)
        } else {
            Some((v_from - v_to) / resistance)
        }
    }

    /// Positive and negative terminal ids, if this is a two-terminal component
    pub fn terminals(&self) -> Option<(NodeId, NodeId)> {
        match self.nodes.as_slice() {
            [n1, n2] => Some((*n1, *n2)),
            _ => None,
        }
    }

    /// Returns true if any terminal sits on `node`
    pub fn touches(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Validate that the component has the correct number of nodes and sane parameters
    pub fn validate(&self) -> Result<()> {
        let expected = self.component_type.terminal_count();
        if self.nodes.len() != expected {
            return Err(CircuitError::InvalidComponentShape {
                name: self.name.clone(),
                kind: self.component_type,
                expected,
                actual: self.nodes.len(),
            });
        }

        match self.component_type {
            ComponentType::Resistor => {
                if !self.value.is_finite() || self.value < 0.0 {
                    return Err(CircuitError::invalid_parameter(
                        &self.name,
                        format!("resistance must be finite and non-negative, got {}", self.value),
                    ));
                }
            }
            ComponentType::VoltageSource => {
                if !self.value.is_finite() {
                    return Err(CircuitError::invalid_parameter(
                        &self.name,
                        format!("voltage must be finite, got {}", self.value),
                    ));
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// An ordered, owned list of components as supplied by the editor layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    #[serde(default)]
    pub title: String,
    pub components: Vec<Component>,
}

impl Circuit {
    pub fn new(title: impl Into<String>) -> Self {
        Circuit {
            title: title.into(),
            components: Vec::new(),
        }
    }

    pub fn from_components(title: impl Into<String>, components: Vec<Component>) -> Self {
        Circuit {
            title: title.into(),
            components,
        }
    }

    /// Add a component after checking its shape
    pub fn add_component(&mut self, component: Component) -> Result<()> {
        component.validate()?;
        self.components.push(component);
        Ok(())
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get components of a specific type
    pub fn components_of_type(&self, component_type: ComponentType) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .filter(move |comp| comp.component_type == component_type)
    }

    /// Get all voltage sources, in list order
    pub fn voltage_sources(&self) -> Vec<&Component> {
        self.components_of_type(ComponentType::VoltageSource).collect()
    }

    pub fn has_ground(&self) -> bool {
        self.components_of_type(ComponentType::Ground).next().is_some()
    }

    /// Look up a component by name
    pub fn get_component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|comp| comp.name == name)
    }

    /// Validate every component
    pub fn validate(&self) -> Result<()> {
        self.components.iter().try_for_each(Component::validate)
    }
}

impl From<Vec<Component>> for Circuit {
    fn from(components: Vec<Component>) -> Self {
        Circuit::from_components(String::new(), components)
    }
}
