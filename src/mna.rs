use std::collections::{BTreeMap, BTreeSet};
use log::{debug, trace, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::circuit::{Component, ComponentType, NodeId, GROUND};
use crate::error::CircuitError;
use crate::Result;

/// Numerical constants used while stamping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MnaConfig {
    /// Added to every node diagonal to keep isolated nodes invertible
    pub regularization: f64,
    /// Conductance tying a grounded node to the reference
    pub ground_conductance: f64,
    /// Conductance of a zero-resistance resistor
    pub short_conductance: f64,
    /// Node grounded when the circuit has no ground component.
    /// `None`, or a node that is not enumerated, selects matrix index 0.
    pub fallback_reference: Option<NodeId>,
}

impl Default for MnaConfig {
    fn default() -> Self {
        MnaConfig {
            regularization: 1e-12,
            ground_conductance: 1e6,
            short_conductance: 1e6,
            fallback_reference: None,
        }
    }
}

/// Mapping from node ids to matrix row/column indices.
///
/// Built from the sorted set of strictly positive ids, so the assignment
/// depends only on which ids appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeIndex {
    map: BTreeMap<NodeId, usize>,
}

impl NodeIndex {
    pub fn from_components(components: &[Component]) -> Self {
        let used: BTreeSet<NodeId> = components
            .iter()
            .flat_map(|comp| comp.nodes.iter().copied())
            .filter(|&node| node != GROUND)
            .collect();

        let map = used.into_iter().enumerate().map(|(idx, node)| (node, idx)).collect();
        NodeIndex { map }
    }

    /// Matrix index of a node; `None` for the reference node or an unknown id
    pub fn index(&self, node: NodeId) -> Option<usize> {
        self.map.get(&node).copied()
    }

    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        self.map.iter().find(|(_, &idx)| idx == index).map(|(&node, _)| node)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `(node id, matrix index)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        self.map.iter().map(|(&node, &idx)| (node, idx))
    }
}

/// MNA system representation: [A][x] = [z]
///
/// ```text
/// [ G  C ] [ V ]   [ I ]
/// [ B  D ] [ J ] = [ E ]
/// ```
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// System matrix A (coefficient matrix)
    pub matrix: DMatrix<f64>,
    /// Right-hand side vector z
    pub rhs: DVector<f64>,
    /// Unknown vector x (node voltages + voltage source currents)
    pub unknowns: DVector<f64>,
    pub node_index: NodeIndex,
    /// Voltage source names, in branch-row order
    pub voltage_sources: Vec<String>,
    /// Node-row indices tied to the reference
    pub grounded: BTreeSet<usize>,
    /// True when no ground component existed and a reference was picked
    pub fallback_grounded: bool,
    /// Total system size
    pub size: usize,
    /// Number of node rows (at least 1)
    pub num_nodes: usize,
    /// Number of voltage sources
    pub num_voltage_sources: usize,
}

impl MnaSystem {
    /// Enumerate nodes and sources and allocate a zeroed system
    pub fn new(components: &[Component]) -> Self {
        let node_index = NodeIndex::from_components(components);
        let voltage_sources: Vec<String> = components
            .iter()
            .filter(|comp| comp.component_type == ComponentType::VoltageSource)
            .map(|comp| comp.name.clone())
            .collect();

        let num_nodes = node_index.len().max(1);
        let num_voltage_sources = voltage_sources.len();
        let size = num_nodes + num_voltage_sources;

        MnaSystem {
            matrix: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
            unknowns: DVector::zeros(size),
            node_index,
            voltage_sources,
            grounded: BTreeSet::new(),
            fallback_grounded: false,
            size,
            num_nodes,
            num_voltage_sources,
        }
    }

    /// Enumerate and stamp in one step
    pub fn build(components: &[Component], config: &MnaConfig) -> Result<Self> {
        let mut system = MnaSystem::new(components);
        system.assemble(components, config)?;
        Ok(system)
    }

    /// Assemble the DC system. Components are only read; node-id to index
    /// translation goes through `self.node_index`.
    pub fn assemble(&mut self, components: &[Component], config: &MnaConfig) -> Result<()> {
        self.matrix.fill(0.0);
        self.rhs.fill(0.0);
        self.grounded.clear();
        self.fallback_grounded = false;

        if components.is_empty() {
            // Dummy grounded node: [1]·V = [0]
            self.matrix[(0, 0)] = 1.0;
            return Ok(());
        }

        debug!(
            "Assembling {}x{} system ({} nodes + {} voltage sources)",
            self.size, self.size, self.num_nodes, self.num_voltage_sources
        );
        debug!("Node mapping: {:?}", self.node_index.map);

        for i in 0..self.num_nodes {
            self.matrix[(i, i)] += config.regularization;
        }

        self.stamp_grounds(components, config);

        let mut branch = 0;
        for component in components {
            component.validate()?;
            match component.component_type {
                ComponentType::Ground => {}
                ComponentType::VoltageSource => {
                    self.stamp_voltage_source(component, branch)?;
                    branch += 1;
                }
                ComponentType::Resistor | ComponentType::Wire => {
                    self.stamp_passive(component, config)?;
                }
            }
        }

        Ok(())
    }

    fn stamp_grounds(&mut self, components: &[Component], config: &MnaConfig) {
        let mut has_ground = false;
        for component in components.iter().filter(|c| c.component_type == ComponentType::Ground) {
            has_ground = true;
            if let Some(idx) = component.nodes.first().and_then(|&node| self.node_index.index(node)) {
                self.grounded.insert(idx);
            }
        }

        if !has_ground {
            let idx = config
                .fallback_reference
                .and_then(|node| self.node_index.index(node))
                .unwrap_or(0);
            warn!("No ground component found, grounding matrix index {}", idx);
            self.grounded.insert(idx);
            self.fallback_grounded = true;
        }

        for &idx in &self.grounded {
            self.matrix[(idx, idx)] += config.ground_conductance;
            trace!("Applied ground connection at matrix index {}", idx);
        }
    }

    fn stamp_passive(&mut self, component: &Component, config: &MnaConfig) -> Result<()> {
        let (n1, n2) = self.terminals(component)?;
        let conductance = component
            .conductance(config.short_conductance)
            .ok_or_else(|| CircuitError::invalid_parameter(&component.name, "component has no resistance"))?;

        let idx1 = self.node_index.index(n1);
        let idx2 = self.node_index.index(n2);
        trace!(
            "Stamping {} '{}': {} S between indices {:?},{:?}",
            component.component_type, component.name, conductance, idx1, idx2
        );

        if let Some(i) = idx1 {
            self.matrix[(i, i)] += conductance;
        }
        if let Some(j) = idx2 {
            self.matrix[(j, j)] += conductance;
        }
        if let (Some(i), Some(j)) = (idx1, idx2) {
            self.matrix[(i, j)] -= conductance;
            self.matrix[(j, i)] -= conductance;
        }

        Ok(())
    }

    fn stamp_voltage_source(&mut self, component: &Component, branch: usize) -> Result<()> {
        let (n1, n2) = self.terminals(component)?;
        let row = self.num_nodes + branch;

        if let Some(i) = self.node_index.index(n1) {
            self.matrix[(i, row)] += 1.0;
            self.matrix[(row, i)] += 1.0;
        }
        if let Some(j) = self.node_index.index(n2) {
            self.matrix[(j, row)] -= 1.0;
            self.matrix[(row, j)] -= 1.0;
        }
        self.rhs[row] = component.value;

        trace!(
            "Stamping voltage source '{}': {} V between nodes {},{} (branch row {})",
            component.name, component.value, n1, n2, row
        );
        Ok(())
    }

    fn terminals(&self, component: &Component) -> Result<(NodeId, NodeId)> {
        component.terminals().ok_or_else(|| CircuitError::InvalidComponentShape {
            name: component.name.clone(),
            kind: component.component_type,
            expected: 2,
            actual: component.nodes.len(),
        })
    }

    /// Node-to-node conductance block G
    pub fn conductance_block(&self) -> DMatrix<f64> {
        self.matrix.view((0, 0), (self.num_nodes, self.num_nodes)).clone_owned()
    }

    /// Node-to-source coupling block C
    pub fn coupling_block(&self) -> DMatrix<f64> {
        self.matrix
            .view((0, self.num_nodes), (self.num_nodes, self.num_voltage_sources))
            .clone_owned()
    }

    /// Source-to-node coupling block B
    pub fn constraint_block(&self) -> DMatrix<f64> {
        self.matrix
            .view((self.num_nodes, 0), (self.num_voltage_sources, self.num_nodes))
            .clone_owned()
    }

    /// Update the solution vector
    pub fn update_solution(&mut self, solution: &DVector<f64>) -> Result<()> {
        if solution.len() != self.size {
            return Err(CircuitError::DimensionMismatch {
                expected: self.size,
                actual: solution.len(),
            });
        }
        self.unknowns.copy_from(solution);
        Ok(())
    }

    /// Get node voltage by node id; the reference and unknown ids read 0 V
    pub fn get_node_voltage(&self, node: NodeId) -> f64 {
        self.node_index
            .index(node)
            .map(|idx| self.unknowns[idx])
            .unwrap_or(0.0)
    }

    /// Branch current of the `branch`-th voltage source
    pub fn get_voltage_source_current(&self, branch: usize) -> Option<f64> {
        (branch < self.num_voltage_sources).then(|| self.unknowns[self.num_nodes + branch])
    }

    /// Voltage source branch currents, in enumeration order
    pub fn branch_currents(&self) -> Vec<f64> {
        self.unknowns
            .rows(self.num_nodes, self.num_voltage_sources)
            .iter()
            .copied()
            .collect()
    }

    /// Node voltages keyed by node id, including the reference at 0 V
    pub fn node_voltages(&self) -> BTreeMap<NodeId, f64> {
        let mut voltages: BTreeMap<NodeId, f64> = self
            .node_index
            .iter()
            .map(|(node, idx)| (node, self.unknowns[idx]))
            .collect();
        voltages.insert(GROUND, 0.0);
        voltages
    }
}
