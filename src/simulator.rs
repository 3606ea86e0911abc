use std::collections::BTreeMap;
use std::time::Instant;
use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::{Component, ComponentType, NodeId};
use crate::cli::OutputFormat;
use crate::error::CircuitError;
use crate::graph::{describe_networks, ConnectivityGraph, NetworkDetail};
use crate::mna::{MnaConfig, MnaSystem, NodeIndex};
use crate::solver::{LinearSolver, SolverConfig, SolverStats};
use crate::validator::{validate_circuit, ValidationReport};
use crate::Result;

/// Operating point of a circuit.
///
/// Voltage source currents are the raw MNA branch unknowns: current entering
/// the positive terminal from the circuit, so a source delivering power
/// reports a negative current and negative power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcSolution {
    /// Node voltages, always including the reference node at 0 V
    pub voltages: BTreeMap<NodeId, f64>,
    /// Voltage source branch currents, in component-list order
    pub source_currents: Vec<f64>,
    /// Current per component name
    pub currents: BTreeMap<String, f64>,
    /// Power per component name
    pub power: BTreeMap<String, f64>,
    /// True when no ground component existed and a reference node was picked
    pub fallback_grounded: bool,
    pub stats: SolverStats,
}

impl DcSolution {
    /// Voltage at a node; ids that were not part of the solve read 0 V
    pub fn voltage(&self, node: NodeId) -> f64 {
        self.voltages.get(&node).copied().unwrap_or(0.0)
    }

    pub fn current(&self, name: &str) -> Option<f64> {
        self.currents.get(name).copied()
    }

    pub fn power(&self, name: &str) -> Option<f64> {
        self.power.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub mna: MnaConfig,
    pub solver: SolverConfig,
    /// Reject circuits with isolated networks before any numeric work
    pub validate_connectivity: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            mna: MnaConfig::default(),
            solver: SolverConfig::default(),
            validate_connectivity: true,
        }
    }
}

/// Main analysis engine.
///
/// Each solve is self-contained; only the most recent node map and source
/// branch currents are kept, for labelling and current reporting.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    config: SimulatorConfig,
    solver: LinearSolver,
    node_index: Option<NodeIndex>,
    branch_currents: Vec<f64>,
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        let solver = LinearSolver::with_config(config.solver.clone());
        Simulator {
            config,
            solver,
            node_index: None,
            branch_currents: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Node map of the most recent successful solve
    pub fn node_index(&self) -> Option<&NodeIndex> {
        self.node_index.as_ref()
    }

    /// Structured connectivity, reference and load diagnostics
    pub fn validate(&self, components: &[Component]) -> ValidationReport {
        validate_circuit(components)
    }

    /// Run DC operating point analysis
    pub fn solve(&mut self, components: &[Component]) -> Result<DcSolution> {
        info!("Starting operating point analysis of {} components", components.len());
        let start_time = Instant::now();

        for component in components {
            component.validate()?;
        }

        if self.config.validate_connectivity {
            if let Some(networks) = floating_networks(components) {
                warn!("Circuit splits into {} isolated networks", networks.len());
                return Err(CircuitError::FloatingNetwork { networks });
            }
        }

        let mut system = MnaSystem::build(components, &self.config.mna)?;
        let (solution, stats) = self
            .solver
            .solve_dense(&system.matrix, &system.rhs)
            .map_err(|err| explain_failure(err, components))?;

        // A floating island still factorizes thanks to the regularization
        if let Some(cond) = stats.condition_number {
            if cond > self.solver.config().condition_threshold {
                if let Some(networks) = floating_networks(components) {
                    return Err(CircuitError::FloatingNetwork { networks });
                }
            }
        }
        system.update_solution(&solution)?;

        if !stats.success {
            warn!("Residual norm {:.2e} exceeds tolerance", stats.residual_norm);
        }

        let voltages = system.node_voltages();
        self.branch_currents = system.branch_currents();
        self.node_index = Some(system.node_index);

        let currents = self.calculate_currents(components, &voltages);
        let power = self.calculate_power(components, &voltages, &currents);

        info!(
            "Operating point analysis completed in {:.3}ms",
            start_time.elapsed().as_secs_f64() * 1000.0
        );

        Ok(DcSolution {
            voltages,
            source_currents: self.branch_currents.clone(),
            currents,
            power,
            fallback_grounded: system.fallback_grounded,
            stats,
        })
    }

    /// Current through every component that reports one.
    ///
    /// Resistors and wires use Ohm's law on the given voltages; voltage
    /// sources read the branch currents of the most recent solve.
    pub fn calculate_currents(
        &self,
        components: &[Component],
        voltages: &BTreeMap<NodeId, f64>,
    ) -> BTreeMap<String, f64> {
        let voltage_at = |node: NodeId| voltages.get(&node).copied().unwrap_or(0.0);
        let mut currents = BTreeMap::new();
        let mut branch = 0;

        for component in components {
            let current = match component.component_type {
                ComponentType::Ground => None,
                ComponentType::VoltageSource => {
                    let current = self.branch_currents.get(branch).copied();
                    branch += 1;
                    current
                }
                ComponentType::Resistor | ComponentType::Wire => component
                    .terminals()
                    .and_then(|(n1, n2)| component.ohmic_current(voltage_at(n1), voltage_at(n2))),
            };

            if let Some(current) = current {
                debug!("I({}) = {:.6e} A", component.name, current);
                currents.insert(component.name.clone(), current);
            }
        }

        currents
    }

    /// Power per component: I²R for resistors, V×I for sources, ΔV×I otherwise
    pub fn calculate_power(
        &self,
        components: &[Component],
        voltages: &BTreeMap<NodeId, f64>,
        currents: &BTreeMap<String, f64>,
    ) -> BTreeMap<String, f64> {
        let voltage_at = |node: NodeId| voltages.get(&node).copied().unwrap_or(0.0);

        components
            .iter()
            .filter_map(|component| {
                let current = *currents.get(&component.name)?;
                let (n1, n2) = component.terminals()?;
                let power = match component.component_type {
                    ComponentType::Resistor => current * current * component.value,
                    ComponentType::VoltageSource => component.value * current,
                    _ => (voltage_at(n1) - voltage_at(n2)) * current,
                };
                Some((component.name.clone(), power))
            })
            .collect()
    }

    /// Export an operating point to file
    pub fn export_results(&self, solution: &DcSolution, filename: &str, format: OutputFormat) -> anyhow::Result<()> {
        match format {
            OutputFormat::Csv => self.export_csv(solution, filename),
            OutputFormat::Json => self.export_json(solution, filename),
        }
    }

    /// Export results to CSV format
    fn export_csv(&self, solution: &DcSolution, filename: &str) -> anyhow::Result<()> {
        use csv::Writer;

        let mut writer = Writer::from_path(filename)
            .with_context(|| format!("Failed to create '{}'", filename))?;

        writer.write_record(["quantity", "name", "value"])?;
        for (node, voltage) in &solution.voltages {
            writer.write_record(["V", &node.to_string(), &voltage.to_string()])?;
        }
        for (name, current) in &solution.currents {
            writer.write_record(["I", name.as_str(), &current.to_string()])?;
        }
        for (name, power) in &solution.power {
            writer.write_record(["P", name.as_str(), &power.to_string()])?;
        }

        writer.flush()?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    /// Export results to JSON format
    fn export_json(&self, solution: &DcSolution, filename: &str) -> anyhow::Result<()> {
        use std::fs::File;

        let file = File::create(filename).with_context(|| format!("Failed to create '{}'", filename))?;
        serde_json::to_writer_pretty(file, solution)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }

    /// Print simulation summary
    pub fn print_summary(&self, solution: &DcSolution) {
        println!("\n=== Operating Point ===");
        println!("Solve time: {:.3}ms", solution.stats.solve_time * 1000.0);
        println!("Success: {}", solution.stats.success);
        if let Some(cond) = solution.stats.condition_number {
            println!("Condition number: {:.2e}", cond);
        }
        if solution.fallback_grounded {
            println!("No ground component: a reference node was chosen automatically");
        }

        println!("\nNode voltages:");
        for (node, voltage) in &solution.voltages {
            println!("  V({}): {:.6}V", node, voltage);
        }

        if !solution.currents.is_empty() {
            println!("\nComponent currents:");
            for (name, current) in &solution.currents {
                let power = solution.power(name).unwrap_or(0.0);
                println!("  I({}): {:.6}A  P: {:.6}W", name, current, power);
            }
        }
    }
}

/// Isolated networks, when the circuit splits into more than one
fn floating_networks(components: &[Component]) -> Option<Vec<NetworkDetail>> {
    let networks = ConnectivityGraph::from_components(components).connected_networks();
    if networks.len() > 1 {
        Some(describe_networks(&networks, components))
    } else {
        None
    }
}

/// Re-classify a numeric failure as an isolated-network problem when the
/// topology explains it.
fn explain_failure(err: CircuitError, components: &[Component]) -> CircuitError {
    if !matches!(err, CircuitError::SingularSystem { .. }) {
        return err;
    }

    match floating_networks(components) {
        Some(networks) => CircuitError::FloatingNetwork { networks },
        None => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn simple_circuit() -> Vec<Component> {
        vec![
            Component::new_voltage_source("VS1", 1, 0, 5.0),
            Component::new_resistor("R1", 1, 0, 1000.0),
            Component::new_ground("GND", 0),
        ]
    }

    #[test]
    fn test_simulator_operating_point() {
        let mut simulator = Simulator::new();
        let solution = simulator.solve(&simple_circuit()).unwrap();

        assert!(solution.stats.success);
        assert_abs_diff_eq!(solution.voltage(1), 5.0, epsilon = 1e-9);
        assert_eq!(solution.voltages[&0], 0.0);
        assert_abs_diff_eq!(solution.current("R1").unwrap(), 0.005, epsilon = 1e-9);
        assert_eq!(solution.current("GND"), None);
        assert!(!solution.fallback_grounded);
    }

    #[test]
    fn test_source_current_is_branch_unknown() {
        let mut simulator = Simulator::new();
        let solution = simulator.solve(&simple_circuit()).unwrap();

        assert_eq!(solution.source_currents.len(), 1);
        assert_abs_diff_eq!(solution.current("VS1").unwrap(), -0.005, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.power("VS1").unwrap(), -0.025, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.power("R1").unwrap(), 0.025, epsilon = 1e-9);
    }

    #[test]
    fn test_calculate_currents_after_solve() {
        let components = simple_circuit();
        let mut simulator = Simulator::new();
        let solution = simulator.solve(&components).unwrap();

        let currents = simulator.calculate_currents(&components, &solution.voltages);
        assert_eq!(currents, solution.currents);
        assert_eq!(simulator.node_index().unwrap().index(1), Some(0));
    }

    #[test]
    fn test_floating_network_fails_before_solve() {
        let components = vec![
            Component::new_voltage_source("VS1", 1, 0, 15.0),
            Component::new_wire("W1", 3, 4),
            Component::new_ground("GND", 7),
        ];
        let mut simulator = Simulator::new();
        let err = simulator.solve(&components).unwrap_err();

        match err {
            CircuitError::FloatingNetwork { networks } => assert_eq!(networks.len(), 3),
            other => panic!("unexpected error: {}", other),
        }
        assert!(simulator.node_index().is_none());
    }

    #[test]
    fn test_invalid_shape_is_fatal() {
        let mut bad = Component::new_voltage_source("VS1", 1, 0, 5.0);
        bad.nodes.push(4);
        let err = Simulator::new().solve(&[bad]).unwrap_err();
        assert!(matches!(err, CircuitError::InvalidComponentShape { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_missing_ground_uses_fallback() {
        let components = vec![
            Component::new_voltage_source("VS1", 2, 1, 3.0),
            Component::new_resistor("R1", 2, 1, 300.0),
        ];
        let solution = Simulator::new().solve(&components).unwrap();

        assert!(solution.fallback_grounded);
        assert_abs_diff_eq!(solution.voltage(2) - solution.voltage(1), 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.voltage(1), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(solution.current("R1").unwrap(), 0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_circuit() {
        let solution = Simulator::new().solve(&[]).unwrap();
        assert_eq!(solution.voltages, BTreeMap::from([(0, 0.0)]));
        assert!(solution.currents.is_empty());
    }

    #[test]
    fn test_export_json_and_csv() {
        let mut simulator = Simulator::new();
        let solution = simulator.solve(&simple_circuit()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("op.json");
        let json_path = json_path.to_str().unwrap();
        simulator.export_results(&solution, json_path, OutputFormat::Json).unwrap();
        let restored: DcSolution = serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(restored.currents.len(), solution.currents.len());

        let csv_path = dir.path().join("op.csv");
        let csv_path = csv_path.to_str().unwrap();
        simulator.export_results(&solution, csv_path, OutputFormat::Csv).unwrap();
        let text = std::fs::read_to_string(csv_path).unwrap();
        assert!(text.starts_with("quantity,name,value"));
        assert!(text.contains("I,R1,"));
    }
}
