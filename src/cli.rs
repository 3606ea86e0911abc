use std::fs;
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use serde::Deserialize;

use crate::circuit::{Circuit, Component, NodeId};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    pub validate_only: bool,
    pub fallback_reference: Option<NodeId>,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let fallback_reference = matches
            .get_one::<String>("reference")
            .map(|value| parse_node_id(value))
            .transpose()?;

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            validate_only: matches.get_flag("validate-only"),
            fallback_reference,
            verbose_level,
        })
    }

    /// Log filter matching the `-v` count
    pub fn log_level(&self) -> &'static str {
        match self.verbose_level {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Accepted circuit file shapes: a bare component array or a titled circuit
#[derive(Deserialize)]
#[serde(untagged)]
enum CircuitFile {
    Circuit(Circuit),
    Components(Vec<Component>),
}

/// Load a circuit from a JSON file
pub fn load_circuit(filename: &str) -> Result<Circuit> {
    let content = fs::read_to_string(filename)
        .with_context(|| format!("Failed to read file '{}'", filename))?;
    parse_circuit(&content).with_context(|| format!("Invalid circuit file '{}'", filename))
}

pub fn parse_circuit(content: &str) -> Result<Circuit> {
    let circuit = match serde_json::from_str::<CircuitFile>(content)? {
        CircuitFile::Circuit(circuit) => circuit,
        CircuitFile::Components(components) => Circuit::from(components),
    };
    Ok(circuit)
}

fn parse_node_id(value: &str) -> Result<NodeId> {
    value
        .trim()
        .parse::<NodeId>()
        .map_err(|e| anyhow!("Invalid node id '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ComponentType;

    #[test]
    fn test_parse_component_array() {
        let circuit = parse_circuit(
            r#"[
                {"name": "VS1", "component_type": "VoltageSource", "nodes": [1, 0], "value": 5.0},
                {"name": "R1", "component_type": "Resistor", "nodes": [1, 0], "value": 1000.0},
                {"name": "GND", "component_type": "Ground", "nodes": [0]}
            ]"#,
        )
        .unwrap();

        assert_eq!(circuit.components.len(), 3);
        assert_eq!(circuit.components[2].component_type, ComponentType::Ground);
        assert!(circuit.title.is_empty());
    }

    #[test]
    fn test_parse_titled_circuit() {
        let circuit = parse_circuit(
            r#"{"title": "Divider", "components": [
                {"name": "W1", "component_type": "Wire", "nodes": [3, 4]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(circuit.title, "Divider");
        assert_eq!(circuit.components[0].resistance(), Some(crate::circuit::WIRE_RESISTANCE));
    }

    #[test]
    fn test_parse_node_id() {
        assert_eq!(parse_node_id(" 12 ").unwrap(), 12);
        assert!(parse_node_id("-1").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_circuit("/nonexistent/circuit.json").is_err());
    }
}
