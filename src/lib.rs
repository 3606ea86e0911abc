pub mod circuit;
pub mod cli;
pub mod error;
pub mod graph;
pub mod mna;
pub mod simulator;
pub mod solver;
pub mod validator;

// Re-export commonly used types
pub use circuit::{Circuit, Component, ComponentType, NodeId, GROUND};
pub use error::CircuitError;
pub use simulator::{DcSolution, Simulator, SimulatorConfig};
pub use validator::{validate_circuit, ValidationReport};

// Error types
pub type Result<T> = std::result::Result<T, CircuitError>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
