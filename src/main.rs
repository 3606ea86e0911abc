use clap::{Arg, ArgAction, Command};
use colored::*;
use log::{error, info};
use std::path::Path;

use gridsim::cli::{self, CliArgs};
use gridsim::simulator::{Simulator, SimulatorConfig};

fn main() {
    let matches = create_cli().get_matches();

    let args = match CliArgs::from_matches(&matches) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level())).init();

    if let Err(e) = run_application(args) {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("gridsim")
        .version(gridsim::VERSION)
        .about(gridsim::DESCRIPTION)
        .arg(
            Arg::new("input")
                .help("Input circuit file (JSON component list)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for the operating point"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("validate-only")
                .long("validate-only")
                .action(ArgAction::SetTrue)
                .help("Only print the validation report"),
        )
        .arg(
            Arg::new("reference")
                .long("reference")
                .value_name("NODE")
                .help("Node grounded when the circuit has no ground component"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

fn run_application(args: CliArgs) -> anyhow::Result<()> {
    info!("Input file: {}", args.input_file.bright_blue());

    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let circuit = cli::load_circuit(&args.input_file)?;
    if !circuit.title.is_empty() {
        println!("Circuit: {}", circuit.title.bold());
    }

    let mut config = SimulatorConfig::default();
    config.mna.fallback_reference = args.fallback_reference;
    let mut simulator = Simulator::with_config(config);

    let report = simulator.validate(circuit.components());
    if report.is_valid && !report.has_warnings() {
        println!("{}", "Circuit appears valid".green());
    } else {
        println!("{}", report.to_string().yellow());
    }

    if args.validate_only {
        return Ok(());
    }

    let solution = simulator.solve(circuit.components())?;

    if let Some(output_file) = args.output_file {
        simulator.export_results(&solution, &output_file, args.output_format)?;
        println!("Results exported to: {}", output_file.bright_green());
    } else {
        simulator.print_summary(&solution);
    }

    info!("{}", "Analysis completed successfully!".green().bold());
    Ok(())
}
