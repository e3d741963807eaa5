//! agebench CLI - generate update logs and run the aging driver
//!
//! Usage:
//!   agebench generate <path> [--vertices N] [--edges N] [--temp-vertices N]
//!                            [--ops-mult M] [--max-weight W] [--seed S]
//!   agebench run <path> [--threads T] [--granularity G] [--build-frequency MS]
//!                       [--reports-per-ops R] [--latency] [--progress]
//!
//! `run` replays the log against the built-in adjacency list and prints
//! the result record as JSON on stdout. Diagnostics go to stderr and are
//! filtered via RUST_LOG.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use agebench::graphlog::{generate_log, GeneratorParams};
use agebench::{AdjacencyList, AgingExperiment, DriverError};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let outcome = match args.first().map(String::as_str) {
        Some("generate") => cmd_generate(&args[1..]),
        Some("run") => cmd_run(&args[1..]),
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Err(DriverError::Config("expected a subcommand".into()))
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  agebench generate <path> [--vertices N] [--edges N] [--temp-vertices N]");
    eprintln!("                           [--ops-mult M] [--max-weight W] [--seed S]");
    eprintln!("  agebench run <path> [--threads T] [--granularity G] [--build-frequency MS]");
    eprintln!("                      [--reports-per-ops R] [--latency] [--progress]");
}

fn cmd_generate(args: &[String]) -> Result<(), DriverError> {
    let (path, flags) = split_path(args)?;
    let mut params = GeneratorParams::default();

    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--vertices" => params.num_vertices = parse_value(flag, iter.next())?,
            "--edges" => params.num_final_edges = parse_value(flag, iter.next())?,
            "--temp-vertices" => params.num_temporary_vertices = parse_value(flag, iter.next())?,
            "--ops-mult" => params.ops_multiplier = parse_value(flag, iter.next())?,
            "--max-weight" => params.max_weight = parse_value(flag, iter.next())?,
            "--seed" => params.seed = parse_value(flag, iter.next())?,
            other => return Err(DriverError::Config(format!("unknown flag `{other}`"))),
        }
    }

    let summary = generate_log(path, &params)?;
    tracing::info!(
        operations = summary.num_operations,
        final_vertices = summary.num_final_vertices,
        final_edges = summary.num_final_edges,
        temporary_vertices = summary.num_temporary_vertices,
        "log written to {path}"
    );
    Ok(())
}

fn cmd_run(args: &[String]) -> Result<(), DriverError> {
    let (path, flags) = split_path(args)?;
    let mut experiment = AgingExperiment::new()
        .library(Arc::new(AdjacencyList::undirected()))
        .log(path);

    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--threads" => {
                experiment = experiment.parallelism_degree(parse_value(flag, iter.next())?);
            }
            "--granularity" => {
                experiment = experiment.worker_granularity(parse_value(flag, iter.next())?);
            }
            "--build-frequency" => {
                let millis: u64 = parse_value(flag, iter.next())?;
                experiment = experiment.build_frequency(Duration::from_millis(millis));
            }
            "--reports-per-ops" => {
                experiment = experiment.num_reports_per_ops(parse_value(flag, iter.next())?);
            }
            "--latency" => experiment = experiment.measure_latency(true),
            "--progress" => experiment = experiment.report_progress(true),
            other => return Err(DriverError::Config(format!("unknown flag `{other}`"))),
        }
    }

    let result = experiment.execute()?;
    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| DriverError::Config(format!("cannot serialize the result: {e}")))?;
    println!("{json}");
    Ok(())
}

fn split_path(args: &[String]) -> Result<(&str, &[String]), DriverError> {
    match args.first() {
        Some(path) if !path.starts_with("--") => Ok((path, &args[1..])),
        _ => Err(DriverError::Config("expected a log path".into())),
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, DriverError> {
    let raw = value
        .ok_or_else(|| DriverError::Config(format!("flag `{flag}` expects a value")))?;
    raw.parse()
        .map_err(|_| DriverError::Config(format!("invalid value `{raw}` for flag `{flag}`")))
}
