//! PDF Security Gate - Command-Line Interface
//! Author: kartik4091
//!
//! `serve` runs the HTTP gateway; `sanitize` pushes one local file through
//! the same pipeline and prints the report.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgMatches, Command};
use pdfgate::config::GateConfig;
use pdfgate::gateway;
use pdfgate::pipeline::Pipeline;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let level = matches
        .get_one::<String>("verbose")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(level);

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = match GateConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let code = match matches.subcommand() {
        Some(("serve", _)) => run_serve(&config).await,
        Some(("sanitize", sub)) => run_sanitize(&mut config, sub).await,
        _ => {
            error!("No command given; try --help");
            2
        }
    };
    process::exit(code);
}

fn build_cli() -> Command {
    Command::new("pdfgate")
        .version(env!("CARGO_PKG_VERSION"))
        .author("kartik4091")
        .about("Security and sanitization gate for untrusted PDF uploads")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file (JSON/YAML)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .value_name("LEVEL")
                .global(true)
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set logging verbosity"),
        )
        .subcommand(Command::new("serve").about("Run the HTTP gateway"))
        .subcommand(
            Command::new("sanitize")
                .about("Sanitize one local PDF and print the report")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .required(true)
                        .help("Input PDF file path"),
                )
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Directory for the sanitized file (defaults to upload_dir)"),
                ),
        )
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pdfgate={}", level)));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

async fn run_serve(config: &GateConfig) -> i32 {
    match gateway::serve(config).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Gateway failed: {}", e);
            1
        }
    }
}

async fn run_sanitize(config: &mut GateConfig, matches: &ArgMatches) -> i32 {
    let input = match matches.get_one::<String>("input") {
        Some(input) => PathBuf::from(input),
        None => return 2,
    };
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.upload_dir = PathBuf::from(dir);
    }

    let data = match fs::read(&input) {
        Ok(data) => data,
        Err(e) => {
            error!("Cannot read {}: {}", input.display(), e);
            return 1;
        }
    };

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{}", e.kind().public_message());
            return 1;
        }
    };

    info!(input = %input.display(), "Sanitizing local file");
    let size = data.len() as u64;
    let result = tokio::task::spawn_blocking(move || pipeline.process(&data, size)).await;

    match result {
        Ok(Ok(report)) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                error!("Failed to encode report: {}", e);
                1
            }
        },
        Ok(Err(e)) => {
            error!("Rejected: {}", e.kind().public_message());
            1
        }
        Err(e) => {
            error!("Sanitization task failed: {}", e);
            1
        }
    }
}
