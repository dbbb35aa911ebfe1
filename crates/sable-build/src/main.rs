//! sable-buildd - the resident Sable build service
//!
//! Reads newline-delimited JSON build requests from stdin and answers
//! each with one JSON response on stdout. Stays resident between
//! requests so the project cache keeps its parse results.

use clap::Parser;
use sable_build::{build_once, BuildService};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sable-buildd")]
#[command(about = "Sable build service", long_about = None)]
#[command(version)]
struct Cli {
    /// Compile one project and exit instead of serving requests
    #[arg(long, value_name = "SPROJ", requires = "out")]
    project: Option<PathBuf>,

    /// Output image path for --project
    #[arg(long, value_name = "SBIN")]
    out: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let (Some(project), Some(out)) = (cli.project.as_deref(), cli.out.as_deref()) {
        return match build_once(project, out) {
            Ok((success, diagnostics)) => {
                for diagnostic in &diagnostics {
                    eprintln!("{diagnostic}");
                }
                if success {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut service = BuildService::new();
    match service.run(BufReader::new(stdin.lock()), stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
