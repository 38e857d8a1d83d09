#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use mx_conformance::{HarnessConfig, render_report, run_conformance};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = HarnessConfig::default_paths();
    let mut require_green = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--engine" => {
                let value = args.next().ok_or("--engine requires a path")?;
                config.engine_binary = PathBuf::from(value);
            }
            "--engine-workdir" => {
                let value = args.next().ok_or("--engine-workdir requires a path")?;
                config.engine_workdir = Some(PathBuf::from(value));
            }
            "--data-dir" => {
                let value = args.next().ok_or("--data-dir requires a path")?;
                config.data_dir = PathBuf::from(value);
            }
            "--seed" => {
                let value = args.next().ok_or("--seed requires a u64 value")?;
                config.master_seed = value.parse()?;
            }
            "--timeout-secs" => {
                let value = args.next().ok_or("--timeout-secs requires a u64 value")?;
                config.timeout = Duration::from_secs(value.parse()?);
            }
            "--report-json" => {
                let value = args.next().ok_or("--report-json requires a path")?;
                config.report_json = Some(PathBuf::from(value));
            }
            "--keep-artifacts" => {
                config.keep_artifacts = true;
            }
            "--require-green" => {
                require_green = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let outcome = run_conformance(&config)?;

    println!("=== ENGINE OUTPUT START ===");
    print!("{}", outcome.engine_output.stdout);
    println!("=== ENGINE OUTPUT END   ===");
    if !outcome.engine_output.stderr.trim().is_empty() {
        println!("=== ENGINE STDERR ===");
        print!("{}", outcome.engine_output.stderr);
        println!("=====================");
    }

    println!();
    print!("{}", render_report(&outcome.report));

    if require_green && !outcome.report.is_green() {
        return Err(format!(
            "conformance run not green: {} failed, {} not run",
            outcome.report.failed, outcome.report.not_run
        )
        .into());
    }

    Ok(())
}

fn print_help() {
    println!(
        "mx-conformance-cli\n\
         Usage:\n\
         \tmx-conformance-cli [--engine ./server] [--data-dir ../data] [--seed 42]\n\
         Options:\n\
         \t--engine <path>          Engine executable to spawn (default ./server)\n\
         \t--engine-workdir <path>  Working directory for the Engine process\n\
         \t--data-dir <path>        Directory for generated fixtures and the script (default ../data)\n\
         \t--seed <u64>             Master seed for randomized fixtures (default 42)\n\
         \t--timeout-secs <u64>     Engine deadline before a timeout failure (default 120)\n\
         \t--report-json <path>     Write the machine-readable run report here\n\
         \t--keep-artifacts         Skip end-of-run cleanup of generated files\n\
         \t--require-green          Exit non-zero when any scenario fails or is not run\n\
         \t-h, --help               Show this help"
    );
}
