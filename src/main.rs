// Entrypoint for the CLI application.
// - Keeps `main` small: resolve configuration, then hand off to `run`.
// - Every failure path exits 1; only a fully successful upload exits 0.

use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use zap_dojo::run::{run, RunConfig};

#[derive(Parser)]
#[command(name = "zap-dojo")]
#[command(about = "Uploads OWASP ZAP scan reports to DefectDojo")]
#[command(version)]
struct Cli {
    /// Directory containing the ZAP scan reports
    report_dir: PathBuf,

    /// URL that was scanned (used to derive the product name)
    target_url: String,
}

fn main() {
    // clap exits 2 on bad arguments by default; the exit-code contract for
    // this tool is 1 for every failure, so parse errors are mapped here.
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit(0),
            _ => exit(1),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let base_url =
        std::env::var("DEFECT_DOJO_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    let api_token = match std::env::var("DEFECT_DOJO_API_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => {
            eprintln!("DEFECT_DOJO_API_TOKEN environment variable not set");
            exit(1);
        }
    };

    let cfg = RunConfig {
        report_dir: cli.report_dir,
        target_url: cli.target_url,
        base_url,
        api_token,
    };

    if let Err(err) = run(&cfg) {
        eprintln!("Error: {err:#}");
        exit(1);
    }
}
