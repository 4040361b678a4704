//! CLI entry point for the ingest/transcode daemon.
//!
//! Parses command line arguments and starts the daemon.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use xdtranscode_core::{init_logging, Daemon};

/// XDTranscode daemon - watches Sources, queues Jobs, runs them through Workers.
#[derive(Parser, Debug)]
#[command(name = "xdtranscoded")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "xdtranscode.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let daemon = match Daemon::new(&args.config) {
        Ok(daemon) => daemon,
        Err(e) => {
            eprintln!("Failed to initialize daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(daemon.config());

    println!("xdtranscoded starting...");
    println!("Config file: {}", args.config.display());
    println!("Status server: http://127.0.0.1:{}/status", daemon.config().status_server.port);

    if let Err(e) = daemon.run().await {
        eprintln!("Daemon error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
