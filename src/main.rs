use cdcr_sync_lib::orchestrator::{self, BatchSummary};
use cdcr_sync_lib::{logger, Cli, RunMode, SqliteStore, SyncConfig};

use clap::Parser;
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const EXIT_FATAL: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);
    info!("Starting CDCR sync...");

    let config = match SyncConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let store = match SqliteStore::open(&config.database) {
        Ok(store) => store,
        Err(e) => {
            error!("Could not open database {:?}: {}", config.database, e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not install interrupt handler: {}", e);
    }

    match &config.mode {
        RunMode::Single(identity) => match orchestrator::run_single(&config, &store, identity, &stop) {
            Ok(run) => {
                let rule = "=".repeat(80);
                match serde_json::to_string_pretty(&run.acquisition.record) {
                    Ok(json) => println!("\n{rule}\nSCRAPED DATA:\n{rule}\n{json}\n{rule}"),
                    Err(e) => error!("Could not serialize record for {}: {}", identity, e),
                }
                if stop.load(Ordering::SeqCst) {
                    return ExitCode::from(EXIT_INTERRUPTED);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::from(EXIT_FATAL)
            }
        },
        RunMode::Batch(source) => match orchestrator::run_batch(&config, &store, source, &stop) {
            Ok(summary) => finish(&summary),
            Err(e) => {
                error!("{}", e);
                ExitCode::from(EXIT_FATAL)
            }
        },
    }
}

fn finish(summary: &BatchSummary) -> ExitCode {
    println!("\n{summary}");
    if summary.interrupted {
        warn!("Sync interrupted by user");
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    }
}
