//! `bm-switch`: runs a software switch from a JSON program description.

use bm_runtime::audit::{init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord};
use bm_runtime::objects::read_description;
use bm_runtime::{audit_log, DataPlaneDriver, DriverConfig, Switch, SwitchConfig, TableWalker};
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

/// Programmable match-action software switch
#[derive(Parser, Debug)]
#[command(name = "bm-switch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Program description to load at startup
    #[arg(long)]
    json: PathBuf,

    /// Allow staging a new program and swapping to it at runtime
    #[arg(long)]
    enable_swap: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Data-plane scheduling quantum in milliseconds
    #[arg(long, default_value = "10")]
    quantum_ms: u64,

    /// Packets processed per quantum
    #[arg(long, default_value = "64")]
    batch_size: usize,

    /// Ingress queue capacity
    #[arg(long, default_value = "1024")]
    queue_depth: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.log_format {
        LogFormat::Json => init_logging(&args.log_level),
        LogFormat::Pretty => init_logging_pretty(&args.log_level),
    }

    info!("Starting bm-switch");
    info!("Program: {}", args.json.display());
    if args.enable_swap {
        info!("Runtime configuration swap: ENABLED");
    }

    let desc = match read_description(&args.json) {
        Ok(desc) => desc,
        Err(e) => {
            error!("{}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    let switch = Arc::new(Switch::new(SwitchConfig {
        enable_swap: args.enable_swap,
    }));
    let generation = match switch.init_objects_from(&desc) {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to install program: {}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };
    info!("Program installed as generation {}", generation);

    let cancel = CancellationToken::new();
    let (driver, _ingress) = DataPlaneDriver::new(
        Arc::clone(&switch),
        Arc::new(TableWalker::default()),
        DriverConfig {
            quantum_ms: args.quantum_ms,
            batch_size: args.batch_size,
            queue_depth: args.queue_depth,
        },
        cancel.clone(),
    );
    let stats = driver.stats();
    let data_plane = tokio::spawn(driver.run());

    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => warn!("Received SIGINT, shutting down"),
                Err(err) => error!("Failed to listen for ctrl-c: {}", err),
            }
            cancel.cancel();
        })
    };

    if let Err(e) = data_plane.await {
        error!("Data plane task failed: {}", e);
        return ExitCode::FAILURE;
    }
    shutdown.abort();

    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "bm-switch", "shutdown")
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "processed": stats.processed(),
            "dropped": stats.dropped(),
            "swaps": stats.swaps(),
        })));
    info!("bm-switch shutdown complete");
    ExitCode::SUCCESS
}

/// Renders `e` followed by its `source()` chain, innermost last.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut parts = vec![e.to_string()];
    let mut source = e.source();
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ")
}
