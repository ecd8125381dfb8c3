//! roomlinkd entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use roomlink_core::{init_tracing, TracingConfig, TracingOutputFormat};
use roomlink_driver::{
    signals, DoNotDisturbHandler, Driver, DriverConfig, DriverResult, InitialSyncProbe,
    StandbyHandler, TcpTransport,
};

/// roomlinkd - room codec control driver
#[derive(Debug, Parser)]
#[command(name = "roomlinkd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Codec host name or address
    #[arg(long, env = "ROOMLINK_HOST")]
    host: String,

    /// Codec control port
    #[arg(long, env = "ROOMLINK_PORT", default_value_t = 23)]
    port: u16,

    /// Outbound command queue capacity
    #[arg(long, default_value_t = 64)]
    outbound_capacity: usize,

    /// Enable debug output
    #[arg(long, short = 'v')]
    debug: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = if cli.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default()
    };
    if cli.json_logs {
        tracing_config = tracing_config.with_format(TracingOutputFormat::Json);
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> DriverResult<()> {
    let config = DriverConfig::default().with_outbound_capacity(cli.outbound_capacity);
    let line_ending = config.line_ending.clone();

    let mut driver = Driver::new(config);
    let handle = driver.handle();

    let standby = StandbyHandler::new();
    let mut standby_rx = standby.subscribe();
    let dnd = DoNotDisturbHandler::new();
    let mut dnd_rx = dnd.subscribe();
    driver.register_handler(Box::new(standby));
    driver.register_handler(Box::new(dnd));
    driver.register_handler(Box::new(InitialSyncProbe::new(handle.clone())));

    tokio::spawn(async move {
        while standby_rx.changed().await.is_ok() {
            if let Some(state) = *standby_rx.borrow() {
                info!(state = %state, "Standby state changed");
            }
        }
    });
    tokio::spawn(async move {
        while dnd_rx.changed().await.is_ok() {
            if let Some(active) = *dnd_rx.borrow() {
                info!(active, "Do-not-disturb changed");
            }
        }
    });

    let addr = format!("{}:{}", cli.host, cli.port);
    let transport = TcpTransport::connect(&addr, handle.clone(), line_ending).await?;
    let worker = tokio::spawn(driver.run(Box::new(transport)));

    signals::shutdown_signal().await;
    handle.shutdown();
    let _ = worker.await;
    Ok(())
}
