//! Tick Publisher - Main Entry Point
//!
//! Loads the configuration, wires the MQTT broker client, link monitor and
//! tick clock into the publisher runtime, and runs until SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tick_publisher::config::{LinkMode, PublisherConfig};
use tick_publisher::environment::{AlwaysUpProbe, LinkMonitor, SchedulerClock, TcpLinkProbe};
use tick_publisher::error::{PublisherError, PublisherResult};
use tick_publisher::observability::logging::{
    init_default_logging, init_logging, parse_spans_flag, LogFormat,
};
use tick_publisher::observability::metrics::metrics;
use tick_publisher::publisher::{ConnectionStateMachine, EventSender};
use tick_publisher::runtime::PublisherRuntime;
use tick_publisher::transport::mqtt::MqttBroker;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, Level};

/// Publishes scheduler ticks to an MQTT broker
#[derive(Parser)]
#[command(name = "tick-publisher")]
#[command(about = "Publishes scheduler ticks to an MQTT broker once the network is up")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the publisher
    Run,
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the MQTT client id derived from the hardware address
    ClientId,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize observability system
    init_cli_logging(cli.verbose);

    info!("Starting tick-publisher v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run => {
            if let Err(e) = run_publisher(config).await {
                error!(kind = e.kind(), "Publisher failed: {}", e);
                process::exit(1);
            }
            Ok(())
        }
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::ClientId => handle_client_id_command(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn init_cli_logging(verbose: u8) {
    let level = match verbose {
        0 => return init_default_logging(),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let include_spans = std::env::var("LOG_SPANS")
        .map(|value| parse_spans_flag(&value))
        .unwrap_or(false);
    init_logging(level, LogFormat::parse(&format), include_spans);
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<PublisherConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(PublisherConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = ["publisher.toml", "config/publisher.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(PublisherConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Please provide one with -c/--config or create publisher.toml".into())
        }
    }
}

async fn run_publisher(config: PublisherConfig) -> PublisherResult<()> {
    let settings = config.publisher_settings()?;
    info!(
        client_id = %settings.client.client_id,
        broker = %settings.client.broker,
        topic = %settings.topic,
        "Publisher configured"
    );

    let (notifier, events) = EventSender::channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let broker_address = settings.client.broker.clone();
    let machine = ConnectionStateMachine::new(MqttBroker::new(), settings, notifier.clone());
    let runtime = PublisherRuntime::new(
        machine,
        SchedulerClock::new(config.schedule.tick_hz),
        events,
        config.publish_period(),
    );

    let link_task = match config.link.mode {
        LinkMode::TcpProbe => {
            let probe = TcpLinkProbe::new(
                broker_address.host,
                broker_address.port,
                config.probe_timeout(),
            );
            let monitor = LinkMonitor::new(probe, config.probe_interval());
            tokio::spawn(monitor.run(notifier, shutdown_rx.clone()))
        }
        LinkMode::AlwaysUp => {
            let monitor = LinkMonitor::new(AlwaysUpProbe, config.probe_interval());
            tokio::spawn(monitor.run(notifier, shutdown_rx.clone()))
        }
    };
    let runtime_task = tokio::spawn(runtime.run(shutdown_rx));

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| PublisherError::runtime(format!("failed to install SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| PublisherError::runtime(format!("failed to install SIGTERM handler: {e}")))?;

    info!("Publisher is running");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    // Receivers only disappear once their tasks have already stopped
    let _ = shutdown_tx.send(true);

    let final_state = runtime_task
        .await
        .map_err(|e| PublisherError::runtime(format!("publisher task failed: {e}")))?;
    link_task
        .await
        .map_err(|e| PublisherError::runtime(format!("link monitor task failed: {e}")))?;

    info!(state = %final_state, "Publisher stopped");
    match serde_json::to_string(&metrics().get_metrics()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final metrics"),
        Err(e) => error!("Failed to serialize metrics: {}", e),
    }
    Ok(())
}

fn handle_config_command(
    config: &PublisherConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn handle_client_id_command(config: &PublisherConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client_id = config.client_id()?;
    // Quoted so a padding space stays visible
    println!("\"{client_id}\"");
    Ok(())
}
