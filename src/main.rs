//! hydroagent - water-quality telemetry agent entry point

use hydroagent::agent::TelemetryAgent;
use hydroagent::clock::SystemClock;
use hydroagent::config::AgentConfig;
use hydroagent::error::AgentResult;
use hydroagent::notifier::TelegramNotifier;
use hydroagent::observability::{
    health::HealthServer, init_default_logging, init_logging_with_level, metrics::metrics,
};
use hydroagent::protocol::{status_topic, TelemetryPayload};
use hydroagent::sensor::{IioAnalogSource, SensorSampler};
use hydroagent::transport::mqtt::{parse_broker_url, MqttSession};
use hydroagent::transport::network::SysfsNetworkDriver;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};

/// Water-quality telemetry agent
#[derive(Parser)]
#[command(name = "hydroagent")]
#[command(about = "Samples water-quality probes, publishes readings over MQTT and alerts on out-of-range values")]
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
    /// Run the telemetry loop
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Take one reading and print its payload
    Sample,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging_with_level(Level::DEBUG),
        _ => init_logging_with_level(Level::TRACE),
    }

    info!("Starting hydroagent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Sample => handle_sample_command(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(AgentConfig::load_from_file(path)?);
    }

    // Try default locations
    let default_paths = ["hydroagent.toml", "config/hydroagent.toml", "/etc/hydroagent.toml"];
    for path_str in default_paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(AgentConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create hydroagent.toml".into())
}

/// Bootstrap factory - wires the concrete drivers into the agent
fn build_agent(
    config: &AgentConfig,
) -> AgentResult<TelemetryAgent<SysfsNetworkDriver, MqttSession>> {
    let endpoint = parse_broker_url(&config.mqtt.broker_url)?;
    let driver = SysfsNetworkDriver::new(&config.network, endpoint.socket_target());

    let topic = config.device.telemetry_topic();
    let session = MqttSession::new(&config.device.id, &status_topic(&topic), config.mqtt.clone())?;

    let bot_token = config.get_bot_token()?;
    let notifier = TelegramNotifier::new(&config.notifier, &bot_token)?;

    Ok(TelemetryAgent::new(
        config,
        driver,
        session,
        Box::new(IioAnalogSource::new(&config.sampler)),
        Arc::new(notifier),
        Arc::new(SystemClock),
    ))
}

async fn run_agent(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Application starting with device ID: {}", config.device.id);
    metrics().set_agent_phase("booting");

    let mut agent = build_agent(&config)?;

    let health_port = std::env::var("HEALTH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let health_server = Arc::new(HealthServer::new(config.device.id.clone(), health_port));
    tokio::spawn(health_server.start());

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    // Dropping the loop on a signal abandons the iteration in flight
    tokio::select! {
        _ = async {
            agent.boot().await;
            agent.run().await;
        } => {}
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    agent.shutdown().await;
    Ok(())
}

fn handle_config_command(
    config: &AgentConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn handle_sample_command(config: &AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut sampler = SensorSampler::new(
        Box::new(IioAnalogSource::new(&config.sampler)),
        &config.device.id,
        &config.sampler,
    );
    let reading = sampler.sample()?;
    println!("{}", TelemetryPayload::from_reading(&reading).to_json()?);
    Ok(())
}
