//! Thingy Service - MQTT bridge for Thingy sensors.
//!
//! Run with: `cargo run -p thingy-service`

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use thingy_core::write_topic;
use thingy_service::{Config, mqtt};
use thingy_types::{CharacteristicName, LedColor, LedCommand, ServiceName};

/// Thingy Service - device discovery and threshold alerts over MQTT.
#[derive(Parser, Debug)]
#[command(name = "thingy-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Broker URL (overrides config).
    #[arg(short, long, global = true)]
    broker: Option<String>,

    /// Preference file (overrides config).
    #[arg(short, long, global = true)]
    preferences: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Check the configuration and print the effective settings.
    Validate,

    /// Change a device's LED mode.
    Led {
        /// Device address as used in its topics.
        address: String,

        #[command(subcommand)]
        mode: LedMode,
    },
}

#[derive(Subcommand, Debug)]
enum LedMode {
    /// Turn the LED off.
    Off,

    /// Show a constant color.
    Set { red: u8, green: u8, blue: u8 },

    /// Pulse a predefined color.
    Breathe {
        #[arg(long, default_value = "red")]
        color: LedColor,
        /// Intensity in percent.
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=100))]
        intensity: u8,
        /// Delay between pulses in milliseconds.
        #[arg(long, default_value_t = 3000)]
        delay_ms: u16,
    },

    /// Light up once.
    OneShot {
        #[arg(long, default_value = "red")]
        color: LedColor,
        /// Intensity in percent.
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=100))]
        intensity: u8,
    },
}

impl From<LedMode> for LedCommand {
    fn from(mode: LedMode) -> Self {
        match mode {
            LedMode::Off => LedCommand::Off,
            LedMode::Set { red, green, blue } => LedCommand::Constant { red, green, blue },
            LedMode::Breathe {
                color,
                intensity,
                delay_ms,
            } => LedCommand::Breathe {
                color,
                intensity,
                delay_ms,
            },
            LedMode::OneShot { color, intensity } => LedCommand::OneShot { color, intensity },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thingy_service=info".parse()?)
                .add_directive("thingy_core=info".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Validate) => validate(&config),
        Some(Command::Led { address, mode }) => send_led(&config, &address, mode.into()).await,
        Some(Command::Run) | None => run_service(config).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(broker) = &args.broker {
        config.mqtt.broker = broker.clone();
    }
    if let Some(path) = &args.preferences {
        config.preferences.path = path.clone();
    }

    config.validate()?;
    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.mqtt.password.is_some() {
        shown.mqtt.password = Some("********".to_string());
    }
    let rendered = toml::to_string_pretty(&shown).context("Failed to render configuration")?;
    println!("Configuration is valid:\n\n{}", rendered);
    Ok(())
}

async fn send_led(config: &Config, address: &str, command: LedCommand) -> anyhow::Result<()> {
    let topic = write_topic(address, ServiceName::UserInterface, CharacteristicName::Led);
    info!("Sending {:?} to {}", command, topic);
    mqtt::publish_once(&config.mqtt, &topic, command.to_bytes())
        .await
        .with_context(|| format!("Failed to send LED command to {}", address))?;
    println!("LED command sent to {}", address);
    Ok(())
}

async fn run_service(config: Config) -> anyhow::Result<()> {
    thingy_service::run(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}
