use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scalelink_core::{
    BtleTransport, ClientConfig, DeviceRegistry, ScaleClient, ScaleEvent, WireProfile,
};

#[derive(Parser)]
#[command(name = "scalelink")]
#[command(author, version, about = "CLI for BLE weighing scales", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby scales
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Pair with a scale and stream its readings
    Pair {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Connect to the remembered scale and stream its readings
    Monitor {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the remembered scale and current status
    Status,

    /// Forget the remembered scale
    Forget,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scan { timeout } => scan(timeout).await,
        Commands::Pair { format } => stream(true, &format).await,
        Commands::Monitor { format } => stream(false, &format).await,
        Commands::Status => status().await,
        Commands::Forget => forget().await,
    }
}

async fn scan(timeout_secs: u64) -> Result<()> {
    let transport = BtleTransport::new().await?;
    let scales = transport
        .scan_for_scales(&WireProfile::default(), Duration::from_secs(timeout_secs))
        .await?;

    if scales.is_empty() {
        println!("No scales found.");
        return Ok(());
    }

    println!("{:<30} {:<28} {:>6}", "NAME", "ID", "RSSI");
    for scale in scales {
        println!(
            "{:<30} {:<28} {:>6}",
            scale.identity.label(),
            scale.identity.id,
            scale
                .rssi
                .map_or_else(|| "-".to_string(), |rssi| rssi.to_string()),
        );
    }
    Ok(())
}

async fn stream(explicit_pick: bool, format: &str) -> Result<()> {
    let client = new_client().await?;

    let status = client.connect(explicit_pick).await;
    if let Some(error) = &status.error {
        anyhow::bail!("failed to connect: {}", error);
    }
    if !explicit_pick && !status.connected && !status.connecting {
        anyhow::bail!("no remembered scale; run `scalelink pair` first");
    }
    if explicit_pick && !status.connected && !status.connecting {
        println!("No scale selected.");
        return Ok(());
    }

    let mut events = client.events();
    let mut weight = client.weight_watch();
    println!("Streaming readings (ctrl-c to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = weight.changed() => {
                if changed.is_err() {
                    break;
                }
                let reading = *weight.borrow_and_update();
                match format {
                    "json" => println!("{}", serde_json::to_string(&reading)?),
                    _ => println!("{}", reading),
                }
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    report_event(&event);
                }
            }
        }
    }

    client.disconnect(false).await;
    Ok(())
}

fn report_event(event: &ScaleEvent) {
    match event {
        ScaleEvent::Connected { device, delivery } => {
            eprintln!("Connected to {} ({:?})", device, delivery);
        }
        ScaleEvent::Disconnected { device, reason } => {
            eprintln!("Disconnected from {}: {:?}", device, reason);
        }
        ScaleEvent::ReconnectStarted { attempt, max, .. } => {
            eprintln!("Retrying ({}/{})...", attempt, max);
        }
        ScaleEvent::ReconnectSucceeded { attempts, .. } => {
            eprintln!("Reconnected after {} attempt(s)", attempts);
        }
        ScaleEvent::RetriesExhausted { attempts, .. } => {
            eprintln!(
                "Gave up after {} attempts; run `scalelink pair` or `scalelink monitor` to retry",
                attempts
            );
        }
        _ => {}
    }
}

async fn status() -> Result<()> {
    let registry = DeviceRegistry::open_default();
    match registry.load() {
        Some(device) => println!("Remembered scale: {}", device),
        None => println!("No remembered scale."),
    }
    Ok(())
}

async fn forget() -> Result<()> {
    let registry = DeviceRegistry::open_default();
    match registry.load() {
        Some(device) => {
            registry.clear();
            println!("Forgot {}.", device);
        }
        None => println!("No remembered scale."),
    }
    Ok(())
}

async fn new_client() -> Result<ScaleClient<BtleTransport>> {
    let transport = BtleTransport::new().await?;
    Ok(ScaleClient::with_config(
        transport,
        ClientConfig::default(),
        DeviceRegistry::open_default(),
    ))
}
