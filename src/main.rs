use anyhow::Result;
use clap::{Parser, Subcommand};
use device_link::config::DEFAULT_RFCOMM_CHANNEL;
use device_link::{DeviceEvent, DeviceManager, Endpoint, EventReceiver, LinkConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "device-link", about = "Console for newline-delimited text devices")]
struct Cli {
    /// Connect timeout in seconds (transport default if unset)
    #[arg(long, global = true)]
    connect_timeout_secs: Option<u64>,

    /// Per-read timeout in seconds (transport default if unset)
    #[arg(long, global = true)]
    read_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect over TCP
    Tcp {
        #[arg(long, default_value = "192.168.4.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Connect over Bluetooth RFCOMM
    Bt {
        /// Device MAC address, e.g. 00:11:22:33:44:55
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value_t = DEFAULT_RFCOMM_CHANNEL)]
        channel: u8,
    },
    /// List nearby Bluetooth devices
    Scan {
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let (manager, events) = DeviceManager::new(build_config(&cli));

    let endpoint = match cli.command {
        Command::Scan { .. } => return run_scan(&manager, events).await,
        Command::Tcp { host, port } => Endpoint::network(host, port),
        Command::Bt { address, name, .. } => Endpoint::bluetooth(address, name),
    };

    let link_lost = Arc::new(Notify::new());
    let printer = tokio::spawn(print_events(events, link_lost.clone()));

    info!("Connecting to {}", endpoint.label());
    if let Err(e) = manager.connect(endpoint).await {
        // Show the timestamped error event before exiting
        finish(manager, printer).await;
        return Err(e.into());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    if let Err(e) = manager.send(&line).await {
                        warn!("Send failed: {}", e);
                    }
                }
                None => break,
            },
            _ = link_lost.notified() => {
                warn!("Device link lost");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    manager.disconnect_all().await;
    finish(manager, printer).await;
    Ok(())
}

/// Let the relay forward what is queued, then wait for the printer to drain
async fn finish<T>(manager: DeviceManager, printer: JoinHandle<T>) -> Option<T> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(manager);
    printer.await.ok()
}

fn build_config(cli: &Cli) -> LinkConfig {
    let mut config = LinkConfig::default();
    if let Some(secs) = cli.connect_timeout_secs {
        config.network.connect_timeout = Duration::from_secs(secs);
        config.bluetooth.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.read_timeout_secs {
        config.network.read_timeout = Duration::from_secs(secs);
        config.bluetooth.read_timeout = Duration::from_secs(secs);
    }
    match &cli.command {
        Command::Bt { channel, .. } => config.bluetooth.channel = *channel,
        Command::Scan {
            duration_secs: Some(secs),
        } => config.bluetooth.scan_duration = Duration::from_secs(*secs),
        _ => {}
    }
    config
}

async fn run_scan(manager: &DeviceManager, mut events: EventReceiver) -> Result<()> {
    info!("Scanning for Bluetooth devices...");
    manager.scan_bluetooth_devices().await?;
    // The scan task reports straight to the channel, so everything is queued
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    Ok(())
}

async fn print_events(mut events: EventReceiver, link_lost: Arc<Notify>) {
    let mut was_connected = false;
    while let Some(event) = events.recv().await {
        print_event(&event);
        if let DeviceEvent::CurrentDeviceChanged(view) = &event {
            if was_connected && !view.connected {
                link_lost.notify_one();
            }
            was_connected = view.connected;
        }
    }
}

fn print_event(event: &DeviceEvent) {
    match event {
        DeviceEvent::Message { kind, message } => println!("{:<9} {}", kind, message),
        DeviceEvent::StatusChanged {
            kind,
            connected,
            label,
        } => info!("{} status: connected={} {}", kind, connected, label),
        DeviceEvent::DevicesFound(devices) if devices.is_empty() => println!("No devices found"),
        DeviceEvent::DevicesFound(devices) => {
            for device in devices {
                println!(
                    "{}  {:<24} class=0x{:06x}",
                    device.address,
                    device.label(),
                    device.device_class
                );
            }
        }
        DeviceEvent::CurrentDeviceChanged(view) => info!("Current device: {}", view.label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_link::transport::MemoryConnector;
    use device_link::{Category, TransportKind};

    #[tokio::test]
    async fn test_finish_delivers_connect_error() {
        let read_timeout = Duration::from_millis(50);
        let (network, _network_peers) = MemoryConnector::new(TransportKind::Network, read_timeout);
        network.set_refuse(true);
        let (bluetooth, _bluetooth_peers) =
            MemoryConnector::new(TransportKind::Bluetooth, read_timeout);
        let (manager, mut events) =
            DeviceManager::with_connectors(Arc::new(network), Arc::new(bluetooth)).unwrap();

        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = events.recv().await {
                seen.push(event);
            }
            seen
        });

        assert!(manager
            .connect(Endpoint::network("device", 8080))
            .await
            .is_err());
        let seen = finish(manager, collector).await.unwrap();
        assert!(seen.iter().any(|event| matches!(
            event,
            DeviceEvent::Message { message, .. } if message.category == Category::Error
        )));
    }
}
