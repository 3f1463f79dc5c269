//! Stand-in for the embedded device, for trying the console without hardware.
//!
//! Every received line is answered with `ACK <line>`, and each client gets a
//! `TICK <n> <timestamp>` telemetry line on a fixed interval.

use anyhow::Result;
use clap::Parser;
use device_link_shared::codec::{encode_line, LineFramer};
use device_link_shared::now_ms;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "device-emulator", about = "Emulates a newline-delimited text device over TCP")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Telemetry interval in milliseconds, 0 disables it
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(args.bind).await?;
    info!("Device emulator listening on {}", args.bind);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Client connected: {}", peer);
        let interval = Duration::from_millis(args.interval_ms);
        tokio::spawn(async move {
            if let Err(e) = serve(socket, interval).await {
                warn!("Client {} failed: {}", peer, e);
            }
            info!("Client disconnected: {}", peer);
        });
    }
}

async fn serve(socket: TcpStream, interval: Duration) -> Result<()> {
    let (mut reader, mut writer) = socket.into_split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    // Single writer so replies and telemetry never interleave mid-line
    let write_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if writer.write_all(&encode_line(&line)).await.is_err() {
                break;
            }
        }
    });

    let telemetry = (!interval.is_zero()).then(|| {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut count: u64 = 0;
            loop {
                ticker.tick().await;
                count += 1;
                if tx.send(format!("TICK {} {}", count, now_ms())).await.is_err() {
                    break;
                }
            }
        })
    });

    tx.send("READY".to_string()).await?;

    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; 1024];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for line in framer.feed(&buf[..n]) {
            debug!("Received: {}", line);
            tx.send(format!("ACK {}", line)).await?;
        }
    }

    if let Some(task) = telemetry {
        task.abort();
    }
    drop(tx);
    let _ = write_task.await;
    Ok(())
}
