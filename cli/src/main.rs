// gattlink-cli — loopback demo driver
//
// Exercises the full protocol core without radio hardware: both session
// roles run in-process over the loopback link, so the connect sequence,
// ping/pong and the streaming loop can be watched end to end.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use gattlink_core::bus::BleNotification;
use gattlink_core::protocol::{self, sequence_of, LinkCharacteristic};
use gattlink_core::{loopback_pair, Command as LinkCommand, LinkConfig, LoopbackPair};

#[derive(Parser)]
#[command(name = "gattlink")]
#[command(about = "GattLink — BLE GATT link protocol demo", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full loopback demo: connect, ping/pong, stream
    Demo {
        /// Streaming window in milliseconds
        #[arg(short, long, default_value = "600")]
        window_ms: u64,
        /// Inter-block period in milliseconds
        #[arg(short, long, default_value = "60")]
        period_ms: u64,
    },
    /// Connect and exchange a single ping/pong
    Ping,
    /// Print the GATT schema
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { window_ms, period_ms } => demo(window_ms, period_ms).await,
        Commands::Ping => ping().await,
        Commands::Schema => {
            print_schema();
            Ok(())
        }
    }
}

/// Bring both roles up and establish a session.
async fn connect_pair(config: LinkConfig) -> Result<LoopbackPair> {
    let pair = loopback_pair(config).context("invalid link configuration")?;

    // Mirror both sessions' diagnostic streams to the terminal
    for (role, mut logs) in [
        ("peripheral", pair.peripheral.bus().subscribe_logs()),
        ("central", pair.central.bus().subscribe_logs()),
    ] {
        tokio::spawn(async move {
            while let Ok(line) = logs.recv().await {
                println!("  [{}] {}", role, line);
            }
        });
    }

    pair.peripheral
        .start("GattLink Demo")
        .await
        .context("peripheral start failed")?;

    let found = pair
        .central
        .scan_first(Duration::from_secs(2))
        .await
        .context("scan failed")?
        .context("no peripheral found")?;
    println!(
        "Found {} ({} dBm)",
        found.name.as_deref().unwrap_or("<unnamed>"),
        found.rssi
    );

    pair.central
        .connect(&found.id)
        .await
        .context("connect failed")?;
    println!("Session ready");
    Ok(pair)
}

async fn ping() -> Result<()> {
    let pair = connect_pair(LinkConfig::default()).await?;
    let mut notifications = pair.central.bus().subscribe_notifications();

    pair.central.send_cmd(LinkCommand::Ping).await?;
    let answer = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
        .await
        .context("no answer within 2s")??;
    println!("Answer: {:?}", answer);

    pair.central.disconnect().await;
    pair.peripheral.stop().await;
    Ok(())
}

async fn demo(window_ms: u64, period_ms: u64) -> Result<()> {
    let config = LinkConfig {
        block_period_ms: period_ms,
        ..LinkConfig::default()
    };
    let pair = connect_pair(config).await?;
    let mut notifications = pair.central.bus().subscribe_notifications();

    // Ping/pong once to prove the command path
    pair.central.send_cmd(LinkCommand::Ping).await?;
    loop {
        let notification = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
            .await
            .context("no pong within 2s")??;
        if notification == BleNotification::Command(LinkCommand::Pong) {
            println!("Ping answered");
            break;
        }
    }

    // Stream peripheral -> central for the requested window
    println!("Streaming for {} ms at {} ms period...", window_ms, period_ms);
    pair.peripheral.start_transfer();
    let collector = tokio::spawn(async move {
        let mut count = 0u32;
        let mut last_seq = None;
        while let Ok(Ok(notification)) =
            tokio::time::timeout(Duration::from_millis(500), notifications.recv()).await
        {
            if let BleNotification::Data(block) = notification {
                last_seq = sequence_of(&block);
                count += 1;
            }
        }
        (count, last_seq)
    });

    tokio::time::sleep(Duration::from_millis(window_ms)).await;
    pair.peripheral.stop_transfer();

    let (count, last_seq) = collector.await.context("collector panicked")?;
    println!(
        "Received {} blocks, last sequence {:?}",
        count, last_seq
    );

    pair.central.disconnect().await;
    pair.peripheral.stop().await;
    println!("Shut down cleanly");
    Ok(())
}

fn print_schema() {
    println!("Service    {}", protocol::SERVICE_UUID);
    for characteristic in LinkCharacteristic::ALL {
        let role = match characteristic {
            LinkCharacteristic::CmdRx => "write",
            LinkCharacteristic::CmdTx => "notify",
            LinkCharacteristic::DataRx => "write-no-response",
            LinkCharacteristic::DataTx => "notify",
        };
        println!(
            "  {:8} {}  ({})",
            characteristic.to_string(),
            characteristic.uuid(),
            role
        );
    }
    println!("  CCCD     {}", protocol::CCCD_UUID);
}
