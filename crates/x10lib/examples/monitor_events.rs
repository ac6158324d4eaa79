//! Monitor real-time X10 events.
//!
//! Demonstrates subscribing to the controller event stream and printing
//! all events as they arrive. This is useful for building dashboards,
//! logging household activity, or debugging interface communication.
//!
//! Events include module level changes, decoded powerline addresses and
//! functions, RF remote and security sensor traffic, and interface state
//! changes.
//!
//! # Requirements
//!
//! - A CM11 (serial) or CM15 (USB) interface
//! - Serial port path adjusted for your system
//!
//! # Usage
//!
//! ```sh
//! cargo run -p x10lib --example monitor_events
//! ```

use std::time::Duration;

use x10lib::cm::X10Builder;
use x10lib::{Controller, DeviceFamily, HouseCode, X10Event};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let serial_port = "/dev/ttyUSB0";

    println!("Opening CM11 on {}...", serial_port);

    let controller = X10Builder::new(DeviceFamily::Cm11)
        .serial_port(serial_port)
        .house_codes(&[HouseCode::A, HouseCode::B])
        .build()
        .await?;

    // Subscribe before opening so the handshake shows up too.
    let mut events = controller.subscribe();
    controller.open().await?;
    println!("Monitoring for 60 seconds...");
    println!("(Press a button on an X10 remote or controller to generate events)\n");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);

    println!("{:<12} Event", "Timestamp");
    println!("{:-<12} {:-<50}", "", "");

    let start = tokio::time::Instant::now();

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                let elapsed = start.elapsed();
                let timestamp = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());

                match event {
                    X10Event::ModuleLevelChanged { address, level } => {
                        println!(
                            "{} LevelChanged      {} -> {:.0}%",
                            timestamp,
                            address,
                            level * 100.0
                        );
                    }
                    X10Event::PlcAddressReceived { house, unit } => {
                        println!("{} PlcAddress        {}{}", timestamp, house, unit);
                    }
                    X10Event::PlcFunctionReceived { command, house } => {
                        println!("{} PlcFunction       {} {}", timestamp, house, command);
                    }
                    X10Event::RfDataReceived { raw } => {
                        let hex: Vec<String> = raw.iter().map(|b| format!("{b:02X}")).collect();
                        println!("{} RfData            {}", timestamp, hex.join(" "));
                    }
                    X10Event::RfCommandReceived {
                        function,
                        house,
                        unit,
                    } => match unit {
                        Some(unit) => {
                            println!("{} RfCommand         {}{} {:?}", timestamp, house, unit, function)
                        }
                        None => println!("{} RfCommand         {} {:?}", timestamp, house, function),
                    },
                    X10Event::RfSecurityReceived { event, address } => {
                        println!(
                            "{} RfSecurity        {:?} from {:06X}",
                            timestamp, event, address
                        );
                    }
                    X10Event::StatusChanged { state } => {
                        println!("{} StatusChanged     -> {}", timestamp, state);
                    }
                }
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("(missed {} events due to lag)", n);
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {
                // Timeout -- monitoring period elapsed.
                break;
            }
        }
    }

    controller.close().await?;
    println!("\nMonitoring complete.");
    Ok(())
}
