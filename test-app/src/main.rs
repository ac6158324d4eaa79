// x10lib test application -- CLI tool for driving a CM11 or CM15 interface
// against real hardware or a mock transport.
//
// Usage:
//   x10lib-test-app --port /dev/ttyUSB0 on B13
//   x10lib-test-app --port /dev/ttyUSB0 dim B13 40
//   x10lib-test-app --family cm15 --port /dev/ttyUSB1 --house-codes A,B monitor
//   x10lib-test-app --port /dev/ttyUSB0 level x10/B13/shopen 60
//   x10lib-test-app --mock on A1
//   x10lib-test-app families
//
// Logging is controlled with RUST_LOG (default: info), e.g.
//   RUST_LOG=x10lib_cm=debug x10lib-test-app --mock status A1

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use x10lib::cm::{X10Builder, X10Controller};
use x10lib::{Controller, DeviceFamily, HouseCode, LevelRequest, ModuleAddress};
use x10lib_test_harness::MockTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// x10lib test application -- sends X10 commands from the command line.
#[derive(Parser)]
#[command(name = "x10lib-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required unless --mock is used.
    #[arg(long)]
    port: Option<String>,

    /// Interface family: cm11 (serial) or cm15 (USB).
    #[arg(long, default_value = "cm11")]
    family: DeviceFamily,

    /// Override the default 4800 baud.
    #[arg(long)]
    baud: Option<u32>,

    /// Monitored house codes, comma separated (e.g. A,B).
    #[arg(long, value_delimiter = ',', default_value = "A")]
    house_codes: Vec<HouseCode>,

    /// Command timeout in milliseconds before a frame is retransmitted.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use a mock transport instead of a real serial port. For cm11 the
    /// mock answers the checksum handshake like a real interface.
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn a module on.
    On { address: ModuleAddress },

    /// Turn a module off.
    Off { address: ModuleAddress },

    /// Dim a module by a percentage.
    Dim {
        address: ModuleAddress,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Brighten a module by a percentage.
    Bright {
        address: ModuleAddress,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Open a shutter module to a percentage.
    Shopen {
        address: ModuleAddress,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Turn on every lamp module of a house.
    AllOn { house: HouseCode },

    /// Turn off every module of a house.
    AllOff { house: HouseCode },

    /// Ask a module to report its status.
    Status { address: ModuleAddress },

    /// Apply a set-level request given as "<address>/<operation>" plus a
    /// payload, e.g. `level x10/B13/dim 30`.
    Level {
        path: String,
        #[arg(default_value = "")]
        payload: String,
    },

    /// Download the current local time to the interface.
    SyncTime {
        /// Also clear the interface's battery timer.
        #[arg(long)]
        clear_battery: bool,
    },

    /// Print every known module and its level.
    Modules,

    /// Print controller events as they arrive.
    Monitor {
        /// Seconds to monitor (0 = until the channel closes).
        #[arg(long, default_value = "0")]
        duration: u64,
    },

    /// List supported interface families.
    Families,
}

// ---------------------------------------------------------------------------
// Controller construction
// ---------------------------------------------------------------------------

async fn create_controller(cli: &Cli) -> Result<X10Controller> {
    let mut builder = X10Builder::new(cli.family).house_codes(&cli.house_codes);

    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }
    if let Some(ms) = cli.timeout_ms {
        builder = builder.command_timeout(Duration::from_millis(ms));
    }

    let controller = if cli.mock {
        let mock = match cli.family {
            DeviceFamily::Cm11 => MockTransport::cm11_simulator(),
            DeviceFamily::Cm15 => {
                tracing::warn!("the cm15 mock never acknowledges; commands will time out");
                MockTransport::new()
            }
        };
        let controller = builder
            .build_with_transport(Box::new(mock))
            .await
            .context("failed to build controller with mock transport")?;
        println!("Using mock transport -- {}", cli.family);
        controller
    } else {
        let port = cli
            .port
            .as_deref()
            .context("--port is required when not using --mock")?;
        let controller = builder
            .serial_port(port)
            .build()
            .await
            .context("failed to build controller")?;
        println!("Using {port} -- {}", cli.family);
        controller
    };

    controller
        .open()
        .await
        .context("failed to open interface")?;
    Ok(controller)
}

/// Wait until the open handshake has completed, so the first command does
/// not sit behind it.
async fn wait_until_ready(controller: &X10Controller, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut events = controller.subscribe();
    loop {
        let state = controller.comm_state();
        if state == x10lib::CommState::Ready || state == x10lib::CommState::Connected {
            return Ok(());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("interface did not become ready (state: {state})");
        }
        let _ = tokio::time::timeout(remaining, events.recv()).await;
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn report(what: &str, ok: bool) -> Result<()> {
    if ok {
        println!("{what}: sent");
        Ok(())
    } else {
        bail!("{what}: not sent (interface not connected)")
    }
}

async fn cmd_print_module(controller: &X10Controller, address: ModuleAddress) {
    println!("  {}", controller.module(address).await);
}

async fn cmd_modules(controller: &X10Controller) -> Result<()> {
    let modules = controller.modules().await;
    println!("{} modules", modules.len());
    for module in modules {
        println!("  {module}");
    }
    Ok(())
}

async fn cmd_monitor(controller: &X10Controller, duration_secs: u64) -> Result<()> {
    let mut event_rx = controller.subscribe();

    println!("Monitoring X10 events (Ctrl-C to stop)...");

    let deadline = if duration_secs > 0 {
        Some(Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, event_rx.recv()).await {
            Ok(Ok(event)) => {
                println!("[event] {event:?}");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                    break;
                }
            }
        }
    }

    Ok(())
}

fn cmd_families() -> Result<()> {
    println!("Supported interface families");
    for family in x10lib::supported_families() {
        let checksum = if family.requires_checksum() {
            "checksum handshake"
        } else {
            "acknowledge only"
        };
        println!("  {family:<6} {checksum}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

async fn run(cli: &Cli, controller: &X10Controller) -> Result<()> {
    match &cli.command {
        Command::On { address } => {
            report(&format!("on {address}"), controller.unit_on(*address).await)?;
            cmd_print_module(controller, *address).await;
        }
        Command::Off { address } => {
            report(&format!("off {address}"), controller.unit_off(*address).await)?;
            cmd_print_module(controller, *address).await;
        }
        Command::Dim { address, percent } => {
            let ok = controller.dim(*address, *percent).await;
            report(&format!("dim {address} {percent}%"), ok)?;
            cmd_print_module(controller, *address).await;
        }
        Command::Bright { address, percent } => {
            let ok = controller.bright(*address, *percent).await;
            report(&format!("bright {address} {percent}%"), ok)?;
            cmd_print_module(controller, *address).await;
        }
        Command::Shopen { address, percent } => {
            let ok = controller.shutter_open(*address, *percent).await;
            report(&format!("shutter open {address} {percent}%"), ok)?;
            cmd_print_module(controller, *address).await;
        }
        Command::AllOn { house } => {
            report(&format!("all lights on {house}"), controller.all_lights_on(*house).await)?;
        }
        Command::AllOff { house } => {
            report(&format!("all units off {house}"), controller.all_units_off(*house).await)?;
        }
        Command::Status { address } => {
            let ok = controller.status_request(*address).await;
            report(&format!("status request {address}"), ok)?;
        }
        Command::Level { path, payload } => {
            let request = LevelRequest::from_path(path, payload)
                .with_context(|| format!("invalid level request {path:?} {payload:?}"))?;
            let address = request.address;
            report(&format!("level {path}"), controller.apply_request(request).await)?;
            cmd_print_module(controller, address).await;
        }
        Command::SyncTime { clear_battery } => {
            report("time download", controller.sync_time(*clear_battery).await)?;
        }
        Command::Modules => cmd_modules(controller).await?,
        Command::Monitor { duration } => cmd_monitor(controller, *duration).await?,
        Command::Families => unreachable!("families handled in main"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.house_codes.is_empty() {
        bail!("--house-codes needs at least one house code");
    }

    // The `families` command does not require an interface.
    if matches!(cli.command, Command::Families) {
        return cmd_families();
    }

    let controller = create_controller(&cli).await?;
    let ready_timeout = Duration::from_millis(cli.timeout_ms.unwrap_or(5_000));
    if let Err(e) = wait_until_ready(&controller, ready_timeout).await {
        tracing::warn!(error = %e, "continuing without a completed handshake");
    }

    let result = run(&cli, &controller).await;
    controller.close().await.ok();
    result
}
