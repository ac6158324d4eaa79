//! # x10lib -- X10 Home Automation over CM11 and CM15 Interfaces
//!
//! `x10lib` is an asynchronous Rust library for driving X10 powerline
//! modules through a CM11 serial interface or a CM15 USB interface. It
//! keeps a model of every module's level, decodes powerline and RF traffic
//! seen by the interface, and publishes what it learns as events.
//!
//! ## Quick Start
//!
//! Add `x10lib` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! x10lib = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Open an interface and turn a lamp on:
//!
//! ```no_run
//! use x10lib::{Controller, DeviceFamily, ModuleAddress};
//! use x10lib::cm::X10Builder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let controller = X10Builder::new(DeviceFamily::Cm11)
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!     controller.open().await?;
//!
//!     let lamp: ModuleAddress = "B13".parse()?;
//!     controller.unit_on(lamp).await;
//!     println!("{}", controller.module(lamp).await);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `x10lib-core`          | [`Controller`] trait, address types, events, errors |
//! | `x10lib-transport`     | Serial transport                                 |
//! | `x10lib-cm`            | CM11/CM15 protocol engine                        |
//! | **`x10lib`**           | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature | Enables                              | Default |
//! |---------|--------------------------------------|---------|
//! | `cm`    | [`cm`] module (CM11/CM15 protocol)   | yes     |
//! | `full`  | All backends                         | no      |
//!
//! ## Event Subscription
//!
//! Level changes, decoded powerline and RF traffic, and interface state
//! changes arrive as [`X10Event`]s on a broadcast channel:
//!
//! ```no_run
//! use x10lib::{Controller, X10Event};
//! # async fn example(controller: &dyn Controller) {
//! let mut events = controller.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         X10Event::ModuleLevelChanged { address, level } => {
//!             println!("{address}: {:.0}%", level * 100.0);
//!         }
//!         other => println!("{other:?}"),
//!     }
//! }
//! # }
//! ```

pub use x10lib_core::*;

/// CM11/CM15 protocol backend.
///
/// Provides [`X10Controller`](cm::X10Controller) and
/// [`X10Builder`](cm::X10Builder), plus the frame builders and decoders
/// they are made of.
#[cfg(feature = "cm")]
pub mod cm {
    pub use x10lib_cm::*;
}

/// Serial transport used by `X10Builder::build`.
pub mod serial {
    pub use x10lib_transport::*;
}

/// Every interface family this build can drive.
///
/// ```
/// let families = x10lib::supported_families();
/// assert!(!families.is_empty());
/// ```
pub fn supported_families() -> Vec<DeviceFamily> {
    let mut families = Vec::new();

    #[cfg(feature = "cm")]
    {
        families.extend([DeviceFamily::Cm11, DeviceFamily::Cm15]);
    }

    families
}
