//! Transport implementations for x10lib.
//!
//! This crate provides [`SerialTransport`], the concrete
//! [`Transport`](x10lib_core::Transport) for CM11 serial interfaces and for
//! CM15 units exposed through a virtual COM port.
//!
//! # Example
//!
//! ```no_run
//! use x10lib_transport::{SerialConfig, SerialTransport};
//! use x10lib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> x10lib_core::Result<()> {
//! let mut transport = SerialTransport::new("/dev/ttyUSB0", SerialConfig::default());
//! transport.open().await?;
//!
//! // Ask the CM11 for its status block
//! transport.send(&[0x8B]).await?;
//!
//! let mut buf = [0u8; 32];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConfig, SerialTransport};
