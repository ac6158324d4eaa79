//! CM11/CM15 X10 protocol backend for x10lib.
//!
//! This crate speaks the serial protocol of the CM11 powerline interface
//! and its USB successor, the CM15. It provides:
//!
//! - **Wire constants** ([`protocol`]) -- header and control bytes, the
//!   CM11 checksum, and the bit-twiddling helpers used by the decoders.
//! - **Frame builders** ([`commands`]) -- address, function, dim/bright,
//!   shutter, time download, and RF receive-filter frames.
//! - **Decoders** ([`rx`], [`rf`]) -- powerline receive bursts and CM15 RF
//!   frames, including the RF repeat filter.
//! - **Module registry** ([`registry`]) -- module levels and the addressed
//!   set shared by outbound commands and decoded traffic.
//! - **X10Controller** ([`controller`]) -- the
//!   [`Controller`](x10lib_core::Controller) trait implementation that ties
//!   the handshake state machine to a [`Transport`](x10lib_core::Transport).
//! - **X10Builder** ([`builder`]) -- fluent builder for constructing
//!   `X10Controller` instances with configurable timing.
//!
//! # Example
//!
//! ```
//! use x10lib_cm::commands::{address_frame, function_frame};
//! use x10lib_cm::protocol::checksum;
//! use x10lib_core::{ModuleAddress, X10Command};
//!
//! let b13: ModuleAddress = "B13".parse().unwrap();
//! let address = address_frame(b13);
//! assert_eq!(address, vec![0x04, 0xE0]);
//! assert_eq!(checksum(&address), 0xE4);
//!
//! let on = function_frame(b13.house, X10Command::On);
//! assert_eq!(on, vec![0x06, 0xE2]);
//! ```

pub mod builder;
pub mod commands;
pub mod controller;
mod engine;
pub mod protocol;
mod reader;
pub mod registry;
pub mod rf;
pub mod rx;

pub use builder::X10Builder;
pub use controller::X10Controller;
pub use engine::MAX_BURST;
