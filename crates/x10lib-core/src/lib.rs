//! x10lib-core: Core traits, types, and error definitions for x10lib.
//!
//! This crate defines the hardware-agnostic pieces shared by every x10lib
//! crate. Applications depend on these types without pulling in a specific
//! interface driver.
//!
//! # Key types
//!
//! - [`Controller`] -- the command surface of an X10 interface
//! - [`Transport`] -- byte-level communication channel
//! - [`X10Event`] -- asynchronous state change notifications
//! - [`ModuleAddress`], [`HouseCode`], [`UnitCode`] -- X10 addressing
//! - [`Error`] / [`Result`] -- error handling

pub mod controller;
pub mod error;
pub mod events;
pub mod module;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use x10lib_core::*`.
pub use controller::Controller;
pub use error::{Error, Result};
pub use events::X10Event;
pub use module::{X10Module, clamp_level};
pub use transport::Transport;
pub use types::*;
