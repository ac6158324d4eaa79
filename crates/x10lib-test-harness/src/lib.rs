//! x10lib-test-harness: Test utilities for x10lib.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! protocol engine without a CM11 or CM15 attached, including a simulator
//! mode that answers the CM11 checksum handshake.

pub mod mock_serial;

pub use mock_serial::{MockTransport, SIMULATED_STATUS};
