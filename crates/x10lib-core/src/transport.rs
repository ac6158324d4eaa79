//! Transport trait for interface communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a CM11 or
//! CM15. The protocol engine in `x10lib-cm` operates on a `Transport` rather
//! than directly on a serial port, so the same engine drives real hardware
//! and the scripted `MockTransport` from `x10lib-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to an X10 interface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open (or re-open) the underlying link.
    ///
    /// Returns an error when the device is missing or cannot be configured;
    /// callers are expected to retry.
    async fn open(&mut self) -> Result<()>;

    /// Write raw bytes to the interface.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes into the provided buffer.
    ///
    /// Waits up to `timeout` for data; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) when nothing arrives.
    /// Callers treat that as "no data", not as a failure.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the link. Later `send()`/`receive()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}
