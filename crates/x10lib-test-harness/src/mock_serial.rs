//! Mock transport for deterministic testing of the X10 protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait on top of a shared,
//! scripted state. It is a cheap handle: clone it, hand one clone to the
//! controller under test, and keep the other to inject inbound bursts and
//! inspect what the engine wrote.
//!
//! # Example
//!
//! ```
//! use x10lib_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // When the engine asks for status, answer with a 14-byte status block.
//! mock.expect(&[0x8B], &[0xFF; 14]);
//! // An unsolicited powerline poll from the interface.
//! mock.push_inbound(&[0x5A]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use x10lib_core::error::{Error, Result};
use x10lib_core::transport::Transport;

/// 14-byte CM11 status block returned by the simulator. The leading bytes
/// are the battery timer, reported as cleared (0xFFFF).
pub const SIMULATED_STATUS: [u8; 14] = [
    0xFF, 0xFF, 0x00, 0x00, 0x00, 0x6C, 0x01, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const STATUS_REQUEST: u8 = 0x8B;
const ACK: u8 = 0x00;
const READY: u8 = 0x55;
const POLL_REPLY: u8 = 0xC3;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Inbound chunks. A chunk that has been fully read yields one
    /// `Error::Timeout` before the next chunk starts.
    inbound: VecDeque<VecDeque<u8>>,
    connected: bool,
    open_fails: bool,
    write_fails: bool,
    sent_log: Vec<Vec<u8>>,
    open_count: usize,
    simulator: Option<Cm11Simulator>,
}

/// Answers the CM11 checksum handshake the way the hardware does.
#[derive(Debug, Default)]
struct Cm11Simulator {
    awaiting_ack: bool,
}

impl Cm11Simulator {
    fn respond(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        match data {
            [STATUS_REQUEST] => Some(SIMULATED_STATUS.to_vec()),
            [ACK] if self.awaiting_ack => {
                self.awaiting_ack = false;
                Some(vec![READY])
            }
            [ACK] | [POLL_REPLY] | [] => None,
            _ => {
                self.awaiting_ack = true;
                let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
                Some(vec![sum])
            }
        }
    }
}

/// A scripted [`Transport`] for testing without hardware.
///
/// Writes are always recorded. A write that matches the next expectation
/// consumes it and queues the paired response; a write that does not match
/// is only recorded, so a test may script just the exchanges it cares about.
/// With [`cm11_simulator`](MockTransport::cm11_simulator) enabled, writes
/// that no expectation covers are answered like a real CM11.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new, closed mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers the CM11 handshake automatically.
    pub fn cm11_simulator() -> Self {
        let mock = Self::new();
        mock.lock().simulator = Some(Cm11Simulator::default());
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A test that panicked while holding the lock has already failed.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add an expected request/response pair. An empty `response` means the
    /// request is consumed silently.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue an unsolicited inbound burst.
    pub fn push_inbound(&self, data: &[u8]) {
        if !data.is_empty() {
            self.lock().inbound.push_back(data.iter().copied().collect());
        }
    }

    /// All writes so far, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// How many times `data` has been written.
    pub fn count_sent(&self, data: &[u8]) -> usize {
        self.lock().sent_log.iter().filter(|d| d.as_slice() == data).count()
    }

    pub fn clear_sent(&self) {
        self.lock().sent_log.clear();
    }

    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// Inbound bytes not yet read.
    pub fn pending_inbound(&self) -> usize {
        self.lock().inbound.iter().map(VecDeque::len).sum()
    }

    /// Number of successful `open()` calls.
    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    /// Make subsequent `open()` calls fail.
    pub fn set_open_fails(&self, fails: bool) {
        self.lock().open_fails = fails;
    }

    /// Make subsequent `send()` calls fail with an I/O error.
    pub fn set_write_fails(&self, fails: bool) {
        self.lock().write_fails = fails;
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    /// Wait until at least `count` writes have been recorded.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.lock().sent_log.len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until every injected inbound byte has been read.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.lock().inbound.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.open_fails {
            tracing::debug!("mock transport refusing open");
            return Err(Error::Transport("mock open failure".into()));
        }
        state.connected = true;
        state.open_count += 1;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.write_fails {
            return Err(Error::Io(std::io::Error::other("mock write failure")));
        }

        state.sent_log.push(data.to_vec());

        let matched = state
            .expectations
            .front()
            .is_some_and(|e| e.request.as_slice() == data);
        let response = if matched {
            state.expectations.pop_front().map(|e| e.response)
        } else {
            state.simulator.as_mut().and_then(|sim| sim.respond(data))
        };

        if let Some(response) = response.filter(|r| !r.is_empty()) {
            state.inbound.push_back(response.into_iter().collect());
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        let Some(chunk) = state.inbound.front_mut() else {
            return Err(Error::Timeout);
        };
        if chunk.is_empty() {
            state.inbound.pop_front();
            return Err(Error::Timeout);
        }

        let n = chunk.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(chunk.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn opened() -> MockTransport {
        let mut mock = MockTransport::new();
        mock.open().await.unwrap();
        mock
    }

    #[tokio::test]
    async fn expectation_queues_response() {
        let mock = opened().await;
        mock.expect(&[0x04, 0xE0], &[0xE4]);

        let mut t = mock.clone();
        t.send(&[0x04, 0xE0]).await.unwrap();

        let mut buf = [0u8; 8];
        let n = t.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[0xE4]);
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn mismatched_write_is_recorded_only() {
        let mock = opened().await;
        mock.expect(&[0x01], &[0xFF]);

        let mut t = mock.clone();
        t.send(&[0x99]).await.unwrap();

        assert_eq!(mock.sent_data(), vec![vec![0x99]]);
        assert_eq!(mock.remaining_expectations(), 1);
        assert_eq!(mock.pending_inbound(), 0);
    }

    #[tokio::test]
    async fn chunk_boundary_yields_timeout() {
        let mut mock = opened().await;
        mock.push_inbound(&[0x5D, 0x20]);
        mock.push_inbound(&[0x5A]);

        let mut one = [0u8; 1];
        assert_eq!(mock.receive(&mut one, Duration::ZERO).await.unwrap(), 1);
        assert_eq!(one[0], 0x5D);
        assert_eq!(mock.receive(&mut one, Duration::ZERO).await.unwrap(), 1);
        assert_eq!(one[0], 0x20);
        assert!(matches!(
            mock.receive(&mut one, Duration::ZERO).await,
            Err(Error::Timeout)
        ));
        assert_eq!(mock.receive(&mut one, Duration::ZERO).await.unwrap(), 1);
        assert_eq!(one[0], 0x5A);
    }

    #[tokio::test]
    async fn receive_without_data_times_out() {
        let mut mock = opened().await;
        let mut buf = [0u8; 8];
        assert!(matches!(
            mock.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::Timeout)
        ));
    }

    #[tokio::test]
    async fn closed_transport_rejects_io() {
        let mut mock = MockTransport::new();
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(&[0x01]).await, Err(Error::NotConnected)));

        mock.open().await.unwrap();
        mock.close().await.unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            mock.receive(&mut buf, Duration::ZERO).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn failure_switches() {
        let mut mock = MockTransport::new();
        mock.set_open_fails(true);
        assert!(mock.open().await.is_err());
        assert_eq!(mock.open_count(), 0);

        mock.set_open_fails(false);
        mock.open().await.unwrap();
        mock.set_write_fails(true);
        assert!(matches!(mock.send(&[0x00]).await, Err(Error::Io(_))));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn simulator_answers_handshake() {
        let mut mock = MockTransport::cm11_simulator();
        mock.open().await.unwrap();
        let mut buf = [0u8; 32];

        mock.send(&[0x8B]).await.unwrap();
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], &SIMULATED_STATUS);
        let _ = mock.receive(&mut buf, Duration::ZERO).await;

        mock.send(&[0x04, 0xE0]).await.unwrap();
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], &[0xE4]);
        let _ = mock.receive(&mut buf, Duration::ZERO).await;

        mock.send(&[0x00]).await.unwrap();
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], &[0x55]);
        let _ = mock.receive(&mut buf, Duration::ZERO).await;

        // A second ack with nothing outstanding gets no reply.
        mock.send(&[0x00]).await.unwrap();
        assert_eq!(mock.pending_inbound(), 0);
        assert_eq!(mock.count_sent(&[0x00]), 2);
    }

    #[tokio::test]
    async fn wait_for_writes_times_out() {
        let mock = opened().await;
        assert!(!mock.wait_for_writes(1, Duration::from_millis(20)).await);
        let mut t = mock.clone();
        t.send(&[0x8B]).await.unwrap();
        assert!(mock.wait_for_writes(1, Duration::from_millis(20)).await);
    }
}
