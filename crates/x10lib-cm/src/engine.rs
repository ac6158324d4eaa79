//! Protocol engine: communication state, the checked `send` primitive, and
//! the inbound transition table.
//!
//! The engine is shared between the reader task and any number of callers
//! through an `Arc`. Four regions are locked independently:
//!
//! - `protocol`: state, pending transmission, expected checksum, and the
//!   last-received timestamp. State changes are mirrored on a `watch`
//!   channel so `send` can sleep until the reader moves the state.
//! - `ack_lock`: one checked transmission in flight at a time. Handshake
//!   replies written by the reader do not take it.
//! - `registry`: modules and the addressed set.
//! - `transport`: locked per byte read and per write.
//!
//! Lock order is always `protocol` before `registry`/`transport`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use x10lib_core::error::{Error, Result};
use x10lib_core::transport::Transport;
use x10lib_core::{CommState, DeviceFamily, HouseCode, X10Event};

use crate::commands::time_sync_frame;
use crate::protocol::{
    ENABLE_RING_SIGNAL, PC_ACK, PC_READY, PC_STATUS_REQUEST, PLC_FILTER_FAIL_POLL, PLC_MACRO,
    PLC_POLL, PLC_READY, PLC_RF, PLC_TIME_REQUEST, checksum, hex,
};
use crate::registry::ModuleRegistry;
use crate::rf::{RfDeduplicator, apply_rf, classify_rf, decode_rf};
use crate::rx::{apply_rx, decode_rx};

/// Largest burst the reader accumulates.
pub const MAX_BURST: usize = 32;

/// Minimum status block length that completes the open handshake.
const STATUS_MIN_LEN: usize = 9;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing and identity parameters of one engine.
#[derive(Debug, Clone)]
pub(crate) struct EngineConfig {
    pub family: DeviceFamily,
    /// How long `send` waits for `Ready` after each transmission.
    pub command_timeout: Duration,
    /// Retransmissions after the initial write before giving up.
    pub max_retransmissions: u32,
    /// Minimum gap between the last inbound burst and a new command.
    pub quiet_period: Duration,
    /// Per-byte read timeout; a gap this long ends a burst.
    pub byte_timeout: Duration,
    /// Pause between reader iterations.
    pub poll_interval: Duration,
    pub min_rf_repeat_delay: Duration,
    pub monitored_houses: Vec<HouseCode>,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            family: DeviceFamily::Cm11,
            command_timeout: Duration::from_secs(5),
            max_retransmissions: 3,
            quiet_period: Duration::from_millis(100),
            byte_timeout: Duration::from_millis(150),
            poll_interval: Duration::from_secs(1),
            min_rf_repeat_delay: crate::rf::DEFAULT_MIN_REPEAT_DELAY,
            monitored_houses: vec![HouseCode::A],
            event_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared protocol region
// ---------------------------------------------------------------------------

/// The last tracked transmission, kept for resend.
#[derive(Debug)]
struct Pending {
    bytes: Vec<u8>,
    sent_at: Instant,
}

#[derive(Debug)]
pub(crate) struct ProtocolState {
    state: CommState,
    pending: Option<Pending>,
    expected_checksum: u8,
    last_received: Instant,
}

fn accepts_command(family: DeviceFamily, state: CommState) -> bool {
    state == CommState::Ready || (family.skips_handshake() && state == CommState::Connected)
}

pub(crate) struct Engine {
    config: EngineConfig,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    protocol: Mutex<ProtocolState>,
    state_tx: watch::Sender<CommState>,
    ack_lock: Mutex<()>,
    /// Serializes whole commands (address phase + function phase).
    pub(crate) command_lock: Mutex<()>,
    pub(crate) registry: Mutex<ModuleRegistry>,
    rf_dedup: Mutex<RfDeduplicator>,
    event_tx: broadcast::Sender<X10Event>,
}

impl Engine {
    pub(crate) fn new(config: EngineConfig, transport: Box<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (state_tx, _) = watch::channel(CommState::Disconnected);

        let mut registry = ModuleRegistry::new(event_tx.clone());
        for &house in &config.monitored_houses {
            registry.register_house(house);
        }

        Engine {
            rf_dedup: Mutex::new(RfDeduplicator::new(config.min_rf_repeat_delay)),
            config,
            transport: Arc::new(Mutex::new(transport)),
            protocol: Mutex::new(ProtocolState {
                state: CommState::Disconnected,
                pending: None,
                expected_checksum: 0,
                last_received: Instant::now(),
            }),
            state_tx,
            ack_lock: Mutex::new(()),
            command_lock: Mutex::new(()),
            registry: Mutex::new(registry),
            event_tx,
        }
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn family(&self) -> DeviceFamily {
        self.config.family
    }

    pub(crate) fn comm_state(&self) -> CommState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<X10Event> {
        self.event_tx.subscribe()
    }

    /// Move to `next`, publishing `StatusChanged` only on an actual change.
    fn transition(&self, proto: &mut ProtocolState, next: CommState) {
        if proto.state == next {
            return;
        }
        debug!(from = %proto.state, to = %next, "state change");
        proto.state = next;
        self.state_tx.send_replace(next);
        let _ = self.event_tx.send(X10Event::StatusChanged { state: next });
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write without recording anything. Failures are logged, not raised.
    async fn write_raw(&self, data: &[u8]) -> bool {
        debug!(data = %hex(data), "send");
        let mut transport = self.transport.lock().await;
        match transport.send(data).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, data = %hex(data), "interface I/O error");
                false
            }
        }
    }

    /// Write and record the frame as the pending transmission.
    async fn write_tracked(&self, proto: &mut ProtocolState, data: &[u8]) -> bool {
        proto.pending = Some(Pending {
            bytes: data.to_vec(),
            sent_at: Instant::now(),
        });
        self.write_raw(data).await
    }

    async fn resend_pending(&self, proto: &mut ProtocolState) -> bool {
        match proto.pending.as_ref().map(|p| p.bytes.clone()) {
            Some(bytes) => self.write_tracked(proto, &bytes).await,
            None => {
                warn!("no pending transmission to resend");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Open / close
    // -----------------------------------------------------------------------

    /// Open the transport and start the status handshake.
    pub(crate) async fn open(&self) -> Result<()> {
        {
            let mut transport = self.transport.lock().await;
            if let Err(e) = transport.open().await {
                tracing::error!(error = %e, "unable to connect");
                return Err(e);
            }
        }

        let mut proto = self.protocol.lock().await;
        proto.pending = None;
        self.transition(&mut proto, CommState::WaitingStatus);
        info!(family = %self.config.family, "interface connected, requesting status");
        self.write_raw(&[PC_STATUS_REQUEST]).await;

        if self.config.family.skips_handshake() {
            self.transition(&mut proto, CommState::Connected);
        }
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        let result = self.transport.lock().await.close().await;
        let mut proto = self.protocol.lock().await;
        proto.pending = None;
        self.transition(&mut proto, CommState::Disconnected);
        result
    }

    // -----------------------------------------------------------------------
    // Send primitive
    // -----------------------------------------------------------------------

    /// Wait for the quiet period and, for checked sends, for a state that
    /// accepts commands. Returns the locked protocol region so the caller's
    /// state change is atomic with the check, or `None` once disconnected.
    async fn wait_until_clear(
        &self,
        requires_checksum: bool,
    ) -> Option<MutexGuard<'_, ProtocolState>> {
        let family = self.config.family;
        let mut state_rx = self.state_tx.subscribe();
        loop {
            let proto = self.protocol.lock().await;
            if proto.state == CommState::Disconnected {
                return None;
            }
            let quiet_until = proto.last_received + self.config.quiet_period;
            let now = Instant::now();
            let accepts = !requires_checksum || accepts_command(family, proto.state);
            if now >= quiet_until && accepts {
                return Some(proto);
            }
            drop(proto);

            if now < quiet_until {
                tokio::time::sleep_until(quiet_until).await;
            } else {
                let _ = tokio::time::timeout(
                    self.config.command_timeout,
                    state_rx.wait_for(|s| accepts_command(family, *s) || *s == CommState::Disconnected),
                )
                .await;
            }
        }
    }

    /// Transmit a frame.
    ///
    /// Unchecked frames are written once. Checked frames move the state to
    /// `WaitingChecksum` (CM11) or `WaitingAck` (CM15), then wait for the
    /// reader to bring the state back to `Ready`, retransmitting the pending
    /// frame each time `command_timeout` elapses, at most
    /// `max_retransmissions` times. A silent device costs
    /// `max_retransmissions` timeouts in total.
    ///
    /// Afterwards the state is forced to `Ready`, so the result is `true`
    /// even when every retransmission went unanswered. It is `false` only
    /// when the transport is closed.
    pub(crate) async fn send(&self, frame: &[u8], requires_checksum: bool) -> bool {
        let _ack = self.ack_lock.lock().await;

        if !self.transport.lock().await.is_connected() {
            warn!(data = %hex(frame), "send while not connected");
            return false;
        }
        let Some(mut proto) = self.wait_until_clear(requires_checksum).await else {
            warn!(data = %hex(frame), "send aborted, interface disconnected");
            return false;
        };

        if !requires_checksum {
            drop(proto);
            return self.write_raw(frame).await;
        }

        if self.config.family.requires_checksum() {
            proto.expected_checksum = checksum(frame);
            debug!(
                expected = %format!("{:02X}", proto.expected_checksum),
                "waiting for checksum"
            );
            self.transition(&mut proto, CommState::WaitingChecksum);
        } else {
            self.transition(&mut proto, CommState::WaitingAck);
        }
        self.write_tracked(&mut proto, frame).await;
        drop(proto);

        let timeout = self.config.command_timeout;
        let mut state_rx = self.state_tx.subscribe();
        let mut retransmissions = 0;
        loop {
            let deadline = {
                let proto = self.protocol.lock().await;
                if matches!(proto.state, CommState::Ready | CommState::Disconnected) {
                    break;
                }
                proto.pending.as_ref().map_or_else(Instant::now, |p| p.sent_at) + timeout
            };

            let woke = tokio::time::timeout_at(
                deadline,
                state_rx.wait_for(|s| matches!(s, CommState::Ready | CommState::Disconnected)),
            )
            .await
            .is_ok();
            if woke {
                continue;
            }

            let mut proto = self.protocol.lock().await;
            // A handshake write from the reader may have moved the deadline.
            let expired = proto
                .pending
                .as_ref()
                .is_none_or(|p| p.sent_at + timeout <= Instant::now());
            if !expired || matches!(proto.state, CommState::Ready | CommState::Disconnected) {
                continue;
            }
            if retransmissions < self.config.max_retransmissions {
                retransmissions += 1;
                warn!(attempt = retransmissions, "previous command timed out, resending");
                self.resend_pending(&mut proto).await;
            }
            // The last retransmission gets no wait of its own.
            if retransmissions >= self.config.max_retransmissions {
                warn!(
                    data = %hex(frame),
                    retransmissions,
                    "command not acknowledged, giving up"
                );
                break;
            }
        }

        let mut proto = self.protocol.lock().await;
        proto.pending = None;
        if proto.state != CommState::Disconnected {
            self.transition(&mut proto, CommState::Ready);
        }
        proto.state == CommState::Ready
    }

    /// Answer a time request: download the current local time.
    pub(crate) async fn sync_time(&self, battery_clear: bool) -> bool {
        let house = self
            .config
            .monitored_houses
            .first()
            .copied()
            .unwrap_or(HouseCode::A);
        let frame = time_sync_frame(
            &chrono::Local::now(),
            house,
            battery_clear,
            self.config.family,
        );
        self.registry.lock().await.clear_addressed();
        info!(data = %hex(&frame), "updating interface time");
        self.send(&frame, true).await
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Read one burst, a byte at a time.
    ///
    /// Stops at the first read timeout, once the length prefix is satisfied
    /// (`len > 1 && buf[0] < len`), or at [`MAX_BURST`] bytes.
    pub(crate) async fn read_burst(&self) -> Vec<u8> {
        let mut burst = Vec::with_capacity(MAX_BURST);
        let mut byte = [0u8; 1];
        while burst.len() < MAX_BURST {
            let result = {
                let mut transport = self.transport.lock().await;
                transport.receive(&mut byte, self.config.byte_timeout).await
            };
            match result {
                Ok(0) | Err(Error::Timeout) => break,
                Ok(_) => burst.push(byte[0]),
                Err(e) => {
                    warn!(error = %e, "read failed");
                    break;
                }
            }
            if burst.len() > 1 && (burst[0] as usize) < burst.len() {
                break;
            }
        }
        burst
    }

    /// Run one burst through the transition table. The first matching row
    /// wins.
    pub(crate) async fn on_burst(self: &Arc<Self>, burst: &[u8]) {
        let Some(&first) = burst.first() else {
            return;
        };
        let mut proto = self.protocol.lock().await;
        proto.last_received = Instant::now();
        let state = proto.state;
        let single = burst.len() == 1;
        debug!(data = %hex(burst), %state, "receive");

        if single && first == PLC_READY && state == CommState::WaitingReady {
            self.transition(&mut proto, CommState::Ready);
            debug!("ready received, command successful");
            self.write_tracked(&mut proto, &[PC_ACK]).await;
        } else if single && first == PLC_READY && state == CommState::WaitingAck {
            self.transition(&mut proto, CommState::Ready);
            debug!("command acknowledged");
        } else if state == CommState::WaitingStatus && burst.len() >= STATUS_MIN_LEN {
            proto.expected_checksum = ENABLE_RING_SIGNAL;
            self.transition(&mut proto, CommState::WaitingChecksum);
            debug!("status received");
            self.write_tracked(&mut proto, &[ENABLE_RING_SIGNAL]).await;
        } else if state == CommState::WaitingChecksum && single {
            let expected = proto.expected_checksum;
            if first == expected {
                debug!(checksum = %format!("{first:02X}"), "checksum ok");
                self.transition(&mut proto, CommState::WaitingReady);
                self.write_tracked(&mut proto, &[PC_ACK]).await;
            } else {
                warn!(
                    received = %format!("{first:02X}"),
                    expected = %format!("{expected:02X}"),
                    "checksum mismatch, resending"
                );
                self.resend_pending(&mut proto).await;
            }
        } else if single && first == PLC_POLL {
            debug!("poll received");
            self.write_raw(&[PC_READY]).await;
            self.transition(&mut proto, CommState::WaitingRx);
        } else if single && first == PLC_FILTER_FAIL_POLL {
            debug!("filter fail poll received");
            self.write_raw(&[PLC_FILTER_FAIL_POLL]).await;
            self.transition(&mut proto, CommState::Ready);
        } else if state == CommState::WaitingRx {
            match decode_rx(burst, self.config.family) {
                Some(items) => apply_rx(&items, &mut *self.registry.lock().await),
                None => warn!(data = %hex(burst), "malformed powerline burst"),
            }
            self.transition(&mut proto, CommState::Ready);
        } else if first == PLC_MACRO {
            info!(data = %hex(burst), "macro triggered");
        } else if first == PLC_RF {
            self.handle_rf(burst).await;
            self.transition(&mut proto, CommState::Ready);
        } else if first == PLC_TIME_REQUEST {
            info!("time request from interface");
            self.transition(&mut proto, CommState::Ready);
            drop(proto);
            // The download is a checked send; the reader must stay free to
            // process its handshake.
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                engine.sync_time(false).await;
            });
        } else {
            debug!(data = %hex(burst), %state, "unhandled burst");
        }
    }

    async fn handle_rf(&self, burst: &[u8]) {
        let Some(frame) = classify_rf(burst) else {
            warn!(data = %hex(burst), "bad RF message");
            return;
        };
        if !self
            .rf_dedup
            .lock()
            .await
            .accept(frame.as_bytes(), Instant::now())
        {
            warn!(
                window_ms = self.config.min_rf_repeat_delay.as_millis() as u64,
                "ignoring repeated RF message"
            );
            return;
        }

        debug!(data = %hex(frame.as_bytes()), "RF frame");
        let _ = self.event_tx.send(X10Event::RfDataReceived {
            raw: frame.as_bytes().to_vec(),
        });
        apply_rf(decode_rf(&frame), &mut *self.registry.lock().await);
    }

    #[cfg(test)]
    pub(crate) async fn force_state(&self, state: CommState) {
        let mut proto = self.protocol.lock().await;
        self.transition(&mut proto, state);
    }
}
