//! RF frame decoder and repeat suppression.
//!
//! The interface forwards RF traffic as a burst starting with
//! [`PLC_RF`](crate::protocol::PLC_RF). Two layouts are understood:
//!
//! ```text
//! standard  5D 20 b2 b3 b4 b5          b3 ⊆ !b2, b5 ⊆ !b4
//! security  5D 29 b2 b3 b4 b5 b6 b7    b3 = b2 ^ 0x0F, b5 = !b4
//! ```
//!
//! Remotes repeat every press several times, so identical frames inside a
//! short window are dropped by [`RfDeduplicator`].

use std::time::Duration;

use tokio::time::Instant;
use x10lib_core::{HouseCode, ModuleAddress, RfFunction, RfSecurityEvent, UnitCode, X10Event};

use crate::protocol::{
    DIM_SCALE, RF_COMMAND_PREFIX, RF_DIM_BRIGHT_STEP, RF_SECURITY_PREFIX, bit, reverse_nibble,
};
use crate::registry::ModuleRegistry;

/// Default minimum delay between two identical RF frames.
pub const DEFAULT_MIN_REPEAT_DELAY: Duration = Duration::from_millis(500);

/// A structurally valid RF frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RfFrame {
    /// Security sensor/remote frame, with byte 7 normalized (0x80 -> 0x00).
    Security([u8; 8]),
    /// Standard X10 remote command frame.
    Command([u8; 6]),
}

impl RfFrame {
    /// The raw bytes, including the leading RF marker.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RfFrame::Security(b) => b,
            RfFrame::Command(b) => b,
        }
    }
}

/// Semantic content of an RF frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfMessage {
    Security {
        /// `None` when byte 4 is not a known event code.
        event: Option<RfSecurityEvent>,
        code: u8,
        address: u32,
    },
    Command {
        function: RfFunction,
        house: HouseCode,
        /// Set for single-unit on/off, `None` for group functions.
        unit: Option<UnitCode>,
    },
}

/// Validate an RF burst. Returns `None` for anything that is neither a
/// well-formed security frame nor a well-formed command frame.
pub fn classify_rf(burst: &[u8]) -> Option<RfFrame> {
    if let Ok(mut b) = <[u8; 8]>::try_from(burst) {
        if b[1] == RF_SECURITY_PREFIX && (b[3] ^ b[2]) == 0x0F && (b[5] ^ b[4]) == 0xFF {
            if b[7] == 0x80 {
                b[7] = 0x00;
            }
            return Some(RfFrame::Security(b));
        }
        return None;
    }
    if let Ok(b) = <[u8; 6]>::try_from(burst) {
        if b[1] == RF_COMMAND_PREFIX && (b[3] & !b[2]) == b[3] && (b[5] & !b[4]) == b[5] {
            return Some(RfFrame::Command(b));
        }
    }
    None
}

/// Decode a validated frame.
pub fn decode_rf(frame: &RfFrame) -> RfMessage {
    match frame {
        RfFrame::Security(b) => RfMessage::Security {
            event: RfSecurityEvent::from_byte(b[4]),
            code: b[4],
            address: b[2] as u32 | (b[6] as u32) << 8 | (b[7] as u32) << 16,
        },
        RfFrame::Command(b) => {
            let (b2, b4) = (b[2], b[4]);
            let house = HouseCode::from_code(reverse_nibble(b2 >> 4));
            if let Some(function) = RfFunction::from_group_byte(b4) {
                return RfMessage::Command {
                    function,
                    house,
                    unit: None,
                };
            }
            let index = (bit(b2, 2) as u8) << 3
                | (bit(b4, 6) as u8) << 2
                | (bit(b4, 3) as u8) << 1
                | bit(b4, 4) as u8;
            let function = if bit(b4, 5) {
                RfFunction::Off
            } else {
                RfFunction::On
            };
            RfMessage::Command {
                function,
                house,
                unit: UnitCode::new(index + 1),
            }
        }
    }
}

/// Drops a frame identical to the previous accepted one when it arrives
/// inside the minimum repeat delay.
#[derive(Debug)]
pub struct RfDeduplicator {
    min_delay: Duration,
    last: Option<(Vec<u8>, Instant)>,
}

impl RfDeduplicator {
    pub fn new(min_delay: Duration) -> Self {
        RfDeduplicator {
            min_delay,
            last: None,
        }
    }

    /// Returns `true` if the frame should be processed.
    pub fn accept(&mut self, raw: &[u8], now: Instant) -> bool {
        if let Some((last, at)) = &self.last {
            if last.as_slice() == raw && now.saturating_duration_since(*at) < self.min_delay {
                return false;
            }
        }
        self.last = Some((raw.to_vec(), now));
        true
    }
}

impl Default for RfDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_REPEAT_DELAY)
    }
}

/// Apply a decoded RF message to the registry and publish the matching
/// event.
pub fn apply_rf(message: RfMessage, registry: &mut ModuleRegistry) {
    match message {
        RfMessage::Security {
            event: Some(event),
            address,
            ..
        } => {
            tracing::info!(?event, address = %format!("{address:06X}"), "RF security event");
            registry.publish(X10Event::RfSecurityReceived { event, address });
        }
        RfMessage::Security {
            event: None, code, ..
        } => {
            tracing::warn!(code = %format!("{code:02X}"), "unknown RF security event");
        }
        RfMessage::Command {
            function, house, ..
        } if matches!(function, RfFunction::Dim | RfFunction::Bright) => {
            tracing::info!(%function, "RF command");
            let step = RF_DIM_BRIGHT_STEP as f64 / DIM_SCALE;
            let delta = if function == RfFunction::Dim { -step } else { step };
            registry.adjust_addressed(delta);
            registry.publish(X10Event::RfCommandReceived {
                function,
                house,
                unit: None,
            });
        }
        RfMessage::Command {
            function, house, ..
        } if matches!(function, RfFunction::AllLightsOn | RfFunction::AllLightsOff) => {
            tracing::info!(%function, %house, "RF command");
            let level = if function == RfFunction::AllLightsOn { 1.0 } else { 0.0 };
            registry.set_house_level(house, level);
            registry.publish(X10Event::RfCommandReceived {
                function,
                house,
                unit: None,
            });
        }
        RfMessage::Command {
            function,
            house,
            unit: Some(unit),
        } => {
            let address = ModuleAddress::new(house, unit);
            tracing::info!(%function, %address, "RF command");
            registry.begin_command_address(address);
            let level = if function == RfFunction::On { 1.0 } else { 0.0 };
            registry.set_addressed_level(level);
            registry.publish(X10Event::RfCommandReceived {
                function,
                house,
                unit: Some(unit),
            });
        }
        RfMessage::Command { function, .. } => {
            tracing::warn!(%function, "could not resolve RF unit code");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    const A1_ON: [u8; 6] = [0x5D, 0x20, 0x60, 0x9F, 0x00, 0xFF];

    fn addr(s: &str) -> ModuleAddress {
        s.parse().unwrap()
    }

    fn command(b2: u8, b4: u8) -> [u8; 6] {
        [0x5D, 0x20, b2, !b2, b4, !b4]
    }

    #[test]
    fn classifies_command_frame() {
        assert_eq!(classify_rf(&A1_ON), Some(RfFrame::Command(A1_ON)));
    }

    #[test]
    fn rejects_broken_parity() {
        assert_eq!(classify_rf(&[0x5D, 0x20, 0x60, 0x60, 0x00, 0xFF]), None);
        assert_eq!(classify_rf(&[0x5D, 0x20, 0x60, 0x9F, 0x20, 0x21]), None);
    }

    #[test]
    fn rejects_wrong_prefix_or_length() {
        assert_eq!(classify_rf(&[0x5D, 0x29, 0x60, 0x9F, 0x00, 0xFF]), None);
        assert_eq!(classify_rf(&[0x5D, 0x20, 0x60, 0x9F, 0x00]), None);
        assert_eq!(classify_rf(&[0x5D, 0x20, 0x12, 0x1D, 0x0C, 0xF3, 0x34, 0x00]), None);
    }

    #[test]
    fn security_frame_normalizes_byte7() {
        let frame = classify_rf(&[0x5D, 0x29, 0x12, 0x1D, 0x0C, 0xF3, 0x34, 0x80]).unwrap();
        assert_eq!(
            decode_rf(&frame),
            RfMessage::Security {
                event: Some(RfSecurityEvent::MotionAlert),
                code: 0x0C,
                address: 0x00_34_12,
            }
        );
    }

    #[test]
    fn decodes_unit_on_and_off() {
        let frame = classify_rf(&A1_ON).unwrap();
        assert_eq!(
            decode_rf(&frame),
            RfMessage::Command {
                function: RfFunction::On,
                house: HouseCode::A,
                unit: UnitCode::new(1),
            }
        );

        // B13 off: house B reversed is 0x7, unit index 12 = b2 bit 2 + b4 bit 6.
        let frame = classify_rf(&command(0x74, 0x60)).unwrap();
        assert_eq!(
            decode_rf(&frame),
            RfMessage::Command {
                function: RfFunction::Off,
                house: HouseCode::B,
                unit: UnitCode::new(13),
            }
        );
    }

    #[test]
    fn decodes_group_functions() {
        let frame = classify_rf(&command(0x60, 0x90)).unwrap();
        assert_eq!(
            decode_rf(&frame),
            RfMessage::Command {
                function: RfFunction::AllLightsOn,
                house: HouseCode::A,
                unit: None,
            }
        );
    }

    #[test]
    fn dedup_window() {
        let mut dedup = RfDeduplicator::default();
        let t0 = Instant::now();
        assert!(dedup.accept(&A1_ON, t0));
        assert!(!dedup.accept(&A1_ON, t0 + Duration::from_millis(400)));
        assert!(dedup.accept(&A1_ON, t0 + Duration::from_millis(600)));
        // A different frame is never suppressed.
        assert!(dedup.accept(&command(0x60, 0x20), t0 + Duration::from_millis(610)));
    }

    #[test]
    fn apply_unit_command_resets_addressed_set() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut reg = ModuleRegistry::new(tx);
        reg.select(addr("C2"));

        apply_rf(decode_rf(&RfFrame::Command(A1_ON)), &mut reg);
        assert_eq!(reg.addressed(), &[addr("A1")]);
        assert_eq!(reg.level(addr("A1")), 1.0);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events.last(),
            Some(&X10Event::RfCommandReceived {
                function: RfFunction::On,
                house: HouseCode::A,
                unit: UnitCode::new(1),
            })
        );
    }

    #[test]
    fn apply_dim_steps_addressed_modules() {
        let (tx, _rx) = broadcast::channel(16);
        let mut reg = ModuleRegistry::new(tx);
        reg.set_level(addr("A1"), 1.0);
        reg.select(addr("A1"));

        apply_rf(decode_rf(&RfFrame::Command(command(0x60, 0x98))), &mut reg);
        assert_eq!(reg.level(addr("A1")), 0.9);
    }

    #[test]
    fn dim_event_reports_decoded_house() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut reg = ModuleRegistry::new(tx);

        apply_rf(decode_rf(&RfFrame::Command(command(0x70, 0x98))), &mut reg);
        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![X10Event::RfCommandReceived {
                function: RfFunction::Dim,
                house: HouseCode::B,
                unit: None,
            }]
        );
    }

    #[test]
    fn apply_all_lights_off_targets_house() {
        let (tx, _rx) = broadcast::channel(16);
        let mut reg = ModuleRegistry::new(tx);
        reg.set_level(addr("A1"), 1.0);
        reg.set_level(addr("B1"), 1.0);

        apply_rf(decode_rf(&RfFrame::Command(command(0x60, 0x80))), &mut reg);
        assert_eq!(reg.level(addr("A1")), 0.0);
        assert_eq!(reg.level(addr("B1")), 1.0);
    }
}
