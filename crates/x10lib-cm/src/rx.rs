//! Powerline (RX) burst decoder.
//!
//! After a poll, the interface uploads its buffer as
//!
//! ```text
//! N  bitmap  payload[0] .. payload[N-2]
//! ```
//!
//! where `N` counts the bytes after itself and bit `i` of `bitmap` tells
//! whether `payload[i]` is an address (0) or a function (1). A Dim or
//! Bright function is followed by one magnitude byte on the 0..=210 scale.

use x10lib_core::{DeviceFamily, HouseCode, ModuleAddress, X10Command, X10Event};

use crate::protocol::{DIM_SCALE, bit, hex};
use crate::registry::ModuleRegistry;

/// One item decoded from a powerline burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxItem {
    Address(ModuleAddress),
    Function {
        house: HouseCode,
        command: X10Command,
        /// Magnitude byte consumed by Dim/Bright; `None` when the burst
        /// ended before it.
        magnitude: Option<u8>,
    },
}

/// Decode a powerline burst into address and function items.
///
/// Returns `None` when the burst is malformed: shorter than four bytes, not
/// longer than its length prefix, or with a prefix outside `2..=9` (the
/// bitmap classifies at most eight payload bytes).
///
/// ```
/// use x10lib_cm::rx::{decode_rx, RxItem};
/// use x10lib_core::DeviceFamily;
///
/// let items = decode_rx(&[0x03, 0x02, 0xE2, 0xE2], DeviceFamily::Cm11).unwrap();
/// assert_eq!(items.len(), 2);
/// assert!(matches!(items[0], RxItem::Address(_)));
/// ```
pub fn decode_rx(burst: &[u8], family: DeviceFamily) -> Option<Vec<RxItem>> {
    let declared = *burst.first()? as usize;
    if burst.len() <= 3 || burst.len() <= declared || !(2..=9).contains(&declared) {
        return None;
    }

    let count = declared - 1;
    let map = burst[1];
    let mut is_function: Vec<bool> = (0..count).map(|i| bit(map, i as u8)).collect();
    let mut payload: Vec<u8> = burst[2..2 + count].to_vec();

    if family.reverses_extended_receive() && declared > 2 {
        is_function.reverse();
        payload.reverse();
    }

    tracing::debug!(map = ?is_function, data = %hex(&payload), "decoding powerline burst");

    let mut items = Vec::with_capacity(count);
    let mut i = 0;
    while i < payload.len() {
        let byte = payload[i];
        if is_function[i] {
            let command = X10Command::from_code(byte);
            let magnitude = match command {
                X10Command::Dim | X10Command::Bright => {
                    i += 1;
                    payload.get(i).copied()
                }
                _ => None,
            };
            items.push(RxItem::Function {
                house: HouseCode::from_code(byte >> 4),
                command,
                magnitude,
            });
        } else {
            items.push(RxItem::Address(ModuleAddress::from_byte(byte)));
        }
        i += 1;
    }
    Some(items)
}

/// Apply decoded items to the registry, emitting address- and
/// function-received events in order.
///
/// All-lights on/off are reported but leave module levels untouched.
pub fn apply_rx(items: &[RxItem], registry: &mut ModuleRegistry) {
    for item in items {
        match *item {
            RxItem::Address(address) => {
                tracing::info!(%address, "powerline address");
                registry.select_received(address);
            }
            RxItem::Function {
                house,
                command,
                magnitude,
            } => {
                tracing::info!(%house, %command, "powerline function");
                match (command, magnitude) {
                    (X10Command::On, _) => registry.set_addressed_level(1.0),
                    (X10Command::Off, _) => registry.set_addressed_level(0.0),
                    (X10Command::Bright, Some(m)) => {
                        registry.adjust_addressed(m as f64 / DIM_SCALE)
                    }
                    (X10Command::Dim, Some(m)) => registry.adjust_addressed(-(m as f64) / DIM_SCALE),
                    (X10Command::Bright | X10Command::Dim, None) => {
                        tracing::warn!(%house, %command, "magnitude byte missing");
                    }
                    _ => {}
                }
                registry.end_address_group();
                registry.publish(X10Event::PlcFunctionReceived { command, house });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    fn addr(s: &str) -> ModuleAddress {
        s.parse().unwrap()
    }

    fn registry() -> (ModuleRegistry, broadcast::Receiver<X10Event>) {
        let (tx, rx) = broadcast::channel(64);
        (ModuleRegistry::new(tx), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<X10Event>) -> Vec<X10Event> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn address_then_function() {
        let items = decode_rx(&[0x03, 0x02, 0xE2, 0xE2], DeviceFamily::Cm11).unwrap();
        assert_eq!(
            items,
            vec![
                RxItem::Address(addr("B3")),
                RxItem::Function {
                    house: HouseCode::B,
                    command: X10Command::On,
                    magnitude: None
                }
            ]
        );
    }

    #[test]
    fn address_on_sets_level() {
        let (mut reg, mut rx) = registry();
        let items = decode_rx(&[0x03, 0x02, 0x66, 0x62], DeviceFamily::Cm11).unwrap();
        apply_rx(&items, &mut reg);

        assert_eq!(reg.level(addr("A1")), 1.0);
        assert_eq!(
            drain(&mut rx),
            vec![
                X10Event::PlcAddressReceived {
                    house: HouseCode::A,
                    unit: addr("A1").unit
                },
                X10Event::ModuleLevelChanged {
                    address: addr("A1"),
                    level: 1.0
                },
                X10Event::PlcFunctionReceived {
                    command: X10Command::On,
                    house: HouseCode::A
                },
            ]
        );
    }

    #[test]
    fn dim_consumes_magnitude() {
        let (mut reg, _rx) = registry();
        reg.set_level(addr("A1"), 1.0);
        reg.select(addr("A1"));
        // bitmap 0b010: payload[1] is a function, payload[2] its magnitude.
        let items = decode_rx(&[0x04, 0x02, 0x66, 0x64, 105], DeviceFamily::Cm11).unwrap();
        assert_eq!(items.len(), 2);
        apply_rx(&items, &mut reg);
        assert_eq!(reg.level(addr("A1")), 0.5);
    }

    #[test]
    fn missing_magnitude_is_skipped() {
        let (mut reg, mut rx) = registry();
        reg.set_level(addr("A1"), 0.5);
        let _ = drain(&mut rx);
        let items = decode_rx(&[0x03, 0x02, 0x66, 0x65], DeviceFamily::Cm11).unwrap();
        apply_rx(&items, &mut reg);
        assert_eq!(reg.level(addr("A1")), 0.5);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, X10Event::PlcFunctionReceived { .. }))
        );
    }

    #[test]
    fn all_lights_on_is_reported_only() {
        let (mut reg, mut rx) = registry();
        let items = decode_rx(&[0x03, 0x02, 0x66, 0x61], DeviceFamily::Cm11).unwrap();
        apply_rx(&items, &mut reg);
        assert_eq!(reg.level(addr("A1")), 0.0);
        let events = drain(&mut rx);
        assert!(events.contains(&X10Event::PlcFunctionReceived {
            command: X10Command::AllLightsOn,
            house: HouseCode::A
        }));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, X10Event::ModuleLevelChanged { .. }))
        );
    }

    #[test]
    fn cm15_payload_is_reversed() {
        // Wire order: function, then address; reversed it reads address, function.
        let items = decode_rx(&[0x03, 0x01, 0x62, 0x66], DeviceFamily::Cm15).unwrap();
        assert_eq!(items[0], RxItem::Address(addr("A1")));
        assert!(matches!(
            items[1],
            RxItem::Function {
                command: X10Command::On,
                ..
            }
        ));
    }

    #[test]
    fn short_or_truncated_bursts_are_rejected() {
        assert!(decode_rx(&[], DeviceFamily::Cm11).is_none());
        assert!(decode_rx(&[0x02, 0x00, 0x66], DeviceFamily::Cm11).is_none());
        // Declares five bytes but only four follow.
        assert!(decode_rx(&[0x05, 0x02, 0x66, 0x62, 0x00], DeviceFamily::Cm11).is_none());
        assert!(decode_rx(&[0x00, 0x00, 0x00, 0x00], DeviceFamily::Cm11).is_none());
        assert!(decode_rx(&[0x0C; 13], DeviceFamily::Cm11).is_none());
    }

    #[test]
    fn second_group_replaces_addressed_set() {
        let (mut reg, _rx) = registry();
        // A1 On, then A2 Off: the Off must not reach A1.
        let burst = [0x05, 0b1010, 0x66, 0x62, 0x6E, 0x63];
        let items = decode_rx(&burst, DeviceFamily::Cm11).unwrap();
        apply_rx(&items, &mut reg);
        assert_eq!(reg.level(addr("A1")), 1.0);
        assert_eq!(reg.level(addr("A2")), 0.0);
        assert_eq!(reg.addressed(), &[addr("A2")]);
    }

    #[test]
    fn powerline_group_after_rf_command_stands_alone() {
        let (mut reg, _rx) = registry();
        let a1_on = crate::rf::classify_rf(&[0x5D, 0x20, 0x60, 0x9F, 0x00, 0xFF]).unwrap();
        crate::rf::apply_rf(crate::rf::decode_rf(&a1_on), &mut reg);
        assert_eq!(reg.level(addr("A1")), 1.0);

        // B3, then B Off.
        let items = decode_rx(&[0x03, 0x02, 0xE2, 0xE3], DeviceFamily::Cm11).unwrap();
        apply_rx(&items, &mut reg);
        assert_eq!(reg.addressed(), &[addr("B3")]);
        assert_eq!(reg.level(addr("A1")), 1.0);
        assert_eq!(reg.level(addr("B3")), 0.0);
    }
}
