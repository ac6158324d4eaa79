//! CM11/CM15 wire constants and byte-level helpers.
//!
//! Every exchange with the interface is a short burst of raw bytes. Frames
//! sent by the PC start with a header byte ([`ADDRESS`], [`FUNCTION`],
//! [`EXT_FUNCTION`]) followed by nibble-packed house/unit/function codes.
//! Bursts sent by the interface are either single control bytes
//! ([`PLC_READY`], [`PLC_POLL`], ...) or length-prefixed data.

// ---------------------------------------------------------------
// PC -> interface
// ---------------------------------------------------------------

/// Header of an address frame: `[ADDRESS, house<<4 | unit]`.
pub const ADDRESS: u8 = 0x04;

/// Header of a standard function frame: `[FUNCTION, house<<4 | command]`.
pub const FUNCTION: u8 = 0x06;

/// Header of an extended function frame.
pub const EXT_FUNCTION: u8 = 0x07;

/// Acknowledge a correct checksum or a ready byte.
pub const PC_ACK: u8 = 0x00;

/// Ask the interface for its 14-byte status block.
pub const PC_STATUS_REQUEST: u8 = 0x8B;

/// Reply to a powerline poll; the interface then uploads its buffer.
pub const PC_READY: u8 = 0xC3;

/// Expected checksum once the status block has been received.
pub const ENABLE_RING_SIGNAL: u8 = 0xEB;

/// Header of the timer download (time sync) frame.
pub const TIME_DOWNLOAD: u8 = 0x9B;

/// Header of the CM15 transceived house code mask.
pub const TRANSCEIVE_CODES: u8 = 0xBB;

/// Extended command code for a shutter "open to level".
pub const EXT_SHUTTER_OPEN: u8 = 0x03;

// ---------------------------------------------------------------
// Interface -> PC
// ---------------------------------------------------------------

/// The interface finished transmitting the last command.
pub const PLC_READY: u8 = 0x55;

/// The interface has powerline data to upload.
pub const PLC_POLL: u8 = 0x5A;

/// Poll sent when the interface's filter failed; echoed back.
pub const PLC_FILTER_FAIL_POLL: u8 = 0xF3;

/// A macro stored in the interface fired.
pub const PLC_MACRO: u8 = 0x5B;

/// An RF frame follows.
pub const PLC_RF: u8 = 0x5D;

/// The interface lost power and asks for the current time.
pub const PLC_TIME_REQUEST: u8 = 0xA5;

// ---------------------------------------------------------------
// RF frames
// ---------------------------------------------------------------

/// Byte 1 of a standard RF command frame.
pub const RF_COMMAND_PREFIX: u8 = 0x20;

/// Byte 1 of an RF security frame.
pub const RF_SECURITY_PREFIX: u8 = 0x29;

/// Dim/bright step applied by one RF dim or bright press, on the 0..=210
/// magnitude scale.
pub const RF_DIM_BRIGHT_STEP: u8 = 0x16;

/// Full scale of a powerline dim/bright magnitude byte.
pub const DIM_SCALE: f64 = 210.0;

/// Arithmetic checksum the CM11 echoes for every command: the sum of the
/// frame bytes modulo 256.
///
/// ```
/// use x10lib_cm::protocol::checksum;
///
/// assert_eq!(checksum(&[0x04, 0xE0]), 0xE4);
/// assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
/// assert_eq!(checksum(&[]), 0x00);
/// ```
pub fn checksum(frame: &[u8]) -> u8 {
    frame.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Reverse the bit order of a 4-bit value.
pub fn reverse_nibble(value: u8) -> u8 {
    (value & 0x0F).reverse_bits() >> 4
}

/// Whether bit `n` of `byte` is set.
pub(crate) fn bit(byte: u8, n: u8) -> bool {
    (byte >> n) & 1 == 1
}

/// Format a byte slice the way the logs show bursts: `5A-C3-...`.
pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[0x80, 0x80]), 0x00);
        assert_eq!(checksum(&[0x06, 0xE2]), 0xE8);
    }

    #[test]
    fn checksum_matches_sum_mod_256() {
        let frames: [&[u8]; 4] = [
            &[0x9B, 0x3B, 0x77, 0x0B, 0xFF, 0xC1, 0x63],
            &[0x07, 0x67, 0x00, 0x19, 0x03],
            &[0xBB, 0xFF, 0xFF, 0x05],
            &[0x01],
        ];
        for frame in frames {
            let sum: u32 = frame.iter().map(|&b| b as u32).sum();
            assert_eq!(checksum(frame) as u32, sum % 256);
        }
    }

    #[test]
    fn nibble_reversal() {
        assert_eq!(reverse_nibble(0b0001), 0b1000);
        assert_eq!(reverse_nibble(0b0110), 0b0110);
        assert_eq!(reverse_nibble(0b1101), 0b1011);
        assert_eq!(reverse_nibble(0xF0), 0x00);
    }

    #[test]
    fn bit_helper() {
        assert!(bit(0b0010_0000, 5));
        assert!(!bit(0b0010_0000, 4));
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(hex(&[0x5D, 0x20, 0x0F]), "5D-20-0F");
        assert_eq!(hex(&[]), "");
    }
}
