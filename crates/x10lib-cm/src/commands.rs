//! Frame builders for outbound CM11/CM15 commands.
//!
//! All functions are pure: they produce byte vectors without performing any
//! I/O. The controller hands the result to the engine's `send` primitive.

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, Timelike};
use x10lib_core::{DeviceFamily, HouseCode, ModuleAddress, X10Command};

use crate::protocol::{
    ADDRESS, DIM_SCALE, EXT_FUNCTION, EXT_SHUTTER_OPEN, FUNCTION, TIME_DOWNLOAD, TRANSCEIVE_CODES,
};

/// Number of dim steps a CM11 can express in one function header.
pub const CM11_DIM_STEPS: u8 = 22;

/// Full scale of the extended shutter level byte.
pub const SHUTTER_LEVEL_STEPS: u8 = 25;

// ---------------------------------------------------------------
// Level quantizers
// ---------------------------------------------------------------

/// CM11 dim step count for a percentage (0..=22).
///
/// ```
/// use x10lib_cm::commands::dim_steps;
///
/// assert_eq!(dim_steps(50), 11);
/// assert_eq!(dim_steps(100), 22);
/// ```
pub fn dim_steps(percent: u8) -> u8 {
    let percent = percent.min(100) as f64;
    (percent * CM11_DIM_STEPS as f64 / 100.0).round() as u8
}

/// Level delta expressed by a CM11 dim step count.
pub fn steps_to_level(steps: u8) -> f64 {
    steps as f64 / CM11_DIM_STEPS as f64
}

/// CM15 magnitude byte (0..=210) for a percentage.
pub fn cm15_magnitude(percent: u8) -> u8 {
    (percent.min(100) as f64 / 100.0 * DIM_SCALE) as u8
}

/// Extended shutter level (0..=25) for a percentage.
pub fn shutter_level(percent: u8) -> u8 {
    (percent.min(100) as f64 * SHUTTER_LEVEL_STEPS as f64 / 100.0).round() as u8
}

// ---------------------------------------------------------------
// Frames
// ---------------------------------------------------------------

fn two_byte(header: u8, payload: u8) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(2);
    buf.put_u8(header);
    buf.put_u8(payload);
    buf.to_vec()
}

/// Address phase: select a single module.
pub fn address_frame(address: ModuleAddress) -> Vec<u8> {
    two_byte(ADDRESS, address.to_byte())
}

/// Address phase for a whole house (unit nibble 0).
pub fn house_address_frame(house: HouseCode) -> Vec<u8> {
    two_byte(ADDRESS, house.code() << 4)
}

/// Function phase without a level.
pub fn function_frame(house: HouseCode, command: X10Command) -> Vec<u8> {
    two_byte(FUNCTION, (house.code() << 4) | command.code())
}

/// Dim/bright function phase. Returns the frame and the level delta the
/// hardware will apply, so the caller can update the module optimistically.
///
/// The CM11 carries the step count in bits 3..7 of the header byte; the
/// CM15 appends a 0..=210 magnitude byte.
pub fn dim_frame(
    family: DeviceFamily,
    house: HouseCode,
    command: X10Command,
    percent: u8,
) -> (Vec<u8>, f64) {
    let function = (house.code() << 4) | command.code();
    match family {
        DeviceFamily::Cm11 => {
            let steps = dim_steps(percent);
            (two_byte(FUNCTION | (steps << 3), function), steps_to_level(steps))
        }
        DeviceFamily::Cm15 => {
            let mut buf = BytesMut::with_capacity(3);
            buf.put_u8(FUNCTION);
            buf.put_u8(function);
            buf.put_u8(cm15_magnitude(percent));
            (buf.to_vec(), percent.min(100) as f64 / 100.0)
        }
    }
}

/// Extended "shutter open" frame. Carries the unit code itself, so no
/// address phase precedes it.
pub fn shutter_open_frame(address: ModuleAddress, percent: u8) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(EXT_FUNCTION);
    buf.put_u8((address.house.code() << 4) | X10Command::ExtendedCode.code());
    buf.put_u8(address.unit.code());
    buf.put_u8(shutter_level(percent));
    buf.put_u8(EXT_SHUTTER_OPEN);
    buf.to_vec()
}

/// Timer download frame answering a time request.
///
/// ```text
/// 0x9B  seconds  minutes(0..119)  hours/2  yearday[0..7]  daymask|yearday[8]<<7  house<<4|flags
/// ```
///
/// `flags` is 0x07 when the battery timer should be cleared, 0x03
/// otherwise (monitored status clear + timer purge). The CM15 expects one
/// trailing 0x02.
pub fn time_sync_frame<T>(
    now: &T,
    house: HouseCode,
    battery_clear: bool,
    family: DeviceFamily,
) -> Vec<u8>
where
    T: Datelike + Timelike,
{
    let hour = now.hour();
    let minute = now.minute() + if hour % 2 == 1 { 60 } else { 0 };
    let mut day_mask = 1u8 << now.weekday().num_days_from_sunday();
    let mut year_day = now.ordinal0();
    if year_day > 255 {
        year_day -= 256;
        day_mask |= 0x80;
    }
    let flags = if battery_clear { 0x07 } else { 0x03 };

    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8(TIME_DOWNLOAD);
    buf.put_u8(now.second() as u8);
    buf.put_u8(minute as u8);
    buf.put_u8((hour / 2) as u8);
    buf.put_u8(year_day as u8);
    buf.put_u8(day_mask);
    buf.put_u8((house.code() << 4) | flags);
    if family == DeviceFamily::Cm15 {
        buf.put_u8(0x02);
    }
    buf.to_vec()
}

/// Bit in the CM15 transceive mask for a house code, as `(high byte, mask)`.
fn transceive_bit(house: HouseCode) -> (bool, u8) {
    use HouseCode::*;
    match house {
        E => (false, 0x80),
        M => (false, 0x40),
        C => (false, 0x20),
        K => (false, 0x10),
        O => (false, 0x08),
        G => (false, 0x04),
        A => (false, 0x02),
        I => (false, 0x01),
        F => (true, 0x80),
        N => (true, 0x40),
        D => (true, 0x20),
        L => (true, 0x10),
        P => (true, 0x08),
        H => (true, 0x04),
        B => (true, 0x02),
        J => (true, 0x01),
    }
}

/// CM15 frame selecting which house codes are transceived from RF to
/// powerline.
pub fn transceive_codes_frame(houses: &[HouseCode]) -> Vec<u8> {
    let (mut high, mut low) = (0u8, 0u8);
    for &house in houses {
        match transceive_bit(house) {
            (true, mask) => high |= mask,
            (false, mask) => low |= mask,
        }
    }
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u8(TRANSCEIVE_CODES);
    buf.put_u8(high);
    buf.put_u8(low);
    buf.put_u8(0x05);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn addr(s: &str) -> ModuleAddress {
        s.parse().unwrap()
    }

    #[test]
    fn address_frames() {
        assert_eq!(address_frame(addr("B13")), vec![0x04, 0xE0]);
        assert_eq!(address_frame(addr("A1")), vec![0x04, 0x66]);
        assert_eq!(house_address_frame(HouseCode::C), vec![0x04, 0x20]);
    }

    #[test]
    fn function_frames() {
        assert_eq!(
            function_frame(HouseCode::B, X10Command::On),
            vec![0x06, 0xE2]
        );
        assert_eq!(
            function_frame(HouseCode::A, X10Command::AllUnitsOff),
            vec![0x06, 0x60]
        );
        assert_eq!(
            function_frame(HouseCode::A, X10Command::StatusRequest),
            vec![0x06, 0x6F]
        );
    }

    #[test]
    fn cm11_dim_frame_packs_steps_into_header() {
        let (frame, delta) = dim_frame(DeviceFamily::Cm11, HouseCode::A, X10Command::Dim, 50);
        assert_eq!(frame, vec![0x06 | (11 << 3), 0x64]);
        assert!((delta - 0.5).abs() < 1e-9);

        let (frame, delta) = dim_frame(DeviceFamily::Cm11, HouseCode::A, X10Command::Bright, 100);
        assert_eq!(frame, vec![0xB6, 0x65]);
        assert_eq!(delta, 1.0);
    }

    #[test]
    fn cm15_dim_frame_appends_magnitude() {
        let (frame, delta) = dim_frame(DeviceFamily::Cm15, HouseCode::B, X10Command::Dim, 50);
        assert_eq!(frame, vec![0x06, 0xE4, 105]);
        assert_eq!(delta, 0.5);
    }

    #[test]
    fn quantizers_saturate() {
        assert_eq!(dim_steps(0), 0);
        assert_eq!(dim_steps(255), 22);
        assert_eq!(cm15_magnitude(100), 210);
        assert_eq!(cm15_magnitude(200), 210);
        assert_eq!(shutter_level(40), 10);
        assert_eq!(shutter_level(100), 25);
    }

    #[test]
    fn shutter_frame_layout() {
        assert_eq!(
            shutter_open_frame(addr("A2"), 100),
            vec![0x07, 0x67, 0x0E, 25, 0x03]
        );
    }

    #[test]
    fn time_sync_odd_hour_and_late_year() {
        // 2023-12-31 is a Sunday, ordinal0 = 364.
        let t = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(13, 5, 42)
            .unwrap();
        let frame = time_sync_frame(&t, HouseCode::A, false, DeviceFamily::Cm11);
        assert_eq!(
            frame,
            vec![0x9B, 42, 65, 6, (364 - 256) as u8, 0x01 | 0x80, 0x63]
        );
    }

    #[test]
    fn time_sync_cm15_trailer_and_battery_flag() {
        // 2024-03-06 is a Wednesday, ordinal0 = 65.
        let t = NaiveDate::from_ymd_opt(2024, 3, 6)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let frame = time_sync_frame(&t, HouseCode::B, true, DeviceFamily::Cm15);
        assert_eq!(frame, vec![0x9B, 0, 30, 4, 65, 1 << 3, 0xE7, 0x02]);
    }

    #[test]
    fn transceive_mask() {
        assert_eq!(
            transceive_codes_frame(&[HouseCode::A]),
            vec![0xBB, 0x00, 0x02, 0x05]
        );
        assert_eq!(
            transceive_codes_frame(&[HouseCode::A, HouseCode::B, HouseCode::E]),
            vec![0xBB, 0x02, 0x82, 0x05]
        );
        assert_eq!(
            transceive_codes_frame(&HouseCode::ALL),
            vec![0xBB, 0xFF, 0xFF, 0x05]
        );
    }
}
