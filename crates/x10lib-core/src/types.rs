//! Core types used throughout x10lib.
//!
//! These types model the X10 addressing scheme (house code + unit code),
//! the powerline and RF function vocabularies, and the state of the link to
//! a CM11/CM15 interface.

use std::fmt;
use std::str::FromStr;

/// The 4-bit X10 wire encoding shared by house letters A..P and units 1..16.
///
/// X10 does not encode addresses in order: `A`/`1` is `0x6`, `B`/`2` is
/// `0xE`, and so on. Index `n` of this table is the wire code of the
/// `n`-th house letter or unit number.
const WIRE_CODES: [u8; 16] = [
    0x6, 0xE, 0x2, 0xA, 0x1, 0x9, 0x5, 0xD, 0x7, 0xF, 0x3, 0xB, 0x0, 0x8, 0x4, 0xC,
];

/// Position of a wire code in [`WIRE_CODES`].
fn wire_index(code: u8) -> Option<usize> {
    WIRE_CODES.iter().position(|&c| c == (code & 0x0F))
}

// ---------------------------------------------------------------
// House / unit addressing
// ---------------------------------------------------------------

/// X10 house code (A through P).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HouseCode {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
}

impl HouseCode {
    /// All sixteen house codes in letter order.
    pub const ALL: [HouseCode; 16] = [
        HouseCode::A,
        HouseCode::B,
        HouseCode::C,
        HouseCode::D,
        HouseCode::E,
        HouseCode::F,
        HouseCode::G,
        HouseCode::H,
        HouseCode::I,
        HouseCode::J,
        HouseCode::K,
        HouseCode::L,
        HouseCode::M,
        HouseCode::N,
        HouseCode::O,
        HouseCode::P,
    ];

    /// The 4-bit wire code placed in the high nibble of address and
    /// function bytes.
    ///
    /// ```
    /// use x10lib_core::HouseCode;
    ///
    /// assert_eq!(HouseCode::A.code(), 0x6);
    /// assert_eq!(HouseCode::B.code(), 0xE);
    /// ```
    pub fn code(self) -> u8 {
        WIRE_CODES[self as usize]
    }

    /// Decode a 4-bit wire code. Only the low nibble of `code` is used, so
    /// every input maps to a house code.
    pub fn from_code(code: u8) -> HouseCode {
        // Every nibble appears exactly once in WIRE_CODES.
        let index = wire_index(code).unwrap_or(0);
        HouseCode::ALL[index]
    }

    /// The house letter (`'A'`..=`'P'`).
    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }

    /// Parse a house letter, case-insensitive.
    pub fn from_letter(c: char) -> Option<HouseCode> {
        let upper = c.to_ascii_uppercase();
        if upper.is_ascii_uppercase() && upper <= 'P' {
            Some(HouseCode::ALL[(upper as u8 - b'A') as usize])
        } else {
            None
        }
    }
}

impl fmt::Display for HouseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for HouseCode {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                HouseCode::from_letter(c).ok_or_else(|| ParseAddressError(s.to_string()))
            }
            _ => Err(ParseAddressError(s.to_string())),
        }
    }
}

/// X10 unit code (1 through 16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitCode(u8);

impl UnitCode {
    /// Create a unit code from its number. Returns `None` outside `1..=16`.
    pub fn new(number: u8) -> Option<UnitCode> {
        if (1..=16).contains(&number) {
            Some(UnitCode(number))
        } else {
            None
        }
    }

    /// The unit number, `1..=16`.
    pub fn number(self) -> u8 {
        self.0
    }

    /// The 4-bit wire code placed in the low nibble of an address byte.
    ///
    /// ```
    /// use x10lib_core::UnitCode;
    ///
    /// assert_eq!(UnitCode::new(1).unwrap().code(), 0x6);
    /// assert_eq!(UnitCode::new(13).unwrap().code(), 0x0);
    /// ```
    pub fn code(self) -> u8 {
        WIRE_CODES[(self.0 - 1) as usize]
    }

    /// Decode a 4-bit wire code. Only the low nibble of `code` is used.
    pub fn from_code(code: u8) -> UnitCode {
        UnitCode(wire_index(code).unwrap_or(0) as u8 + 1)
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string cannot be parsed into a house code or
/// module address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid X10 address: {}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

/// A module address: house code plus unit code, written `"B13"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleAddress {
    pub house: HouseCode,
    pub unit: UnitCode,
}

impl ModuleAddress {
    pub fn new(house: HouseCode, unit: UnitCode) -> Self {
        ModuleAddress { house, unit }
    }

    /// Decode a packed address byte (house code in the high nibble, unit
    /// code in the low nibble).
    pub fn from_byte(byte: u8) -> Self {
        ModuleAddress {
            house: HouseCode::from_code(byte >> 4),
            unit: UnitCode::from_code(byte & 0x0F),
        }
    }

    /// Pack into the address byte used on the wire.
    ///
    /// ```
    /// use x10lib_core::ModuleAddress;
    ///
    /// let addr: ModuleAddress = "B13".parse().unwrap();
    /// assert_eq!(addr.to_byte(), 0xE0);
    /// ```
    pub fn to_byte(self) -> u8 {
        (self.house.code() << 4) | self.unit.code()
    }
}

impl fmt::Display for ModuleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.house, self.unit)
    }
}

impl FromStr for ModuleAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let house = chars
            .next()
            .and_then(HouseCode::from_letter)
            .ok_or_else(|| ParseAddressError(s.to_string()))?;
        let unit = chars
            .as_str()
            .parse::<u8>()
            .ok()
            .and_then(UnitCode::new)
            .ok_or_else(|| ParseAddressError(s.to_string()))?;
        Ok(ModuleAddress { house, unit })
    }
}

// ---------------------------------------------------------------
// Function vocabularies
// ---------------------------------------------------------------

/// Powerline function code, carried in the low nibble of a function byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X10Command {
    AllUnitsOff,
    AllLightsOn,
    On,
    Off,
    Dim,
    Bright,
    AllLightsOff,
    ExtendedCode,
    HailRequest,
    HailAcknowledge,
    PresetDim1,
    PresetDim2,
    ExtendedDataTransfer,
    StatusOn,
    StatusOff,
    StatusRequest,
}

impl X10Command {
    const ALL: [X10Command; 16] = [
        X10Command::AllUnitsOff,
        X10Command::AllLightsOn,
        X10Command::On,
        X10Command::Off,
        X10Command::Dim,
        X10Command::Bright,
        X10Command::AllLightsOff,
        X10Command::ExtendedCode,
        X10Command::HailRequest,
        X10Command::HailAcknowledge,
        X10Command::PresetDim1,
        X10Command::PresetDim2,
        X10Command::ExtendedDataTransfer,
        X10Command::StatusOn,
        X10Command::StatusOff,
        X10Command::StatusRequest,
    ];

    /// The 4-bit function code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode the low nibble of a function byte.
    pub fn from_code(code: u8) -> X10Command {
        X10Command::ALL[(code & 0x0F) as usize]
    }
}

impl fmt::Display for X10Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Function carried by a standard RF command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RfFunction {
    On,
    Off,
    AllLightsOn,
    AllLightsOff,
    Dim,
    Bright,
}

impl RfFunction {
    /// Classify the function byte (byte 4) of a standard RF frame.
    ///
    /// Returns `None` when the byte addresses a single unit; the unit
    /// decoder then extracts On/Off from bit 5.
    pub fn from_group_byte(byte: u8) -> Option<RfFunction> {
        match byte {
            0x80 => Some(RfFunction::AllLightsOff),
            0x88 => Some(RfFunction::Bright),
            0x90 => Some(RfFunction::AllLightsOn),
            0x98 => Some(RfFunction::Dim),
            _ => None,
        }
    }
}

impl fmt::Display for RfFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Event reported by an X10 security device (door/window sensor, motion
/// sensor, security remote).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RfSecurityEvent {
    DoorSensor1Alert,
    DoorSensor1Normal,
    DoorSensor1AlertTamper,
    DoorSensor1NormalTamper,
    DoorSensor2Alert,
    DoorSensor2Normal,
    DoorSensor2AlertTamper,
    DoorSensor2NormalTamper,
    DoorSensorBatteryLow,
    DoorSensorBatteryOk,
    MotionAlert,
    MotionNormal,
    MotionBatteryLow,
    MotionBatteryOk,
    RemoteArmAway,
    RemoteArmHome,
    RemoteDisarm,
    RemoteLightOn,
    RemoteLightOff,
    RemotePanic,
}

impl RfSecurityEvent {
    /// Decode byte 4 of a security frame.
    pub fn from_byte(byte: u8) -> Option<RfSecurityEvent> {
        let event = match byte {
            0x04 => RfSecurityEvent::DoorSensor1Alert,
            0x84 => RfSecurityEvent::DoorSensor1Normal,
            0x44 => RfSecurityEvent::DoorSensor1AlertTamper,
            0xC4 => RfSecurityEvent::DoorSensor1NormalTamper,
            0x00 => RfSecurityEvent::DoorSensor2Alert,
            0x80 => RfSecurityEvent::DoorSensor2Normal,
            0x40 => RfSecurityEvent::DoorSensor2AlertTamper,
            0xC0 => RfSecurityEvent::DoorSensor2NormalTamper,
            0x01 => RfSecurityEvent::DoorSensorBatteryLow,
            0x81 => RfSecurityEvent::DoorSensorBatteryOk,
            0x0C => RfSecurityEvent::MotionAlert,
            0x8C => RfSecurityEvent::MotionNormal,
            0x0D => RfSecurityEvent::MotionBatteryLow,
            0x8D => RfSecurityEvent::MotionBatteryOk,
            0x06 => RfSecurityEvent::RemoteArmAway,
            0x0E => RfSecurityEvent::RemoteArmHome,
            0x86 => RfSecurityEvent::RemoteDisarm,
            0x46 => RfSecurityEvent::RemoteLightOn,
            0xC6 => RfSecurityEvent::RemoteLightOff,
            0x26 => RfSecurityEvent::RemotePanic,
            _ => return None,
        };
        Some(event)
    }
}

impl fmt::Display for RfSecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------
// Link state and device family
// ---------------------------------------------------------------

/// State of the half-duplex conversation with the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommState {
    Ready,
    WaitingStatus,
    WaitingChecksum,
    WaitingReady,
    WaitingRx,
    WaitingAck,
    Connected,
    Disconnected,
}

impl fmt::Display for CommState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommState::Ready => "ready",
            CommState::WaitingStatus => "waiting-status",
            CommState::WaitingChecksum => "waiting-checksum",
            CommState::WaitingReady => "waiting-ready",
            CommState::WaitingRx => "waiting-rx",
            CommState::WaitingAck => "waiting-ack",
            CommState::Connected => "connected",
            CommState::Disconnected => "disconnected",
        };
        write!(f, "{s}")
    }
}

/// Hardware family of the attached interface.
///
/// Selected once when the controller is built. The family decides how a
/// command is acknowledged, how dim levels are framed, and whether extended
/// receives arrive byte-reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceFamily {
    /// CM11 serial interface: every command is confirmed by a checksum
    /// handshake.
    #[default]
    Cm11,
    /// CM15 USB interface: acknowledges commands directly and delivers
    /// extended receives byte-reversed.
    Cm15,
}

impl DeviceFamily {
    /// Whether checked commands go through the checksum handshake.
    pub fn requires_checksum(self) -> bool {
        matches!(self, DeviceFamily::Cm11)
    }

    /// Whether the interface is usable without the status/ack handshake.
    pub fn skips_handshake(self) -> bool {
        matches!(self, DeviceFamily::Cm15)
    }

    /// Whether multi-byte powerline receives arrive in reverse order.
    pub fn reverses_extended_receive(self) -> bool {
        matches!(self, DeviceFamily::Cm15)
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFamily::Cm11 => write!(f, "CM11"),
            DeviceFamily::Cm15 => write!(f, "CM15"),
        }
    }
}

/// Error returned when a string cannot be parsed into a [`DeviceFamily`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFamilyError(String);

impl fmt::Display for ParseFamilyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device family: {}", self.0)
    }
}

impl std::error::Error for ParseFamilyError {}

impl FromStr for DeviceFamily {
    type Err = ParseFamilyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CM11" | "SERIAL" => Ok(DeviceFamily::Cm11),
            "CM15" | "USB" => Ok(DeviceFamily::Cm15),
            _ => Err(ParseFamilyError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------
// Inbound level requests
// ---------------------------------------------------------------

/// Operation requested through the set-level surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelOperation {
    On,
    Off,
    Dim,
    Bright,
    ShutterOpen,
}

impl FromStr for LevelOperation {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(LevelOperation::On),
            "off" => Ok(LevelOperation::Off),
            "dim" => Ok(LevelOperation::Dim),
            "bright" => Ok(LevelOperation::Bright),
            "shopen" | "shutter-open" => Ok(LevelOperation::ShutterOpen),
            _ => Err(ParseAddressError(s.to_string())),
        }
    }
}

/// A request to change a module level, as received from an external
/// command source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelRequest {
    pub address: ModuleAddress,
    pub operation: LevelOperation,
    /// Percentage `0..=100`; ignored by On/Off.
    pub percentage: u8,
}

impl LevelRequest {
    /// Parse a `"<address>/<operation>"` path plus a numeric payload, e.g.
    /// `("B13/shopen", "40")`. Any leading path segments are ignored, so a
    /// topic root such as `"x10/B13/bright"` also parses.
    pub fn from_path(path: &str, payload: &str) -> std::result::Result<Self, ParseAddressError> {
        let mut segments = path.rsplit('/');
        let operation = segments
            .next()
            .ok_or_else(|| ParseAddressError(path.to_string()))?
            .parse::<LevelOperation>()?;
        let address = segments
            .next()
            .ok_or_else(|| ParseAddressError(path.to_string()))?
            .parse::<ModuleAddress>()?;
        let percentage = if payload.trim().is_empty() {
            0
        } else {
            payload
                .trim()
                .parse::<u8>()
                .map_err(|_| ParseAddressError(payload.to_string()))?
                .min(100)
        };
        Ok(LevelRequest {
            address,
            operation,
            percentage,
        })
    }
}
