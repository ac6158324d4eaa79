//! Snapshot of a single X10 module.

use std::fmt;

use crate::types::ModuleAddress;

/// A module as seen by the registry: its address, its current level, and a
/// free-form description.
#[derive(Debug, Clone, PartialEq)]
pub struct X10Module {
    pub address: ModuleAddress,
    /// `0.0` is off, `1.0` full on (or fully open for a shutter).
    pub level: f64,
    pub description: String,
}

impl X10Module {
    /// A new module at level 0.0.
    pub fn new(address: ModuleAddress) -> Self {
        X10Module {
            address,
            level: 0.0,
            description: String::new(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.level > 0.0
    }
}

impl fmt::Display for X10Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:>3.0}%", self.address, self.level * 100.0)?;
        if !self.description.is_empty() {
            write!(f, " ({})", self.description)?;
        }
        Ok(())
    }
}

/// Clamp a level into `0.0..=1.0` and round it to two decimals.
///
/// ```
/// use x10lib_core::clamp_level;
///
/// assert_eq!(clamp_level(1.3), 1.0);
/// assert_eq!(clamp_level(-0.2), 0.0);
/// assert_eq!(clamp_level(0.456), 0.46);
/// ```
pub fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        return 0.0;
    }
    ((level * 100.0).round() / 100.0).clamp(0.0, 1.0)
}
