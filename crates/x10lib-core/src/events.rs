//! Asynchronous X10 event types.
//!
//! Events are emitted by the protocol engine through a
//! [`tokio::sync::broadcast`] channel in the order the engine detects them.
//! A message-bus bridge or a UI subscribes to these instead of polling
//! module levels.

use crate::types::{
    CommState, HouseCode, ModuleAddress, RfFunction, RfSecurityEvent, UnitCode, X10Command,
};

/// An event emitted by an X10 controller.
///
/// Subscribe via [`crate::controller::Controller::subscribe()`]. Delivery is
/// best-effort through a bounded broadcast channel; a slow consumer may
/// observe `RecvError::Lagged`.
#[derive(Debug, Clone, PartialEq)]
pub enum X10Event {
    /// A module's level changed. Only fired when the value actually differs.
    ModuleLevelChanged {
        address: ModuleAddress,
        /// New level in `0.0..=1.0`.
        level: f64,
    },

    /// An address byte was decoded from a powerline burst.
    PlcAddressReceived { house: HouseCode, unit: UnitCode },

    /// A function byte was decoded from a powerline burst.
    PlcFunctionReceived {
        command: X10Command,
        house: HouseCode,
    },

    /// A valid, non-duplicate RF burst arrived. Carries the raw frame
    /// including the leading RF marker byte.
    RfDataReceived { raw: Vec<u8> },

    /// A standard RF command was decoded. `unit` is `None` for group
    /// functions (dim, bright, all-lights).
    RfCommandReceived {
        function: RfFunction,
        house: HouseCode,
        unit: Option<UnitCode>,
    },

    /// An RF security sensor or remote reported an event.
    RfSecurityReceived {
        event: RfSecurityEvent,
        /// 24-bit sensor address.
        address: u32,
    },

    /// The communication state changed.
    StatusChanged { state: CommState },
}
