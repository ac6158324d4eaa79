//! The `Controller` trait -- the command surface of an X10 interface.
//!
//! Applications program against `dyn Controller` without caring whether a
//! CM11 or a CM15 sits on the other end of the wire.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::events::X10Event;
use crate::module::X10Module;
use crate::types::*;

/// Asynchronous interface for issuing X10 commands.
///
/// Command methods return `true` once the command was handed to the
/// interface. They never return errors; transport faults are logged and
/// reported as `false`. Each command updates the local module level
/// optimistically right after transmission, before the hardware confirms.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Open the transport and start the reader task.
    async fn open(&self) -> Result<()>;

    /// Stop the reader task and close the transport.
    async fn close(&self) -> Result<()>;

    /// Which hardware family this controller drives.
    fn family(&self) -> DeviceFamily;

    /// Current communication state.
    fn comm_state(&self) -> CommState;

    /// Turn a unit on.
    async fn unit_on(&self, address: ModuleAddress) -> bool;

    /// Turn a unit off.
    async fn unit_off(&self, address: ModuleAddress) -> bool;

    /// Dim a unit by `percent` (0..=100).
    async fn dim(&self, address: ModuleAddress, percent: u8) -> bool;

    /// Brighten a unit by `percent` (0..=100).
    async fn bright(&self, address: ModuleAddress, percent: u8) -> bool;

    /// Move a shutter module to `percent` open.
    async fn shutter_open(&self, address: ModuleAddress, percent: u8) -> bool;

    /// Turn every lamp module of a house on.
    async fn all_lights_on(&self, house: HouseCode) -> bool;

    /// Turn every module of a house off.
    async fn all_units_off(&self, house: HouseCode) -> bool;

    /// Ask a module to report its status.
    async fn status_request(&self, address: ModuleAddress) -> bool;

    /// Route an inbound set-level request to the matching command.
    async fn apply_request(&self, request: LevelRequest) -> bool {
        let LevelRequest {
            address,
            operation,
            percentage,
        } = request;
        match operation {
            LevelOperation::On => self.unit_on(address).await,
            LevelOperation::Off => self.unit_off(address).await,
            LevelOperation::Dim => self.dim(address, percentage).await,
            LevelOperation::Bright => self.bright(address, percentage).await,
            LevelOperation::ShutterOpen => self.shutter_open(address, percentage).await,
        }
    }

    /// Snapshot of one module, creating it at level 0.0 if unknown.
    async fn module(&self, address: ModuleAddress) -> X10Module;

    /// Snapshot of every known module, sorted by address.
    async fn modules(&self) -> Vec<X10Module>;

    /// Subscribe to controller events.
    fn subscribe(&self) -> broadcast::Receiver<X10Event>;
}
