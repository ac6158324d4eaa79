//! X10Controller -- the [`Controller`] trait implementation for CM11 and
//! CM15 interfaces.
//!
//! Commands are two-phase: an address frame selects the module, then a
//! function frame tells it what to do. Both phases go through the engine's
//! checked send, and a command-level lock keeps another caller's address
//! frame from slipping in between them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use x10lib_core::controller::Controller;
use x10lib_core::error::Result;
use x10lib_core::events::X10Event;
use x10lib_core::module::X10Module;
use x10lib_core::types::*;

use crate::commands::{
    address_frame, dim_frame, function_frame, house_address_frame, shutter_open_frame,
    transceive_codes_frame,
};
use crate::engine::Engine;
use crate::protocol::PC_STATUS_REQUEST;
use crate::reader::{ReaderHandle, spawn_reader};

/// Tasks that live between `open()` and `close()`.
struct Session {
    reader: ReaderHandle,
    /// CM15 post-open initialization.
    init: Option<JoinHandle<()>>,
}

/// A CM11 or CM15 interface.
///
/// Constructed via [`X10Builder`](crate::builder::X10Builder). Module
/// levels are tracked optimistically: a command that the interface accepted
/// updates the target module without waiting for a status report.
pub struct X10Controller {
    engine: Arc<Engine>,
    session: Mutex<Option<Session>>,
}

impl Drop for X10Controller {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.reader.abort();
            if let Some(init) = session.init {
                init.abort();
            }
        }
    }
}

impl X10Controller {
    pub(crate) fn new(engine: Engine) -> Self {
        X10Controller {
            engine: Arc::new(engine),
            session: Mutex::new(None),
        }
    }

    /// Give a module a human-readable description.
    pub async fn set_module_description(&self, address: ModuleAddress, description: &str) {
        self.engine
            .registry
            .lock()
            .await
            .set_description(address, description);
    }

    /// Modules the next function frame would apply to.
    pub async fn addressed_modules(&self) -> Vec<ModuleAddress> {
        self.engine.registry.lock().await.addressed().to_vec()
    }

    /// Download the current local time to the interface.
    pub async fn sync_time(&self, clear_battery_timer: bool) -> bool {
        let _command = self.engine.command_lock.lock().await;
        self.engine.sync_time(clear_battery_timer).await
    }

    /// House codes whose modules are pre-registered (and, on a CM15,
    /// received over RF).
    pub fn monitored_houses(&self) -> &[HouseCode] {
        &self.engine.config().monitored_houses
    }

    async fn address(&self, address: ModuleAddress) -> bool {
        self.engine
            .registry
            .lock()
            .await
            .begin_command_address(address);
        self.engine.send(&address_frame(address), true).await
    }

    async fn dim_or_bright(&self, address: ModuleAddress, command: X10Command, percent: u8) -> bool {
        let _command = self.engine.command_lock.lock().await;
        info!(%address, %command, percent, "sending");
        self.address(address).await;

        let (frame, delta) = dim_frame(self.engine.family(), address.house, command, percent);
        let sent = self.engine.send(&frame, true).await;
        if sent {
            let delta = if command == X10Command::Dim { -delta } else { delta };
            self.engine
                .registry
                .lock()
                .await
                .adjust_level(address, delta);
        }
        sent
    }

    async fn house_command(&self, house: HouseCode, command: X10Command, level: f64) -> bool {
        let _command = self.engine.command_lock.lock().await;
        info!(%house, %command, "sending");
        self.engine.send(&house_address_frame(house), true).await;

        let sent = self.engine.send(&function_frame(house, command), true).await;
        if sent {
            self.engine
                .registry
                .lock()
                .await
                .set_house_level(house, level);
        }
        sent
    }
}

/// CM15 bring-up after the status request: clock, receive filter, then a
/// second status request.
async fn cm15_init(engine: Arc<Engine>) {
    let _command = engine.command_lock.lock().await;
    engine.sync_time(false).await;

    let frame = transceive_codes_frame(&engine.config().monitored_houses);
    debug!(houses = ?engine.config().monitored_houses, "setting RF receive houses");
    engine.send(&frame, true).await;
    engine.send(&[PC_STATUS_REQUEST], true).await;
}

#[async_trait]
impl Controller for X10Controller {
    async fn open(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(old) = session.take() {
            old.shutdown().await;
        }

        self.engine.open().await?;
        let reader = spawn_reader(Arc::clone(&self.engine));
        let init = match self.engine.family() {
            DeviceFamily::Cm15 => Some(tokio::spawn(cm15_init(Arc::clone(&self.engine)))),
            DeviceFamily::Cm11 => None,
        };
        *session = Some(Session { reader, init });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown().await;
        }
        info!("closing interface");
        self.engine.close().await
    }

    fn family(&self) -> DeviceFamily {
        self.engine.family()
    }

    fn comm_state(&self) -> CommState {
        self.engine.comm_state()
    }

    async fn unit_on(&self, address: ModuleAddress) -> bool {
        let _command = self.engine.command_lock.lock().await;
        info!(%address, "on");
        self.address(address).await;

        let sent = self
            .engine
            .send(&function_frame(address.house, X10Command::On), true)
            .await;
        if sent {
            let mut registry = self.engine.registry.lock().await;
            // A dimmed module comes back at its previous level.
            if registry.level(address) == 0.0 {
                registry.set_level(address, 1.0);
            }
        }
        sent
    }

    async fn unit_off(&self, address: ModuleAddress) -> bool {
        let _command = self.engine.command_lock.lock().await;
        info!(%address, "off");
        self.address(address).await;

        let sent = self
            .engine
            .send(&function_frame(address.house, X10Command::Off), true)
            .await;
        if sent {
            self.engine.registry.lock().await.set_level(address, 0.0);
        }
        sent
    }

    async fn dim(&self, address: ModuleAddress, percent: u8) -> bool {
        self.dim_or_bright(address, X10Command::Dim, percent).await
    }

    async fn bright(&self, address: ModuleAddress, percent: u8) -> bool {
        self.dim_or_bright(address, X10Command::Bright, percent).await
    }

    async fn shutter_open(&self, address: ModuleAddress, percent: u8) -> bool {
        let _command = self.engine.command_lock.lock().await;
        let percent = percent.min(100);
        info!(%address, percent, "shutter open");

        let sent = self
            .engine
            .send(&shutter_open_frame(address, percent), true)
            .await;
        if sent {
            self.engine
                .registry
                .lock()
                .await
                .set_level(address, percent as f64 / 100.0);
        }
        sent
    }

    async fn all_lights_on(&self, house: HouseCode) -> bool {
        self.house_command(house, X10Command::AllLightsOn, 1.0).await
    }

    async fn all_units_off(&self, house: HouseCode) -> bool {
        self.house_command(house, X10Command::AllUnitsOff, 0.0).await
    }

    async fn status_request(&self, address: ModuleAddress) -> bool {
        let _command = self.engine.command_lock.lock().await;
        info!(%address, "status request");
        if !self.address(address).await {
            return false;
        }
        self.engine
            .send(
                &function_frame(address.house, X10Command::StatusRequest),
                true,
            )
            .await
    }

    async fn module(&self, address: ModuleAddress) -> X10Module {
        self.engine.registry.lock().await.module(address).clone()
    }

    async fn modules(&self) -> Vec<X10Module> {
        self.engine
            .registry
            .lock()
            .await
            .modules()
            .cloned()
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<X10Event> {
        self.engine.subscribe()
    }
}

impl Session {
    async fn shutdown(self) {
        if let Some(init) = self.init {
            init.abort();
        }
        self.reader.shutdown().await;
    }
}
