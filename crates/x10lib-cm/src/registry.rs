//! Module registry and the addressed set.
//!
//! X10 addressing is stateful: an address frame selects one or more
//! modules, and the next function frame applies to all of them. The
//! registry mirrors that context so that both outbound commands and decoded
//! inbound traffic update the right modules.

use std::collections::BTreeMap;

use tokio::sync::broadcast;
use x10lib_core::{HouseCode, ModuleAddress, X10Event, X10Module, clamp_level};

/// Owns every known module plus the current addressed set.
///
/// Modules are created on first reference at level 0.0 and never removed.
/// Every level change is clamped to `0.0..=1.0` and published as
/// [`X10Event::ModuleLevelChanged`] when the value actually differs.
#[derive(Debug)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleAddress, X10Module>,
    addressed: Vec<ModuleAddress>,
    /// Set after a function byte; the next decoded address starts a new
    /// group and clears the addressed set first.
    new_address_group: bool,
    event_tx: broadcast::Sender<X10Event>,
}

impl ModuleRegistry {
    pub fn new(event_tx: broadcast::Sender<X10Event>) -> Self {
        ModuleRegistry {
            modules: BTreeMap::new(),
            addressed: Vec::new(),
            new_address_group: true,
            event_tx,
        }
    }

    fn emit(&self, event: X10Event) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    // -----------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------

    /// Look up a module, creating it at level 0.0 if unknown.
    pub fn module(&mut self, address: ModuleAddress) -> &X10Module {
        self.modules
            .entry(address)
            .or_insert_with(|| X10Module::new(address))
    }

    pub fn get(&self, address: ModuleAddress) -> Option<&X10Module> {
        self.modules.get(&address)
    }

    pub fn level(&mut self, address: ModuleAddress) -> f64 {
        self.module(address).level
    }

    /// All known modules in address order.
    pub fn modules(&self) -> impl Iterator<Item = &X10Module> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Pre-create the sixteen modules of a house.
    pub fn register_house(&mut self, house: HouseCode) {
        for unit in 1..=16 {
            if let Some(unit) = x10lib_core::UnitCode::new(unit) {
                self.module(ModuleAddress::new(house, unit));
            }
        }
    }

    pub fn set_description(&mut self, address: ModuleAddress, description: &str) {
        self.modules
            .entry(address)
            .or_insert_with(|| X10Module::new(address))
            .description = description.to_string();
    }

    // -----------------------------------------------------------
    // Levels
    // -----------------------------------------------------------

    /// Set a module's level (clamped). Returns `true` if it changed.
    pub fn set_level(&mut self, address: ModuleAddress, level: f64) -> bool {
        let level = clamp_level(level);
        let module = self
            .modules
            .entry(address)
            .or_insert_with(|| X10Module::new(address));
        if module.level == level {
            return false;
        }
        module.level = level;
        tracing::debug!(%address, level, "module level changed");
        self.emit(X10Event::ModuleLevelChanged { address, level });
        true
    }

    /// Add `delta` to a module's level (clamped).
    pub fn adjust_level(&mut self, address: ModuleAddress, delta: f64) -> bool {
        let current = self.level(address);
        self.set_level(address, current + delta)
    }

    /// Set every addressed module to `level`.
    pub fn set_addressed_level(&mut self, level: f64) {
        for address in self.addressed.clone() {
            self.set_level(address, level);
        }
    }

    /// Add `delta` to every addressed module.
    pub fn adjust_addressed(&mut self, delta: f64) {
        for address in self.addressed.clone() {
            self.adjust_level(address, delta);
        }
    }

    /// Set every registered module of `house` to `level` and clear the
    /// addressed set.
    pub fn set_house_level(&mut self, house: HouseCode, level: f64) {
        self.clear_addressed();
        let targets: Vec<ModuleAddress> = self
            .modules
            .keys()
            .filter(|a| a.house == house)
            .copied()
            .collect();
        for address in targets {
            self.set_level(address, level);
        }
    }

    // -----------------------------------------------------------
    // Addressed set
    // -----------------------------------------------------------

    pub fn addressed(&self) -> &[ModuleAddress] {
        &self.addressed
    }

    pub fn clear_addressed(&mut self) {
        self.addressed.clear();
    }

    /// Add a module to the addressed set (creating it if needed). The set
    /// stays duplicate-free.
    pub fn select(&mut self, address: ModuleAddress) {
        self.module(address);
        if !self.addressed.contains(&address) {
            self.addressed.push(address);
        }
    }

    /// Outbound address phase or an RF unit command: the addressed set
    /// becomes exactly `address`, and the next decoded address starts a new
    /// group.
    pub fn begin_command_address(&mut self, address: ModuleAddress) {
        self.clear_addressed();
        self.select(address);
        self.new_address_group = true;
    }

    /// An address byte decoded from the powerline.
    pub fn select_received(&mut self, address: ModuleAddress) {
        if self.new_address_group {
            self.new_address_group = false;
            self.clear_addressed();
        }
        self.select(address);
        self.emit(X10Event::PlcAddressReceived {
            house: address.house,
            unit: address.unit,
        });
    }

    /// A function byte was decoded; subsequent addresses form a new group.
    pub fn end_address_group(&mut self) {
        self.new_address_group = true;
    }

    pub(crate) fn publish(&self, event: X10Event) {
        self.emit(event);
    }
}
