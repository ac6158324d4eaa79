//! X10Builder -- fluent builder for constructing [`X10Controller`] instances.
//!
//! Separates configuration from construction so that callers can set the
//! serial port, the monitored house codes, and the protocol timing before
//! the transport is created.
//!
//! # Example
//!
//! ```no_run
//! use x10lib_cm::builder::X10Builder;
//! use x10lib_core::{Controller, DeviceFamily, HouseCode};
//! use std::time::Duration;
//!
//! # async fn example() -> x10lib_core::Result<()> {
//! let controller = X10Builder::new(DeviceFamily::Cm11)
//!     .serial_port("/dev/ttyUSB0")
//!     .house_codes(&[HouseCode::A, HouseCode::B])
//!     .command_timeout(Duration::from_secs(3))
//!     .build()
//!     .await?;
//! controller.open().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use x10lib_core::error::{Error, Result};
use x10lib_core::transport::Transport;
use x10lib_core::types::{DeviceFamily, HouseCode};
use x10lib_transport::{SerialConfig, SerialTransport};

use crate::controller::X10Controller;
use crate::engine::{Engine, EngineConfig};

/// Fluent builder for [`X10Controller`].
///
/// Defaults: 4800 baud, house A monitored, 5 s command timeout with 3
/// retransmissions, 100 ms quiet period, 150 ms byte timeout, 1 s poll
/// interval, 500 ms RF repeat window.
pub struct X10Builder {
    config: EngineConfig,
    serial_port: Option<String>,
    serial: SerialConfig,
}

impl X10Builder {
    /// Create a new builder for the given interface family.
    pub fn new(family: DeviceFamily) -> Self {
        X10Builder {
            config: EngineConfig {
                family,
                ..EngineConfig::default()
            },
            serial_port: None,
            serial: SerialConfig::default(),
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default 4800 baud.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.serial.baud_rate = baud;
        self
    }

    /// House codes to pre-register and, on a CM15, to receive over RF.
    /// The first one also goes into the time download frame.
    pub fn house_codes(mut self, houses: &[HouseCode]) -> Self {
        self.config.monitored_houses = houses.to_vec();
        self
    }

    /// How long a checked send waits for the handshake to finish before
    /// retransmitting (default: 5s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Retransmissions after the first write (default: 3).
    pub fn max_retransmissions(mut self, n: u32) -> Self {
        self.config.max_retransmissions = n;
        self
    }

    /// Minimum silence after inbound traffic before a command is written
    /// (default: 100ms).
    pub fn quiet_period(mut self, period: Duration) -> Self {
        self.config.quiet_period = period;
        self
    }

    /// Inter-byte gap that ends an inbound burst (default: 150ms).
    pub fn byte_timeout(mut self, timeout: Duration) -> Self {
        self.config.byte_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Identical RF frames inside this window are dropped (default: 500ms).
    pub fn min_rf_repeat_delay(mut self, delay: Duration) -> Self {
        self.config.min_rf_repeat_delay = delay;
        self
    }

    /// Capacity of the event broadcast channel (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.config.monitored_houses.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one house code must be monitored".into(),
            ));
        }
        if self.config.command_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "command timeout must be non-zero".into(),
            ));
        }
        if self.config.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Build an [`X10Controller`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `x10lib-test-harness`). The controller starts
    /// closed; call [`open()`](x10lib_core::Controller::open) to connect.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<X10Controller> {
        self.validate()?;
        tracing::debug!(
            family = %self.config.family,
            houses = ?self.config.monitored_houses,
            "building controller"
        );
        Ok(X10Controller::new(Engine::new(self.config, transport)))
    }

    /// Build an [`X10Controller`] on a serial port.
    ///
    /// Requires [`serial_port`](Self::serial_port). The port is not opened
    /// until the controller's `open()`.
    pub async fn build(self) -> Result<X10Controller> {
        let port = self.serial_port.clone().ok_or_else(|| {
            Error::InvalidParameter("serial_port is required for X10Builder::build()".into())
        })?;
        let transport = SerialTransport::new(&port, self.serial.clone());
        self.build_with_transport(Box::new(transport)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x10lib_core::{CommState, Controller};
    use x10lib_test_harness::MockTransport;

    #[tokio::test]
    async fn builder_defaults() {
        let builder = X10Builder::new(DeviceFamily::Cm11);
        assert_eq!(builder.config.family, DeviceFamily::Cm11);
        assert_eq!(builder.config.monitored_houses, vec![HouseCode::A]);
        assert_eq!(builder.config.command_timeout, Duration::from_secs(5));
        assert_eq!(builder.config.max_retransmissions, 3);
        assert_eq!(builder.serial.baud_rate, 4800);
        assert!(builder.serial_port.is_none());
    }

    #[tokio::test]
    async fn builder_fluent_setters() {
        let builder = X10Builder::new(DeviceFamily::Cm15)
            .serial_port("/dev/ttyUSB0")
            .baud_rate(9600)
            .house_codes(&[HouseCode::C, HouseCode::D])
            .command_timeout(Duration::from_millis(750))
            .max_retransmissions(1)
            .quiet_period(Duration::from_millis(20))
            .byte_timeout(Duration::from_millis(30))
            .poll_interval(Duration::from_millis(40))
            .min_rf_repeat_delay(Duration::from_millis(900));

        assert_eq!(builder.serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(builder.serial.baud_rate, 9600);
        assert_eq!(builder.config.monitored_houses, vec![HouseCode::C, HouseCode::D]);
        assert_eq!(builder.config.command_timeout, Duration::from_millis(750));
        assert_eq!(builder.config.max_retransmissions, 1);
        assert_eq!(builder.config.quiet_period, Duration::from_millis(20));
        assert_eq!(builder.config.byte_timeout, Duration::from_millis(30));
        assert_eq!(builder.config.poll_interval, Duration::from_millis(40));
        assert_eq!(builder.config.min_rf_repeat_delay, Duration::from_millis(900));
    }

    #[tokio::test]
    async fn build_with_mock_transport() {
        let ctrl = X10Builder::new(DeviceFamily::Cm11)
            .house_codes(&[HouseCode::B])
            .build_with_transport(Box::new(MockTransport::new()))
            .await
            .unwrap();

        assert_eq!(ctrl.family(), DeviceFamily::Cm11);
        assert_eq!(ctrl.comm_state(), CommState::Disconnected);
        assert_eq!(ctrl.monitored_houses(), &[HouseCode::B]);
        let modules = ctrl.modules().await;
        assert_eq!(modules.len(), 16);
        assert!(modules.iter().all(|m| m.address.house == HouseCode::B));
    }

    #[tokio::test]
    async fn build_without_port_fails() {
        let result = X10Builder::new(DeviceFamily::Cm11).build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn build_rejects_empty_house_list() {
        let result = X10Builder::new(DeviceFamily::Cm11)
            .house_codes(&[])
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn build_rejects_zero_timeout() {
        let result = X10Builder::new(DeviceFamily::Cm11)
            .command_timeout(Duration::ZERO)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn build_with_serial_port_does_not_open() {
        let ctrl = X10Builder::new(DeviceFamily::Cm11)
            .serial_port("/dev/x10lib-test-missing")
            .build()
            .await
            .unwrap();
        assert_eq!(ctrl.comm_state(), CommState::Disconnected);
        assert!(ctrl.open().await.is_err());
    }
}
