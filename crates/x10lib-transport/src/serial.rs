//! Serial port transport for X10 interfaces.
//!
//! The CM11 talks 4800 baud 8N1 without flow control. The same settings
//! work for a CM15 driven through a virtual COM port.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use x10lib_core::error::{Error, Result};
use x10lib_core::transport::Transport;

/// Baud rate of the CM11 serial protocol.
pub const CM11_BAUD_RATE: u32 = 4800;

/// Serial port configuration.
///
/// Framing is always 8 data bits, 1 stop bit, no parity, no flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Leave DTR asserted after open. Off by default.
    pub assert_dtr: bool,
    /// Leave RTS asserted after open. Off by default.
    pub assert_rts: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: CM11_BAUD_RATE,
            assert_dtr: false,
            assert_rts: false,
        }
    }
}

/// Serial port transport.
///
/// Created closed; [`Transport::open`] opens the device and may be called
/// again after a failure or a [`Transport::close`].
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
    config: SerialConfig,
}

impl SerialTransport {
    /// Create a transport for `port` (e.g. `/dev/ttyUSB0`, `COM3`). Nothing
    /// is opened until [`Transport::open`].
    pub fn new(port: &str, config: SerialConfig) -> Self {
        Self {
            port: None,
            port_name: port.to_string(),
            config,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Unix device paths are checked up front so a missing adapter gives a
    /// clear error instead of an OS-specific one.
    fn check_exists(&self) -> Result<()> {
        if self.port_name.starts_with('/') && !Path::new(&self.port_name).exists() {
            tracing::error!(port = %self.port_name, "Serial port does not exist");
            return Err(Error::Transport(format!(
                "serial port {} does not exist",
                self.port_name
            )));
        }
        Ok(())
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        self.check_exists()?;

        tracing::debug!(
            port = %self.port_name,
            baud_rate = self.config.baud_rate,
            "Opening serial port"
        );

        let mut stream = tokio_serial::new(&self.port_name, self.config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %self.port_name, error = %e, "Failed to open serial port");
                Error::Transport(format!("failed to open serial port {}: {}", self.port_name, e))
            })?;

        if let Err(e) = stream.write_data_terminal_ready(self.config.assert_dtr) {
            tracing::warn!(port = %self.port_name, error = %e, "Failed to set DTR");
        }
        if let Err(e) = stream.write_request_to_send(self.config.assert_rts) {
            tracing::warn!(port = %self.port_name, error = %e, "Failed to set RTS");
        }

        tracing::info!(
            port = %self.port_name,
            baud_rate = self.config.baud_rate,
            "Serial port opened"
        );
        self.port = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(port = %self.port_name, data = ?data, "Sending data");

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            map_io_error(e)
        })?;
        port.flush().await.map_err(map_io_error)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(0)) => Err(Error::ConnectionLost),
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, data = ?&buf[..n], "Received data");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "Flush before close failed");
            }
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_cm11() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 4800);
        assert!(!config.assert_dtr);
        assert!(!config.assert_rts);
    }

    #[test]
    fn new_transport_is_closed() {
        let t = SerialTransport::new("/dev/ttyUSB0", SerialConfig::default());
        assert!(!t.is_connected());
        assert_eq!(t.port_name(), "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn open_missing_device_fails() {
        let mut t = SerialTransport::new("/dev/x10lib-no-such-port", SerialConfig::default());
        let err = t.open().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn send_before_open_is_not_connected() {
        let mut t = SerialTransport::new("/dev/ttyUSB0", SerialConfig::default());
        assert!(matches!(t.send(&[0x8B]).await, Err(Error::NotConnected)));
        let mut buf = [0u8; 4];
        assert!(matches!(
            t.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
    }
}
