//! Background reader: pulls bursts off the transport and feeds them to the
//! engine's transition table.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::Engine;

/// Handle to a running reader task.
pub(crate) struct ReaderHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    /// Request a stop and wait for the task to finish. A burst already being
    /// read or processed completes first.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "reader task ended abnormally");
        }
    }

    /// Stop without waiting, for use from `Drop`.
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

pub(crate) fn spawn_reader(engine: Arc<Engine>) -> ReaderHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(reader_loop(engine, cancel.clone()));
    ReaderHandle { cancel, task }
}

async fn reader_loop(engine: Arc<Engine>, cancel: CancellationToken) {
    let poll_interval = engine.config().poll_interval;
    debug!(?poll_interval, "reader started");

    while !cancel.is_cancelled() {
        let burst = engine.read_burst().await;
        if !burst.is_empty() {
            engine.on_burst(&burst).await;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!("reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use x10lib_core::{CommState, DeviceFamily};
    use x10lib_test_harness::MockTransport;

    use crate::engine::EngineConfig;

    fn config() -> EngineConfig {
        EngineConfig {
            family: DeviceFamily::Cm11,
            command_timeout: Duration::from_millis(200),
            quiet_period: Duration::ZERO,
            byte_timeout: Duration::from_millis(5),
            poll_interval: Duration::from_millis(5),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn reader_completes_open_handshake() {
        let mock = MockTransport::cm11_simulator();
        let engine = Arc::new(Engine::new(config(), Box::new(mock.clone())));
        engine.open().await.unwrap();

        let mut state = engine.subscribe();
        let reader = spawn_reader(Arc::clone(&engine));
        let ready = tokio::time::timeout(Duration::from_secs(2), async {
            while engine.comm_state() != CommState::Ready {
                let _ = state.recv().await;
            }
        })
        .await;
        reader.shutdown().await;

        assert!(ready.is_ok());
        assert_eq!(mock.count_sent(&[0xEB]), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_reading() {
        let mock = MockTransport::new();
        let engine = Arc::new(Engine::new(config(), Box::new(mock.clone())));
        engine.open().await.unwrap();

        let reader = spawn_reader(Arc::clone(&engine));
        tokio::time::timeout(Duration::from_secs(1), reader.shutdown())
            .await
            .unwrap();

        mock.push_inbound(&[0x5A]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mock.pending_inbound(), 1);
    }
}
