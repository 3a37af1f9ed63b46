//! Streaming client core logic.
//!
//! Wires the configured capture source, the zstd encoder and a TCP
//! transport session into one [`StreamScheduler`] run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use framecast_core::{
    SessionReport, StopReason, StreamError, StreamScheduler, TcpChannel, TransportSession,
    ZstdEncoder,
};

use crate::config::ClientConfig;

// ── StreamClient ─────────────────────────────────────────────────

/// The top-level streaming client.
pub struct StreamClient {
    config: ClientConfig,
    stop: CancellationToken,
}

impl StreamClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stop: CancellationToken::new(),
        }
    }

    /// Obtain a handle that stops the client from another task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Stream until stopped, end of stream, or a fatal error.
    pub async fn run(&self) -> Result<SessionReport, StreamError> {
        let config = self.config.to_stream_config()?;
        let source = self.config.build_source()?;

        let channel = TcpChannel::new(config.transport.heartbeat_interval);
        let session = TransportSession::new(Arc::clone(&config), Box::new(channel))?;
        let scheduler =
            StreamScheduler::new(config, source, Box::new(ZstdEncoder::new()), session)?;

        let scheduler_stop = scheduler.stop_handle();
        let stop = self.stop.clone();
        let forward = tokio::spawn(async move {
            stop.cancelled().await;
            scheduler_stop.cancel();
        });

        let result = scheduler.run().await;
        forward.abort();
        if let Ok(report) = &result {
            info!("session finished: {} ({})", report.reason, report.stats);
        }
        result
    }
}

/// Process exit code for a finished run.
///
/// Clean stops and end of stream exit 0; giving up on the transport,
/// fatal capture errors and failed startup exit non-zero.
pub fn exit_code(result: &Result<SessionReport, StreamError>) -> i32 {
    match result {
        Ok(report) => match report.reason {
            StopReason::Requested | StopReason::EndOfStream => 0,
            StopReason::TransportClosed => 1,
        },
        Err(StreamError::Configuration(_)) => 2,
        Err(_) => 1,
    }
}

// ── Tests ────────────────────────────────────────────────────────
