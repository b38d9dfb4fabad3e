//! # LogWriter: bridge from the bus `log` channel to `tracing`.
//!
//! Components never talk to a logger directly; they publish [`LogRecord`]s
//! on the bus and the process installs one [`LogWriter`] per bus. Swap in a
//! different `log` subscriber to redirect output without touching any
//! publisher.

use async_trait::async_trait;

use crate::error::TaskError;
use crate::events::{Bus, Event, Handler, LogLevel, Payload};

/// Forwards `log`-channel events to the `tracing` facade.
///
/// Non-log payloads on the channel are ignored.
#[derive(Default)]
pub struct LogWriter;

#[async_trait]
impl Handler for LogWriter {
    async fn on_event(&self, _bus: &Bus, event: &Event) -> Result<(), TaskError> {
        if let Payload::Log(record) = &event.payload {
            match record.level {
                LogLevel::Debug => tracing::debug!(seq = event.seq, "{}", record.message),
                LogLevel::Info => tracing::info!(seq = event.seq, "{}", record.message),
                LogLevel::Warn => tracing::warn!(seq = event.seq, "{}", record.message),
                LogLevel::Error => tracing::error!(seq = event.seq, "{}", record.message),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{channel, HandlerRef, LogRecord};
    use std::sync::Arc;

    #[tokio::test]
    async fn tolerates_non_log_payloads() {
        let bus = Bus::new();
        let writer: HandlerRef = Arc::new(LogWriter);
        bus.subscribe(channel::LOG, &writer, 10);

        let results = bus.publish(channel::LOG, Payload::Text("raw".into())).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let results = bus
            .publish(
                channel::LOG,
                Payload::Log(LogRecord {
                    level: LogLevel::Info,
                    message: "hello".into(),
                }),
            )
            .await;
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
