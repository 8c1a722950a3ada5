//! Explicit logging/telemetry context for the worker side.
//!
//! Constructed once per worker and handed to the service and dispatcher
//! at construction time — no process-wide logger object. Records below
//! the configured level are dropped; everything that passes is both
//! emitted through `tracing` locally and forwarded on the common-event
//! bus so the controlling context can observe it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;

use crate::events::EventBus;
use qlink_types::{CommonEvent, LogRecord, TelemetryEvent};

/// Log verbosity ceiling: 0 silent, 1 error, 2 warn, 3 info, 4 debug,
/// 5 trace. Set by the channel's init handshake.
#[derive(Clone)]
pub struct LogContext {
    level: Arc<AtomicU8>,
    bus: Arc<EventBus<CommonEvent>>,
}

impl LogContext {
    #[must_use]
    pub fn new(bus: Arc<EventBus<CommonEvent>>) -> Self {
        Self {
            level: Arc::new(AtomicU8::new(0)),
            bus,
        }
    }

    /// The common-event bus this context publishes to.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus<CommonEvent>> {
        &self.bus
    }

    pub fn set_level(&self, level: u8) {
        self.level.store(level, Ordering::SeqCst);
    }

    #[must_use]
    pub fn level(&self) -> u8 {
        self.level.load(Ordering::SeqCst)
    }

    /// Emit a log record if `level` passes the configured ceiling.
    pub fn log(&self, level: u8, target: &str, message: impl Into<String>) {
        if level == 0 || level > self.level() {
            return;
        }
        let message = message.into();
        match level {
            1 => tracing::error!(source = target, "{message}"),
            2 => tracing::warn!(source = target, "{message}"),
            3 => tracing::info!(source = target, "{message}"),
            4 => tracing::debug!(source = target, "{message}"),
            _ => tracing::trace!(source = target, "{message}"),
        }
        self.bus.fire(&CommonEvent::Log(LogRecord {
            level,
            target: target.to_string(),
            message,
        }));
    }

    /// Emit a telemetry data point. Not gated by the log level.
    pub fn telemetry(&self, name: &str, properties: Value) {
        self.bus.fire(&CommonEvent::TelemetryEvent(TelemetryEvent {
            name: name.to_string(),
            properties,
        }));
    }
}
