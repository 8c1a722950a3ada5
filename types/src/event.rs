//! Event unions crossing the channel.
//!
//! Events are explicit tagged unions rather than stringly-named host
//! events: [`ServiceEvent`] is the declared progress event set a
//! long-running method may raise, [`CommonEvent`] is the ambient
//! log/telemetry channel that bypasses request/response correlation
//! entirely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Diagnostic;

/// A progress event raised by a service method while it is in flight.
///
/// Forwarded immediately by the dispatcher — never batched — and
/// delivered to the proxy's global listeners plus the per-call sink of
/// the request currently in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "kebab-case")]
pub enum ServiceEvent {
    /// A user-visible message produced during execution.
    Message(String),
    /// A dump of the simulated quantum state.
    StateDump(Value),
    /// One shot finished with the given result value.
    #[serde(rename = "result")]
    ShotResult(Value),
    /// The full diagnostic set for a document, pushed after an update
    /// recompiles it. Ambient: raised outside any request lifecycle
    /// and delivered to global listeners only.
    DiagnosticsUpdate {
        uri: String,
        version: u32,
        diagnostics: Vec<Diagnostic>,
    },
}

impl ServiceEvent {
    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::StateDump(_) => "state-dump",
            Self::ShotResult(_) => "result",
            Self::DiagnosticsUpdate { .. } => "diagnostics-update",
        }
    }
}

/// An ambient event outside any request lifecycle.
///
/// These use a separate envelope tag so they are never mistaken for
/// per-request progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "kebab-case")]
pub enum CommonEvent {
    TelemetryEvent(TelemetryEvent),
    Log(LogRecord),
}

/// A telemetry data point emitted by the worker side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    #[serde(default)]
    pub properties: Value,
}

/// A log record emitted by the worker side.
///
/// `level` follows the init handshake's integer scale: 0 is silent,
/// 1 error, 2 warn, 3 info, 4 debug, 5 trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: u8,
    pub target: String,
    pub message: String,
}
