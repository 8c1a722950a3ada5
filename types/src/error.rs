//! Error taxonomy and the transport codec registry.
//!
//! Service failures cross the channel as plain data. Known structured
//! shapes (compiler diagnostics, runtime traps) are encoded and decoded
//! through a registered table of codecs so new kinds can be added
//! without touching dispatch logic; anything unrecognized degrades to a
//! display string instead of being silently corrupted in transit.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single diagnostic reported by the compiler service.
///
/// `start`/`end` are byte offsets into the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub start: u32,
    pub end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Structured failure reported by a service method.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// The program failed to compile.
    #[error("compilation failed with {} diagnostic(s)", diagnostics.len())]
    Compile { diagnostics: Vec<Diagnostic> },
    /// The simulated program trapped at runtime.
    #[error("runtime trap: {message}")]
    RuntimeTrap {
        message: String,
        call_stack: Vec<String>,
    },
    /// Any failure without a richer structure.
    #[error("{0}")]
    Message(String),
}

/// Rejection reason surfaced to a façade caller.
#[derive(Debug, PartialEq, Error)]
pub enum CallError {
    /// The request's token fired while it was still queued; it was
    /// never sent over the channel.
    #[error("cancelled")]
    Cancelled,
    /// The proxy was shut down with the request outstanding or queued,
    /// or the request was submitted after shutdown.
    #[error("terminated")]
    Terminated,
    /// The service method rejected; the error was decoded from the
    /// failure outcome.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The response payload violated the method's contract.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// One entry in the codec table: a tag plus encode/decode hooks for a
/// family of [`ServiceError`] shapes.
///
/// `encode` returns `Some(payload)` when this codec handles the error;
/// `decode` turns a payload back into the error, returning `None` for
/// payloads it does not recognize.
#[derive(Clone)]
pub struct ErrorCodec {
    tag: &'static str,
    encode: fn(&ServiceError) -> Option<Value>,
    decode: fn(&Value) -> Option<ServiceError>,
}

impl ErrorCodec {
    #[must_use]
    pub fn new(
        tag: &'static str,
        encode: fn(&ServiceError) -> Option<Value>,
        decode: fn(&Value) -> Option<ServiceError>,
    ) -> Self {
        Self {
            tag,
            encode,
            decode,
        }
    }
}

/// Registered table of error codecs, consulted in registration order.
///
/// The dispatcher encodes with this table before posting a failure
/// outcome; the proxy decodes with an identically-configured table.
#[derive(Clone)]
pub struct ErrorCodecs {
    codecs: Vec<ErrorCodec>,
}

/// Fallback tag for errors no codec claims.
const MESSAGE_TAG: &str = "message";

impl ErrorCodecs {
    /// An empty table. Everything falls back to display strings.
    #[must_use]
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// The standard table: compiler diagnostics and runtime traps.
    #[must_use]
    pub fn standard() -> Self {
        let mut codecs = Self::empty();
        codecs.register(ErrorCodec::new(
            "compile-error",
            |error| match error {
                ServiceError::Compile { diagnostics } => serde_json::to_value(diagnostics).ok(),
                _ => None,
            },
            |payload| {
                let diagnostics = serde_json::from_value(payload.clone()).ok()?;
                Some(ServiceError::Compile { diagnostics })
            },
        ));
        codecs.register(ErrorCodec::new(
            "runtime-trap",
            |error| match error {
                ServiceError::RuntimeTrap {
                    message,
                    call_stack,
                } => Some(json!({ "message": message, "call_stack": call_stack })),
                _ => None,
            },
            |payload| {
                Some(ServiceError::RuntimeTrap {
                    message: payload.get("message")?.as_str()?.to_string(),
                    call_stack: serde_json::from_value(payload.get("call_stack")?.clone()).ok()?,
                })
            },
        ));
        codecs
    }

    /// Add a codec. Later registrations are consulted after earlier ones.
    pub fn register(&mut self, codec: ErrorCodec) {
        self.codecs.push(codec);
    }

    /// Encode `error` as a transportable value: the first claiming
    /// codec wins, otherwise the display string is carried under the
    /// fallback tag.
    #[must_use]
    pub fn encode(&self, error: &ServiceError) -> Value {
        for codec in &self.codecs {
            if let Some(payload) = (codec.encode)(error) {
                return json!({ "tag": codec.tag, "payload": payload });
            }
        }
        json!({ "tag": MESSAGE_TAG, "payload": error.to_string() })
    }

    /// Decode a failure value produced by [`Self::encode`].
    ///
    /// Unknown tags and malformed payloads degrade to
    /// [`ServiceError::Message`] carrying whatever text is available.
    #[must_use]
    pub fn decode(&self, value: &Value) -> ServiceError {
        let tagged = value
            .get("tag")
            .and_then(Value::as_str)
            .zip(value.get("payload"));
        if let Some((tag, payload)) = tagged {
            for codec in &self.codecs {
                if codec.tag == tag
                    && let Some(error) = (codec.decode)(payload)
                {
                    return error;
                }
            }
            if tag == MESSAGE_TAG
                && let Some(text) = payload.as_str()
            {
                return ServiceError::Message(text.to_string());
            }
        }
        ServiceError::Message(value.to_string())
    }
}

impl Default for ErrorCodecs {
    fn default() -> Self {
        Self::standard()
    }
}
