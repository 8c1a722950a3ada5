//! Method descriptor — the shared contract between proxy and dispatcher.
//!
//! Both halves of a channel must be constructed against the same
//! descriptor for a given service. The map is a cross-process contract:
//! nothing at runtime cross-checks the two copies, so a mismatch
//! silently desyncs the protocol.

use std::collections::BTreeMap;

/// How a service method participates in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Plain async request: one envelope out, one response back.
    Request,
    /// Long-running request that emits progress events before its
    /// response. The dispatcher hands the service an event sink as a
    /// trailing argument; the proxy reports `Busy` while one is in
    /// flight.
    RequestWithProgress,
    /// Listener registration. Handled locally by the proxy; never
    /// crosses the channel as a request.
    AddEventListener,
    /// Listener removal. Local to the proxy, like [`Self::AddEventListener`].
    RemoveEventListener,
}

impl MethodKind {
    /// Whether invoking this method sends a request envelope.
    #[must_use]
    pub fn crosses_channel(self) -> bool {
        matches!(self, Self::Request | Self::RequestWithProgress)
    }
}

/// Immutable map from method name to [`MethodKind`].
///
/// Built once per service type and shared (by clone) between the proxy
/// and dispatcher constructors.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    methods: BTreeMap<&'static str, MethodKind>,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn new<I>(methods: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, MethodKind)>,
    {
        Self {
            methods: methods.into_iter().collect(),
        }
    }

    /// Look up the kind declared for `method`.
    #[must_use]
    pub fn kind(&self, method: &str) -> Option<MethodKind> {
        self.methods.get(method).copied()
    }

    /// Iterate the declared methods in name order.
    pub fn methods(&self) -> impl Iterator<Item = (&'static str, MethodKind)> + '_ {
        self.methods.iter().map(|(name, kind)| (*name, *kind))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
