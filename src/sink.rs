//! The contract between a resolver and the client consuming its addresses.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Load-balancing policy advertised with every resolved state by default.
pub const ROUND_ROBIN: &str = "round_robin";

/// A resolved, dispatchable endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    /// `ip:port`, or the bare IP when the target has no fixed port.
    pub address: String,

    /// The service host the address was resolved from, for transport-level
    /// identity checks such as TLS server name verification.
    pub server_name: String,
}

/// The full resolution result pushed to a [`StateSink`].
///
/// Each state replaces the previous one in its entirety.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    /// Endpoints in lookup order. Empty means no endpoints are available.
    pub addresses: Vec<EndpointAddress>,

    /// The load-balancing policy the client should apply.
    pub load_balancing_policy: String,
}

/// Receives resolved states from a resolver.
///
/// Implementations must apply each call atomically and tolerate concurrent
/// calls; the resolver does no locking of its own around the sink.
pub trait StateSink: Send + Sync + 'static {
    /// Replaces the client's address set with `state`.
    fn replace_state(&self, state: State) -> impl Future<Output = ()> + Send;
}

impl<S: StateSink> StateSink for Arc<S> {
    fn replace_state(&self, state: State) -> impl Future<Output = ()> + Send {
        (**self).replace_state(state)
    }
}

impl StateSink for watch::Sender<State> {
    async fn replace_state(&self, state: State) {
        self.send_replace(state);
    }
}
