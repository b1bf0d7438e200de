//! A [`StateSink`] that feeds a Tonic balance channel.
//!
//! Tonic's balance channel consumes incremental `Change` events rather than
//! full states, so this sink remembers which addresses it has announced and
//! turns every full state into the inserts and removals needed to match it.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tonic::transport::{Channel, Endpoint};
//! use tonic_khs::{BalanceChannelSink, ResolverBuilder, SystemLookup};
//!
//! let (channel, tx) = Channel::balance_channel::<String>(1024);
//!
//! let sink = BalanceChannelSink::new(tx, |addr| {
//!     Endpoint::from_shared(format!("http://{}", addr.address))
//!         .unwrap()
//!         .connect_timeout(Duration::from_secs(5))
//! });
//!
//! let resolver = ResolverBuilder::new(SystemLookup)
//!     .build("greeter.default.svc.cluster.local:50051", sink)
//!     .await?;
//!
//! let client = MyServiceClient::new(channel);
//! ```

use std::collections::HashSet;

use tokio::sync::Mutex;
use tokio::sync::mpsc::Sender;
use tonic::transport::Endpoint;
use tonic::transport::channel::Change;

use crate::sink::{EndpointAddress, State, StateSink};

/// Forwards resolved states to the sender half of
/// `Channel::balance_channel::<String>()`.
///
/// The balance channel is keyed by [`EndpointAddress::address`]. Endpoints
/// are created with the `build` function, which also receives the
/// [`EndpointAddress::server_name`] hint for TLS configuration.
pub struct BalanceChannelSink<F> {
    tx: Sender<Change<String, Endpoint>>,
    build: F,
    known: Mutex<HashSet<String>>,
}

impl<F> BalanceChannelSink<F>
where
    F: Fn(&EndpointAddress) -> Endpoint + Send + Sync + 'static,
{
    /// Creates a sink sending changes to `tx`, building endpoints with `build`.
    #[must_use]
    pub fn new(tx: Sender<Change<String, Endpoint>>, build: F) -> Self {
        Self {
            tx,
            build,
            known: Mutex::new(HashSet::new()),
        }
    }
}

impl<F> StateSink for BalanceChannelSink<F>
where
    F: Fn(&EndpointAddress) -> Endpoint + Send + Sync + 'static,
{
    async fn replace_state(&self, state: State) {
        // Held across sends so concurrent states are applied one at a time.
        let mut known = self.known.lock().await;

        for action in diff_state(&mut known, &state.addresses) {
            let change = match action {
                EndpointAction::Insert(addr) => {
                    Change::Insert(addr.address.clone(), (self.build)(&addr))
                }
                EndpointAction::Remove(key) => Change::Remove(key),
            };

            if self.tx.send(change).await.is_err() {
                tracing::warn!("balance channel closed, dropping endpoint update");
                return;
            }
        }

        tracing::debug!(
            "balance channel now has {} endpoints (policy {})",
            known.len(),
            state.load_balancing_policy
        );
    }
}

/// Represents an endpoint change action.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EndpointAction {
    Insert(EndpointAddress),
    Remove(String),
}

/// Computes the actions that turn the `known` addresses into `addresses`,
/// updating `known` to match.
///
/// Inserts come first, in state order, so the channel never goes empty while
/// endpoints are being swapped.
fn diff_state(known: &mut HashSet<String>, addresses: &[EndpointAddress]) -> Vec<EndpointAction> {
    let current: HashSet<&str> = addresses.iter().map(|a| a.address.as_str()).collect();

    let stale: Vec<String> = known
        .iter()
        .filter(|key| !current.contains(key.as_str()))
        .cloned()
        .collect();

    let mut actions = Vec::new();

    for addr in addresses {
        if known.insert(addr.address.clone()) {
            tracing::debug!("adding endpoint: {}", addr.address);
            actions.push(EndpointAction::Insert(addr.clone()));
        }
    }

    for key in stale {
        known.remove(&key);
        tracing::debug!("removing endpoint: {key}");
        actions.push(EndpointAction::Remove(key));
    }

    actions
}
