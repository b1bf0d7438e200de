//! Resolution of Kubernetes headless services into live endpoint sets.
//!
//! A resolver looks up its service host once while it is being built, so the
//! client has an address set (possibly empty) before it makes its first call.
//! After that a background task repeats the lookup on a fixed interval and
//! whenever [`Resolver::force_resolve`] is called, pushing each result to the
//! [`StateSink`] as a full replacement of the previous one.
//!
//! # How It Works
//!
//! 1. Parses the target into a host and an optional fixed port
//! 2. Looks up the host and pushes the first state, failing the build on error
//! 3. Spawns a task that resolves again on every tick or forced resolution
//! 4. Logs lookup failures after the first and keeps the previous state
//! 5. Stops when the resolver is closed or dropped
//!
//! # Example
//!
//! ```ignore
//! use tokio::sync::watch;
//! use tonic_khs::{ResolverBuilder, State, SystemLookup};
//!
//! let (tx, mut rx) = watch::channel(State::default());
//! let resolver = ResolverBuilder::new(SystemLookup)
//!     .build("my-grpc-service.default.svc.cluster.local:50051", tx)
//!     .await?;
//!
//! // The first state is already there.
//! println!("{:?}", rx.borrow_and_update().addresses);
//!
//! // Ask for a fresh lookup, e.g. after connection failures.
//! resolver.force_resolve();
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::lookup::{Lookup, SystemLookup};
use crate::sink::{EndpointAddress, ROUND_ROBIN, State, StateSink};
use crate::target::Target;

/// The scheme that routes targets to this resolver.
pub const SCHEME: &str = "khs";

/// How often the background task resolves the target by default.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// How long a single lookup may take by default.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for resolvers created by a [`ResolverBuilder`].
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    refresh_interval: Duration,
    lookup_timeout: Option<Duration>,
    load_balancing_policy: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            lookup_timeout: Some(DEFAULT_LOOKUP_TIMEOUT),
            load_balancing_policy: ROUND_ROBIN.to_string(),
        }
    }
}

impl ResolverConfig {
    /// Creates a configuration with the defaults: refresh every minute,
    /// time out lookups after ten seconds, and advertise `round_robin`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval between periodic resolutions.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "refresh interval must be non-zero");
        self.refresh_interval = interval;
        self
    }

    /// Sets the maximum duration of a single lookup, or `None` to wait
    /// indefinitely. A lookup that runs out of time fails like any other.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Sets the load-balancing policy advertised with every state.
    #[must_use]
    pub fn with_load_balancing_policy(mut self, policy: impl Into<String>) -> Self {
        self.load_balancing_policy = policy.into();
        self
    }

    /// Returns the interval between periodic resolutions.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Returns the maximum duration of a single lookup.
    #[must_use]
    pub fn lookup_timeout(&self) -> Option<Duration> {
        self.lookup_timeout
    }

    /// Returns the advertised load-balancing policy.
    #[must_use]
    pub fn load_balancing_policy(&self) -> &str {
        &self.load_balancing_policy
    }
}

/// Builds [`Resolver`]s that share a lookup backend and configuration.
pub struct ResolverBuilder<L> {
    lookup: Arc<L>,
    config: ResolverConfig,
    scheme: String,
}

impl<L> Clone for ResolverBuilder<L> {
    fn clone(&self) -> Self {
        Self {
            lookup: Arc::clone(&self.lookup),
            config: self.config.clone(),
            scheme: self.scheme.clone(),
        }
    }
}

impl Default for ResolverBuilder<SystemLookup> {
    fn default() -> Self {
        Self::new(SystemLookup)
    }
}

impl<L: Lookup> ResolverBuilder<L> {
    /// Creates a builder for the [`SCHEME`] scheme using `lookup` to resolve
    /// service hosts.
    #[must_use]
    pub fn new(lookup: L) -> Self {
        Self {
            lookup: Arc::new(lookup),
            config: ResolverConfig::default(),
            scheme: SCHEME.to_string(),
        }
    }

    /// Replaces the resolver configuration.
    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the builder under a different scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// The scheme this builder handles.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The configuration given to every resolver.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Parses `target`, resolves it once and starts refreshing it in the
    /// background.
    ///
    /// The first state has been pushed to `sink` by the time this returns.
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTarget`] or [`Error::MalformedPort`] if the
    /// target cannot be parsed, and [`Error::Lookup`] or
    /// [`Error::LookupTimeout`] if the first lookup fails. No background task
    /// is started in either case.
    pub async fn build<S: StateSink>(&self, target: &str, sink: S) -> Result<Resolver> {
        let target = Target::parse(target)?;
        let cancel = CancellationToken::new();
        let force = Arc::new(ForceSignal::default());

        let refresher = Refresher {
            target: target.clone(),
            lookup: Arc::clone(&self.lookup),
            sink,
            config: self.config.clone(),
            cancel: cancel.clone(),
            force: Arc::clone(&force),
        };

        refresher.resolve().await?;

        let task = tokio::spawn(refresher.run());

        tracing::debug!(
            "started resolver for {target}, refreshing every {:?}",
            self.config.refresh_interval
        );

        Ok(Resolver {
            target,
            cancel,
            force,
            task,
        })
    }
}

/// Wakes the refresh task for a forced resolution.
///
/// Requests made before the task picks them up are merged into one.
#[derive(Debug, Default)]
struct ForceSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl ForceSignal {
    fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }

    async fn requested(&self) {
        self.notify.notified().await;
        self.requested.store(false, Ordering::SeqCst);
    }
}

/// What started a resolution on the refresh task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    Tick,
    Forced,
}

/// A live resolver, refreshing its target until closed.
///
/// Dropping the resolver closes it.
#[derive(Debug)]
#[must_use = "dropping the resolver stops refreshing"]
pub struct Resolver {
    target: Target,
    cancel: CancellationToken,
    force: Arc<ForceSignal>,
    task: JoinHandle<()>,
}

impl Resolver {
    /// The target being resolved.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Asks the background task to resolve now, without waiting for the next
    /// tick or moving it.
    ///
    /// The forced resolution runs alongside any periodic one still in flight;
    /// whichever finishes last determines the state. Requests made before the
    /// task picks them up are merged into one. Failures are logged, not
    /// returned.
    pub fn force_resolve(&self) {
        if self.cancel.is_cancelled() {
            tracing::debug!("ignoring forced resolution of closed resolver for {}", self.target);
            return;
        }

        self.force.request();
    }

    /// Stops the background task. No state is pushed to the sink afterwards.
    ///
    /// Calling this more than once has no further effect.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("closing resolver for {}", self.target);
            self.cancel.cancel();
        }
    }

    /// Closes the resolver and waits for its background task to exit.
    pub async fn shutdown(mut self) {
        self.close();

        if let Err(e) = (&mut self.task).await {
            tracing::warn!("resolver task for {} failed: {e}", self.target);
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `true` while the background task is refreshing the target.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything one resolution needs, owned by the background task.
struct Refresher<L, S> {
    target: Target,
    lookup: Arc<L>,
    sink: S,
    config: ResolverConfig,
    cancel: CancellationToken,
    force: Arc<ForceSignal>,
}

impl<L: Lookup, S: StateSink> Refresher<L, S> {
    /// Looks up the target and pushes the result to the sink.
    ///
    /// Closing the resolver abandons a lookup in flight.
    async fn resolve(&self) -> Result<()> {
        let host = self.target.host();

        let ips = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                tracing::debug!("resolver for {} closed, abandoning lookup", self.target);
                return Ok(());
            }

            result = self.lookup_with_timeout(host) => result?,
        };

        let addresses = endpoint_addresses(&self.target, &ips);

        // No push once closed, even if the lookup won the race above.
        if self.cancel.is_cancelled() {
            tracing::debug!("resolver for {} closed, discarding lookup result", self.target);
            return Ok(());
        }

        tracing::debug!("resolved {} to {} endpoints", self.target, addresses.len());

        self.sink
            .replace_state(State {
                addresses,
                load_balancing_policy: self.config.load_balancing_policy.clone(),
            })
            .await;

        Ok(())
    }

    /// Looks up the target host, bounded by the configured timeout.
    async fn lookup_with_timeout(&self, host: &str) -> Result<Vec<IpAddr>> {
        let lookup = self.lookup.lookup(host);

        match self.config.lookup_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lookup).await.map_err(|_| {
                Error::LookupTimeout {
                    host: host.to_string(),
                    timeout,
                }
            })?,
            None => lookup.await,
        }
        .map_err(|source| Error::Lookup {
            host: host.to_string(),
            source,
        })
    }

    /// Runs one resolution on the refresh task, logging its failure.
    async fn resolve_logged(&self, trigger: Trigger) -> Trigger {
        if let Err(e) = self.resolve().await {
            match trigger {
                Trigger::Tick => tracing::warn!("periodic resolution failed: {e}"),
                Trigger::Forced => tracing::warn!("forced resolution failed: {e}"),
            }
        }

        trigger
    }

    /// Resolves on every tick and forced resolution until cancelled.
    ///
    /// Forced resolutions run concurrently with a periodic one in flight. A
    /// tick that fires while the previous periodic resolution is still
    /// running is skipped.
    async fn run(self) {
        let period = self.config.refresh_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: FuturesUnordered<BoxFuture<'_, Trigger>> = FuturesUnordered::new();
        let mut tick_in_flight = false;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::debug!("stopping resolver for {}", self.target);
                    return;
                }

                Some(trigger) = in_flight.next(), if !in_flight.is_empty() => {
                    if trigger == Trigger::Tick {
                        tick_in_flight = false;
                    }
                }

                _ = ticker.tick() => {
                    if tick_in_flight {
                        tracing::debug!(
                            "periodic resolution of {} still running, skipping tick",
                            self.target
                        );
                    } else {
                        tick_in_flight = true;
                        in_flight.push(Box::pin(self.resolve_logged(Trigger::Tick)));
                    }
                }

                () = self.force.requested() => {
                    in_flight.push(Box::pin(self.resolve_logged(Trigger::Forced)));
                }
            }
        }
    }
}

/// Turns looked-up IPs into endpoint addresses, affixing the target's port if
/// it has one.
fn endpoint_addresses(target: &Target, ips: &[IpAddr]) -> Vec<EndpointAddress> {
    ips.iter()
        .map(|ip| EndpointAddress {
            address: match target.port() {
                Some(port) => SocketAddr::new(*ip, port).to_string(),
                None => ip.to_string(),
            },
            server_name: target.host().to_string(),
        })
        .collect()
}
