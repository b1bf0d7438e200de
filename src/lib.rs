#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Kubernetes headless-service name resolution for [Tonic](https://docs.rs/tonic) gRPC load balancing.
//!
//! A headless Kubernetes service publishes one DNS record per ready pod, but HTTP/2
//! clients connect once and keep multiplexing over that connection. This crate resolves
//! a headless-service host into the full endpoint set, keeps it fresh in the background,
//! and hands every result to the client's connection layer as a complete replacement.
//!
//! # Features
//!
//! - **Ready before first call**: the first lookup completes before a resolver is returned
//! - **Periodic and forced refresh**: a background task re-resolves every minute by default,
//!   or immediately on request
//! - **Failure tolerant**: lookup failures after startup are logged and the last state kept
//! - **Pluggable lookups and sinks**: the OS resolver or the Kubernetes API on one side,
//!   a Tonic balance channel, a `watch` channel or your own sink on the other
//! - **Explicit registration**: route `khs://` targets through a [`Registry`]
//!
//! # Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use tonic::transport::{Channel, Endpoint};
//! use tonic_khs::{BalanceChannelSink, Registry, ResolverBuilder, SystemLookup};
//!
//! // Create your own balance channel
//! let (channel, tx) = Channel::balance_channel::<String>(1024);
//! let sink = BalanceChannelSink::new(tx, |addr| {
//!     Endpoint::from_shared(format!("http://{}", addr.address))
//!         .unwrap()
//!         .connect_timeout(Duration::from_secs(5))
//! });
//!
//! // Register the resolver at startup and build one for the target
//! let mut registry = Registry::new();
//! registry.register(ResolverBuilder::new(SystemLookup));
//! let resolver = registry
//!     .build("khs:///my-grpc-service.default.svc.cluster.local:50051", sink)
//!     .await?;
//!
//! // Use with your generated gRPC client
//! // let client = MyServiceClient::new(channel);
//! ```

mod balance;
mod error;
#[cfg(feature = "kubernetes")]
mod k8s;
mod lookup;
mod registry;
mod resolver;
mod sink;
mod target;

pub use balance::BalanceChannelSink;
pub use error::{BoxError, Error, Result};
#[cfg(feature = "kubernetes")]
pub use k8s::EndpointSliceLookup;
pub use lookup::{Lookup, SystemLookup};
pub use registry::Registry;
pub use resolver::{
    DEFAULT_LOOKUP_TIMEOUT, DEFAULT_REFRESH_INTERVAL, Resolver, ResolverBuilder, ResolverConfig,
    SCHEME,
};
pub use sink::{EndpointAddress, ROUND_ROBIN, State, StateSink};
pub use target::Target;
