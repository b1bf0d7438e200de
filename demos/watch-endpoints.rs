//! Resolver example that logs the endpoint set of a headless service.
//!
//! Registers the `khs` resolver, builds it for the configured target and
//! prints every state it pushes, forcing a fresh lookup whenever the service
//! has no endpoints.
//!
//! # Running in Kubernetes
//!
//! The target should name a headless service, so the cluster DNS returns one
//! record per ready pod.
//!
//! # Environment Variables
//!
//! - `KHS_TARGET`: target URI (default: `khs:///greeter-server.default.svc.cluster.local:50051`)
//! - `REFRESH_SECS`: seconds between periodic lookups (default: 60)
//! - `WATCH_SECS`: how long to watch before exiting (default: 300)

use std::env;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout_at};
use tonic_khs::{Registry, ResolverBuilder, ResolverConfig, State, SystemLookup};
use tracing::{Level, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    // Read configuration from environment
    let target = env::var("KHS_TARGET")
        .unwrap_or_else(|_| "khs:///greeter-server.default.svc.cluster.local:50051".to_string());
    let refresh_secs: u64 = env::var("REFRESH_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|s| *s > 0)
        .unwrap_or(60);
    let watch_secs: u64 = env::var("WATCH_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300);

    info!("Target: {target}");
    info!("Refresh interval: {refresh_secs}s");

    let config = ResolverConfig::new().with_refresh_interval(Duration::from_secs(refresh_secs));

    let mut registry = Registry::new();
    registry.register(ResolverBuilder::new(SystemLookup).with_config(config));

    let (tx, mut rx) = watch::channel(State::default());
    let resolver = registry.build(&target, tx).await?;

    let deadline = Instant::now() + Duration::from_secs(watch_secs);

    loop {
        let state = rx.borrow_and_update().clone();
        info!(
            "{} endpoints (policy {})",
            state.addresses.len(),
            state.load_balancing_policy
        );

        for addr in &state.addresses {
            info!("  {} ({})", addr.address, addr.server_name);
        }

        if state.addresses.is_empty() {
            warn!("no endpoints available, forcing a lookup in 5s");
            sleep(Duration::from_secs(5)).await;
            resolver.force_resolve();
        }

        match timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => break,
        }
    }

    resolver.shutdown().await;
    info!("Done");

    Ok(())
}
