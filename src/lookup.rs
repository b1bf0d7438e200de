//! Name lookup backends.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::BoxError;

/// Resolves a host name to the network addresses currently behind it.
///
/// An empty result is a valid answer: the host exists but has no endpoints.
pub trait Lookup: Send + Sync + 'static {
    /// Looks up all addresses for `host`, in the order the backend returns them.
    fn lookup(&self, host: &str) -> impl Future<Output = Result<Vec<IpAddr>, BoxError>> + Send;
}

impl<L: Lookup> Lookup for Arc<L> {
    fn lookup(&self, host: &str) -> impl Future<Output = Result<Vec<IpAddr>, BoxError>> + Send {
        (**self).lookup(host)
    }
}

/// A [`Lookup`] backed by the operating system resolver.
///
/// For a Kubernetes headless service, the cluster DNS answers with one record
/// per ready pod.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLookup;

impl Lookup for SystemLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, BoxError> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;

        let mut ips = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }

        Ok(ips)
    }
}
