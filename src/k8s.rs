//! Service lookup through the Kubernetes API.
//!
//! Instead of asking the cluster DNS, this [`Lookup`] lists the
//! `EndpointSlice` resources of a service and returns the addresses of its
//! ready endpoints. This is the same set a headless service publishes as DNS
//! records, without DNS caching in between.
//!
//! # Host Names
//!
//! The service host is read as `service[.namespace[.svc[.cluster.local]]]`.
//! Without a namespace, the client's default namespace is used.
//!
//! # Requirements
//!
//! - The application must have RBAC permissions to list `EndpointSlice` resources
//! - Kubernetes client configuration (in-cluster or kubeconfig)
//!
//! # Example
//!
//! ```ignore
//! use tonic_khs::{EndpointSliceLookup, ResolverBuilder};
//!
//! let lookup = EndpointSliceLookup::try_default().await?;
//! let resolver = ResolverBuilder::new(lookup)
//!     .build("my-grpc-service.my-namespace:50051", sink)
//!     .await?;
//! ```

use std::net::IpAddr;

use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::api::ListParams;
use kube::{Api, Client};

use crate::error::BoxError;
use crate::lookup::Lookup;

/// A [`Lookup`] that reads ready endpoints from `EndpointSlice` resources.
#[derive(Clone)]
pub struct EndpointSliceLookup {
    client: Client,
}

impl EndpointSliceLookup {
    /// Creates a lookup using the given Kubernetes client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a lookup from the default in-cluster or kubeconfig
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no Kubernetes client configuration can be loaded.
    pub async fn try_default() -> Result<Self, BoxError> {
        Ok(Self::new(Client::try_default().await?))
    }
}

impl Lookup for EndpointSliceLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, BoxError> {
        let (service, namespace) = service_and_namespace(host);
        let namespace = namespace.unwrap_or_else(|| self.client.default_namespace());

        let slices: Api<EndpointSlice> = Api::namespaced(self.client.clone(), namespace);
        let label_selector = format!("kubernetes.io/service-name={service}");
        let list = slices.list(&ListParams::default().labels(&label_selector)).await?;

        let mut ips = Vec::new();
        for slice in &list.items {
            for ip in extract_ready_ips(slice) {
                if !ips.contains(&ip) {
                    ips.push(ip);
                }
            }
        }

        tracing::debug!(
            "Kubernetes lookup: {} ready endpoints for {namespace}/{service}",
            ips.len()
        );

        Ok(ips)
    }
}

/// Splits a service host into the service name and, if present, its namespace.
fn service_and_namespace(host: &str) -> (&str, Option<&str>) {
    let mut labels = host.split('.');
    let service = labels.next().unwrap_or(host);
    let namespace = labels.next().filter(|ns| !ns.is_empty() && *ns != "svc");

    (service, namespace)
}

/// Extracts ready endpoint addresses from an `EndpointSlice`, in slice order.
fn extract_ready_ips(slice: &EndpointSlice) -> Vec<IpAddr> {
    let mut ips = Vec::new();

    for ep in &slice.endpoints {
        // Missing conditions or a missing ready flag both mean ready
        let ready = ep.conditions.as_ref().and_then(|c| c.ready).unwrap_or(true);

        if !ready {
            continue;
        }

        for addr in &ep.addresses {
            if let Ok(ip) = addr.parse::<IpAddr>() {
                ips.push(ip);
            }
        }
    }

    ips
}
