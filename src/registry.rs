//! Scheme-based selection of resolver builders.
//!
//! Nothing is registered implicitly: the host program creates a [`Registry`],
//! registers the builders it wants at startup, and builds resolvers for full
//! target URIs such as `khs:///greeter.default.svc.cluster.local:50051`.

use std::collections::HashMap;
use std::fmt;

use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::lookup::Lookup;
use crate::resolver::{Resolver, ResolverBuilder};
use crate::sink::StateSink;

type BuildFn<S> = dyn Fn(String, S) -> BoxFuture<'static, Result<Resolver>> + Send + Sync;

/// Maps URI schemes to the builders that handle them.
///
/// All resolvers built through one registry feed the same kind of sink `S`.
pub struct Registry<S> {
    builders: HashMap<String, Box<BuildFn<S>>>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }
}

impl<S> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: StateSink> Registry<S> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder` under its scheme, replacing any builder already
    /// registered for that scheme.
    pub fn register<L: Lookup>(&mut self, builder: ResolverBuilder<L>) -> &mut Self {
        let scheme = builder.scheme().to_ascii_lowercase();

        let build = move |target: String, sink: S| -> BoxFuture<'static, Result<Resolver>> {
            let builder = builder.clone();
            Box::pin(async move { builder.build(&target, sink).await })
        };

        if self.builders.insert(scheme.clone(), Box::new(build)).is_some() {
            tracing::debug!("replaced resolver builder for scheme {scheme}");
        }

        self
    }

    /// Returns `true` if a builder is registered for `scheme`.
    #[must_use]
    pub fn contains(&self, scheme: &str) -> bool {
        self.builders.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Returns the registered schemes, in no particular order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Builds a resolver for a target URI of the form
    /// `scheme://[authority]/endpoint` or `scheme://endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingScheme`] if the URI has no scheme,
    /// [`Error::UnknownScheme`] if nothing is registered for it, and any error
    /// of [`ResolverBuilder::build`].
    pub async fn build(&self, uri: &str, sink: S) -> Result<Resolver> {
        let (scheme, endpoint) = split_uri(uri)?;

        let build = self
            .builders
            .get(&scheme.to_ascii_lowercase())
            .ok_or_else(|| Error::UnknownScheme {
                scheme: scheme.to_string(),
            })?;

        build(endpoint.to_string(), sink).await
    }
}

/// Splits a target URI into its scheme and endpoint, dropping any authority.
fn split_uri(uri: &str) -> Result<(&str, &str)> {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return Err(Error::MissingScheme {
            target: uri.to_string(),
        });
    };

    if scheme.is_empty() {
        return Err(Error::MissingScheme {
            target: uri.to_string(),
        });
    }

    let endpoint = rest.split_once('/').map_or(rest, |(_, endpoint)| endpoint);
    Ok((scheme, endpoint))
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use tokio::sync::watch;

    use super::*;
    use crate::error::BoxError;
    use crate::sink::State;

    struct StaticLookup(Vec<IpAddr>);

    impl Lookup for StaticLookup {
        async fn lookup(&self, _host: &str) -> std::result::Result<Vec<IpAddr>, BoxError> {
            Ok(self.0.clone())
        }
    }

    fn lookup() -> StaticLookup {
        StaticLookup(vec!["10.0.0.1".parse().unwrap()])
    }

    // split_uri tests

    #[test]
    fn split_uri_empty_authority() {
        assert_eq!(split_uri("khs:///svc:9090").unwrap(), ("khs", "svc:9090"));
    }

    #[test]
    fn split_uri_without_authority() {
        assert_eq!(split_uri("khs://svc:9090").unwrap(), ("khs", "svc:9090"));
    }

    #[test]
    fn split_uri_drops_authority() {
        assert_eq!(split_uri("khs://dns-server/svc").unwrap(), ("khs", "svc"));
    }

    #[test]
    fn split_uri_requires_scheme() {
        assert!(matches!(
            split_uri("svc:9090"),
            Err(Error::MissingScheme { target }) if target == "svc:9090"
        ));
        assert!(matches!(
            split_uri(":///svc"),
            Err(Error::MissingScheme { .. })
        ));
    }

    // Registry tests

    #[test]
    fn register_lists_schemes() {
        let mut registry = Registry::<watch::Sender<State>>::new();
        registry
            .register(ResolverBuilder::new(lookup()))
            .register(ResolverBuilder::new(lookup()).with_scheme("DNS"));

        let mut schemes: Vec<_> = registry.schemes().collect();
        schemes.sort_unstable();

        assert_eq!(schemes, vec!["dns", "khs"]);
        assert!(registry.contains("KHS"));
        assert!(!registry.contains("xds"));
    }

    #[test]
    fn register_replaces_existing_scheme() {
        let mut registry = Registry::<watch::Sender<State>>::new();
        registry.register(ResolverBuilder::new(lookup()));
        registry.register(ResolverBuilder::new(lookup()));

        assert_eq!(registry.schemes().count(), 1);
    }

    #[tokio::test]
    async fn build_dispatches_by_scheme() {
        let mut registry = Registry::new();
        registry.register(ResolverBuilder::new(lookup()));

        let (tx, rx) = watch::channel(State::default());
        let resolver = registry.build("khs:///svc:9090", tx).await.unwrap();

        assert_eq!(resolver.target().host(), "svc");
        assert_eq!(rx.borrow().addresses[0].address, "10.0.0.1:9090");

        resolver.shutdown().await;
    }

    #[tokio::test]
    async fn build_rejects_unknown_scheme() {
        let mut registry = Registry::new();
        registry.register(ResolverBuilder::new(lookup()));

        let (tx, _rx) = watch::channel(State::default());
        let err = registry.build("dns:///svc:9090", tx).await.unwrap_err();

        assert!(matches!(err, Error::UnknownScheme { scheme } if scheme == "dns"));
    }

    #[tokio::test]
    async fn build_propagates_target_errors() {
        let mut registry = Registry::new();
        registry.register(ResolverBuilder::new(lookup()));

        let (tx, _rx) = watch::channel(State::default());
        let err = registry.build("khs:///svc:http", tx).await.unwrap_err();

        assert!(matches!(err, Error::MalformedPort { port } if port == "http"));
    }
}
