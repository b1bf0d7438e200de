//! Error types for target parsing and name resolution.

use std::time::Duration;

/// Opaque error produced by a [`Lookup`](crate::Lookup) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while building or refreshing a resolver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target does not have the shape `host` or `host:port`.
    #[error("couldn't parse given target endpoint: {target}")]
    MalformedTarget {
        /// The target string as given.
        target: String,
    },

    /// The port segment of the target is not a valid port number.
    #[error("couldn't parse given port: {port}")]
    MalformedPort {
        /// The offending port segment.
        port: String,
    },

    /// The target URI carries no `scheme://` prefix.
    #[error("target has no scheme: {target}")]
    MissingScheme {
        /// The target URI as given.
        target: String,
    },

    /// No builder is registered for the target's scheme.
    #[error("no resolver registered for scheme `{scheme}`")]
    UnknownScheme {
        /// The unrecognized scheme.
        scheme: String,
    },

    /// The name lookup for the service host failed.
    #[error("failed to look up {host}: {source}")]
    Lookup {
        /// The host being looked up.
        host: String,
        /// The underlying lookup failure.
        #[source]
        source: BoxError,
    },

    /// The name lookup for the service host did not finish in time.
    #[error("lookup of {host} timed out after {timeout:?}")]
    LookupTimeout {
        /// The host being looked up.
        host: String,
        /// The configured lookup timeout.
        timeout: Duration,
    },
}

impl Error {
    /// Returns `true` if the error came from the name lookup rather than from
    /// the shape of the target.
    #[must_use]
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::Lookup { .. } | Self::LookupTimeout { .. })
    }
}
