//! Parsing of resolver targets.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The service a resolver looks up: a host and an optional fixed port.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    /// Parses a target of the form `host` or `host:port`.
    ///
    /// A port of `0`, or no port at all, means the addresses returned by the
    /// lookup are passed on without a port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTarget`] if the target is empty, has an empty
    /// host, or contains more than one `:`, and [`Error::MalformedPort`] if the
    /// port is not a number in `0..=65535`.
    pub fn parse(target: &str) -> Result<Self> {
        let segments: Vec<&str> = target.split(':').collect();

        let (host, port) = match segments.as_slice() {
            [host] => (*host, 0),
            [host, port] => {
                let port = port.parse::<u16>().map_err(|_| Error::MalformedPort {
                    port: (*port).to_string(),
                })?;
                (*host, port)
            }
            _ => {
                return Err(Error::MalformedTarget {
                    target: target.to_string(),
                });
            }
        };

        if host.is_empty() {
            return Err(Error::MalformedTarget {
                target: target.to_string(),
            });
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// The service host to look up.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The fixed port, if one was given.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        (self.port != 0).then_some(self.port)
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port() {
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_only() {
        let target = Target::parse("my-service").unwrap();

        assert_eq!(target.host(), "my-service");
        assert_eq!(target.port(), None);
    }

    #[test]
    fn parse_host_and_port() {
        let target = Target::parse("svc:9090").unwrap();

        assert_eq!(target.host(), "svc");
        assert_eq!(target.port(), Some(9090));
    }

    #[test]
    fn parse_fully_qualified_host() {
        let target = Target::parse("greeter.default.svc.cluster.local:50051").unwrap();

        assert_eq!(target.host(), "greeter.default.svc.cluster.local");
        assert_eq!(target.port(), Some(50051));
    }

    #[test]
    fn parse_zero_port_means_no_port() {
        let target = Target::parse("svc:0").unwrap();

        assert_eq!(target.host(), "svc");
        assert_eq!(target.port(), None);
    }

    #[test]
    fn parse_too_many_segments() {
        for raw in ["a:1:2", "svc::", "::1", "2001:db8::1"] {
            match Target::parse(raw) {
                Err(Error::MalformedTarget { target }) => assert_eq!(target, raw),
                other => panic!("expected MalformedTarget for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_empty_host() {
        assert!(matches!(
            Target::parse(""),
            Err(Error::MalformedTarget { .. })
        ));
        assert!(matches!(
            Target::parse(":9090"),
            Err(Error::MalformedTarget { .. })
        ));
    }

    #[test]
    fn parse_non_numeric_port() {
        match Target::parse("svc:grpc") {
            Err(Error::MalformedPort { port }) => assert_eq!(port, "grpc"),
            other => panic!("expected MalformedPort, got {other:?}"),
        }
    }

    #[test]
    fn parse_negative_or_oversized_port() {
        for (raw, bad) in [("svc:-1", "-1"), ("svc:70000", "70000"), ("svc:", "")] {
            match Target::parse(raw) {
                Err(Error::MalformedPort { port }) => assert_eq!(port, bad),
                other => panic!("expected MalformedPort for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn from_str_matches_parse() {
        let target: Target = "svc:8080".parse().unwrap();
        assert_eq!(target, Target::parse("svc:8080").unwrap());
    }

    #[test]
    fn display_round_trips_shape() {
        assert_eq!(Target::parse("svc:8080").unwrap().to_string(), "svc:8080");
        assert_eq!(Target::parse("svc").unwrap().to_string(), "svc");
    }
}
