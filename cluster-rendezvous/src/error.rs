use std::time::Duration;
use thiserror::Error;

use crate::Address;

#[derive(Error, Debug)]
pub enum Error {
    /// Lookup of the discovery record failed. Swallowed by the resolver.
    #[error("Failed to resolve {name}: {source}")]
    Resolution {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Discovered only {observed} of {expected} addresses after {elapsed:?}: {}",
        format_members(.members)
    )]
    DiscoveryTimeout {
        expected: usize,
        observed: usize,
        members: Vec<Address>,
        elapsed: Duration,
    },

    #[error("Address {address} not found in {}", format_members(.members))]
    SelfNotFound {
        address: Address,
        members: Vec<Address>,
    },

    #[error("No IPv4 address assigned to interface {0}")]
    InterfaceNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Launch error: {0}")]
    Launch(String),
}

impl Error {
    /// True for errors that end the discovery attempt.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Resolution { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_members(members: &[Address]) -> String {
    let joined: Vec<&str> = members.iter().map(Address::as_str).collect();
    format!("[{}]", joined.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_lists_last_observed_members() {
        let err = Error::DiscoveryTimeout {
            expected: 3,
            observed: 1,
            members: vec![Address::from("10.0.0.2")],
            elapsed: Duration::from_secs(2),
        };

        let msg = err.to_string();
        assert!(msg.contains("only 1 of 3"), "unexpected message: {}", msg);
        assert!(msg.contains("[10.0.0.2]"), "unexpected message: {}", msg);
    }

    #[test]
    fn test_self_not_found_message() {
        let err = Error::SelfNotFound {
            address: Address::from("10.0.0.1"),
            members: vec![Address::from("10.0.0.2"), Address::from("10.0.0.3")],
        };

        assert_eq!(
            err.to_string(),
            "Address 10.0.0.1 not found in [10.0.0.2, 10.0.0.3]"
        );
    }

    #[test]
    fn test_only_resolution_errors_are_transient() {
        let transient = Error::Resolution {
            name: "instances.test.dadm.svc.spcs.internal".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"),
        };
        assert!(!transient.is_fatal());
        assert!(Error::InterfaceNotFound("eth0".into()).is_fatal());
        assert!(Error::Config("NUM_NODES".into()).is_fatal());
    }
}
