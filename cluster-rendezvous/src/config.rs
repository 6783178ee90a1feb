use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::waiter::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_SECS};
use crate::{Address, Error, Result};

/// Port of the collective runtime's rendezvous listener.
pub const DEFAULT_COORDINATOR_PORT: u16 = 29501;

const DEFAULT_SERVICE_NAME: &str = "test";
const DEFAULT_NAMESPACE: &str = "dadm";
const DEFAULT_DOMAIN_SUFFIX: &str = "svc.spcs.internal";
const DEFAULT_INTERFACE: &str = "eth0";

/// Settings for one discovery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// Number of nodes in the job.
    pub expected_size: usize,
    /// Service identity, lowercased.
    pub service_name: String,
    pub namespace: String,
    pub domain_suffix: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Interface whose IPv4 address identifies this node.
    pub interface: String,
    /// Overrides the interface lookup.
    pub self_address: Option<Address>,
    pub coordinator_port: u16,
    /// Where to record the converged host list, if anywhere.
    pub hosts_file: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            expected_size: 1,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            domain_suffix: DEFAULT_DOMAIN_SUFFIX.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            interface: DEFAULT_INTERFACE.to_string(),
            self_address: None,
            coordinator_port: DEFAULT_COORDINATOR_PORT,
            hosts_file: None,
        }
    }
}

impl DiscoveryConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// All invalid variables are reported together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every variable that failed to parse
    /// or holds an unusable value.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mut errors = Vec::new();

        let expected_size = parse_var(
            "NUM_NODES",
            "a positive integer",
            defaults.expected_size,
            &mut errors,
        );
        let timeout_secs = parse_var(
            "DISCOVERY_TIMEOUT_SECS",
            "a whole number of seconds",
            DEFAULT_TIMEOUT_SECS,
            &mut errors,
        );
        let poll_interval_ms = parse_var(
            "DISCOVERY_POLL_INTERVAL_MS",
            "a positive number of milliseconds",
            DEFAULT_POLL_INTERVAL_MS,
            &mut errors,
        );
        let coordinator_port = parse_var(
            "MASTER_PORT",
            "a port number (0-65535)",
            defaults.coordinator_port,
            &mut errors,
        );

        let config = Self {
            expected_size,
            service_name: env::var("SNOWFLAKE_SERVICE_NAME")
                .unwrap_or(defaults.service_name)
                .to_lowercase(),
            namespace: env::var("DISCOVERY_NAMESPACE").unwrap_or(defaults.namespace),
            domain_suffix: env::var("DISCOVERY_DOMAIN_SUFFIX").unwrap_or(defaults.domain_suffix),
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
            interface: env::var("DISCOVERY_INTERFACE").unwrap_or(defaults.interface),
            self_address: env::var("DISCOVERY_SELF_ADDRESS").ok().map(Address::from),
            coordinator_port,
            hosts_file: env::var("HOSTS_FILE").ok().map(PathBuf::from),
        };

        errors.extend(config.problems());
        if !errors.is_empty() {
            return Err(invalid(&errors));
        }
        Ok(config)
    }

    /// Check values that parse but cannot be used, e.g. after command-line
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every problem.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(invalid(&problems))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.expected_size == 0 {
            problems.push("NUM_NODES must be at least 1".to_string());
        }
        if self.poll_interval.is_zero() {
            problems.push("DISCOVERY_POLL_INTERVAL_MS must be at least 1".to_string());
        }
        problems
    }

    /// DNS name listing every live instance of the service.
    pub fn discovery_name(&self) -> String {
        format!(
            "instances.{}.{}.{}",
            self.service_name, self.namespace, self.domain_suffix
        )
    }

    pub fn is_single_node(&self) -> bool {
        self.expected_size == 1
    }
}

fn parse_var<T: std::str::FromStr>(
    name: &str,
    expected: &str,
    default: T,
    errors: &mut Vec<String>,
) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                errors.push(format!("{} must be {}, got {:?}", name, expected, raw));
                default
            }
        },
        Err(_) => default,
    }
}

fn invalid(problems: &[String]) -> Error {
    Error::Config(format!(
        "Invalid configuration:\n  - {}",
        problems.join("\n  - ")
    ))
}
