use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

use crate::{Address, AddressResolver, Error, Membership, Result};

/// Default quorum timeout (seconds).
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default delay between discovery polls (milliseconds).
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Progress of one quorum wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumState {
    Polling,
    Converged,
    TimedOut,
}

impl QuorumState {
    /// State after a poll that observed `observed` unique addresses.
    ///
    /// Only an exact match converges. A set larger than expected keeps
    /// polling until the deadline.
    pub fn evaluate(observed: usize, expected: usize, elapsed: Duration, timeout: Duration) -> Self {
        if observed == expected {
            Self::Converged
        } else if elapsed >= timeout {
            Self::TimedOut
        } else {
            Self::Polling
        }
    }
}

/// Polls a resolver until the expected number of peers is visible.
///
/// Fixed interval, no backoff: this runs once per job start. The timeout is a
/// hard deadline from the start of the wait; the interval is shortened to
/// meet it.
pub struct QuorumWaiter<R> {
    resolver: R,
    timeout: Duration,
    poll_interval: Duration,
}

impl<R: AddressResolver> QuorumWaiter<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `name` resolves to exactly `expected_size` unique addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryTimeout`] with the last observed set once the
    /// timeout has elapsed, or [`Error::Config`] if `expected_size` is zero.
    pub async fn wait_for_quorum(&self, name: &str, expected_size: usize) -> Result<Membership> {
        if expected_size == 0 {
            return Err(Error::Config("expected cluster size must be positive".into()));
        }

        tracing::info!(
            name,
            expected = expected_size,
            timeout_secs = self.timeout.as_secs(),
            "Waiting for discovery quorum"
        );

        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let observed: HashSet<Address> = self.resolver.resolve(name).await;
            let elapsed = started.elapsed();

            match QuorumState::evaluate(observed.len(), expected_size, elapsed, self.timeout) {
                QuorumState::Converged => {
                    let membership = Membership::new(observed);
                    tracing::info!(
                        attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        members = ?membership.addresses(),
                        "Discovery converged"
                    );
                    return Ok(membership);
                }
                QuorumState::TimedOut => {
                    let members = Membership::new(observed).addresses().to_vec();
                    tracing::error!(
                        attempts,
                        observed = members.len(),
                        expected = expected_size,
                        "Discovery timed out"
                    );
                    return Err(Error::DiscoveryTimeout {
                        expected: expected_size,
                        observed: members.len(),
                        members,
                        elapsed,
                    });
                }
                QuorumState::Polling => {
                    tracing::debug!(
                        attempt = attempts,
                        observed = observed.len(),
                        expected = expected_size,
                        "Quorum not reached"
                    );
                    // Last poll lands on the deadline
                    let remaining = self.timeout.saturating_sub(elapsed);
                    tokio::time::sleep(self.poll_interval.min(remaining)).await;
                }
            }
        }
    }
}
