use serde::Serialize;
use std::time::Duration;

use crate::{
    assign_rank, select_coordinator, Address, AddressResolver, DiscoveryConfig, DnsResolver,
    Error, LocalAddress, Membership, NamedInterface, QuorumWaiter, Rank, Result, StaticAddress,
};

/// Outcome of discovery for this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub rank: Rank,
    pub coordinator: Address,
    pub world_size: usize,
    pub members: Membership,
}

impl Assignment {
    /// Rank and coordinator of `self_address` within a converged membership.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelfNotFound`] if `self_address` is not a member.
    pub fn from_membership(members: Membership, self_address: &Address) -> Result<Self> {
        let rank = assign_rank(members.addresses(), self_address)?;
        let coordinator = select_coordinator(members.addresses())
            .cloned()
            .ok_or_else(|| Error::Config("empty membership".into()))?;

        Ok(Self {
            rank,
            coordinator,
            world_size: members.len(),
            members,
        })
    }
}

/// Discovery, quorum and rank assignment for one process.
pub struct Rendezvous<R = DnsResolver> {
    waiter: QuorumWaiter<R>,
    local: Box<dyn LocalAddress>,
    discovery_name: String,
    expected_size: usize,
}

impl Rendezvous<DnsResolver> {
    /// DNS discovery, with the local address taken from the configured
    /// interface unless an explicit self address is set.
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        let local: Box<dyn LocalAddress> = match &config.self_address {
            Some(address) => Box::new(StaticAddress::new(address.clone())),
            None => Box::new(NamedInterface::new(config.interface.clone())),
        };
        Self::with_resolver(config, DnsResolver::new(), local)
    }
}

impl<R: AddressResolver> Rendezvous<R> {
    pub fn with_resolver(config: &DiscoveryConfig, resolver: R, local: Box<dyn LocalAddress>) -> Self {
        Self {
            waiter: QuorumWaiter::new(resolver)
                .with_timeout(config.timeout)
                .with_poll_interval(config.poll_interval),
            local,
            discovery_name: config.discovery_name(),
            expected_size: config.expected_size,
        }
    }

    pub fn discovery_name(&self) -> &str {
        &self.discovery_name
    }

    pub fn expected_size(&self) -> usize {
        self.expected_size
    }

    pub fn resolver(&self) -> &R {
        self.waiter.resolver()
    }

    /// Find every peer, then this process's rank and the coordinator.
    ///
    /// Single-node jobs never touch discovery.
    ///
    /// # Errors
    ///
    /// [`Error::InterfaceNotFound`], [`Error::DiscoveryTimeout`] or
    /// [`Error::SelfNotFound`]; all fatal.
    pub async fn discover(&self) -> Result<Assignment> {
        let self_address = self.local.local_address()?;

        let members = if self.expected_size == 1 {
            tracing::info!(address = %self_address, "Single-node job, skipping discovery");
            Membership::new([self_address.clone()])
        } else {
            self.waiter
                .wait_for_quorum(&self.discovery_name, self.expected_size)
                .await?
        };

        let assignment = Assignment::from_membership(members, &self_address)?;
        tracing::info!(
            rank = assignment.rank,
            world_size = assignment.world_size,
            coordinator = %assignment.coordinator,
            address = %self_address,
            "Rank assigned"
        );
        Ok(assignment)
    }

    pub fn timeout(&self) -> Duration {
        self.waiter.timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver {
        members: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedResolver {
        fn new(members: Vec<&'static str>) -> Self {
            Self {
                members,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AddressResolver for FixedResolver {
        async fn lookup(&self, _name: &str) -> Result<HashSet<Address>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.members.iter().map(|a| Address::from(*a)).collect())
        }
    }

    struct NoInterface;

    impl LocalAddress for NoInterface {
        fn local_address(&self) -> Result<Address> {
            Err(Error::InterfaceNotFound("eth0".into()))
        }
    }

    fn config(expected_size: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            expected_size,
            timeout: Duration::from_secs(5),
            ..DiscoveryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_assignment() {
        let resolver = FixedResolver::new(vec!["10.0.0.5", "10.0.0.2", "10.0.0.9"]);
        let rendezvous = Rendezvous::with_resolver(
            &config(3),
            resolver,
            Box::new(StaticAddress::new("10.0.0.5")),
        );

        let assignment = rendezvous.discover().await.unwrap();

        assert_eq!(assignment.rank, 1);
        assert_eq!(assignment.coordinator, Address::from("10.0.0.2"));
        assert_eq!(assignment.world_size, 3);
        assert_eq!(
            rendezvous.discovery_name(),
            "instances.test.dadm.svc.spcs.internal"
        );
    }

    #[tokio::test]
    async fn test_single_node_skips_discovery() {
        let resolver = FixedResolver::new(vec!["10.9.9.9", "10.9.9.8"]);
        let rendezvous = Rendezvous::with_resolver(
            &config(1),
            resolver,
            Box::new(StaticAddress::new("10.0.0.7")),
        );

        let assignment = rendezvous.discover().await.unwrap();

        assert_eq!(assignment.rank, 0);
        assert_eq!(assignment.coordinator, Address::from("10.0.0.7"));
        assert_eq!(assignment.world_size, 1);
        assert_eq!(rendezvous.resolver().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_self_not_in_converged_set() {
        let resolver = FixedResolver::new(vec!["10.0.0.2", "10.0.0.3"]);
        let rendezvous = Rendezvous::with_resolver(
            &config(2),
            resolver,
            Box::new(StaticAddress::new("10.0.0.1")),
        );

        match rendezvous.discover().await {
            Err(Error::SelfNotFound { address, members }) => {
                assert_eq!(address, Address::from("10.0.0.1"));
                assert_eq!(
                    members,
                    vec![Address::from("10.0.0.2"), Address::from("10.0.0.3")]
                );
            }
            other => panic!("Expected SelfNotFound, got {:?}", other),
        }
        // Converged on the first poll; no retry afterwards
        assert_eq!(rendezvous.resolver().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_interface_fails_before_discovery() {
        let resolver = FixedResolver::new(vec!["10.0.0.2", "10.0.0.3"]);
        let rendezvous = Rendezvous::with_resolver(&config(2), resolver, Box::new(NoInterface));

        assert!(matches!(
            rendezvous.discover().await,
            Err(Error::InterfaceNotFound(_))
        ));
        assert_eq!(rendezvous.resolver().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_config_uses_configured_timeout() {
        let rendezvous = Rendezvous::from_config(&config(4));
        assert_eq!(rendezvous.timeout(), Duration::from_secs(5));
        assert_eq!(rendezvous.expected_size(), 4);
    }
}
