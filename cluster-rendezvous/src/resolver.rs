use async_trait::async_trait;
use std::collections::HashSet;

use crate::{Address, Error, Result};

/// Source of the current member addresses for a discovery name.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Look up `name`, reporting failures.
    async fn lookup(&self, name: &str) -> Result<HashSet<Address>>;

    /// Look up `name`, treating any failure as "no addresses yet".
    ///
    /// Members that have not started are indistinguishable from a record that
    /// does not exist yet, so errors only feed the next poll.
    async fn resolve(&self, name: &str) -> HashSet<Address> {
        match self.lookup(name).await {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::warn!(name, "{}", e);
                HashSet::new()
            }
        }
    }
}

/// Resolves discovery records through the system resolver.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    ipv4_only: bool,
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self { ipv4_only: true }
    }
}

impl DnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep IPv6 records as well.
    pub fn with_ipv6(mut self) -> Self {
        self.ipv4_only = false;
        self
    }
}

#[async_trait]
impl AddressResolver for DnsResolver {
    async fn lookup(&self, name: &str) -> Result<HashSet<Address>> {
        let resolved = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|source| Error::Resolution {
                name: name.to_string(),
                source,
            })?;

        let addresses: HashSet<Address> = resolved
            .map(|socket_addr| socket_addr.ip())
            .filter(|ip| !self.ipv4_only || ip.is_ipv4())
            .map(Address::from)
            .collect();

        tracing::trace!(name, count = addresses.len(), "Resolved discovery record");
        Ok(addresses)
    }
}
