use local_ip_address::list_afinet_netifas;
use std::net::IpAddr;

use crate::{Address, Error, Result};

/// How a peer determines the address it is published under.
pub trait LocalAddress: Send + Sync {
    fn local_address(&self) -> Result<Address>;
}

/// IPv4 address of a named network interface, e.g. `eth0`.
#[derive(Debug, Clone)]
pub struct NamedInterface {
    name: String,
}

impl NamedInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl LocalAddress for NamedInterface {
    fn local_address(&self) -> Result<Address> {
        let interfaces = list_afinet_netifas().map_err(|e| {
            tracing::warn!(interface = %self.name, "Failed to list interfaces: {}", e);
            Error::InterfaceNotFound(self.name.clone())
        })?;

        first_ipv4(&interfaces, &self.name)
            .map(Address::from)
            .ok_or_else(|| Error::InterfaceNotFound(self.name.clone()))
    }
}

/// Fixed address, for hosts where the interface address is not the one
/// published by discovery.
#[derive(Debug, Clone)]
pub struct StaticAddress(Address);

impl StaticAddress {
    pub fn new(address: impl Into<Address>) -> Self {
        Self(address.into())
    }
}

impl LocalAddress for StaticAddress {
    fn local_address(&self) -> Result<Address> {
        Ok(self.0.clone())
    }
}

fn first_ipv4(interfaces: &[(String, IpAddr)], name: &str) -> Option<IpAddr> {
    interfaces
        .iter()
        .filter(|(iface, _)| iface == name)
        .map(|(_, ip)| *ip)
        .find(IpAddr::is_ipv4)
}
