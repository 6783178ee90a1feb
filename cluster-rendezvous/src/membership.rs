use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use crate::{Error, Result};

/// Position of a peer in the sorted membership, `0..world_size`.
pub type Rank = usize;

/// Network identifier of a peer, as published by discovery.
///
/// Ordering is plain string ordering, not numeric IP ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<IpAddr> for Address {
    fn from(value: IpAddr) -> Self {
        Self(value.to_string())
    }
}

/// Converged cluster membership, sorted and free of duplicates.
///
/// Every peer that builds a `Membership` from the same set of addresses ends
/// up with the same sequence, so ranks and the coordinator agree without any
/// further communication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Membership {
    members: Vec<Address>,
}

impl Membership {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let unique: BTreeSet<Address> = addresses.into_iter().collect();
        Self {
            members: unique.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sorted addresses.
    pub fn addresses(&self) -> &[Address] {
        &self.members
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.members.binary_search(address).is_ok()
    }

    pub fn rank_of(&self, address: &Address) -> Result<Rank> {
        assign_rank(&self.members, address)
    }

    pub fn coordinator(&self) -> Option<&Address> {
        select_coordinator(&self.members)
    }
}

impl FromIterator<Address> for Membership {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Index of `self_address` in `sorted_members`.
///
/// Fails with [`Error::SelfNotFound`] when the address is absent. Retrying
/// does not help: membership has already converged.
pub fn assign_rank(sorted_members: &[Address], self_address: &Address) -> Result<Rank> {
    sorted_members
        .iter()
        .position(|member| member == self_address)
        .ok_or_else(|| Error::SelfNotFound {
            address: self_address.clone(),
            members: sorted_members.to_vec(),
        })
}

/// Lowest-ordered member, used as the rendezvous endpoint.
pub fn select_coordinator(sorted_members: &[Address]) -> Option<&Address> {
    sorted_members.first()
}
