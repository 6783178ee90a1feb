//! Peer discovery and rank assignment for fixed-size worker clusters.
//!
//! Every worker of a multi-node job runs the same discovery independently:
//! - Resolve the orchestrator's discovery record (`instances.<service>.<namespace>...`)
//! - Poll until exactly `NUM_NODES` unique addresses are visible
//! - Sort the converged set and take our own index as the rank
//! - Use the lowest address as the rendezvous for the collective runtime
//!
//! No messages are exchanged between peers. Agreement comes from every peer
//! sorting the same converged set the same way.
//!
//! # Example
//!
//! ```rust,ignore
//! use cluster_rendezvous::{DiscoveryConfig, LaunchPlan, Rendezvous};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DiscoveryConfig::from_env()?;
//!
//!     // Blocks until quorum or DISCOVERY_TIMEOUT_SECS
//!     let assignment = Rendezvous::from_config(&config).discover().await?;
//!
//!     let plan = LaunchPlan::new(&assignment, config.coordinator_port);
//!     println!("rank {} of {}, master {}", plan.rank, plan.world_size, plan.coordinator);
//!     Ok(())
//! }
//! ```
//!
//! # Single-node jobs
//!
//! With `NUM_NODES=1` the discovery record is never queried. The address of
//! the configured interface (default `eth0`) is the whole membership.
//!
//! # Ordering
//!
//! Addresses sort as plain strings, so `10.0.0.10` ranks before `10.0.0.9`.
//! Every peer uses the same ordering, which is all that rank agreement needs.

mod config;
mod error;
mod hosts;
mod interface;
mod launch;
mod membership;
mod rendezvous;
mod resolver;
mod waiter;

pub use config::DiscoveryConfig;
pub use error::{Error, Result};
pub use hosts::{read_hosts, write_hosts};
pub use interface::{LocalAddress, NamedInterface, StaticAddress};
pub use launch::{CommandLauncher, LaunchPlan, Role};
pub use membership::{assign_rank, select_coordinator, Address, Membership, Rank};
pub use rendezvous::{Assignment, Rendezvous};
pub use resolver::{AddressResolver, DnsResolver};
pub use waiter::{QuorumState, QuorumWaiter};
