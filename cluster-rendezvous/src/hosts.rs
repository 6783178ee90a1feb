//! Hosts file: the converged membership, one address per line in rank order.
//!
//! Lets a later step recompute ranks without querying discovery again.

use std::path::Path;

use crate::{Address, Membership, Result};

pub async fn write_hosts(path: impl AsRef<Path>, membership: &Membership) -> Result<()> {
    let path = path.as_ref();
    let mut contents = String::new();
    for address in membership.addresses() {
        contents.push_str(address.as_str());
        contents.push('\n');
    }

    tokio::fs::write(path, contents).await?;
    tracing::info!(path = %path.display(), count = membership.len(), "Wrote hosts file");
    Ok(())
}

pub async fn read_hosts(path: impl AsRef<Path>) -> Result<Membership> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Address::from)
        .collect())
}
