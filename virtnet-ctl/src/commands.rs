//! Subcommand implementations.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use virtnet_core::{
    CacheFactory, Domain, InterfaceStatus, NetStat, NetworkConfigState, NetworkStateCache, StateCache, Vmi,
};

/// State of each network, in the given order.
pub fn network_states(cache: &CacheFactory, uid: &str, networks: &[String]) -> Result<Vec<(String, NetworkConfigState)>> {
    // Only the cached records are inspected; no namespace is entered
    let state = NetworkStateCache::new(uid, cache.clone());
    networks
        .iter()
        .map(|network| {
            let current = state
                .read(network)
                .with_context(|| format!("Failed to read state of network {}", network))?;
            Ok((network.clone(), current))
        })
        .collect()
}

/// Put a network back to pending.
pub fn reset_network(cache: &CacheFactory, uid: &str, network: &str) -> Result<NetworkConfigState> {
    let state = NetworkStateCache::new(uid, cache.clone());
    let previous = state
        .read(network)
        .with_context(|| format!("Failed to read state of network {}", network))?;
    if previous == NetworkConfigState::Started {
        warn!(network = %network, "Resetting a partially configured network; its pod devices may need manual cleanup");
    }
    state
        .delete(network)
        .with_context(|| format!("Failed to reset network {}", network))?;
    info!(vmi_uid = %uid, network = %network, previous = %previous, "Network reset to pending");
    Ok(previous)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// One reconciliation pass from files on disk.
pub fn reconcile_status(cache: &CacheFactory, vmi_path: &Path, domain_path: Option<&Path>) -> Result<Vec<InterfaceStatus>> {
    let mut vmi: Vmi = read_json(vmi_path)?;
    let domain: Option<Domain> = domain_path.map(read_json::<Domain>).transpose()?;

    NetStat::new(cache.clone())
        .update_status(&mut vmi, domain.as_ref())
        .context("Failed to reconcile interface status")?;
    Ok(vmi.status.interfaces)
}

pub fn teardown(cache: &CacheFactory, uid: &str) -> Result<()> {
    cache
        .delete_vmi(uid)
        .with_context(|| format!("Failed to delete cache of VM {}", uid))?;
    info!(vmi_uid = %uid, "VM cache removed");
    Ok(())
}
