//! Pod-side device names derived from VM network names.
//!
//! The primary network is always `eth0`. Secondary networks get a hashed
//! name (`pod` + 11 hex chars of SHA-256 over the network name); pods
//! created by older releases use ordinal names (`net1`, `net2`, ...) in
//! declaration order, so lookups fall back to those.

use ipnet::Ipv4Net;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{NetError, Result};
use crate::types::Network;

pub const PRIMARY_POD_INTERFACE_NAME: &str = "eth0";

const HASHED_PREFIX: &str = "pod";
const HASH_LEN: usize = 11;
const MAX_LINK_NAME_LEN: usize = 15;

/// Hashed pod interface name of a secondary network.
pub fn hashed_pod_interface_name(network_name: &str) -> String {
    let digest = hex::encode(Sha256::digest(network_name.as_bytes()));
    format!("{}{}", HASHED_PREFIX, &digest[..HASH_LEN])
}

/// Legacy ordinal pod interface name (1-based).
pub fn ordinal_pod_interface_name(ordinal: usize) -> String {
    format!("net{}", ordinal)
}

/// Network name -> hashed pod interface name for every network.
pub fn hashed_name_scheme(networks: &[Network]) -> HashMap<String, String> {
    networks
        .iter()
        .map(|n| {
            let pod_name = if n.is_primary() {
                PRIMARY_POD_INTERFACE_NAME.to_string()
            } else {
                hashed_pod_interface_name(&n.name)
            };
            (n.name.clone(), pod_name)
        })
        .collect()
}

/// Network name -> ordinal pod interface name for every network.
pub fn ordinal_name_scheme(networks: &[Network]) -> HashMap<String, String> {
    let mut ordinal = 0;
    networks
        .iter()
        .map(|n| {
            let pod_name = if n.is_primary() {
                PRIMARY_POD_INTERFACE_NAME.to_string()
            } else {
                ordinal += 1;
                ordinal_pod_interface_name(ordinal)
            };
            (n.name.clone(), pod_name)
        })
        .collect()
}

/// Candidate pod interface names for a network, most preferred first.
pub fn pod_interface_candidates(networks: &[Network], network_name: &str) -> Vec<String> {
    let mut candidates = Vec::with_capacity(2);
    for scheme in [hashed_name_scheme(networks), ordinal_name_scheme(networks)] {
        if let Some(name) = scheme.get(network_name) {
            if !candidates.contains(name) {
                candidates.push(name.clone());
            }
        }
    }
    candidates
}

/// In-pod bridge name for a pod interface.
pub fn bridge_name(pod_iface: &str) -> String {
    let mut name = format!("k6t-{}", pod_iface);
    name.truncate(MAX_LINK_NAME_LEN);
    name
}

/// Tap device name for a pod interface.
pub fn tap_name(pod_iface: &str) -> String {
    format!("tap{}", pod_iface.get(3..).unwrap_or(""))
}

/// Name the pod link is renamed to when a dummy takes over its addresses.
pub fn renamed_pod_link_name(pod_iface: &str) -> String {
    let mut name = format!("{}-nic", pod_iface);
    name.truncate(MAX_LINK_NAME_LEN);
    name
}

/// Link-local address assigned to the in-pod bridge of the interface at
/// `index`, advertised as the DHCP server address.
pub fn bridge_fake_ip(index: usize) -> Result<Ipv4Net> {
    format!("169.254.75.1{}/32", index)
        .parse()
        .map_err(|e| NetError::InvalidConfig(format!("no bridge address for interface #{}: {}", index, e)))
}
