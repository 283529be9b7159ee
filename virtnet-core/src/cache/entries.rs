//! Records stored in the persistent cache.

use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::driver::Route;
use crate::types::Interface;

/// Setup progress of one VM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkConfigState {
    /// Nothing applied yet (or unplugged)
    #[default]
    Pending,
    /// Discovery done, configuration may be partially applied
    Started,
    /// Discovery and configuration both completed
    Finished,
}

impl fmt::Display for NetworkConfigState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkConfigState::Pending => "pending",
            NetworkConfigState::Started => "started",
            NetworkConfigState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Per (VM, network) record written by pod interface discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodInterfaceCacheEntry {
    /// Snapshot of the declared interface
    pub iface: Option<Interface>,
    /// Primary pod IP
    pub pod_ip: Option<String>,
    /// All pod IPs, primary first
    pub pod_ips: Vec<String>,
    pub state: NetworkConfigState,
    /// Pod link the network was discovered on
    pub pod_interface_name: Option<String>,
}

/// DHCP lease parameters handed to the in-pod DHCP server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhcpConfig {
    /// Interface the server listens on
    pub name: String,
    /// MAC the lease is bound to
    pub mac: Option<String>,
    pub ip: Option<Ipv4Net>,
    pub ipv6: Option<Ipv6Net>,
    pub gateway: Option<Ipv4Addr>,
    pub gateway_ipv6: Option<Ipv6Addr>,
    /// Server address announced in offers
    pub advertising_ip: Option<Ipv4Addr>,
    pub advertising_ipv6: Option<Ipv6Addr>,
    pub routes: Vec<Route>,
    pub mtu: u32,
    /// No address to lease; the server is not started
    pub ipam_disabled: bool,
    pub subdomain: Option<String>,
}

/// Domain-facing interface facts discovered during setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainInterfaceEntry {
    pub mac: Option<String>,
    pub mtu: Option<u32>,
    /// Host-side device backing the guest NIC (tap or macvtap)
    pub target_device: Option<String>,
    /// Whether libvirt should create the target device itself
    pub managed: bool,
}
