//! Boundary collaborators: OS networking, namespace switching, DHCP.
//!
//! The network core never touches netlink, namespaces or sockets directly.
//! Host daemons plug real implementations in; [`mock`] provides in-memory
//! ones for tests and development.

pub mod mock;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

use crate::cache::DhcpConfig;
use crate::error::Result;

/// Address family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

/// A network link as seen inside the pod namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub index: u32,
    pub mac: String,
    pub mtu: u32,
    pub up: bool,
}

/// A routing table entry. A `None` destination is the default route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: Option<IpNet>,
    pub gateway: Option<IpAddr>,
}

impl Route {
    pub fn is_default(&self) -> bool {
        match self.destination {
            None => true,
            Some(net) => net.prefix_len() == 0,
        }
    }
}

/// OS-level networking operations inside the pod namespace.
pub trait NetworkHandler: Send + Sync {
    /// Look up a link. Fails with `LinkNotFound` if it does not exist.
    fn link_by_name(&self, name: &str) -> Result<Link>;

    fn addresses(&self, link: &str, family: IpFamily) -> Result<Vec<IpNet>>;

    fn routes(&self, link: &str, family: IpFamily) -> Result<Vec<Route>>;

    /// Whether the pod's primary IP is IPv4 (as opposed to IPv6).
    fn is_ipv4_primary(&self) -> Result<bool>;

    fn link_set_up(&self, name: &str) -> Result<()>;

    fn link_set_down(&self, name: &str) -> Result<()>;

    fn addr_add(&self, link: &str, addr: IpNet) -> Result<()>;

    fn addr_del(&self, link: &str, addr: IpNet) -> Result<()>;

    fn rename_link(&self, from: &str, to: &str) -> Result<()>;

    fn create_dummy(&self, name: &str) -> Result<()>;

    /// Assign a random MAC to the link and return it.
    fn set_random_mac(&self, name: &str) -> Result<String>;

    fn create_bridge(&self, name: &str) -> Result<()>;

    /// Create a tap device owned by the launcher process.
    fn create_tap(&self, name: &str, mtu: u32, launcher_pid: &str) -> Result<()>;

    fn bind_to_bridge(&self, link: &str, bridge: &str) -> Result<()>;

    fn disable_learning(&self, link: &str) -> Result<()>;

    fn configure_arp_ignore(&self) -> Result<()>;

    /// Install NAT rules forwarding pod traffic to the VM address.
    fn configure_masquerade_nat(&self, bridge: &str, vm_addr: IpNet, gateway: IpNet) -> Result<()>;

    fn link_delete(&self, name: &str) -> Result<()>;
}

/// Runs a closure with the target pod's network namespace entered,
/// restoring the caller's namespace afterwards regardless of outcome.
pub trait NamespaceExecutor: Send + Sync {
    fn run<'a>(&self, f: Box<dyn FnOnce() -> Result<()> + 'a>) -> Result<()>;
}

/// Builds namespace executors for launcher processes.
pub trait NamespaceFactory: Send + Sync {
    /// `None` targets the current process' namespace.
    fn for_pid(&self, pid: Option<u32>) -> Arc<dyn NamespaceExecutor>;
}

/// A single-interface DHCP server.
#[async_trait]
pub trait DhcpServer: Send + Sync {
    /// Bind the listening socket for the configured interface.
    fn bind(&self, config: &DhcpConfig) -> Result<()>;

    /// Serve leases until the task is aborted or fails.
    async fn serve(&self, config: DhcpConfig) -> Result<()>;
}
