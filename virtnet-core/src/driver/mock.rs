//! In-memory collaborators for testing and development.

use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::{DhcpServer, IpFamily, Link, NamespaceExecutor, NamespaceFactory, NetworkHandler, Route};
use crate::cache::DhcpConfig;
use crate::error::{NetError, Result};

fn poisoned() -> NetError {
    NetError::Internal("Lock poisoned".to_string())
}

/// Mock network handler.
///
/// Keeps links, addresses and routes in memory and records every
/// mutating call. Individual operations can be made to fail with
/// [`MockNetworkHandler::fail_on`].
pub struct MockNetworkHandler {
    links: RwLock<HashMap<String, Link>>,
    addresses: RwLock<HashMap<String, Vec<IpNet>>>,
    routes: RwLock<HashMap<String, Vec<Route>>>,
    ipv4_primary: AtomicBool,
    failures: RwLock<HashSet<String>>,
    calls: RwLock<Vec<String>>,
    next_index: AtomicU32,
}

impl MockNetworkHandler {
    pub fn new() -> Self {
        info!("Creating mock network handler");
        Self {
            links: RwLock::new(HashMap::new()),
            addresses: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            ipv4_primary: AtomicBool::new(true),
            failures: RwLock::new(HashSet::new()),
            calls: RwLock::new(Vec::new()),
            next_index: AtomicU32::new(1),
        }
    }

    /// Add a link that is up with the given MAC and MTU.
    pub fn add_link(&self, name: &str, mac: &str, mtu: u32) -> Result<()> {
        let link = Link {
            name: name.to_string(),
            index: self.next_index.fetch_add(1, Ordering::SeqCst),
            mac: mac.to_string(),
            mtu,
            up: true,
        };
        self.links.write().map_err(|_| poisoned())?.insert(name.to_string(), link);
        Ok(())
    }

    pub fn set_addresses(&self, link: &str, addrs: Vec<IpNet>) -> Result<()> {
        self.addresses.write().map_err(|_| poisoned())?.insert(link.to_string(), addrs);
        Ok(())
    }

    pub fn set_routes(&self, link: &str, routes: Vec<Route>) -> Result<()> {
        self.routes.write().map_err(|_| poisoned())?.insert(link.to_string(), routes);
        Ok(())
    }

    pub fn set_ipv4_primary(&self, primary: bool) {
        self.ipv4_primary.store(primary, Ordering::SeqCst);
    }

    /// Make every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: &str) -> Result<()> {
        self.failures.write().map_err(|_| poisoned())?.insert(operation.to_string());
        Ok(())
    }

    /// Mutating calls made so far, as `"<operation> <args>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.links.read().map(|l| l.contains_key(name)).unwrap_or(false)
    }

    fn record(&self, operation: &str, args: &str) -> Result<()> {
        debug!(operation, args, "Mock network call");
        self.calls
            .write()
            .map_err(|_| poisoned())?
            .push(format!("{} {}", operation, args).trim_end().to_string());

        if self.failures.read().map_err(|_| poisoned())?.contains(operation) {
            return Err(NetError::Handler(format!("{} {} failed", operation, args)));
        }
        Ok(())
    }

    fn update_link(&self, name: &str, f: impl FnOnce(&mut Link)) -> Result<()> {
        let mut links = self.links.write().map_err(|_| poisoned())?;
        let link = links
            .get_mut(name)
            .ok_or_else(|| NetError::LinkNotFound(name.to_string()))?;
        f(link);
        Ok(())
    }
}

impl Default for MockNetworkHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn family_of(net: &IpNet) -> IpFamily {
    match net {
        IpNet::V4(_) => IpFamily::V4,
        IpNet::V6(_) => IpFamily::V6,
    }
}

impl NetworkHandler for MockNetworkHandler {
    fn link_by_name(&self, name: &str) -> Result<Link> {
        self.links
            .read()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned()
            .ok_or_else(|| NetError::LinkNotFound(name.to_string()))
    }

    fn addresses(&self, link: &str, family: IpFamily) -> Result<Vec<IpNet>> {
        let addresses = self.addresses.read().map_err(|_| poisoned())?;
        Ok(addresses
            .get(link)
            .map(|a| a.iter().filter(|n| family_of(n) == family).cloned().collect())
            .unwrap_or_default())
    }

    fn routes(&self, link: &str, family: IpFamily) -> Result<Vec<Route>> {
        let routes = self.routes.read().map_err(|_| poisoned())?;
        Ok(routes
            .get(link)
            .map(|r| {
                r.iter()
                    .filter(|route| match (route.destination, route.gateway) {
                        (Some(dst), _) => family_of(&dst) == family,
                        (None, Some(gw)) => gw.is_ipv4() == (family == IpFamily::V4),
                        (None, None) => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn is_ipv4_primary(&self) -> Result<bool> {
        Ok(self.ipv4_primary.load(Ordering::SeqCst))
    }

    fn link_set_up(&self, name: &str) -> Result<()> {
        self.record("link_set_up", name)?;
        self.update_link(name, |l| l.up = true)
    }

    fn link_set_down(&self, name: &str) -> Result<()> {
        self.record("link_set_down", name)?;
        self.update_link(name, |l| l.up = false)
    }

    fn addr_add(&self, link: &str, addr: IpNet) -> Result<()> {
        self.record("addr_add", &format!("{} {}", link, addr))?;
        self.addresses
            .write()
            .map_err(|_| poisoned())?
            .entry(link.to_string())
            .or_default()
            .push(addr);
        Ok(())
    }

    fn addr_del(&self, link: &str, addr: IpNet) -> Result<()> {
        self.record("addr_del", &format!("{} {}", link, addr))?;
        if let Some(addrs) = self.addresses.write().map_err(|_| poisoned())?.get_mut(link) {
            addrs.retain(|a| *a != addr);
        }
        Ok(())
    }

    fn rename_link(&self, from: &str, to: &str) -> Result<()> {
        self.record("rename_link", &format!("{} {}", from, to))?;
        let mut links = self.links.write().map_err(|_| poisoned())?;
        let mut link = links
            .remove(from)
            .ok_or_else(|| NetError::LinkNotFound(from.to_string()))?;
        link.name = to.to_string();
        links.insert(to.to_string(), link);
        Ok(())
    }

    fn create_dummy(&self, name: &str) -> Result<()> {
        self.record("create_dummy", name)?;
        self.add_link(name, "", 1500)
    }

    fn set_random_mac(&self, name: &str) -> Result<String> {
        self.record("set_random_mac", name)?;
        let mac = format!("02:00:00:00:00:{:02x}", self.next_index.fetch_add(1, Ordering::SeqCst) % 256);
        let assigned = mac.clone();
        self.update_link(name, move |l| l.mac = assigned)?;
        Ok(mac)
    }

    fn create_bridge(&self, name: &str) -> Result<()> {
        self.record("create_bridge", name)?;
        self.add_link(name, "", 1500)
    }

    fn create_tap(&self, name: &str, mtu: u32, launcher_pid: &str) -> Result<()> {
        self.record("create_tap", &format!("{} {} {}", name, mtu, launcher_pid))?;
        self.add_link(name, "", mtu)
    }

    fn bind_to_bridge(&self, link: &str, bridge: &str) -> Result<()> {
        self.record("bind_to_bridge", &format!("{} {}", link, bridge))
    }

    fn disable_learning(&self, link: &str) -> Result<()> {
        self.record("disable_learning", link)
    }

    fn configure_arp_ignore(&self) -> Result<()> {
        self.record("configure_arp_ignore", "")
    }

    fn configure_masquerade_nat(&self, bridge: &str, vm_addr: IpNet, gateway: IpNet) -> Result<()> {
        self.record("configure_masquerade_nat", &format!("{} {} {}", bridge, vm_addr, gateway))
    }

    fn link_delete(&self, name: &str) -> Result<()> {
        self.record("link_delete", name)?;
        self.links.write().map_err(|_| poisoned())?.remove(name);
        self.addresses.write().map_err(|_| poisoned())?.remove(name);
        Ok(())
    }
}

/// Namespace executor that runs closures in the current namespace and
/// counts how often it was entered.
#[derive(Debug, Default)]
pub struct InProcessNamespace {
    entries: AtomicUsize,
}

impl InProcessNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }
}

impl NamespaceExecutor for InProcessNamespace {
    fn run<'a>(&self, f: Box<dyn FnOnce() -> Result<()> + 'a>) -> Result<()> {
        self.entries.fetch_add(1, Ordering::SeqCst);
        f()
    }
}

/// Hands out one shared [`InProcessNamespace`] for every PID.
#[derive(Debug, Default)]
pub struct InProcessNamespaceFactory {
    namespace: Arc<InProcessNamespace>,
}

impl InProcessNamespaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self) -> Arc<InProcessNamespace> {
        self.namespace.clone()
    }
}

impl NamespaceFactory for InProcessNamespaceFactory {
    fn for_pid(&self, _pid: Option<u32>) -> Arc<dyn NamespaceExecutor> {
        self.namespace.clone()
    }
}

/// Mock DHCP server.
///
/// `serve` runs until aborted unless serve failures are enabled.
#[derive(Debug, Default)]
pub struct MockDhcpServer {
    bound: RwLock<Vec<String>>,
    served: RwLock<Vec<String>>,
    fail_bind: AtomicBool,
    fail_serve: AtomicBool,
}

impl MockDhcpServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    pub fn fail_serve(&self, fail: bool) {
        self.fail_serve.store(fail, Ordering::SeqCst);
    }

    /// Interfaces a socket was bound for, in call order.
    pub fn bound(&self) -> Vec<String> {
        self.bound.read().map(|b| b.clone()).unwrap_or_default()
    }

    /// Interfaces a serve loop was entered for, in call order.
    pub fn served(&self) -> Vec<String> {
        self.served.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DhcpServer for MockDhcpServer {
    fn bind(&self, config: &DhcpConfig) -> Result<()> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(NetError::Handler(format!("cannot bind DHCP socket on {}", config.name)));
        }
        self.bound.write().map_err(|_| poisoned())?.push(config.name.clone());
        Ok(())
    }

    async fn serve(&self, config: DhcpConfig) -> Result<()> {
        self.served.write().map_err(|_| poisoned())?.push(config.name.clone());
        if self.fail_serve.load(Ordering::SeqCst) {
            return Err(NetError::Handler(format!("DHCP server on {} stopped", config.name)));
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}
