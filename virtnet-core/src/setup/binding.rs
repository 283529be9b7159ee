//! Binding capability set.
//!
//! Every binding method answers the same four questions: how to find the
//! pod link, how to prepare the pod namespace around it, which DHCP
//! configuration the VM should be served and which domain interface
//! attributes libvirt should use. [`BindingConfigurator`] is the closed
//! set of implementations.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use tracing::debug;

use super::bridge::BridgeBinding;
use super::direct::{MacvtapBinding, PasstBinding};
use super::masquerade::MasqueradeBinding;
use crate::cache::{CacheFactory, DhcpConfig, DomainInterfaceEntry};
use crate::driver::{IpFamily, Link, NetworkHandler, Route};
use crate::error::{NetError, Result};
use crate::namescheme;
use crate::types::{BindingMethod, Interface, Network, Vmi};

/// Everything a binding needs to know about the interface it serves.
pub struct BindingContext<'a> {
    pub vmi: &'a Vmi,
    pub network: &'a Network,
    pub iface: &'a Interface,
    /// Position of the interface in the VM spec
    pub iface_index: usize,
    /// Pod link name
    pub pod_iface: String,
    /// Launcher PID scope of the DHCP and domain caches
    pub launcher_pid: String,
    pub handler: &'a dyn NetworkHandler,
    pub cache: &'a CacheFactory,
}

impl BindingContext<'_> {
    pub fn bridge_name(&self) -> String {
        namescheme::bridge_name(&self.pod_iface)
    }

    pub fn tap_name(&self) -> String {
        namescheme::tap_name(&self.pod_iface)
    }

    pub fn write_dhcp_config(&self, config: &DhcpConfig) -> Result<()> {
        self.cache.dhcp(&self.launcher_pid, &self.iface.name)?.write(config)
    }

    pub fn read_dhcp_config(&self) -> Result<DhcpConfig> {
        self.cache.dhcp(&self.launcher_pid, &self.iface.name)?.read()
    }

    pub fn write_domain_interface(&self, entry: &DomainInterfaceEntry) -> Result<()> {
        self.cache.domain_interface(&self.launcher_pid, &self.iface.name)?.write(entry)
    }

    pub fn read_domain_interface(&self) -> Result<DomainInterfaceEntry> {
        self.cache.domain_interface(&self.launcher_pid, &self.iface.name)?.read()
    }
}

/// What discovery learned about the pod link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodLinkInfo {
    pub link: Link,
    pub ipv4: Option<Ipv4Net>,
    pub ipv6: Option<Ipv6Net>,
    /// IPv4 routes of the pod link
    pub routes: Vec<Route>,
    /// Pod IPs without prefix, primary family first
    pub pod_ips: Vec<String>,
}

impl PodLinkInfo {
    pub fn pod_ip(&self) -> Option<&String> {
        self.pod_ips.first()
    }
}

fn is_link_local(addr: &IpNet) -> bool {
    match addr.addr() {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// Resolve the first existing link among `candidates`.
pub fn resolve_pod_link(handler: &dyn NetworkHandler, candidates: &[String]) -> Result<Link> {
    for name in candidates {
        match handler.link_by_name(name) {
            Ok(link) => return Ok(link),
            Err(NetError::LinkNotFound(_)) => {
                debug!(link = %name, "Pod link candidate not present");
            }
            Err(e) => return Err(e),
        }
    }
    Err(NetError::LinkNotFound(format!(
        "none of [{}] exists in the pod",
        candidates.join(", ")
    )))
}

/// Read addresses and routes of a pod link, ignoring link-local addresses.
pub fn discover_pod_link(handler: &dyn NetworkHandler, link: Link) -> Result<PodLinkInfo> {
    let ipv4 = handler
        .addresses(&link.name, IpFamily::V4)?
        .into_iter()
        .filter(|a| !is_link_local(a))
        .find_map(|a| match a {
            IpNet::V4(net) => Some(net),
            IpNet::V6(_) => None,
        });
    let ipv6 = handler
        .addresses(&link.name, IpFamily::V6)?
        .into_iter()
        .filter(|a| !is_link_local(a))
        .find_map(|a| match a {
            IpNet::V6(net) => Some(net),
            IpNet::V4(_) => None,
        });
    let routes = handler.routes(&link.name, IpFamily::V4)?;

    let v4 = ipv4.map(|n| n.addr().to_string());
    let v6 = ipv6.map(|n| n.addr().to_string());
    let pod_ips: Vec<String> = if handler.is_ipv4_primary()? {
        v4.into_iter().chain(v6).collect()
    } else {
        v6.into_iter().chain(v4).collect()
    };

    Ok(PodLinkInfo {
        link,
        ipv4,
        ipv6,
        routes,
        pod_ips,
    })
}

/// Capabilities every binding method provides.
pub trait PodNetworkConfigurator {
    /// Find the pod link and read its addressing.
    fn discover_pod_interface(&self, ctx: &BindingContext<'_>) -> Result<PodLinkInfo> {
        let link = ctx.handler.link_by_name(&ctx.pod_iface)?;
        discover_pod_link(ctx.handler, link)
    }

    /// Persist discovery results needed after the pod link is reworked.
    fn cache_discovery(&self, _ctx: &BindingContext<'_>, _info: &PodLinkInfo) -> Result<()> {
        Ok(())
    }

    /// Prepare the pod namespace (links, bridges, taps, NAT).
    fn prepare_pod_network(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()>;

    /// DHCP configuration to serve, if the binding uses DHCP.
    fn generate_dhcp_config(&self, _ctx: &BindingContext<'_>) -> Result<Option<DhcpConfig>> {
        Ok(None)
    }

    /// Domain-facing interface attributes, if the binding defines any.
    fn generate_domain_interface(&self, _ctx: &BindingContext<'_>) -> Result<Option<DomainInterfaceEntry>> {
        Ok(None)
    }
}

/// The closed set of binding implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingConfigurator {
    Bridge(BridgeBinding),
    Masquerade(MasqueradeBinding),
    Passt(PasstBinding),
    Macvtap(MacvtapBinding),
    /// Passthrough devices need no pod-side work
    Sriov,
}

impl BindingConfigurator {
    pub fn for_method(method: BindingMethod) -> Self {
        match method {
            BindingMethod::Bridge => BindingConfigurator::Bridge(BridgeBinding),
            BindingMethod::Masquerade => BindingConfigurator::Masquerade(MasqueradeBinding),
            BindingMethod::Passt => BindingConfigurator::Passt(PasstBinding),
            BindingMethod::Macvtap => BindingConfigurator::Macvtap(MacvtapBinding),
            BindingMethod::Sriov => BindingConfigurator::Sriov,
        }
    }

    pub fn is_sriov(&self) -> bool {
        matches!(self, BindingConfigurator::Sriov)
    }
}

impl PodNetworkConfigurator for BindingConfigurator {
    fn discover_pod_interface(&self, ctx: &BindingContext<'_>) -> Result<PodLinkInfo> {
        match self {
            BindingConfigurator::Bridge(b) => b.discover_pod_interface(ctx),
            BindingConfigurator::Masquerade(b) => b.discover_pod_interface(ctx),
            BindingConfigurator::Passt(b) => b.discover_pod_interface(ctx),
            BindingConfigurator::Macvtap(b) => b.discover_pod_interface(ctx),
            BindingConfigurator::Sriov => Err(NetError::InvalidState(format!(
                "SR-IOV interface {} has no pod link",
                ctx.iface.name
            ))),
        }
    }

    fn cache_discovery(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()> {
        match self {
            BindingConfigurator::Bridge(b) => b.cache_discovery(ctx, info),
            BindingConfigurator::Masquerade(b) => b.cache_discovery(ctx, info),
            BindingConfigurator::Passt(b) => b.cache_discovery(ctx, info),
            BindingConfigurator::Macvtap(b) => b.cache_discovery(ctx, info),
            BindingConfigurator::Sriov => Ok(()),
        }
    }

    fn prepare_pod_network(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()> {
        match self {
            BindingConfigurator::Bridge(b) => b.prepare_pod_network(ctx, info),
            BindingConfigurator::Masquerade(b) => b.prepare_pod_network(ctx, info),
            BindingConfigurator::Passt(b) => b.prepare_pod_network(ctx, info),
            BindingConfigurator::Macvtap(b) => b.prepare_pod_network(ctx, info),
            BindingConfigurator::Sriov => Ok(()),
        }
    }

    fn generate_dhcp_config(&self, ctx: &BindingContext<'_>) -> Result<Option<DhcpConfig>> {
        match self {
            BindingConfigurator::Bridge(b) => b.generate_dhcp_config(ctx),
            BindingConfigurator::Masquerade(b) => b.generate_dhcp_config(ctx),
            BindingConfigurator::Passt(b) => b.generate_dhcp_config(ctx),
            BindingConfigurator::Macvtap(b) => b.generate_dhcp_config(ctx),
            BindingConfigurator::Sriov => Ok(None),
        }
    }

    fn generate_domain_interface(&self, ctx: &BindingContext<'_>) -> Result<Option<DomainInterfaceEntry>> {
        match self {
            BindingConfigurator::Bridge(b) => b.generate_domain_interface(ctx),
            BindingConfigurator::Masquerade(b) => b.generate_domain_interface(ctx),
            BindingConfigurator::Passt(b) => b.generate_domain_interface(ctx),
            BindingConfigurator::Macvtap(b) => b.generate_domain_interface(ctx),
            BindingConfigurator::Sriov => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockNetworkHandler;

    fn handler_with_addresses() -> MockNetworkHandler {
        let handler = MockNetworkHandler::new();
        handler.add_link("eth0", "0a:58:0a:00:00:05", 1450).unwrap();
        handler
            .set_addresses(
                "eth0",
                vec![
                    "169.254.1.1/16".parse().unwrap(),
                    "10.0.0.5/24".parse().unwrap(),
                    "fe80::1/64".parse().unwrap(),
                    "fd00::5/64".parse().unwrap(),
                ],
            )
            .unwrap();
        handler
    }

    #[test]
    fn test_discovery_skips_link_local() {
        let handler = handler_with_addresses();
        let link = handler.link_by_name("eth0").unwrap();

        let info = discover_pod_link(&handler, link).unwrap();
        assert_eq!(info.ipv4, Some("10.0.0.5/24".parse().unwrap()));
        assert_eq!(info.ipv6, Some("fd00::5/64".parse().unwrap()));
        assert_eq!(info.pod_ips, vec!["10.0.0.5", "fd00::5"]);
        assert_eq!(info.pod_ip().map(String::as_str), Some("10.0.0.5"));
    }

    #[test]
    fn test_discovery_orders_by_primary_family() {
        let handler = handler_with_addresses();
        handler.set_ipv4_primary(false);
        let link = handler.link_by_name("eth0").unwrap();

        let info = discover_pod_link(&handler, link).unwrap();
        assert_eq!(info.pod_ips, vec!["fd00::5", "10.0.0.5"]);
    }

    #[test]
    fn test_resolve_falls_back_to_next_candidate() {
        let handler = MockNetworkHandler::new();
        handler.add_link("net1", "02:00:00:00:00:01", 1500).unwrap();

        let link = resolve_pod_link(&handler, &["pod7087ef4cd1f".into(), "net1".into()]).unwrap();
        assert_eq!(link.name, "net1");

        let err = resolve_pod_link(&handler, &["pod7087ef4cd1f".into()]).unwrap_err();
        assert!(matches!(err, NetError::LinkNotFound(_)));
    }

    #[test]
    fn test_for_method_is_exhaustive() {
        assert!(BindingConfigurator::for_method(BindingMethod::Sriov).is_sriov());
        assert_eq!(
            BindingConfigurator::for_method(BindingMethod::Bridge),
            BindingConfigurator::Bridge(BridgeBinding)
        );
    }
}
