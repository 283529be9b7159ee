//! Masquerade binding: the VM sits on a private subnet behind NAT on
//! the pod IP.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::info;

use super::binding::{BindingContext, PodLinkInfo, PodNetworkConfigurator};
use crate::cache::{DhcpConfig, DomainInterfaceEntry};
use crate::error::{NetError, Result};
use crate::types::{NetworkSource, PodNetwork};

const DEFAULT_VM_CIDR: &str = "10.0.2.0/24";
const DEFAULT_VM_IPV6_CIDR: &str = "fd10:0:2::/120";

/// Gateway and VM addresses of the masquerade subnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasqueradeAddresses {
    pub gateway: Ipv4Net,
    pub vm: Ipv4Net,
    pub gateway_ipv6: Ipv6Net,
    pub vm_ipv6: Ipv6Net,
}

impl MasqueradeAddresses {
    /// The first host of each subnet is the gateway, the second the VM.
    pub fn for_pod_network(pod: &PodNetwork) -> Result<Self> {
        let v4 = match pod.vm_network_cidr {
            Some(net) => net,
            None => parse_default(DEFAULT_VM_CIDR)?,
        };
        let v6 = match pod.vm_ipv6_network_cidr {
            Some(net) => net,
            None => parse_default(DEFAULT_VM_IPV6_CIDR)?,
        };

        if v4.prefix_len() > 30 {
            return Err(NetError::InvalidConfig(format!("VM network {} is too small", v4)));
        }
        if v6.prefix_len() > 126 {
            return Err(NetError::InvalidConfig(format!("VM IPv6 network {} is too small", v6)));
        }

        let base4 = u32::from(v4.network());
        let base6 = u128::from(v6.network());
        let host4 = |n: u32| Ipv4Net::new(Ipv4Addr::from(base4 + n), v4.prefix_len());
        let host6 = |n: u128| Ipv6Net::new(Ipv6Addr::from(base6 + n), v6.prefix_len());
        let invalid = |e: ipnet::PrefixLenError| NetError::InvalidConfig(e.to_string());

        Ok(Self {
            gateway: host4(1).map_err(invalid)?,
            vm: host4(2).map_err(invalid)?,
            gateway_ipv6: host6(1).map_err(invalid)?,
            vm_ipv6: host6(2).map_err(invalid)?,
        })
    }

    fn for_context(ctx: &BindingContext<'_>) -> Result<Self> {
        match &ctx.network.source {
            NetworkSource::Pod(pod) => Self::for_pod_network(pod),
            NetworkSource::Multus(_) => Self::for_pod_network(&PodNetwork::default()),
        }
    }
}

fn parse_default<T: std::str::FromStr>(cidr: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    cidr.parse()
        .map_err(|e: T::Err| NetError::Internal(format!("bad default CIDR {}: {}", cidr, e)))
}

/// Whether discovery recorded an IPv6 address on the pod link.
fn pod_has_ipv6(ctx: &BindingContext<'_>) -> Result<bool> {
    let entry = ctx.cache.read_pod_interface(&ctx.vmi.uid, &ctx.network.name)?;
    Ok(entry.pod_ips.iter().any(|ip| ip.parse::<Ipv6Addr>().is_ok()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MasqueradeBinding;

impl PodNetworkConfigurator for MasqueradeBinding {
    fn cache_discovery(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()> {
        ctx.write_domain_interface(&DomainInterfaceEntry {
            mac: ctx.iface.mac_address.clone(),
            mtu: Some(info.link.mtu),
            target_device: Some(ctx.tap_name()),
            managed: false,
        })
    }

    fn prepare_pod_network(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()> {
        let handler = ctx.handler;
        let addrs = MasqueradeAddresses::for_context(ctx)?;
        let bridge = ctx.bridge_name();
        let tap = ctx.tap_name();

        handler.create_bridge(&bridge)?;
        handler.addr_add(&bridge, IpNet::V4(addrs.gateway))?;
        if info.ipv6.is_some() {
            handler.addr_add(&bridge, IpNet::V6(addrs.gateway_ipv6))?;
        }
        handler.link_set_up(&bridge)?;

        handler.create_tap(&tap, info.link.mtu, &ctx.launcher_pid)?;
        handler.bind_to_bridge(&tap, &bridge)?;
        handler.link_set_up(&tap)?;

        if info.ipv4.is_some() {
            handler.configure_masquerade_nat(&bridge, IpNet::V4(addrs.vm), IpNet::V4(addrs.gateway))?;
        }
        if info.ipv6.is_some() {
            handler.configure_masquerade_nat(&bridge, IpNet::V6(addrs.vm_ipv6), IpNet::V6(addrs.gateway_ipv6))?;
        }

        info!(bridge = %bridge, tap = %tap, vm = %addrs.vm, "Masquerade binding prepared");
        Ok(())
    }

    fn generate_dhcp_config(&self, ctx: &BindingContext<'_>) -> Result<Option<DhcpConfig>> {
        let addrs = MasqueradeAddresses::for_context(ctx)?;
        let domain = ctx.read_domain_interface()?;
        // The VM only gets an IPv6 lease when the pod itself has one
        let ipv6 = pod_has_ipv6(ctx)?;

        let config = DhcpConfig {
            name: ctx.bridge_name(),
            mac: ctx.iface.mac_address.clone(),
            ip: Some(addrs.vm),
            ipv6: ipv6.then_some(addrs.vm_ipv6),
            gateway: Some(addrs.gateway.addr()),
            gateway_ipv6: ipv6.then(|| addrs.gateway_ipv6.addr()),
            advertising_ip: Some(addrs.gateway.addr()),
            advertising_ipv6: ipv6.then(|| addrs.gateway_ipv6.addr()),
            routes: Vec::new(),
            mtu: domain.mtu.unwrap_or(1500),
            ipam_disabled: false,
            subdomain: ctx.vmi.spec.subdomain.clone(),
        };
        ctx.write_dhcp_config(&config)?;
        Ok(Some(config))
    }

    fn generate_domain_interface(&self, ctx: &BindingContext<'_>) -> Result<Option<DomainInterfaceEntry>> {
        ctx.read_domain_interface().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addresses() {
        let addrs = MasqueradeAddresses::for_pod_network(&PodNetwork::default()).unwrap();
        assert_eq!(addrs.gateway.to_string(), "10.0.2.1/24");
        assert_eq!(addrs.vm.to_string(), "10.0.2.2/24");
        assert_eq!(addrs.gateway_ipv6.to_string(), "fd10:0:2::1/120");
        assert_eq!(addrs.vm_ipv6.to_string(), "fd10:0:2::2/120");
    }

    #[test]
    fn test_custom_cidr() {
        let pod = PodNetwork {
            vm_network_cidr: Some("192.168.7.0/28".parse().unwrap()),
            vm_ipv6_network_cidr: None,
        };
        let addrs = MasqueradeAddresses::for_pod_network(&pod).unwrap();
        assert_eq!(addrs.gateway.to_string(), "192.168.7.1/28");
        assert_eq!(addrs.vm.to_string(), "192.168.7.2/28");
    }

    #[test]
    fn test_tiny_cidr_rejected() {
        let pod = PodNetwork {
            vm_network_cidr: Some("192.168.7.0/31".parse().unwrap()),
            vm_ipv6_network_cidr: None,
        };
        assert!(matches!(
            MasqueradeAddresses::for_pod_network(&pod),
            Err(NetError::InvalidConfig(_))
        ));
    }
}
