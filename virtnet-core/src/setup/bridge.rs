//! Bridge binding: the VM takes over the pod IP and MAC through an
//! in-pod bridge.

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::{debug, info};

use super::binding::{BindingContext, PodLinkInfo, PodNetworkConfigurator};
use crate::cache::{DhcpConfig, DomainInterfaceEntry};
use crate::error::Result;
use crate::namescheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeBinding;

impl BridgeBinding {
    fn vm_mac(ctx: &BindingContext<'_>, info: &PodLinkInfo) -> String {
        ctx.iface
            .mac_address
            .clone()
            .unwrap_or_else(|| info.link.mac.clone())
    }

    /// DHCP lease handing the pod address to the VM.
    fn dhcp_config(ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<DhcpConfig> {
        let mut config = DhcpConfig {
            name: ctx.bridge_name(),
            mtu: info.link.mtu,
            ..Default::default()
        };

        let Some(ipv4) = info.ipv4 else {
            config.ipam_disabled = true;
            return Ok(config);
        };

        let pod_subnet = IpNet::V4(ipv4.trunc());
        config.ip = Some(ipv4);
        config.mac = Some(Self::vm_mac(ctx, info));
        config.gateway = info.routes.first().and_then(|r| match r.gateway {
            Some(IpAddr::V4(gw)) => Some(gw),
            _ => None,
        });
        config.routes = info
            .routes
            .iter()
            .filter(|r| !r.is_default() && r.destination != Some(pod_subnet))
            .cloned()
            .collect();
        config.advertising_ip = Some(namescheme::bridge_fake_ip(ctx.iface_index)?.addr());
        Ok(config)
    }
}

impl PodNetworkConfigurator for BridgeBinding {
    fn cache_discovery(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()> {
        ctx.write_dhcp_config(&Self::dhcp_config(ctx, info)?)?;
        ctx.write_domain_interface(&DomainInterfaceEntry {
            mac: Some(Self::vm_mac(ctx, info)),
            mtu: Some(info.link.mtu),
            target_device: Some(ctx.tap_name()),
            managed: false,
        })
    }

    fn prepare_pod_network(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()> {
        let handler = ctx.handler;
        let pod_iface = &ctx.pod_iface;
        let renamed = namescheme::renamed_pod_link_name(pod_iface);
        let bridge = ctx.bridge_name();
        let tap = ctx.tap_name();

        handler.link_set_down(pod_iface)?;
        handler.rename_link(pod_iface, &renamed)?;

        // A dummy keeps the pod name and addresses visible to the pod
        if let Some(ipv4) = info.ipv4 {
            handler.addr_del(&renamed, IpNet::V4(ipv4))?;
            handler.create_dummy(pod_iface)?;
            handler.addr_add(pod_iface, IpNet::V4(ipv4))?;
            debug!(dummy = %pod_iface, "Pod addresses moved to dummy link");
        }

        handler.set_random_mac(&renamed)?;

        handler.create_bridge(&bridge)?;
        handler.bind_to_bridge(&renamed, &bridge)?;
        handler.addr_add(&bridge, IpNet::V4(namescheme::bridge_fake_ip(ctx.iface_index)?))?;
        handler.link_set_up(&bridge)?;

        handler.create_tap(&tap, info.link.mtu, &ctx.launcher_pid)?;
        handler.bind_to_bridge(&tap, &bridge)?;
        handler.link_set_up(&tap)?;

        handler.configure_arp_ignore()?;
        handler.link_set_up(&renamed)?;
        handler.disable_learning(&renamed)?;

        info!(bridge = %bridge, tap = %tap, "Bridge binding prepared");
        Ok(())
    }

    fn generate_dhcp_config(&self, ctx: &BindingContext<'_>) -> Result<Option<DhcpConfig>> {
        let mut config = ctx.read_dhcp_config()?;
        config.subdomain = ctx.vmi.spec.subdomain.clone();
        Ok(Some(config))
    }

    fn generate_domain_interface(&self, ctx: &BindingContext<'_>) -> Result<Option<DomainInterfaceEntry>> {
        ctx.read_domain_interface().map(Some)
    }
}
