//! Bindings that attach the VM to the pod link without in-pod plumbing.

use super::binding::{BindingContext, PodLinkInfo, PodNetworkConfigurator};
use crate::cache::DomainInterfaceEntry;
use crate::error::Result;

/// User-space networking; the passt process handles everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasstBinding;

impl PodNetworkConfigurator for PasstBinding {
    fn prepare_pod_network(&self, _ctx: &BindingContext<'_>, _info: &PodLinkInfo) -> Result<()> {
        Ok(())
    }
}

/// MACVTAP device created by libvirt on top of the pod link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacvtapBinding;

impl PodNetworkConfigurator for MacvtapBinding {
    fn cache_discovery(&self, ctx: &BindingContext<'_>, info: &PodLinkInfo) -> Result<()> {
        ctx.write_domain_interface(&DomainInterfaceEntry {
            mac: Some(
                ctx.iface
                    .mac_address
                    .clone()
                    .unwrap_or_else(|| info.link.mac.clone()),
            ),
            mtu: Some(info.link.mtu),
            target_device: Some(ctx.pod_iface.clone()),
            managed: false,
        })
    }

    fn prepare_pod_network(&self, _ctx: &BindingContext<'_>, _info: &PodLinkInfo) -> Result<()> {
        Ok(())
    }

    fn generate_domain_interface(&self, ctx: &BindingContext<'_>) -> Result<Option<DomainInterfaceEntry>> {
        ctx.read_domain_interface().map(Some)
    }
}
