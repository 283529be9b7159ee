//! Two-phase setup of one VM network.
//!
//! Phase 1 runs in the pod network namespace before the domain exists:
//! it discovers the pod link, caches what later steps need and prepares
//! the namespace, guarded by [`ConfigState`]. Phase 2 runs once the
//! domain is defined: it produces the domain interface attributes and
//! starts the DHCP server for bindings that serve one.

use std::cell::OnceCell;
use tracing::{debug, error, info, instrument};

use super::binding::{
    resolve_pod_link, BindingConfigurator, BindingContext, PodLinkInfo, PodNetworkConfigurator,
};
use crate::cache::{CacheFactory, DomainInterfaceEntry, NetworkConfigState, PodInterfaceCacheEntry};
use crate::dhcp::DhcpSupervisor;
use crate::driver::NetworkHandler;
use crate::error::{NetError, Result};
use crate::namescheme;
use crate::state::ConfigState;
use crate::types::{Interface, Network, Vmi};

/// Launcher PID as used in cache paths; `self` when unknown.
pub fn launcher_pid_string(pid: Option<u32>) -> String {
    match pid {
        Some(pid) => pid.to_string(),
        None => "self".to_string(),
    }
}

pub struct PodNic<'a> {
    vmi: &'a Vmi,
    network: &'a Network,
    iface: &'a Interface,
    iface_index: usize,
    binding: BindingConfigurator,
    handler: &'a dyn NetworkHandler,
    cache: &'a CacheFactory,
    launcher_pid: String,
}

impl<'a> PodNic<'a> {
    pub fn new(
        vmi: &'a Vmi,
        network_name: &str,
        handler: &'a dyn NetworkHandler,
        cache: &'a CacheFactory,
        launcher_pid: Option<u32>,
    ) -> Result<Self> {
        let network = vmi.network(network_name).ok_or_else(|| {
            NetError::InvalidConfig(format!("network {} is not declared", network_name))
        })?;
        let (iface_index, iface) = vmi
            .spec
            .interfaces
            .iter()
            .enumerate()
            .find(|(_, i)| i.name == network_name)
            .ok_or_else(|| {
                NetError::InvalidConfig(format!("no interface is bound to network {}", network_name))
            })?;

        Ok(Self {
            vmi,
            network,
            iface,
            iface_index,
            binding: BindingConfigurator::for_method(iface.binding),
            handler,
            cache,
            launcher_pid: launcher_pid_string(launcher_pid),
        })
    }

    fn context(&self, pod_iface: String) -> BindingContext<'_> {
        BindingContext {
            vmi: self.vmi,
            network: self.network,
            iface: self.iface,
            iface_index: self.iface_index,
            pod_iface,
            launcher_pid: self.launcher_pid.clone(),
            handler: self.handler,
            cache: self.cache,
        }
    }

    /// Phase 1: discover and prepare, at most once per network.
    ///
    /// Errors from either step are escalated to critical network errors.
    #[instrument(skip_all, fields(vmi_uid = %self.vmi.uid, network = %self.network.name))]
    pub fn plug_phase1(&self, state: &ConfigState) -> Result<()> {
        if self.binding.is_sriov() {
            debug!("SR-IOV interface, nothing to prepare in the pod");
            return Ok(());
        }

        let discovered: OnceCell<(String, PodLinkInfo)> = OnceCell::new();

        state.run(
            &self.network.name,
            || {
                let result = self.discover().map(|d| {
                    let _ = discovered.set(d);
                });
                result.map_err(|e| {
                    error!(error = %e, "Pod interface discovery failed");
                    NetError::critical(e)
                })
            },
            || {
                let (pod_iface, info) = discovered.get().ok_or_else(|| {
                    NetError::critical(NetError::Internal("configure ran before discovery".to_string()))
                })?;
                let ctx = self.context(pod_iface.clone());
                self.binding.prepare_pod_network(&ctx, info).map_err(|e| {
                    error!(error = %e, "Pod network preparation failed");
                    NetError::critical(e)
                })
            },
        )
    }

    fn discover(&self) -> Result<(String, PodLinkInfo)> {
        let candidates =
            namescheme::pod_interface_candidates(&self.vmi.spec.networks, &self.network.name);
        let link = resolve_pod_link(self.handler, &candidates)?;
        let pod_iface = link.name.clone();

        let ctx = self.context(pod_iface.clone());
        let info = self.binding.discover_pod_interface(&ctx)?;

        self.cache.write_pod_interface(
            &self.vmi.uid,
            &self.network.name,
            &PodInterfaceCacheEntry {
                iface: Some(self.iface.clone()),
                pod_ip: info.pod_ip().cloned(),
                pod_ips: info.pod_ips.clone(),
                state: NetworkConfigState::Pending,
                pod_interface_name: Some(pod_iface.clone()),
            },
        )?;
        self.binding.cache_discovery(&ctx, &info)?;

        info!(pod_iface = %pod_iface, pod_ips = ?info.pod_ips, "Pod interface discovered");
        Ok((pod_iface, info))
    }

    /// Pod link recorded by discovery, or the hashed-scheme name.
    fn cached_pod_iface(&self) -> Result<String> {
        let cached = match self.cache.read_pod_interface(&self.vmi.uid, &self.network.name) {
            Ok(entry) => entry.pod_interface_name,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        Ok(cached.unwrap_or_else(|| {
            namescheme::hashed_name_scheme(&self.vmi.spec.networks)
                .remove(&self.network.name)
                .unwrap_or_else(|| namescheme::hashed_pod_interface_name(&self.network.name))
        }))
    }

    /// Phase 2: domain interface attributes and DHCP.
    ///
    /// Returns `None` for bindings without domain-facing attributes. A
    /// DHCP server that cannot be started yields [`NetError::Fatal`].
    #[instrument(skip_all, fields(vmi_uid = %self.vmi.uid, network = %self.network.name))]
    pub fn plug_phase2(&self, dhcp: &DhcpSupervisor) -> Result<Option<DomainInterfaceEntry>> {
        if self.binding.is_sriov() {
            debug!("SR-IOV interface, nothing to finalize");
            return Ok(None);
        }

        let ctx = self.context(self.cached_pod_iface()?);
        let domain = self.binding.generate_domain_interface(&ctx)?;

        if let Some(config) = self.binding.generate_dhcp_config(&ctx)? {
            dhcp.ensure_started(config)?;
        }

        Ok(domain)
    }

    pub fn network(&self) -> &Network {
        self.network
    }

    pub fn binding(&self) -> &BindingConfigurator {
        &self.binding
    }
}
