//! Hot-plug and hot-unplug of networks on a running VM.
//!
//! A network is ready to be hot-plugged once multus reports its pod
//! interface but the domain does not have it yet. A network is unplugged
//! when its interface is marked absent; cleanup reuses the same
//! [`ConfigState`] bookkeeping as the initial setup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::cache::{CacheFactory, NetworkConfigState};
use crate::dhcp::DhcpSupervisor;
use crate::driver::NetworkHandler;
use crate::error::{NetError, Result};
use crate::namescheme;
use crate::setup::{launcher_pid_string, PodNic};
use crate::state::ConfigState;
use crate::types::{BindingMethod, InfoSource, InterfaceState, Vmi};

/// Progress of a hot-plug operation, reported to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotplugPhase {
    /// Pod side prepared, ready to be attached to the domain
    Prepared,
    /// Pod side removed
    Unplugged,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceHotplugStatus {
    pub name: String,
    pub phase: HotplugPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InterfaceHotplugStatus {
    fn new(name: &str, phase: HotplugPhase) -> Self {
        Self {
            name: name.to_string(),
            phase,
            message: None,
        }
    }
}

/// Networks whose pod interface exists but which the domain lacks.
pub fn networks_to_hotplug(vmi: &Vmi) -> Vec<String> {
    vmi.plugged_networks()
        .into_iter()
        .filter(|network| {
            vmi.status.interfaces.iter().any(|s| {
                s.name == network.name
                    && s.info_source.contains(InfoSource::MULTUS_STATUS)
                    && !s.info_source.contains(InfoSource::DOMAIN)
            })
        })
        .map(|network| network.name.clone())
        .collect()
}

/// Networks whose interface is marked absent.
pub fn networks_to_unplug(vmi: &Vmi) -> Vec<String> {
    vmi.spec
        .interfaces
        .iter()
        .filter(|iface| iface.state == InterfaceState::Absent)
        .map(|iface| iface.name.clone())
        .collect()
}

fn is_ordinal_name(pod_iface: &str) -> bool {
    pod_iface
        .strip_prefix("net")
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

pub struct HotplugController<'a> {
    vmi: &'a Vmi,
    handler: &'a dyn NetworkHandler,
    cache: &'a CacheFactory,
    dhcp: Option<&'a DhcpSupervisor>,
    launcher_pid: Option<u32>,
}

impl<'a> HotplugController<'a> {
    pub fn new(
        vmi: &'a Vmi,
        handler: &'a dyn NetworkHandler,
        cache: &'a CacheFactory,
        launcher_pid: Option<u32>,
    ) -> Self {
        Self {
            vmi,
            handler,
            cache,
            dhcp: None,
            launcher_pid,
        }
    }

    /// Also stop DHCP servers of unplugged interfaces.
    pub fn with_dhcp(mut self, dhcp: &'a DhcpSupervisor) -> Self {
        self.dhcp = Some(dhcp);
        self
    }

    /// Prepare the pod side of every network ready for hot-plug.
    #[instrument(skip_all, fields(vmi_uid = %self.vmi.uid))]
    pub fn plug(&self, state: &ConfigState) -> Result<Vec<InterfaceHotplugStatus>> {
        let mut statuses = Vec::new();
        for network in networks_to_hotplug(self.vmi) {
            PodNic::new(self.vmi, &network, self.handler, self.cache, self.launcher_pid)?
                .plug_phase1(state)?;
            info!(network = %network, "Network ready for hot-plug");
            statuses.push(InterfaceHotplugStatus::new(&network, HotplugPhase::Prepared));
        }
        Ok(statuses)
    }

    /// Remove the pod side of every absent network.
    ///
    /// Failures of one network, in cleanup or in the state reset, are
    /// reported on that network. Failures that belong to no network fail
    /// the whole call.
    #[instrument(skip_all, fields(vmi_uid = %self.vmi.uid))]
    pub fn unplug(&self, state: &ConfigState) -> Result<Vec<InterfaceHotplugStatus>> {
        let networks = networks_to_unplug(self.vmi);

        let mut outcomes: HashMap<String, Result<()>> = state
            .unplug_each(
                &networks,
                |started| self.unpluggable(started),
                |network| self.cleanup(network),
            )?
            .into_iter()
            .collect();

        let mut statuses = Vec::new();
        for network in &networks {
            let message = match outcomes.remove(network) {
                Some(Ok(())) => None,
                Some(Err(e)) => Some(e.to_string()),
                // Not cleaned up: either never configured or filtered out
                None if state.read(network)? == NetworkConfigState::Pending => None,
                None => Some("pod interface with an ordinal name cannot be hot-unplugged".to_string()),
            };
            statuses.push(match message {
                None => InterfaceHotplugStatus::new(network, HotplugPhase::Unplugged),
                Some(message) => {
                    warn!(network = %network, error = %message, "Network could not be unplugged");
                    InterfaceHotplugStatus {
                        message: Some(message),
                        ..InterfaceHotplugStatus::new(network, HotplugPhase::Failed)
                    }
                }
            });
        }
        Ok(statuses)
    }

    /// Pods created with ordinal interface names do not support unplug.
    fn unpluggable(&self, networks: &[String]) -> Result<Vec<String>> {
        let mut unpluggable = Vec::new();
        for network in networks {
            let ordinal = match self.cache.read_pod_interface(&self.vmi.uid, network) {
                Ok(entry) => entry
                    .pod_interface_name
                    .as_deref()
                    .map(is_ordinal_name)
                    .unwrap_or(false),
                Err(e) if e.is_not_found() => false,
                Err(e) => return Err(e),
            };
            if !ordinal {
                unpluggable.push(network.clone());
            }
        }
        Ok(unpluggable)
    }

    /// Delete the in-pod devices and launcher caches of one network.
    fn cleanup(&self, network: &str) -> Result<()> {
        let pod_iface = match self.cache.read_pod_interface(&self.vmi.uid, network) {
            Ok(entry) => entry.pod_interface_name,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        }
        .unwrap_or_else(|| {
            namescheme::hashed_name_scheme(&self.vmi.spec.networks)
                .remove(network)
                .unwrap_or_else(|| namescheme::hashed_pod_interface_name(network))
        });

        let binding = self
            .vmi
            .interface(network)
            .map(|i| i.binding)
            .unwrap_or_default();

        let mut links = Vec::new();
        match binding {
            BindingMethod::Bridge => {
                links.push(namescheme::tap_name(&pod_iface));
                links.push(namescheme::bridge_name(&pod_iface));
                links.push(pod_iface.clone());
            }
            BindingMethod::Masquerade => {
                links.push(namescheme::tap_name(&pod_iface));
                links.push(namescheme::bridge_name(&pod_iface));
            }
            BindingMethod::Passt | BindingMethod::Macvtap | BindingMethod::Sriov => {}
        }

        for link in &links {
            match self.handler.link_delete(link) {
                Ok(()) | Err(NetError::LinkNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let pid = launcher_pid_string(self.launcher_pid);
        self.cache.dhcp(&pid, network)?.delete()?;
        self.cache.domain_interface(&pid, network)?.delete()?;

        if let Some(dhcp) = self.dhcp {
            dhcp.stop(&namescheme::bridge_name(&pod_iface))?;
        }

        info!(network = %network, links = ?links, "Network pod side removed");
        Ok(())
    }
}
