//! Pod network setup pipeline.

pub mod binding;
pub mod bridge;
pub mod direct;
pub mod masquerade;
pub mod podnic;

pub use binding::{BindingConfigurator, BindingContext, PodLinkInfo, PodNetworkConfigurator};
pub use podnic::{launcher_pid_string, PodNic};

use std::collections::HashMap;
use tracing::{error, info, instrument};

use crate::cache::{CacheFactory, DomainInterfaceEntry};
use crate::dhcp::DhcpSupervisor;
use crate::driver::NetworkHandler;
use crate::error::Result;
use crate::state::ConfigState;
use crate::types::Vmi;

/// Runs both setup phases over a set of networks of one VM.
pub struct NetworkSetup<'a> {
    vmi: &'a Vmi,
    handler: &'a dyn NetworkHandler,
    cache: &'a CacheFactory,
    launcher_pid: Option<u32>,
}

impl<'a> NetworkSetup<'a> {
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
            launcher_pid,
        }
    }

    /// Phase 1 for each network, stopping at the first failure.
    #[instrument(skip_all, fields(vmi_uid = %self.vmi.uid))]
    pub fn plug_phase1(&self, state: &ConfigState, networks: &[String]) -> Result<()> {
        for network in networks {
            PodNic::new(self.vmi, network, self.handler, self.cache, self.launcher_pid)?
                .plug_phase1(state)?;
        }
        info!(networks = networks.len(), "Pod networks prepared");
        Ok(())
    }

    /// Phase 2 for every plugged network.
    ///
    /// Returns the domain interface attributes keyed by network name.
    #[instrument(skip_all, fields(vmi_uid = %self.vmi.uid))]
    pub fn plug_phase2(&self, dhcp: &DhcpSupervisor) -> Result<HashMap<String, DomainInterfaceEntry>> {
        let mut domain_ifaces = HashMap::new();
        for network in self.vmi.plugged_networks() {
            let nic = PodNic::new(self.vmi, &network.name, self.handler, self.cache, self.launcher_pid)?;
            match nic.plug_phase2(dhcp) {
                Ok(Some(entry)) => {
                    domain_ifaces.insert(network.name.clone(), entry);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(network = %network.name, error = %e, "Failed to finalize network");
                    return Err(e);
                }
            }
        }
        Ok(domain_ifaces)
    }
}
