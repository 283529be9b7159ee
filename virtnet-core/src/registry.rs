//! Per-daemon registry of VM network configuration state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument};

use crate::cache::CacheFactory;
use crate::dhcp::DhcpSupervisor;
use crate::driver::{NamespaceFactory, NetworkHandler};
use crate::error::{NetError, Result};
use crate::hotplug::{HotplugController, InterfaceHotplugStatus};
use crate::setup::NetworkSetup;
use crate::state::ConfigState;
use crate::types::{InterfaceState, Vmi};

/// Owns one [`ConfigState`] per VM, from the first setup until teardown.
///
/// The lock only guards the map. Operations on different networks of a
/// VM are not serialized by it.
pub struct NetConf {
    cache: CacheFactory,
    handler: Arc<dyn NetworkHandler>,
    ns_factory: Arc<dyn NamespaceFactory>,
    states: RwLock<HashMap<String, Arc<ConfigState>>>,
}

impl NetConf {
    pub fn new(
        cache: CacheFactory,
        handler: Arc<dyn NetworkHandler>,
        ns_factory: Arc<dyn NamespaceFactory>,
    ) -> Self {
        Self {
            cache,
            handler,
            ns_factory,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &CacheFactory {
        &self.cache
    }

    /// Configuration state of a VM, if it was set up.
    pub fn state(&self, uid: &str) -> Result<Option<Arc<ConfigState>>> {
        Ok(self
            .states
            .read()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?
            .get(uid)
            .cloned())
    }

    fn state_or_insert(&self, vmi: &Vmi, launcher_pid: Option<u32>) -> Result<Arc<ConfigState>> {
        if let Some(state) = self.state(&vmi.uid)? {
            return Ok(state);
        }

        let mut states = self
            .states
            .write()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?;
        let state = states.entry(vmi.uid.clone()).or_insert_with(|| {
            debug!(vmi_uid = %vmi.uid, "Registering VM network state");
            Arc::new(ConfigState::for_vmi(
                &vmi.uid,
                self.cache.clone(),
                self.ns_factory.for_pid(launcher_pid),
            ))
        });
        Ok(state.clone())
    }

    /// Prepare the pod side of `networks` and remove absent ones.
    ///
    /// `pre_setup` runs before anything else; its failure aborts the
    /// setup. Networks whose interface is absent are unplugged instead
    /// of plugged, and their outcome is returned.
    #[instrument(skip_all, fields(vmi_uid = %vmi.uid))]
    pub fn setup<P>(
        &self,
        vmi: &Vmi,
        networks: &[String],
        launcher_pid: Option<u32>,
        pre_setup: P,
    ) -> Result<Vec<InterfaceHotplugStatus>>
    where
        P: FnOnce() -> Result<()>,
    {
        pre_setup()?;
        let state = self.state_or_insert(vmi, launcher_pid)?;

        let plugged: Vec<String> = networks
            .iter()
            .filter(|network| {
                vmi.interface(network)
                    .map(|i| i.state != InterfaceState::Absent)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        NetworkSetup::new(vmi, self.handler.as_ref(), &self.cache, launcher_pid)
            .plug_phase1(&state, &plugged)?;

        HotplugController::new(vmi, self.handler.as_ref(), &self.cache, launcher_pid).unplug(&state)
    }

    /// Hot-plug the networks multus attached since the last round.
    #[instrument(skip_all, fields(vmi_uid = %vmi.uid))]
    pub fn hotplug(
        &self,
        vmi: &Vmi,
        launcher_pid: Option<u32>,
        dhcp: &DhcpSupervisor,
    ) -> Result<Vec<InterfaceHotplugStatus>> {
        let state = self.state_or_insert(vmi, launcher_pid)?;
        let controller = HotplugController::new(vmi, self.handler.as_ref(), &self.cache, launcher_pid)
            .with_dhcp(dhcp);
        let mut statuses = controller.plug(&state)?;
        statuses.extend(controller.unplug(&state)?);
        Ok(statuses)
    }

    /// Forget a VM and delete its cache tree.
    #[instrument(skip_all, fields(vmi_uid = %vmi.uid))]
    pub fn teardown(&self, vmi: &Vmi) -> Result<()> {
        self.states
            .write()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?
            .remove(&vmi.uid);
        self.cache.delete_vmi(&vmi.uid)?;
        info!("VM network state removed");
        Ok(())
    }
}
