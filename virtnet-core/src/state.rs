//! Per-network setup state and the transaction that guards it.
//!
//! Each VM network moves `Pending -> Started -> Finished`. [`ConfigState`]
//! runs a discover step and a configure step at most once per network,
//! across process restarts, and refuses to resume a network that an
//! earlier attempt left in `Started`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheFactory, NetworkConfigState, PodInterfaceCacheEntry};
use crate::driver::NamespaceExecutor;
use crate::error::{NetError, Result};

/// Storage for per-network setup state.
pub trait StateCache: Send + Sync {
    /// Current state; `Pending` if nothing was recorded.
    fn read(&self, network: &str) -> Result<NetworkConfigState>;

    fn write(&self, network: &str, state: NetworkConfigState) -> Result<()>;

    /// Reset a network to `Pending`, keeping the rest of its record.
    fn delete(&self, network: &str) -> Result<()>;
}

/// State of one VM's networks, persisted in the pod interface records
/// with an in-memory write-through overlay.
pub struct NetworkStateCache {
    uid: String,
    factory: CacheFactory,
    overlay: RwLock<HashMap<String, NetworkConfigState>>,
}

impl NetworkStateCache {
    pub fn new(uid: impl Into<String>, factory: CacheFactory) -> Self {
        Self {
            uid: uid.into(),
            factory,
            overlay: RwLock::new(HashMap::new()),
        }
    }

    fn read_entry(&self, network: &str) -> Result<Option<PodInterfaceCacheEntry>> {
        match self.factory.read_pod_interface(&self.uid, network) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn overlay_lock_err() -> NetError {
        NetError::Internal("Lock poisoned".to_string())
    }
}

impl StateCache for NetworkStateCache {
    fn read(&self, network: &str) -> Result<NetworkConfigState> {
        if let Some(state) = self
            .overlay
            .read()
            .map_err(|_| Self::overlay_lock_err())?
            .get(network)
        {
            return Ok(*state);
        }

        let state = self
            .read_entry(network)?
            .map(|entry| entry.state)
            .unwrap_or_default();

        self.overlay
            .write()
            .map_err(|_| Self::overlay_lock_err())?
            .insert(network.to_string(), state);
        Ok(state)
    }

    fn write(&self, network: &str, state: NetworkConfigState) -> Result<()> {
        let mut entry = self.read_entry(network)?.unwrap_or_default();
        entry.state = state;
        self.factory.write_pod_interface(&self.uid, network, &entry)?;

        self.overlay
            .write()
            .map_err(|_| Self::overlay_lock_err())?
            .insert(network.to_string(), state);
        Ok(())
    }

    fn delete(&self, network: &str) -> Result<()> {
        self.overlay
            .write()
            .map_err(|_| Self::overlay_lock_err())?
            .remove(network);

        if let Some(mut entry) = self.read_entry(network)? {
            entry.state = NetworkConfigState::Pending;
            self.factory.write_pod_interface(&self.uid, network, &entry)?;
        }
        Ok(())
    }
}

/// Networks grouped by setup state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSummary {
    pub pending: Vec<String>,
    pub started: Vec<String>,
    pub finished: Vec<String>,
}

/// Guards the discover/configure steps of each network of one VM.
pub struct ConfigState {
    cache: Arc<dyn StateCache>,
    ns: Arc<dyn NamespaceExecutor>,
}

impl ConfigState {
    pub fn new(cache: Arc<dyn StateCache>, ns: Arc<dyn NamespaceExecutor>) -> Self {
        Self { cache, ns }
    }

    /// State tracker for `uid` backed by the persistent cache.
    pub fn for_vmi(uid: &str, factory: CacheFactory, ns: Arc<dyn NamespaceExecutor>) -> Self {
        Self::new(Arc::new(NetworkStateCache::new(uid, factory)), ns)
    }

    pub fn read(&self, network: &str) -> Result<NetworkConfigState> {
        self.cache.read(network)
    }

    /// Reset a network to `Pending`.
    pub fn reset(&self, network: &str) -> Result<()> {
        warn!(network = %network, "Resetting network setup state");
        self.cache.delete(network)
    }

    /// Run `discover` then `configure` for `network` inside the namespace.
    ///
    /// A `Finished` network is skipped without entering the namespace. A
    /// `Started` network fails with a critical error and neither step
    /// runs. Step errors are returned unchanged; a failed `configure`
    /// leaves the network `Started`.
    #[instrument(skip_all, fields(network = %network))]
    pub fn run<D, C>(&self, network: &str, discover: D, configure: C) -> Result<()>
    where
        D: FnOnce() -> Result<()>,
        C: FnOnce() -> Result<()>,
    {
        match self.cache.read(network)? {
            NetworkConfigState::Finished => {
                debug!("Network already configured");
                return Ok(());
            }
            NetworkConfigState::Started => {
                error!("Network setup was interrupted by an earlier attempt");
                return Err(NetError::critical(NetError::InvalidState(format!(
                    "network {} was left partially configured; refusing to resume",
                    network
                ))));
            }
            NetworkConfigState::Pending => {}
        }

        self.ns.run(Box::new(move || {
            discover()?;
            self.cache.write(network, NetworkConfigState::Started)?;

            configure()?;
            self.cache.write(network, NetworkConfigState::Finished)?;

            info!("Network configured");
            Ok(())
        }))
    }

    /// Clean up networks that got past `Pending`.
    ///
    /// `filter` narrows the started networks to the ones to remove and
    /// `cleanup` runs for each of those inside the namespace. A network
    /// is reset to `Pending` only if its cleanup succeeded. All failures
    /// are collected and returned together.
    pub fn unplug<F, C>(&self, networks: &[String], filter: F, cleanup: C) -> Result<()>
    where
        F: FnOnce(&[String]) -> Result<Vec<String>>,
        C: FnMut(&str) -> Result<()>,
    {
        let errors = self
            .unplug_each(networks, filter, cleanup)?
            .into_iter()
            .filter_map(|(_, result)| result.err())
            .collect();
        NetError::aggregate(errors).map_or(Ok(()), Err)
    }

    /// Like [`ConfigState::unplug`], but returns the outcome of every
    /// network that was cleaned up, in filter order.
    ///
    /// Only failures that belong to no single network (state reads, the
    /// filter, entering the namespace) fail the call itself.
    #[instrument(skip_all, fields(networks = networks.len()))]
    pub fn unplug_each<F, C>(
        &self,
        networks: &[String],
        filter: F,
        mut cleanup: C,
    ) -> Result<Vec<(String, Result<()>)>>
    where
        F: FnOnce(&[String]) -> Result<Vec<String>>,
        C: FnMut(&str) -> Result<()>,
    {
        let mut started = Vec::new();
        for network in networks {
            if self.cache.read(network)? != NetworkConfigState::Pending {
                started.push(network.clone());
            }
        }

        if started.is_empty() {
            debug!("No started networks to unplug");
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::new();
        let collected = &mut outcomes;
        self.ns.run(Box::new(move || {
            for network in filter(&started)? {
                let result = cleanup(&network).and_then(|_| self.cache.delete(&network));
                match &result {
                    Ok(()) => info!(network = %network, "Network unplugged"),
                    Err(e) => warn!(network = %network, error = %e, "Failed to unplug network"),
                }
                collected.push((network, result));
            }
            Ok(())
        }))?;
        Ok(outcomes)
    }

    /// Group networks by their current state, keeping input order.
    pub fn pending_started_finished(&self, networks: &[String]) -> Result<StateSummary> {
        let mut summary = StateSummary::default();
        for network in networks {
            let bucket = match self.cache.read(network)? {
                NetworkConfigState::Pending => &mut summary.pending,
                NetworkConfigState::Started => &mut summary.started,
                NetworkConfigState::Finished => &mut summary.finished,
            };
            bucket.push(network.clone());
        }
        Ok(summary)
    }
}
