//! Supervision of per-interface DHCP servers.
//!
//! One background task serves each interface. A server that cannot be
//! started, or whose serve loop dies, leaves the VM without a lease; both
//! cases are reported as [`NetError::Fatal`]. Start failures are returned
//! to the caller, serve failures are sent on the channel handed out by
//! [`DhcpSupervisor::new`] so the top-level VM supervisor can tear the VM
//! process down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::cache::DhcpConfig;
use crate::driver::DhcpServer;
use crate::error::{NetError, Result};

pub struct DhcpSupervisor {
    server: Arc<dyn DhcpServer>,
    runtime: Handle,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    fatal_tx: mpsc::UnboundedSender<NetError>,
}

impl DhcpSupervisor {
    /// Create a supervisor spawning serve tasks on `runtime`, and the
    /// receiving end of its fatal error channel.
    pub fn new(server: Arc<dyn DhcpServer>, runtime: Handle) -> (Self, mpsc::UnboundedReceiver<NetError>) {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            server,
            runtime,
            tasks: Mutex::new(HashMap::new()),
            fatal_tx,
        };
        (supervisor, fatal_rx)
    }

    /// Start serving `config.name` unless a server is already running there.
    #[instrument(skip_all, fields(iface = %config.name))]
    pub fn ensure_started(&self, config: DhcpConfig) -> Result<()> {
        if config.ipam_disabled {
            debug!("IPAM disabled, not starting DHCP server");
            return Ok(());
        }

        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?;

        if tasks.get(&config.name).is_some_and(|task| !task.is_finished()) {
            debug!("DHCP server already running");
            return Ok(());
        }

        let iface = config.name.clone();
        if let Err(e) = self.server.bind(&config) {
            error!(error = %e, "Failed to start DHCP server");
            return Err(NetError::Fatal(format!(
                "failed to start DHCP server on {}: {}",
                iface, e
            )));
        }

        let server = self.server.clone();
        let fatal_tx = self.fatal_tx.clone();
        let task_iface = iface.clone();
        let handle = self.runtime.spawn(async move {
            if let Err(e) = server.serve(config).await {
                error!(iface = %task_iface, error = %e, "DHCP server failed");
                // The receiver is gone only when the supervisor loop already exited
                let _ = fatal_tx.send(NetError::Fatal(format!(
                    "DHCP server on {} failed: {}",
                    task_iface, e
                )));
            }
        });

        tasks.insert(iface, handle);
        info!("DHCP server started");
        Ok(())
    }

    /// Stop the server of one interface, if any.
    pub fn stop(&self, iface: &str) -> Result<()> {
        let task = self
            .tasks
            .lock()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?
            .remove(iface);

        if let Some(task) = task {
            task.abort();
            info!(iface = %iface, "DHCP server stopped");
        }
        Ok(())
    }

    /// Interfaces with a live serve task, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut running: Vec<String> = self
            .tasks
            .lock()
            .map(|tasks| {
                tasks
                    .iter()
                    .filter(|(_, task)| !task.is_finished())
                    .map(|(iface, _)| iface.clone())
                    .collect()
            })
            .unwrap_or_default();
        running.sort();
        running
    }
}

impl Drop for DhcpSupervisor {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
    }
}
