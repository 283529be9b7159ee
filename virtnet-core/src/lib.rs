//! # virtnet core
//!
//! Pod-side network configuration for virtual machines running inside
//! pods, and reconciliation of the interface status reported for them.
//!
//! Setup runs in two phases:
//! - **Phase 1** (privileged, in the pod network namespace): discover the
//!   pod interface and prepare bridges, taps and NAT. Tracked per network
//!   by [`ConfigState`] so it runs at most once.
//! - **Phase 2** (unprivileged, inside the launcher): generate the domain
//!   interface attributes and start the DHCP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          NetConf (per-VM registry)           │
//! └───────────────┬───────────────┬──────────────┘
//!                 ▼               ▼
//!        ┌────────────────┐ ┌───────────────────┐
//!        │  ConfigState   │ │ HotplugController │
//!        └───────┬────────┘ └─────────┬─────────┘
//!                ▼                    ▼
//!        ┌─────────────────────────────────────┐
//!        │   PodNic + binding configurators    │
//!        └───────┬────────────────┬────────────┘
//!                ▼                ▼
//!        ┌────────────────┐ ┌────────────────┐
//!        │ NetworkHandler │ │  CacheFactory  │
//!        └────────────────┘ └────────────────┘
//! ```
//!
//! [`NetStat`] runs independently on every status tick and folds the
//! domain, the pod cache and guest agent data into `Vmi.status`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use virtnet_core::{CacheFactory, NetConf};
//! use virtnet_core::driver::mock::{InProcessNamespaceFactory, MockNetworkHandler};
//!
//! let netconf = NetConf::new(
//!     CacheFactory::new("/var/run/virtnet/cache"),
//!     Arc::new(MockNetworkHandler::new()),
//!     Arc::new(InProcessNamespaceFactory::new()),
//! );
//! netconf.setup(&vmi, &["default".to_string()], Some(launcher_pid), || Ok(()))?;
//! ```

pub mod cache;
pub mod dhcp;
pub mod driver;
pub mod error;
pub mod hotplug;
pub mod namescheme;
pub mod netstat;
pub mod registry;
pub mod setup;
pub mod state;
pub mod types;

pub use cache::{
    Cache, CacheFactory, DhcpConfig, DomainInterfaceEntry, NetworkConfigState, PodInterfaceCacheEntry,
};
pub use dhcp::DhcpSupervisor;
pub use driver::{DhcpServer, NamespaceExecutor, NamespaceFactory, NetworkHandler};
pub use error::{NetError, Result};
pub use hotplug::{HotplugController, HotplugPhase, InterfaceHotplugStatus};
pub use netstat::NetStat;
pub use registry::NetConf;
pub use setup::{NetworkSetup, PodNic};
pub use state::{ConfigState, NetworkStateCache, StateCache, StateSummary};
pub use types::*;
