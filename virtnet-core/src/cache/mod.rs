//! Filesystem-backed persistent cache.
//!
//! A cache node is a path under the cache root. A node is either a leaf
//! (a JSON-encoded record stored as a file) or a container (a directory
//! holding sub-entries), never both.
//!
//! ```text
//! <base>/
//! ├── vmi/<uid>/networks/<network>     PodInterfaceCacheEntry
//! └── launcher/<pid>/
//!     ├── dhcp/<iface>                 DhcpConfig
//!     └── domain/<iface>               DomainInterfaceEntry
//! ```

mod entries;

pub use entries::{DhcpConfig, DomainInterfaceEntry, NetworkConfigState, PodInterfaceCacheEntry};

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{NetError, Result};

/// One node of the persistent cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    /// Open the cache rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Namespace into a sub-entry.
    ///
    /// Fails if this node, or any node between it and the sub-entry,
    /// already holds a leaf value.
    pub fn entry(&self, sub_path: impl AsRef<Path>) -> Result<Cache> {
        let target = self.path.join(sub_path.as_ref());

        let mut node = target.parent();
        while let Some(dir) = node {
            if dir.is_file() {
                return Err(NetError::Cache(format!(
                    "cannot create entry {}: {} holds a value",
                    target.display(),
                    dir.display()
                )));
            }
            if dir == self.path {
                break;
            }
            node = dir.parent();
        }

        Ok(Cache { path: target })
    }

    /// Read and decode the record stored at this node.
    pub fn read<T: DeserializeOwned>(&self) -> Result<T> {
        if self.path.is_dir() {
            return Err(NetError::Cache(format!(
                "{} is a container, not a value",
                self.path.display()
            )));
        }

        let content = fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NetError::NotFound(self.path.display().to_string())
            } else {
                NetError::Io(e)
            }
        })?;

        Ok(serde_json::from_slice(&content)?)
    }

    /// Encode and store a record at this node, replacing any previous one.
    ///
    /// The record is written to a temporary sibling and renamed into
    /// place, so readers never observe a partial record.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.path.is_dir() {
            if fs::read_dir(&self.path)?.next().is_some() {
                return Err(NetError::Cache(format!(
                    "cannot write {}: it has child entries",
                    self.path.display()
                )));
            }
            fs::remove_dir(&self.path)?;
        }

        let dir = self
            .path
            .parent()
            .ok_or_else(|| NetError::Cache(format!("invalid cache path {}", self.path.display())))?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| NetError::Cache(format!("invalid cache path {}", self.path.display())))?;
        fs::create_dir_all(dir)?;

        let data = serde_json::to_vec(value)?;
        let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&data)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "Cache entry written");
        Ok(())
    }

    /// Remove this node and everything below it. A missing node is not an error.
    pub fn delete(&self) -> Result<()> {
        let result = if self.path.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builds the well-known cache nodes for VMs and launcher processes.
#[derive(Debug, Clone)]
pub struct CacheFactory {
    root: Cache,
}

impl CacheFactory {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: Cache::new(base_dir),
        }
    }

    pub fn base_dir(&self) -> &Path {
        self.root.path()
    }

    /// The container holding every record of a VM.
    pub fn vmi(&self, uid: &str) -> Result<Cache> {
        self.root.entry(Path::new("vmi").join(uid))
    }

    /// The pod interface record of one VM network.
    pub fn pod_interface(&self, uid: &str, network: &str) -> Result<Cache> {
        self.vmi(uid)?.entry(Path::new("networks").join(network))
    }

    /// The DHCP configuration of one interface, scoped by launcher PID.
    pub fn dhcp(&self, pid: &str, iface: &str) -> Result<Cache> {
        self.root.entry(Path::new("launcher").join(pid).join("dhcp").join(iface))
    }

    /// The domain interface facts of one interface, scoped by launcher PID.
    pub fn domain_interface(&self, pid: &str, iface: &str) -> Result<Cache> {
        self.root.entry(Path::new("launcher").join(pid).join("domain").join(iface))
    }

    pub fn read_pod_interface(&self, uid: &str, network: &str) -> Result<PodInterfaceCacheEntry> {
        self.pod_interface(uid, network)?.read()
    }

    pub fn write_pod_interface(
        &self,
        uid: &str,
        network: &str,
        entry: &PodInterfaceCacheEntry,
    ) -> Result<()> {
        self.pod_interface(uid, network)?.write(entry)
    }

    /// Remove every record of a VM.
    pub fn delete_vmi(&self, uid: &str) -> Result<()> {
        self.vmi(uid)?.delete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BindingMethod, Interface};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_entry() -> PodInterfaceCacheEntry {
        PodInterfaceCacheEntry {
            iface: Some(Interface::new("default", BindingMethod::Bridge)),
            pod_ip: Some("10.0.0.5".to_string()),
            pod_ips: vec!["10.0.0.5".to_string(), "fd00::5".to_string()],
            state: NetworkConfigState::Started,
            pod_interface_name: Some("eth0".to_string()),
        }
    }

    #[test]
    fn test_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let factory = CacheFactory::new(dir.path());
        let entry = sample_entry();

        factory.write_pod_interface("uid-1", "default", &entry).unwrap();
        assert_eq!(factory.read_pod_interface("uid-1", "default").unwrap(), entry);

        factory.pod_interface("uid-1", "default").unwrap().delete().unwrap();
        let err = factory.read_pod_interface("uid-1", "default").unwrap_err();
        assert!(err.is_not_found());

        // Deleting twice is fine
        factory.pod_interface("uid-1", "default").unwrap().delete().unwrap();
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path()).entry("a/b").unwrap();

        cache.write(&1u32).unwrap();
        cache.write(&2u32).unwrap();

        assert_eq!(cache.read::<u32>().unwrap(), 2);
        let names: Vec<_> = fs::read_dir(dir.path().join("a"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[test]
    fn test_entry_under_leaf_fails() {
        let dir = TempDir::new().unwrap();
        let root = Cache::new(dir.path());
        let leaf = root.entry("leaf").unwrap();
        leaf.write(&"value").unwrap();

        assert!(matches!(leaf.entry("child"), Err(NetError::Cache(_))));
        assert!(matches!(root.entry("leaf/child/grandchild"), Err(NetError::Cache(_))));
    }

    #[test]
    fn test_write_over_container_fails() {
        let dir = TempDir::new().unwrap();
        let root = Cache::new(dir.path());
        root.entry("parent/child").unwrap().write(&"value").unwrap();

        let parent = root.entry("parent").unwrap();
        assert!(matches!(parent.write(&"value"), Err(NetError::Cache(_))));
        assert!(matches!(parent.read::<String>(), Err(NetError::Cache(_))));
    }

    #[test]
    fn test_delete_vmi_removes_tree() {
        let dir = TempDir::new().unwrap();
        let factory = CacheFactory::new(dir.path());
        factory.write_pod_interface("uid-1", "a", &sample_entry()).unwrap();
        factory.write_pod_interface("uid-1", "b", &sample_entry()).unwrap();
        factory.write_pod_interface("uid-2", "a", &sample_entry()).unwrap();

        factory.delete_vmi("uid-1").unwrap();

        assert!(factory.read_pod_interface("uid-1", "a").unwrap_err().is_not_found());
        assert!(factory.read_pod_interface("uid-1", "b").unwrap_err().is_not_found());
        assert!(factory.read_pod_interface("uid-2", "a").is_ok());
    }
}
