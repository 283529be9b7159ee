//! VM, network and domain types consumed and produced by the network core.

use bitflags::bitflags;
use ipnet::{Ipv4Net, Ipv6Net};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// A virtual machine instance as seen by the network core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vmi {
    /// Unique ID; scopes every persisted network record
    pub uid: String,
    /// Human-readable name
    pub name: String,
    /// Desired networks and interfaces
    #[serde(default)]
    pub spec: VmiSpec,
    /// Last reported status
    #[serde(default)]
    pub status: VmiStatus,
}

impl Vmi {
    /// Create a VMI with a generated UID and no networks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            name: name.into(),
            spec: VmiSpec::default(),
            status: VmiStatus::default(),
        }
    }

    /// Set the UID.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Add a network together with the interface attached to it.
    pub fn with_network(mut self, network: Network, interface: Interface) -> Self {
        self.spec.networks.push(network);
        self.spec.interfaces.push(interface);
        self
    }

    /// Set the DNS subdomain handed out through DHCP.
    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.spec.subdomain = Some(subdomain.into());
        self
    }

    pub fn network(&self, name: &str) -> Option<&Network> {
        self.spec.networks.iter().find(|n| n.name == name)
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.spec.interfaces.iter().find(|i| i.name == name)
    }

    /// The pod (or default multus) network, if the VM declares one.
    pub fn primary_network(&self) -> Option<&Network> {
        self.spec.networks.iter().find(|n| n.is_primary())
    }

    /// Networks whose interface is not marked absent.
    pub fn plugged_networks(&self) -> Vec<&Network> {
        self.spec
            .networks
            .iter()
            .filter(|n| {
                self.interface(&n.name)
                    .map(|i| i.state != InterfaceState::Absent)
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Desired network configuration of a VMI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmiSpec {
    pub networks: Vec<Network>,
    pub interfaces: Vec<Interface>,
    pub subdomain: Option<String>,
}

/// Reported network status of a VMI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmiStatus {
    pub interfaces: Vec<InterfaceStatus>,
}

/// A network the VM attaches to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Network name, shared with the interface bound to it
    pub name: String,
    #[serde(flatten)]
    pub source: NetworkSource,
}

impl Network {
    /// The pod network with default masquerade CIDRs.
    pub fn pod(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: NetworkSource::Pod(PodNetwork::default()),
        }
    }

    /// A secondary network backed by a multus attachment definition.
    pub fn multus(name: impl Into<String>, network_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: NetworkSource::Multus(MultusNetwork {
                network_name: network_name.into(),
                default: false,
            }),
        }
    }

    /// Whether this network is the VM's primary (pod-default) network.
    pub fn is_primary(&self) -> bool {
        match &self.source {
            NetworkSource::Pod(_) => true,
            NetworkSource::Multus(m) => m.default,
        }
    }
}

/// Where a network comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSource {
    Pod(PodNetwork),
    Multus(MultusNetwork),
}

/// Pod network settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodNetwork {
    /// IPv4 CIDR used inside the VM by masquerade (default 10.0.2.0/24)
    pub vm_network_cidr: Option<Ipv4Net>,
    /// IPv6 CIDR used inside the VM by masquerade (default fd10:0:2::/120)
    pub vm_ipv6_network_cidr: Option<Ipv6Net>,
}

/// Multus network settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultusNetwork {
    /// Network attachment definition name
    pub network_name: String,
    /// Replaces the pod network as the primary network
    #[serde(default)]
    pub default: bool,
}

/// How a VM interface is connected to the pod network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindingMethod {
    /// In-pod bridge; the VM takes over the pod IP
    #[default]
    Bridge,
    /// NAT behind the pod IP
    Masquerade,
    /// User-space networking
    Passt,
    /// MACVTAP device on top of the pod link
    Macvtap,
    /// SR-IOV VF passthrough
    Sriov,
}

impl fmt::Display for BindingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingMethod::Bridge => "bridge",
            BindingMethod::Masquerade => "masquerade",
            BindingMethod::Passt => "passt",
            BindingMethod::Macvtap => "macvtap",
            BindingMethod::Sriov => "sriov",
        };
        f.write_str(s)
    }
}

/// Desired interface state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceState {
    #[default]
    Up,
    Down,
    /// Marked for hot-unplug
    Absent,
}

/// A VM interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    /// Name of the network this interface is bound to
    pub name: String,
    #[serde(default)]
    pub binding: BindingMethod,
    /// Requested guest MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub state: InterfaceState,
}

impl Interface {
    pub fn new(name: impl Into<String>, binding: BindingMethod) -> Self {
        Self {
            name: name.into(),
            binding,
            mac_address: None,
            state: InterfaceState::Up,
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn with_state(mut self, state: InterfaceState) -> Self {
        self.state = state;
        self
    }
}

/// Guest link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Up,
    Down,
}

bitflags! {
    /// Which sources contributed to an interface status entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoSource: u8 {
        const DOMAIN = 0b001;
        const GUEST_AGENT = 0b010;
        const MULTUS_STATUS = 0b100;
    }
}

const INFO_SOURCE_NAMES: [(InfoSource, &str); 3] = [
    (InfoSource::DOMAIN, "domain"),
    (InfoSource::GUEST_AGENT, "guest-agent"),
    (InfoSource::MULTUS_STATUS, "multus-status"),
];

impl fmt::Display for InfoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = INFO_SOURCE_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(", "))
    }
}

impl InfoSource {
    /// Parse the comma separated wire form. Unknown names are ignored.
    pub fn parse(s: &str) -> Self {
        s.split(',')
            .map(str::trim)
            .filter_map(|name| {
                INFO_SOURCE_NAMES
                    .iter()
                    .find(|(_, n)| *n == name)
                    .map(|(flag, _)| *flag)
            })
            .fold(InfoSource::empty(), |acc, flag| acc | flag)
    }
}

impl Serialize for InfoSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InfoSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = InfoSource;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a comma separated list of info sources")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<InfoSource, E> {
                Ok(InfoSource::parse(v))
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

/// Reconciled status of one VM interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceStatus {
    /// Network name
    pub name: String,
    /// Interface name inside the guest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    /// Primary IP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// All IPs, primary first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub queue_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_state: Option<LinkState>,
    pub info_source: InfoSource,
    /// Pod-side device name, set once during setup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_interface_name: Option<String>,
}

impl InterfaceStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Libvirt domain facts relevant to networking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Domain {
    pub spec: DomainSpec,
    pub status: DomainStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSpec {
    pub devices: Devices,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Devices {
    pub interfaces: Vec<DomainInterface>,
    pub host_devices: Vec<HostDevice>,
}

/// An interface device in the domain definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainInterface {
    /// Device alias; equals the network name
    pub alias: String,
    pub mac: Option<String>,
    pub mtu: Option<u32>,
    pub target: Option<InterfaceTarget>,
    pub model: Option<String>,
    pub driver: Option<InterfaceDriver>,
    pub link_state: Option<LinkState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceTarget {
    pub device: String,
    #[serde(default)]
    pub managed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceDriver {
    /// Configured multi-queue count
    pub queues: Option<u32>,
}

/// A passthrough host device in the domain definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostDevice {
    pub alias: String,
}

/// Runtime domain status as reported by the guest agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainStatus {
    pub interfaces: Vec<GuestInterface>,
}

/// One interface as reported by the guest agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestInterface {
    /// Network name, only present when merged upstream by an older peer
    pub name: Option<String>,
    /// Interface name inside the guest; empty for older peers
    pub interface_name: Option<String>,
    pub mac: Option<String>,
    pub ip: Option<String>,
    pub ips: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_source_wire_form() {
        let all = InfoSource::DOMAIN | InfoSource::GUEST_AGENT | InfoSource::MULTUS_STATUS;
        assert_eq!(all.to_string(), "domain, guest-agent, multus-status");
        assert_eq!(InfoSource::parse("domain, guest-agent, multus-status"), all);
        assert_eq!(
            InfoSource::parse("multus-status,bogus,domain"),
            InfoSource::DOMAIN | InfoSource::MULTUS_STATUS
        );
        assert_eq!(InfoSource::parse(""), InfoSource::empty());

        let json = serde_json::to_string(&(InfoSource::DOMAIN | InfoSource::GUEST_AGENT)).unwrap();
        assert_eq!(json, "\"domain, guest-agent\"");
    }

    #[test]
    fn test_network_json_shape() {
        let json = r#"[
            {"name": "default", "pod": {}},
            {"name": "blue", "multus": {"network_name": "ns/blue"}}
        ]"#;
        let networks: Vec<Network> = serde_json::from_str(json).unwrap();
        assert!(networks[0].is_primary());
        assert!(!networks[1].is_primary());
        assert_eq!(networks[1], Network::multus("blue", "ns/blue"));
    }

    #[test]
    fn test_plugged_networks_skip_absent() {
        let vmi = Vmi::new("vm")
            .with_network(Network::pod("default"), Interface::new("default", BindingMethod::Masquerade))
            .with_network(
                Network::multus("blue", "blue-net"),
                Interface::new("blue", BindingMethod::Bridge).with_state(InterfaceState::Absent),
            );

        let plugged: Vec<&str> = vmi.plugged_networks().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(plugged, vec!["default"]);
        assert_eq!(vmi.primary_network().map(|n| n.name.as_str()), Some("default"));
    }
}
