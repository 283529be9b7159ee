//! Interface status reconciliation.
//!
//! Every status tick folds four sources into `Vmi.status.interfaces`:
//! the domain definition, the pod interface cache, the guest agent and
//! the multus attachment status carried over from the previous round.
//! The primary network is always reported first.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;
use tracing::{debug, instrument};

use crate::cache::{CacheFactory, PodInterfaceCacheEntry};
use crate::error::{NetError, Result};
use crate::types::{Domain, GuestInterface, InfoSource, InterfaceState, InterfaceStatus, LinkState, Vmi};

/// Host devices with this alias prefix are SR-IOV interfaces.
pub const SRIOV_ALIAS_PREFIX: &str = "sriov-";

type VolatileKey = (String, String);

/// Status reconciler for all VMs of a host process.
pub struct NetStat {
    cache: CacheFactory,
    volatile: RwLock<HashMap<VolatileKey, PodInterfaceCacheEntry>>,
}

impl NetStat {
    pub fn new(cache: CacheFactory) -> Self {
        Self {
            cache,
            volatile: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the interface status of `vmi`.
    ///
    /// A missing domain means nothing is known yet; the status is left
    /// untouched.
    #[instrument(skip_all, fields(vmi_uid = %vmi.uid))]
    pub fn update_status(&self, vmi: &mut Vmi, domain: Option<&Domain>) -> Result<()> {
        let Some(domain) = domain else {
            debug!("No domain yet, status unchanged");
            return Ok(());
        };
        let previous = &vmi.status.interfaces;

        let multus_names: Vec<String> = previous
            .iter()
            .filter(|s| s.info_source.contains(InfoSource::MULTUS_STATUS))
            .map(|s| s.name.clone())
            .collect();

        let mut statuses = statuses_from_domain(vmi, domain);
        self.overlay_pod_cache(vmi, &mut statuses)?;
        merge_guest_agent(&mut statuses, &domain.status.interfaces);
        order_primary_first(vmi, previous, &mut statuses);
        overlay_multus_status(&multus_names, &mut statuses);
        restore_pod_interface_names(vmi, previous, &mut statuses);

        vmi.status.interfaces = statuses;
        self.prune_absent(vmi)?;
        Ok(())
    }

    /// Forget everything cached for a VM.
    pub fn teardown(&self, uid: &str) -> Result<()> {
        self.volatile
            .write()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?
            .retain(|(vmi_uid, _), _| vmi_uid != uid);
        Ok(())
    }

    /// Pod interface record, read through the volatile cache. Missing
    /// records are not cached so a later discovery is picked up.
    fn pod_interface(&self, uid: &str, name: &str) -> Result<Option<PodInterfaceCacheEntry>> {
        let key = (uid.to_string(), name.to_string());
        if let Some(entry) = self
            .volatile
            .read()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?
            .get(&key)
        {
            return Ok(Some(entry.clone()));
        }

        let entry = match self.cache.read_pod_interface(uid, name) {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        self.volatile
            .write()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?
            .insert(key, entry.clone());
        Ok(Some(entry))
    }

    fn overlay_pod_cache(&self, vmi: &Vmi, statuses: &mut [InterfaceStatus]) -> Result<()> {
        for status in statuses.iter_mut() {
            if vmi.interface(&status.name).is_none() {
                continue;
            }
            let Some(entry) = self.pod_interface(&vmi.uid, &status.name)? else {
                continue;
            };
            if entry.pod_ip.is_some() {
                status.ip = entry.pod_ip;
                status.ips = entry.pod_ips;
            }
        }
        Ok(())
    }

    fn prune_absent(&self, vmi: &Vmi) -> Result<()> {
        let mut volatile = self
            .volatile
            .write()
            .map_err(|_| NetError::Internal("Lock poisoned".to_string()))?;
        for iface in &vmi.spec.interfaces {
            if iface.state == InterfaceState::Absent
                && volatile.remove(&(vmi.uid.clone(), iface.name.clone())).is_some()
            {
                debug!(iface = %iface.name, "Dropped cached pod interface of absent interface");
            }
        }
        Ok(())
    }
}

fn statuses_from_domain(vmi: &Vmi, domain: &Domain) -> Vec<InterfaceStatus> {
    let devices = &domain.spec.devices;

    let interfaces = devices.interfaces.iter().map(|iface| InterfaceStatus {
        name: iface.alias.clone(),
        mac: iface.mac.clone(),
        queue_count: iface.driver.as_ref().and_then(|d| d.queues).unwrap_or(1),
        link_state: Some(iface.link_state.unwrap_or(LinkState::Up)),
        info_source: InfoSource::DOMAIN,
        ..Default::default()
    });

    let sriov = devices.host_devices.iter().filter_map(|dev| {
        let name = dev.alias.strip_prefix(SRIOV_ALIAS_PREFIX)?;
        Some(InterfaceStatus {
            name: name.to_string(),
            mac: vmi.interface(name).and_then(|i| i.mac_address.clone()),
            queue_count: 0,
            info_source: InfoSource::DOMAIN,
            ..Default::default()
        })
    });

    interfaces.chain(sriov).collect()
}

fn same_mac(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.is_empty() && a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

fn is_ipv6(ip: &str) -> bool {
    let addr = ip.split('/').next().unwrap_or(ip);
    matches!(addr.parse::<IpAddr>(), Ok(IpAddr::V6(_)))
}

fn reported_ips(ip: Option<&String>, ips: &[String]) -> Vec<String> {
    if !ips.is_empty() {
        ips.to_vec()
    } else {
        ip.cloned().into_iter().collect()
    }
}

/// Fill address families the entry does not know yet from the guest
/// report. Known families keep their pod-derived addresses.
fn merge_guest_ips(status: &mut InterfaceStatus, guest: &GuestInterface) {
    let current = reported_ips(status.ip.as_ref(), &status.ips);
    let reported = reported_ips(guest.ip.as_ref(), &guest.ips);

    let (cur_v6, cur_v4): (Vec<String>, Vec<String>) = current.iter().cloned().partition(|ip| is_ipv6(ip));
    let (rep_v6, rep_v4): (Vec<String>, Vec<String>) = reported.iter().cloned().partition(|ip| is_ipv6(ip));

    for (pod, guest_ips) in [(&cur_v4, &rep_v4), (&cur_v6, &rep_v6)] {
        if !pod.is_empty() && !guest_ips.is_empty() && pod != guest_ips {
            debug!(
                network = %status.name,
                pod = ?pod,
                guest = ?guest_ips,
                "Guest agent reports different addresses, keeping pod addresses"
            );
        }
    }

    let v4 = if cur_v4.is_empty() { rep_v4 } else { cur_v4 };
    let v6 = if cur_v6.is_empty() { rep_v6 } else { cur_v6 };

    let v6_first = current
        .first()
        .or(reported.first())
        .map(|ip| is_ipv6(ip))
        .unwrap_or(false);
    let ips: Vec<String> = if v6_first {
        v6.into_iter().chain(v4).collect()
    } else {
        v4.into_iter().chain(v6).collect()
    };

    status.ip = ips.first().cloned();
    status.ips = ips;
}

fn non_empty(name: &Option<String>) -> Option<String> {
    name.as_ref().filter(|n| !n.is_empty()).cloned()
}

fn merge_guest_agent(statuses: &mut Vec<InterfaceStatus>, guest_ifaces: &[GuestInterface]) {
    for guest in guest_ifaces {
        let matched = statuses
            .iter_mut()
            .find(|s| same_mac(s.mac.as_deref(), guest.mac.as_deref()));

        match matched {
            Some(status) => {
                merge_guest_ips(status, guest);
                // Older peers merge guest data upstream and leave the name empty
                if let Some(name) = non_empty(&guest.interface_name) {
                    status.interface_name = Some(name);
                    status.info_source |= InfoSource::GUEST_AGENT;
                }
            }
            None => {
                let ips = reported_ips(guest.ip.as_ref(), &guest.ips);
                statuses.push(InterfaceStatus {
                    name: guest.name.clone().unwrap_or_default(),
                    interface_name: non_empty(&guest.interface_name),
                    ip: ips.first().cloned(),
                    ips,
                    mac: guest.mac.clone(),
                    info_source: InfoSource::GUEST_AGENT,
                    ..Default::default()
                });
            }
        }
    }
}

fn order_primary_first(vmi: &Vmi, previous: &[InterfaceStatus], statuses: &mut Vec<InterfaceStatus>) {
    let Some(primary) = vmi.primary_network() else {
        return;
    };

    match statuses.iter().position(|s| s.name == primary.name) {
        Some(0) => {}
        Some(pos) => {
            let status = statuses.remove(pos);
            statuses.insert(0, status);
        }
        None => {
            if previous.iter().any(|s| s.name == primary.name) {
                statuses.insert(0, InterfaceStatus::new(primary.name.clone()));
            }
        }
    }
}

fn overlay_multus_status(multus_names: &[String], statuses: &mut Vec<InterfaceStatus>) {
    for name in multus_names {
        match statuses.iter_mut().find(|s| &s.name == name) {
            Some(status) => status.info_source |= InfoSource::MULTUS_STATUS,
            None => {
                let mut status = InterfaceStatus::new(name.clone());
                status.info_source = InfoSource::MULTUS_STATUS;
                statuses.push(status);
            }
        }
    }
}

fn restore_pod_interface_names(vmi: &Vmi, previous: &[InterfaceStatus], statuses: &mut [InterfaceStatus]) {
    for status in statuses.iter_mut() {
        if vmi.interface(&status.name).is_none() {
            continue;
        }
        if let Some(pod_name) = previous
            .iter()
            .find(|p| p.name == status.name)
            .and_then(|p| p.pod_interface_name.clone())
        {
            status.pod_interface_name = Some(pod_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NetworkConfigState;
    use crate::types::{
        BindingMethod, DomainInterface, HostDevice, Interface, InterfaceDriver, Network,
    };
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cache: CacheFactory,
        netstat: NetStat,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let cache = CacheFactory::new(dir.path());
            Self {
                netstat: NetStat::new(cache.clone()),
                cache,
                _dir: dir,
            }
        }

        fn cache_pod_ips(&self, uid: &str, network: &str, ips: &[&str]) {
            let entry = PodInterfaceCacheEntry {
                pod_ip: ips.first().map(|ip| ip.to_string()),
                pod_ips: ips.iter().map(|ip| ip.to_string()).collect(),
                state: NetworkConfigState::Finished,
                ..Default::default()
            };
            self.cache.write_pod_interface(uid, network, &entry).unwrap();
        }
    }

    fn domain_iface(alias: &str, mac: &str) -> DomainInterface {
        DomainInterface {
            alias: alias.to_string(),
            mac: Some(mac.to_string()),
            ..Default::default()
        }
    }

    fn domain(ifaces: Vec<DomainInterface>) -> Domain {
        let mut domain = Domain::default();
        domain.spec.devices.interfaces = ifaces;
        domain
    }

    fn guest(mac: &str, name: &str, ips: &[&str]) -> GuestInterface {
        GuestInterface {
            interface_name: Some(name.to_string()),
            mac: Some(mac.to_string()),
            ip: ips.first().map(|ip| ip.to_string()),
            ips: ips.iter().map(|ip| ip.to_string()).collect(),
            ..Default::default()
        }
    }

    fn bridge_vmi() -> Vmi {
        Vmi::new("vm")
            .with_uid("uid-1")
            .with_network(Network::pod("default"), Interface::new("default", BindingMethod::Bridge))
    }

    #[test]
    fn test_single_bridge_network() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        fx.cache_pod_ips("uid-1", "default", &["10.0.0.5"]);
        let domain = domain(vec![domain_iface("default", "AA:BB:CC:DD:EE:FF")]);

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(
            vmi.status.interfaces,
            vec![InterfaceStatus {
                name: "default".to_string(),
                ip: Some("10.0.0.5".to_string()),
                ips: vec!["10.0.0.5".to_string()],
                mac: Some("AA:BB:CC:DD:EE:FF".to_string()),
                info_source: InfoSource::DOMAIN,
                queue_count: 1,
                link_state: Some(LinkState::Up),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_no_domain_leaves_status() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        vmi.status.interfaces = vec![InterfaceStatus::new("default")];
        let before = vmi.clone();

        fx.netstat.update_status(&mut vmi, None).unwrap();
        assert_eq!(vmi, before);
    }

    #[test]
    fn test_primary_first_for_every_order() {
        let networks = [
            (Network::pod("default"), "02:00:00:00:00:01"),
            (Network::multus("blue", "blue-net"), "02:00:00:00:00:02"),
            (Network::multus("red", "red-net"), "02:00:00:00:00:03"),
        ];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let fx = Fixture::new();
            let mut vmi = Vmi::new("vm").with_uid("uid-1");
            let mut ifaces = Vec::new();
            for &i in &order {
                let (network, mac) = &networks[i];
                vmi = vmi.with_network(network.clone(), Interface::new(network.name.clone(), BindingMethod::Bridge));
                let ip = format!("10.0.{}.5", i);
                fx.cache_pod_ips("uid-1", &network.name, &[ip.as_str()]);
                ifaces.push(domain_iface(&network.name, mac));
            }

            fx.netstat.update_status(&mut vmi, Some(&domain(ifaces))).unwrap();

            let names: Vec<&str> = vmi.status.interfaces.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names.len(), 3);
            assert_eq!(names[0], "default", "order {:?}", order);
        }
    }

    #[test]
    fn test_guest_agent_fills_missing_family() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        fx.cache_pod_ips("uid-1", "default", &["1.1.1.1"]);
        let mut domain = domain(vec![domain_iface("default", "02:00:00:00:00:01")]);
        domain.status.interfaces = vec![guest("02:00:00:00:00:01", "eth0", &["fd10::1"])];

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        let status = &vmi.status.interfaces[0];
        assert_eq!(status.ips, vec!["1.1.1.1", "fd10::1"]);
        assert_eq!(status.ip.as_deref(), Some("1.1.1.1"));
        assert_eq!(status.interface_name.as_deref(), Some("eth0"));
        assert_eq!(status.info_source, InfoSource::DOMAIN | InfoSource::GUEST_AGENT);
    }

    #[test]
    fn test_pod_address_wins_over_guest_address() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        fx.cache_pod_ips("uid-1", "default", &["10.0.0.5"]);
        let mut domain = domain(vec![domain_iface("default", "02:00:00:00:00:01")]);
        domain.status.interfaces = vec![guest("02:00:00:00:00:01", "eth0", &["192.168.1.9"])];

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(vmi.status.interfaces[0].ips, vec!["10.0.0.5"]);
    }

    #[test]
    fn test_guest_agent_mac_match_ignores_case() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        let mut domain = domain(vec![domain_iface("default", "AA:BB:CC:DD:EE:FF")]);
        domain.status.interfaces = vec![guest("aa:bb:cc:dd:ee:ff", "eth0", &["10.0.2.2"])];

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(vmi.status.interfaces.len(), 1);
        assert_eq!(vmi.status.interfaces[0].ip.as_deref(), Some("10.0.2.2"));
    }

    #[test]
    fn test_guest_agent_without_interface_name() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        let mut domain = domain(vec![domain_iface("default", "02:00:00:00:00:01")]);
        let mut report = guest("02:00:00:00:00:01", "", &["10.0.2.2"]);
        report.interface_name = None;
        domain.status.interfaces = vec![report];

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        let status = &vmi.status.interfaces[0];
        assert_eq!(status.info_source, InfoSource::DOMAIN);
        assert_eq!(status.ip.as_deref(), Some("10.0.2.2"));
        assert!(status.interface_name.is_none());
    }

    #[test]
    fn test_unmatched_guest_interface_appended() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        let mut domain = domain(vec![domain_iface("default", "02:00:00:00:00:01")]);
        domain.status.interfaces = vec![guest("02:00:00:00:00:99", "eth1", &["172.16.0.4"])];

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(vmi.status.interfaces.len(), 2);
        let extra = &vmi.status.interfaces[1];
        assert_eq!(extra.info_source, InfoSource::GUEST_AGENT);
        assert_eq!(extra.interface_name.as_deref(), Some("eth1"));
        assert_eq!(extra.ip.as_deref(), Some("172.16.0.4"));
    }

    #[test]
    fn test_queue_counts() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi().with_network(
            Network::multus("sriov-net", "sriov-nad"),
            Interface::new("sriov-net", BindingMethod::Sriov).with_mac("02:00:00:00:00:aa"),
        );
        let mut domain = domain(vec![domain_iface("default", "02:00:00:00:00:01")]);
        domain.spec.devices.host_devices = vec![
            HostDevice { alias: "sriov-sriov-net".to_string() },
            HostDevice { alias: "gpu-0".to_string() },
        ];

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(vmi.status.interfaces.len(), 2);
        assert_eq!(vmi.status.interfaces[0].queue_count, 1);
        let sriov = &vmi.status.interfaces[1];
        assert_eq!(sriov.name, "sriov-net");
        assert_eq!(sriov.queue_count, 0);
        assert_eq!(sriov.mac.as_deref(), Some("02:00:00:00:00:aa"));
    }

    #[test]
    fn test_driver_queue_count_and_link_state() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        let mut iface = domain_iface("default", "02:00:00:00:00:01");
        iface.driver = Some(InterfaceDriver { queues: Some(4) });
        iface.link_state = Some(LinkState::Down);

        fx.netstat.update_status(&mut vmi, Some(&domain(vec![iface]))).unwrap();

        assert_eq!(vmi.status.interfaces[0].queue_count, 4);
        assert_eq!(vmi.status.interfaces[0].link_state, Some(LinkState::Down));
    }

    #[test]
    fn test_domain_only_interface_reported_spec_only_not() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi().with_network(
            Network::multus("blue", "blue-net"),
            Interface::new("blue", BindingMethod::Bridge),
        );
        let domain = domain(vec![
            domain_iface("default", "02:00:00:00:00:01"),
            domain_iface("unknown", "02:00:00:00:00:02"),
        ]);

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        let names: Vec<&str> = vmi.status.interfaces.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["default", "unknown"]);
    }

    #[test]
    fn test_primary_placeholder_kept() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi().with_network(
            Network::multus("blue", "blue-net"),
            Interface::new("blue", BindingMethod::Bridge),
        );
        vmi.status.interfaces = vec![InterfaceStatus {
            name: "default".to_string(),
            ip: Some("10.0.0.5".to_string()),
            info_source: InfoSource::DOMAIN,
            ..Default::default()
        }];
        let domain = domain(vec![domain_iface("blue", "02:00:00:00:00:02")]);

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(vmi.status.interfaces[0], InterfaceStatus::new("default"));
        assert_eq!(vmi.status.interfaces[1].name, "blue");
    }

    #[test]
    fn test_multus_status_carried_over() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi()
            .with_network(Network::multus("blue", "blue-net"), Interface::new("blue", BindingMethod::Bridge))
            .with_network(Network::multus("red", "red-net"), Interface::new("red", BindingMethod::Bridge));
        vmi.status.interfaces = vec![
            InterfaceStatus {
                name: "blue".to_string(),
                info_source: InfoSource::MULTUS_STATUS,
                ..Default::default()
            },
            InterfaceStatus {
                name: "red".to_string(),
                info_source: InfoSource::MULTUS_STATUS,
                ..Default::default()
            },
        ];
        let domain = domain(vec![
            domain_iface("default", "02:00:00:00:00:01"),
            domain_iface("blue", "02:00:00:00:00:02"),
        ]);

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        let statuses = &vmi.status.interfaces;
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[1].name, "blue");
        assert_eq!(statuses[1].info_source, InfoSource::DOMAIN | InfoSource::MULTUS_STATUS);
        assert_eq!(statuses[1].mac.as_deref(), Some("02:00:00:00:00:02"));
        let mut red = InterfaceStatus::new("red");
        red.info_source = InfoSource::MULTUS_STATUS;
        assert_eq!(statuses[2], red);
    }

    #[test]
    fn test_pod_interface_name_restored() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        vmi.status.interfaces = vec![InterfaceStatus {
            name: "default".to_string(),
            pod_interface_name: Some("eth0".to_string()),
            ..Default::default()
        }];
        let domain = domain(vec![
            domain_iface("default", "02:00:00:00:00:01"),
            domain_iface("unknown", "02:00:00:00:00:02"),
        ]);

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();
        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(vmi.status.interfaces[0].pod_interface_name.as_deref(), Some("eth0"));
        assert!(vmi.status.interfaces[1].pod_interface_name.is_none());
    }

    #[test]
    fn test_volatile_cache_lifecycle() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi().with_network(
            Network::multus("blue", "blue-net"),
            Interface::new("blue", BindingMethod::Bridge),
        );
        let domain = domain(vec![
            domain_iface("default", "02:00:00:00:00:01"),
            domain_iface("blue", "02:00:00:00:00:02"),
        ]);
        fx.cache_pod_ips("uid-1", "blue", &["10.1.0.5"]);

        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();
        assert_eq!(vmi.status.interfaces[1].ip.as_deref(), Some("10.1.0.5"));

        // Served from memory while the interface stays plugged
        fx.cache_pod_ips("uid-1", "blue", &["10.1.0.6"]);
        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();
        assert_eq!(vmi.status.interfaces[1].ip.as_deref(), Some("10.1.0.5"));

        // Marking it absent drops the cached record
        vmi.spec.interfaces[1].state = InterfaceState::Absent;
        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();
        vmi.spec.interfaces[1].state = InterfaceState::Up;
        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();
        assert_eq!(vmi.status.interfaces[1].ip.as_deref(), Some("10.1.0.6"));
    }

    #[test]
    fn test_teardown_drops_vmi_entries() {
        let fx = Fixture::new();
        let mut vmi = bridge_vmi();
        let domain = domain(vec![domain_iface("default", "02:00:00:00:00:01")]);
        fx.cache_pod_ips("uid-1", "default", &["10.0.0.5"]);
        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        fx.cache_pod_ips("uid-1", "default", &["10.0.0.6"]);
        fx.netstat.teardown("uid-1").unwrap();
        fx.netstat.update_status(&mut vmi, Some(&domain)).unwrap();

        assert_eq!(vmi.status.interfaces[0].ip.as_deref(), Some("10.0.0.6"));
    }
}
