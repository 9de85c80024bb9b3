use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::constants::{BOND_NAME_PREFIX, INTERFACE_FILE_SUFFIX};
use crate::decode::{BondSpec, ResolvedInterface, ResolvedTopology};
use crate::graph::{BondParams, LinkKind};
use crate::host::HostInventory;

/// Whether host-native configuration already exists for a system name.
pub trait ExistingConfig {
    fn exists(&self, system_name: &str) -> bool;
}

impl<F> ExistingConfig for F
where
    F: Fn(&str) -> bool,
{
    fn exists(&self, system_name: &str) -> bool {
        self(system_name)
    }
}

/// Looks for `{dir}/{system_name}.cfg`.
#[derive(Clone, Debug)]
pub struct InterfacesDir {
    dir: PathBuf,
}

impl InterfacesDir {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, system_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", system_name, INTERFACE_FILE_SUFFIX))
    }
}

impl ExistingConfig for InterfacesDir {
    fn exists(&self, system_name: &str) -> bool {
        self.path_for(system_name).exists()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BondDevice {
    pub system_name: String,
    pub slaves: Vec<String>,
    pub params: BondParams,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedInterface {
    pub system_name: String,
    /// Device a VLAN is created on.
    pub vlan_raw_device: Option<String>,
    /// For a bond, its own bonding configuration. For a VLAN on a bond, the
    /// bond master the raw device refers to.
    pub bond: Option<BondDevice>,
    pub resolved: ResolvedInterface,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoMatchingHostInterface,
    ExistingConfigPresent,
    DuplicateSystemName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoMatchingHostInterface => "no matching host interface",
            Self::ExistingConfigPresent => "configuration already present",
            Self::DuplicateSystemName => "system name already claimed",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub matched: Vec<MatchedInterface>,
    pub skipped: Vec<(String, SkipReason)>,
}

pub fn bond_system_name(ordinal: usize) -> String {
    format!("{}{}", BOND_NAME_PREFIX, ordinal)
}

fn bond_device(spec: &BondSpec, host: &HostInventory) -> Option<BondDevice> {
    let slaves: Vec<String> = spec
        .members
        .iter()
        .filter_map(|member| {
            let slave = member.mac_address.and_then(|mac| host.lookup(&mac));
            if slave.is_none() {
                debug!("Bond member {} is not present on this host", member.link_id);
            }
            slave.map(String::from)
        })
        .collect();
    if slaves.is_empty() {
        return None;
    }
    Some(BondDevice {
        system_name: bond_system_name(spec.ordinal),
        slaves,
        params: spec.params.clone(),
    })
}

fn host_names(
    iface: &ResolvedInterface,
    host: &HostInventory,
) -> Option<(String, Option<String>, Option<BondDevice>)> {
    match iface.kind {
        LinkKind::Physical => host
            .lookup(&iface.mac_address)
            .map(|name| (name.to_string(), None, None)),
        LinkKind::Bond => {
            let device = bond_device(iface.bond.as_ref()?, host)?;
            Some((device.system_name.clone(), None, Some(device)))
        }
        LinkKind::Vlan => {
            let parent = iface.parent.as_ref()?;
            let tag = iface.vlan_tag?;
            let (raw_device, bond) = match &parent.bond {
                Some(spec) => {
                    let device = bond_device(spec, host)?;
                    (device.system_name.clone(), Some(device))
                }
                None => (host.lookup(&parent.mac_address?)?.to_string(), None),
            };
            Some((format!("{}.{}", raw_device, tag), Some(raw_device), bond))
        }
    }
}

/// The first interface to claim a system name keeps it.
pub fn match_interfaces(
    topology: &ResolvedTopology,
    host: &HostInventory,
    existing: &dyn ExistingConfig,
) -> MatchReport {
    let mut report = MatchReport::default();
    let mut claimed = HashSet::new();

    for iface in topology.iter() {
        let skip = |report: &mut MatchReport, reason: SkipReason| {
            debug!("Skipping link {}: {}", iface.link_id, reason);
            report.skipped.push((iface.link_id.clone(), reason));
        };
        let Some((system_name, vlan_raw_device, bond)) = host_names(iface, host) else {
            skip(&mut report, SkipReason::NoMatchingHostInterface);
            continue;
        };
        if !claimed.insert(system_name.clone()) {
            skip(&mut report, SkipReason::DuplicateSystemName);
            continue;
        }
        if existing.exists(&system_name) {
            skip(&mut report, SkipReason::ExistingConfigPresent);
            continue;
        }
        info!("Matched link {} to {}", iface.link_id, system_name);
        report.matched.push(MatchedInterface {
            system_name,
            vlan_raw_device,
            bond,
            resolved: iface.clone(),
        });
    }
    report
}
