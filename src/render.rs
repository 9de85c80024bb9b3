use std::collections::BTreeMap;
use std::path::PathBuf;

use log::warn;

use crate::constants::{
    DIR_ETC_NETWORK_INTERFACES_D, FILE_ETC_NETWORK_INTERFACES, INTERFACE_FILE_SUFFIX,
};
use crate::decode::{Route, SubnetFamily};
use crate::graph::LinkKind;
use crate::matcher::{BondDevice, ExistingConfig, MatchedInterface};

const INDENT: &str = "    ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPaths {
    pub interfaces_file: PathBuf,
    pub interfaces_dir: PathBuf,
}

impl Default for RenderPaths {
    fn default() -> Self {
        Self {
            interfaces_file: PathBuf::from(FILE_ETC_NETWORK_INTERFACES),
            interfaces_dir: PathBuf::from(DIR_ETC_NETWORK_INTERFACES_D),
        }
    }
}

impl RenderPaths {
    pub fn interface_path(&self, system_name: &str) -> PathBuf {
        self.interfaces_dir
            .join(format!("{}.{}", system_name, INTERFACE_FILE_SUFFIX))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: String,
}

struct Stanza {
    out: String,
}

impl Stanza {
    fn new(system_name: &str, family: &str, method: &str) -> Self {
        Self {
            out: format!(
                "auto {name}\niface {name} {family} {method}\n",
                name = system_name
            ),
        }
    }

    fn directive(&mut self, directive: &str) {
        self.out.push_str(INDENT);
        self.out.push_str(directive);
        self.out.push('\n');
    }

    fn bond(&mut self, bond: &BondDevice) {
        self.directive(&format!("bond-slaves {}", bond.slaves.join(" ")));
        if let Some(mode) = &bond.params.mode {
            self.directive(&format!("bond-mode {}", mode));
        }
        if let Some(miimon) = bond.params.mii_interval {
            self.directive(&format!("bond-miimon {}", miimon));
        }
        if let Some(policy) = &bond.params.hash_policy {
            self.directive(&format!("bond-xmit-hash-policy {}", policy));
        }
    }

    fn routes(&mut self, system_name: &str, routes: &[Route]) {
        let mut have_gateway = false;
        for route in routes {
            if route.is_default() {
                if have_gateway {
                    warn!(
                        "Ignoring additional default route via {} on {}",
                        route.gateway, system_name
                    );
                    continue;
                }
                self.directive(&format!("gateway {}", route.gateway));
                have_gateway = true;
            } else {
                self.directive(&format!(
                    "post-up route add -net {} netmask {} gw {} || true",
                    route.network, route.netmask, route.gateway
                ));
                self.directive(&format!(
                    "pre-down route del -net {} netmask {} gw {} || true",
                    route.network, route.netmask, route.gateway
                ));
            }
        }
    }
}

pub fn render(iface: &MatchedInterface, paths: &RenderPaths) -> Option<RenderedFile> {
    let name = iface.system_name.as_str();
    let resolved = &iface.resolved;
    let subnet = &resolved.subnet;
    let own_bond = match resolved.kind {
        LinkKind::Bond => iface.bond.as_ref(),
        _ => None,
    };

    let stanza = match &subnet.family {
        SubnetFamily::Ipv4Dhcp => {
            let mut stanza = Stanza::new(name, "inet", "dhcp");
            if let Some(raw_device) = &iface.vlan_raw_device {
                stanza.directive(&format!("vlan-raw-device {}", raw_device));
                // Pin the lease to the VLAN sub-interface's own address.
                stanza.directive(&format!("hw-mac-address {}", resolved.mac_address));
            }
            if let Some(bond) = own_bond {
                stanza.bond(bond);
            }
            if let Some(mtu) = resolved.mtu {
                stanza.directive(&format!("mtu {}", mtu));
            }
            stanza
        }
        SubnetFamily::Ipv4Static | SubnetFamily::Ipv6Static => {
            let family = if subnet.family == SubnetFamily::Ipv6Static {
                "inet6"
            } else {
                "inet"
            };
            let (Some(address), Some(netmask)) = (&subnet.address, &subnet.netmask) else {
                warn!("Not rendering {}: static subnet without address", name);
                return None;
            };
            let mut stanza = Stanza::new(name, family, "static");
            if let Some(raw_device) = &iface.vlan_raw_device {
                stanza.directive(&format!("vlan-raw-device {}", raw_device));
            }
            if let Some(bond) = own_bond {
                stanza.bond(bond);
            }
            stanza.directive(&format!("address {}", address));
            stanza.directive(&format!("netmask {}", netmask));
            if let Some(mtu) = resolved.mtu {
                stanza.directive(&format!("mtu {}", mtu));
            }
            stanza.routes(name, &subnet.routes);
            stanza
        }
        SubnetFamily::Unrecognized(family) => {
            warn!("Not rendering {}: unrecognized subnet type {}", name, family);
            return None;
        }
    };

    Some(RenderedFile {
        path: paths.interface_path(name),
        content: stanza.out,
    })
}

pub fn render_bond_master(bond: &BondDevice, paths: &RenderPaths) -> RenderedFile {
    let mut stanza = Stanza::new(&bond.system_name, "inet", "manual");
    stanza.bond(bond);
    RenderedFile {
        path: paths.interface_path(&bond.system_name),
        content: stanza.out,
    }
}

pub fn render_base(paths: &RenderPaths) -> String {
    format!(
        "auto lo\niface lo inet loopback\nsource {}/*.{}\n",
        paths.interfaces_dir.to_string_lossy(),
        INTERFACE_FILE_SUFFIX
    )
}

pub fn render_all(
    matched: &[MatchedInterface],
    paths: &RenderPaths,
    existing: &dyn ExistingConfig,
) -> BTreeMap<PathBuf, String> {
    let mut files = BTreeMap::new();
    files.insert(paths.interfaces_file.clone(), render_base(paths));

    for iface in matched {
        if let Some(file) = render(iface, paths) {
            files.insert(file.path, file.content);
        }
    }

    for iface in matched {
        let Some(bond) = &iface.bond else {
            continue;
        };
        if iface.resolved.kind != LinkKind::Vlan {
            continue;
        }
        let configured = matched
            .iter()
            .any(|other| other.system_name == bond.system_name);
        if configured || existing.exists(&bond.system_name) {
            continue;
        }
        let file = render_bond_master(bond, paths);
        files.entry(file.path).or_insert(file.content);
    }
    files
}
