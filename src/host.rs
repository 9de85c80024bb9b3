use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Result, anyhow};
use log::{debug, warn};
use rustix::fs::Dir;

use crate::mac::MacAddress;

/// A network interface present on the running host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostInterface {
    pub mac_address: MacAddress,
    pub system_name: String,
}

pub fn is_excluded<S: AsRef<str>>(system_name: &str, prefixes: &[S]) -> bool {
    prefixes
        .iter()
        .any(|p| system_name.starts_with(p.as_ref()))
}

/// Interfaces are taken in system name order; the first with a MAC owns it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostInventory {
    by_mac: BTreeMap<MacAddress, String>,
}

impl HostInventory {
    pub fn new<I, S>(interfaces: I, excluded_prefixes: &[S]) -> Self
    where
        I: IntoIterator<Item = HostInterface>,
        S: AsRef<str>,
    {
        let mut interfaces: Vec<HostInterface> = interfaces
            .into_iter()
            .filter(|iface| {
                let excluded = is_excluded(&iface.system_name, excluded_prefixes);
                if excluded {
                    debug!("Ignoring excluded host interface {}", iface.system_name);
                }
                !excluded
            })
            .collect();
        interfaces.sort_by(|a, b| a.system_name.cmp(&b.system_name));

        let mut by_mac = BTreeMap::new();
        for iface in interfaces {
            if let Some(owner) = by_mac.get(&iface.mac_address) {
                warn!(
                    "Host interfaces {} and {} share MAC {}, using {}",
                    owner, iface.system_name, iface.mac_address, owner
                );
                continue;
            }
            by_mac.insert(iface.mac_address, iface.system_name);
        }
        Self { by_mac }
    }

    pub fn lookup(&self, mac: &MacAddress) -> Option<&str> {
        self.by_mac.get(mac).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_mac.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mac.is_empty()
    }
}

pub fn read_sysfs<P: AsRef<Path>>(sys_class_net: P) -> Result<Vec<HostInterface>> {
    let root = sys_class_net.as_ref();
    let fd = File::open(root).map_err(|e| anyhow!("unable to open {:?}: {}", root, e))?;
    let dir =
        Dir::read_from(&fd).map_err(|e| anyhow!("unable to read directory {:?}: {}", root, e))?;

    let mut interfaces = Vec::new();
    for entry_res in dir {
        let entry =
            entry_res.map_err(|e| anyhow!("unable to read directory entry in {:?}: {}", root, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "." || name == ".." {
            continue;
        }
        let address_path = root.join(&name).join("address");
        let address = match fs::read_to_string(&address_path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(anyhow!("unable to read {:?}: {}", address_path, e)),
        };
        match address.parse::<MacAddress>() {
            Ok(mac_address) => interfaces.push(HostInterface {
                mac_address,
                system_name: name,
            }),
            Err(_) => debug!("Skipping {}: no Ethernet address", name),
        }
    }
    Ok(interfaces)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::constants::EXCLUDED_INTERFACE_PREFIXES;

    fn iface(name: &str, mac: &str) -> HostInterface {
        HostInterface {
            mac_address: mac.parse().unwrap(),
            system_name: name.into(),
        }
    }

    macro_rules! case__is_excluded {
        ($name:ident, $input:expr, $expected:expr) => {
            #[test]
            fn $name() {
                assert_eq!($expected, is_excluded($input, EXCLUDED_INTERFACE_PREFIXES));
            }
        };
    }

    case__is_excluded!(test_is_excluded_lo, "lo", true);
    case__is_excluded!(test_is_excluded_bond, "bond0", true);
    case__is_excluded!(test_is_excluded_bonding_master, "bonding_masters", true);
    case__is_excluded!(test_is_excluded_sit, "sit0", true);
    case__is_excluded!(test_is_excluded_tunl, "tunl0", true);
    case__is_excluded!(test_is_excluded_ip6tnl, "ip6tnl0", true);
    case__is_excluded!(test_is_excluded_eth, "eth0", false);
    case__is_excluded!(test_is_excluded_ens, "ens3f0", false);

    #[test]
    fn test_inventory_lookup_and_exclusion() {
        let inventory = HostInventory::new(
            vec![
                iface("eth0", "52:54:00:11:22:33"),
                iface("bond0", "52:54:00:11:22:44"),
                iface("lo", "00:00:00:00:00:00"),
            ],
            EXCLUDED_INTERFACE_PREFIXES,
        );
        assert_eq!(inventory.len(), 1);
        assert_eq!(
            inventory.lookup(&"52:54:00:11:22:33".parse().unwrap()),
            Some("eth0")
        );
        assert_eq!(inventory.lookup(&"52:54:00:11:22:44".parse().unwrap()), None);
    }

    #[test]
    fn test_inventory_duplicate_mac_first_by_name() {
        let inventory = HostInventory::new(
            vec![
                iface("eth1", "52:54:00:11:22:33"),
                iface("eth0", "52:54:00:11:22:33"),
            ],
            EXCLUDED_INTERFACE_PREFIXES,
        );
        assert_eq!(
            inventory.lookup(&"52:54:00:11:22:33".parse().unwrap()),
            Some("eth0")
        );
    }

    #[test]
    fn test_read_sysfs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for (name, address) in [
            ("eth0", Some("52:54:00:11:22:33\n")),
            ("lo", Some("00:00:00:00:00:00\n")),
            ("ib0", Some("80:00:02:08:fe:80:00:00:00:00:00:00:00:02:c9:03:00:0a:bb:cc\n")),
            ("weird", None),
        ] {
            fs::create_dir(root.join(name)).unwrap();
            if let Some(address) = address {
                fs::write(root.join(name).join("address"), address).unwrap();
            }
        }
        let mut interfaces = read_sysfs(root).unwrap();
        interfaces.sort_by(|a, b| a.system_name.cmp(&b.system_name));
        assert_eq!(
            interfaces,
            vec![
                iface("eth0", "52:54:00:11:22:33"),
                iface("lo", "00:00:00:00:00:00"),
            ]
        );
    }

    #[test]
    fn test_read_sysfs_missing_root() {
        assert!(read_sysfs("/nonexistent/sys/class/net").is_err());
    }
}
