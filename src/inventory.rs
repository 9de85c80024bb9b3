use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::mac::MacAddress;
use crate::topology::RouteRecord;

/// Where a physical port is cabled on the switch side.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct LocalLinkConnection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_info: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Port {
    pub id: String,
    pub mac_address: MacAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_link_connection: Option<LocalLinkConnection>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PortGroup {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmit_hash_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miimon: Option<u32>,
}

/// A port or port group that virtual interfaces are bound to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BindingTarget {
    Port(String),
    PortGroup(String),
}

impl BindingTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Port(id) | Self::PortGroup(id) => id,
        }
    }
}

impl fmt::Display for BindingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(id) => write!(f, "port {}", id),
            Self::PortGroup(id) => write!(f, "port group {}", id),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttachmentSubnet {
    #[default]
    Dhcp,
    Static {
        address: String,
        netmask: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        routes: Vec<RouteRecord>,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct VirtualAttachment {
    pub vif_id: String,
    pub segmentation_id: u16,
    pub target: BindingTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default)]
    pub subnet: AttachmentSubnet,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Inventory {
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub port_groups: Vec<PortGroup>,
    #[serde(default)]
    pub attachments: Vec<VirtualAttachment>,
}

impl Inventory {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| anyhow!("unable to read {:?}: {}", path, e))?;
        Self::from_string(&data).map_err(|e| anyhow!("unable to parse {:?}: {}", path, e))
    }

    pub fn from_string(value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(|e| anyhow!("invalid inventory: {}", e))
    }

    pub fn port(&self, id: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    pub fn port_group(&self, id: &str) -> Option<&PortGroup> {
        self.port_groups.iter().find(|g| g.id == id)
    }

    /// Member ports of a group, in inventory order.
    pub fn members<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a Port> + 'a {
        self.ports
            .iter()
            .filter(move |p| p.port_group_id.as_deref() == Some(group_id))
    }

    pub fn contains(&self, target: &BindingTarget) -> bool {
        match target {
            BindingTarget::Port(id) => self.port(id).is_some(),
            BindingTarget::PortGroup(id) => self.port_group(id).is_some(),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_inventory_from_string() {
        let inventory = Inventory::from_string(
            r#"{
                "ports": [
                    {
                        "id": "p0",
                        "mac_address": "52:54:00:AA:00:01",
                        "port_group_id": "pg0",
                        "local_link_connection": {"switch_id": "0a:1b:2c:3d:4e:5f", "port_id": "Eth1/1"}
                    },
                    {"id": "p1", "mac_address": "52:54:00:aa:00:02", "port_group_id": "pg0"},
                    {"id": "p2", "mac_address": "52:54:00:aa:00:03"}
                ],
                "port_groups": [{"id": "pg0", "mode": "802.3ad", "miimon": 100}],
                "attachments": [
                    {"vif_id": "vif-a", "segmentation_id": 100, "target": {"port_group": "pg0"}},
                    {
                        "vif_id": "vif-b",
                        "segmentation_id": 200,
                        "target": {"port": "p2"},
                        "network_id": "net-b",
                        "subnet": {"type": "static", "address": "10.0.0.5", "netmask": "255.255.255.0"}
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(inventory.ports.len(), 3);
        assert_eq!(
            inventory.ports[0].mac_address.to_string(),
            "52:54:00:aa:00:01"
        );
        assert_eq!(
            inventory.ports[0]
                .local_link_connection
                .as_ref()
                .and_then(|c| c.port_id.as_deref()),
            Some("Eth1/1")
        );
        assert_eq!(
            inventory.members("pg0").map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p0", "p1"]
        );
        assert_eq!(inventory.attachments[0].subnet, AttachmentSubnet::Dhcp);
        assert_eq!(
            inventory.attachments[0].target,
            BindingTarget::PortGroup("pg0".into())
        );
        assert_eq!(
            inventory.attachments[1].subnet,
            AttachmentSubnet::Static {
                address: "10.0.0.5".into(),
                netmask: "255.255.255.0".into(),
                routes: vec![],
            }
        );
        assert!(inventory.contains(&BindingTarget::Port("p2".into())));
        assert!(!inventory.contains(&BindingTarget::PortGroup("p2".into())));
    }

    #[test]
    fn test_inventory_invalid_mac() {
        assert!(
            Inventory::from_string(r#"{"ports": [{"id": "p0", "mac_address": "nope"}]}"#).is_err()
        );
    }

    #[test]
    fn test_binding_target_display() {
        assert_eq!(BindingTarget::Port("p0".into()).to_string(), "port p0");
        assert_eq!(
            BindingTarget::PortGroup("pg0".into()).to_string(),
            "port group pg0"
        );
    }
}
