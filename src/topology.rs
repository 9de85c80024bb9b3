use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

pub const LINK_TYPE_PHY: &str = "phy";
pub const LINK_TYPE_BOND: &str = "bond";
pub const LINK_TYPE_VLAN: &str = "vlan";

pub const NETWORK_TYPE_IPV4: &str = "ipv4";
pub const NETWORK_TYPE_IPV4_DHCP: &str = "ipv4_dhcp";
pub const NETWORK_TYPE_IPV6: &str = "ipv6";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NetworkData {
    #[serde(default)]
    pub links: Vec<LinkRecord>,
    #[serde(default)]
    pub networks: Vec<NetworkRecord>,
}

impl NetworkData {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| anyhow!("unable to read {:?}: {}", path, e))?;
        Self::from_string(&data).map_err(|e| anyhow!("unable to parse {:?}: {}", path, e))
    }

    pub fn from_string(value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(|e| anyhow!("invalid network data: {}", e))
    }

    pub fn to_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow!("unable to serialize network data: {}", e))
    }
}

/// `type` stays a plain string so unknown link kinds still parse.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct LinkRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub link_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethernet_mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bond_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_xmit_hash_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_miimon: Option<u32>,
}

/// One entry of `networks`, i.e. a subnet attached to a link.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NetworkRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub link: String,
    #[serde(rename = "type")]
    pub network_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteRecord>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteRecord {
    pub network: String,
    pub netmask: String,
    pub gateway: String,
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    const CONFIG_DRIVE_SAMPLE: &str = r#"{
        "links": [
            {"id": "tap0", "type": "phy", "ethernet_mac_address": "fa:16:3e:9c:bf:3d", "mtu": 9000, "vif_id": "x"},
            {"id": "bond0", "type": "bond", "bond_links": ["tap0"], "bond_mode": "802.3ad",
             "bond_xmit_hash_policy": "layer3+4", "bond_miimon": 100,
             "ethernet_mac_address": "fa:16:3e:9c:bf:3d"},
            {"id": "vlan0", "type": "vlan", "vlan_link": "bond0", "vlan_id": 101,
             "vlan_mac_address": "fa:16:3e:9c:bf:3d"},
            {"id": "br0", "type": "bridge"}
        ],
        "networks": [
            {"id": "network0", "link": "vlan0", "type": "ipv4", "ip_address": "10.0.0.5",
             "netmask": "255.255.255.0", "network_id": "net-a",
             "routes": [{"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.0.1"}]}
        ],
        "services": [{"type": "dns", "address": "8.8.8.8"}]
    }"#;

    #[test]
    fn test_network_data_from_string() {
        let data = NetworkData::from_string(CONFIG_DRIVE_SAMPLE).unwrap();
        assert_eq!(data.links.len(), 4);
        assert_eq!(data.links[0].link_type, LINK_TYPE_PHY);
        assert_eq!(data.links[0].mtu, Some(9000));
        assert_eq!(data.links[1].bond_links, vec!["tap0".to_string()]);
        assert_eq!(data.links[1].bond_miimon, Some(100));
        assert_eq!(data.links[2].vlan_link.as_deref(), Some("bond0"));
        assert_eq!(data.links[2].vlan_id, Some(101));
        assert_eq!(data.links[3].link_type, "bridge");
        assert_eq!(
            data.networks[0].routes,
            vec![RouteRecord {
                network: "0.0.0.0".into(),
                netmask: "0.0.0.0".into(),
                gateway: "10.0.0.1".into(),
            }]
        );
    }

    #[test]
    fn test_network_data_missing_sections() {
        let data = NetworkData::from_string("{}").unwrap();
        assert_eq!(data, NetworkData::default());
    }

    #[test]
    fn test_network_data_invalid() {
        assert!(NetworkData::from_string("{\"links\": 1}").is_err());
    }

    #[test]
    fn test_link_record_serialization_skips_empty() {
        let record = LinkRecord {
            id: "port-1".into(),
            link_type: LINK_TYPE_PHY.into(),
            ethernet_mac_address: Some("52:54:00:11:22:33".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"id":"port-1","type":"phy","ethernet_mac_address":"52:54:00:11:22:33"}"#
        );
    }
}
