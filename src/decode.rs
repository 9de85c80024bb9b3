use std::collections::HashSet;
use std::net::IpAddr;

use log::{debug, warn};

use crate::error::TopologyError;
use crate::graph::{BondParams, Link, LinkGraph, LinkKind};
use crate::mac::MacAddress;
use crate::topology::{
    NETWORK_TYPE_IPV4, NETWORK_TYPE_IPV4_DHCP, NETWORK_TYPE_IPV6, NetworkData, NetworkRecord,
    RouteRecord,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubnetFamily {
    Ipv4Static,
    Ipv4Dhcp,
    Ipv6Static,
    Unrecognized(String),
}

impl SubnetFamily {
    pub fn from_wire(network_type: &str) -> Self {
        match network_type {
            NETWORK_TYPE_IPV4 => Self::Ipv4Static,
            NETWORK_TYPE_IPV4_DHCP => Self::Ipv4Dhcp,
            NETWORK_TYPE_IPV6 => Self::Ipv6Static,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Ipv4Static => NETWORK_TYPE_IPV4,
            Self::Ipv4Dhcp => NETWORK_TYPE_IPV4_DHCP,
            Self::Ipv6Static => NETWORK_TYPE_IPV6,
            Self::Unrecognized(other) => other,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Self::Ipv4Static | Self::Ipv6Static)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub network: String,
    pub netmask: String,
    pub gateway: String,
}

impl Route {
    /// A route to the all-zero network with an all-zero netmask.
    pub fn is_default(&self) -> bool {
        let unspecified = |s: &str| {
            s.parse::<IpAddr>()
                .map(|ip| ip.is_unspecified())
                .unwrap_or(false)
        };
        unspecified(&self.network) && unspecified(&self.netmask)
    }
}

impl From<&RouteRecord> for Route {
    fn from(record: &RouteRecord) -> Self {
        Self {
            network: record.network.clone(),
            netmask: record.netmask.clone(),
            gateway: record.gateway.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subnet {
    pub family: SubnetFamily,
    pub address: Option<String>,
    pub netmask: Option<String>,
    pub routes: Vec<Route>,
    pub network_id: Option<String>,
}

impl From<&NetworkRecord> for Subnet {
    fn from(record: &NetworkRecord) -> Self {
        Self {
            family: SubnetFamily::from_wire(&record.network_type),
            address: record.ip_address.clone(),
            netmask: record.netmask.clone(),
            routes: record.routes.iter().map(Route::from).collect(),
            network_id: record.network_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BondMember {
    pub link_id: String,
    pub mac_address: Option<MacAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BondSpec {
    /// Position among the document's bonds; the host device is `bond{ordinal}`.
    pub ordinal: usize,
    pub members: Vec<BondMember>,
    pub params: BondParams,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentLink {
    pub link_id: String,
    pub kind: LinkKind,
    pub mac_address: Option<MacAddress>,
    pub bond: Option<BondSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedInterface {
    pub link_id: String,
    pub kind: LinkKind,
    pub mac_address: MacAddress,
    pub mtu: Option<u32>,
    pub parent: Option<ParentLink>,
    pub vlan_tag: Option<u16>,
    pub bond: Option<BondSpec>,
    pub subnet: Subnet,
}

/// Decoded interfaces in the order their subnets were declared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedTopology {
    interfaces: Vec<ResolvedInterface>,
}

impl ResolvedTopology {
    pub fn get(&self, link_id: &str) -> Option<&ResolvedInterface> {
        self.interfaces.iter().find(|i| i.link_id == link_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedInterface> {
        self.interfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

impl IntoIterator for ResolvedTopology {
    type Item = ResolvedInterface;
    type IntoIter = std::vec::IntoIter<ResolvedInterface>;

    fn into_iter(self) -> Self::IntoIter {
        self.interfaces.into_iter()
    }
}

/// Every VLAN parent and bond member is resolved before any subnet is read.
pub fn decode(data: &NetworkData) -> Result<ResolvedTopology, TopologyError> {
    let graph = LinkGraph::build(&data.links)?;

    for link in graph.links() {
        match link.kind {
            LinkKind::Vlan => {
                graph.resolve_parent(link)?;
            }
            LinkKind::Bond => {
                graph.members(link)?;
            }
            LinkKind::Physical => {}
        }
    }

    let mut interfaces = Vec::new();
    let mut configured = HashSet::new();
    for network in &data.networks {
        let Some(link) = graph.get(&network.link) else {
            warn!(
                "Dropping subnet for unknown link {}: no physical, bond or VLAN link with that id",
                network.link
            );
            continue;
        };
        if !configured.insert(link.id.as_str()) {
            warn!(
                "Dropping additional subnet for link {}: only the first is configured",
                link.id
            );
            continue;
        }
        let subnet = Subnet::from(network);
        if subnet.family.is_static() && (subnet.address.is_none() || subnet.netmask.is_none()) {
            return Err(TopologyError::IncompleteStaticSubnet {
                link: link.id.clone(),
            });
        }
        let Some(mac_address) = graph.effective_mac(link)? else {
            warn!("Dropping link {}: no MAC address to match it by", link.id);
            continue;
        };
        debug!("Resolved {} link {} with MAC {}", link.kind, link.id, mac_address);
        interfaces.push(resolve(&graph, link, mac_address, subnet)?);
    }

    Ok(ResolvedTopology { interfaces })
}

fn resolve(
    graph: &LinkGraph,
    link: &Link,
    mac_address: MacAddress,
    subnet: Subnet,
) -> Result<ResolvedInterface, TopologyError> {
    let parent = match link.kind {
        LinkKind::Vlan => {
            let parent = graph.resolve_parent(link)?;
            Some(ParentLink {
                link_id: parent.id.clone(),
                kind: parent.kind,
                mac_address: graph.effective_mac(parent)?,
                bond: bond_spec(graph, parent)?,
            })
        }
        _ => None,
    };
    Ok(ResolvedInterface {
        link_id: link.id.clone(),
        kind: link.kind,
        mac_address,
        mtu: link.mtu,
        parent,
        vlan_tag: link.vlan_tag,
        bond: bond_spec(graph, link)?,
        subnet,
    })
}

fn bond_spec(graph: &LinkGraph, link: &Link) -> Result<Option<BondSpec>, TopologyError> {
    if link.kind != LinkKind::Bond {
        return Ok(None);
    }
    let members = graph
        .members(link)?
        .into_iter()
        .map(|member| BondMember {
            link_id: member.id.clone(),
            mac_address: member.mac_address,
        })
        .collect();
    Ok(Some(BondSpec {
        ordinal: graph.bond_ordinal(&link.id).unwrap_or_default(),
        members,
        params: link.bond.clone(),
    }))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::topology::{LINK_TYPE_BOND, LINK_TYPE_PHY, LINK_TYPE_VLAN, LinkRecord};

    fn phy(id: &str, mac: &str) -> LinkRecord {
        LinkRecord {
            id: id.into(),
            link_type: LINK_TYPE_PHY.into(),
            ethernet_mac_address: Some(mac.into()),
            ..Default::default()
        }
    }

    fn vlan(id: &str, parent: &str, tag: u16) -> LinkRecord {
        LinkRecord {
            id: id.into(),
            link_type: LINK_TYPE_VLAN.into(),
            vlan_link: Some(parent.into()),
            vlan_id: Some(tag),
            ..Default::default()
        }
    }

    fn dhcp(link: &str) -> NetworkRecord {
        NetworkRecord {
            link: link.into(),
            network_type: NETWORK_TYPE_IPV4_DHCP.into(),
            ..Default::default()
        }
    }

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    macro_rules! case__route__is_default {
        ($name:ident, $network:expr, $netmask:expr, $expected:expr) => {
            #[test]
            fn $name() {
                let route = Route {
                    network: $network.into(),
                    netmask: $netmask.into(),
                    gateway: "10.0.0.1".into(),
                };
                assert_eq!($expected, route.is_default());
            }
        };
    }

    case__route__is_default!(test_route_default_v4, "0.0.0.0", "0.0.0.0", true);
    case__route__is_default!(test_route_default_v6, "::", "::", true);
    case__route__is_default!(test_route_network_only, "0.0.0.0", "255.0.0.0", false);
    case__route__is_default!(test_route_subnet, "10.1.0.0", "255.255.0.0", false);
    case__route__is_default!(test_route_garbage, "default", "0.0.0.0", false);

    #[test]
    fn test_decode_static_physical() {
        let data = NetworkData {
            links: vec![phy("L1", "52:54:00:11:22:33")],
            networks: vec![NetworkRecord {
                id: Some("network0".into()),
                link: "L1".into(),
                network_type: NETWORK_TYPE_IPV4.into(),
                ip_address: Some("10.0.0.5".into()),
                netmask: Some("255.255.255.0".into()),
                network_id: Some("net-a".into()),
                routes: vec![RouteRecord {
                    network: "0.0.0.0".into(),
                    netmask: "0.0.0.0".into(),
                    gateway: "10.0.0.1".into(),
                }],
            }],
        };
        let topology = decode(&data).unwrap();
        assert_eq!(topology.len(), 1);
        assert_eq!(
            topology.get("L1").unwrap(),
            &ResolvedInterface {
                link_id: "L1".into(),
                kind: LinkKind::Physical,
                mac_address: mac("52:54:00:11:22:33"),
                mtu: None,
                parent: None,
                vlan_tag: None,
                bond: None,
                subnet: Subnet {
                    family: SubnetFamily::Ipv4Static,
                    address: Some("10.0.0.5".into()),
                    netmask: Some("255.255.255.0".into()),
                    routes: vec![Route {
                        network: "0.0.0.0".into(),
                        netmask: "0.0.0.0".into(),
                        gateway: "10.0.0.1".into(),
                    }],
                    network_id: Some("net-a".into()),
                },
            }
        );
    }

    #[test]
    fn test_decode_vlan_inherits_parent_mac() {
        let data = NetworkData {
            links: vec![phy("p0", "52:54:00:11:22:33"), vlan("v0", "p0", 100)],
            networks: vec![dhcp("v0")],
        };
        let topology = decode(&data).unwrap();
        let v0 = topology.get("v0").unwrap();
        assert_eq!(v0.kind, LinkKind::Vlan);
        assert_eq!(v0.vlan_tag, Some(100));
        assert_eq!(v0.mac_address, mac("52:54:00:11:22:33"));
        let parent = v0.parent.as_ref().unwrap();
        assert_eq!(parent.link_id, "p0");
        assert_eq!(parent.kind, LinkKind::Physical);
        assert_eq!(parent.mac_address, Some(mac("52:54:00:11:22:33")));
        // The physical parent carries no subnet, so it is not configured itself.
        assert!(topology.get("p0").is_none());
    }

    #[test]
    fn test_decode_vlan_on_bond() {
        let data = NetworkData {
            links: vec![
                phy("p0", "52:54:00:00:00:01"),
                phy("p1", "52:54:00:00:00:02"),
                LinkRecord {
                    id: "b0".into(),
                    link_type: LINK_TYPE_BOND.into(),
                    bond_links: vec!["p0".into(), "p1".into()],
                    bond_mode: Some("802.3ad".into()),
                    bond_xmit_hash_policy: Some("layer3+4".into()),
                    bond_miimon: Some(100),
                    ..Default::default()
                },
                vlan("v0", "b0", 200),
            ],
            networks: vec![dhcp("v0")],
        };
        let topology = decode(&data).unwrap();
        let v0 = topology.get("v0").unwrap();
        assert_eq!(v0.mac_address, mac("52:54:00:00:00:01"));
        let bond = v0.parent.as_ref().unwrap().bond.as_ref().unwrap();
        assert_eq!(bond.ordinal, 0);
        assert_eq!(
            bond.members
                .iter()
                .map(|m| m.link_id.as_str())
                .collect::<Vec<_>>(),
            vec!["p0", "p1"]
        );
        assert_eq!(
            bond.params,
            BondParams {
                mode: Some("802.3ad".into()),
                hash_policy: Some("layer3+4".into()),
                mii_interval: Some(100),
            }
        );
    }

    #[test]
    fn test_decode_unresolved_parent() {
        let data = NetworkData {
            links: vec![phy("p0", "52:54:00:11:22:33"), vlan("v0", "missing", 100)],
            networks: vec![dhcp("p0"), dhcp("v0")],
        };
        assert_eq!(
            decode(&data).unwrap_err(),
            TopologyError::UnresolvedParent {
                link: "v0".into(),
                parent: "missing".into()
            }
        );
    }

    #[test]
    fn test_decode_unresolved_parent_without_subnet() {
        let data = NetworkData {
            links: vec![phy("p0", "52:54:00:11:22:33"), vlan("v0", "missing", 100)],
            networks: vec![dhcp("p0")],
        };
        assert!(matches!(
            decode(&data).unwrap_err(),
            TopologyError::UnresolvedParent { .. }
        ));
    }

    #[test]
    fn test_decode_drops_unknown_link_reference() {
        let data = NetworkData {
            links: vec![
                phy("p0", "52:54:00:11:22:33"),
                LinkRecord {
                    id: "ovs0".into(),
                    link_type: "ovs".into(),
                    ..Default::default()
                },
            ],
            networks: vec![dhcp("ovs0"), dhcp("nowhere"), dhcp("p0")],
        };
        let topology = decode(&data).unwrap();
        assert_eq!(
            topology.iter().map(|i| i.link_id.as_str()).collect::<Vec<_>>(),
            vec!["p0"]
        );
    }

    #[test]
    fn test_decode_first_subnet_wins() {
        let mut second = dhcp("p0");
        second.network_type = NETWORK_TYPE_IPV6.into();
        second.ip_address = Some("fd00::5".into());
        second.netmask = Some("ffff:ffff:ffff:ffff::".into());
        let data = NetworkData {
            links: vec![phy("p0", "52:54:00:11:22:33")],
            networks: vec![dhcp("p0"), second],
        };
        let topology = decode(&data).unwrap();
        assert_eq!(topology.len(), 1);
        assert_eq!(
            topology.get("p0").unwrap().subnet.family,
            SubnetFamily::Ipv4Dhcp
        );
    }

    #[test]
    fn test_decode_incomplete_static() {
        let mut network = dhcp("p0");
        network.network_type = NETWORK_TYPE_IPV4.into();
        network.ip_address = Some("10.0.0.5".into());
        let data = NetworkData {
            links: vec![phy("p0", "52:54:00:11:22:33")],
            networks: vec![network],
        };
        assert_eq!(
            decode(&data).unwrap_err(),
            TopologyError::IncompleteStaticSubnet { link: "p0".into() }
        );
    }

    #[test]
    fn test_decode_drops_link_without_mac() {
        let mut p0 = phy("p0", "52:54:00:11:22:33");
        p0.ethernet_mac_address = None;
        let data = NetworkData {
            links: vec![p0],
            networks: vec![dhcp("p0")],
        };
        assert!(decode(&data).unwrap().is_empty());
    }

    #[test]
    fn test_decode_keeps_unrecognized_family() {
        let mut network = dhcp("p0");
        network.network_type = "ipv6_slaac".into();
        let data = NetworkData {
            links: vec![phy("p0", "52:54:00:11:22:33")],
            networks: vec![network],
        };
        let topology = decode(&data).unwrap();
        assert_eq!(
            topology.get("p0").unwrap().subnet.family,
            SubnetFamily::Unrecognized("ipv6_slaac".into())
        );
    }
}
