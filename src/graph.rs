use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;

use crate::error::TopologyError;
use crate::mac::MacAddress;
use crate::topology::{LINK_TYPE_BOND, LINK_TYPE_PHY, LINK_TYPE_VLAN, LinkRecord};

pub const VLAN_TAG_MIN: u16 = 1;
pub const VLAN_TAG_MAX: u16 = 4094;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Physical,
    Bond,
    Vlan,
}

impl LinkKind {
    pub fn from_wire(link_type: &str) -> Option<Self> {
        match link_type {
            LINK_TYPE_PHY => Some(Self::Physical),
            LINK_TYPE_BOND => Some(Self::Bond),
            LINK_TYPE_VLAN => Some(Self::Vlan),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Physical => LINK_TYPE_PHY,
            Self::Bond => LINK_TYPE_BOND,
            Self::Vlan => LINK_TYPE_VLAN,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BondParams {
    pub mode: Option<String>,
    pub hash_policy: Option<String>,
    pub mii_interval: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub id: String,
    pub kind: LinkKind,
    pub mac_address: Option<MacAddress>,
    pub mtu: Option<u32>,
    pub parent_id: Option<String>,
    pub vlan_tag: Option<u16>,
    pub member_ids: Vec<String>,
    pub bond: BondParams,
}

impl Link {
    /// `Ok(None)` for link kinds that are not modeled.
    pub fn from_record(record: &LinkRecord) -> Result<Option<Self>, TopologyError> {
        let Some(kind) = LinkKind::from_wire(&record.link_type) else {
            return Ok(None);
        };
        let mac_field = match kind {
            LinkKind::Vlan => record
                .vlan_mac_address
                .as_ref()
                .or(record.ethernet_mac_address.as_ref()),
            _ => record.ethernet_mac_address.as_ref(),
        };
        let mac_address = mac_field
            .map(|value| {
                value
                    .parse::<MacAddress>()
                    .map_err(|_| TopologyError::InvalidMacAddress {
                        link: record.id.clone(),
                        value: value.clone(),
                    })
            })
            .transpose()?;

        let mut link = Link {
            id: record.id.clone(),
            kind,
            mac_address,
            mtu: record.mtu,
            parent_id: None,
            vlan_tag: None,
            member_ids: Vec::new(),
            bond: BondParams::default(),
        };
        match kind {
            LinkKind::Vlan => {
                let unsupported = |reason: &str| TopologyError::UnsupportedTopology {
                    link: record.id.clone(),
                    reason: reason.into(),
                };
                let parent = record
                    .vlan_link
                    .clone()
                    .ok_or_else(|| unsupported("VLAN link has no parent link"))?;
                let tag = record
                    .vlan_id
                    .ok_or_else(|| unsupported("VLAN link has no VLAN id"))?;
                if !(VLAN_TAG_MIN..=VLAN_TAG_MAX).contains(&tag) {
                    return Err(unsupported(&format!("VLAN id {} is outside 1-4094", tag)));
                }
                link.parent_id = Some(parent);
                link.vlan_tag = Some(tag);
            }
            LinkKind::Bond => {
                link.member_ids = record.bond_links.clone();
                link.bond = BondParams {
                    mode: record.bond_mode.clone(),
                    hash_policy: record.bond_xmit_hash_policy.clone(),
                    mii_interval: record.bond_miimon,
                };
            }
            LinkKind::Physical => {}
        }
        Ok(Some(link))
    }
}

#[derive(Clone, Debug, Default)]
pub struct LinkGraph {
    links: Vec<Link>,
    physical: HashMap<String, usize>,
    bonds: HashMap<String, usize>,
    vlans: HashMap<String, usize>,
    bond_order: Vec<String>,
}

impl LinkGraph {
    pub fn build(records: &[LinkRecord]) -> Result<Self, TopologyError> {
        let mut graph = LinkGraph::default();
        let mut seen = HashSet::new();
        for record in records {
            if !seen.insert(record.id.as_str()) {
                return Err(TopologyError::DuplicateLinkId(record.id.clone()));
            }
            let Some(link) = Link::from_record(record)? else {
                debug!(
                    "Ignoring link {} of unsupported type {}",
                    record.id, record.link_type
                );
                continue;
            };
            let idx = graph.links.len();
            let index = match link.kind {
                LinkKind::Physical => &mut graph.physical,
                LinkKind::Bond => {
                    graph.bond_order.push(link.id.clone());
                    &mut graph.bonds
                }
                LinkKind::Vlan => &mut graph.vlans,
            };
            index.insert(link.id.clone(), idx);
            graph.links.push(link);
        }
        Ok(graph)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Link> {
        self.physical
            .get(id)
            .or_else(|| self.bonds.get(id))
            .or_else(|| self.vlans.get(id))
            .map(|&idx| &self.links[idx])
    }

    /// Position of a bond among the document's bonds, in declaration order.
    pub fn bond_ordinal(&self, id: &str) -> Option<usize> {
        self.bond_order.iter().position(|b| b == id)
    }

    pub fn resolve_parent(&self, link: &Link) -> Result<&Link, TopologyError> {
        let parent_id = match (link.kind, &link.parent_id) {
            (LinkKind::Vlan, Some(parent_id)) => parent_id,
            _ => {
                return Err(TopologyError::UnsupportedTopology {
                    link: link.id.clone(),
                    reason: format!("{} link has no parent", link.kind),
                });
            }
        };
        if let Some(&idx) = self
            .physical
            .get(parent_id)
            .or_else(|| self.bonds.get(parent_id))
        {
            return Ok(&self.links[idx]);
        }
        if self.vlans.contains_key(parent_id) {
            return Err(TopologyError::UnsupportedTopology {
                link: link.id.clone(),
                reason: format!("VLAN stacked on VLAN {} is not supported", parent_id),
            });
        }
        Err(TopologyError::UnresolvedParent {
            link: link.id.clone(),
            parent: parent_id.clone(),
        })
    }

    pub fn members(&self, bond: &Link) -> Result<Vec<&Link>, TopologyError> {
        bond.member_ids
            .iter()
            .map(|member| {
                self.physical
                    .get(member)
                    .map(|&idx| &self.links[idx])
                    .ok_or_else(|| TopologyError::UnresolvedBondMember {
                        bond: bond.id.clone(),
                        member: member.clone(),
                    })
            })
            .collect()
    }

    /// A VLAN inherits its parent's MAC, a bond its first member's.
    pub fn effective_mac(&self, link: &Link) -> Result<Option<MacAddress>, TopologyError> {
        if link.mac_address.is_some() {
            return Ok(link.mac_address);
        }
        match link.kind {
            LinkKind::Physical => Ok(None),
            LinkKind::Bond => Ok(self
                .members(link)?
                .first()
                .and_then(|member| member.mac_address)),
            LinkKind::Vlan => {
                let parent = self.resolve_parent(link)?;
                match parent.kind {
                    LinkKind::Bond => self.effective_mac(parent),
                    _ => Ok(parent.mac_address),
                }
            }
        }
    }
}
