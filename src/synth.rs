use std::collections::HashSet;
use std::net::IpAddr;

use log::debug;

use crate::error::SynthesisError;
use crate::graph::{VLAN_TAG_MAX, VLAN_TAG_MIN};
use crate::inventory::{AttachmentSubnet, BindingTarget, Inventory, VirtualAttachment};
use crate::topology::{
    LINK_TYPE_BOND, LINK_TYPE_PHY, LINK_TYPE_VLAN, LinkRecord, NETWORK_TYPE_IPV4,
    NETWORK_TYPE_IPV4_DHCP, NETWORK_TYPE_IPV6, NetworkData, NetworkRecord,
};

/// Every port becomes a phy link, group members included, so `bond_links`
/// resolve on decode.
pub fn synthesize(
    inventory: &Inventory,
    attachments: &[VirtualAttachment],
) -> Result<NetworkData, SynthesisError> {
    validate(inventory, attachments)?;

    let mut links = Vec::new();
    for port in &inventory.ports {
        links.push(LinkRecord {
            id: port.id.clone(),
            link_type: LINK_TYPE_PHY.into(),
            ethernet_mac_address: Some(port.mac_address.to_string()),
            ..Default::default()
        });
    }

    for group in &inventory.port_groups {
        let members: Vec<_> = inventory.members(&group.id).collect();
        let mac_address = group
            .mac_address
            .or_else(|| members.first().map(|p| p.mac_address));
        links.push(LinkRecord {
            id: group.id.clone(),
            link_type: LINK_TYPE_BOND.into(),
            ethernet_mac_address: mac_address.map(|m| m.to_string()),
            bond_links: members.iter().map(|p| p.id.clone()).collect(),
            bond_mode: group.mode.clone(),
            bond_xmit_hash_policy: group.xmit_hash_policy.clone(),
            bond_miimon: group.miimon,
            ..Default::default()
        });
    }

    let mut networks = Vec::new();
    for (i, attachment) in attachments.iter().enumerate() {
        debug!(
            "Attachment {} is VLAN {} on {}",
            attachment.vif_id, attachment.segmentation_id, attachment.target
        );
        links.push(LinkRecord {
            id: attachment.vif_id.clone(),
            link_type: LINK_TYPE_VLAN.into(),
            vlan_link: Some(attachment.target.id().into()),
            vlan_id: Some(attachment.segmentation_id),
            ..Default::default()
        });
        networks.push(network_record(i, attachment));
    }

    Ok(NetworkData { links, networks })
}

fn network_record(index: usize, attachment: &VirtualAttachment) -> NetworkRecord {
    let mut record = NetworkRecord {
        id: Some(format!("network{}", index)),
        link: attachment.vif_id.clone(),
        network_id: attachment.network_id.clone(),
        ..Default::default()
    };
    match &attachment.subnet {
        AttachmentSubnet::Dhcp => {
            record.network_type = NETWORK_TYPE_IPV4_DHCP.into();
        }
        AttachmentSubnet::Static {
            address,
            netmask,
            routes,
        } => {
            record.network_type = static_network_type(address).into();
            record.ip_address = Some(address.clone());
            record.netmask = Some(netmask.clone());
            record.routes = routes.clone();
        }
    }
    record
}

fn static_network_type(address: &str) -> &'static str {
    let host = address.split_once('/').map_or(address, |(host, _)| host);
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => NETWORK_TYPE_IPV6,
        _ => NETWORK_TYPE_IPV4,
    }
}

fn validate(inventory: &Inventory, attachments: &[VirtualAttachment]) -> Result<(), SynthesisError> {
    let mut ids = HashSet::new();
    for id in inventory
        .ports
        .iter()
        .map(|p| &p.id)
        .chain(inventory.port_groups.iter().map(|g| &g.id))
    {
        if !ids.insert(id.as_str()) {
            return Err(SynthesisError::IdCollision(id.clone()));
        }
    }

    for port in &inventory.ports {
        if let Some(group) = &port.port_group_id
            && inventory.port_group(group).is_none()
        {
            return Err(SynthesisError::UnknownPortGroup {
                port: port.id.clone(),
                group: group.clone(),
            });
        }
    }

    let mut vif_ids = HashSet::new();
    for attachment in attachments {
        let vif_id = attachment.vif_id.as_str();
        if !vif_ids.insert(vif_id) {
            return Err(SynthesisError::DuplicateAttachment(vif_id.into()));
        }
        if ids.contains(vif_id) {
            return Err(SynthesisError::IdCollision(vif_id.into()));
        }
        let tag = attachment.segmentation_id;
        if !(VLAN_TAG_MIN..=VLAN_TAG_MAX).contains(&tag) {
            return Err(SynthesisError::InvalidVlanTag {
                attachment: vif_id.into(),
                tag,
            });
        }
        if !inventory.contains(&attachment.target) {
            return Err(SynthesisError::UnknownBindingTarget {
                attachment: vif_id.into(),
                target: attachment.target.to_string(),
            });
        }
        if let BindingTarget::PortGroup(group) = &attachment.target
            && inventory.members(group).next().is_none()
        {
            return Err(SynthesisError::EmptyPortGroup {
                attachment: vif_id.into(),
                group: group.clone(),
            });
        }
    }
    Ok(())
}

/// Round-robin over port groups, or over ports when there are none.
pub fn distribute_attachments(
    inventory: &Inventory,
    vif_ids: &[String],
) -> Vec<(String, BindingTarget)> {
    let targets: Vec<BindingTarget> = if inventory.port_groups.is_empty() {
        inventory
            .ports
            .iter()
            .map(|p| BindingTarget::Port(p.id.clone()))
            .collect()
    } else {
        inventory
            .port_groups
            .iter()
            .map(|g| BindingTarget::PortGroup(g.id.clone()))
            .collect()
    };
    if targets.is_empty() {
        return Vec::new();
    }
    vif_ids
        .iter()
        .zip(targets.iter().cycle())
        .map(|(vif, target)| (vif.clone(), target.clone()))
        .collect()
}
