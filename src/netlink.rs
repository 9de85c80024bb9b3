use anyhow::{Result, anyhow};
use futures::StreamExt;
use log::debug;
use netlink_packet_route::link::{InfoKind, LinkAttribute, LinkInfo, LinkMessage};
use rtnetlink::{Handle as NlHandle, new_connection};
use tokio::runtime::Handle as RtHandle;

use crate::host::HostInterface;
use crate::mac::MacAddress;

pub(crate) struct NetlinkConnection {
    handle: NlHandle,
}

impl NetlinkConnection {
    pub(crate) fn new() -> Result<Self> {
        let rt = RtHandle::try_current().map_err(|_| anyhow!("tokio is not running"))?;
        let (connection, handle, _) =
            new_connection().map_err(|e| anyhow!("unable to create netlink socket: {}", e))?;
        rt.spawn(connection);
        Ok(Self { handle })
    }

    pub(crate) async fn get_host_interfaces(&self) -> Result<Vec<HostInterface>> {
        let mut interfaces = Vec::new();
        let mut links = self.handle.link().get().execute();
        while let Some(link_res) = links.next().await {
            let link = link_res.map_err(|e| anyhow!("unable to dump links: {}", e))?;
            if let Some(interface) = extract_host_interface(&link) {
                interfaces.push(interface);
            }
        }
        Ok(interfaces)
    }
}

/// Must be called from within a tokio runtime.
pub async fn read_netlink() -> Result<Vec<HostInterface>> {
    let nl = NetlinkConnection::new()?;
    nl.get_host_interfaces().await
}

fn extract_host_interface(link: &LinkMessage) -> Option<HostInterface> {
    let mut name: Option<String> = None;
    let mut mac = None;
    let mut kind: Option<&InfoKind> = None;

    for nla in &link.attributes {
        match nla {
            LinkAttribute::IfName(n) => name = Some(n.clone()),
            LinkAttribute::Address(addr) => mac = MacAddress::from_slice(addr),
            LinkAttribute::LinkInfo(infos) => {
                kind = infos.iter().find_map(|link_info| {
                    if let LinkInfo::Kind(k) = link_info {
                        Some(k)
                    } else {
                        None
                    }
                });
            }
            _ => {}
        }
    }

    let name = name?;
    if let Some(k) = kind
        && is_ineligible_kind(k)
    {
        debug!("Ignoring {:?} link {}", k, name);
        return None;
    }
    Some(HostInterface {
        mac_address: mac?,
        system_name: name,
    })
}

fn is_ineligible_kind(kind: &InfoKind) -> bool {
    matches!(
        kind,
        InfoKind::Bond
            | InfoKind::Dummy
            | InfoKind::Veth
            | InfoKind::Vlan
            | InfoKind::Bridge
            | InfoKind::Tun
            | InfoKind::Vxlan
            | InfoKind::IpVlan
            | InfoKind::IpVtap
            | InfoKind::MacVlan
            | InfoKind::MacVtap
            | InfoKind::GreTap
            | InfoKind::GreTap6
            | InfoKind::IpIp
            | InfoKind::Ip6Tnl
            | InfoKind::SitTun
            | InfoKind::GreTun
            | InfoKind::GreTun6
            | InfoKind::Vti
            | InfoKind::Vrf
            | InfoKind::Wireguard
            | InfoKind::Geneve
            | InfoKind::Other(_)
    )
}
