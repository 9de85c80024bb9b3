use thiserror::Error;

use crate::binding::Phase;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("link {link}: parent link {parent} is not a physical or bond link in this document")]
    UnresolvedParent { link: String, parent: String },

    #[error("link {link}: unsupported topology: {reason}")]
    UnsupportedTopology { link: String, reason: String },

    #[error("bond {bond}: member {member} is not a physical link in this document")]
    UnresolvedBondMember { bond: String, member: String },

    #[error("link id {0} is declared more than once")]
    DuplicateLinkId(String),

    #[error("link {link}: invalid MAC address {value:?}")]
    InvalidMacAddress { link: String, value: String },

    #[error("link {link}: static subnet is missing an address or netmask")]
    IncompleteStaticSubnet { link: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("attachment {attachment}: binding target {target} is not in the inventory")]
    UnknownBindingTarget { attachment: String, target: String },

    #[error("port {port}: port group {group} is not in the inventory")]
    UnknownPortGroup { port: String, group: String },

    #[error("attachment {attachment}: port group {group} has no member ports")]
    EmptyPortGroup { attachment: String, group: String },

    #[error("attachment {attachment}: VLAN tag {tag} is outside 1-4094")]
    InvalidVlanTag { attachment: String, tag: u16 },

    #[error("attachment {0} is declared more than once")]
    DuplicateAttachment(String),

    #[error("id {0} is used by more than one port, port group or attachment")]
    IdCollision(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("remote binding {0} does not exist")]
    NotFound(String),

    #[error("remote binding call failed: {0}")]
    RemoteFailure(String),

    #[error("no binding request could be built for {0}")]
    NoRequest(String),

    #[error("no segmentation id for VIF {0}")]
    NoSegmentationId(String),

    #[error("cannot transition bindings from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
}
