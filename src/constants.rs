pub const DIR_SYS_CLASS_NET: &str = "/sys/class/net";
pub const DIR_ETC_NETWORK_INTERFACES_D: &str = "/etc/network/interfaces.d";

pub const FILE_ETC_NETWORK_INTERFACES: &str = "/etc/network/interfaces";
pub const FILE_CONFIG: &str = "/etc/nodenet/config.yaml";

pub const INTERFACE_FILE_SUFFIX: &str = "cfg";
pub const BOND_NAME_PREFIX: &str = "bond";

// Virtual, tunnel, bonding master and loopback device classes.
pub const EXCLUDED_INTERFACE_PREFIXES: &[&str] = &[
    "sit",
    "tunl",
    "bonding_master",
    "teql",
    "ip6_vti",
    "ip6tnl",
    "bond",
    "lo",
];

pub const DEVICE_OWNER_BAREMETAL: &str = "baremetal:none";
pub const VNIC_TYPE_BAREMETAL: &str = "baremetal";
