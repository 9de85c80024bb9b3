pub mod binding;
pub mod config;
pub mod constants;
pub mod decode;
pub mod error;
pub mod fs;
pub mod graph;
pub mod host;
pub mod inventory;
pub mod logger;
pub mod mac;
pub mod matcher;
pub mod netlink;
pub mod render;
pub mod run;
pub mod synth;
pub mod topology;
