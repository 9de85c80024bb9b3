use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use tokio::runtime::Runtime;

use crate::config::{Config, HostSource};
use crate::decode::decode;
use crate::fs::{atomic_write, write_files};
use crate::host::{HostInterface, HostInventory, read_sysfs};
use crate::inventory::Inventory;
use crate::matcher::{InterfacesDir, match_interfaces};
use crate::netlink::read_netlink;
use crate::render::render_all;
use crate::synth::synthesize;
use crate::topology::NetworkData;

fn host_interfaces(config: &Config) -> Result<Vec<HostInterface>> {
    match config.host_source {
        HostSource::Sysfs => read_sysfs(&config.sys_class_net),
        HostSource::Netlink => {
            let rt = Runtime::new().context("unable to start tokio runtime")?;
            rt.block_on(read_netlink())
        }
    }
}

pub fn render_network_data(
    config: &Config,
    data: &NetworkData,
    host: Vec<HostInterface>,
) -> Result<BTreeMap<PathBuf, String>> {
    let topology = decode(data).map_err(|e| anyhow!("unable to decode network data: {}", e))?;
    debug!("Decoded {} configurable interfaces", topology.len());

    let inventory = HostInventory::new(host, config.excluded_prefixes.as_slice());
    debug!("Found {} eligible host interfaces", inventory.len());

    let existing = InterfacesDir::new(&config.interfaces_dir);
    let report = match_interfaces(&topology, &inventory, &existing);
    for (link_id, reason) in &report.skipped {
        info!("Skipping link {}: {}", link_id, reason);
    }
    Ok(render_all(&report.matched, &config.render_paths(), &existing))
}

pub fn render<P: AsRef<Path>>(config: &Config, network_data: P) -> Result<()> {
    let data = NetworkData::from_path(network_data)?;
    let host = host_interfaces(config)?;
    let files = render_network_data(config, &data, host)?;

    if config.dry_run {
        let mut stdout = std::io::stdout().lock();
        for (path, content) in &files {
            writeln!(stdout, "# {}\n{}", path.to_string_lossy(), content)?;
        }
        return Ok(());
    }
    write_files(&files)
}

pub fn synthesize_inventory<P: AsRef<Path>>(inventory: P, output: Option<&Path>) -> Result<()> {
    let inventory = Inventory::from_path(inventory)?;
    let data = synthesize(&inventory, &inventory.attachments)
        .map_err(|e| anyhow!("unable to synthesize network data: {}", e))?;
    let json = data.to_string_pretty()?;
    match output {
        Some(path) => {
            atomic_write(path, |mut f| {
                writeln!(f, "{}", json)?;
                Ok(())
            })?;
            info!("Wrote {}", path.to_string_lossy());
        }
        None => println!("{}", json),
    }
    Ok(())
}
