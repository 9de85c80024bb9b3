use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::constants;
use crate::render::RenderPaths;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HostSource {
    #[default]
    Sysfs,
    Netlink,
}

impl FromStr for HostSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sysfs" => Ok(Self::Sysfs),
            "netlink" => Ok(Self::Netlink),
            _ => Err(anyhow!(
                "invalid host-source {:?}, expected sysfs or netlink",
                s
            )),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    pub debug: Option<bool>,
    pub interfaces_file: Option<String>,
    pub interfaces_dir: Option<String>,
    pub sys_class_net: Option<String>,
    pub host_source: Option<String>,
    pub excluded_prefixes: Option<Vec<String>>,
    pub dry_run: Option<bool>,
}

impl ConfigFile {
    pub fn from_string(value: &str) -> Result<Option<Self>> {
        if value.trim().is_empty() {
            return Ok(None);
        }
        serde_yaml2::from_str::<ConfigFile>(value).map_or_else(
            |e| Err(anyhow!("unable to parse configuration: {}", e)),
            |cf| Ok(Some(cf)),
        )
    }

    /// Read a configuration file. A missing file is not an error.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(value) => {
                Self::from_string(&value).map_err(|e| anyhow!("{:?}: {}", path, e))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("unable to read {:?}: {}", path, e)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub debug: bool,
    pub interfaces_file: PathBuf,
    pub interfaces_dir: PathBuf,
    pub sys_class_net: PathBuf,
    pub host_source: HostSource,
    pub excluded_prefixes: Vec<String>,
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            interfaces_file: PathBuf::from(constants::FILE_ETC_NETWORK_INTERFACES),
            interfaces_dir: PathBuf::from(constants::DIR_ETC_NETWORK_INTERFACES_D),
            sys_class_net: PathBuf::from(constants::DIR_SYS_CLASS_NET),
            host_source: HostSource::default(),
            excluded_prefixes: constants::EXCLUDED_INTERFACE_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Excluded prefixes from the file extend the built-in ones.
    pub fn merge_file(&mut self, other: ConfigFile) -> Result<()> {
        if let Some(debug) = other.debug {
            self.debug = debug;
        }
        if let Some(interfaces_file) = other.interfaces_file {
            self.interfaces_file = interfaces_file.into();
        }
        if let Some(interfaces_dir) = other.interfaces_dir {
            self.interfaces_dir = interfaces_dir.into();
        }
        if let Some(sys_class_net) = other.sys_class_net {
            self.sys_class_net = sys_class_net.into();
        }
        if let Some(host_source) = other.host_source {
            self.host_source = host_source.parse()?;
        }
        if let Some(prefixes) = other.excluded_prefixes {
            for prefix in prefixes {
                if !self.excluded_prefixes.contains(&prefix) {
                    self.excluded_prefixes.push(prefix);
                }
            }
        }
        if let Some(dry_run) = other.dry_run {
            self.dry_run = dry_run;
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::default();
        if let Some(file) = ConfigFile::from_path(path)? {
            config.merge_file(file)?;
        }
        Ok(config)
    }

    pub fn render_paths(&self) -> RenderPaths {
        RenderPaths {
            interfaces_file: self.interfaces_file.clone(),
            interfaces_dir: self.interfaces_dir.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    macro_rules! case__config__merge {
        ($name:ident, $input:expr, $expected:expr) => {
            #[test]
            fn $name() {
                let mut config = Config::default();
                if let Some(file) = ConfigFile::from_string($input).unwrap() {
                    config.merge_file(file).unwrap();
                }
                assert_eq!($expected, config);
            }
        };
    }

    case__config__merge!(test_config_empty, "", Config::default());

    case__config__merge!(
        test_config_debug,
        "debug: true\n",
        Config {
            debug: true,
            ..Default::default()
        }
    );

    case__config__merge!(
        test_config_paths,
        "interfaces-file: /tmp/interfaces\ninterfaces-dir: /tmp/interfaces.d\nsys-class-net: /tmp/net\n",
        Config {
            interfaces_file: "/tmp/interfaces".into(),
            interfaces_dir: "/tmp/interfaces.d".into(),
            sys_class_net: "/tmp/net".into(),
            ..Default::default()
        }
    );

    case__config__merge!(
        test_config_netlink_dry_run,
        "host-source: netlink\ndry-run: true\n",
        Config {
            host_source: HostSource::Netlink,
            dry_run: true,
            ..Default::default()
        }
    );

    case__config__merge!(
        test_config_excluded_prefixes_extend,
        "excluded-prefixes:\n  - docker\n  - lo\n",
        Config {
            excluded_prefixes: constants::EXCLUDED_INTERFACE_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .chain(std::iter::once("docker".to_string()))
                .collect(),
            ..Default::default()
        }
    );

    #[test]
    fn test_config_invalid_host_source() {
        let file = ConfigFile::from_string("host-source: udev\n").unwrap().unwrap();
        assert!(Config::default().merge_file(file).is_err());
    }

    #[test]
    fn test_config_load_missing() {
        assert_eq!(
            Config::load("/nonexistent/nodenet.yaml").unwrap(),
            Config::default()
        );
    }

    #[test]
    fn test_config_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "debug: true\nhost-source: sysfs\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.debug);
        assert_eq!(config.host_source, HostSource::Sysfs);
    }
}
