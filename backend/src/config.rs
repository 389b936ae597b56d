use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Panel configuration, loaded once at startup and passed into every
/// operation that needs it. Missing file means defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub bind: String,
    /// Serial of the robot this panel controls. Must have an entry in
    /// `devices`.
    pub serial: String,
    pub devices: HashMap<String, DeviceEntry>,
    pub listings_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub apps_dir: PathBuf,
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    pub ip: String,
    pub name: String,
}

/// Identity and network location of one robot, resolved from the config.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub serial: String,
    pub ip: String,
    pub name: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        let mut devices = HashMap::new();
        devices.insert(
            "00e20100".to_string(),
            DeviceEntry {
                ip: "192.168.1.50".to_string(),
                name: "Robot-K4F".to_string(),
            },
        );
        Self {
            bind: "127.0.0.1:8081".to_string(),
            serial: "00e20100".to_string(),
            devices,
            listings_dir: PathBuf::from("store/listings"),
            packages_dir: PathBuf::from("store/packages"),
            apps_dir: PathBuf::from("store/apps"),
            temp_dir: PathBuf::from("store/tmp"),
        }
    }
}

impl PanelConfig {
    pub fn config_file() -> PathBuf {
        env::var("PANEL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("panel.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_file();
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let cfg = toml::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(cfg)
        } else {
            Ok(Self::default())
        }
    }

    pub fn device(&self) -> Result<DeviceConfig> {
        let entry = self
            .devices
            .get(&self.serial)
            .ok_or_else(|| anyhow!("no device entry for serial {}", self.serial))?;
        Ok(DeviceConfig {
            serial: self.serial.clone(),
            ip: entry.ip.clone(),
            name: entry.name.clone(),
        })
    }
}
