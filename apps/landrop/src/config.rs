//! Node configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/landrop/node.toml`
//! - Windows: `%APPDATA%/landrop/node.toml`

use std::path::PathBuf;

use landrop_discovery::DEFAULT_BROADCAST_PORT;
use landrop_node::NodeConfig;
use serde::{Deserialize, Serialize};

/// On-disk configuration for the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Display name broadcast to peers; empty derives one from the
    /// address and port.
    #[serde(default)]
    pub name: Option<String>,

    /// UDP port shared by every node on the LAN for discovery.
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,

    /// TCP transfer port; unset scans from 12000.
    #[serde(default)]
    pub transfer_port: Option<u16>,

    /// Directory accepted files are written to.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
}

fn default_broadcast_port() -> u16 {
    DEFAULT_BROADCAST_PORT
}

fn default_download_dir() -> String {
    "./downloads".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            broadcast_port: default_broadcast_port(),
            transfer_port: None,
            download_dir: default_download_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Converts into the node startup parameters.
    pub fn into_node_config(self) -> NodeConfig {
        NodeConfig {
            name: self.name,
            broadcast_port: self.broadcast_port,
            transfer_port: self.transfer_port,
            download_dir: PathBuf::from(self.download_dir),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("landrop").join("node.toml"))
    }

    #[cfg(not(windows))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("landrop")
            .join("node.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.name.is_none());
        assert_eq!(config.broadcast_port, 23333);
        assert!(config.transfer_port.is_none());
        assert_eq!(config.download_dir, "./downloads");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            name: Some("den".into()),
            broadcast_port: 24000,
            transfer_port: Some(12345),
            download_dir: "/srv/drops".into(),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.name.as_deref(), Some("den"));
        assert_eq!(parsed.broadcast_port, 24000);
        assert_eq!(parsed.transfer_port, Some(12345));
        assert_eq!(parsed.download_dir, "/srv/drops");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.broadcast_port, 23333);
        assert_eq!(parsed.download_dir, "./downloads");
    }

    #[test]
    fn node_config_conversion() {
        let node_config = Config::default().into_node_config();
        assert_eq!(node_config.broadcast_port, 23333);
        assert_eq!(node_config.download_dir, PathBuf::from("./downloads"));
    }
}
