//! Configuration management for M1 Restore
//!
//! Handles loading, parsing, and validating the YAML configuration file.
//! Every field has a default, so a missing file is not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::payload::Model;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
}

/// MIDI client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Output port selected at start-up (id, index or name substring)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// Model selected at start-up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Model>,
}

/// Chunking and pacing of outgoing SysEx data.
///
/// The M1 has a small receive buffer and no flow control. 256-byte chunks
/// spaced 100 ms apart are known to work; larger chunks or shorter delays
/// may overrun the instrument and corrupt the dump.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

/// Bundled SysEx asset location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetsConfig {
    #[serde(default = "default_assets_root")]
    pub root: PathBuf,
}

/// Device hot-plug polling
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            output_port: None,
            model: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

impl TransferConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: default_assets_root(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl DeviceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// Default value functions
fn default_client_name() -> String { "M1-Restore".to_string() }
fn default_chunk_size() -> usize { 256 }
fn default_chunk_delay_ms() -> u64 { 100 }
fn default_assets_root() -> PathBuf { PathBuf::from("sysex") }
fn default_poll_interval() -> u64 { 500 }

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            anyhow::bail!("transfer.chunk_size must be at least 1");
        }

        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("midi.client_name cannot be empty");
        }

        if self.devices.poll_interval_ms == 0 {
            anyhow::bail!("devices.poll_interval_ms must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.transfer.chunk_size, 256);
        assert_eq!(config.transfer.chunk_delay(), Duration::from_millis(100));
        assert_eq!(config.assets.root, PathBuf::from("sysex"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
midi:
  output_port: "UM-One"
  model: m1ex
transfer:
  chunk_delay_ms: 150
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.midi.output_port.as_deref(), Some("UM-One"));
        assert_eq!(config.midi.model, Some(Model::M1ex));
        assert_eq!(config.midi.client_name, "M1-Restore");
        assert_eq!(config.transfer.chunk_size, 256);
        assert_eq!(config.transfer.chunk_delay_ms, 150);
        assert_eq!(config.devices.poll_interval_ms, 500);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = AppConfig::default();
        config.transfer.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "assets:\n  root: /opt/m1/sysex\n")?;

        let config = AppConfig::load(&config_path).await?;
        assert_eq!(config.assets.root, PathBuf::from("/opt/m1/sysex"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = AppConfig::load_or_default(temp_dir.path().join("absent.yaml")).await?;
        assert_eq!(config.transfer.chunk_size, 256);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_file_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "transfer:\n  chunk_size: 0\n")?;

        assert!(AppConfig::load(&config_path).await.is_err());
        Ok(())
    }
}
