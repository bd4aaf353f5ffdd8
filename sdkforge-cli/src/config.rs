//! Configuration file loading and management
//!
//! This module handles loading and parsing the CLI configuration from
//! `$XDG_CONFIG_HOME/sdkforge/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use sdkforge_runtime::{ArchType, HostFunctions, OsType, Platform, StdoutHost, TracingHost};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Platform overrides
    #[serde(default)]
    pub platform: PlatformConfig,
}

/// Plugin runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Directory containing plugin `.lua` files
    /// If None, uses XDG_DATA_HOME/sdkforge/plugins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where plugin `print` output goes
    /// Default: stdout
    #[serde(default)]
    pub plugin_output: PluginOutput,
}

/// Destination for plugin `print` output
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PluginOutput {
    /// Write lines to stdout
    #[default]
    Stdout,
    /// Forward lines to the log
    Log,
}

impl PluginOutput {
    /// The host functions implementing this destination
    pub fn host(self) -> Arc<dyn HostFunctions> {
        match self {
            PluginOutput::Stdout => Arc::new(StdoutHost),
            PluginOutput::Log => Arc::new(TracingHost),
        }
    }
}

/// Overrides for the platform reported to plugins
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlatformConfig {
    /// Operating system family (windows, linux, darwin)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsType>,
    /// Architecture family (amd64, arm64, 386)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<ArchType>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            log_level: default_log_level(),
            plugin_output: PluginOutput::default(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/sdkforge/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "sdkforge")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# sdkforge Configuration

[runtime]
# Directory containing plugin .lua files
# If not specified, defaults to $XDG_DATA_HOME/sdkforge/plugins
# plugin_dir = "/path/to/plugins"

# Log level: trace, debug, info, warn, error
# Default: "info"
log_level = "info"

# Where plugin print() output goes: stdout or log
# Default: "stdout"
plugin_output = "stdout"

[platform]
# Override the platform reported to plugins through OS_TYPE and ARCH_TYPE.
# Defaults to the platform sdkforge was built for.
# os = "linux"
# arch = "amd64"
"#
        .to_string()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.runtime.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.runtime.log_level,
                valid_log_levels.join(", ")
            );
        }

        if let Some(ref dir) = self.runtime.plugin_dir {
            if dir.as_os_str().is_empty() {
                anyhow::bail!("runtime.plugin_dir cannot be empty");
            }
        }

        Ok(())
    }

    /// Get the plugin directory
    ///
    /// Returns the configured directory or the default XDG data directory path
    pub fn plugin_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.runtime.plugin_dir {
            return Ok(dir.clone());
        }

        sdkforge_runtime::default_plugin_dir().context("Failed to determine project directories")
    }

    /// Get the platform reported to plugins
    pub fn platform(&self) -> Platform {
        let current = Platform::current();
        Platform::new(
            self.platform.os.clone().unwrap_or(current.os),
            self.platform.arch.clone().unwrap_or(current.arch),
        )
    }
}
