//! Plugin discovery from a plugin directory.
//!
//! A plugin is a single Lua file directly inside the plugin directory. The
//! default directory is `$XDG_DATA_HOME/sdkforge/plugins/` (or the platform
//! equivalent).

use crate::error::{PluginError, PluginResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File extension of plugin sources.
pub const PLUGIN_EXTENSION: &str = "lua";

/// A plugin source file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSource {
    /// Plugin name, taken from the file stem.
    pub name: String,

    /// Path to the Lua file.
    pub path: PathBuf,
}

/// Get the default plugins directory.
pub fn default_plugin_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "raibid-labs", "sdkforge")
        .map(|dirs| dirs.data_dir().join("plugins"))
}

/// Discover all plugins in a directory, sorted by name.
///
/// A missing directory yields an empty list.
pub fn discover_plugins(dir: &Path) -> PluginResult<Vec<PluginSource>> {
    if !dir.exists() {
        debug!("Plugin directory {:?} does not exist", dir);
        return Ok(Vec::new());
    }

    let mut plugins = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read entry in {:?}: {}", dir, e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(PLUGIN_EXTENSION) {
            debug!("Skipping {:?}: not a plugin file", path);
            continue;
        }

        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!("Skipping {:?}: file name is not valid UTF-8", path);
            continue;
        };

        plugins.push(PluginSource {
            name: name.to_string(),
            path: path.clone(),
        });
    }

    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    info!("Discovered {} plugins in {:?}", plugins.len(), dir);
    Ok(plugins)
}

/// Find a plugin by name in a directory.
pub fn find_plugin(dir: &Path, name: &str) -> PluginResult<PluginSource> {
    let path = dir.join(format!("{}.{}", name, PLUGIN_EXTENSION));
    if !path.is_file() {
        return Err(PluginError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("plugin '{}' not found in {}", name, dir.display()),
        )));
    }

    Ok(PluginSource {
        name: name.to_string(),
        path,
    })
}
