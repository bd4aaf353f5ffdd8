//! Plugin manager for loading sdkforge plugins from a directory.

use sdkforge_runtime::{discover_plugins, find_plugin, Plugin, PluginLoader, PluginResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Status of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum PluginStatus {
    /// Plugin is loaded and ready.
    Loaded,
    /// Plugin failed to load.
    Failed(String),
}

/// Manager for sdkforge plugins.
///
/// Plugins are keyed by their file stem in the plugin directory. Each loaded
/// plugin owns its own runtime; [`PluginManager::shutdown`] releases them all.
pub struct PluginManager {
    loader: PluginLoader,
    plugin_dir: PathBuf,
    plugins: BTreeMap<String, Plugin>,
    failed: BTreeMap<String, String>,
}

impl PluginManager {
    /// Create a new plugin manager.
    pub fn new(loader: PluginLoader, plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            plugin_dir: plugin_dir.into(),
            plugins: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }

    /// Directory plugins are loaded from.
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Discover and load all plugins in the plugin directory.
    ///
    /// A plugin that fails to load is recorded and skipped. Returns the number
    /// of successfully loaded plugins.
    pub fn discover_and_load(&mut self) -> PluginResult<usize> {
        info!("Discovering plugins in {}", self.plugin_dir.display());

        for source in discover_plugins(&self.plugin_dir)? {
            if self.plugins.contains_key(&source.name) {
                continue;
            }

            match self.loader.load_file(&source.path) {
                Ok(plugin) => {
                    self.failed.remove(&source.name);
                    self.plugins.insert(source.name, plugin);
                }
                Err(e) => {
                    warn!("Failed to load plugin {}: {}", source.name, e);
                    self.failed.insert(source.name, e.to_string());
                }
            }
        }

        Ok(self.plugins.len())
    }

    /// Load a single plugin by name, reusing it if already loaded.
    pub fn load(&mut self, name: &str) -> PluginResult<&Plugin> {
        if self.plugins.contains_key(name) {
            return Ok(&self.plugins[name]);
        }

        let source = find_plugin(&self.plugin_dir, name)?;
        let plugin = match self.loader.load_file(&source.path) {
            Ok(plugin) => plugin,
            Err(e) => {
                self.failed.insert(source.name, e.to_string());
                return Err(e);
            }
        };

        self.failed.remove(name);
        let plugin: &Plugin = self.plugins.entry(source.name).or_insert(plugin);
        Ok(plugin)
    }

    /// Get a loaded plugin by name.
    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    /// Get the number of loaded plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// List all known plugins with their status, sorted by name.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        let loaded = self.plugins.iter().map(|(id, plugin)| {
            let metadata = plugin.metadata();
            PluginInfo {
                id: id.clone(),
                name: metadata.name.clone(),
                version: metadata.version.clone(),
                author: metadata.author.clone(),
                status: PluginStatus::Loaded,
            }
        });

        let failed = self.failed.iter().map(|(id, reason)| PluginInfo {
            id: id.clone(),
            name: id.clone(),
            version: String::new(),
            author: String::new(),
            status: PluginStatus::Failed(reason.clone()),
        });

        let mut plugins: Vec<PluginInfo> = loaded.chain(failed).collect();
        plugins.sort_by(|a, b| a.id.cmp(&b.id));
        plugins
    }

    /// Release every loaded plugin runtime.
    pub fn shutdown(self) {
        info!("Releasing {} plugin(s)", self.plugins.len());
        for plugin in self.plugins.into_values() {
            plugin.close();
        }
    }
}

/// Information about a plugin in the plugin directory.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub status: PluginStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdkforge_runtime::{ArchType, OsType, Platform};
    use tempfile::TempDir;

    const JAVA: &str = r#"
PLUGIN = { name = "java", version = "0.2.0", author = "sdkforge" }
function PLUGIN:Available() return { { version = "21" } } end
function PLUGIN:PostInstall() end
function PLUGIN:EnvKeys(ctx) return { { key = "JAVA_HOME", value = ctx.path } } end
"#;

    fn manager(dir: &Path) -> PluginManager {
        let loader = PluginLoader::new(Platform::new(OsType::Linux, ArchType::Amd64));
        PluginManager::new(loader, dir)
    }

    #[test]
    fn test_new_plugin_manager() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(temp_dir.path());
        assert_eq!(manager.plugin_count(), 0);
        assert!(manager.list_plugins().is_empty());
    }

    #[test]
    fn test_discover_records_failures() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("java.lua"), JAVA).unwrap();
        std::fs::write(temp_dir.path().join("broken.lua"), "PLUGIN = {").unwrap();

        let mut manager = manager(temp_dir.path());
        assert_eq!(manager.discover_and_load().unwrap(), 1);

        let plugins = manager.list_plugins();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].id, "broken");
        assert!(matches!(plugins[0].status, PluginStatus::Failed(_)));
        assert_eq!(plugins[1].name, "java");
        assert_eq!(plugins[1].version, "0.2.0");
        assert_eq!(plugins[1].status, PluginStatus::Loaded);

        manager.shutdown();
    }

    #[test]
    fn test_load_by_name() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("java.lua"), JAVA).unwrap();

        let mut manager = manager(temp_dir.path());
        assert_eq!(manager.load("java").unwrap().name(), "java");
        assert!(manager.get("java").is_some());
        assert_eq!(manager.plugin_count(), 1);

        // Already loaded plugins are reused.
        manager.load("java").unwrap();
        assert_eq!(manager.plugin_count(), 1);

        assert!(manager.load("go").is_err());
    }
}
