//! Loaded plugins and the domain operations they expose.
//!
//! A [`Plugin`] exclusively owns one Lua runtime. Loading runs the plugin
//! source once, validates the capability contract and extracts metadata; the
//! runtime is dropped on every failure path. Afterwards the host talks to the
//! plugin only through [`Plugin::discover`], [`Plugin::resolve`],
//! [`Plugin::finalize`] and [`Plugin::environment_keys`].
//!
//! A runtime is not safe for concurrent calls. Each operation takes `&self`
//! and blocks until the guest returns; callers serialize access to a plugin.
//! Separate plugins share nothing and may be used from separate threads.

use crate::bridge::CallBridge;
use crate::capability::Capability;
use crate::codec::{self, ShapeError};
use crate::error::{PluginError, PluginResult};
use crate::host::{self, HostFunctions, StdoutHost};
use crate::platform::{self, ArchType, OsType, Platform};
use crate::sdk::{EnvironmentEntry, Info, Package, Version};
use mlua::{Lua, Table, Value};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Global the plugin source must assign its plugin table to.
pub const PLUGIN_OBJECT: &str = "PLUGIN";

/// Name used for plugins loaded from a string.
const DEFAULT_SOURCE_NAME: &str = "plugin";

/// Installs helper modules into a fresh runtime before the plugin runs.
pub trait Preloader: Send + Sync {
    fn preload(&self, lua: &Lua) -> mlua::Result<()>;
}

/// Descriptive fields declared on the plugin table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    pub name: String,
    pub author: String,
    pub version: String,
    pub update_url: String,
}

impl PluginMetadata {
    fn extract(plugin: &Table) -> PluginResult<Self> {
        Ok(Self {
            name: metadata_field(plugin, "name")?,
            author: metadata_field(plugin, "author")?,
            version: metadata_field(plugin, "version")?,
            update_url: metadata_field(plugin, "updateUrl")?,
        })
    }
}

fn metadata_field(plugin: &Table, field: &'static str) -> PluginResult<String> {
    match plugin.raw_get::<Value>(field).map_err(PluginError::Setup)? {
        Value::Nil => Ok(String::new()),
        Value::String(s) => Ok(s.to_string_lossy().to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(codec::format_number(n)),
        _ => Err(PluginError::InvalidMetadata(field)),
    }
}

/// Builds plugins for one platform with a shared host and preload set.
#[derive(Clone)]
pub struct PluginLoader {
    platform: Platform,
    host: Arc<dyn HostFunctions>,
    preloaders: Vec<Arc<dyn Preloader>>,
}

impl PluginLoader {
    /// Create a loader that prints plugin output to stdout.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            host: Arc::new(StdoutHost),
            preloaders: Vec::new(),
        }
    }

    /// Route plugin output through a different host.
    pub fn with_host(mut self, host: Arc<dyn HostFunctions>) -> Self {
        self.host = host;
        self
    }

    /// Run a preloader in every runtime this loader creates.
    pub fn with_preloader(mut self, preloader: Arc<dyn Preloader>) -> Self {
        self.preloaders.push(preloader);
        self
    }

    /// The platform exposed to plugins.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Load a plugin from source text.
    pub fn load(&self, source: &str) -> PluginResult<Plugin> {
        self.load_named(source, DEFAULT_SOURCE_NAME, None)
    }

    /// Load a plugin from a file. The file stem names the plugin when it does
    /// not declare a name itself.
    pub fn load_file(&self, path: &Path) -> PluginResult<Plugin> {
        let source = std::fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string());

        debug!("Loading plugin from {:?}", path);
        self.load_named(&source, &stem, Some(&stem))
    }

    fn load_named(
        &self,
        source: &str,
        source_name: &str,
        fallback_name: Option<&str>,
    ) -> PluginResult<Plugin> {
        // Dropping `lua` on any early return closes the runtime.
        let lua = Lua::new();
        self.prepare(&lua, source_name).map_err(PluginError::Setup)?;

        lua.load(source)
            .set_name(format!("@{}.lua", source_name))
            .exec()
            .map_err(|e| {
                warn!("Plugin {} cannot be executed: {}", source_name, e);
                PluginError::NotExecutable(e.to_string())
            })?;

        let plugin = match lua
            .globals()
            .get::<Value>(PLUGIN_OBJECT)
            .map_err(PluginError::Setup)?
        {
            Value::Table(table) => table,
            _ => return Err(PluginError::PluginObjectNotFound),
        };

        let bridge = CallBridge::new(plugin)?;
        let mut metadata = PluginMetadata::extract(bridge.plugin())?;
        if metadata.name.is_empty() {
            if let Some(name) = fallback_name {
                metadata.name = name.to_string();
            }
        }

        info!(
            "Loaded plugin: {} v{} for {}/{}",
            metadata.name, metadata.version, self.platform.os, self.platform.arch
        );

        Ok(Plugin {
            metadata,
            bridge,
            lua,
        })
    }

    /// Preload modules, install host functions and bind platform globals.
    fn prepare(&self, lua: &Lua, source_name: &str) -> mlua::Result<()> {
        for preloader in &self.preloaders {
            preloader.preload(lua)?;
        }
        host::register(lua, source_name, Arc::clone(&self.host))?;
        platform::bind_globals(lua, &self.platform)
    }
}

/// A loaded, validated plugin.
pub struct Plugin {
    metadata: PluginMetadata,
    bridge: CallBridge,
    // Declared last so the bridge's references are dropped before the runtime.
    lua: Lua,
}

impl Plugin {
    /// Load a plugin from source text for the given platform.
    pub fn load(source: &str, os: OsType, arch: ArchType) -> PluginResult<Self> {
        PluginLoader::new(Platform::new(os, arch)).load(source)
    }

    /// Load a plugin from a file for the given platform.
    pub fn load_file(path: &Path, platform: Platform) -> PluginResult<Self> {
        PluginLoader::new(platform).load_file(path)
    }

    /// Plugin metadata.
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Check if the plugin defines a capability.
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.bridge.has(cap)
    }

    /// Display string for a version of this plugin's SDK, `name@version`.
    pub fn label(&self, version: &str) -> String {
        format!("{}@{}", self.metadata.name, version)
    }

    /// List the versions the plugin offers, in the order the plugin returns them.
    pub fn discover(&self) -> PluginResult<Vec<Package>> {
        let ctx = codec::available_context(&self.lua)?;
        let value = self.call(Capability::Discover, ctx)?;

        let packages = codec::decode_available(value, self.name())
            .map_err(|source| self.shape_error(Capability::Discover, source))?;
        debug!(plugin = self.name(), "Discovered {} versions", packages.len());
        Ok(packages)
    }

    /// Ask the plugin where to install `version` from.
    ///
    /// `None` means the plugin has no override, either because it returned nil
    /// or because it does not define `PreInstall`.
    pub fn resolve(&self, version: &Version) -> PluginResult<Option<Package>> {
        let ctx = codec::pre_install_context(&self.lua, version)?;
        let value = self.call(Capability::Resolve, ctx)?;

        codec::decode_pre_install(value, self.name())
            .map_err(|source| self.shape_error(Capability::Resolve, source))
    }

    /// Let the plugin finish an installation under `root_path`.
    ///
    /// `installed` holds every installed artifact, primary and additional.
    /// Whatever the plugin returns is ignored.
    pub fn finalize(&self, root_path: &str, installed: &[Info]) -> PluginResult<()> {
        let ctx = codec::post_install_context(&self.lua, root_path, installed)?;
        self.call(Capability::Finalize, ctx)?;
        Ok(())
    }

    /// Compute the environment variables for an installed package.
    ///
    /// Every plugin must contribute at least one variable; an empty answer is
    /// reported as [`PluginError::EmptyResult`].
    pub fn environment_keys(&self, pkg: &Package) -> PluginResult<Vec<EnvironmentEntry>> {
        let ctx = codec::env_keys_context(&self.lua, pkg)?;
        let value = self.call(Capability::EnvironmentKeys, ctx)?;

        let entries = codec::decode_env_keys(value)
            .map_err(|source| self.shape_error(Capability::EnvironmentKeys, source))?;
        if entries.is_empty() {
            return Err(PluginError::EmptyResult(Capability::EnvironmentKeys));
        }
        Ok(entries)
    }

    /// Release the runtime. The plugin cannot be used afterwards.
    pub fn close(self) {
        debug!(plugin = self.name(), "Closing plugin runtime");
        let Plugin { bridge, lua, .. } = self;
        drop(bridge);
        drop(lua);
    }

    fn call(&self, cap: Capability, ctx: Table) -> PluginResult<Value> {
        Ok(self
            .bridge
            .call(self.name(), cap, ctx)?
            .unwrap_or(Value::Nil))
    }

    fn shape_error(&self, capability: Capability, source: ShapeError) -> PluginError {
        warn!(plugin = self.name(), capability = %capability, "Invalid return value: {}", source);
        PluginError::Shape { capability, source }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::CaptureHost;

    const PLUGIN: &str = r#"
PLUGIN = {
    name = "java",
    version = "0.1.0",
    author = "sdkforge",
    updateUrl = "https://example.com/java.lua",
}

function PLUGIN:Available(ctx)
    return {
        { version = "21", note = "lts" },
        { version = "17", additional = { { name = "jmc", version = "8.3" } } },
    }
end

function PLUGIN:PreInstall(ctx)
    if ctx.version == "0" then
        return nil
    end
    return { version = ctx.version, url = "https://example.com/" .. OS_TYPE .. "/" .. ctx.version }
end

function PLUGIN:PostInstall(ctx)
    print("installed into", ctx.rootPath)
end

function PLUGIN:EnvKeys(ctx)
    return {
        { key = "JAVA_HOME", value = ctx.path },
        { key = "PATH", value = ctx.path .. "/bin" },
    }
end
"#;

    fn linux_loader() -> PluginLoader {
        PluginLoader::new(Platform::new(OsType::Linux, ArchType::Amd64))
    }

    #[test]
    fn test_load_extracts_metadata() {
        let plugin = linux_loader().load(PLUGIN).unwrap();
        let metadata = plugin.metadata();
        assert_eq!(metadata.name, "java");
        assert_eq!(metadata.version, "0.1.0");
        assert_eq!(metadata.author, "sdkforge");
        assert_eq!(metadata.update_url, "https://example.com/java.lua");
        assert!(plugin.has_capability(Capability::Resolve));
        assert_eq!(plugin.label("21"), "java@21");
        plugin.close();
    }

    #[test]
    fn test_discover() {
        let plugin = linux_loader().load(PLUGIN).unwrap();
        let packages = plugin.discover().unwrap();

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].main, Info::new("java", "21").with_note("lts"));
        assert_eq!(packages[1].additional, vec![Info::new("jmc", "8.3")]);
    }

    #[test]
    fn test_resolve_uses_platform_globals() {
        let plugin = linux_loader().load(PLUGIN).unwrap();

        let pkg = plugin.resolve(&Version::from("21")).unwrap().unwrap();
        assert_eq!(pkg.main.path, "https://example.com/linux/21");
        assert!(plugin.resolve(&Version::from("0")).unwrap().is_none());
    }

    #[test]
    fn test_finalize_prints_through_host() {
        let host = Arc::new(CaptureHost::default());
        let plugin = linux_loader().with_host(host.clone()).load(PLUGIN).unwrap();

        plugin
            .finalize("/sdk/java", &[Info::new("java", "21").with_path("/sdk/java")])
            .unwrap();

        let lines = host.lines.lock().unwrap();
        assert_eq!(lines[0].1, "installed into\t/sdk/java");
    }

    #[test]
    fn test_environment_keys() {
        let plugin = linux_loader().load(PLUGIN).unwrap();
        let pkg = Package::new(Info::new("java", "21").with_path("/sdk/java"));

        let entries = plugin.environment_keys(&pkg).unwrap();
        assert_eq!(
            entries,
            vec![
                EnvironmentEntry::new("JAVA_HOME", "/sdk/java"),
                EnvironmentEntry::new("PATH", "/sdk/java/bin"),
            ]
        );
    }

    #[test]
    fn test_float_metadata_formatted_like_lua() {
        let source = r#"
            PLUGIN = { name = "java", version = 1.0 }
            function PLUGIN:Available() end
            function PLUGIN:PostInstall() end
            function PLUGIN:EnvKeys() end
        "#;

        let plugin = linux_loader().load(source).unwrap();
        assert_eq!(plugin.metadata().version, "1.0");
    }

    #[test]
    fn test_failing_global_lookup_is_load_error() {
        struct Strict;

        impl Preloader for Strict {
            fn preload(&self, lua: &Lua) -> mlua::Result<()> {
                lua.load(
                    r#"setmetatable(_G, { __index = function(_, k) error("undefined global " .. k) end })"#,
                )
                .exec()
            }
        }

        let err = linux_loader()
            .with_preloader(Arc::new(Strict))
            .load("local x = 1")
            .unwrap_err();
        assert!(matches!(err, PluginError::Setup(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_metadata_type() {
        let source = r#"
            PLUGIN = { name = {} }
            function PLUGIN:Available() end
            function PLUGIN:PostInstall() end
            function PLUGIN:EnvKeys() end
        "#;

        let err = linux_loader().load(source).unwrap_err();
        assert!(matches!(err, PluginError::InvalidMetadata("name")));
    }

    #[test]
    fn test_preloader_runs_before_plugin() {
        struct Greeting;

        impl Preloader for Greeting {
            fn preload(&self, lua: &Lua) -> mlua::Result<()> {
                lua.globals().set("GREETING", "hello")
            }
        }

        let source = r#"
            PLUGIN = { name = GREETING }
            function PLUGIN:Available() end
            function PLUGIN:PostInstall() end
            function PLUGIN:EnvKeys() end
        "#;

        let plugin = linux_loader()
            .with_preloader(Arc::new(Greeting))
            .load(source)
            .unwrap();
        assert_eq!(plugin.name(), "hello");
    }

    #[test]
    fn test_plugin_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Plugin>();
    }
}
