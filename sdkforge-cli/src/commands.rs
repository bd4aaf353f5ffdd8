//! CLI command implementations.
//!
//! Each command drives one plugin operation and renders the result either as
//! human-readable text or as JSON.

use crate::plugin::{PluginInfo, PluginManager, PluginStatus};
use anyhow::{bail, Context, Result};
use sdkforge_runtime::{Info, Package, Plugin, Version};
use serde::Serialize;
use std::fmt::Write;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Parse an `--additional` argument of the form `name=path`.
pub fn parse_additional(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), path.to_string()))
        }
        _ => Err(format!("expected name=path, got `{}`", arg)),
    }
}

/// List every plugin in the plugin directory.
pub fn plugins(manager: &mut PluginManager, format: Format) -> Result<String> {
    manager
        .discover_and_load()
        .with_context(|| format!("Failed to read {}", manager.plugin_dir().display()))?;

    let plugins = manager.list_plugins();
    if format == Format::Json {
        return to_json(&plugins);
    }

    if plugins.is_empty() {
        return Ok(format!(
            "No plugins found in {}\n",
            manager.plugin_dir().display()
        ));
    }

    let mut out = String::new();
    for PluginInfo {
        id,
        name,
        version,
        author,
        status,
    } in &plugins
    {
        match status {
            PluginStatus::Loaded if author.is_empty() => writeln!(out, "{}@{}", name, version)?,
            PluginStatus::Loaded => writeln!(out, "{}@{} by {}", name, version, author)?,
            PluginStatus::Failed(reason) => writeln!(out, "{} (failed: {})", id, reason)?,
        }
    }
    Ok(out)
}

/// List the versions a plugin offers.
pub fn available(plugin: &Plugin, format: Format) -> Result<String> {
    let packages = plugin
        .discover()
        .with_context(|| format!("{} failed to list versions", plugin.name()))?;

    if format == Format::Json {
        return to_json(&packages);
    }

    let mut out = String::new();
    for pkg in &packages {
        write!(out, "{}", plugin.label(pkg.main.version.as_str()))?;
        if !pkg.main.note.is_empty() {
            write!(out, " ({})", pkg.main.note)?;
        }
        writeln!(out)?;
        for extra in &pkg.additional {
            writeln!(out, "  + {}@{}", extra.name, extra.version)?;
        }
    }
    Ok(out)
}

/// Show where a plugin installs `version` from.
pub fn resolve(plugin: &Plugin, version: &str, format: Format) -> Result<String> {
    let resolved = plugin
        .resolve(&Version::from(version))
        .with_context(|| format!("{} failed to resolve {}", plugin.name(), version))?;

    if format == Format::Json {
        return to_json(&resolved);
    }

    let Some(pkg) = resolved else {
        return Ok(format!(
            "{} has no install source override\n",
            plugin.label(version)
        ));
    };

    let mut out = String::new();
    for info in pkg.infos() {
        writeln!(out, "{}@{} {}", info.name, info.version, info.path)?;
    }
    Ok(out)
}

/// Run a plugin's post-install step for `version` installed under `root_path`.
pub fn finalize(plugin: &Plugin, version: &str, root_path: &str) -> Result<String> {
    let installed = [Info::new(plugin.name(), version).with_path(root_path)];
    plugin
        .finalize(root_path, &installed)
        .with_context(|| format!("{} failed to finalize {}", plugin.name(), version))?;

    Ok(format!("Finalized {} in {}\n", plugin.label(version), root_path))
}

/// Compute the environment variables for a package installed at `path`.
pub fn env(
    plugin: &Plugin,
    version: &str,
    path: &str,
    additional: &[(String, String)],
    format: Format,
) -> Result<String> {
    if path.is_empty() {
        bail!("install path cannot be empty");
    }

    let pkg = additional.iter().fold(
        Package::new(Info::new(plugin.name(), version).with_path(path)),
        |pkg, (name, path)| pkg.with_additional(Info::new(name.as_str(), "").with_path(path.as_str())),
    );

    let entries = plugin
        .environment_keys(&pkg)
        .with_context(|| format!("{} failed to compute environment", plugin.name()))?;

    if format == Format::Json {
        return to_json(&entries);
    }

    let mut out = String::new();
    for entry in &entries {
        writeln!(out, "{}", entry)?;
    }
    Ok(out)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdkforge_runtime::{ArchType, OsType, Platform, PluginLoader};
    use std::path::Path;
    use tempfile::TempDir;

    const NODE: &str = r#"
PLUGIN = { name = "nodejs", version = "0.3.0", author = "sdkforge" }

function PLUGIN:Available(ctx)
    return {
        { version = "20.11.0", note = "lts", additional = { { name = "npm", version = "10.2.4" } } },
        { version = "21.6.1" },
    }
end

function PLUGIN:PreInstall(ctx)
    if ctx.version == "system" then
        return nil
    end
    return {
        version = ctx.version,
        url = "https://nodejs.org/dist/v" .. ctx.version .. "/node-" .. OS_TYPE .. "-x64.tar.gz",
    }
end

function PLUGIN:PostInstall(ctx)
    print("finalized " .. ctx.rootPath)
end

function PLUGIN:EnvKeys(ctx)
    local entries = { { key = "PATH", value = ctx.path .. "/bin" } }
    if ctx.additional_path and ctx.additional_path.npm then
        table.insert(entries, { key = "NPM_HOME", value = ctx.additional_path.npm })
    end
    return entries
end
"#;

    fn node_plugin() -> Plugin {
        PluginLoader::new(Platform::new(OsType::Linux, ArchType::Amd64))
            .load(NODE)
            .unwrap()
    }

    fn manager(dir: &Path) -> PluginManager {
        PluginManager::new(PluginLoader::new(Platform::current()), dir)
    }

    #[test]
    fn test_parse_additional() {
        assert_eq!(
            parse_additional("npm=/sdk/npm").unwrap(),
            ("npm".to_string(), "/sdk/npm".to_string())
        );
        assert!(parse_additional("npm").is_err());
        assert!(parse_additional("=/sdk/npm").is_err());
        assert!(parse_additional("npm=").is_err());
    }

    #[test]
    fn test_plugins_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let out = plugins(&mut manager(temp_dir.path()), Format::Text).unwrap();
        assert!(out.starts_with("No plugins found"));
    }

    #[test]
    fn test_plugins_lists_loaded_and_failed() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("nodejs.lua"), NODE).unwrap();
        std::fs::write(temp_dir.path().join("empty.lua"), "").unwrap();

        let out = plugins(&mut manager(temp_dir.path()), Format::Text).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("empty (failed:"));
        assert_eq!(lines[1], "nodejs@0.3.0 by sdkforge");
    }

    #[test]
    fn test_plugins_json() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("nodejs.lua"), NODE).unwrap();

        let out = plugins(&mut manager(temp_dir.path()), Format::Json).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json[0]["name"], "nodejs");
        assert_eq!(json[0]["status"]["state"], "loaded");
    }

    #[test]
    fn test_available_text() {
        let out = available(&node_plugin(), Format::Text).unwrap();
        assert_eq!(
            out,
            "nodejs@20.11.0 (lts)\n  + npm@10.2.4\nnodejs@21.6.1\n"
        );
    }

    #[test]
    fn test_available_json() {
        let out = available(&node_plugin(), Format::Json).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["main"]["version"], "20.11.0");
        assert_eq!(json[0]["additional"][0]["name"], "npm");
    }

    #[test]
    fn test_resolve() {
        let plugin = node_plugin();

        let out = resolve(&plugin, "20.11.0", Format::Text).unwrap();
        assert_eq!(
            out,
            "nodejs@20.11.0 https://nodejs.org/dist/v20.11.0/node-linux-x64.tar.gz\n"
        );

        let out = resolve(&plugin, "system", Format::Text).unwrap();
        assert_eq!(out, "nodejs@system has no install source override\n");

        let out = resolve(&plugin, "system", Format::Json).unwrap();
        assert_eq!(out.trim(), "null");
    }

    #[test]
    fn test_finalize() {
        let out = finalize(&node_plugin(), "20.11.0", "/sdk/nodejs").unwrap();
        assert_eq!(out, "Finalized nodejs@20.11.0 in /sdk/nodejs\n");
    }

    #[test]
    fn test_env_with_additional() {
        let additional = vec![("npm".to_string(), "/sdk/npm".to_string())];
        let out = env(&node_plugin(), "20.11.0", "/sdk/nodejs", &additional, Format::Text).unwrap();
        assert_eq!(out, "PATH=/sdk/nodejs/bin\nNPM_HOME=/sdk/npm\n");
    }

    #[test]
    fn test_env_rejects_empty_path() {
        assert!(env(&node_plugin(), "20.11.0", "", &[], Format::Text).is_err());
    }
}
