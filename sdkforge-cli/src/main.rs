//! # sdkforge
//!
//! Command-line harness for sdkforge Lua plugins.
//!
//! This binary is responsible for:
//! - Discovering plugins in the plugin directory
//! - Loading a plugin for the configured platform
//! - Driving one plugin operation per invocation and printing the result
//!
//! ## Configuration
//!
//! The CLI reads configuration from `$XDG_CONFIG_HOME/sdkforge/config.toml`,
//! creating a commented default file on first run.
//!
//! ## Running
//!
//! ```bash
//! # List plugins
//! cargo run --bin sdkforge -- plugins
//!
//! # Ask a plugin for its versions
//! cargo run --bin sdkforge -- available java
//!
//! # Environment for an installed SDK, with debug logging
//! RUST_LOG=debug cargo run --bin sdkforge -- env java /sdk/java --sdk-version 21
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sdkforge_runtime::PluginLoader;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sdkforge_cli::commands::{self, Format};
use sdkforge_cli::config::Config;
use sdkforge_cli::plugin::PluginManager;

#[derive(Debug, Parser)]
#[command(name = "sdkforge", version, about = "Develop and try sdkforge Lua plugins")]
struct Cli {
    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing plugin .lua files
    #[arg(long, global = true)]
    plugin_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List discovered plugins
    Plugins,

    /// List the versions a plugin offers
    Available {
        plugin: String,
    },

    /// Show where a plugin installs a version from
    Resolve {
        plugin: String,
        version: String,
    },

    /// Run a plugin's post-install step
    Finalize {
        plugin: String,
        version: String,
        root_path: String,
    },

    /// Print the environment variables for an installed SDK
    Env {
        plugin: String,
        path: String,

        /// Version of the installed SDK
        #[arg(long, default_value = "")]
        sdk_version: String,

        /// Additional installed artifact, as name=path
        #[arg(long = "additional", value_parser = commands::parse_additional)]
        additional: Vec<(String, String)>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // An explicit config file must load; the default location falls back to defaults.
    let (config, config_error) = match &cli.config {
        Some(path) => (Config::load(path)?, None),
        None => match Config::load_default() {
            Ok(cfg) => (cfg, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.runtime.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    debug!("Starting sdkforge v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!("Failed to load config, using defaults: {:#}", e);
    }

    let plugin_dir = match cli.plugin_dir {
        Some(dir) => dir,
        None => config.plugin_dir()?,
    };
    let platform = config.platform();
    info!(
        "Using plugins from {} for {}/{}",
        plugin_dir.display(),
        platform.os,
        platform.arch
    );

    let loader = PluginLoader::new(platform).with_host(config.runtime.plugin_output.host());
    let mut manager = PluginManager::new(loader, plugin_dir);
    let format = if cli.json { Format::Json } else { Format::Text };

    let result = run(cli.command, &mut manager, format);
    manager.shutdown();

    print!("{}", result?);
    Ok(())
}

fn run(command: Command, manager: &mut PluginManager, format: Format) -> Result<String> {
    match command {
        Command::Plugins => commands::plugins(manager, format),
        Command::Available { plugin } => {
            let plugin = load(manager, &plugin)?;
            commands::available(plugin, format)
        }
        Command::Resolve { plugin, version } => {
            let plugin = load(manager, &plugin)?;
            commands::resolve(plugin, &version, format)
        }
        Command::Finalize {
            plugin,
            version,
            root_path,
        } => {
            let plugin = load(manager, &plugin)?;
            commands::finalize(plugin, &version, &root_path)
        }
        Command::Env {
            plugin,
            path,
            sdk_version,
            additional,
        } => {
            let plugin = load(manager, &plugin)?;
            commands::env(plugin, &sdk_version, &path, &additional, format)
        }
    }
}

fn load<'a>(
    manager: &'a mut PluginManager,
    name: &str,
) -> Result<&'a sdkforge_runtime::Plugin> {
    let dir = manager.plugin_dir().display().to_string();
    manager
        .load(name)
        .with_context(|| format!("Failed to load plugin {} from {}", name, dir))
}
