//! # Plugin Management
//!
//! Loads sdkforge Lua plugins from the plugin directory for the CLI.
//!
//! This module provides:
//! - Plugin discovery and loading
//! - Tracking of plugins that failed to load
//! - Releasing every runtime on shutdown

mod manager;

pub use manager::{PluginInfo, PluginManager, PluginStatus};
