//! # sdkforge-runtime
//!
//! Lua plugin runtime for sdkforge SDK plugins.
//!
//! This crate provides:
//! - Plugin loading into an isolated Lua runtime per plugin
//! - Capability validation (`Available`, `PostInstall`, `EnvKeys`, optional `PreInstall`)
//! - Protected calls that turn guest errors into values
//! - Marshalling between host records and Lua tables
//! - Plugin discovery from a plugin directory
//!
//! ## Plugin Structure
//!
//! A plugin is a Lua file that assigns a table to the `PLUGIN` global:
//!
//! ```lua
//! PLUGIN = { name = "java", version = "0.1.0", author = "me" }
//!
//! function PLUGIN:Available(ctx)
//!     return { { version = "21", note = "lts" } }
//! end
//!
//! function PLUGIN:PreInstall(ctx)
//!     return { version = ctx.version, url = "https://example.com/" .. OS_TYPE .. "/" .. ctx.version }
//! end
//!
//! function PLUGIN:PostInstall(ctx) end
//!
//! function PLUGIN:EnvKeys(ctx)
//!     return { { key = "JAVA_HOME", value = ctx.path } }
//! end
//! ```
//!
//! `OS_TYPE` and `ARCH_TYPE` are read-only globals describing the target
//! platform, and `print` writes through the host.

pub mod capability;
pub mod codec;
pub mod discovery;
pub mod error;
pub mod host;
pub mod platform;
pub mod plugin;
pub mod sdk;

mod bridge;

pub use capability::Capability;
pub use codec::ShapeError;
pub use discovery::{default_plugin_dir, discover_plugins, find_plugin, PluginSource};
pub use error::{ErrorKind, PluginError, PluginResult};
pub use host::{HostFunctions, StdoutHost, TracingHost};
pub use platform::{ArchType, OsType, Platform};
pub use plugin::{Plugin, PluginLoader, PluginMetadata, Preloader};
pub use sdk::{EnvironmentEntry, Info, Package, Version};
