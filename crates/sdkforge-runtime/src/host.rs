//! Host functions exposed to plugins.
//!
//! The loader replaces the guest's `print` with one that routes output through
//! a [`HostFunctions`] implementation. The binding lives in the plugin's own
//! runtime, so two plugins never share or overwrite each other's output sink.

use mlua::{Function, Lua, MultiValue};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

/// Host functions available to plugins.
pub trait HostFunctions: Send + Sync {
    /// Emit one line of diagnostic output from a plugin.
    fn print(&self, plugin: &str, line: &str);
}

/// Writes plugin output to the host's stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutHost;

impl HostFunctions for StdoutHost {
    fn print(&self, _plugin: &str, line: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout is not the plugin's problem.
        let _ = writeln!(stdout, "{}", line);
    }
}

/// Forwards plugin output to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHost;

impl HostFunctions for TracingHost {
    fn print(&self, plugin: &str, line: &str) {
        info!(target: "sdkforge::plugin", plugin = plugin, "{}", line);
    }
}

/// Install the host-backed `print` into this runtime's globals.
///
/// Arguments are converted with the guest's own `tostring` and joined with
/// tabs, matching the stock Lua `print`.
pub(crate) fn register(lua: &Lua, plugin: &str, host: Arc<dyn HostFunctions>) -> mlua::Result<()> {
    let plugin = plugin.to_string();

    let print = lua.create_function(move |lua, args: MultiValue| {
        let tostring: Function = lua.globals().get("tostring")?;
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(tostring.call::<String>(arg)?);
        }
        host.print(&plugin, &parts.join("\t"));
        Ok(())
    })?;

    lua.globals().set("print", print)
}
