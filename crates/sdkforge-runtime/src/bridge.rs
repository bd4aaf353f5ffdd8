//! Protected calls into plugin capabilities.
//!
//! Every capability is invoked method-style, `PLUGIN:<Function>(ctx)`, with the
//! plugin table as receiver and a context record as the only argument. Errors
//! raised by the guest come back as [`PluginError::Call`] values.

use crate::capability::{Capability, CapabilitySet};
use crate::error::{PluginError, PluginResult};
use mlua::{Table, Value};
use tracing::{debug, warn};

/// The plugin table together with its validated capabilities.
pub(crate) struct CallBridge {
    plugin: Table,
    capabilities: CapabilitySet,
}

impl CallBridge {
    /// Validate a plugin table and build a bridge for it.
    pub(crate) fn new(plugin: Table) -> PluginResult<Self> {
        let capabilities = CapabilitySet::bind(&plugin)?;
        Ok(Self {
            plugin,
            capabilities,
        })
    }

    /// The plugin table.
    pub(crate) fn plugin(&self) -> &Table {
        &self.plugin
    }

    /// Whether the plugin defines a capability.
    pub(crate) fn has(&self, cap: Capability) -> bool {
        self.capabilities.has(cap)
    }

    /// Call a capability and return its first result.
    ///
    /// Returns `Ok(None)` when the capability is optional and the plugin does
    /// not define it.
    pub(crate) fn call(&self, label: &str, cap: Capability, ctx: Table) -> PluginResult<Option<Value>> {
        let Some(function) = self.capabilities.get(cap) else {
            debug!(plugin = label, capability = %cap, "Capability not defined, skipping");
            return Ok(None);
        };

        debug!(plugin = label, capability = %cap, "Calling {}", cap.guest_name());
        match function.call::<Value>((self.plugin.clone(), ctx)) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let message = guest_message(&e);
                warn!(plugin = label, capability = %cap, "Plugin call failed: {}", message);
                Err(PluginError::Call {
                    capability: cap,
                    message,
                })
            }
        }
    }
}

/// Extract the message a guest raised, without mlua's callback wrapping.
fn guest_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => guest_message(cause),
        other => other.to_string(),
    }
}
