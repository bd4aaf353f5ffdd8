//! Capability contract between the host and a plugin.
//!
//! A plugin participates by defining functions on its `PLUGIN` table. The
//! required ones are checked once when the plugin is loaded; afterwards the
//! bound functions are called directly, without looking them up again.

use crate::error::{PluginError, PluginResult};
use mlua::{Function, Table, Value};
use std::fmt;

/// A named function a plugin must or may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// List the versions a plugin can install.
    Discover,

    /// Compute the install source for a version (optional).
    Resolve,

    /// Post-install bookkeeping.
    Finalize,

    /// Environment variables for an installed package.
    EnvironmentKeys,
}

impl Capability {
    /// Capabilities every plugin has to define, in validation order.
    pub const REQUIRED: [Capability; 3] = [
        Capability::Discover,
        Capability::Finalize,
        Capability::EnvironmentKeys,
    ];

    /// Name of the function on the plugin table.
    pub fn guest_name(&self) -> &'static str {
        match self {
            Capability::Discover => "Available",
            Capability::Resolve => "PreInstall",
            Capability::Finalize => "PostInstall",
            Capability::EnvironmentKeys => "EnvKeys",
        }
    }

    /// Host-side name of the capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Discover => "Discover",
            Capability::Resolve => "Resolve",
            Capability::Finalize => "Finalize",
            Capability::EnvironmentKeys => "EnvironmentKeys",
        }
    }

    /// Whether a plugin may omit this capability.
    pub fn is_optional(&self) -> bool {
        matches!(self, Capability::Resolve)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Functions bound from a validated plugin table.
#[derive(Clone, Debug)]
pub struct CapabilitySet {
    discover: Function,
    resolve: Option<Function>,
    finalize: Function,
    environment_keys: Function,
}

impl CapabilitySet {
    /// Validate a plugin table and bind its capability functions.
    ///
    /// Fails with the first required capability that is not a function. An
    /// optional capability may be nil, but any other non-function value is
    /// rejected as well.
    pub fn bind(plugin: &Table) -> PluginResult<Self> {
        let required = |cap: Capability| -> PluginResult<Function> {
            lookup(plugin, cap)?.ok_or(PluginError::MissingCapability(cap))
        };

        let discover = required(Capability::Discover)?;
        let finalize = required(Capability::Finalize)?;
        let environment_keys = required(Capability::EnvironmentKeys)?;
        let resolve = lookup(plugin, Capability::Resolve)?;

        Ok(Self {
            discover,
            resolve,
            finalize,
            environment_keys,
        })
    }

    /// Get the bound function for a capability, if the plugin defines it.
    pub fn get(&self, cap: Capability) -> Option<&Function> {
        match cap {
            Capability::Discover => Some(&self.discover),
            Capability::Resolve => self.resolve.as_ref(),
            Capability::Finalize => Some(&self.finalize),
            Capability::EnvironmentKeys => Some(&self.environment_keys),
        }
    }

    /// Check if the plugin defines a capability.
    pub fn has(&self, cap: Capability) -> bool {
        self.get(cap).is_some()
    }
}

/// Look up one capability. `Ok(None)` means the field is nil.
fn lookup(plugin: &Table, cap: Capability) -> PluginResult<Option<Function>> {
    match plugin.raw_get::<Value>(cap.guest_name())? {
        Value::Function(f) => Ok(Some(f)),
        Value::Nil if cap.is_optional() => Ok(None),
        _ => Err(PluginError::MissingCapability(cap)),
    }
}
