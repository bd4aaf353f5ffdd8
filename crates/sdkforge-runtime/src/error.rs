//! Error types for the sdkforge plugin runtime.

use crate::capability::Capability;
use crate::codec::ShapeError;
use thiserror::Error;

/// Errors that can occur while loading or calling a plugin.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Plugin source failed to execute at top level.
    #[error("Content cannot be executed: {0}")]
    NotExecutable(String),

    /// Preparing the guest runtime before executing the plugin failed.
    #[error("Plugin runtime setup failed: {0}")]
    Setup(#[source] mlua::Error),

    /// The `PLUGIN` global is absent or not a table.
    #[error("Plugin object not found")]
    PluginObjectNotFound,

    /// A metadata field on the plugin object has an unusable type.
    #[error("Invalid plugin metadata field: {0}")]
    InvalidMetadata(&'static str),

    /// A required capability is not defined by the plugin.
    #[error("[{}] function not found", .0.guest_name())]
    MissingCapability(Capability),

    /// The guest raised an error while a capability was running.
    #[error("{capability} failed: {message}")]
    Call {
        capability: Capability,
        message: String,
    },

    /// The guest returned a value of the wrong shape.
    #[error("{capability} returned an invalid value: {source}")]
    Shape {
        capability: Capability,
        #[source]
        source: ShapeError,
    },

    /// A capability that must produce entries produced none.
    #[error("{0} returned no entries")]
    EmptyResult(Capability),

    /// Building a context record inside the guest runtime failed.
    #[error("Guest runtime error: {0}")]
    Runtime(#[from] mlua::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classification of a [`PluginError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The plugin could not be loaded.
    Load,
    /// The plugin does not satisfy the capability contract.
    Contract,
    /// A capability call raised a guest error.
    Call,
    /// A capability returned a malformed value.
    Shape,
    /// A capability returned no entries where at least one is required.
    EmptyResult,
}

impl PluginError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PluginError::NotExecutable(_)
            | PluginError::Setup(_)
            | PluginError::PluginObjectNotFound
            | PluginError::InvalidMetadata(_)
            | PluginError::Io(_) => ErrorKind::Load,
            PluginError::MissingCapability(_) => ErrorKind::Contract,
            PluginError::Call { .. } | PluginError::Runtime(_) => ErrorKind::Call,
            PluginError::Shape { .. } => ErrorKind::Shape,
            PluginError::EmptyResult(_) => ErrorKind::EmptyResult,
        }
    }

    /// Whether the plugin itself is unusable, as opposed to a single call failing.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Load | ErrorKind::Contract)
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(PluginError::PluginObjectNotFound.kind(), ErrorKind::Load);
        assert!(PluginError::MissingCapability(Capability::Discover).is_fatal());

        let call = PluginError::Call {
            capability: Capability::Finalize,
            message: "boom".to_string(),
        };
        assert_eq!(call.kind(), ErrorKind::Call);
        assert!(!call.is_fatal());
        assert!(!PluginError::EmptyResult(Capability::EnvironmentKeys).is_fatal());
    }

    #[test]
    fn test_missing_capability_message() {
        let err = PluginError::MissingCapability(Capability::EnvironmentKeys);
        assert_eq!(err.to_string(), "[EnvKeys] function not found");
    }
}
