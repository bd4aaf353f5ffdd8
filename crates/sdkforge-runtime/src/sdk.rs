//! Host-side records exchanged with plugins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque version tag. Its meaning is defined by the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Create a version tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the raw tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for Version {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// One resolvable or installable artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Artifact name.
    pub name: String,

    /// Version tag.
    pub version: Version,

    /// Free-form note shown next to the version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,

    /// Install path, or download URL for resolved artifacts.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl Info {
    /// Create an artifact with a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<Version>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Set the note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Set the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// A primary artifact plus the artifacts installed alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// The primary SDK artifact.
    pub main: Info,

    /// Co-installed artifacts, each with a non-empty name.
    #[serde(default)]
    pub additional: Vec<Info>,
}

impl Package {
    /// Create a package without additional artifacts.
    pub fn new(main: Info) -> Self {
        Self {
            main,
            additional: Vec::new(),
        }
    }

    /// Add a co-installed artifact.
    pub fn with_additional(mut self, info: Info) -> Self {
        self.additional.push(info);
        self
    }

    /// Iterate over the primary artifact followed by the additional ones.
    pub fn infos(&self) -> impl Iterator<Item = &Info> {
        std::iter::once(&self.main).chain(self.additional.iter())
    }
}

/// One environment variable assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub key: String,
    pub value: String,
}

impl EnvironmentEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for EnvironmentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
