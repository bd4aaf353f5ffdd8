//! Platform identification exposed to plugins.
//!
//! Every plugin runtime gets two read-only globals, `OS_TYPE` and `ARCH_TYPE`,
//! so plugin authors can pick platform-specific downloads.

use mlua::{Lua, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Global holding the operating system family.
pub const OS_TYPE: &str = "OS_TYPE";

/// Global holding the CPU architecture family.
pub const ARCH_TYPE: &str = "ARCH_TYPE";

/// Operating system family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OsType {
    Windows,
    Linux,
    Darwin,
    /// Any other target, by its Rust `target_os` name.
    Other(String),
}

impl OsType {
    /// The operating system this binary was built for.
    pub fn current() -> Self {
        Self::parse(std::env::consts::OS)
    }

    /// Parse an OS name. Rust's `macos` is accepted as `darwin`.
    pub fn parse(s: &str) -> Self {
        match s {
            "windows" => OsType::Windows,
            "linux" => OsType::Linux,
            "darwin" | "macos" => OsType::Darwin,
            other => OsType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OsType::Windows => "windows",
            OsType::Linux => "linux",
            OsType::Darwin => "darwin",
            OsType::Other(s) => s,
        }
    }
}

/// CPU architecture family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArchType {
    Amd64,
    Arm64,
    X86,
    /// Any other target, by its Rust `target_arch` name.
    Other(String),
}

impl ArchType {
    /// The architecture this binary was built for.
    pub fn current() -> Self {
        Self::parse(std::env::consts::ARCH)
    }

    /// Parse an architecture name, accepting both Go-style and Rust-style names.
    pub fn parse(s: &str) -> Self {
        match s {
            "amd64" | "x86_64" => ArchType::Amd64,
            "arm64" | "aarch64" => ArchType::Arm64,
            "386" | "x86" => ArchType::X86,
            other => ArchType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ArchType::Amd64 => "amd64",
            ArchType::Arm64 => "arm64",
            ArchType::X86 => "386",
            ArchType::Other(s) => s,
        }
    }
}

macro_rules! string_enum_serde {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::parse(&s))
            }
        }
    };
}

string_enum_serde!(OsType);
string_enum_serde!(ArchType);

/// The platform a plugin is loaded for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: OsType,
    pub arch: ArchType,
}

impl Platform {
    pub fn new(os: OsType, arch: ArchType) -> Self {
        Self { os, arch }
    }

    /// The platform this binary was built for.
    pub fn current() -> Self {
        Self::new(OsType::current(), ArchType::current())
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

/// Lua snippet guarding the platform globals. Receives the table of fixed
/// values; reads fall through to it and writes to its keys raise an error.
/// A metatable already on `_G` is chained, and the guard is locked so guest
/// code cannot replace it. `rawset`/`rawget` on `_G` honour the fixed values.
const READ_ONLY_GLOBALS: &str = r#"
local fixed = ...
local globals = _G
local raw_get, raw_set = rawget, rawset

local previous = getmetatable(globals)
if previous ~= nil and type(previous) ~= "table" then
    error("cannot bind platform globals: the globals metatable is protected", 0)
end

local guard = {}
if previous ~= nil then
    for k, v in pairs(previous) do
        guard[k] = v
    end
end
local index = guard.__index
local newindex = guard.__newindex

guard.__metatable = "locked"

guard.__index = function(t, k)
    local v = fixed[k]
    if v ~= nil then
        return v
    end
    if type(index) == "function" then
        return index(t, k)
    elseif index ~= nil then
        return index[k]
    end
end

guard.__newindex = function(t, k, v)
    if fixed[k] ~= nil then
        error("attempt to modify read-only global '" .. tostring(k) .. "'", 2)
    end
    if type(newindex) == "function" then
        return newindex(t, k, v)
    elseif newindex ~= nil then
        newindex[k] = v
        return
    end
    raw_set(t, k, v)
end

setmetatable(globals, guard)

rawset = function(t, k, v)
    if rawequal(t, globals) and fixed[k] ~= nil then
        error("attempt to modify read-only global '" .. tostring(k) .. "'", 2)
    end
    return raw_set(t, k, v)
end

rawget = function(t, k)
    if rawequal(t, globals) and fixed[k] ~= nil then
        return fixed[k]
    end
    return raw_get(t, k)
end
"#;

/// Bind `OS_TYPE` and `ARCH_TYPE` into this runtime's globals as read-only values.
pub(crate) fn bind_globals(lua: &Lua, platform: &Platform) -> mlua::Result<()> {
    let fixed: Table = lua.create_table()?;
    fixed.set(OS_TYPE, platform.os.as_str())?;
    fixed.set(ARCH_TYPE, platform.arch.as_str())?;

    lua.load(READ_ONLY_GLOBALS)
        .set_name("=platform")
        .call::<()>(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(OsType::parse("macos"), OsType::Darwin);
        assert_eq!(ArchType::parse("x86_64"), ArchType::Amd64);
        assert_eq!(ArchType::parse("aarch64"), ArchType::Arm64);
        assert_eq!(ArchType::parse("riscv64"), ArchType::Other("riscv64".to_string()));
        assert_eq!(ArchType::X86.as_str(), "386");
    }

    #[test]
    fn test_deserialize_platform() {
        let platform: Platform =
            serde_json::from_str(r#"{ "os": "linux", "arch": "arm64" }"#).unwrap();
        assert_eq!(platform, Platform::new(OsType::Linux, ArchType::Arm64));
    }

    #[test]
    fn test_globals_are_read_only() {
        let lua = Lua::new();
        bind_globals(&lua, &Platform::new(OsType::Darwin, ArchType::Arm64)).unwrap();

        let os: String = lua.load("return OS_TYPE").eval().unwrap();
        assert_eq!(os, "darwin");

        assert!(lua.load(r#"OS_TYPE = "windows""#).exec().is_err());
        let arch: String = lua.load("return ARCH_TYPE").eval().unwrap();
        assert_eq!(arch, "arm64");

        lua.load("other_global = 1").exec().unwrap();
        let other: i64 = lua.load("return other_global").eval().unwrap();
        assert_eq!(other, 1);
    }

    #[test]
    fn test_guard_metatable_is_locked() {
        let lua = Lua::new();
        bind_globals(&lua, &Platform::new(OsType::Linux, ArchType::Amd64)).unwrap();

        let err = lua.load("setmetatable(_G, {})").exec().unwrap_err();
        assert!(err.to_string().contains("protected metatable"));

        let locked: String = lua.load("return getmetatable(_G)").eval().unwrap();
        assert_eq!(locked, "locked");

        lua.load("pcall(setmetatable, _G, {})").exec().unwrap();
        assert!(lua.load(r#"OS_TYPE = "windows""#).exec().is_err());
        let os: String = lua.load("return OS_TYPE").eval().unwrap();
        assert_eq!(os, "linux");
    }

    #[test]
    fn test_raw_access_respects_fixed_values() {
        let lua = Lua::new();
        bind_globals(&lua, &Platform::new(OsType::Linux, ArchType::Arm64)).unwrap();

        let arch: String = lua.load(r#"return rawget(_G, "ARCH_TYPE")"#).eval().unwrap();
        assert_eq!(arch, "arm64");
        assert!(lua.load(r#"rawset(_G, "ARCH_TYPE", "amd64")"#).exec().is_err());

        lua.load(r#"rawset(_G, "other", 2)"#).exec().unwrap();
        let other: i64 = lua.load(r#"return rawget(_G, "other")"#).eval().unwrap();
        assert_eq!(other, 2);

        let arch: String = lua.load("return ARCH_TYPE").eval().unwrap();
        assert_eq!(arch, "arm64");
    }

    #[test]
    fn test_existing_metatable_is_chained() {
        let lua = Lua::new();
        lua.load(
            r#"
            written = {}
            setmetatable(_G, {
                __index = function(_, k) return "fallback-" .. k end,
                __newindex = written,
            })
            "#,
        )
        .exec()
        .unwrap();
        bind_globals(&lua, &Platform::new(OsType::Darwin, ArchType::Amd64)).unwrap();

        let os: String = lua.load("return OS_TYPE").eval().unwrap();
        assert_eq!(os, "darwin");
        let missing: String = lua.load("return MISSING").eval().unwrap();
        assert_eq!(missing, "fallback-MISSING");

        lua.load("fresh = 3").exec().unwrap();
        let stored: i64 = lua.load("return written.fresh").eval().unwrap();
        assert_eq!(stored, 3);
        assert!(lua.load(r#"OS_TYPE = "linux""#).exec().is_err());
    }

    #[test]
    fn test_protected_metatable_fails_to_bind() {
        let lua = Lua::new();
        lua.load(r#"setmetatable(_G, { __metatable = "mine" })"#)
            .exec()
            .unwrap();
        assert!(bind_globals(&lua, &Platform::current()).is_err());
    }
}
