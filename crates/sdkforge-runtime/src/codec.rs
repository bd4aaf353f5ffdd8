//! Conversion between host records and Lua tables.
//!
//! Encoders build the context records handed to capability calls. Decoders
//! turn capability return values back into host records. Each record type
//! declares its required and optional fields through a `Record` reader, and every
//! mismatch is reported as a single [`ShapeError`] naming the offending
//! location. Decoding is all-or-nothing: one bad entry fails the whole value.

use crate::sdk::{EnvironmentEntry, Info, Package, Version};
use mlua::{Lua, Table, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// Version of the context protocol passed to `Available`.
pub const PROTOCOL_VERSION: &str = "0.0.1";

/// Path prefix used in shape error locations.
const ROOT: &str = "result";

/// A guest value did not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} at `{path}`")]
pub struct ShapeError {
    /// Location of the offending value, e.g. `result[2].additional[1].name`.
    pub path: String,

    /// What was wrong with it.
    pub reason: String,
}

impl ShapeError {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }

    fn expected(path: impl Into<String>, expected: &str, found: &Value) -> Self {
        Self::new(
            path,
            format!("expected {}, found {}", expected, found.type_name()),
        )
    }
}

type ShapeResult<T> = std::result::Result<T, ShapeError>;

// ============================================================================
// Encoding
// ============================================================================

/// Context for `Available`: `{plugin_version}`.
pub fn available_context(lua: &Lua) -> mlua::Result<Table> {
    let ctx = lua.create_table()?;
    ctx.set("plugin_version", PROTOCOL_VERSION)?;
    Ok(ctx)
}

/// Context for `PreInstall`: `{version}`.
pub fn pre_install_context(lua: &Lua, version: &Version) -> mlua::Result<Table> {
    let ctx = lua.create_table()?;
    ctx.set("version", version.as_str())?;
    Ok(ctx)
}

/// Context for `PostInstall`: `{rootPath, sdkInfo = {[name] = {name, version, path}}}`.
pub fn post_install_context(lua: &Lua, root_path: &str, installed: &[Info]) -> mlua::Result<Table> {
    let sdk_info = lua.create_table()?;
    for info in installed {
        sdk_info.set(info.name.as_str(), encode_info(lua, info)?)?;
    }

    let ctx = lua.create_table()?;
    ctx.set("sdkInfo", sdk_info)?;
    ctx.set("rootPath", root_path)?;
    Ok(ctx)
}

/// Context for `EnvKeys`: `{path, additional_path = {[name] = path}}`.
///
/// `additional_path` is only present when the package has additional artifacts.
pub fn env_keys_context(lua: &Lua, pkg: &Package) -> mlua::Result<Table> {
    let ctx = lua.create_table()?;
    ctx.set("path", pkg.main.path.as_str())?;

    if !pkg.additional.is_empty() {
        let paths = lua.create_table()?;
        for info in &pkg.additional {
            paths.set(info.name.as_str(), info.path.as_str())?;
        }
        ctx.set("additional_path", paths)?;
    }

    Ok(ctx)
}

/// Encode a whole package as `{name, version, note, path, additional = {...}}`.
///
/// The inverse of [`decode_package`].
pub fn encode_package(lua: &Lua, pkg: &Package) -> mlua::Result<Table> {
    let table = encode_info(lua, &pkg.main)?;
    let additional = lua.create_table()?;
    for (i, info) in pkg.additional.iter().enumerate() {
        additional.set(i + 1, encode_info(lua, info)?)?;
    }
    table.set("additional", additional)?;
    Ok(table)
}

fn encode_info(lua: &Lua, info: &Info) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("name", info.name.as_str())?;
    table.set("version", info.version.as_str())?;
    table.set("path", info.path.as_str())?;
    if !info.note.is_empty() {
        table.set("note", info.note.as_str())?;
    }
    Ok(table)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode the return value of `Available`.
///
/// `nil` means no versions are available. Otherwise every value of the
/// returned table is `{version, note?, additional? = {{name, version}, ...}}`.
/// The primary artifact is named after the plugin. Array entries keep their
/// order; entries under other keys follow, sorted by key.
pub fn decode_available(value: Value, plugin_name: &str) -> ShapeResult<Vec<Package>> {
    let table = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Table(table) => table,
        other => return Err(ShapeError::expected(ROOT, "a table", &other)),
    };

    entries(&table, ROOT)?
        .into_iter()
        .map(|(path, entry)| -> ShapeResult<Package> {
            let record = Record::new(entry, path)?;
            let main = Info::new(plugin_name, record.required("version")?)
                .with_note(record.optional("note")?);
            let additional = record.optional_list("additional", |item| {
                Ok(Info::new(item.name()?, item.required("version")?))
            })?;
            Ok(Package { main, additional })
        })
        .collect()
}

/// Decode the return value of `PreInstall`.
///
/// `nil` means the plugin has no override. Otherwise the value is
/// `{version, url, note?, additional? = {{name, version, url}, ...}}`; URLs are
/// stored in [`Info::path`].
pub fn decode_pre_install(value: Value, plugin_name: &str) -> ShapeResult<Option<Package>> {
    if value.is_nil() {
        return Ok(None);
    }

    let record = Record::new(value, ROOT.to_string())?;
    let main = Info::new(plugin_name, record.required("version")?)
        .with_note(record.optional("note")?)
        .with_path(record.required("url")?);
    let additional = record.optional_list("additional", |item| {
        Ok(Info::new(item.name()?, item.required("version")?).with_path(item.required("url")?))
    })?;

    Ok(Some(Package { main, additional }))
}

/// Decode the return value of `EnvKeys`.
///
/// Returns an empty list for `nil` or an empty table; callers decide whether
/// that is acceptable.
pub fn decode_env_keys(value: Value) -> ShapeResult<Vec<EnvironmentEntry>> {
    let table = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Table(table) => table,
        other => return Err(ShapeError::expected(ROOT, "a table", &other)),
    };

    entries(&table, ROOT)?
        .into_iter()
        .map(|(path, entry)| -> ShapeResult<EnvironmentEntry> {
            let record = Record::new(entry, path)?;
            Ok(EnvironmentEntry::new(
                record.required("key")?,
                record.required("value")?,
            ))
        })
        .collect()
}

/// Decode a package encoded by [`encode_package`], or authored in that shape.
pub fn decode_package(value: Value) -> ShapeResult<Package> {
    let record = Record::new(value, ROOT.to_string())?;
    let main = decode_info(&record)?;
    let additional = record.optional_list("additional", |item| decode_info(&item))?;
    Ok(Package { main, additional })
}

fn decode_info(record: &Record) -> ShapeResult<Info> {
    Ok(Info::new(record.name()?, record.required("version")?)
        .with_note(record.optional("note")?)
        .with_path(record.optional("path")?))
}

/// A guest table being read as a record with declared fields.
struct Record {
    table: Table,
    path: String,
}

impl Record {
    fn new(value: Value, path: String) -> ShapeResult<Self> {
        match value {
            Value::Table(table) => Ok(Self { table, path }),
            other => Err(ShapeError::expected(path, "a table", &other)),
        }
    }

    fn field_path(&self, field: &str) -> String {
        format!("{}.{}", self.path, field)
    }

    fn get(&self, field: &str) -> ShapeResult<Value> {
        self.table
            .raw_get::<Value>(field)
            .map_err(|e| ShapeError::new(self.field_path(field), e.to_string()))
    }

    /// A string field that must be present.
    fn required(&self, field: &str) -> ShapeResult<String> {
        string_value(self.get(field)?, &self.field_path(field))?
            .ok_or_else(|| ShapeError::new(self.field_path(field), "missing required field"))
    }

    /// A string field that defaults to empty.
    fn optional(&self, field: &str) -> ShapeResult<String> {
        Ok(string_value(self.get(field)?, &self.field_path(field))?.unwrap_or_default())
    }

    /// The required, non-empty `name` field.
    fn name(&self) -> ShapeResult<String> {
        let name = self.required("name")?;
        if name.is_empty() {
            return Err(ShapeError::new(self.field_path("name"), "name cannot be empty"));
        }
        Ok(name)
    }

    /// An optional table whose values are all records of one type.
    fn optional_list<T>(
        &self,
        field: &str,
        mut decode: impl FnMut(Record) -> ShapeResult<T>,
    ) -> ShapeResult<Vec<T>> {
        let path = self.field_path(field);
        match self.get(field)? {
            Value::Nil => Ok(Vec::new()),
            Value::Table(table) => entries(&table, &path)?
                .into_iter()
                .map(|(path, value)| Record::new(value, path).and_then(&mut decode))
                .collect(),
            other => Err(ShapeError::expected(path, "a table", &other)),
        }
    }
}

/// Collect the entries of a table in traversal order, paired with their paths.
/// Entries of a result table in a stable order: the array part `1..=n` first,
/// then any other keys sorted (integers numerically, then strings).
fn entries(table: &Table, path: &str) -> ShapeResult<Vec<(String, Value)>> {
    let to_shape = |e: mlua::Error| ShapeError::new(path, e.to_string());
    let len = table.raw_len() as i64;

    let mut out = Vec::new();
    for i in 1..=len {
        let value = table.raw_get::<Value>(i).map_err(to_shape)?;
        out.push((key_path(path, &Value::Integer(i)), value));
    }

    let mut rest = Vec::new();
    table
        .for_each::<Value, Value>(|key, value| {
            if !matches!(key, Value::Integer(i) if (1..=len).contains(&i)) {
                rest.push((key, value));
            }
            Ok(())
        })
        .map_err(to_shape)?;
    rest.sort_by(|(a, _), (b, _)| key_order(a, b));

    out.extend(
        rest.into_iter()
            .map(|(key, value)| (key_path(path, &key), value)),
    );
    Ok(out)
}

fn key_order(a: &Value, b: &Value) -> Ordering {
    fn rank(key: &Value) -> u8 {
        match key {
            Value::Integer(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.to_string_lossy().cmp(&y.to_string_lossy()),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn key_path(path: &str, key: &Value) -> String {
    match key {
        Value::Integer(i) => format!("{}[{}]", path, i),
        Value::String(s) => format!("{}[{:?}]", path, s.to_string_lossy().to_string()),
        other => format!("{}[<{}>]", path, other.type_name()),
    }
}

/// Read a string-typed value. Numbers are accepted and formatted as Lua would.
fn string_value(value: Value, path: &str) -> ShapeResult<Option<String>> {
    match value {
        Value::Nil => Ok(None),
        Value::String(s) => s
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| ShapeError::new(path, "string is not valid UTF-8")),
        Value::Integer(i) => Ok(Some(i.to_string())),
        Value::Number(n) => Ok(Some(format_number(n))),
        other => Err(ShapeError::expected(path, "a string", &other)),
    }
}

/// Format a Lua float the way `tostring` does for the common cases.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.1}", n)
    } else {
        n.to_string()
    }
}
