//! Marshaling between host mappings and Lua tables.

use std::collections::HashMap;

use mlua::prelude::*;

use crate::host::{Host, Pointer};

// ── HashTable ─────────────────────────────────────────────────────────────────

/// Kind of the keys or values of a [`HashTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    String,
    Pointer,
}

/// A value stored in a [`HashTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableValue {
    Str(String),
    Pointer(Pointer),
    /// The script value could not be converted.
    Null,
}

/// The host's key → value mapping type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTable {
    key_type: TableType,
    value_type: TableType,
    items: HashMap<String, TableValue>,
}

impl HashTable {
    pub fn new(key_type: TableType, value_type: TableType) -> Self {
        Self::with_capacity(0, key_type, value_type)
    }

    pub fn with_capacity(size: usize, key_type: TableType, value_type: TableType) -> Self {
        Self { key_type, value_type, items: HashMap::with_capacity(size) }
    }

    /// A string → string table filled from `pairs`.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut table = Self::new(TableType::String, TableType::String);
        for (k, v) in pairs {
            table.set(k, TableValue::Str(v.into()));
        }
        table
    }

    pub fn key_type(&self) -> TableType {
        self.key_type
    }

    pub fn value_type(&self) -> TableType {
        self.value_type
    }

    pub fn set(&mut self, key: impl Into<String>, value: TableValue) {
        self.items.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&TableValue> {
        self.items.get(key)
    }

    /// String value for `key`, if it holds one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.items.get(key) {
            Some(TableValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

/// Build a Lua table holding a copy of `table`.
///
/// Pointer values are rendered with [`Host::ptr_to_str`]; null values are
/// left out.  When the table cannot be allocated the result is `nil`.
pub fn to_script_mapping(lua: &Lua, host: &dyn Host, table: &HashTable) -> LuaValue {
    let fill = || -> LuaResult<LuaTable> {
        let out = lua.create_table_with_capacity(0, table.len())?;
        for (key, value) in table.iter() {
            match value {
                TableValue::Str(s) => out.raw_set(key, s.as_str())?,
                TableValue::Pointer(p) => out.raw_set(key, host.ptr_to_str(*p))?,
                TableValue::Null => {}
            }
        }
        Ok(out)
    };
    match fill() {
        Ok(t) => LuaValue::Table(t),
        Err(e) => {
            tracing::warn!("unable to build script mapping: {e}");
            LuaValue::Nil
        }
    }
}

/// Copy a Lua table into a new [`HashTable`].
///
/// Keys that are not strings are skipped.  String values that fail to
/// convert are stored as [`TableValue::Null`]; pointer values are resolved
/// through [`Host::str_to_ptr`].
pub fn from_script_mapping(
    host: &dyn Host,
    table: &LuaTable,
    size_hint: usize,
    key_type: TableType,
    value_type: TableType,
) -> HashTable {
    let mut out = HashTable::with_capacity(size_hint, key_type, value_type);
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let Ok((key, value)) = pair else { continue };
        let Some(key) = decode_text(&key) else { continue };
        let value = match (value_type, decode_text(&value)) {
            (_, None) => TableValue::Null,
            (TableType::String, Some(text)) => TableValue::Str(text),
            (TableType::Pointer, Some(text)) => host
                .str_to_ptr(None, None, &text)
                .map_or(TableValue::Null, TableValue::Pointer),
        };
        out.set(key, value);
    }
    out
}

/// Text of a Lua string value.
///
/// Valid UTF-8 is taken as is; other byte strings are decoded lossily.
/// Anything that is not a string yields `None`.
pub fn decode_text(value: &LuaValue) -> Option<String> {
    match value {
        LuaValue::String(s) => Some(string_text(s)),
        _ => None,
    }
}

pub(crate) fn string_text(s: &LuaString) -> String {
    let bytes = s.as_bytes();
    match std::str::from_utf8(&bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
