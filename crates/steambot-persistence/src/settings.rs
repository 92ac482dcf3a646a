//! The Settings subsystem (spec.md §3/§4.11): polymorphic typed values
//! identified by a static name, discovered at startup from a registry of
//! factories, loaded from the account file's `Settings` object, and handed
//! back to the caller (`steambot-client`) for publication on the
//! whiteboard. Grounded on the layered-source merge pattern in
//! `crates/settings/src/settings/store.rs`, adapted from a `TypeId`
//! registry over TOML sources to a name-keyed registry over one JSON
//! object.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::datafile::{DataFile, Outcome};
use crate::json_path;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting {0:?}")]
    UnknownSetting(String),
    #[error("{name:?} expects a {expected} value, got {got:?}")]
    WrongType {
        name: &'static str,
        expected: &'static str,
        got: String,
    },
    #[error(transparent)]
    DataFile(#[from] crate::datafile::DataFileError),
}

/// A setting's value, spec.md §3: "Bool, Integer, String, AccountRef".
/// `AccountRef` is distinguished from `String` only by kind (it names
/// another account) — both are stored as JSON strings.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    String(String),
    AccountRef(String),
}

impl SettingValue {
    fn to_json(&self) -> Value {
        match self {
            SettingValue::Bool(value) => Value::Bool(*value),
            SettingValue::Integer(value) => Value::Number((*value).into()),
            SettingValue::String(value) | SettingValue::AccountRef(value) => Value::String(value.clone()),
        }
    }

    fn from_json(descriptor: &SettingDescriptor, value: &Value) -> Option<Self> {
        match descriptor.kind {
            SettingKind::Bool => value.as_bool().map(SettingValue::Bool),
            SettingKind::Integer => value.as_i64().map(SettingValue::Integer),
            SettingKind::String => value.as_str().map(|s| SettingValue::String(s.to_string())),
            SettingKind::AccountRef => value.as_str().map(|s| SettingValue::AccountRef(s.to_string())),
        }
    }

    /// `set_from_string(get_string())` must be the identity for every
    /// setting type (spec.md §8).
    pub fn to_string_value(&self) -> String {
        match self {
            SettingValue::Bool(value) => value.to_string(),
            SettingValue::Integer(value) => value.to_string(),
            SettingValue::String(value) | SettingValue::AccountRef(value) => value.clone(),
        }
    }

    fn parse(descriptor: &SettingDescriptor, text: &str) -> Result<Self, SettingsError> {
        match descriptor.kind {
            SettingKind::Bool => text
                .parse::<bool>()
                .map(SettingValue::Bool)
                .map_err(|_| SettingsError::WrongType {
                    name: descriptor.name,
                    expected: "bool",
                    got: text.to_string(),
                }),
            SettingKind::Integer => text
                .parse::<i64>()
                .map(SettingValue::Integer)
                .map_err(|_| SettingsError::WrongType {
                    name: descriptor.name,
                    expected: "integer",
                    got: text.to_string(),
                }),
            SettingKind::String => Ok(SettingValue::String(text.to_string())),
            SettingKind::AccountRef => Ok(SettingValue::AccountRef(text.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Integer,
    String,
    AccountRef,
}

/// A setting factory entry: its stable name, its kind, and the value used
/// when the account file doesn't mention it yet.
#[derive(Debug, Clone)]
pub struct SettingDescriptor {
    pub name: &'static str,
    pub kind: SettingKind,
    pub default: SettingValue,
}

impl SettingDescriptor {
    pub const fn new(name: &'static str, kind: SettingKind, default: SettingValue) -> Self {
        Self { name, kind, default }
    }
}

/// The process-wide registry of setting factories, populated at startup.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    descriptors: Vec<SettingDescriptor>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, descriptor: SettingDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn descriptors(&self) -> &[SettingDescriptor] {
        &self.descriptors
    }

    /// Loads every registered setting from `data_file`'s `Settings` object,
    /// falling back to the descriptor's default for anything absent or
    /// malformed on disk.
    pub fn load(&self, data_file: &DataFile) -> HashMap<&'static str, SettingValue> {
        data_file.examine(|root| {
            let mut values = HashMap::with_capacity(self.descriptors.len());
            for descriptor in &self.descriptors {
                let stored = json_path::get_item(root, &["Settings", descriptor.name])
                    .and_then(|value| SettingValue::from_json(descriptor, value));
                values.insert(descriptor.name, stored.unwrap_or_else(|| descriptor.default.clone()));
            }
            values
        })
    }

    /// Validates `new_value` against `name`'s descriptor, persists it to
    /// `data_file`, and returns the parsed value for republishing on the
    /// whiteboard.
    pub fn change_value(
        &self,
        data_file: &DataFile,
        name: &str,
        new_value: &str,
    ) -> Result<SettingValue, SettingsError> {
        let descriptor = self
            .descriptors
            .iter()
            .find(|descriptor| descriptor.name == name)
            .ok_or_else(|| SettingsError::UnknownSetting(name.to_string()))?;

        let parsed = SettingValue::parse(descriptor, new_value)?;
        data_file.update(|root| {
            *json_path::create_item(root, &["Settings", descriptor.name]) = parsed.to_json();
            Ok(Outcome::Persist(()))
        })?;
        Ok(parsed)
    }
}
