//! Per-backend configuration schemas.
//!
//! A schema is an ordered list of named, typed fields. The orchestration
//! layer only validates values against it and surfaces it to whatever
//! builds creation forms; it never interprets what a field means.

use crate::core::error::ConfigError;

use serde::Serialize;
use serde_json::Value;

/// Backend-specific key/value configuration.
pub type Settings = serde_json::Map<String, Value>;

/// The type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A required string.
    String,
    /// A required integer.
    Integer,
    /// An integer that may be absent or null.
    OptionalInteger,
    /// A string that may be absent or null.
    OptionalString,
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            Self::String | Self::OptionalString => "a string",
            Self::Integer | Self::OptionalInteger => "an integer",
        }
    }
}

/// One named, typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigField {
    /// Key in the settings map.
    pub name: &'static str,
    /// Label shown next to the field.
    pub label: &'static str,
    /// Value type.
    pub kind: FieldKind,
    /// Whether the value is a credential that should be masked.
    pub secret: bool,
}

impl ConfigField {
    /// Creates a required string field.
    pub const fn string(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::String,
            secret: false,
        }
    }

    /// Creates a required string field holding a credential.
    pub const fn secret(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::String,
            secret: true,
        }
    }

    /// Creates a required integer field.
    pub const fn integer(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Integer,
            secret: false,
        }
    }

    /// Creates an optional integer field.
    pub const fn optional_integer(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::OptionalInteger,
            secret: false,
        }
    }

    /// Creates an optional string field holding a credential.
    pub const fn optional_secret(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::OptionalString,
            secret: true,
        }
    }

    fn check(&self, value: Option<&Value>) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidType {
            field: self.name.to_string(),
            expected: self.kind.expected(),
        };
        match (self.kind, value) {
            (FieldKind::OptionalInteger | FieldKind::OptionalString, None | Some(Value::Null)) => Ok(()),
            (_, None | Some(Value::Null)) => Err(ConfigError::MissingField {
                field: self.name.to_string(),
            }),
            (FieldKind::String | FieldKind::OptionalString, Some(Value::String(_))) => Ok(()),
            (FieldKind::Integer | FieldKind::OptionalInteger, Some(v)) if v.is_i64() => Ok(()),
            _ => Err(invalid()),
        }
    }
}

/// An ordered list of configuration fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    /// Creates a schema from fields, keeping their order.
    pub fn new(fields: impl IntoIterator<Item = ConfigField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Returns the fields in display order.
    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&ConfigField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks that `settings` carries every required field with the right
    /// type and nothing outside the schema.
    pub fn validate(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(unknown) = settings.keys().find(|k| self.field(k).is_none()) {
            return Err(ConfigError::UnknownField {
                field: unknown.clone(),
            });
        }
        self.fields
            .iter()
            .try_for_each(|field| field.check(settings.get(field.name)))
    }

    /// Returns a copy of `settings` with secret values masked.
    pub fn redact(&self, settings: &Settings) -> Settings {
        settings
            .iter()
            .map(|(key, value)| {
                let masked = self.field(key).is_some_and(|f| f.secret);
                let value = if masked {
                    Value::String("********".into())
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }
}
