//! Settings form catalog and write requests
//!
//! The portal's settings processor rejects partial submissions: every known
//! field must be present. Fields the caller is not changing carry a sentinel
//! meaning "leave unchanged" (`-1` for select fields, empty for numeric and
//! text fields). The catalog is a fixed ordered table; a write produces a
//! copy in which exactly one entry carries the caller's value.

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of a settings form field, which determines its sentinel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Enumerated drop-down
    Select,
    /// Numeric input
    Numeric,
    /// Free text input
    Text,
}

impl FieldKind {
    /// Value meaning "leave this field unchanged"
    pub fn sentinel(&self) -> &'static str {
        match self {
            FieldKind::Select => "-1",
            FieldKind::Numeric | FieldKind::Text => "",
        }
    }
}

/// One entry of the settings form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormField {
    /// Form field name as posted
    pub name: String,
    /// Field kind
    pub kind: FieldKind,
}

impl FormField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Value meaning "leave this field unchanged"
    pub fn sentinel(&self) -> &'static str {
        self.kind.sentinel()
    }
}

/// A single field change to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Field to change
    pub field: String,
    /// Already formatted value
    pub value: String,
}

impl WriteRequest {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

const DEFAULT_FIELDS: &[(&str, FieldKind)] = &[
    ("_HEATING_MODE", FieldKind::Select),
    ("_HOT_WATER_MODE", FieldKind::Select),
    ("_COOLING_MODE", FieldKind::Select),
    ("_VENTILATION_MODE", FieldKind::Select),
    ("_POOL_MODE", FieldKind::Select),
    ("_SECOND_HEAT_SOURCE_MODE", FieldKind::Select),
    ("_PARTY_MODE", FieldKind::Select),
    ("_HEATING_CURVE_OFFSET", FieldKind::Numeric),
    ("_HEATING_SETPOINT", FieldKind::Numeric),
    ("_ROOM_SETPOINT", FieldKind::Numeric),
    ("_HOT_WATER_SETPOINT", FieldKind::Numeric),
    ("_HOT_WATER_HYSTERESIS", FieldKind::Numeric),
    ("_COOLING_SETPOINT", FieldKind::Numeric),
    ("_COOLING_RELEASE_TEMPERATURE", FieldKind::Numeric),
    ("_POOL_SETPOINT", FieldKind::Numeric),
];

/// Built-in catalog of the settings form
pub fn default_fields() -> Vec<FormField> {
    DEFAULT_FIELDS
        .iter()
        .map(|(name, kind)| FormField::new(*name, *kind))
        .collect()
}

/// Fixed ordered table of every known settings form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCatalog {
    fields: Vec<FormField>,
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self {
            fields: default_fields(),
        }
    }
}

impl FieldCatalog {
    /// Build a catalog, rejecting empty tables, blank names and duplicates
    pub fn new(fields: Vec<FormField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(PortalError::config("Settings form catalog is empty"));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(PortalError::config("Settings form field with empty name"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(PortalError::config(format!(
                    "Duplicate settings form field: {}",
                    field.name
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the catalog knows `name`
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All fields in form order
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the full form for `request`: the requested field carries its
    /// value, every other field its sentinel.
    pub fn render(&self, request: &WriteRequest) -> Result<Vec<(String, String)>> {
        if !self.contains(&request.field) {
            return Err(PortalError::invalid_input(format!(
                "Unknown settings field: {}",
                request.field
            )));
        }

        Ok(self
            .fields
            .iter()
            .map(|field| {
                let value = if field.name == request.field {
                    request.value.clone()
                } else {
                    field.sentinel().to_string()
                };
                (field.name.clone(), value)
            })
            .collect())
    }
}
