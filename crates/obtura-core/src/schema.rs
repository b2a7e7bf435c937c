//! Configuration schemas.
//!
//! A plugin's configuration is persisted as an untyped JSON document and
//! validated against a [`ConfigSchema`], an ordered list of [`ConfigField`]s
//! carrying a semantic type, optional constraints, and display metadata the
//! runtime stores but never interprets.
//!
//! Schemas come from two places: a plugin may hand-build one with the
//! [`ConfigField`] builder API, or leave `config_schema()` unset and have the
//! manager derive one from its default config document via
//! [`ConfigSchema::infer`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::plugin::ConfigMap;

/// Semantic type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free-form string.
    String,
    /// Any JSON number.
    Number,
    /// True/false toggle.
    Boolean,
    /// Single choice from a declared option set.
    Select,
    /// List of choices from a declared option set.
    MultiSelect,
}

/// One option of a select/multiselect field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOption {
    /// Stored value.
    pub value: String,
    /// Display label.
    pub label: String,
}

impl FieldOption {
    /// Creates an option whose label equals its value.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }

    /// Creates an option with a distinct display label.
    pub fn labeled(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Constraints applied to a field value.
///
/// `pattern` is carried for admin-UI use but not enforced by the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldValidation {
    /// Inclusive numeric lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive numeric upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Minimum string length in code points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    /// Maximum string length in code points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    /// Reserved regex pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// A single configuration field descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    /// Field name, the key in the config document.
    pub name: String,
    /// Semantic type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Default value used when no config is stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Whether the field must be present.
    #[serde(default)]
    pub required: bool,
    /// Option set for select/multiselect fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    /// Value constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
    /// Display group.
    #[serde(default)]
    pub group: String,
    /// Display order within the group.
    #[serde(default)]
    pub order: i32,
}

impl ConfigField {
    /// Creates a field with the given name and type; label defaults to a
    /// title-cased form of the name.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            label: title_case(&name),
            name,
            field_type,
            description: String::new(),
            default: None,
            required: false,
            options: Vec::new(),
            validation: None,
            group: String::new(),
            order: 0,
        }
    }

    /// Sets the display label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the display description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the default value.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the field required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the option set.
    pub fn options(mut self, options: impl IntoIterator<Item = FieldOption>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    /// Sets value constraints.
    pub fn validation(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Sets the display group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets the display order.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Validates a single value against this field's type and constraints.
    fn validate_value(&self, value: &Value) -> Result<(), ConfigError> {
        match self.field_type {
            FieldType::String => {
                let Some(s) = value.as_str() else {
                    return Err(self.mismatch("string", value));
                };
                if let Some(v) = &self.validation {
                    let len = s.chars().count();
                    if let Some(min) = v.min_len {
                        if len < min {
                            return Err(ConfigError::validation(
                                &self.name,
                                format!("minimum length is {min}"),
                            ));
                        }
                    }
                    if let Some(max) = v.max_len {
                        if len > max {
                            return Err(ConfigError::validation(
                                &self.name,
                                format!("maximum length is {max}"),
                            ));
                        }
                    }
                }
                Ok(())
            }
            FieldType::Number => {
                let Some(n) = value.as_f64() else {
                    return Err(self.mismatch("number", value));
                };
                if let Some(v) = &self.validation {
                    if let Some(min) = v.min {
                        if n < min {
                            return Err(ConfigError::validation(
                                &self.name,
                                format!("minimum value is {min}"),
                            ));
                        }
                    }
                    if let Some(max) = v.max {
                        if n > max {
                            return Err(ConfigError::validation(
                                &self.name,
                                format!("maximum value is {max}"),
                            ));
                        }
                    }
                }
                Ok(())
            }
            FieldType::Boolean => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(self.mismatch("boolean", value))
                }
            }
            FieldType::Select => {
                if self.is_valid_option(value) {
                    Ok(())
                } else {
                    Err(ConfigError::validation(&self.name, "invalid option"))
                }
            }
            FieldType::MultiSelect => {
                let Some(values) = value.as_array() else {
                    return Err(ConfigError::validation(
                        &self.name,
                        "expected a list of options",
                    ));
                };
                for v in values {
                    if !self.is_valid_option(v) {
                        return Err(ConfigError::validation(
                            &self.name,
                            format!("invalid option: {v}"),
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    fn is_valid_option(&self, value: &Value) -> bool {
        value
            .as_str()
            .is_some_and(|s| self.options.iter().any(|o| o.value == s))
    }

    fn mismatch(&self, expected: &str, got: &Value) -> ConfigError {
        ConfigError::validation(&self.name, format!("expected {expected}, got {}", kind(got)))
    }
}

/// The declared structure of a plugin's configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSchema {
    /// Declared fields, in display order.
    pub fields: Vec<ConfigField>,
}

impl ConfigSchema {
    /// Creates a schema from a list of fields.
    pub fn new(fields: impl IntoIterator<Item = ConfigField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Derives a schema from a default config document.
    ///
    /// Field names come from the document's keys, semantic types from the
    /// JSON value kinds (arrays become multiselect), defaults from the values
    /// themselves. Labels are title-cased field names. Plugins wanting
    /// descriptions, options, or constraints should return an explicit schema
    /// instead.
    pub fn infer(defaults: &ConfigMap) -> Self {
        let fields = defaults
            .iter()
            .map(|(name, value)| {
                let field_type = match value {
                    Value::Bool(_) => FieldType::Boolean,
                    Value::Number(_) => FieldType::Number,
                    Value::Array(_) => FieldType::MultiSelect,
                    _ => FieldType::String,
                };
                ConfigField::new(name.clone(), field_type).default_value(value.clone())
            })
            .collect();
        Self { fields }
    }

    /// Validates a config document against the schema.
    ///
    /// Returns the first failing field. Fields absent from the schema are
    /// allowed through untouched.
    pub fn validate(&self, config: &ConfigMap) -> Result<(), ConfigError> {
        for field in &self.fields {
            match config.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(ConfigError::validation(&field.name, "field is required"));
                    }
                }
                Some(value) => field.validate_value(value)?,
            }
        }
        Ok(())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
