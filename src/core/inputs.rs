use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// JSON type of an input parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Array => value.is_array(),
            ParameterType::Object => value.is_object(),
        }
    }
}

/// Declaration of one named input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub description: String,
    /// Value used when an optional parameter is not supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterDefinition {
    pub fn new(kind: ParameterType, description: &str) -> Self {
        ParameterDefinition {
            kind,
            description: description.to_string(),
            default: None,
        }
    }
}

/// Named, typed inputs of a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, ParameterDefinition>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    /// Schema with a single parameter
    pub fn single(name: &str, definition: ParameterDefinition, required: bool) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(name.to_string(), definition);
        InputSchema {
            properties,
            required: if required { vec![name.to_string()] } else { vec![] },
        }
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Checks the schema itself: required names are declared and defaults have the declared type
    pub fn validate_definition(&self, task_name: &str) -> Result<()> {
        for name in &self.required {
            if !self.properties.contains_key(name) {
                return Err(Error::config(format!(
                    "task '{}': required input '{}' is not declared in properties",
                    task_name, name
                )));
            }
        }
        for (name, definition) in &self.properties {
            if let Some(default) = &definition.default {
                if !definition.kind.matches(default) {
                    return Err(Error::config(format!(
                        "task '{}': default of input '{}' is not of type {}",
                        task_name,
                        name,
                        definition.kind.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves caller inputs against the schema.
    ///
    /// Declared parameters are type checked and defaults filled in. Keys the
    /// schema does not declare are carried through untouched, which lets a
    /// workflow hand earlier outputs to later steps.
    ///
    /// # Arguments
    /// * `task_name` - Used in error messages
    /// * `inputs` - Values supplied by the caller
    ///
    /// # Returns
    /// * `Result<Map<String, Value>>` - Resolved inputs, or a configuration error on a missing or mistyped input
    pub fn resolve(&self, task_name: &str, inputs: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut resolved = inputs.clone();
        for (name, definition) in &self.properties {
            match inputs.get(name).filter(|v| !v.is_null()) {
                Some(value) => {
                    if !definition.kind.matches(value) {
                        return Err(Error::config(format!(
                            "task '{}': input '{}' must be of type {}",
                            task_name,
                            name,
                            definition.kind.as_str()
                        )));
                    }
                }
                None => {
                    if let Some(default) = &definition.default {
                        resolved.insert(name.clone(), default.clone());
                    } else if self.is_required(name) {
                        return Err(Error::config(format!(
                            "task '{}': missing required input '{}'",
                            task_name, name
                        )));
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// JSON Schema of a strict call payload: declared names only, declared types only
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, definition)| {
                let mut property = json!({
                    "type": definition.kind.as_str(),
                    "description": definition.description,
                });
                if let Some(default) = &definition.default {
                    property["default"] = default.clone();
                }
                (name.clone(), property)
            })
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
            "additionalProperties": false,
        })
    }
}
