//! Argument schemas and validated arguments.
//!
//! Every command declares the fields its payload may carry. The registry
//! checks a payload against the schema before the handler runs, so
//! handlers read [`Args`] without re-checking types.

use databridge_protocol::{Map, StructuredValue};

use crate::CommandError;

/// The JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Bool,
    Array,
    Object,
    /// Any value, including `null`.
    Any,
}

impl ArgKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Bool => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    fn accepts(self, value: &StructuredValue) -> bool {
        match self {
            Self::String => value.as_str().is_some(),
            Self::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Number => value.as_f64().is_some(),
            Self::Bool => value.as_bool().is_some(),
            Self::Array => value.as_array().is_some(),
            Self::Object => value.as_object().is_some(),
            Self::Any => true,
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgField {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub description: String,
}

impl ArgField {
    fn describe(&self) -> StructuredValue {
        Map::new()
            .with("name", self.name.clone())
            .with("type", self.kind.as_str())
            .with("required", self.required)
            .with("description", self.description.clone())
            .into()
    }
}

/// The declared arguments of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgSchema {
    fields: Vec<ArgField>,
    allow_unknown: bool,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(
        mut self,
        name: impl Into<String>,
        kind: ArgKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(ArgField {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        });
        self
    }

    pub fn optional(
        mut self,
        name: impl Into<String>,
        kind: ArgKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(ArgField {
            name: name.into(),
            kind,
            required: false,
            description: description.into(),
        });
        self
    }

    /// Lets undeclared fields through instead of rejecting them.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn fields(&self) -> &[ArgField] {
        &self.fields
    }

    /// The `arguments` array of a `list_commands` entry.
    pub fn describe(&self) -> StructuredValue {
        self.fields
            .iter()
            .map(ArgField::describe)
            .collect::<Vec<_>>()
            .into()
    }

    /// Checks a request payload against the schema.
    ///
    /// A `null` payload is an empty object. A `null` field counts as
    /// absent, except for [`ArgKind::Any`] fields where it is a value.
    ///
    /// # Errors
    /// [`CommandError::InvalidArguments`] naming the first offending field.
    pub fn validate(&self, payload: StructuredValue) -> Result<Args, CommandError> {
        let mut map = match payload {
            StructuredValue::Null => Map::new(),
            StructuredValue::Object(map) => map,
            other => {
                return Err(CommandError::invalid(format!(
                    "payload must be an object, found {}",
                    other.type_name()
                )));
            }
        };

        for field in &self.fields {
            if field.kind != ArgKind::Any
                && map.get(&field.name).is_some_and(StructuredValue::is_null)
            {
                map.remove(&field.name);
            }
            match map.get(&field.name) {
                Some(value) if !field.kind.accepts(value) => {
                    return Err(CommandError::invalid(format!(
                        "field '{}' must be {}, found {}",
                        field.name,
                        field.kind.as_str(),
                        value.type_name()
                    )));
                }
                None if field.required => {
                    return Err(CommandError::invalid(format!(
                        "missing field '{}'",
                        field.name
                    )));
                }
                _ => {}
            }
        }

        if !self.allow_unknown {
            if let Some(unknown) =
                map.keys().find(|key| !self.fields.iter().any(|f| f.name == *key))
            {
                return Err(CommandError::invalid(format!(
                    "unknown field '{unknown}'"
                )));
            }
        }

        Ok(Args(map))
    }
}

// ---------------------------------------------------------------------------
// Args
// ---------------------------------------------------------------------------

/// A payload that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Map);

impl Args {
    pub fn get(&self, name: &str) -> Option<&StructuredValue> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(StructuredValue::as_str)
    }

    /// A string argument the schema marks required.
    pub fn required_str(&self, name: &str) -> Result<&str, CommandError> {
        self.str(name)
            .ok_or_else(|| CommandError::invalid(format!("missing field '{name}'")))
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(StructuredValue::as_bool)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(StructuredValue::as_i64)
    }

    pub fn array(&self, name: &str) -> Option<&Vec<StructuredValue>> {
        self.get(name).and_then(StructuredValue::as_array)
    }

    /// Takes a value out, leaving the field absent.
    pub fn take(&mut self, name: &str) -> Option<StructuredValue> {
        self.0.remove(name)
    }

    pub fn into_map(self) -> Map {
        self.0
    }
}
