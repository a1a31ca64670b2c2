//! Shapes: the declared type of an engine property.
//!
//! A [`Shape`] tells the schema mapper what a JSON value has to look like
//! to become an engine value, and lets clients discover property types
//! through [`Shape::describe`].

use databridge_protocol::{Map, StructuredValue};

use crate::{EngineStruct, EngineValue};

/// Type name of the element shape given to empty containers.
const UNKNOWN_ELEMENT: &str = "unknown";

/// The declared type of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Bool,
    Int,
    Int64,
    Byte,
    Float,
    Double,
    Str,
    Name,
    Text,
    Enum {
        enum_type: String,
        variants: Vec<String>,
    },
    Struct(StructShape),
    Array(Box<Shape>),
    Set(Box<Shape>),
    Map(Box<Shape>),
    Tag,
    Tags,
    ObjectRef {
        class: String,
    },
    SoftRef,
    /// A polymorphic struct: one of `variants`, all deriving from `base`.
    Instanced {
        base: String,
        variants: Vec<StructShape>,
    },
    Opaque {
        type_name: String,
    },
}

/// The shape of a struct: its type name and declared fields, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructShape {
    pub type_name: String,
    pub fields: Vec<FieldShape>,
}

/// One declared field of a struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name: String,
    pub shape: Shape,
    /// Used when a JSON object omits the field. Falls back to the shape's
    /// zero value.
    pub default: Option<EngineValue>,
    /// Visible but not editable through the bridge.
    pub read_only: bool,
}

impl FieldShape {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            default: None,
            read_only: false,
        }
    }

    pub fn with_default(mut self, default: EngineValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// The value used when the field is missing from input.
    pub fn default_value(&self) -> EngineValue {
        self.default
            .clone()
            .unwrap_or_else(|| self.shape.default_value())
    }
}

impl StructShape {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field append.
    pub fn field(mut self, field: FieldShape) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a dotted field path through nested struct shapes.
    pub fn field_at(&self, path: &str) -> Option<&FieldShape> {
        let (head, rest) = crate::value::split_path(path);
        let field = self.get(head)?;
        match (rest, &field.shape) {
            (None, _) => Some(field),
            (Some(rest), Shape::Struct(inner)) => inner.field_at(rest),
            _ => None,
        }
    }

    /// Merges `other`'s fields into this shape by name, widening the shape
    /// of fields both declare.
    pub fn merge(mut self, other: StructShape) -> StructShape {
        for field in other.fields {
            match self.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => {
                    let shape =
                        std::mem::replace(&mut existing.shape, Shape::unknown());
                    existing.shape = shape.merge(field.shape);
                }
                None => self.fields.push(field),
            }
        }
        self
    }

    /// A struct with every field at its default.
    pub fn default_value(&self) -> EngineStruct {
        EngineStruct {
            type_name: self.type_name.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.default_value()))
                .collect(),
        }
    }

    /// Describes the struct as a JSON-schema-like object.
    pub fn describe(&self) -> StructuredValue {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut schema = match field.shape.describe() {
                StructuredValue::Object(map) => map,
                _ => Map::new(),
            };
            if field.read_only {
                schema.insert("readOnly", true);
            }
            properties.insert(field.name.clone(), schema);
        }
        Map::new()
            .with("type", "object")
            .with("x-struct", self.type_name.clone())
            .with("properties", properties)
            .with("additionalProperties", false)
            .into()
    }
}

impl Shape {
    /// Element shape of an empty container. Never consulted while mapping.
    pub(crate) fn unknown() -> Self {
        Self::Opaque {
            type_name: UNKNOWN_ELEMENT.into(),
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, Self::Opaque { type_name } if type_name == UNKNOWN_ELEMENT)
    }

    /// Widens this shape so it also accepts every value `other` accepts.
    ///
    /// Enum variants and instanced subtypes are unioned, structs of the same
    /// type merge field by field and container element shapes merge
    /// recursively. Where the two shapes are unrelated, `self` is kept.
    pub fn merge(self, other: Shape) -> Shape {
        match (self, other) {
            (a, b) if a.is_unknown() => b,
            (a, b) if b.is_unknown() => a,
            (
                Self::Enum {
                    enum_type,
                    mut variants,
                },
                Self::Enum {
                    enum_type: other_type,
                    variants: more,
                },
            ) if enum_type == other_type => {
                for variant in more {
                    if !variants.contains(&variant) {
                        variants.push(variant);
                    }
                }
                Self::Enum {
                    enum_type,
                    variants,
                }
            }
            (Self::Struct(a), Self::Struct(b)) if a.type_name == b.type_name => {
                Self::Struct(a.merge(b))
            }
            (Self::Array(a), Self::Array(b)) => {
                Self::Array(Box::new((*a).merge(*b)))
            }
            (Self::Set(a), Self::Set(b)) => Self::Set(Box::new((*a).merge(*b))),
            (Self::Map(a), Self::Map(b)) => Self::Map(Box::new((*a).merge(*b))),
            (
                Self::Instanced { base, mut variants },
                Self::Instanced { variants: more, .. },
            ) => {
                for variant in more {
                    match variants.iter().position(|v| v.type_name == variant.type_name)
                    {
                        Some(i) => {
                            let existing = std::mem::take(&mut variants[i]);
                            variants[i] = existing.merge(variant);
                        }
                        None => variants.push(variant),
                    }
                }
                Self::Instanced { base, variants }
            }
            (a, _) => a,
        }
    }

    /// The zero value of this shape.
    pub fn default_value(&self) -> EngineValue {
        match self {
            Self::Bool => EngineValue::Bool(false),
            Self::Int => EngineValue::Int(0),
            Self::Int64 => EngineValue::Int64(0),
            Self::Byte => EngineValue::Byte(0),
            Self::Float => EngineValue::Float(0.0),
            Self::Double => EngineValue::Double(0.0),
            Self::Str => EngineValue::Str(String::new()),
            Self::Name => EngineValue::Name(String::new()),
            Self::Text => EngineValue::Text(String::new()),
            Self::Enum {
                enum_type,
                variants,
            } => EngineValue::Enum {
                enum_type: enum_type.clone(),
                value: variants.first().cloned().unwrap_or_default(),
            },
            Self::Struct(shape) => EngineValue::Struct(shape.default_value()),
            Self::Array(_) => EngineValue::Array(Vec::new()),
            Self::Set(_) => EngineValue::Set(Vec::new()),
            Self::Map(_) => EngineValue::Map(Vec::new()),
            Self::Tag => EngineValue::Tag(String::new()),
            Self::Tags => EngineValue::Tags(Vec::new()),
            Self::ObjectRef { class } => EngineValue::ObjectRef {
                class: class.clone(),
                path: None,
            },
            Self::SoftRef => EngineValue::SoftRef(None),
            Self::Instanced { base, .. } => EngineValue::Instanced {
                base: base.clone(),
                value: None,
            },
            Self::Opaque { type_name } => EngineValue::Opaque {
                type_name: type_name.clone(),
            },
        }
    }

    /// A short human-readable type name, used in mismatch errors.
    pub fn type_label(&self) -> String {
        match self {
            Self::Bool => "bool".into(),
            Self::Int => "int32".into(),
            Self::Int64 => "int64".into(),
            Self::Byte => "byte".into(),
            Self::Float | Self::Double => "number".into(),
            Self::Str | Self::Name | Self::Text => "string".into(),
            Self::Enum { enum_type, .. } => format!("{enum_type} variant"),
            Self::Struct(s) => format!("{} object", s.type_name),
            Self::Array(_) => "array".into(),
            Self::Set(_) => "array of unique elements".into(),
            Self::Map(_) => "object".into(),
            Self::Tag => "gameplay tag".into(),
            Self::Tags => "array of gameplay tags".into(),
            Self::ObjectRef { class } => format!("{class} path or null"),
            Self::SoftRef => "object path or null".into(),
            Self::Instanced { base, .. } => {
                format!("{base} object with _struct_type, or null")
            }
            Self::Opaque { type_name } => type_name.clone(),
        }
    }

    /// Describes the shape as a JSON-schema-like object.
    pub fn describe(&self) -> StructuredValue {
        let schema = match self {
            Self::Bool => Map::new().with("type", "boolean"),
            Self::Int => integer("int32"),
            Self::Int64 => integer("int64"),
            Self::Byte => integer("uint8").with("minimum", 0).with("maximum", 255),
            Self::Float => Map::new().with("type", "number").with("format", "float"),
            Self::Double => {
                Map::new().with("type", "number").with("format", "double")
            }
            Self::Str => Map::new().with("type", "string"),
            Self::Name => Map::new().with("type", "string").with("format", "name"),
            Self::Text => Map::new().with("type", "string").with("format", "text"),
            Self::Enum {
                enum_type,
                variants,
            } => Map::new()
                .with("type", "string")
                .with("x-enum", enum_type.clone())
                .with("enum", variants.clone()),
            Self::Struct(shape) => return shape.describe(),
            Self::Array(items) => {
                Map::new().with("type", "array").with("items", items.describe())
            }
            Self::Set(items) => Map::new()
                .with("type", "array")
                .with("items", items.describe())
                .with("uniqueItems", true),
            Self::Map(values) => Map::new()
                .with("type", "object")
                .with("additionalProperties", values.describe()),
            Self::Tag => tag_schema(),
            Self::Tags => Map::new()
                .with("type", "array")
                .with("items", tag_schema())
                .with("uniqueItems", true),
            Self::ObjectRef { class } => nullable_string("object-path")
                .with("x-class", class.clone()),
            Self::SoftRef => nullable_string("soft-object-path"),
            Self::Instanced { base, variants } => Map::new()
                .with("type", vec!["object", "null"])
                .with("x-base", base.clone())
                .with("discriminator", "_struct_type")
                .with(
                    "oneOf",
                    variants
                        .iter()
                        .map(StructShape::describe)
                        .collect::<Vec<_>>(),
                ),
            Self::Opaque { type_name } => {
                Map::new().with("x-unsupported", type_name.clone())
            }
        };
        schema.into()
    }
}

fn integer(format: &str) -> Map {
    Map::new().with("type", "integer").with("format", format)
}

fn tag_schema() -> Map {
    Map::new().with("type", "string").with("format", "gameplay-tag")
}

fn nullable_string(format: &str) -> Map {
    Map::new()
        .with("type", vec!["string", "null"])
        .with("format", format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rarity() -> Shape {
        Shape::Enum {
            enum_type: "ERarity".into(),
            variants: vec!["Common".into(), "Rare".into()],
        }
    }

    #[test]
    fn test_default_value_enum_is_first_variant() {
        assert_eq!(
            rarity().default_value(),
            EngineValue::Enum {
                enum_type: "ERarity".into(),
                value: "Common".into()
            }
        );
    }

    #[test]
    fn test_field_default_overrides_shape_default() {
        let field =
            FieldShape::new("MaxStack", Shape::Int).with_default(EngineValue::Int(1));
        assert_eq!(field.default_value(), EngineValue::Int(1));
    }

    #[test]
    fn test_field_at_walks_nested_structs() {
        let shape = StructShape::new("Item").field(FieldShape::new(
            "Stats",
            Shape::Struct(
                StructShape::new("ItemStats")
                    .field(FieldShape::new("Damage", Shape::Double)),
            ),
        ));
        assert_eq!(
            shape.field_at("Stats.Damage").map(|f| &f.shape),
            Some(&Shape::Double)
        );
        assert!(shape.field_at("Stats.Nope").is_none());
    }

    #[test]
    fn test_describe_struct_marks_read_only_fields() {
        let shape = StructShape::new("Item")
            .field(FieldShape::new("Guid", Shape::Str).read_only())
            .field(FieldShape::new("Rarity", rarity()));
        let schema = shape.describe();
        let props = schema.get("properties").unwrap();
        assert_eq!(
            props.get("Guid").and_then(|g| g.get("readOnly")),
            Some(&StructuredValue::Bool(true))
        );
        assert_eq!(
            props
                .get("Rarity")
                .and_then(|r| r.get("enum"))
                .and_then(|e| e.as_array())
                .map(Vec::len),
            Some(2)
        );
        assert_eq!(
            schema.get("additionalProperties"),
            Some(&StructuredValue::Bool(false))
        );
    }

    #[test]
    fn test_merge_unions_enum_variants_in_order() {
        let common = Shape::Enum {
            enum_type: "ERarity".into(),
            variants: vec!["Common".into()],
        };
        let rare = Shape::Enum {
            enum_type: "ERarity".into(),
            variants: vec!["Rare".into(), "Common".into()],
        };
        assert_eq!(common.merge(rare), rarity());
    }

    #[test]
    fn test_merge_unknown_element_yields_to_known() {
        let empty = Shape::Array(Box::new(Shape::unknown()));
        let ints = Shape::Array(Box::new(Shape::Int));
        assert_eq!(empty.merge(ints.clone()), ints);
    }

    #[test]
    fn test_merge_structs_combines_nested_fields() {
        let one = StructShape::new("Slot").field(FieldShape::new(
            "Rarity",
            Shape::Enum {
                enum_type: "ERarity".into(),
                variants: vec!["Common".into()],
            },
        ));
        let two = StructShape::new("Slot")
            .field(FieldShape::new(
                "Rarity",
                Shape::Enum {
                    enum_type: "ERarity".into(),
                    variants: vec!["Rare".into()],
                },
            ))
            .field(FieldShape::new("Count", Shape::Int));
        let merged = one.merge(two);
        assert_eq!(merged.get("Rarity").map(|f| &f.shape), Some(&rarity()));
        assert!(merged.get("Count").is_some());
    }

    #[test]
    fn test_describe_opaque_reports_unsupported() {
        let schema = Shape::Opaque {
            type_name: "Delegate".into(),
        }
        .describe();
        assert_eq!(
            schema.get("x-unsupported").and_then(|v| v.as_str()),
            Some("Delegate")
        );
    }
}
