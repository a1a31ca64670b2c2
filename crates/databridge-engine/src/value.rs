//! Engine-native values.
//!
//! [`EngineValue`] models the property types an engine object can hold:
//! scalars, names and localized text, enums, nested structs, containers,
//! gameplay tags, object references and instanced (polymorphic) structs.
//! Values carry enough type information to be mapped to JSON and back
//! without guessing.

use crate::{FieldShape, Shape, StructShape};

/// A typed engine property value.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    Bool(bool),
    Int(i32),
    Int64(i64),
    Byte(u8),
    Float(f32),
    Double(f64),
    /// A plain string property.
    Str(String),
    /// An interned identifier.
    Name(String),
    /// Localizable display text.
    Text(String),
    /// An enum value, stored by variant name.
    Enum { enum_type: String, value: String },
    Struct(EngineStruct),
    Array(Vec<EngineValue>),
    /// Unique elements; insertion order is kept.
    Set(Vec<EngineValue>),
    /// String-keyed map.
    Map(Vec<(String, EngineValue)>),
    /// A single gameplay tag. Empty means "no tag".
    Tag(String),
    /// A gameplay tag container.
    Tags(Vec<String>),
    /// A hard reference to an object of `class`, by object path.
    ObjectRef { class: String, path: Option<String> },
    /// A soft (lazy-loaded) object path.
    SoftRef(Option<String>),
    /// A polymorphic struct deriving from `base`; `value` is `None` when
    /// unset.
    Instanced {
        base: String,
        value: Option<EngineStruct>,
    },
    /// A property type with no structured representation (delegates,
    /// raw pointers, ...).
    Opaque { type_name: String },
}

impl EngineValue {
    /// Returns the shape this value conforms to.
    ///
    /// Container element shapes are merged across every element, so a
    /// mixed array of enum variants or instanced subtypes yields a shape
    /// that accepts all of them. An empty container gets an opaque element
    /// shape, which is never consulted when mapping an empty container.
    pub fn shape(&self) -> Shape {
        match self {
            Self::Bool(_) => Shape::Bool,
            Self::Int(_) => Shape::Int,
            Self::Int64(_) => Shape::Int64,
            Self::Byte(_) => Shape::Byte,
            Self::Float(_) => Shape::Float,
            Self::Double(_) => Shape::Double,
            Self::Str(_) => Shape::Str,
            Self::Name(_) => Shape::Name,
            Self::Text(_) => Shape::Text,
            Self::Enum { enum_type, value } => Shape::Enum {
                enum_type: enum_type.clone(),
                variants: vec![value.clone()],
            },
            Self::Struct(s) => Shape::Struct(s.shape()),
            Self::Array(items) => Shape::Array(Box::new(merged_shape(items))),
            Self::Set(items) => Shape::Set(Box::new(merged_shape(items))),
            Self::Map(entries) => Shape::Map(Box::new(merged_shape(
                entries.iter().map(|(_, v)| v),
            ))),
            Self::Tag(_) => Shape::Tag,
            Self::Tags(_) => Shape::Tags,
            Self::ObjectRef { class, .. } => Shape::ObjectRef {
                class: class.clone(),
            },
            Self::SoftRef(_) => Shape::SoftRef,
            Self::Instanced { base, value } => Shape::Instanced {
                base: base.clone(),
                variants: value.iter().map(EngineStruct::shape).collect(),
            },
            Self::Opaque { type_name } => Shape::Opaque {
                type_name: type_name.clone(),
            },
        }
    }
}

fn merged_shape<'a>(items: impl IntoIterator<Item = &'a EngineValue>) -> Shape {
    items
        .into_iter()
        .map(EngineValue::shape)
        .reduce(Shape::merge)
        .unwrap_or_else(Shape::unknown)
}

// ---------------------------------------------------------------------------
// EngineStruct
// ---------------------------------------------------------------------------

/// A struct value: a type name plus fields in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineStruct {
    pub type_name: String,
    pub fields: Vec<(String, EngineValue)>,
}

impl EngineStruct {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field append.
    pub fn field(mut self, name: impl Into<String>, value: EngineValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&EngineValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Looks up a dotted path through nested structs: `"Stats.Damage"`.
    pub fn get_path(&self, path: &str) -> Option<&EngineValue> {
        let (head, rest) = split_path(path);
        let value = self.get(head)?;
        match (rest, value) {
            (None, v) => Some(v),
            (Some(rest), EngineValue::Struct(inner)) => inner.get_path(rest),
            _ => None,
        }
    }

    /// Replaces the value at a dotted path. Returns the previous value, or
    /// `None` if the path does not exist.
    pub fn set_path(
        &mut self,
        path: &str,
        value: EngineValue,
    ) -> Option<EngineValue> {
        let (head, rest) = split_path(path);
        let slot = self
            .fields
            .iter_mut()
            .find(|(n, _)| n == head)
            .map(|(_, v)| v)?;
        match (rest, slot) {
            (None, slot) => Some(std::mem::replace(slot, value)),
            (Some(rest), EngineValue::Struct(inner)) => {
                inner.set_path(rest, value)
            }
            _ => None,
        }
    }

    /// The shape of this struct, derived field by field.
    pub fn shape(&self) -> StructShape {
        StructShape {
            type_name: self.type_name.clone(),
            fields: self
                .fields
                .iter()
                .map(|(name, value)| FieldShape::new(name.clone(), value.shape()))
                .collect(),
        }
    }
}

pub(crate) fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

// ---------------------------------------------------------------------------
// Gameplay tags
// ---------------------------------------------------------------------------

/// Returns `true` if `tag` is a well-formed gameplay tag name.
///
/// Tags are dot-separated segments of ASCII letters, digits and
/// underscores: `Item.Weapon.Sword`. Empty tags, empty segments and
/// leading or trailing dots are rejected.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> EngineStruct {
        EngineStruct::new("ItemDefinition")
            .field("MaxStack", EngineValue::Int(20))
            .field(
                "Stats",
                EngineValue::Struct(
                    EngineStruct::new("ItemStats")
                        .field("Damage", EngineValue::Double(12.5)),
                ),
            )
    }

    #[test]
    fn test_get_path_nested_field() {
        let item = item();
        assert_eq!(
            item.get_path("Stats.Damage"),
            Some(&EngineValue::Double(12.5))
        );
        assert!(item.get_path("Stats.Missing").is_none());
        assert!(item.get_path("MaxStack.Inner").is_none());
    }

    #[test]
    fn test_set_path_replaces_nested_value() {
        let mut item = item();
        let old = item.set_path("Stats.Damage", EngineValue::Double(30.0));
        assert_eq!(old, Some(EngineValue::Double(12.5)));
        assert_eq!(
            item.get_path("Stats.Damage"),
            Some(&EngineValue::Double(30.0))
        );
        assert!(item.set_path("Nope", EngineValue::Bool(true)).is_none());
    }

    #[test]
    fn test_is_valid_tag_accepts_dotted_names() {
        assert!(is_valid_tag("Item"));
        assert!(is_valid_tag("Item.Weapon.Sword_01"));
    }

    #[test]
    fn test_is_valid_tag_rejects_malformed() {
        for bad in ["", ".Item", "Item.", "Item..Sword", "Item Sword", "Item-Sword"] {
            assert!(!is_valid_tag(bad), "{bad:?} should be invalid");
        }
    }

    fn rarity(value: &str) -> EngineValue {
        EngineValue::Enum {
            enum_type: "ERarity".into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_shape_of_mixed_enum_array_lists_every_variant() {
        let value = EngineValue::Array(vec![
            rarity("Common"),
            rarity("Rare"),
            rarity("Common"),
        ]);
        let Shape::Array(items) = value.shape() else {
            panic!("expected array shape");
        };
        assert_eq!(
            *items,
            Shape::Enum {
                enum_type: "ERarity".into(),
                variants: vec!["Common".into(), "Rare".into()],
            }
        );
    }

    #[test]
    fn test_shape_of_mixed_instanced_map_keeps_declared_base() {
        let instanced = |type_name: &str| EngineValue::Instanced {
            base: "ItemEffect".into(),
            value: Some(EngineStruct::new(type_name)),
        };
        let value = EngineValue::Map(vec![
            ("a".into(), instanced("HealEffect")),
            (
                "b".into(),
                EngineValue::Instanced {
                    base: "ItemEffect".into(),
                    value: None,
                },
            ),
            ("c".into(), instanced("BuffEffect")),
        ]);
        let Shape::Map(values) = value.shape() else {
            panic!("expected map shape");
        };
        let Shape::Instanced { base, variants } = *values else {
            panic!("expected instanced shape");
        };
        assert_eq!(base, "ItemEffect");
        let names: Vec<&str> =
            variants.iter().map(|v| v.type_name.as_str()).collect();
        assert_eq!(names, vec!["HealEffect", "BuffEffect"]);
    }

    #[test]
    fn test_shape_of_struct_lists_fields_in_order() {
        let shape = item().shape();
        let names: Vec<&str> =
            shape.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["MaxStack", "Stats"]);
    }
}
