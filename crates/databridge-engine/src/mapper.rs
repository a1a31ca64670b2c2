//! The schema mapper: engine values ⇄ structured values.
//!
//! `to_structured` needs no shape; every [`EngineValue`] carries its own
//! type. `from_structured` is driven by the expected [`Shape`], so JSON
//! input is checked field by field and every mismatch reports the dotted
//! path of the offending value (`Effects[1].Amount`).
//!
//! | Engine value          | Structured value                             |
//! |-----------------------|----------------------------------------------|
//! | scalars               | bool / number / string                       |
//! | enum                  | variant name string                          |
//! | struct                | object, fields in declaration order          |
//! | array, set            | array                                        |
//! | map                   | object                                       |
//! | tag                   | string                                       |
//! | tag container         | array of strings, deduplicated, in order     |
//! | object / soft ref     | path string, or null                         |
//! | instanced struct      | object with `_struct_type` first, or null    |
//! | opaque                | error: `Unsupported`                         |
//!
//! Fields whose name starts with `_` are metadata and are skipped on input.

use std::collections::HashSet;

use databridge_protocol::{Map, StructuredValue};

use crate::{is_valid_tag, EngineError, EngineStruct, EngineValue, Shape, StructShape};

/// Discriminator key written into instanced struct objects.
const STRUCT_TYPE_KEY: &str = "_struct_type";

// ---------------------------------------------------------------------------
// Engine → structured
// ---------------------------------------------------------------------------

/// Converts an engine value to a structured value.
///
/// # Errors
/// Returns [`EngineError::Unsupported`] for opaque values and non-finite
/// floats, which have no JSON representation.
pub fn to_structured(value: &EngineValue) -> Result<StructuredValue, EngineError> {
    encode(value, "")
}

fn encode(value: &EngineValue, path: &str) -> Result<StructuredValue, EngineError> {
    Ok(match value {
        EngineValue::Bool(b) => StructuredValue::Bool(*b),
        EngineValue::Int(n) => (*n).into(),
        EngineValue::Int64(n) => (*n).into(),
        EngineValue::Byte(n) => u32::from(*n).into(),
        EngineValue::Float(f) => finite(f64::from(*f), path)?,
        EngineValue::Double(f) => finite(*f, path)?,
        EngineValue::Str(s) | EngineValue::Name(s) | EngineValue::Text(s) => {
            s.clone().into()
        }
        EngineValue::Enum { value, .. } => value.clone().into(),
        EngineValue::Struct(s) => encode_struct(s, path, false)?,
        EngineValue::Array(items) | EngineValue::Set(items) => {
            StructuredValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| encode(item, &index_path(path, i)))
                    .collect::<Result<_, _>>()?,
            )
        }
        EngineValue::Map(entries) => {
            let mut map = Map::new();
            for (key, item) in entries {
                map.insert(key.clone(), encode(item, &field_path(path, key))?);
            }
            map.into()
        }
        EngineValue::Tag(tag) => tag.clone().into(),
        EngineValue::Tags(tags) => {
            let mut seen = HashSet::with_capacity(tags.len());
            tags.iter()
                .map(String::as_str)
                .filter(|tag| seen.insert(*tag))
                .collect::<Vec<_>>()
                .into()
        }
        EngineValue::ObjectRef { path: target, .. }
        | EngineValue::SoftRef(target) => target.clone().into(),
        EngineValue::Instanced { value: None, .. } => StructuredValue::Null,
        EngineValue::Instanced { value: Some(s), .. } => {
            encode_struct(s, path, true)?
        }
        EngineValue::Opaque { type_name } => {
            tracing::warn!(path, %type_name, "unhandled property type");
            return Err(EngineError::Unsupported {
                path: display_path(path),
                type_name: type_name.clone(),
            });
        }
    })
}

fn encode_struct(
    value: &EngineStruct,
    path: &str,
    tagged: bool,
) -> Result<StructuredValue, EngineError> {
    let mut map = Map::new();
    if tagged {
        map.insert(STRUCT_TYPE_KEY, value.type_name.clone());
    }
    for (name, field) in &value.fields {
        map.insert(name.clone(), encode(field, &field_path(path, name))?);
    }
    Ok(map.into())
}

fn finite(value: f64, path: &str) -> Result<StructuredValue, EngineError> {
    StructuredValue::from_f64(value).ok_or_else(|| EngineError::Unsupported {
        path: display_path(path),
        type_name: format!("non-finite float ({value})"),
    })
}

// ---------------------------------------------------------------------------
// Structured → engine
// ---------------------------------------------------------------------------

/// Converts a structured value to an engine value of the given shape.
///
/// Struct fields missing from the input take their default. Struct fields
/// the shape does not declare are rejected, except `_`-prefixed metadata.
///
/// # Errors
/// - [`EngineError::TypeMismatch`] when a value has the wrong JSON type,
///   an unknown enum variant, an out-of-range number, or a malformed tag
/// - [`EngineError::UnknownField`] for an undeclared struct field
/// - [`EngineError::Unsupported`] when the shape is opaque
pub fn from_structured(
    value: &StructuredValue,
    shape: &Shape,
) -> Result<EngineValue, EngineError> {
    decode(value, shape, "")
}

/// Like [`from_structured`], for a value that lives at `path` inside a
/// larger object. Error paths are reported relative to the object.
pub fn from_structured_at(
    value: &StructuredValue,
    shape: &Shape,
    path: &str,
) -> Result<EngineValue, EngineError> {
    decode(value, shape, path)
}

/// Decodes a whole struct from a JSON object, such as a DataTable row.
/// Omitted fields take their default.
///
/// # Errors
/// As [`from_structured`].
pub fn struct_from_map(
    map: &Map,
    shape: &StructShape,
) -> Result<EngineStruct, EngineError> {
    decode_struct(map, shape, "")
}

fn decode(
    value: &StructuredValue,
    shape: &Shape,
    path: &str,
) -> Result<EngineValue, EngineError> {
    let mismatch = || EngineError::TypeMismatch {
        path: display_path(path),
        expected: shape.type_label(),
        found: value.type_name().to_string(),
    };

    Ok(match shape {
        Shape::Bool => EngineValue::Bool(value.as_bool().ok_or_else(mismatch)?),
        Shape::Int => EngineValue::Int(
            integral(value)
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(mismatch)?,
        ),
        Shape::Int64 => EngineValue::Int64(integral(value).ok_or_else(mismatch)?),
        Shape::Byte => EngineValue::Byte(
            integral(value)
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(mismatch)?,
        ),
        Shape::Float => {
            let wide = value.as_f64().ok_or_else(mismatch)?;
            let narrow = wide as f32;
            if wide.is_finite() && !narrow.is_finite() {
                return Err(EngineError::TypeMismatch {
                    path: display_path(path),
                    expected: "number within float range".into(),
                    found: wide.to_string(),
                });
            }
            EngineValue::Float(narrow)
        }
        Shape::Double => EngineValue::Double(value.as_f64().ok_or_else(mismatch)?),
        Shape::Str => EngineValue::Str(string(value).ok_or_else(mismatch)?),
        Shape::Name => EngineValue::Name(string(value).ok_or_else(mismatch)?),
        Shape::Text => EngineValue::Text(string(value).ok_or_else(mismatch)?),
        Shape::Enum {
            enum_type,
            variants,
        } => {
            let name = value.as_str().ok_or_else(mismatch)?;
            if !variants.iter().any(|v| v == name) {
                return Err(EngineError::TypeMismatch {
                    path: display_path(path),
                    expected: format!("one of {}", variants.join(", ")),
                    found: format!("'{name}'"),
                });
            }
            EngineValue::Enum {
                enum_type: enum_type.clone(),
                value: name.to_string(),
            }
        }
        Shape::Struct(shape) => {
            let map = value.as_object().ok_or_else(mismatch)?;
            EngineValue::Struct(decode_struct(map, shape, path)?)
        }
        Shape::Array(items) => {
            EngineValue::Array(decode_items(value, items, path, mismatch)?)
        }
        Shape::Set(items) => {
            let mut unique: Vec<EngineValue> = Vec::new();
            for item in decode_items(value, items, path, mismatch)? {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            EngineValue::Set(unique)
        }
        Shape::Map(values) => {
            let map = value.as_object().ok_or_else(mismatch)?;
            EngineValue::Map(
                map.iter()
                    .map(|(key, item)| {
                        decode(item, values, &field_path(path, key))
                            .map(|v| (key.to_string(), v))
                    })
                    .collect::<Result<_, _>>()?,
            )
        }
        Shape::Tag => {
            let tag = value.as_str().ok_or_else(mismatch)?;
            EngineValue::Tag(checked_tag(tag, path)?)
        }
        Shape::Tags => {
            let items = value.as_array().ok_or_else(mismatch)?;
            let mut tags: Vec<String> = Vec::with_capacity(items.len());
            let mut seen = HashSet::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = index_path(path, i);
                let tag = item.as_str().ok_or_else(|| EngineError::TypeMismatch {
                    path: display_path(&item_path),
                    expected: "gameplay tag".into(),
                    found: item.type_name().into(),
                })?;
                let tag = checked_tag(tag, &item_path)?;
                if seen.insert(tag.clone()) {
                    tags.push(tag);
                }
            }
            EngineValue::Tags(tags)
        }
        Shape::ObjectRef { class } => EngineValue::ObjectRef {
            class: class.clone(),
            path: reference(value).ok_or_else(mismatch)?,
        },
        Shape::SoftRef => EngineValue::SoftRef(reference(value).ok_or_else(mismatch)?),
        Shape::Instanced { base, variants } => {
            if value.is_null() {
                return Ok(EngineValue::Instanced {
                    base: base.clone(),
                    value: None,
                });
            }
            let map = value.as_object().ok_or_else(mismatch)?;
            let type_name = map
                .get(STRUCT_TYPE_KEY)
                .and_then(StructuredValue::as_str)
                .ok_or_else(|| EngineError::TypeMismatch {
                    path: display_path(&field_path(path, STRUCT_TYPE_KEY)),
                    expected: format!("{base} subtype name"),
                    found: "nothing".into(),
                })?;
            let variant = variants
                .iter()
                .find(|v| v.type_name == type_name)
                .ok_or_else(|| EngineError::TypeMismatch {
                    path: display_path(&field_path(path, STRUCT_TYPE_KEY)),
                    expected: format!("{base} subtype"),
                    found: format!("'{type_name}'"),
                })?;
            EngineValue::Instanced {
                base: base.clone(),
                value: Some(decode_struct(map, variant, path)?),
            }
        }
        Shape::Opaque { type_name } => {
            return Err(EngineError::Unsupported {
                path: display_path(path),
                type_name: type_name.clone(),
            });
        }
    })
}

fn decode_struct(
    map: &Map,
    shape: &StructShape,
    path: &str,
) -> Result<EngineStruct, EngineError> {
    for key in map.keys() {
        if !key.starts_with('_') && shape.get(key).is_none() {
            return Err(EngineError::UnknownField {
                path: field_path(path, key),
            });
        }
    }

    let mut fields = Vec::with_capacity(shape.fields.len());
    for field in &shape.fields {
        let value = match map.get(&field.name) {
            Some(v) => decode(v, &field.shape, &field_path(path, &field.name))?,
            None => field.default_value(),
        };
        fields.push((field.name.clone(), value));
    }
    Ok(EngineStruct {
        type_name: shape.type_name.clone(),
        fields,
    })
}

fn decode_items(
    value: &StructuredValue,
    shape: &Shape,
    path: &str,
    mismatch: impl FnOnce() -> EngineError,
) -> Result<Vec<EngineValue>, EngineError> {
    value
        .as_array()
        .ok_or_else(mismatch)?
        .iter()
        .enumerate()
        .map(|(i, item)| decode(item, shape, &index_path(path, i)))
        .collect()
}

/// Integers, or floats with no fractional part.
fn integral(value: &StructuredValue) -> Option<i64> {
    value.as_i64().or_else(|| {
        let f = value.as_f64()?;
        (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
            .then_some(f as i64)
    })
}

fn string(value: &StructuredValue) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// `null` and `""` are "no object"; anything else must be a path string.
fn reference(value: &StructuredValue) -> Option<Option<String>> {
    match value {
        StructuredValue::Null => Some(None),
        StructuredValue::String(s) if s.is_empty() => Some(None),
        StructuredValue::String(s) => Some(Some(s.clone())),
        _ => None,
    }
}

fn checked_tag(tag: &str, path: &str) -> Result<String, EngineError> {
    if tag.is_empty() || is_valid_tag(tag) {
        Ok(tag.to_string())
    } else {
        Err(EngineError::TypeMismatch {
            path: display_path(path),
            expected: "gameplay tag (letters, digits, '_' and '.')".into(),
            found: format!("'{tag}'"),
        })
    }
}

// -- Paths ------------------------------------------------------------------

fn field_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldShape;

    fn heal(amount: f32) -> EngineStruct {
        EngineStruct::new("HealEffect").field("Amount", EngineValue::Float(amount))
    }

    fn buff(stat: &str) -> EngineStruct {
        EngineStruct::new("BuffEffect")
            .field("Stat", EngineValue::Name(stat.into()))
            .field("Duration", EngineValue::Float(4.0))
    }

    fn effect(value: Option<EngineStruct>) -> EngineValue {
        EngineValue::Instanced {
            base: "ItemEffect".into(),
            value,
        }
    }

    fn rarity(value: &str) -> EngineValue {
        EngineValue::Enum {
            enum_type: "ERarity".into(),
            value: value.into(),
        }
    }

    fn effect_shape() -> Shape {
        Shape::Instanced {
            base: "ItemEffect".into(),
            variants: vec![
                heal(0.0).shape(),
                StructShape::new("BuffEffect")
                    .field(FieldShape::new("Stat", Shape::Name))
                    .field(FieldShape::new("Duration", Shape::Float)),
            ],
        }
    }

    fn item() -> EngineValue {
        EngineValue::Struct(
            EngineStruct::new("ItemDefinition")
                .field("Guid", EngineValue::Str("a1b2".into()))
                .field("DisplayName", EngineValue::Text("Iron Sword".into()))
                .field("Id", EngineValue::Int64(9_000_000_001))
                .field("MaxStack", EngineValue::Int(1))
                .field("Quality", EngineValue::Byte(200))
                .field("Weight", EngineValue::Float(3.25))
                .field("Price", EngineValue::Double(149.99))
                .field("Equippable", EngineValue::Bool(true))
                .field("Socket", EngineValue::Name("hand_r".into()))
                .field(
                    "Rarity",
                    EngineValue::Enum {
                        enum_type: "ERarity".into(),
                        value: "Rare".into(),
                    },
                )
                .field(
                    "Tags",
                    EngineValue::Tags(vec![
                        "Item.Weapon.Sword".into(),
                        "Item.Tradable".into(),
                    ]),
                )
                .field("PrimaryTag", EngineValue::Tag("Item.Weapon".into()))
                .field(
                    "Mesh",
                    EngineValue::ObjectRef {
                        class: "StaticMesh".into(),
                        path: Some("/Game/Meshes/SM_Sword.SM_Sword".into()),
                    },
                )
                .field("Icon", EngineValue::SoftRef(None))
                .field(
                    "Effects",
                    EngineValue::Array(vec![effect(Some(heal(5.0)))]),
                )
                .field(
                    "Sockets",
                    EngineValue::Set(vec![
                        EngineValue::Name("hand_r".into()),
                        EngineValue::Name("back".into()),
                    ]),
                )
                .field(
                    "Modifiers",
                    EngineValue::Map(vec![
                        ("Strength".into(), EngineValue::Int(2)),
                        ("Agility".into(), EngineValue::Int(-1)),
                    ]),
                ),
        )
    }

    // =====================================================================
    // Round trip
    // =====================================================================

    #[test]
    fn test_round_trip_every_supported_shape_is_field_for_field_equal() {
        let value = item();
        let structured = to_structured(&value).unwrap();
        let back = from_structured(&structured, &value.shape()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_round_trip_through_json_text() {
        let value = item();
        let text = to_structured(&value).unwrap().to_string();
        let parsed: StructuredValue = serde_json::from_str(&text).unwrap();
        let back = from_structured(&parsed, &value.shape()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_round_trip_instanced_uses_declared_variants() {
        let value = effect(Some(heal(2.5)));
        let structured = to_structured(&value).unwrap();
        assert_eq!(
            structured.get(STRUCT_TYPE_KEY).and_then(|v| v.as_str()),
            Some("HealEffect")
        );
        assert_eq!(from_structured(&structured, &effect_shape()).unwrap(), value);
    }

    #[test]
    fn test_round_trip_mixed_enum_array() {
        let value = EngineValue::Array(vec![
            rarity("Common"),
            rarity("Rare"),
            rarity("Epic"),
            rarity("Rare"),
        ]);
        let structured = to_structured(&value).unwrap();
        assert_eq!(from_structured(&structured, &value.shape()).unwrap(), value);
    }

    #[test]
    fn test_round_trip_mixed_instanced_array() {
        let value = EngineValue::Array(vec![
            effect(Some(heal(5.0))),
            effect(None),
            effect(Some(buff("Defense"))),
            effect(Some(heal(1.5))),
        ]);
        let structured = to_structured(&value).unwrap();
        assert_eq!(from_structured(&structured, &value.shape()).unwrap(), value);
    }

    #[test]
    fn test_round_trip_mixed_values_in_nested_struct_map() {
        let slot = |r: &str| {
            EngineValue::Struct(EngineStruct::new("Slot").field("Rarity", rarity(r)))
        };
        let value = EngineValue::Map(vec![
            ("head".into(), slot("Common")),
            ("chest".into(), slot("Epic")),
        ]);
        let structured = to_structured(&value).unwrap();
        assert_eq!(from_structured(&structured, &value.shape()).unwrap(), value);
    }

    // =====================================================================
    // to_structured
    // =====================================================================

    #[test]
    fn test_to_structured_struct_keeps_field_order() {
        let structured = to_structured(&item()).unwrap();
        let keys: Vec<&str> = structured.as_object().unwrap().keys().collect();
        assert_eq!(keys.first(), Some(&"Guid"));
        assert_eq!(keys.last(), Some(&"Modifiers"));
    }

    #[test]
    fn test_to_structured_tags_dedup_preserving_order() {
        let tags = EngineValue::Tags(vec![
            "B.Tag".into(),
            "A.Tag".into(),
            "B.Tag".into(),
        ]);
        assert_eq!(
            to_structured(&tags).unwrap(),
            StructuredValue::from(vec!["B.Tag", "A.Tag"])
        );
    }

    #[test]
    fn test_to_structured_empty_refs_are_null() {
        let hard = EngineValue::ObjectRef {
            class: "Texture2D".into(),
            path: None,
        };
        assert!(to_structured(&hard).unwrap().is_null());
        assert!(to_structured(&effect(None)).unwrap().is_null());
    }

    #[test]
    fn test_to_structured_opaque_reports_path() {
        let value = EngineValue::Struct(EngineStruct::new("Widget").field(
            "OnClicked",
            EngineValue::Opaque {
                type_name: "MulticastDelegate".into(),
            },
        ));
        let err = to_structured(&value).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Unsupported { ref path, .. } if path == "OnClicked"
        ));
    }

    #[test]
    fn test_to_structured_nan_is_unsupported() {
        let err = to_structured(&EngineValue::Float(f32::NAN)).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported { .. }));
    }

    // =====================================================================
    // from_structured
    // =====================================================================

    fn parse(json: &str) -> StructuredValue {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_from_structured_wrong_type_names_nested_path() {
        let value = item();
        let input = parse(r#"{"Effects":[{"_struct_type":"HealEffect","Amount":"lots"}]}"#);
        let err = from_structured(&input, &value.shape()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::TypeMismatch { ref path, .. } if path == "Effects[0].Amount"
        ));
    }

    #[test]
    fn test_from_structured_missing_fields_take_defaults() {
        let shape = StructShape::new("Item")
            .field(FieldShape::new("Name", Shape::Str))
            .field(
                FieldShape::new("MaxStack", Shape::Int)
                    .with_default(EngineValue::Int(99)),
            );
        let out = from_structured(&parse(r#"{"Name":"Potion"}"#), &Shape::Struct(shape))
            .unwrap();
        let EngineValue::Struct(s) = out else {
            panic!("expected struct");
        };
        assert_eq!(s.get("MaxStack"), Some(&EngineValue::Int(99)));
    }

    #[test]
    fn test_from_structured_unknown_field_rejected_metadata_skipped() {
        let shape = Shape::Struct(
            StructShape::new("Item").field(FieldShape::new("Name", Shape::Str)),
        );
        assert!(from_structured(&parse(r#"{"Name":"x","_comment":"hi"}"#), &shape).is_ok());
        let err = from_structured(&parse(r#"{"Name":"x","Nmae":"y"}"#), &shape)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnknownField { ref path } if path == "Nmae"
        ));
    }

    #[test]
    fn test_from_structured_unknown_enum_variant_is_mismatch() {
        let shape = Shape::Enum {
            enum_type: "ERarity".into(),
            variants: vec!["Common".into(), "Rare".into()],
        };
        let err = from_structured(&"Mythic".into(), &shape).unwrap_err();
        assert!(err.to_string().contains("one of Common, Rare"));
    }

    #[test]
    fn test_from_structured_int_range_checked() {
        assert!(from_structured(&256.into(), &Shape::Byte).is_err());
        assert!(from_structured(&(i64::from(i32::MAX) + 1).into(), &Shape::Int).is_err());
        assert_eq!(
            from_structured(&StructuredValue::from(4.0), &Shape::Int).unwrap(),
            EngineValue::Int(4)
        );
        assert!(from_structured(&StructuredValue::from(4.5), &Shape::Int).is_err());
    }

    #[test]
    fn test_from_structured_float_out_of_range_is_mismatch() {
        let err = from_structured(&StructuredValue::from(1e40), &Shape::Float)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::TypeMismatch { ref path, .. } if path == "<root>"
        ));
        assert_eq!(
            from_structured(&StructuredValue::from(1e40), &Shape::Double).unwrap(),
            EngineValue::Double(1e40)
        );
        assert_eq!(
            from_structured(&StructuredValue::from(-2.5), &Shape::Float).unwrap(),
            EngineValue::Float(-2.5)
        );
    }

    #[test]
    fn test_from_structured_malformed_tag_is_mismatch() {
        let err = from_structured(&parse(r#"["Item.Weapon", ".Bad"]"#), &Shape::Tags)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::TypeMismatch { ref path, .. } if path == "[1]"
        ));
    }

    #[test]
    fn test_from_structured_instanced_unknown_subtype_is_mismatch() {
        let err = from_structured(&parse(r#"{"_struct_type":"FireEffect"}"#), &effect_shape())
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_from_structured_opaque_shape_is_unsupported() {
        let shape = Shape::Opaque {
            type_name: "Delegate".into(),
        };
        assert!(matches!(
            from_structured(&StructuredValue::Null, &shape),
            Err(EngineError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_from_structured_at_prefixes_error_path() {
        let value: StructuredValue = vec![StructuredValue::from("x")].into();
        let shape = Shape::Array(Box::new(Shape::Int));
        let err = from_structured_at(&value, &shape, "Counts").unwrap_err();
        assert!(matches!(
            err,
            EngineError::TypeMismatch { ref path, .. } if path == "Counts[0]"
        ));
    }
}
