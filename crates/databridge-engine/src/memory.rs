//! An in-process [`EngineFacade`] over plain maps.
//!
//! Used by the test suites and the demo editor in place of a live engine.
//! [`MemoryEngine::sample`] builds a small item-database project.
//!
//! DataTables are kept apart from plain assets: they are listed by
//! [`EngineFacade::list_tables`], not by [`EngineFacade::list_assets`].

use std::collections::BTreeMap;

use databridge_protocol::Map;

use crate::{
    is_valid_tag, ActorSummary, AssetFilter, AssetSummary, ChangeKind,
    ChangeNotice, ChangeTopic, EngineError, EngineFacade, EngineHandle,
    EngineRef, EngineStatus, EngineStruct, EngineValue, FieldShape,
    HandleKind, PropertyDelta, Shape, StructShape, TableSummary, TagInfo,
};

struct MemoryObject {
    shape: StructShape,
    value: EngineStruct,
    locked: bool,
}

/// A DataTable: a row struct and named rows in insertion order.
struct MemoryTable {
    row_shape: StructShape,
    rows: Vec<(String, EngineStruct)>,
    locked: bool,
}

impl MemoryTable {
    fn position(&self, row_name: &str) -> Option<usize> {
        self.rows.iter().position(|(name, _)| name == row_name)
    }
}

/// A map-backed engine with assets, actors, DataTables and gameplay tags.
pub struct MemoryEngine {
    engine_version: String,
    project_name: String,
    level: String,
    assets: BTreeMap<String, MemoryObject>,
    actors: BTreeMap<String, MemoryObject>,
    tables: BTreeMap<String, MemoryTable>,
    tags: BTreeMap<String, String>,
    changes: Vec<ChangeNotice>,
}

impl MemoryEngine {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            engine_version: "5.4.4".into(),
            project_name: project_name.into(),
            level: "/Game/Maps/Sandbox".into(),
            assets: BTreeMap::new(),
            actors: BTreeMap::new(),
            tables: BTreeMap::new(),
            tags: BTreeMap::new(),
            changes: Vec::new(),
        }
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    /// Adds an asset at an object path. Its class is the shape's type name.
    pub fn with_asset(
        mut self,
        path: impl Into<String>,
        shape: StructShape,
        value: EngineStruct,
    ) -> Self {
        self.assets.insert(
            path.into(),
            MemoryObject {
                shape,
                value,
                locked: false,
            },
        );
        self
    }

    /// Adds an actor to the current level.
    pub fn with_actor(
        mut self,
        name: impl Into<String>,
        shape: StructShape,
        value: EngineStruct,
    ) -> Self {
        self.actors.insert(
            name.into(),
            MemoryObject {
                shape,
                value,
                locked: false,
            },
        );
        self
    }

    /// Adds a DataTable with the given row struct and rows.
    pub fn with_table(
        mut self,
        path: impl Into<String>,
        row_shape: StructShape,
        rows: Vec<(String, EngineStruct)>,
    ) -> Self {
        self.tables.insert(
            path.into(),
            MemoryTable {
                row_shape,
                rows,
                locked: false,
            },
        );
        self
    }

    pub fn with_tag(
        mut self,
        tag: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        self.tags.insert(tag.into(), comment.into());
        self
    }

    /// Marks an asset or DataTable as locked; mutations of it are rejected.
    pub fn lock(mut self, path: &str) -> Self {
        if let Some(object) = self.assets.get_mut(path) {
            object.locked = true;
        }
        if let Some(table) = self.tables.get_mut(path) {
            table.locked = true;
        }
        self
    }

    fn table(&self, path: &str) -> Result<&MemoryTable, EngineError> {
        self.tables
            .get(path)
            .ok_or_else(|| EngineError::NotFound(format!("DataTable '{path}'")))
    }

    fn object(&self, handle: &EngineHandle) -> Result<&MemoryObject, EngineError> {
        let objects = match handle.kind() {
            HandleKind::Asset => &self.assets,
            HandleKind::Actor => &self.actors,
        };
        objects
            .get(handle.path())
            .ok_or_else(|| EngineError::NotFound(handle.path().to_string()))
    }

    fn actor_path(&self, name: &str) -> String {
        format!("{}:PersistentLevel.{name}", self.level)
    }
}

impl EngineFacade for MemoryEngine {
    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine_version: self.engine_version.clone(),
            project_name: self.project_name.clone(),
            asset_registry_ready: true,
            gameplay_tags_ready: true,
        }
    }

    fn resolve(&self, target: &EngineRef) -> Result<EngineHandle, EngineError> {
        let (kind, objects, key) = match target {
            EngineRef::Asset(path) => (HandleKind::Asset, &self.assets, path),
            EngineRef::Actor(name) => (HandleKind::Actor, &self.actors, name),
        };
        objects
            .get(key)
            .map(|object| {
                EngineHandle::new(kind, key.clone(), object.shape.type_name.clone())
            })
            .ok_or_else(|| EngineError::NotFound(target.to_string()))
    }

    fn describe(&self, handle: &EngineHandle) -> Result<StructShape, EngineError> {
        Ok(self.object(handle)?.shape.clone())
    }

    fn read(&self, handle: &EngineHandle) -> Result<EngineStruct, EngineError> {
        Ok(self.object(handle)?.value.clone())
    }

    fn mutate(
        &mut self,
        handle: &EngineHandle,
        delta: PropertyDelta,
    ) -> Result<(), EngineError> {
        let (objects, topic) = match handle.kind() {
            HandleKind::Asset => (&mut self.assets, ChangeTopic::Asset),
            HandleKind::Actor => (&mut self.actors, ChangeTopic::Actor),
        };
        let object = objects
            .get_mut(handle.path())
            .ok_or_else(|| EngineError::NotFound(handle.path().to_string()))?;

        if object.locked {
            return Err(EngineError::Rejected {
                reason: format!("'{}' is locked", handle.path()),
                details: Some(
                    Map::new()
                        .with("path", handle.path())
                        .with("reason", "locked")
                        .into(),
                ),
            });
        }

        let field = object.shape.field_at(&delta.property).ok_or_else(|| {
            EngineError::NotFound(format!(
                "property '{}' on '{}'",
                delta.property,
                handle.path()
            ))
        })?;
        if field.read_only {
            return Err(EngineError::Rejected {
                reason: format!("property '{}' is read-only", delta.property),
                details: Some(
                    Map::new()
                        .with("property", delta.property.clone())
                        .with("reason", "read_only")
                        .into(),
                ),
            });
        }

        object
            .value
            .set_path(&delta.property, delta.value)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "property '{}' on '{}'",
                    delta.property,
                    handle.path()
                ))
            })?;

        tracing::debug!(
            path = handle.path(),
            property = %delta.property,
            "property changed"
        );
        self.changes.push(ChangeNotice::new(
            topic,
            ChangeKind::Modified,
            handle.path(),
        ));
        Ok(())
    }

    fn list_assets(&self, filter: &AssetFilter) -> Vec<AssetSummary> {
        self.assets
            .iter()
            .filter_map(|(path, object)| {
                let name = path.rsplit('/').next().unwrap_or(path);
                let class_name = &object.shape.type_name;
                filter.matches(path, name, class_name).then(|| AssetSummary {
                    name: name.to_string(),
                    path: path.clone(),
                    class_name: class_name.clone(),
                })
            })
            .collect()
    }

    fn list_actors(&self, class_name: Option<&str>) -> Vec<ActorSummary> {
        self.actors
            .iter()
            .filter(|(_, object)| {
                class_name.is_none_or(|class| class == object.shape.type_name)
            })
            .map(|(name, object)| ActorSummary {
                name: name.clone(),
                path: self.actor_path(name),
                class_name: object.shape.type_name.clone(),
            })
            .collect()
    }

    fn gameplay_tags(&self) -> Vec<TagInfo> {
        self.tags
            .iter()
            .map(|(tag, comment)| TagInfo {
                tag: tag.clone(),
                comment: comment.clone(),
            })
            .collect()
    }

    fn register_gameplay_tag(
        &mut self,
        tag: &str,
        comment: &str,
    ) -> Result<bool, EngineError> {
        if !is_valid_tag(tag) {
            return Err(EngineError::rejected(format!(
                "'{tag}' is not a valid gameplay tag name"
            )));
        }
        if self.tags.contains_key(tag) {
            return Ok(true);
        }
        self.tags.insert(tag.to_string(), comment.to_string());
        tracing::info!(tag, "gameplay tag registered");
        self.changes.push(ChangeNotice::new(
            ChangeTopic::GameplayTag,
            ChangeKind::Created,
            tag,
        ));
        Ok(false)
    }

    fn list_tables(&self, path_filter: Option<&str>) -> Vec<TableSummary> {
        let filter = path_filter.map(str::to_lowercase);
        self.tables
            .iter()
            .filter(|(path, _)| {
                filter
                    .as_deref()
                    .is_none_or(|f| path.to_lowercase().contains(f))
            })
            .map(|(path, table)| TableSummary {
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                path: path.clone(),
                row_struct: table.row_shape.type_name.clone(),
                row_count: table.rows.len(),
            })
            .collect()
    }

    fn describe_table(&self, table: &str) -> Result<StructShape, EngineError> {
        Ok(self.table(table)?.row_shape.clone())
    }

    fn table_rows(
        &self,
        table: &str,
    ) -> Result<Vec<(String, EngineStruct)>, EngineError> {
        Ok(self.table(table)?.rows.clone())
    }

    fn read_row(&self, table: &str, row_name: &str) -> Result<EngineStruct, EngineError> {
        let data = self.table(table)?;
        data.position(row_name)
            .map(|i| data.rows[i].1.clone())
            .ok_or_else(|| EngineError::NotFound(format!("row '{row_name}' in '{table}'")))
    }

    fn write_row(
        &mut self,
        table: &str,
        row_name: &str,
        value: EngineStruct,
    ) -> Result<bool, EngineError> {
        let data = self
            .tables
            .get_mut(table)
            .ok_or_else(|| EngineError::NotFound(format!("DataTable '{table}'")))?;
        if data.locked {
            return Err(EngineError::Rejected {
                reason: format!("'{table}' is locked"),
                details: Some(
                    Map::new()
                        .with("path", table)
                        .with("reason", "locked")
                        .into(),
                ),
            });
        }
        if row_name.trim().is_empty() {
            return Err(EngineError::rejected("row names must be non-empty"));
        }
        if value.type_name != data.row_shape.type_name {
            return Err(EngineError::rejected(format!(
                "'{table}' stores {} rows, not {}",
                data.row_shape.type_name, value.type_name
            )));
        }

        let created = match data.position(row_name) {
            Some(i) => {
                data.rows[i].1 = value;
                false
            }
            None => {
                data.rows.push((row_name.to_string(), value));
                true
            }
        };
        tracing::debug!(table, row = row_name, created, "row written");
        self.changes.push(ChangeNotice::new(
            ChangeTopic::Asset,
            ChangeKind::Modified,
            table,
        ));
        Ok(created)
    }

    fn delete_row(&mut self, table: &str, row_name: &str) -> Result<(), EngineError> {
        let data = self
            .tables
            .get_mut(table)
            .ok_or_else(|| EngineError::NotFound(format!("DataTable '{table}'")))?;
        if data.locked {
            return Err(EngineError::rejected(format!("'{table}' is locked")));
        }
        let index = data.position(row_name).ok_or_else(|| {
            EngineError::NotFound(format!("row '{row_name}' in '{table}'"))
        })?;
        data.rows.remove(index);
        tracing::debug!(table, row = row_name, "row deleted");
        self.changes.push(ChangeNotice::new(
            ChangeTopic::Asset,
            ChangeKind::Modified,
            table,
        ));
        Ok(())
    }

    fn drain_changes(&mut self) -> Vec<ChangeNotice> {
        std::mem::take(&mut self.changes)
    }
}

// ---------------------------------------------------------------------------
// Sample project
// ---------------------------------------------------------------------------

impl MemoryEngine {
    /// A small item-database project.
    ///
    /// Assets:
    /// - `/Game/Items/DA_Sword`, `/Game/Items/DA_Shield` (`ItemDefinition`)
    /// - `/Game/Core/DA_GameRules` (`GameRules`, locked)
    ///
    /// DataTables:
    /// - `/Game/Data/DT_Items` (`ItemTableRow`, four rows)
    /// - `/Game/Data/Status/DT_StatusEffects` (`StatusEffectRow`, two rows)
    ///
    /// Actors `PlayerStart_0` and `BP_Torch_2`, and tags under `Item.*`
    /// and `Status.*`.
    pub fn sample() -> Self {
        let item = item_shape();
        let rules = StructShape::new("GameRules")
            .field(FieldShape::new("MaxPlayers", Shape::Int))
            .field(FieldShape::new("FriendlyFire", Shape::Bool))
            .field(FieldShape::new("RespawnDelay", Shape::Float));
        let player_start = StructShape::new("PlayerStart")
            .field(FieldShape::new("Location", Shape::Struct(vector_shape())))
            .field(FieldShape::new("PlayerStartTag", Shape::Name));
        let torch = StructShape::new("BP_Torch_C")
            .field(FieldShape::new("Location", Shape::Struct(vector_shape())))
            .field(FieldShape::new("Intensity", Shape::Float))
            .field(FieldShape::new("Hidden", Shape::Bool));

        Self::new("DataBridgeSandbox")
            .with_asset(
                "/Game/Items/DA_Sword",
                item.clone(),
                item_value(ItemRow {
                    display_name: "Iron Sword",
                    weight: 3.5,
                    rarity: "Rare",
                    tag: "Item.Weapon.Sword",
                    icon: Some("/Game/UI/Icons/T_Sword.T_Sword"),
                    damage: 12.5,
                    durability: 100,
                    effect: heal_effect(5.0),
                    guid: "5E1C0A4B-7D3F-4E22-9A61-0B8E5D2F7C10",
                }),
            )
            .with_asset(
                "/Game/Items/DA_Shield",
                item,
                item_value(ItemRow {
                    display_name: "Oak Shield",
                    weight: 6.0,
                    rarity: "Common",
                    tag: "Item.Armor.Shield",
                    icon: None,
                    damage: 2.0,
                    durability: 250,
                    effect: buff_effect("Defense", 10.0),
                    guid: "A94F3B20-1C6E-4D8B-B2F7-63E0D9A15C48",
                }),
            )
            .with_asset(
                "/Game/Core/DA_GameRules",
                rules,
                EngineStruct::new("GameRules")
                    .field("MaxPlayers", EngineValue::Int(8))
                    .field("FriendlyFire", EngineValue::Bool(false))
                    .field("RespawnDelay", EngineValue::Float(5.0)),
            )
            .lock("/Game/Core/DA_GameRules")
            .with_actor(
                "PlayerStart_0",
                player_start,
                EngineStruct::new("PlayerStart")
                    .field("Location", vector(0.0, 0.0, 100.0))
                    .field("PlayerStartTag", EngineValue::Name("Default".into())),
            )
            .with_actor(
                "BP_Torch_2",
                torch,
                EngineStruct::new("BP_Torch_C")
                    .field("Location", vector(450.0, -120.0, 180.0))
                    .field("Intensity", EngineValue::Float(1200.0))
                    .field("Hidden", EngineValue::Bool(false)),
            )
            .with_table("/Game/Data/DT_Items", item_row_shape(), item_rows())
            .with_table(
                "/Game/Data/Status/DT_StatusEffects",
                status_row_shape(),
                status_rows(),
            )
            .with_tag("Item", "")
            .with_tag("Item.Weapon", "Anything that deals damage")
            .with_tag("Item.Weapon.Sword", "")
            .with_tag("Item.Armor", "")
            .with_tag("Item.Armor.Shield", "")
            .with_tag("Status.Burning", "Damage over time from fire")
    }
}

fn rarity_shape() -> Shape {
    Shape::Enum {
        enum_type: "ERarity".into(),
        variants: vec!["Common".into(), "Rare".into(), "Epic".into()],
    }
}

fn effect_shape() -> Shape {
    Shape::Instanced {
        base: "ItemEffect".into(),
        variants: vec![
            StructShape::new("HealEffect")
                .field(FieldShape::new("Amount", Shape::Float)),
            StructShape::new("BuffEffect")
                .field(FieldShape::new("Stat", Shape::Name))
                .field(FieldShape::new("Duration", Shape::Float)),
        ],
    }
}

fn vector_shape() -> StructShape {
    StructShape::new("Vector")
        .field(FieldShape::new("X", Shape::Double))
        .field(FieldShape::new("Y", Shape::Double))
        .field(FieldShape::new("Z", Shape::Double))
}

fn item_shape() -> StructShape {
    let stats = StructShape::new("ItemStats")
        .field(FieldShape::new("Damage", Shape::Double))
        .field(FieldShape::new("Durability", Shape::Int));

    StructShape::new("ItemDefinition")
        .field(FieldShape::new("DisplayName", Shape::Text))
        .field(
            FieldShape::new("MaxStack", Shape::Int)
                .with_default(EngineValue::Int(1)),
        )
        .field(FieldShape::new("Weight", Shape::Float))
        .field(FieldShape::new("Rarity", rarity_shape()))
        .field(FieldShape::new("Tags", Shape::Tags))
        .field(FieldShape::new("Icon", Shape::SoftRef))
        .field(FieldShape::new("Stats", Shape::Struct(stats)))
        .field(FieldShape::new("Effects", Shape::Array(Box::new(effect_shape()))))
        .field(FieldShape::new("Guid", Shape::Str).read_only())
}

struct ItemRow {
    display_name: &'static str,
    weight: f32,
    rarity: &'static str,
    tag: &'static str,
    icon: Option<&'static str>,
    damage: f64,
    durability: i32,
    effect: EngineStruct,
    guid: &'static str,
}

fn item_value(row: ItemRow) -> EngineStruct {
    EngineStruct::new("ItemDefinition")
        .field("DisplayName", EngineValue::Text(row.display_name.into()))
        .field("MaxStack", EngineValue::Int(1))
        .field("Weight", EngineValue::Float(row.weight))
        .field(
            "Rarity",
            EngineValue::Enum {
                enum_type: "ERarity".into(),
                value: row.rarity.into(),
            },
        )
        .field("Tags", EngineValue::Tags(vec![row.tag.into()]))
        .field("Icon", EngineValue::SoftRef(row.icon.map(str::to_string)))
        .field(
            "Stats",
            EngineValue::Struct(
                EngineStruct::new("ItemStats")
                    .field("Damage", EngineValue::Double(row.damage))
                    .field("Durability", EngineValue::Int(row.durability)),
            ),
        )
        .field(
            "Effects",
            EngineValue::Array(vec![EngineValue::Instanced {
                base: "ItemEffect".into(),
                value: Some(row.effect),
            }]),
        )
        .field("Guid", EngineValue::Str(row.guid.into()))
}

fn item_row_shape() -> StructShape {
    StructShape::new("ItemTableRow")
        .field(FieldShape::new("DisplayName", Shape::Text))
        .field(FieldShape::new("Rarity", rarity_shape()))
        .field(FieldShape::new("Damage", Shape::Float))
        .field(FieldShape::new("ItemTag", Shape::Tag))
        .field(FieldShape::new("Categories", Shape::Tags))
        .field(FieldShape::new("Description", Shape::Str))
}

fn item_row(
    display_name: &str,
    rarity: &str,
    damage: f32,
    tag: &str,
    categories: &[&str],
    description: &str,
) -> EngineStruct {
    EngineStruct::new("ItemTableRow")
        .field("DisplayName", EngineValue::Text(display_name.into()))
        .field(
            "Rarity",
            EngineValue::Enum {
                enum_type: "ERarity".into(),
                value: rarity.into(),
            },
        )
        .field("Damage", EngineValue::Float(damage))
        .field("ItemTag", EngineValue::Tag(tag.into()))
        .field(
            "Categories",
            EngineValue::Tags(categories.iter().map(|c| c.to_string()).collect()),
        )
        .field("Description", EngineValue::Str(description.into()))
}

fn item_rows() -> Vec<(String, EngineStruct)> {
    vec![
        (
            "Sword".into(),
            item_row(
                "Iron Sword",
                "Rare",
                12.5,
                "Item.Weapon.Sword",
                &["Item.Weapon"],
                "A sturdy blade forged from iron",
            ),
        ),
        (
            "Shield".into(),
            item_row(
                "Oak Shield",
                "Common",
                2.0,
                "Item.Armor.Shield",
                &["Item.Armor"],
                "Blocks most frontal attacks",
            ),
        ),
        (
            "Axe".into(),
            item_row(
                "Fire Axe",
                "Epic",
                18.0,
                "Item.Weapon.Axe",
                &["Item.Weapon", "Status.Burning"],
                "Sets targets on fire",
            ),
        ),
        (
            "Torch".into(),
            item_row(
                "Torch",
                "Common",
                1.0,
                "Item.Tool.Torch",
                &["Status.Burning"],
                "Lights dark places",
            ),
        ),
    ]
}

fn status_row_shape() -> StructShape {
    StructShape::new("StatusEffectRow")
        .field(FieldShape::new("StatusTag", Shape::Tag))
        .field(FieldShape::new("Duration", Shape::Float))
        .field(FieldShape::new("Stackable", Shape::Bool))
}

fn status_rows() -> Vec<(String, EngineStruct)> {
    let row = |tag: &str, duration: f32, stackable: bool| {
        EngineStruct::new("StatusEffectRow")
            .field("StatusTag", EngineValue::Tag(tag.into()))
            .field("Duration", EngineValue::Float(duration))
            .field("Stackable", EngineValue::Bool(stackable))
    };
    vec![
        ("Burning".into(), row("Status.Burning", 4.0, true)),
        ("Frozen".into(), row("Status.Frozen", 2.5, false)),
    ]
}

fn heal_effect(amount: f32) -> EngineStruct {
    EngineStruct::new("HealEffect").field("Amount", EngineValue::Float(amount))
}

fn buff_effect(stat: &str, duration: f32) -> EngineStruct {
    EngineStruct::new("BuffEffect")
        .field("Stat", EngineValue::Name(stat.into()))
        .field("Duration", EngineValue::Float(duration))
}

fn vector(x: f64, y: f64, z: f64) -> EngineValue {
    EngineValue::Struct(
        EngineStruct::new("Vector")
            .field("X", EngineValue::Double(x))
            .field("Y", EngineValue::Double(y))
            .field("Z", EngineValue::Double(z)),
    )
}
