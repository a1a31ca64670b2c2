//! The Engine Access Facade: the boundary to the host engine.
//!
//! The bridge never touches engine state directly. Everything goes through
//! an [`EngineFacade`], and every facade call runs on the engine context
//! (see [`EngineContext`](crate::EngineContext)), so implementations may
//! assume single-threaded access and need not be `Sync`.

use std::fmt;

use databridge_protocol::{Map, StructuredValue};

use crate::{EngineError, EngineStruct, EngineValue, StructShape};

// ---------------------------------------------------------------------------
// References and handles
// ---------------------------------------------------------------------------

/// What a client asks for: an asset path or an actor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRef {
    Asset(String),
    Actor(String),
}

impl fmt::Display for EngineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset(path) => write!(f, "asset '{path}'"),
            Self::Actor(name) => write!(f, "actor '{name}'"),
        }
    }
}

/// Whether a handle points at an asset or an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Asset,
    Actor,
}

/// A resolved reference to an engine object.
///
/// Handles are only valid for the engine-context job that resolved them:
/// objects may be created or destroyed between requests, so a handle is
/// never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    kind: HandleKind,
    path: String,
    class_name: String,
}

impl EngineHandle {
    /// Created by facades when resolving an [`EngineRef`].
    pub fn new(
        kind: HandleKind,
        path: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            class_name: class_name.into(),
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// The object path (assets) or actor name (actors).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// A single property change: a dotted property path and its new value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDelta {
    pub property: String,
    pub value: EngineValue,
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Filters for [`EngineFacade::list_assets`]. Unset fields match all.
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    /// Content folder, e.g. `/Game/Items`.
    pub path: Option<String>,
    /// Include sub-folders of `path`.
    pub recursive: bool,
    /// Exact class name.
    pub class_name: Option<String>,
    /// Case-insensitive substring of the asset name or path.
    pub query: Option<String>,
}

impl AssetFilter {
    /// Returns `true` if an asset at `path` of `class_name` passes.
    pub fn matches(&self, path: &str, name: &str, class_name: &str) -> bool {
        if let Some(class) = &self.class_name {
            if class != class_name {
                return false;
            }
        }
        if let Some(folder) = &self.path {
            let folder = folder.trim_end_matches('/');
            let Some(rest) = path.strip_prefix(folder).and_then(|r| r.strip_prefix('/'))
            else {
                return false;
            };
            if !self.recursive && rest.contains('/') {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let query = query.to_lowercase();
            if !name.to_lowercase().contains(&query)
                && !path.to_lowercase().contains(&query)
            {
                return false;
            }
        }
        true
    }
}

/// One row of an asset listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSummary {
    pub name: String,
    pub path: String,
    pub class_name: String,
}

/// One row of an actor listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSummary {
    pub name: String,
    pub path: String,
    pub class_name: String,
}

/// A registered gameplay tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub tag: String,
    pub comment: String,
}

/// One DataTable in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub path: String,
    /// Type name of the row struct.
    pub row_struct: String,
    pub row_count: usize,
}

/// Facts about the running engine, for `get_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub engine_version: String,
    pub project_name: String,
    pub asset_registry_ready: bool,
    pub gameplay_tags_ready: bool,
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// Which kind of object changed. Doubles as the event topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTopic {
    Asset,
    Actor,
    GameplayTag,
}

impl ChangeTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Actor => "actor",
            Self::GameplayTag => "gameplay_tag",
        }
    }

    /// All topics, for subscription validation.
    pub fn all() -> [ChangeTopic; 3] {
        [Self::Asset, Self::Actor, Self::GameplayTag]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// Something changed engine-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub topic: ChangeTopic,
    pub change: ChangeKind,
    pub path: String,
}

impl ChangeNotice {
    pub fn new(
        topic: ChangeTopic,
        change: ChangeKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            topic,
            change,
            path: path.into(),
        }
    }

    /// The event payload pushed to subscribers.
    pub fn to_payload(&self) -> StructuredValue {
        Map::new()
            .with("topic", self.topic.as_str())
            .with("change", self.change.as_str())
            .with("path", self.path.clone())
            .into()
    }
}

// ---------------------------------------------------------------------------
// EngineFacade
// ---------------------------------------------------------------------------

/// Read/write access to engine state.
///
/// Implementations wrap the host's object model and registries. All
/// methods are synchronous and are only ever called from the engine
/// context thread.
///
/// # Example
///
/// ```rust
/// use databridge_engine::{EngineFacade, EngineRef, MemoryEngine};
///
/// let engine = MemoryEngine::sample();
/// let handle = engine
///     .resolve(&EngineRef::Asset("/Game/Items/DA_Sword".into()))
///     .unwrap();
/// let value = engine.read(&handle).unwrap();
/// assert_eq!(value.type_name, "ItemDefinition");
/// ```
pub trait EngineFacade: Send + 'static {
    /// Engine and project facts.
    fn status(&self) -> EngineStatus;

    /// Resolves a reference to a live object.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if nothing exists at the reference.
    fn resolve(&self, target: &EngineRef) -> Result<EngineHandle, EngineError>;

    /// The property shape of a resolved object.
    fn describe(&self, handle: &EngineHandle) -> Result<StructShape, EngineError>;

    /// A snapshot of a resolved object's properties.
    fn read(&self, handle: &EngineHandle) -> Result<EngineStruct, EngineError>;

    /// Applies one property change.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if the property does not exist
    /// - [`EngineError::Rejected`] if the engine refuses the change
    fn mutate(
        &mut self,
        handle: &EngineHandle,
        delta: PropertyDelta,
    ) -> Result<(), EngineError>;

    /// Assets passing `filter`, sorted by path.
    fn list_assets(&self, filter: &AssetFilter) -> Vec<AssetSummary>;

    /// Actors in the current level, optionally of one class.
    fn list_actors(&self, class_name: Option<&str>) -> Vec<ActorSummary>;

    /// All registered gameplay tags, sorted.
    fn gameplay_tags(&self) -> Vec<TagInfo>;

    /// Registers a gameplay tag. Returns `true` if it already existed.
    fn register_gameplay_tag(
        &mut self,
        tag: &str,
        comment: &str,
    ) -> Result<bool, EngineError>;

    /// DataTables whose path contains `path_filter`, sorted by path.
    fn list_tables(&self, path_filter: Option<&str>) -> Vec<TableSummary>;

    /// The row struct shape of a DataTable.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if no table exists at `table`.
    fn describe_table(&self, table: &str) -> Result<StructShape, EngineError>;

    /// Every row of a DataTable, in table order.
    fn table_rows(
        &self,
        table: &str,
    ) -> Result<Vec<(String, EngineStruct)>, EngineError>;

    /// One row of a DataTable.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if the table or the row does not exist.
    fn read_row(&self, table: &str, row_name: &str) -> Result<EngineStruct, EngineError>;

    /// Stores a row, appending it if absent. Returns `true` if the row was
    /// created.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if the table does not exist
    /// - [`EngineError::Rejected`] for a locked table, an empty row name,
    ///   or a value of the wrong row struct
    fn write_row(
        &mut self,
        table: &str,
        row_name: &str,
        value: EngineStruct,
    ) -> Result<bool, EngineError>;

    /// Removes a row.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if the table or the row does not exist.
    fn delete_row(&mut self, table: &str, row_name: &str) -> Result<(), EngineError>;

    /// Takes the changes recorded since the last call.
    fn drain_changes(&mut self) -> Vec<ChangeNotice>;
}
