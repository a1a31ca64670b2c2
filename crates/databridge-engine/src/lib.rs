//! Engine access for DataBridge.
//!
//! Everything the bridge knows about the host engine goes through this
//! crate:
//!
//! - **Values** ([`EngineValue`], [`EngineStruct`]) and **shapes**
//!   ([`Shape`], [`StructShape`]): engine-native typed data and its
//!   declared type.
//! - **Schema mapper** ([`to_structured`], [`from_structured`]): converts
//!   engine values to and from [`StructuredValue`].
//! - **Facade** ([`EngineFacade`]): the boundary to the engine's object
//!   model, asset registry, DataTables and tag manager.
//! - **Context** ([`EngineContext`], [`EngineContextHandle`]): the single
//!   serialized execution context all facade calls run on.
//! - **Memory engine** ([`MemoryEngine`]): an in-process facade used by
//!   tests and the demo editor.
//!
//! ```text
//! command handler ──call(job)──→ [engine-context thread] ──→ EngineFacade
//!        ↑                                 │
//!        └───────── oneshot reply ─────────┘
//! ```
//!
//! [`StructuredValue`]: databridge_protocol::StructuredValue

mod context;
mod error;
mod facade;
mod mapper;
mod memory;
mod shape;
mod value;

pub use context::{EngineContext, EngineContextHandle};
pub use error::EngineError;
pub use facade::{
    ActorSummary, AssetFilter, AssetSummary, ChangeKind, ChangeNotice,
    ChangeTopic, EngineFacade, EngineHandle, EngineRef, EngineStatus,
    HandleKind, PropertyDelta, TableSummary, TagInfo,
};
pub use mapper::{
    from_structured, from_structured_at, struct_from_map, to_structured,
};
pub use memory::MemoryEngine;
pub use shape::{FieldShape, Shape, StructShape};
pub use value::{is_valid_tag, EngineStruct, EngineValue};
