//! Asset and actor commands.
//!
//! Each command runs as one engine-context job: resolve, read or mutate,
//! and map the result, so no handle outlives the job that resolved it.

use databridge_engine::{
    from_structured_at, to_structured, AssetFilter, AssetSummary, EngineError,
    EngineFacade, EngineRef, EngineValue, PropertyDelta,
};
use databridge_protocol::{Map, StructuredValue};

use crate::{ArgKind, Args, CommandContext, CommandError, CommandResult, CommandSpec};

const DEFAULT_SEARCH_LIMIT: i64 = 50;

pub(super) fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("list_assets", |ctx, args| list_assets(ctx, args))
            .description("Lists assets under a content folder")
            .required("path", ArgKind::String, "Content folder, e.g. /Game/Items")
            .optional("class_filter", ArgKind::String, "Only assets of this class")
            .optional("recursive", ArgKind::Bool, "Include sub-folders (default true)"),
        CommandSpec::new("search_assets", |ctx, args| search_assets(ctx, args))
            .description("Finds assets whose name or path contains a query")
            .optional("query", ArgKind::String, "Case-insensitive substring")
            .optional("class_filter", ArgKind::String, "Only assets of this class")
            .optional("path_filter", ArgKind::String, "Only assets under this folder")
            .optional("limit", ArgKind::Integer, "Maximum results (default 50)"),
        CommandSpec::new("get_asset", |ctx, args| {
            get_object(ctx, args, Target::Asset)
        })
        .description("Reads every property of an asset")
        .required("path", ArgKind::String, "Object path of the asset"),
        CommandSpec::new("get_schema", |ctx, args| get_schema(ctx, args))
            .description("Describes the property types of an asset")
            .required("path", ArgKind::String, "Object path of the asset"),
        CommandSpec::new("get_property", |ctx, args| {
            get_property(ctx, args, Target::Asset)
        })
        .description("Reads one property of an asset")
        .required("path", ArgKind::String, "Object path of the asset")
        .required("property", ArgKind::String, "Property path, e.g. Stats.Damage"),
        CommandSpec::new("set_property", |ctx, args| {
            set_property(ctx, args, Target::Asset)
        })
        .description("Writes one property of an asset")
        .required("path", ArgKind::String, "Object path of the asset")
        .required("property", ArgKind::String, "Property path, e.g. Stats.Damage")
        .required("value", ArgKind::Any, "New value, shaped like get_property output"),
        CommandSpec::new("list_actors", |ctx, args| list_actors(ctx, args))
            .description("Lists actors in the current level")
            .optional("class_filter", ArgKind::String, "Only actors of this class"),
        CommandSpec::new("get_actor", |ctx, args| {
            get_object(ctx, args, Target::Actor)
        })
        .description("Reads every property of an actor")
        .required("actor", ArgKind::String, "Actor name"),
        CommandSpec::new("set_actor_property", |ctx, args| {
            set_property(ctx, args, Target::Actor)
        })
        .description("Writes one property of an actor")
        .required("actor", ArgKind::String, "Actor name")
        .required("property", ArgKind::String, "Property path")
        .required("value", ArgKind::Any, "New value"),
    ]
}

fn summary(name: &str, path: &str, class_name: &str) -> StructuredValue {
    Map::new()
        .with("name", name)
        .with("path", path)
        .with("class_name", class_name)
        .into()
}

fn asset_rows(assets: &[AssetSummary]) -> Vec<StructuredValue> {
    assets
        .iter()
        .map(|a| summary(&a.name, &a.path, &a.class_name))
        .collect()
}

async fn list_assets(ctx: CommandContext, args: Args) -> CommandResult {
    let filter = AssetFilter {
        path: Some(args.required_str("path")?.to_string()),
        recursive: args.bool("recursive").unwrap_or(true),
        class_name: args.str("class_filter").map(str::to_string),
        query: None,
    };
    let assets = ctx
        .engine()
        .call(move |facade| Ok(facade.list_assets(&filter)))
        .await?;
    Ok(Map::new()
        .with("assets", asset_rows(&assets))
        .with("count", assets.len())
        .into())
}

async fn search_assets(ctx: CommandContext, args: Args) -> CommandResult {
    let limit = args.i64("limit").unwrap_or(DEFAULT_SEARCH_LIMIT);
    let limit = usize::try_from(limit)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| CommandError::invalid("field 'limit' must be positive"))?;
    let filter = AssetFilter {
        path: args.str("path_filter").map(str::to_string),
        recursive: true,
        class_name: args.str("class_filter").map(str::to_string),
        query: args.str("query").map(str::to_string),
    };

    let mut assets = ctx
        .engine()
        .call(move |facade| Ok(facade.list_assets(&filter)))
        .await?;
    let total = assets.len();
    assets.truncate(limit);
    Ok(Map::new()
        .with("assets", asset_rows(&assets))
        .with("count", assets.len())
        .with("total_before_limit", total)
        .into())
}

async fn list_actors(ctx: CommandContext, args: Args) -> CommandResult {
    let class_name = args.str("class_filter").map(str::to_string);
    let actors = ctx
        .engine()
        .call(move |facade| Ok(facade.list_actors(class_name.as_deref())))
        .await?;
    let rows: Vec<StructuredValue> = actors
        .iter()
        .map(|a| summary(&a.name, &a.path, &a.class_name))
        .collect();
    Ok(Map::new()
        .with("count", rows.len())
        .with("actors", rows)
        .into())
}

/// Which kind of object a command addresses, and the argument naming it.
#[derive(Clone, Copy)]
enum Target {
    Asset,
    Actor,
}

impl Target {
    fn key(self) -> &'static str {
        match self {
            Self::Asset => "path",
            Self::Actor => "actor",
        }
    }

    fn resolve_arg(self, args: &Args) -> Result<(String, EngineRef), CommandError> {
        let name = args.required_str(self.key())?.to_string();
        let target = match self {
            Self::Asset => EngineRef::Asset(name.clone()),
            Self::Actor => EngineRef::Actor(name.clone()),
        };
        Ok((name, target))
    }
}

async fn get_object(ctx: CommandContext, args: Args, kind: Target) -> CommandResult {
    let (_, target) = kind.resolve_arg(&args)?;
    let payload = ctx
        .engine()
        .call(move |facade| {
            let handle = facade.resolve(&target)?;
            let value = facade.read(&handle)?;
            let properties = to_structured(&EngineValue::Struct(value))?;
            Ok(Map::new()
                .with(kind.key(), handle.path())
                .with("class_name", handle.class_name())
                .with("properties", properties))
        })
        .await?;
    Ok(payload.into())
}

async fn get_schema(ctx: CommandContext, args: Args) -> CommandResult {
    let (_, target) = Target::Asset.resolve_arg(&args)?;
    let payload = ctx
        .engine()
        .call(move |facade| {
            let handle = facade.resolve(&target)?;
            let shape = facade.describe(&handle)?;
            Ok(Map::new()
                .with("path", handle.path())
                .with("class_name", handle.class_name())
                .with("schema", shape.describe()))
        })
        .await?;
    Ok(payload.into())
}

fn missing_property(property: &str, target: &EngineRef) -> EngineError {
    EngineError::NotFound(format!("property '{property}' on {target}"))
}

/// Reads `property` of `target` and maps it.
fn read_property(
    facade: &dyn EngineFacade,
    target: &EngineRef,
    property: &str,
) -> Result<StructuredValue, EngineError> {
    let handle = facade.resolve(target)?;
    let value = facade.read(&handle)?;
    let current = value
        .get_path(property)
        .ok_or_else(|| missing_property(property, target))?;
    to_structured(current)
}

async fn get_property(ctx: CommandContext, args: Args, kind: Target) -> CommandResult {
    let (name, target) = kind.resolve_arg(&args)?;
    let property = args.required_str("property")?.to_string();
    let payload = ctx
        .engine()
        .call(move |facade| {
            let value = read_property(facade, &target, &property)?;
            Ok(Map::new()
                .with(kind.key(), name)
                .with("property", property)
                .with("value", value))
        })
        .await?;
    Ok(payload.into())
}

/// Converts the new value against the property's declared shape, applies
/// it, and reads it back so the client sees what the engine stored.
async fn set_property(ctx: CommandContext, mut args: Args, kind: Target) -> CommandResult {
    let (name, target) = kind.resolve_arg(&args)?;
    let property = args.required_str("property")?.to_string();
    let input = args.take("value").unwrap_or(StructuredValue::Null);
    tracing::debug!(object = %name, %property, "setting property");

    let payload = ctx
        .engine()
        .call(move |facade| {
            let handle = facade.resolve(&target)?;
            let shape = facade.describe(&handle)?;
            let field = shape
                .field_at(&property)
                .ok_or_else(|| missing_property(&property, &target))?;
            let value = from_structured_at(&input, &field.shape, &property)?;
            facade.mutate(
                &handle,
                PropertyDelta {
                    property: property.clone(),
                    value,
                },
            )?;
            let stored = read_property(facade, &target, &property)?;
            Ok(Map::new()
                .with(kind.key(), name)
                .with("property", property)
                .with("value", stored))
        })
        .await?;
    Ok(payload.into())
}
