//! DataTable commands.
//!
//! Rows cross the wire as `{row_name, row_data}` where `row_data` is the
//! mapped row struct. Partial updates decode only the fields the client
//! sends; everything else keeps its stored value. An import runs as a
//! single engine-context job, so no request observes a half-imported
//! table.

use std::collections::{BTreeMap, HashMap, HashSet};

use databridge_engine::{
    from_structured_at, struct_from_map, to_structured, AssetFilter, EngineError,
    EngineStruct, EngineValue, Shape, StructShape, TableSummary,
};
use databridge_protocol::{Map, StructuredValue};

use crate::{ArgKind, Args, CommandContext, CommandError, CommandResult, CommandSpec};

const DEFAULT_QUERY_LIMIT: i64 = 25;
const DEFAULT_SEARCH_LIMIT: i64 = 20;
const CATALOG_TOP_FIELDS: usize = 5;

pub(super) fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("list_datatables", |ctx, args| list_tables(ctx, args))
            .description("Lists DataTables with their row struct and row count")
            .optional("path_filter", ArgKind::String, "Case-insensitive path substring"),
        CommandSpec::new("get_datatable_schema", |ctx, args| get_table_schema(ctx, args))
            .description("Describes the row struct of a DataTable")
            .required("table_path", ArgKind::String, "Object path of the DataTable"),
        CommandSpec::new("query_datatable", |ctx, args| query_table(ctx, args))
            .description("Reads a page of rows, by wildcard pattern or exact names")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .optional("row_name_pattern", ArgKind::String, "Wildcard on row names, e.g. Sw*")
            .optional("row_names", ArgKind::Array, "Exact row names; disables paging")
            .optional("fields", ArgKind::Array, "Only these top-level fields")
            .optional("offset", ArgKind::Integer, "Rows to skip (default 0)")
            .optional("limit", ArgKind::Integer, "Page size (default 25)"),
        CommandSpec::new("get_datatable_row", |ctx, args| get_row(ctx, args))
            .description("Reads one row of a DataTable")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .required("row_name", ArgKind::String, "Row name"),
        CommandSpec::new("add_datatable_row", |ctx, args| add_row(ctx, args))
            .description("Adds a row; omitted fields take their default")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .required("row_name", ArgKind::String, "Name of the new row")
            .required("row_data", ArgKind::Object, "Row fields"),
        CommandSpec::new("update_datatable_row", |ctx, args| update_row(ctx, args))
            .description("Changes the given fields of an existing row")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .required("row_name", ArgKind::String, "Row name")
            .required("row_data", ArgKind::Object, "Fields to change")
            .optional("dry_run", ArgKind::Bool, "Report changes without applying them"),
        CommandSpec::new("delete_datatable_row", |ctx, args| delete_row(ctx, args))
            .description("Removes a row from a DataTable")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .required("row_name", ArgKind::String, "Row name"),
        CommandSpec::new("import_datatable_json", |ctx, args| import_rows(ctx, args))
            .description("Writes many rows in one step")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .required("rows", ArgKind::Array, "Entries of {row_name, row_data}")
            .optional("mode", ArgKind::String, "create (default), upsert or replace")
            .optional("dry_run", ArgKind::Bool, "Validate and count without writing"),
        CommandSpec::new("search_datatable_content", |ctx, args| search_rows(ctx, args))
            .description("Finds rows whose text values contain a string")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .required("search_text", ArgKind::String, "Case-insensitive substring")
            .optional("fields", ArgKind::Array, "Only search these top-level fields")
            .optional("preview_fields", ArgKind::Array, "Fields to include per result")
            .optional("limit", ArgKind::Integer, "Maximum rows (default 20)"),
        CommandSpec::new("get_data_catalog", |ctx, args| data_catalog(ctx, args))
            .description("Summarizes DataTables, tag roots and asset classes"),
        CommandSpec::new("resolve_tags", |ctx, args| resolve_tags(ctx, args))
            .description("Finds the rows whose tag field holds any of the given tags")
            .required("table_path", ArgKind::String, "Object path of the DataTable")
            .required("tag_field", ArgKind::String, "A Tag or Tags field of the row struct")
            .required("tags", ArgKind::Array, "Tags to look up")
            .optional("fields", ArgKind::Array, "Only these top-level fields"),
    ]
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// A string-array argument. Absent means empty.
fn string_list(args: &Args, name: &str) -> Result<Vec<String>, CommandError> {
    let Some(items) = args.array(name) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                CommandError::invalid(format!("field '{name}' must be an array of strings"))
            })
        })
        .collect()
}

fn field_set(args: &Args, name: &str) -> Result<HashSet<String>, CommandError> {
    Ok(string_list(args, name)?.into_iter().collect())
}

fn positive(args: &Args, name: &str, default: i64) -> Result<usize, CommandError> {
    usize::try_from(args.i64(name).unwrap_or(default))
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| CommandError::invalid(format!("field '{name}' must be positive")))
}

fn table_arg(args: &Args) -> Result<String, CommandError> {
    Ok(args.required_str("table_path")?.to_string())
}

fn object_arg(args: &mut Args, name: &str) -> Result<Map, CommandError> {
    match args.take(name) {
        Some(StructuredValue::Object(map)) => Ok(map),
        _ => Err(CommandError::invalid(format!("field '{name}' must be an object"))),
    }
}

/// Case-insensitive match where `*` spans any run and `?` one character.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Maps a row, keeping only `fields` when the set is non-empty.
fn row_data(
    mut row: EngineStruct,
    fields: &HashSet<String>,
) -> Result<StructuredValue, EngineError> {
    if !fields.is_empty() {
        row.fields.retain(|(name, _)| fields.contains(name));
    }
    to_structured(&EngineValue::Struct(row))
}

fn row_entry(
    name: String,
    row: EngineStruct,
    fields: &HashSet<String>,
) -> Result<StructuredValue, EngineError> {
    Ok(Map::new()
        .with("row_name", name)
        .with("row_data", row_data(row, fields)?)
        .into())
}

fn table_summary(table: &TableSummary) -> Map {
    Map::new()
        .with("name", table.name.clone())
        .with("path", table.path.clone())
        .with("row_struct", table.row_struct.clone())
        .with("row_count", table.row_count)
}

fn row_exists(table: &str, row_name: &str) -> EngineError {
    EngineError::Rejected {
        reason: format!("row '{row_name}' already exists in '{table}'"),
        details: Some(
            Map::new()
                .with("row_name", row_name)
                .with("reason", "row_exists")
                .into(),
        ),
    }
}

/// One field changed by a partial row update.
struct FieldChange {
    field: String,
    old: EngineValue,
    new: EngineValue,
}

impl FieldChange {
    fn describe(&self) -> Result<StructuredValue, EngineError> {
        Ok(Map::new()
            .with("field", self.field.clone())
            .with("old_value", to_structured(&self.old)?)
            .with("new_value", to_structured(&self.new)?)
            .into())
    }
}

/// Applies the fields present in `input` to `row` and returns the ones
/// whose value changed. `_`-prefixed keys are metadata and skipped.
fn merge_fields(
    row: &mut EngineStruct,
    input: &Map,
    shape: &StructShape,
) -> Result<Vec<FieldChange>, EngineError> {
    let mut changes = Vec::new();
    for (name, value) in input.iter() {
        if name.starts_with('_') {
            continue;
        }
        let field = shape.get(name).ok_or_else(|| EngineError::UnknownField {
            path: name.to_string(),
        })?;
        if field.read_only {
            return Err(EngineError::Rejected {
                reason: format!("field '{name}' is read-only"),
                details: Some(
                    Map::new()
                        .with("field", name)
                        .with("reason", "read_only")
                        .into(),
                ),
            });
        }
        let new = from_structured_at(value, &field.shape, name)?;
        match row.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) if *slot == new => {}
            Some((_, slot)) => changes.push(FieldChange {
                field: name.to_string(),
                old: std::mem::replace(slot, new.clone()),
                new,
            }),
            None => {
                row.fields.push((name.to_string(), new.clone()));
                changes.push(FieldChange {
                    field: name.to_string(),
                    old: field.default_value(),
                    new,
                });
            }
        }
    }
    Ok(changes)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

async fn list_tables(ctx: CommandContext, args: Args) -> CommandResult {
    let filter = args.str("path_filter").map(str::to_string);
    let tables = ctx
        .engine()
        .call(move |facade| Ok(facade.list_tables(filter.as_deref())))
        .await?;
    let rows: Vec<StructuredValue> =
        tables.iter().map(|t| table_summary(t).into()).collect();
    Ok(Map::new()
        .with("count", rows.len())
        .with("datatables", rows)
        .into())
}

async fn get_table_schema(ctx: CommandContext, args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let payload = ctx
        .engine()
        .call(move |facade| {
            let shape = facade.describe_table(&table)?;
            Ok(Map::new()
                .with("table_path", table)
                .with("row_struct", shape.type_name.clone())
                .with("schema", shape.describe()))
        })
        .await?;
    Ok(payload.into())
}

/// `row_names` selects exact rows in request order and reports the missing
/// ones; otherwise rows matching `row_name_pattern` are paged.
async fn query_table(ctx: CommandContext, args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let pattern = args.str("row_name_pattern").map(str::to_string);
    let row_names = string_list(&args, "row_names")?;
    let fields = field_set(&args, "fields")?;
    let limit = positive(&args, "limit", DEFAULT_QUERY_LIMIT)?;
    let offset = usize::try_from(args.i64("offset").unwrap_or(0))
        .map_err(|_| CommandError::invalid("field 'offset' must not be negative"))?;

    let payload = ctx
        .engine()
        .call(move |facade| {
            let rows = facade.table_rows(&table)?;
            let mut missing = Vec::new();
            let (selected, total) = if row_names.is_empty() {
                let matching: Vec<(String, EngineStruct)> = rows
                    .into_iter()
                    .filter(|(name, _)| {
                        pattern.as_deref().is_none_or(|p| wildcard_match(p, name))
                    })
                    .collect();
                let total = matching.len();
                let page = matching.into_iter().skip(offset).take(limit).collect();
                (page, total)
            } else {
                let by_name: HashMap<&str, &EngineStruct> =
                    rows.iter().map(|(name, row)| (name.as_str(), row)).collect();
                let mut found = Vec::new();
                for name in row_names {
                    match by_name.get(name.as_str()) {
                        Some(row) => found.push((name, (*row).clone())),
                        None => missing.push(name),
                    }
                }
                let total = found.len();
                (found, total)
            };

            let entries = selected
                .into_iter()
                .map(|(name, row)| row_entry(name, row, &fields))
                .collect::<Result<Vec<_>, _>>()?;
            let mut out = Map::new()
                .with("table_path", table)
                .with("rows", entries)
                .with("total_count", total)
                .with("offset", offset)
                .with("limit", limit);
            if !missing.is_empty() {
                out.insert("missing_rows", missing);
            }
            Ok(out)
        })
        .await?;
    Ok(payload.into())
}

async fn get_row(ctx: CommandContext, args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let row_name = args.required_str("row_name")?.to_string();
    let payload = ctx
        .engine()
        .call(move |facade| {
            let row = facade.read_row(&table, &row_name)?;
            let row_struct = row.type_name.clone();
            Ok(Map::new()
                .with("table_path", table)
                .with("row_name", row_name)
                .with("row_struct", row_struct)
                .with("row_data", row_data(row, &HashSet::new())?))
        })
        .await?;
    Ok(payload.into())
}

// ---------------------------------------------------------------------------
// Row writes
// ---------------------------------------------------------------------------

async fn add_row(ctx: CommandContext, mut args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let row_name = args.required_str("row_name")?.to_string();
    let input = object_arg(&mut args, "row_data")?;
    tracing::debug!(%table, %row_name, "adding datatable row");

    let payload = ctx
        .engine()
        .call(move |facade| {
            let shape = facade.describe_table(&table)?;
            if facade.read_row(&table, &row_name).is_ok() {
                return Err(row_exists(&table, &row_name));
            }
            let row = struct_from_map(&input, &shape)?;
            facade.write_row(&table, &row_name, row)?;
            let stored = facade.read_row(&table, &row_name)?;
            Ok(Map::new()
                .with("table_path", table)
                .with("row_name", row_name)
                .with("row_data", row_data(stored, &HashSet::new())?))
        })
        .await?;
    Ok(payload.into())
}

async fn update_row(ctx: CommandContext, mut args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let row_name = args.required_str("row_name")?.to_string();
    let dry_run = args.bool("dry_run").unwrap_or(false);
    let input = object_arg(&mut args, "row_data")?;

    let payload = ctx
        .engine()
        .call(move |facade| {
            let shape = facade.describe_table(&table)?;
            let mut row = facade.read_row(&table, &row_name)?;
            let changes = merge_fields(&mut row, &input, &shape)?;

            if dry_run {
                let described = changes
                    .iter()
                    .map(FieldChange::describe)
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Map::new()
                    .with("dry_run", true)
                    .with("table_path", table)
                    .with("row_name", row_name)
                    .with("changes", described));
            }

            let modified: Vec<String> = changes.into_iter().map(|c| c.field).collect();
            if !modified.is_empty() {
                facade.write_row(&table, &row_name, row)?;
            }
            Ok(Map::new()
                .with("table_path", table)
                .with("row_name", row_name)
                .with("modified_fields", modified))
        })
        .await?;
    Ok(payload.into())
}

async fn delete_row(ctx: CommandContext, args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let row_name = args.required_str("row_name")?.to_string();
    let payload = ctx
        .engine()
        .call(move |facade| {
            facade.delete_row(&table, &row_name)?;
            Ok(Map::new()
                .with("table_path", table)
                .with("row_name", row_name))
        })
        .await?;
    Ok(payload.into())
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// How an import treats rows that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportMode {
    /// Existing rows are skipped.
    Create,
    /// Existing rows take the given fields.
    Upsert,
    /// The table is emptied first.
    Replace,
}

impl ImportMode {
    fn parse(mode: Option<&str>) -> Result<Self, CommandError> {
        match mode.unwrap_or("create") {
            "create" => Ok(Self::Create),
            "upsert" => Ok(Self::Upsert),
            "replace" => Ok(Self::Replace),
            other => Err(CommandError::invalid(format!(
                "field 'mode' must be create, upsert or replace, not '{other}'"
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Replace => "replace",
        }
    }
}

enum Staged {
    Created(String, EngineStruct),
    Updated(String, EngineStruct),
    Skipped,
}

/// Validates one import entry against the rows as they will be once the
/// earlier entries are applied. Errors are per-row report lines.
fn stage_row(
    index: usize,
    entry: &StructuredValue,
    shape: &StructShape,
    mode: ImportMode,
    existing: &mut HashMap<String, EngineStruct>,
) -> Result<Staged, String> {
    let object = entry
        .as_object()
        .ok_or_else(|| format!("row {index}: not an object"))?;
    let name = object
        .get("row_name")
        .and_then(StructuredValue::as_str)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| format!("row {index}: missing row_name"))?
        .to_string();
    let data = object
        .get("row_data")
        .and_then(StructuredValue::as_object)
        .ok_or_else(|| format!("row {index} ({name}): missing row_data"))?;
    let fail = |err: EngineError| format!("row {index} ({name}): {err}");

    match (existing.get(&name).cloned(), mode) {
        (Some(_), ImportMode::Create) => Ok(Staged::Skipped),
        (Some(mut row), _) => {
            merge_fields(&mut row, data, shape).map_err(fail)?;
            existing.insert(name.clone(), row.clone());
            Ok(Staged::Updated(name, row))
        }
        (None, _) => {
            let row = struct_from_map(data, shape).map_err(fail)?;
            existing.insert(name.clone(), row.clone());
            Ok(Staged::Created(name, row))
        }
    }
}

/// Every entry is validated before anything is written. Bad entries are
/// reported in `errors` and do not stop the others.
async fn import_rows(ctx: CommandContext, mut args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let mode = ImportMode::parse(args.str("mode"))?;
    let dry_run = args.bool("dry_run").unwrap_or(false);
    let entries = match args.take("rows") {
        Some(StructuredValue::Array(items)) => items,
        _ => return Err(CommandError::invalid("field 'rows' must be an array")),
    };

    let payload = ctx
        .engine()
        .call(move |facade| {
            let shape = facade.describe_table(&table)?;
            let current = facade.table_rows(&table)?;
            let mut existing: HashMap<String, EngineStruct> = match mode {
                ImportMode::Replace => HashMap::new(),
                _ => current.iter().cloned().collect(),
            };

            let (mut created, mut updated, mut skipped) = (0usize, 0usize, 0usize);
            let mut errors = Vec::new();
            let mut writes = Vec::new();
            for (index, entry) in entries.iter().enumerate() {
                match stage_row(index, entry, &shape, mode, &mut existing) {
                    Ok(Staged::Created(name, row)) => {
                        created += 1;
                        writes.push((name, row));
                    }
                    Ok(Staged::Updated(name, row)) => {
                        updated += 1;
                        writes.push((name, row));
                    }
                    Ok(Staged::Skipped) => skipped += 1,
                    Err(message) => errors.push(message),
                }
            }

            if !dry_run {
                if mode == ImportMode::Replace {
                    for (name, _) in &current {
                        facade.delete_row(&table, name)?;
                    }
                }
                for (name, row) in writes {
                    facade.write_row(&table, &name, row)?;
                }
            }
            tracing::info!(
                table = %table,
                mode = mode.as_str(),
                dry_run,
                created,
                updated,
                skipped,
                failed = errors.len(),
                "datatable import"
            );

            let mut out = Map::new()
                .with("table_path", table)
                .with("mode", mode.as_str())
                .with("dry_run", dry_run)
                .with("created", created)
                .with("updated", updated)
                .with("skipped", skipped);
            if !errors.is_empty() {
                out.insert("errors", errors);
            }
            Ok(out)
        })
        .await?;
    Ok(payload.into())
}

// ---------------------------------------------------------------------------
// Search and catalog
// ---------------------------------------------------------------------------

/// Collects the string leaves under `path` that contain `needle`.
fn collect_matches(
    path: &str,
    value: &StructuredValue,
    needle: &str,
    out: &mut Vec<StructuredValue>,
) {
    match value {
        StructuredValue::String(text) if text.to_lowercase().contains(needle) => {
            out.push(Map::new().with("field", path).with("value", text.clone()).into());
        }
        StructuredValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_matches(&format!("{path}[{i}]"), item, needle, out);
            }
        }
        StructuredValue::Object(map) => {
            for (key, item) in map.iter() {
                collect_matches(&format!("{path}.{key}"), item, needle, out);
            }
        }
        _ => {}
    }
}

async fn search_rows(ctx: CommandContext, args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let search_text = args.required_str("search_text")?.to_string();
    if search_text.is_empty() {
        return Err(CommandError::invalid("field 'search_text' must be non-empty"));
    }
    let fields = field_set(&args, "fields")?;
    let preview = field_set(&args, "preview_fields")?;
    let limit = positive(&args, "limit", DEFAULT_SEARCH_LIMIT)?;

    let payload = ctx
        .engine()
        .call(move |facade| {
            let needle = search_text.to_lowercase();
            let mut results = Vec::new();
            for (name, row) in facade.table_rows(&table)? {
                if results.len() >= limit {
                    break;
                }
                let mut matches = Vec::new();
                for (field, value) in &row.fields {
                    if !fields.is_empty() && !fields.contains(field) {
                        continue;
                    }
                    // Unmappable fields hold no searchable text.
                    let Ok(encoded) = to_structured(value) else {
                        continue;
                    };
                    collect_matches(field, &encoded, &needle, &mut matches);
                }
                if matches.is_empty() {
                    continue;
                }
                let mut entry = Map::new()
                    .with("row_name", name)
                    .with("matches", matches);
                if !preview.is_empty() {
                    entry.insert("preview", row_data(row, &preview)?);
                }
                results.push(StructuredValue::from(entry));
            }
            Ok(Map::new()
                .with("table_path", table)
                .with("search_text", search_text)
                .with("total_matches", results.len())
                .with("limit", limit)
                .with("results", results))
        })
        .await?;
    Ok(payload.into())
}

/// A one-call overview for clients exploring an unfamiliar project.
async fn data_catalog(ctx: CommandContext, _args: Args) -> CommandResult {
    let payload = ctx
        .engine()
        .call(|facade| {
            let mut tables = Vec::new();
            for table in facade.list_tables(None) {
                let shape = facade.describe_table(&table.path)?;
                let top: Vec<String> = shape
                    .fields
                    .iter()
                    .take(CATALOG_TOP_FIELDS)
                    .map(|f| f.name.clone())
                    .collect();
                tables.push(StructuredValue::from(
                    table_summary(&table).with("top_fields", top),
                ));
            }

            let mut prefixes: BTreeMap<String, usize> = BTreeMap::new();
            for info in facade.gameplay_tags() {
                let root = info.tag.split('.').next().unwrap_or(&info.tag);
                *prefixes.entry(root.to_string()).or_default() += 1;
            }
            let prefixes: Vec<StructuredValue> = prefixes
                .into_iter()
                .map(|(prefix, count)| {
                    Map::new().with("prefix", prefix).with("count", count).into()
                })
                .collect();

            let mut classes: BTreeMap<String, (usize, String)> = BTreeMap::new();
            for asset in facade.list_assets(&AssetFilter::default()) {
                classes
                    .entry(asset.class_name)
                    .or_insert_with(|| (0, asset.path))
                    .0 += 1;
            }
            let classes: Vec<StructuredValue> = classes
                .into_iter()
                .map(|(class_name, (count, example_path))| {
                    Map::new()
                        .with("class_name", class_name)
                        .with("count", count)
                        .with("example_path", example_path)
                        .into()
                })
                .collect();

            Ok(Map::new()
                .with("datatables", tables)
                .with("tag_prefixes", prefixes)
                .with("data_asset_classes", classes))
        })
        .await?;
    Ok(payload.into())
}

// ---------------------------------------------------------------------------
// Tag resolution
// ---------------------------------------------------------------------------

/// The tags a row holds in `field`, whether it is a Tag or a Tags field.
fn row_tags(row: &EngineStruct, field: &str) -> Vec<String> {
    match row.get(field) {
        Some(EngineValue::Tag(tag)) if !tag.is_empty() => vec![tag.clone()],
        Some(EngineValue::Tags(tags)) => tags.clone(),
        _ => Vec::new(),
    }
}

async fn resolve_tags(ctx: CommandContext, args: Args) -> CommandResult {
    let table = table_arg(&args)?;
    let tag_field = args.required_str("tag_field")?.to_string();
    let mut requested = string_list(&args, "tags")?;
    if requested.is_empty() {
        return Err(CommandError::invalid("field 'tags' must be a non-empty array"));
    }
    let mut seen = HashSet::new();
    requested.retain(|tag| seen.insert(tag.clone()));
    let fields = field_set(&args, "fields")?;

    let payload = ctx
        .engine()
        .call(move |facade| {
            let shape = facade.describe_table(&table)?;
            let field = shape.get(&tag_field).ok_or_else(|| EngineError::UnknownField {
                path: tag_field.clone(),
            })?;
            if !matches!(field.shape, Shape::Tag | Shape::Tags) {
                return Err(EngineError::TypeMismatch {
                    path: tag_field.clone(),
                    expected: "gameplay tag or tag container".into(),
                    found: field.shape.type_label(),
                });
            }

            let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
            let mut resolved = HashSet::new();
            let mut entries = Vec::new();
            for (name, row) in facade.table_rows(&table)? {
                let mut matched = row_tags(&row, &tag_field);
                let mut unique = HashSet::new();
                matched.retain(|tag| wanted.contains(tag.as_str()) && unique.insert(tag.clone()));
                if matched.is_empty() {
                    continue;
                }
                resolved.extend(matched.iter().cloned());
                entries.push(StructuredValue::from(
                    Map::new()
                        .with("row_name", name)
                        .with("row_data", row_data(row, &fields)?)
                        .with("matched_tags", matched),
                ));
            }
            let unresolved: Vec<String> = requested
                .iter()
                .filter(|tag| !resolved.contains(*tag))
                .cloned()
                .collect();

            Ok(Map::new()
                .with("table_path", table)
                .with("tag_field", tag_field)
                .with("resolved_count", entries.len())
                .with("resolved", entries)
                .with("unresolved_tags", unresolved))
        })
        .await?;
    Ok(payload.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use databridge_engine::FieldShape;

    #[test]
    fn test_wildcard_match_star_and_question_mark() {
        assert!(wildcard_match("Sw*", "Sword"));
        assert!(wildcard_match("*e*", "Shield"));
        assert!(wildcard_match("A?e", "axe"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("Sw*d?", "Sword"));
        assert!(!wildcard_match("Axe", "Axes"));
    }

    #[test]
    fn test_merge_fields_reports_only_changed_values() {
        let shape = StructShape::new("Row")
            .field(FieldShape::new("A", Shape::Int))
            .field(FieldShape::new("B", Shape::Bool));
        let mut row = EngineStruct::new("Row")
            .field("A", EngineValue::Int(1))
            .field("B", EngineValue::Bool(false));
        let input = Map::new().with("A", 1).with("B", true).with("_note", "x");

        let changes = merge_fields(&mut row, &input, &shape).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "B");
        assert_eq!(changes[0].old, EngineValue::Bool(false));
        assert_eq!(row.get("B"), Some(&EngineValue::Bool(true)));
    }

    #[test]
    fn test_merge_fields_unknown_field_is_rejected() {
        let shape = StructShape::new("Row");
        let mut row = EngineStruct::new("Row");
        let input = Map::new().with("Nope", 1);
        let result = merge_fields(&mut row, &input, &shape);
        assert!(matches!(result, Err(EngineError::UnknownField { .. })));
    }

    #[test]
    fn test_import_mode_parse_rejects_unknown() {
        assert_eq!(ImportMode::parse(None).unwrap(), ImportMode::Create);
        assert_eq!(ImportMode::parse(Some("replace")).unwrap(), ImportMode::Replace);
        assert!(ImportMode::parse(Some("merge")).is_err());
    }
}
