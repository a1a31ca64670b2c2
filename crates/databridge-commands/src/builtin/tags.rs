//! Gameplay tag commands.

use databridge_engine::is_valid_tag;
use databridge_protocol::{Map, StructuredValue};

use crate::{ArgKind, Args, CommandContext, CommandError, CommandResult, CommandSpec};

pub(super) fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("list_gameplay_tags", |ctx, args| list_tags(ctx, args))
            .description("Lists registered gameplay tags")
            .optional("prefix", ArgKind::String, "Only this tag and its children"),
        CommandSpec::new("validate_gameplay_tag", |ctx, args| validate_tag(ctx, args))
            .description("Checks whether a tag is registered")
            .required("tag", ArgKind::String, "Tag name, e.g. Item.Weapon.Sword"),
        CommandSpec::new("register_gameplay_tag", |ctx, args| register_tag(ctx, args))
            .description("Registers a gameplay tag")
            .required("tag", ArgKind::String, "Tag name")
            .optional("dev_comment", ArgKind::String, "Developer comment"),
        CommandSpec::new("register_gameplay_tags", |ctx, args| register_tags(ctx, args))
            .description("Registers several gameplay tags; failures do not stop the rest")
            .required("tags", ArgKind::Array, "Tag names, or objects of {tag, dev_comment}"),
    ]
}

/// The `tag` argument, checked for well-formedness.
fn tag_arg(args: &Args) -> Result<String, CommandError> {
    let tag = args.required_str("tag")?;
    if !is_valid_tag(tag) {
        return Err(CommandError::invalid(format!(
            "'{tag}' is not a valid gameplay tag name"
        )));
    }
    Ok(tag.to_string())
}

/// `Item` matches `Item` and `Item.Weapon`, not `Items`.
fn under_prefix(tag: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('.');
    tag == prefix
        || tag
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

async fn list_tags(ctx: CommandContext, args: Args) -> CommandResult {
    let prefix = args.str("prefix").map(str::to_string);
    let tags = ctx.engine().call(|facade| Ok(facade.gameplay_tags())).await?;
    let rows: Vec<StructuredValue> = tags
        .into_iter()
        .filter(|t| prefix.as_deref().is_none_or(|p| under_prefix(&t.tag, p)))
        .map(|t| Map::new().with("tag", t.tag).into())
        .collect();
    Ok(Map::new()
        .with("count", rows.len())
        .with("tags", rows)
        .into())
}

async fn validate_tag(ctx: CommandContext, args: Args) -> CommandResult {
    let tag = tag_arg(&args)?;
    let lookup = tag.clone();
    let valid = ctx
        .engine()
        .call(move |facade| {
            Ok(facade.gameplay_tags().iter().any(|t| t.tag == lookup))
        })
        .await?;
    Ok(Map::new().with("tag", tag).with("valid", valid).into())
}

async fn register_tag(ctx: CommandContext, args: Args) -> CommandResult {
    let tag = tag_arg(&args)?;
    let comment = args.str("dev_comment").unwrap_or_default().to_string();
    let name = tag.clone();
    let already_existed = ctx
        .engine()
        .call(move |facade| facade.register_gameplay_tag(&name, &comment))
        .await?;
    Ok(Map::new()
        .with("tag", tag)
        .with("already_existed", already_existed)
        .into())
}

/// One entry of a bulk registration: a bare tag name or `{tag, dev_comment}`.
fn tag_request(entry: &StructuredValue) -> Result<(String, String), (Option<String>, String)> {
    let (tag, comment) = match entry {
        StructuredValue::String(tag) => (tag.as_str(), ""),
        StructuredValue::Object(map) => {
            let Some(tag) = map.get("tag").and_then(StructuredValue::as_str) else {
                return Err((None, "missing tag".into()));
            };
            let comment = map
                .get("dev_comment")
                .and_then(StructuredValue::as_str)
                .unwrap_or_default();
            (tag, comment)
        }
        other => {
            return Err((None, format!("expected a string or object, found {}", other.type_name())));
        }
    };
    if !is_valid_tag(tag) {
        return Err((
            Some(tag.to_string()),
            format!("'{tag}' is not a valid gameplay tag name"),
        ));
    }
    Ok((tag.to_string(), comment.to_string()))
}

fn failed_entry(tag: Option<String>, error: String) -> StructuredValue {
    Map::new()
        .with("tag", tag)
        .with("success", false)
        .with("error", error)
        .into()
}

/// Runs as one engine-context job. Each entry reports on its own.
async fn register_tags(ctx: CommandContext, args: Args) -> CommandResult {
    let requests: Vec<_> = args
        .array("tags")
        .map(|entries| entries.iter().map(tag_request).collect())
        .unwrap_or_default();
    if requests.is_empty() {
        return Err(CommandError::invalid("field 'tags' must be a non-empty array"));
    }

    let payload = ctx
        .engine()
        .call(move |facade| {
            let (mut registered, mut existed, mut failed) = (0usize, 0usize, 0usize);
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                let result = match request {
                    Ok((tag, comment)) => match facade.register_gameplay_tag(&tag, &comment) {
                        Ok(already_existed) => {
                            if already_existed {
                                existed += 1;
                            } else {
                                registered += 1;
                            }
                            Map::new()
                                .with("tag", tag)
                                .with("success", true)
                                .with("already_existed", already_existed)
                                .into()
                        }
                        Err(err) => {
                            failed += 1;
                            failed_entry(Some(tag), err.to_string())
                        }
                    },
                    Err((tag, error)) => {
                        failed += 1;
                        failed_entry(tag, error)
                    }
                };
                results.push(result);
            }
            tracing::info!(registered, existed, failed, "bulk tag registration");
            Ok(Map::new()
                .with("results", results)
                .with("registered", registered)
                .with("already_existed", existed)
                .with("failed", failed))
        })
        .await?;
    Ok(payload.into())
}
