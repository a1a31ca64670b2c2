//! Handshake, status, introspection and event subscriptions.

use databridge_engine::ChangeTopic;
use databridge_protocol::{Map, StructuredValue};
use databridge_session::ALL_TOPICS;

use super::{PROTOCOL_VERSION, SERVER_VERSION};
use crate::{ArgKind, Args, CommandContext, CommandError, CommandResult, CommandSpec};

pub(super) fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("hello", |ctx, _args| async move { Ok(hello(&ctx)) })
            .description("Handshake; returns the session identity and versions"),
        CommandSpec::new("ping", |_ctx, _args| async {
            Ok(Map::new().with("message", "pong").into())
        })
        .description("Liveness check"),
        CommandSpec::new("get_status", |ctx, _args| get_status(ctx))
            .description("Engine, project and subsystem status"),
        CommandSpec::new("list_commands", |ctx, _args| async move {
            Ok(ctx.registry().describe())
        })
        .description("Lists every command with its arguments"),
        CommandSpec::new("subscribe", |ctx, args| async move { subscribe(&ctx, &args) })
            .description("Adds event topics; no topics means all")
            .optional("topics", ArgKind::Array, topics_help()),
        CommandSpec::new("unsubscribe", |ctx, args| async move {
            unsubscribe(&ctx, &args)
        })
        .description("Removes event topics; no topics means all")
        .optional("topics", ArgKind::Array, topics_help()),
    ]
}

fn topics_help() -> &'static str {
    "Topics: asset, actor, gameplay_tag, or * for all"
}

fn hello(ctx: &CommandContext) -> StructuredValue {
    Map::new()
        .with("session_id", ctx.session_id().to_string())
        .with("session_token", ctx.session_token())
        .with("protocol_version", PROTOCOL_VERSION)
        .with("server_version", SERVER_VERSION)
        .into()
}

async fn get_status(ctx: CommandContext) -> CommandResult {
    let status = ctx.engine().call(|facade| Ok(facade.status())).await?;
    Ok(Map::new()
        .with("connected", true)
        .with("plugin_version", SERVER_VERSION)
        .with("engine_version", status.engine_version)
        .with("project_name", status.project_name)
        .with(
            "subsystems",
            Map::new()
                .with("asset_registry", status.asset_registry_ready)
                .with("gameplay_tags", status.gameplay_tags_ready),
        )
        .into())
}

/// The `topics` argument, checked against the known topics. `None` when
/// the argument is absent.
fn requested_topics(args: &Args) -> Result<Option<Vec<String>>, CommandError> {
    let Some(items) = args.array("topics") else {
        return Ok(None);
    };
    items
        .iter()
        .map(|item| {
            let topic = item.as_str().ok_or_else(|| {
                CommandError::invalid(format!(
                    "field 'topics' must contain strings, found {}",
                    item.type_name()
                ))
            })?;
            let known = topic == ALL_TOPICS
                || ChangeTopic::all().iter().any(|t| t.as_str() == topic);
            if known {
                Ok(topic.to_string())
            } else {
                Err(CommandError::invalid(format!("unknown topic '{topic}'")))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn subscribe(ctx: &CommandContext, args: &Args) -> CommandResult {
    let topics = requested_topics(args)?
        .unwrap_or_else(|| vec![ALL_TOPICS.to_string()]);
    let current = ctx.subscriptions().subscribe(topics);
    tracing::debug!(session_id = %ctx.session_id(), ?current, "subscribed");
    Ok(Map::new().with("topics", current).into())
}

fn unsubscribe(ctx: &CommandContext, args: &Args) -> CommandResult {
    let current = match requested_topics(args)? {
        Some(topics) => ctx.subscriptions().unsubscribe(topics),
        None => {
            ctx.subscriptions().clear();
            Vec::new()
        }
    };
    Ok(Map::new().with("topics", current).into())
}
