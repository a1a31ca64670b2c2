//! `batch`: several commands in one request.
//!
//! Entries run in order through the same registry as top-level requests.
//! A failing entry does not stop the batch; each gets its own result row.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use databridge_protocol::{ErrorInfo, Map, StructuredValue};
use futures_util::FutureExt;

use crate::{ArgKind, Args, CommandContext, CommandError, CommandResult, CommandSpec};

/// Most entries one batch may carry.
pub const MAX_BATCH_SIZE: usize = 20;

const BATCH: &str = "batch";

pub(super) fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new(BATCH, |ctx, args| run_batch(ctx, args))
            .description("Runs up to 20 commands in order and reports each result")
            .required(
                "commands",
                ArgKind::Array,
                "Entries of the form {command, params}",
            ),
    ]
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

async fn run_batch(ctx: CommandContext, args: Args) -> CommandResult {
    let entries = args.array("commands").cloned().unwrap_or_default();
    if entries.len() > MAX_BATCH_SIZE {
        return Err(CommandError::BatchLimitExceeded {
            len: entries.len(),
            max: MAX_BATCH_SIZE,
        });
    }

    let started = Instant::now();
    let mut results: Vec<StructuredValue> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let entry_started = Instant::now();
        let (command, outcome) = run_entry(&ctx, entry).await;
        let row = Map::new()
            .with("index", index)
            .with("command", command)
            .with("success", outcome.is_ok());
        let row = match outcome {
            Ok(data) => row.with("data", data),
            Err(err) => row.with("error", &ErrorInfo::from(&err)),
        };
        results.push(row.with("timing_ms", elapsed_ms(entry_started)).into());
    }

    Ok(Map::new()
        .with("count", results.len())
        .with("results", results)
        .with("total_timing_ms", elapsed_ms(started))
        .into())
}

/// Runs one entry. Returns the command name (empty if the entry had
/// none) and its outcome.
async fn run_entry(
    ctx: &CommandContext,
    entry: StructuredValue,
) -> (String, CommandResult) {
    let StructuredValue::Object(mut entry) = entry else {
        return (
            String::new(),
            Err(CommandError::invalid("batch entries must be objects")),
        );
    };
    let Some(command) = entry.get("command").and_then(StructuredValue::as_str) else {
        return (
            String::new(),
            Err(CommandError::invalid("missing field 'command'")),
        );
    };
    let command = command.to_string();

    if command == BATCH {
        tracing::warn!(session_id = %ctx.session_id(), "nested batch blocked");
        return (command.clone(), Err(CommandError::BatchRecursionBlocked(command)));
    }

    let params = entry.remove("params").unwrap_or(StructuredValue::Null);
    let outcome = match ctx.registry().prepare(ctx.clone(), &command, params) {
        Ok(handler) => AssertUnwindSafe(handler)
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!(command = %command, "batch entry panicked");
                Err(CommandError::Internal(format!("command '{command}' panicked")))
            }),
        Err(err) => Err(err),
    };
    (command, outcome)
}
