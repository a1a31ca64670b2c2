//! Serves the DataBridge protocol over an in-memory sample project.
//!
//! ```text
//! cargo run -p memory-editor [settings.json]
//! ```
//!
//! The optional settings file holds a `BridgeConfig` JSON object, the same
//! document the editor plugin keeps in its project settings.

use databridge::engine::AssetFilter;
use databridge::prelude::*;
use databridge::telemetry::init_logging;

/// A host command on top of the built-in set: asset and actor counts.
fn project_summary() -> CommandSpec {
    CommandSpec::new("project_summary", |ctx, _args| async move {
        let (status, assets, actors) = ctx
            .engine()
            .call(|facade| {
                let filter = AssetFilter {
                    path: Some("/Game".into()),
                    recursive: true,
                    class_name: None,
                    query: None,
                };
                Ok((
                    facade.status(),
                    facade.list_assets(&filter).len(),
                    facade.list_actors(None).len(),
                ))
            })
            .await?;
        Ok(Map::new()
            .with("project_name", status.project_name)
            .with("assets", assets)
            .with("actors", actors)
            .into())
    })
    .description("Counts assets under /Game and actors in the open level")
}

fn load_config() -> Result<BridgeConfig, BridgeError> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(BridgeConfig::default());
    };
    let text = std::fs::read_to_string(&path).map_err(|e| {
        databridge::ConfigError::Invalid {
            field: "settings file",
            reason: format!("{path}: {e}"),
        }
    })?;
    Ok(BridgeConfig::from_json_str(&text)?)
}

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    init_logging("databridge=info,memory_editor=info");

    let config = load_config()?;
    let server = BridgeServer::builder()
        .config(config)
        .command(project_summary())
        .build(MemoryEngine::sample())
        .await?;

    tracing::info!(addr = %server.local_addr(), "memory editor ready");

    let stop = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
        }
        stop.stop();
    });

    server.run().await
}
