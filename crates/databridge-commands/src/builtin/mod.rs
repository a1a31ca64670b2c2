//! The built-in command set.
//!
//! | Group    | Commands                                                    |
//! |----------|-------------------------------------------------------------|
//! | session  | `hello`, `ping`, `get_status`, `list_commands`, `subscribe`, `unsubscribe` |
//! | objects  | `list_assets`, `search_assets`, `get_asset`, `get_schema`, `get_property`, `set_property`, `list_actors`, `get_actor`, `set_actor_property` |
//! | tables   | `list_datatables`, `get_datatable_schema`, `query_datatable`, `get_datatable_row`, `add_datatable_row`, `update_datatable_row`, `delete_datatable_row`, `import_datatable_json`, `search_datatable_content`, `get_data_catalog`, `resolve_tags` |
//! | tags     | `list_gameplay_tags`, `validate_gameplay_tag`, `register_gameplay_tag`, `register_gameplay_tags` |
//! | batch    | `batch`                                                     |

mod batch;
mod objects;
mod session;
mod tables;
mod tags;

use crate::{CommandRegistry, RegistryError};

pub use batch::MAX_BATCH_SIZE;

/// Wire protocol version reported by `hello`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// The bridge version reported by `hello` and `get_status`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registers every built-in command, session commands first.
pub fn register_all(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    for spec in session::commands()
        .into_iter()
        .chain(objects::commands())
        .chain(tables::commands())
        .chain(tags::commands())
        .chain(batch::commands())
    {
        registry.register(spec)?;
    }
    Ok(())
}
