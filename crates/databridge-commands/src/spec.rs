//! Command specifications: name, argument schema and handler.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use databridge_protocol::{Map, StructuredValue};
use futures_util::future::BoxFuture;

use crate::{ArgKind, ArgSchema, Args, CommandContext, CommandError};

/// What a handler resolves to: the response payload or an error.
pub type CommandResult = Result<StructuredValue, CommandError>;

/// A type-erased async command handler.
pub type Handler =
    Arc<dyn Fn(CommandContext, Args) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// A named command with its argument schema and handler.
///
/// ```rust
/// use databridge_commands::{ArgKind, CommandSpec};
/// use databridge_protocol::Map;
///
/// let echo = CommandSpec::new("echo", |_ctx, args| async move {
///     Ok(Map::new()
///         .with("text", args.str("text").unwrap_or_default())
///         .into())
/// })
/// .description("Returns its argument")
/// .required("text", ArgKind::String, "Text to echo");
///
/// assert_eq!(echo.name(), "echo");
/// ```
#[derive(Clone)]
pub struct CommandSpec {
    name: String,
    description: String,
    schema: ArgSchema,
    handler: Handler,
}

impl CommandSpec {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            schema: ArgSchema::new(),
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replaces the whole argument schema.
    pub fn schema(mut self, schema: ArgSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn required(
        mut self,
        name: &str,
        kind: ArgKind,
        description: &str,
    ) -> Self {
        self.schema = self.schema.required(name, kind, description);
        self
    }

    pub fn optional(
        mut self,
        name: &str,
        kind: ArgKind,
        description: &str,
    ) -> Self {
        self.schema = self.schema.optional(name, kind, description);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &ArgSchema {
        &self.schema
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// The `list_commands` entry for this command.
    pub fn describe(&self) -> StructuredValue {
        Map::new()
            .with("name", self.name.clone())
            .with("description", self.description.clone())
            .with("arguments", self.schema.describe())
            .into()
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
