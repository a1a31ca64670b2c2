//! The command registry: name → spec lookup and validated dispatch.

use std::collections::HashMap;

use databridge_protocol::{Map, StructuredValue};
use futures_util::future::BoxFuture;

use crate::{CommandContext, CommandError, CommandResult, CommandSpec, RegistryError};

/// Maps command names to their specs.
///
/// Filled at startup and read-only afterwards; the server shares it
/// behind an `Arc`.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandSpec>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in command.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        crate::builtin::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Adds a command.
    ///
    /// # Errors
    /// - [`RegistryError::DuplicateCommand`] if the name is taken
    /// - [`RegistryError::EmptyName`] for an empty name
    pub fn register(&mut self, spec: CommandSpec) -> Result<(), RegistryError> {
        if spec.name().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index.contains_key(spec.name()) {
            return Err(RegistryError::DuplicateCommand(spec.name().to_string()));
        }
        tracing::debug!(command = spec.name(), "command registered");
        self.index.insert(spec.name().to_string(), self.commands.len());
        self.commands.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.index.get(name).and_then(|&i| self.commands.get(i))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Looks up and validates a request, returning the handler future.
    ///
    /// Runs synchronously, so lookup and validation failures are known
    /// before anything is spawned. The returned future owns its inputs.
    ///
    /// # Errors
    /// - [`CommandError::UnknownCommand`] for an unregistered name
    /// - [`CommandError::InvalidArguments`] if the payload fails the schema
    pub fn prepare(
        &self,
        ctx: CommandContext,
        command: &str,
        payload: StructuredValue,
    ) -> Result<BoxFuture<'static, CommandResult>, CommandError> {
        let spec = self
            .get(command)
            .ok_or_else(|| CommandError::UnknownCommand(command.to_string()))?;
        let args = spec.args().validate(payload)?;
        Ok((spec.handler())(ctx, args))
    }

    /// Validates and runs a command.
    pub async fn dispatch(
        &self,
        ctx: CommandContext,
        command: &str,
        payload: StructuredValue,
    ) -> CommandResult {
        self.prepare(ctx, command, payload)?.await
    }

    /// The `list_commands` payload.
    pub fn describe(&self) -> StructuredValue {
        let commands: Vec<StructuredValue> =
            self.commands.iter().map(CommandSpec::describe).collect();
        Map::new()
            .with("count", commands.len())
            .with("commands", commands)
            .into()
    }
}
