//! Per-request context handed to command handlers.

use std::sync::Arc;

use databridge_engine::EngineContextHandle;
use databridge_session::{SessionId, Subscriptions};

use crate::CommandRegistry;

/// Everything a handler may touch: the engine, the calling session's
/// identity and subscriptions, and the registry itself.
///
/// Cheap to clone; all fields are handles.
#[derive(Clone)]
pub struct CommandContext {
    session_id: SessionId,
    session_token: Arc<str>,
    engine: EngineContextHandle,
    subscriptions: Subscriptions,
    registry: Arc<CommandRegistry>,
}

impl CommandContext {
    pub fn new(
        session_id: SessionId,
        session_token: impl Into<Arc<str>>,
        engine: EngineContextHandle,
        subscriptions: Subscriptions,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            session_id,
            session_token: session_token.into(),
            engine,
            subscriptions,
            registry,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// The engine context. All engine access goes through
    /// [`EngineContextHandle::call`].
    pub fn engine(&self) -> &EngineContextHandle {
        &self.engine
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }
}
