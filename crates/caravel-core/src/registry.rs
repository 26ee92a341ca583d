//! Executor registry: action type -> handler.
//!
//! Every result that leaves the registry is wrapped in the same envelope:
//!
//! ```json
//! { "action_id": "...", "type": "...", "status": "executed", "data": { ... } }
//! ```
//!
//! A type with no registered handler is not an error. The default handler
//! answers with an empty `data` object and a `note`, and the action still
//! finishes as DONE.

use std::{collections::HashMap, sync::Arc};

use serde_json::{json, Value};
use tracing::debug;

use caravel_contracts::{
    action::Action,
    execution::{HandlerResult, EXECUTED},
};

use crate::traits::{ActionHandler, HandlerContext};

/// Type name of the built-in echo handler.
pub const STUB_ECHO: &str = "stub.echo";

/// Wrap handler `data` in the result envelope for `action`.
pub fn result_envelope(action: &Action, data: Value) -> Value {
    json!({
        "action_id": action.id.to_string(),
        "type": action.action_type,
        "status": EXECUTED,
        "data": data,
    })
}

/// Adapts a closure into an [`ActionHandler`].
struct FnHandler<F>(F);

impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&HandlerContext<'_>, &Action) -> HandlerResult + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext<'_>, action: &Action) -> HandlerResult {
        (self.0)(ctx, action)
    }
}

/// Echoes the action payload back as `{"echo": <payload>}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl ActionHandler for EchoHandler {
    fn handle(&self, _ctx: &HandlerContext<'_>, action: &Action) -> HandlerResult {
        Ok(json!({ "echo": action.payload }))
    }
}

/// Maps action types to handlers. Built once at startup, read-only after.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ExecutorRegistry {
    /// An empty registry. Every type falls through to the default handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `stub.echo` registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(STUB_ECHO, EchoHandler);
        registry
    }

    /// Register `handler` for `action_type`. The last registration wins.
    pub fn register<H>(&mut self, action_type: impl Into<String>, handler: H)
    where
        H: ActionHandler + 'static,
    {
        let action_type = action_type.into();
        if self.handlers.insert(action_type.clone(), Arc::new(handler)).is_some() {
            debug!(action_type = %action_type, "handler replaced");
        } else {
            debug!(action_type = %action_type, "handler registered");
        }
    }

    /// Register a closure as the handler for `action_type`.
    pub fn register_fn<F>(&mut self, action_type: impl Into<String>, handler: F)
    where
        F: Fn(&HandlerContext<'_>, &Action) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(action_type, FnHandler(handler));
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Registered type names, sorted ascending.
    pub fn list_handlers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the handler for `action.action_type` and wrap its output.
    ///
    /// Does not catch panics; the engine does.
    pub fn dispatch(&self, ctx: &HandlerContext<'_>, action: &Action) -> HandlerResult {
        match self.handlers.get(&action.action_type) {
            Some(handler) => handler
                .handle(ctx, action)
                .map(|data| result_envelope(action, data)),
            None => {
                debug!(action_type = %action.action_type, "no handler registered, using default");
                Ok(default_result(action))
            }
        }
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("handlers", &self.list_handlers())
            .finish()
    }
}

fn default_result(action: &Action) -> Value {
    let mut envelope = result_envelope(action, json!({}));
    envelope["note"] = json!(format!(
        "no handler registered for type '{}'",
        action.action_type
    ));
    envelope
}
