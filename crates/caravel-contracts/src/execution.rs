//! Handler outcomes.
//!
//! A handler either returns structured data or a `HandlerError`. The engine
//! consumes both: success moves the action to DONE, an error moves it to
//! FAILED with `{"error": <message>}` stored as the result. Neither reaches
//! the caller as an `Err`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Value of the `status` field in every executor result envelope.
pub const EXECUTED: &str = "executed";

/// A handler-level failure. Recovered by the engine, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// What an executor handler produces for one action.
pub type HandlerResult = Result<Value, HandlerError>;
