//! Error types for the bridge runtime
//!
//! Domain errors use thiserror. Model-signalled failures ([`ActionError`]) are
//! captured into execution results and never escape the executor; everything
//! else is converted into a [`BridgeError`] at the transport boundary.

use std::io;
use thiserror::Error;

/// Top-level bridge error, surfaced to the transport as a hard failure
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A batched command could not be resolved
    #[error("Failed to resolve: sequence index {sequence}, action index {action}: {source}")]
    Resolve {
        /// Sequence position in the request
        sequence: usize,
        /// Action position inside the sequence
        action: usize,
        /// Underlying resolution failure
        #[source]
        source: ResolveError,
    },

    /// A single action could not be resolved (hard-error policy)
    #[error("Resolution failed: {0}")]
    Unresolved(#[from] ResolveError),

    /// Concurrent sequence execution failed
    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    /// The model's role registry failed while building a response
    #[error("Role registry error: {0}")]
    Registry(ActionError),

    /// Infrastructure failure unrelated to any action
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure signalled by the model while running an action or lifecycle hook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The model author marked this operation as unsupported
    #[error("Not Implemented: {0}")]
    NotImplemented(String),

    /// Any other fault raised during invocation
    #[error("Execution Failed: {0}")]
    ExecutionFailed(String),
}

impl ActionError {
    /// Build a `NotImplemented` failure.
    pub fn not_implemented<S: Into<String>>(message: S) -> Self {
        ActionError::NotImplemented(message.into())
    }

    /// Build an `ExecutionFailed` failure.
    pub fn failed<S: Into<String>>(message: S) -> Self {
        ActionError::ExecutionFailed(message.into())
    }

    /// Wrap any error as an `ExecutionFailed` failure.
    pub fn from_err<E: std::error::Error>(error: E) -> Self {
        ActionError::ExecutionFailed(error.to_string())
    }

    /// Whether the model signalled the operation as unsupported.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ActionError::NotImplemented(_))
    }

    /// The message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            ActionError::NotImplemented(message) | ActionError::ExecutionFailed(message) => message,
        }
    }
}

impl From<CodecError> for ActionError {
    fn from(err: CodecError) -> Self {
        ActionError::ExecutionFailed(err.to_string())
    }
}

/// Convenience result alias for model actions and hooks
pub type ActionResult<T> = std::result::Result<T, ActionError>;

/// Resolution-time errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No live role instance with this name and index
    #[error("Role {role_name}#{index} not found")]
    RoleNotFound {
        /// Role name
        role_name: String,
        /// Role index
        index: i32,
    },

    /// No invocable registered for this role/action pair
    #[error("No such action: {action_name} for role: '{role_name}'")]
    ActionNotFound {
        /// Role name (empty for the model root)
        role_name: String,
        /// Action name
        action_name: String,
    },

    /// The role registry failed while being queried
    #[error("Failed to get roles: {0}")]
    Registry(ActionError),
}

/// Convenience result alias for resolution
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Errors decoding a wire value into a native type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The wire value has a different kind than requested
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested kind
        expected: &'static str,
        /// Kind actually present on the wire
        found: &'static str,
    },

    /// The integer does not fit into the requested native type
    #[error("integer {value} out of range for {target}")]
    OutOfRange {
        /// Wire integer
        value: i64,
        /// Native target type
        target: &'static str,
    },

    /// A required argument is missing
    #[error("missing argument '{0}'")]
    MissingArg(String),
}

/// Convenience result alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Failures of the concurrent sequence orchestrator
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The first sequence to finish with a failed action
    #[error("Execution failed: sequence index {sequence}, action index {action}: {source}")]
    SequenceAborted {
        /// Sequence position in the request
        sequence: usize,
        /// Index of the failed action inside the sequence
        action: usize,
        /// Classified failure of that action
        #[source]
        source: ActionError,
    },

    /// A worker could not be scheduled
    #[error("Failed to spawn worker for sequence {sequence}: {source}")]
    WorkerSpawn {
        /// Sequence the worker was meant to run
        sequence: usize,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// A worker exited without reporting its outcome
    #[error("Worker for sequence {sequence} exited without reporting")]
    WorkerLost {
        /// Sequence the worker was running
        sequence: usize,
    },

    /// Joining a background thread failed
    #[error("Join failed: {0}")]
    Join(String),
}

/// Convenience result alias for orchestration
pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;

/// Result type using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
