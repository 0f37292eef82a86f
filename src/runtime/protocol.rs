//! Wire request and response types
//!
//! These are the already-decoded payloads the transport hands to the bridge
//! and the payloads it expects back. Field names follow the wire protocol.

use serde::{Deserialize, Serialize};

use super::action::Arg;
use super::error::ActionError;
use super::role::RoleId;
use super::value::Value;

/// Outcome classification carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// Success
    Ok,
    /// The model does not support the operation
    NotImplemented,
    /// Any other failure
    ExecutionFailed,
}

/// Status code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Classification
    pub code: StatusCode,
    /// Message; empty on success
    #[serde(default)]
    pub message: String,
}

impl Status {
    /// Successful status.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    /// Failure status with an explicit code.
    pub fn failure(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the status reports success.
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl From<&ActionError> for Status {
    fn from(err: &ActionError) -> Self {
        let code = if err.is_not_implemented() {
            StatusCode::NotImplemented
        } else {
            StatusCode::ExecutionFailed
        };
        Self::failure(code, err.message())
    }
}

/// Start and end timestamps of one invocation, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Taken immediately before invocation
    pub start_ns: i64,
    /// Taken immediately after invocation
    pub end_ns: i64,
}

/// Role identity as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role name; empty for the model root
    #[serde(default)]
    pub role_name: String,
    /// Role index
    #[serde(default)]
    pub role_id: i32,
}

impl From<&RoleId> for RoleRef {
    fn from(id: &RoleId) -> Self {
        Self {
            role_name: id.role_name.clone(),
            role_id: id.index,
        }
    }
}

impl From<&RoleRef> for RoleId {
    fn from(role: &RoleRef) -> Self {
        RoleId::new(role.role_name.clone(), role.role_id)
    }
}

/// Per-request execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Include role states in successful responses; falls back to the bridge
    /// configuration when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_state: Option<bool>,
}

impl ExecOptions {
    /// Effective state-capture setting for a request.
    pub fn capture_state(options: Option<&ExecOptions>, default: bool) -> bool {
        options.and_then(|options| options.capture_state).unwrap_or(default)
    }
}

/// A single action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Target role name; empty for the model root
    #[serde(default)]
    pub role_name: String,
    /// Target role index
    #[serde(default)]
    pub role_id: i32,
    /// Action to invoke
    pub action_name: String,
    /// Ordered arguments
    #[serde(default)]
    pub args: Vec<Arg>,
    /// Execution options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ExecOptions>,
}

impl ActionRequest {
    /// Request for an action on the model root.
    pub fn root(action_name: impl Into<String>) -> Self {
        Self::on_role("", 0, action_name)
    }

    /// Request for an action on a role instance.
    pub fn on_role(
        role_name: impl Into<String>,
        role_id: i32,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            role_name: role_name.into(),
            role_id,
            action_name: action_name.into(),
            args: Vec::new(),
            options: None,
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.push(Arg::new(name, value));
        self
    }

    /// Set execution options.
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// One captured state field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateField {
    /// Field name
    pub key: String,
    /// Field value
    pub value: Value,
}

/// Captured state of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleState {
    /// Role the state belongs to
    pub role: RoleRef,
    /// State fields, in the order the role reported them
    pub state: Vec<StateField>,
}

/// Response to a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Outcome classification
    pub status: Status,
    /// Invocation timing; present on success only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_time: Option<Interval>,
    /// Zero or one encoded return value
    #[serde(default)]
    pub return_values: Vec<Value>,
    /// Live roles after the action
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Role states, when capture was requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_states: Vec<RoleState>,
}

/// One sequence of a batched request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRequest {
    /// Actions, executed in order
    pub requests: Vec<ActionRequest>,
    /// Execution options for every action of the sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ExecOptions>,
}

impl From<Vec<ActionRequest>> for SequenceRequest {
    fn from(requests: Vec<ActionRequest>) -> Self {
        Self {
            requests,
            options: None,
        }
    }
}

/// Batched request: sequences run concurrently, each in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequencesRequest {
    /// Sequences to run concurrently
    #[serde(default)]
    pub sequences: Vec<SequenceRequest>,
}

/// Responses of one sequence, index-aligned with its requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceResponse {
    /// One response per executed action
    pub responses: Vec<ActionResponse>,
}

/// Batched response, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencesResponse {
    /// One entry per submitted sequence
    pub results: Vec<SequenceResponse>,
}

/// Init and cleanup request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRequest {
    /// Execution options for the hook response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ExecOptions>,
}

/// Init and cleanup response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleResponse {
    /// Hook outcome
    pub status: Status,
    /// Live roles after the hook
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Role states, when capture was requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_states: Vec<RoleState>,
}
