//! Execution outcomes to wire responses

use super::error::ActionError;
use super::executor::{ExecutionResult, SequenceResult};
use super::protocol::{
    ActionResponse, Interval, LifecycleResponse, RoleRef, RoleState, SequenceResponse,
    SequencesResponse, StateField, Status,
};
use super::role::RoleSnapshot;
use super::value::Value;

/// Build the response for one executed action.
///
/// Successful results carry timing, the encoded return value (omitted when
/// it encodes to `None`) and the role snapshot. Failures carry only the
/// classified status.
pub fn action_response(result: &ExecutionResult, snapshot: &RoleSnapshot) -> ActionResponse {
    match &result.outcome {
        Ok(value) => {
            let encoded = value.encode();
            let return_values = if encoded.is_none() {
                Vec::new()
            } else {
                vec![encoded]
            };
            ActionResponse {
                status: Status::ok(),
                exec_time: Some(Interval {
                    start_ns: result.start_ns,
                    end_ns: result.end_ns,
                }),
                return_values,
                roles: role_refs(snapshot),
                role_states: role_states(snapshot),
            }
        }
        Err(err) => failure_response(err),
    }
}

/// Response for an action that failed before or during invocation.
pub fn failure_response(err: &ActionError) -> ActionResponse {
    ActionResponse {
        status: Status::from(err),
        exec_time: None,
        return_values: Vec::new(),
        roles: Vec::new(),
        role_states: Vec::new(),
    }
}

/// Assemble a batched response in submission order.
///
/// `snapshots[i]` is the role snapshot attached to every response of
/// sequence `i`.
pub fn sequences_response(
    results: &[SequenceResult],
    snapshots: &[RoleSnapshot],
) -> SequencesResponse {
    let empty = RoleSnapshot::default();
    let results = results
        .iter()
        .enumerate()
        .map(|(index, sequence)| {
            let snapshot = snapshots.get(index).unwrap_or(&empty);
            SequenceResponse {
                responses: sequence
                    .iter()
                    .map(|result| action_response(result, snapshot))
                    .collect(),
            }
        })
        .collect();
    SequencesResponse { results }
}

/// Response for an init or cleanup hook.
pub fn lifecycle_response(
    outcome: Result<(), ActionError>,
    snapshot: &RoleSnapshot,
) -> LifecycleResponse {
    match outcome {
        Ok(()) => LifecycleResponse {
            status: Status::ok(),
            roles: role_refs(snapshot),
            role_states: role_states(snapshot),
        },
        Err(err) => LifecycleResponse {
            status: Status::from(&err),
            roles: Vec::new(),
            role_states: Vec::new(),
        },
    }
}

fn role_refs(snapshot: &RoleSnapshot) -> Vec<RoleRef> {
    snapshot.roles.iter().map(RoleRef::from).collect()
}

fn role_states(snapshot: &RoleSnapshot) -> Vec<RoleState> {
    snapshot
        .states
        .iter()
        .map(|(id, state)| RoleState {
            role: RoleRef::from(id),
            state: state
                .iter()
                .map(|(key, value): &(String, Value)| StateField {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        })
        .collect()
}
