//! Bridge runtime and public API
//!
//! This module provides the [`Bridge`] facade that turns decoded requests
//! into resolved commands, runs them against the model and assembles the
//! responses. Transport adapters sit on top of it and only move payloads.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

// Submodules
pub mod action;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod interference;
pub mod orchestrator;
pub mod protocol;
pub mod role;
pub mod serializer;
pub mod value;

pub use action::{ActionTable, Arg, Invocable, ReturnValue, arg};
pub use command::{ActionSequence, Command, Resolver};
pub use config::{BridgeConfig, ResolutionPolicy};
pub use error::{ActionError, ActionResult, BridgeError, ResolveError, Result};
pub use executor::{Clock, ExecutionResult, SequenceResult};
pub use orchestrator::Orchestrator;
pub use protocol::{
    ActionRequest, ActionResponse, ExecOptions, LifecycleRequest, LifecycleResponse,
    SequenceRequest, SequencesRequest, SequencesResponse, Status, StatusCode,
};
pub use role::{Model, Role, RoleId, RoleMap, RoleRegistry, RoleSnapshot};
pub use value::{Decode, Encode, MapEntry, Value};

/// The execution core of the bridge
///
/// Owns the model, the pre-registered action table and the configuration.
/// All operations take `&self`; concurrent calls are allowed and the model
/// is responsible for synchronising its own state.
pub struct Bridge<M: Model> {
    model: Arc<M>,
    actions: Arc<ActionTable>,
    config: BridgeConfig,
    orchestrator: Orchestrator,
    clock: Clock,
}

impl<M: Model + 'static> Bridge<M> {
    /// Create a bridge over a model and its action table.
    pub fn new(model: Arc<M>, actions: ActionTable, config: BridgeConfig) -> Self {
        let orchestrator = Orchestrator::new(config.pacing(), config.interference);
        tracing::debug!(actions = actions.len(), ?config, "bridge created");
        Self {
            model,
            actions: Arc::new(actions),
            config,
            orchestrator,
            clock: Clock::new(),
        }
    }

    /// The model under test.
    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run the model's init hook and advertise the live role set.
    ///
    /// Hook failures are reported through the response status.
    pub async fn init(&self, request: LifecycleRequest) -> Result<LifecycleResponse> {
        let capture_state =
            ExecOptions::capture_state(request.options.as_ref(), self.config.capture_state);
        let model = self.model.clone();
        let response = tokio::task::spawn_blocking(move || {
            let outcome = model
                .init()
                .and_then(|()| RoleSnapshot::capture(model.as_ref(), capture_state));
            match outcome {
                Ok(snapshot) => serializer::lifecycle_response(Ok(()), &snapshot),
                Err(err) => serializer::lifecycle_response(Err(err), &RoleSnapshot::default()),
            }
        })
        .await
        .map_err(|err| BridgeError::Internal(err.to_string()))?;

        tracing::info!(
            code = ?response.status.code,
            roles = response.roles.len(),
            "model initialised"
        );
        Ok(response)
    }

    /// Run the model's cleanup hook.
    pub async fn cleanup(&self, _request: LifecycleRequest) -> Result<LifecycleResponse> {
        let model = self.model.clone();
        let outcome = tokio::task::spawn_blocking(move || model.cleanup())
            .await
            .map_err(|err| BridgeError::Internal(err.to_string()))?;

        let response = serializer::lifecycle_response(outcome, &RoleSnapshot::default());
        tracing::info!(code = ?response.status.code, "model cleaned up");
        Ok(response)
    }

    /// Resolve and execute a single action.
    ///
    /// Action failures always come back as a response status. Resolution
    /// failures follow [`ResolutionPolicy`].
    pub async fn execute_action(&self, request: ActionRequest) -> Result<ActionResponse> {
        let capture_state =
            ExecOptions::capture_state(request.options.as_ref(), self.config.capture_state);
        let policy = self.config.resolution_failures;
        let model = self.model.clone();
        let actions = self.actions.clone();
        let clock = self.clock;

        // Resolution queries the model's registry, so it runs off the async workers too.
        tokio::task::spawn_blocking(move || -> Result<ActionResponse> {
            let resolved = Resolver::new(&model, &actions).resolve(
                &request.role_name,
                request.role_id,
                &request.action_name,
                request.args,
            );
            let command = match resolved {
                Ok(command) => command,
                Err(err) => {
                    tracing::debug!(error = %err, "action resolution failed");
                    return match policy {
                        ResolutionPolicy::Status => Ok(serializer::failure_response(
                            &ActionError::failed(err.to_string()),
                        )),
                        ResolutionPolicy::HardError => Err(BridgeError::Unresolved(err)),
                    };
                }
            };

            let result = executor::execute(&command, &clock);
            if !result.is_ok() {
                return Ok(serializer::action_response(&result, &RoleSnapshot::default()));
            }
            let snapshot = RoleSnapshot::capture(model.as_ref(), capture_state)
                .map_err(BridgeError::Registry)?;
            Ok(serializer::action_response(&result, &snapshot))
        })
        .await
        .map_err(|err| BridgeError::Internal(err.to_string()))?
    }

    /// Resolve every command up front, then run all sequences concurrently.
    ///
    /// Any resolution failure, aborted sequence or orchestration fault fails
    /// the whole call and no partial results are returned.
    pub async fn execute_action_sequences(
        &self,
        request: SequencesRequest,
    ) -> Result<SequencesResponse> {
        let batch = Uuid::new_v4();
        let span = tracing::info_span!(
            "batch",
            id = %batch,
            sequences = request.sequences.len()
        );
        self.run_batch(request).instrument(span).await
    }

    async fn run_batch(&self, request: SequencesRequest) -> Result<SequencesResponse> {
        let model = self.model.clone();
        let actions = self.actions.clone();
        let default_capture = self.config.capture_state;
        let (sequences, capture) = tokio::task::spawn_blocking(move || {
            resolve_batch(&model, &actions, default_capture, request.sequences)
        })
        .await
        .map_err(|err| BridgeError::Internal(err.to_string()))??;

        let results = match self.orchestrator.run(sequences, self.clock).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "batch failed");
                return Err(err.into());
            }
        };

        let model = self.model.clone();
        let snapshots =
            tokio::task::spawn_blocking(move || batch_snapshots(model.as_ref(), &capture))
                .await
                .map_err(|err| BridgeError::Internal(err.to_string()))??;

        tracing::info!(
            actions = results.iter().map(Vec::len).sum::<usize>(),
            "batch completed"
        );
        Ok(serializer::sequences_response(&results, &snapshots))
    }
}

/// Resolve every command of a batch, along with each sequence's capture setting.
///
/// The first unresolvable command fails the batch, naming its position.
fn resolve_batch<M: Model + 'static>(
    model: &Arc<M>,
    actions: &ActionTable,
    default_capture: bool,
    requests: Vec<SequenceRequest>,
) -> Result<(Vec<ActionSequence>, Vec<bool>)> {
    let resolver = Resolver::new(model, actions);
    let mut sequences = Vec::with_capacity(requests.len());
    let mut capture = Vec::with_capacity(requests.len());

    for (sequence_index, sequence) in requests.into_iter().enumerate() {
        capture.push(ExecOptions::capture_state(
            sequence.options.as_ref(),
            default_capture,
        ));
        let mut commands = Vec::with_capacity(sequence.requests.len());
        for (action_index, action) in sequence.requests.into_iter().enumerate() {
            let command = resolver
                .resolve(
                    &action.role_name,
                    action.role_id,
                    &action.action_name,
                    action.args,
                )
                .map_err(|source| BridgeError::Resolve {
                    sequence: sequence_index,
                    action: action_index,
                    source,
                })?;
            commands.push(command);
        }
        sequences.push(commands);
    }

    Ok((sequences, capture))
}

/// Take one post-batch snapshot and tailor it to each sequence's options.
fn batch_snapshots<M: Model + ?Sized>(model: &M, capture: &[bool]) -> Result<Vec<RoleSnapshot>> {
    let any_capture = capture.iter().any(|&capture| capture);
    let snapshot = RoleSnapshot::capture(model, any_capture).map_err(BridgeError::Registry)?;
    Ok(capture
        .iter()
        .map(|&capture| {
            if capture {
                snapshot.clone()
            } else {
                RoleSnapshot {
                    roles: snapshot.roles.clone(),
                    states: Vec::new(),
                }
            }
        })
        .collect())
}
