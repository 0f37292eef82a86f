use mbt_bridge::demo::{self, CounterModel};
use mbt_bridge::runtime::error::{OrchestrationError, ResolveError};
use mbt_bridge::runtime::protocol::{
    ActionRequest, ExecOptions, LifecycleRequest, SequenceRequest, SequencesRequest, StatusCode,
};
use mbt_bridge::runtime::{
    ActionResult, ActionTable, Bridge, BridgeConfig, BridgeError, Model, ResolutionPolicy, Role,
    RoleId, RoleMap, RoleRegistry, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

async fn initialised(config: BridgeConfig) -> Bridge<CounterModel> {
    let bridge = Bridge::new(Arc::new(CounterModel::new(2)), demo::actions(), config);
    let response = bridge.init(LifecycleRequest::default()).await.unwrap();
    assert_eq!(response.status.code, StatusCode::Ok);
    bridge
}

fn sequences(requests: Vec<Vec<ActionRequest>>) -> SequencesRequest {
    SequencesRequest {
        sequences: requests.into_iter().map(SequenceRequest::from).collect(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn increment_on_fresh_model_returns_one() {
    let bridge = initialised(BridgeConfig::default()).await;

    let response = bridge
        .execute_action(ActionRequest::root("Increment"))
        .await
        .unwrap();

    assert_eq!(response.status.code, StatusCode::Ok);
    assert_eq!(response.return_values, vec![Value::Int(1)]);
    let exec_time = response.exec_time.unwrap();
    assert!(exec_time.start_ns <= exec_time.end_ns);
    let roles: Vec<(String, i32)> = response
        .roles
        .iter()
        .map(|role| (role.role_name.clone(), role.role_id))
        .collect();
    assert_eq!(
        roles,
        vec![("Counter".to_string(), 0), ("Counter".to_string(), 1)]
    );
    assert!(response.role_states.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_action_follows_resolution_policy() {
    let bridge = initialised(BridgeConfig::default()).await;
    let response = bridge
        .execute_action(ActionRequest::root("DoesNotExist"))
        .await
        .unwrap();
    assert_eq!(response.status.code, StatusCode::ExecutionFailed);
    assert!(response.status.message.contains("No such action: DoesNotExist"));
    assert!(response.exec_time.is_none());
    assert!(response.return_values.is_empty());

    let strict = initialised(BridgeConfig {
        resolution_failures: ResolutionPolicy::HardError,
        ..BridgeConfig::default()
    })
    .await;
    let err = strict
        .execute_action(ActionRequest::root("DoesNotExist"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Unresolved(ResolveError::ActionNotFound { .. })
    ));
    assert_eq!(strict.model().value(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_role_is_reported() {
    let bridge = initialised(BridgeConfig {
        resolution_failures: ResolutionPolicy::HardError,
        ..BridgeConfig::default()
    })
    .await;

    let err = bridge
        .execute_action(ActionRequest::on_role("Counter", 9, "Increment"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Unresolved(ResolveError::RoleNotFound { index: 9, .. })
    ));

    let response = bridge
        .execute_action(ActionRequest::on_role("Counter", 1, "Increment"))
        .await
        .unwrap();
    assert_eq!(response.return_values, vec![Value::Int(1)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn model_failures_become_statuses() {
    let bridge = initialised(BridgeConfig::default()).await;

    let response = bridge
        .execute_action(ActionRequest::root("Unsupported"))
        .await
        .unwrap();
    assert_eq!(response.status.code, StatusCode::NotImplemented);
    assert!(response.roles.is_empty());

    let response = bridge.execute_action(ActionRequest::root("Fail")).await.unwrap();
    assert_eq!(response.status.code, StatusCode::ExecutionFailed);
    assert_eq!(response.status.message, "requested failure");

    let response = bridge.execute_action(ActionRequest::root("Add")).await.unwrap();
    assert_eq!(response.status.code, StatusCode::ExecutionFailed);
    assert!(response.status.message.contains("amount"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unit_return_and_state_capture() {
    let bridge = initialised(BridgeConfig::default()).await;

    let response = bridge
        .execute_action(
            ActionRequest::on_role("Counter", 0, "Increment")
                .with_options(ExecOptions { capture_state: Some(true) }),
        )
        .await
        .unwrap();
    assert_eq!(response.role_states.len(), 2);
    assert_eq!(response.role_states[0].role.role_id, 0);
    assert_eq!(response.role_states[0].state[0].key, "value");
    assert_eq!(response.role_states[0].state[0].value, Value::Int(1));
    assert_eq!(response.role_states[1].state[0].value, Value::Int(0));

    let response = bridge
        .execute_action(ActionRequest::root("Add").with_arg("amount", 5i64))
        .await
        .unwrap();
    assert_eq!(response.return_values, vec![Value::Int(5)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn three_sequences_return_in_submission_order() {
    let bridge = initialised(BridgeConfig::default()).await;

    let request = sequences(vec![
        vec![
            ActionRequest::on_role("Counter", 0, "Increment"),
            ActionRequest::on_role("Counter", 0, "Get"),
        ],
        vec![
            ActionRequest::on_role("Counter", 1, "Increment"),
            ActionRequest::on_role("Counter", 1, "Increment"),
        ],
        vec![
            ActionRequest::root("Add").with_arg("amount", 10i64),
            ActionRequest::root("Get"),
        ],
    ]);

    let response = bridge.execute_action_sequences(request).await.unwrap();

    assert_eq!(response.results.len(), 3);
    for sequence in &response.results {
        assert_eq!(sequence.responses.len(), 2);
        for action in &sequence.responses {
            assert_eq!(action.status.code, StatusCode::Ok);
            assert_eq!(action.roles.len(), 2);
        }
    }
    let values: Vec<Vec<Value>> = response
        .results
        .iter()
        .map(|sequence| {
            sequence
                .responses
                .iter()
                .flat_map(|action| action.return_values.clone())
                .collect()
        })
        .collect();
    assert_eq!(
        values,
        vec![
            vec![Value::Int(1), Value::Int(1)],
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(10), Value::Int(10)],
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_sequence_aborts_the_batch() {
    let bridge = initialised(BridgeConfig::default()).await;

    let request = sequences(vec![
        vec![ActionRequest::root("Get"), ActionRequest::root("Get")],
        vec![
            ActionRequest::on_role("Counter", 0, "Get"),
            ActionRequest::on_role("Counter", 0, "Get"),
        ],
        vec![ActionRequest::root("Fail"), ActionRequest::root("Increment")],
    ]);

    let err = bridge.execute_action_sequences(request).await.unwrap_err();
    match err {
        BridgeError::Orchestration(OrchestrationError::SequenceAborted {
            sequence,
            action,
            source,
        }) => {
            assert_eq!(sequence, 2);
            assert_eq!(action, 0);
            assert_eq!(source.message(), "requested failure");
        }
        other => panic!("unexpected error: {}", other),
    }
    // The aborted sequence stopped before its second command.
    assert_eq!(bridge.model().value(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_resolution_failure_names_position() {
    let bridge = initialised(BridgeConfig::default()).await;

    let request = sequences(vec![
        vec![ActionRequest::root("Increment")],
        vec![ActionRequest::root("Get"), ActionRequest::root("Nope")],
    ]);

    let err = bridge.execute_action_sequences(request).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Resolve {
            sequence: 1,
            action: 1,
            source: ResolveError::ActionNotFound { .. }
        }
    ));
    assert!(err.to_string().contains("sequence index 1, action index 1"));
    // Nothing ran: resolution happens before any sequence starts.
    assert_eq!(bridge.model().value(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_increments_are_all_applied() {
    let bridge = initialised(BridgeConfig {
        pacing_ns: 0,
        ..BridgeConfig::default()
    })
    .await;

    let request = sequences(
        (0..8)
            .map(|_| (0..25).map(|_| ActionRequest::root("Increment")).collect())
            .collect(),
    );

    let response = bridge.execute_action_sequences(request).await.unwrap();
    assert_eq!(response.results.len(), 8);
    assert!(response.results.iter().all(|seq| seq.responses.len() == 25));
    assert_eq!(bridge.model().value(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn per_sequence_state_capture_and_lifecycle() {
    let bridge = initialised(BridgeConfig::default()).await;

    let mut request = sequences(vec![
        vec![ActionRequest::on_role("Counter", 0, "Increment")],
        vec![ActionRequest::on_role("Counter", 1, "Increment")],
    ]);
    request.sequences[1].options = Some(ExecOptions { capture_state: Some(true) });

    let response = bridge.execute_action_sequences(request).await.unwrap();
    assert!(response.results[0].responses[0].role_states.is_empty());
    let states = &response.results[1].responses[0].role_states;
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].state[0].value, Value::Int(1));
    assert_eq!(states[1].state[0].value, Value::Int(1));

    let empty = bridge
        .execute_action_sequences(SequencesRequest::default())
        .await
        .unwrap();
    assert!(empty.results.is_empty());

    let response = bridge.cleanup(LifecycleRequest::default()).await.unwrap();
    assert_eq!(response.status.code, StatusCode::Ok);
    let response = bridge
        .execute_action(ActionRequest::on_role("Counter", 0, "Get"))
        .await
        .unwrap();
    assert_eq!(response.status.code, StatusCode::ExecutionFailed);
    assert!(response.status.message.contains("Counter#0 not found"));
}

struct Node;

impl Role for Node {}

/// Registry that drives a future on the ambient runtime handle, which panics
/// when called from an async worker thread.
#[derive(Default)]
struct BlockingRegistry {
    queries: AtomicUsize,
}

impl Role for BlockingRegistry {}

impl Model for BlockingRegistry {
    fn init(&self) -> ActionResult<()> {
        Ok(())
    }

    fn cleanup(&self) -> ActionResult<()> {
        Ok(())
    }

    fn role_registry(&self) -> Option<&dyn RoleRegistry> {
        Some(self)
    }
}

impl RoleRegistry for BlockingRegistry {
    fn roles(&self) -> ActionResult<RoleMap> {
        tokio::runtime::Handle::current().block_on(tokio::task::yield_now());
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut roles = RoleMap::new();
        roles.insert(RoleId::new("Node", 0), Arc::new(Node));
        Ok(roles)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn registry_queries_stay_off_async_workers() {
    let mut actions = ActionTable::new();
    actions.register_role("Node", "Ping", |_: &Node, _| Ok(1i64));
    let bridge = Bridge::new(
        Arc::new(BlockingRegistry::default()),
        actions,
        BridgeConfig::default(),
    );

    let response = bridge
        .execute_action(ActionRequest::on_role("Node", 0, "Ping"))
        .await
        .unwrap();
    assert_eq!(response.return_values, vec![Value::Int(1)]);

    let response = bridge
        .execute_action_sequences(sequences(vec![
            vec![ActionRequest::on_role("Node", 0, "Ping")],
            vec![ActionRequest::on_role("Node", 0, "Ping")],
        ]))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 2);

    let err = bridge
        .execute_action_sequences(sequences(vec![vec![ActionRequest::on_role(
            "Node", 3, "Ping",
        )]]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Resolve {
            source: ResolveError::RoleNotFound { index: 3, .. },
            ..
        }
    ));

    // Lookup plus snapshot for the single action, two lookups plus one
    // snapshot for the batch, one lookup for the failed batch.
    assert_eq!(bridge.model().queries.load(Ordering::SeqCst), 6);
}
