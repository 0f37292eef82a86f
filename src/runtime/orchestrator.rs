//! Concurrent sequence orchestration
//!
//! Every sequence runs on its own dedicated worker thread; commands inside a
//! sequence run strictly in order with a short pause between them. A failed
//! command stops its own sequence only. Workers report back over a channel,
//! so the first abort *received* is the one surfaced for the whole batch.
//! That tie-break follows completion time, not submission index, and is not
//! deterministic across runs.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;

use super::command::{ActionSequence, Command};
use super::error::{OrchestrationError, OrchestrationResult};
use super::executor::{self, Clock, SequenceResult};
use super::interference::{Activity, Interference};

type WorkerReport = (usize, OrchestrationResult<SequenceResult>);

/// Runs batches of pre-resolved sequences in parallel.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pacing: Duration,
    interference: bool,
    activity: Arc<Activity>,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(pacing: Duration, interference: bool) -> Self {
        Self {
            pacing,
            interference,
            activity: Arc::new(Activity::default()),
        }
    }

    /// Interference threads started by this orchestrator and its clones.
    pub fn interference_activity(&self) -> &Activity {
        &self.activity
    }

    /// Run all sequences to completion.
    ///
    /// Returns one result list per sequence, in submission order, or the
    /// first abort reported by any worker. Partial results are discarded on
    /// error. The interference thread (when enabled) is stopped and joined
    /// before this returns, on every path.
    pub async fn run(
        &self,
        sequences: Vec<ActionSequence>,
        clock: Clock,
    ) -> OrchestrationResult<Vec<SequenceResult>> {
        let count = sequences.len();
        if count == 0 {
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::unbounded_channel::<WorkerReport>();

        let interference = if self.interference {
            match Interference::start(self.activity.clone()) {
                Ok(interference) => Some(interference),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to start interference thread");
                    None
                }
            }
        } else {
            None
        };

        let (handles, spawn_error) = self.dispatch(sequences, clock, &tx);
        drop(tx);

        let reports = Reports::collect(rx, count).await;
        let joined = join_workers(handles).await;

        if let Some(interference) = interference {
            interference.stop().await;
        }

        reports.settle(spawn_error, joined)
    }

    /// Spawn one worker per sequence.
    ///
    /// Stops at the first spawn failure; already-spawned workers keep running
    /// and are still awaited by the caller.
    fn dispatch(
        &self,
        sequences: Vec<ActionSequence>,
        clock: Clock,
        tx: &mpsc::UnboundedSender<WorkerReport>,
    ) -> (Vec<JoinHandle<()>>, Option<OrchestrationError>) {
        let mut handles = Vec::with_capacity(sequences.len());
        let span = tracing::Span::current();

        for (index, sequence) in sequences.into_iter().enumerate() {
            let tx = tx.clone();
            let pacing = self.pacing;
            let span = span.clone();
            let spawned = thread::Builder::new()
                .name(format!("sequence-{}", index))
                .spawn(move || {
                    let _entered = span.enter();
                    let report = run_sequence(index, &sequence, pacing, &clock);
                    // Receiver outlives every worker; a send error means the
                    // batch future was dropped and nobody is listening.
                    let _ = tx.send((index, report));
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    tracing::error!(
                        sequence = index,
                        error = %source,
                        "failed to spawn sequence worker"
                    );
                    return (
                        handles,
                        Some(OrchestrationError::WorkerSpawn {
                            sequence: index,
                            source,
                        }),
                    );
                }
            }
        }

        (handles, None)
    }
}

/// Worker reports gathered for one batch.
#[derive(Debug)]
struct Reports {
    slots: Vec<Option<SequenceResult>>,
    first_abort: Option<OrchestrationError>,
}

impl Reports {
    /// Drain the channel until every sender is gone.
    async fn collect(mut rx: mpsc::UnboundedReceiver<WorkerReport>, count: usize) -> Self {
        let mut reports = Self {
            slots: (0..count).map(|_| None).collect(),
            first_abort: None,
        };
        while let Some((index, report)) = rx.recv().await {
            match report {
                Ok(results) => reports.slots[index] = Some(results),
                Err(abort) if reports.first_abort.is_none() => {
                    tracing::debug!(sequence = index, error = %abort, "sequence aborted first");
                    reports.first_abort = Some(abort);
                }
                Err(abort) => {
                    tracing::debug!(sequence = index, error = %abort, "sequence aborted");
                }
            }
        }
        reports
    }

    /// Final batch outcome. A spawn failure outranks the first abort, which
    /// outranks a failed join; a silent worker is reported last.
    fn settle(
        self,
        spawn_error: Option<OrchestrationError>,
        joined: OrchestrationResult<()>,
    ) -> OrchestrationResult<Vec<SequenceResult>> {
        if let Some(err) = spawn_error {
            return Err(err);
        }
        if let Some(abort) = self.first_abort {
            return Err(abort);
        }
        joined?;

        self.slots
            .into_iter()
            .enumerate()
            .map(|(sequence, slot)| slot.ok_or(OrchestrationError::WorkerLost { sequence }))
            .collect()
    }
}

/// Execute one sequence in order, stopping at the first failed command.
fn run_sequence(
    index: usize,
    sequence: &[Command],
    pacing: Duration,
    clock: &Clock,
) -> OrchestrationResult<SequenceResult> {
    let mut results = Vec::with_capacity(sequence.len());

    for (position, command) in sequence.iter().enumerate() {
        if position > 0 && !pacing.is_zero() {
            thread::sleep(pacing);
        }

        let result = executor::execute(command, clock);
        if let Some(failure) = result.failure() {
            return Err(OrchestrationError::SequenceAborted {
                sequence: index,
                action: position,
                source: failure.clone(),
            });
        }
        results.push(result);
    }

    tracing::trace!(sequence = index, actions = results.len(), "sequence finished");
    Ok(results)
}

async fn join_workers(handles: Vec<JoinHandle<()>>) -> OrchestrationResult<()> {
    let panicked = tokio::task::spawn_blocking(move || {
        handles
            .into_iter()
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count()
    })
    .await
    .map_err(|err| OrchestrationError::Join(err.to_string()))?;

    if panicked > 0 {
        return Err(OrchestrationError::Join(format!(
            "{} sequence worker(s) panicked",
            panicked
        )));
    }
    Ok(())
}
