//! Command execution
//!
//! Executes exactly one resolved command and captures its outcome. The
//! executor never fails: model errors and panics are classified into an
//! [`ActionError`] and returned inside the [`ExecutionResult`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use super::action::ReturnValue;
use super::command::Command;
use super::error::ActionError;

/// Monotonic nanosecond clock anchored at bridge start-up.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    base: Instant,
}

impl Clock {
    /// Start a new clock.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the clock started.
    pub fn now_ns(&self) -> i64 {
        i64::try_from(self.base.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of executing one command.
pub struct ExecutionResult {
    /// Returned native value, or the classified failure
    pub outcome: Result<ReturnValue, ActionError>,
    /// Timestamp taken immediately before invocation
    pub start_ns: i64,
    /// Timestamp taken immediately after invocation
    pub end_ns: i64,
}

impl ExecutionResult {
    /// The classified failure, if the action failed.
    pub fn failure(&self) -> Option<&ActionError> {
        self.outcome.as_ref().err()
    }

    /// Whether the action succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match &self.outcome {
            Ok(value) => Ok(value.encode()),
            Err(err) => Err(err),
        };
        f.debug_struct("ExecutionResult")
            .field("outcome", &outcome)
            .field("start_ns", &self.start_ns)
            .field("end_ns", &self.end_ns)
            .finish()
    }
}

/// Results of one sequence, index-aligned with its commands.
pub type SequenceResult = Vec<ExecutionResult>;

/// Execute a single command.
pub fn execute(command: &Command, clock: &Clock) -> ExecutionResult {
    let start_ns = clock.now_ns();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        (command.invocable)(command.target.as_ref(), &command.args)
    }))
    .unwrap_or_else(|payload| {
        Err(ActionError::failed(format!(
            "action panicked: {}",
            panic_message(payload.as_ref())
        )))
    });
    let end_ns = clock.now_ns().max(start_ns);

    match &outcome {
        Ok(_) => tracing::debug!(
            role = %command.role_id(),
            action = %command.action_name,
            elapsed_ns = end_ns - start_ns,
            "action completed"
        ),
        Err(err) => tracing::debug!(
            role = %command.role_id(),
            action = %command.action_name,
            error = %err,
            "action failed"
        ),
    }

    ExecutionResult {
        outcome,
        start_ns,
        end_ns,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::action::{ActionTable, Arg};
    use crate::runtime::role::Role;
    use crate::runtime::value::Value;
    use std::sync::Arc;

    struct Gauge;

    impl Role for Gauge {}

    fn command(action: &str) -> Command {
        let mut table = ActionTable::new();
        table
            .register_role("Gauge", "Read", |_: &Gauge, args: &[Arg]| {
                Ok(args.len() as i64)
            })
            .register_role("Gauge", "Calibrate", |_: &Gauge, _| {
                Err::<(), _>(ActionError::not_implemented("calibration"))
            })
            .register_role("Gauge", "Break", |_: &Gauge, _| {
                Err::<(), _>(ActionError::failed("sensor offline"))
            })
            .register_role("Gauge", "Explode", |_: &Gauge, _| -> Result<(), ActionError> {
                panic!("kaboom")
            });

        Command {
            target: Arc::new(Gauge),
            invocable: table.get("Gauge", action).unwrap().clone(),
            action_name: action.to_string(),
            role_name: "Gauge".to_string(),
            role_index: 0,
            args: vec![Arg::new("a", 1i64), Arg::new("b", 2i64)],
        }
    }

    #[test]
    fn test_success_captures_value_and_timing() {
        let clock = Clock::new();
        let result = execute(&command("Read"), &clock);
        assert!(result.is_ok());
        assert!(result.start_ns <= result.end_ns);
        assert_eq!(result.outcome.unwrap().encode(), Value::Int(2));
    }

    #[test]
    fn test_failures_are_classified() {
        let clock = Clock::new();

        let result = execute(&command("Calibrate"), &clock);
        assert!(result.failure().unwrap().is_not_implemented());
        assert!(result.start_ns <= result.end_ns);

        let result = execute(&command("Break"), &clock);
        assert_eq!(result.failure(), Some(&ActionError::failed("sensor offline")));
    }

    #[test]
    fn test_panic_is_captured() {
        let clock = Clock::new();
        let result = execute(&command("Explode"), &clock);
        let failure = result.failure().unwrap();
        assert!(!failure.is_not_implemented());
        assert!(failure.message().contains("kaboom"));
        assert!(result.start_ns <= result.end_ns);
    }
}
