//! Reference counter model
//!
//! A small model used by the `counter-bridge` binary and the integration
//! tests. The root keeps one counter; `Counter` roles keep their own. State
//! lives behind `parking_lot` mutexes since the bridge runs sequences in
//! parallel against the same instance.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::runtime::action::{ActionTable, Arg, arg};
use crate::runtime::error::{ActionError, ActionResult};
use crate::runtime::role::{Model, Role, RoleId, RoleMap, RoleRegistry};
use crate::runtime::value::Value;

/// Role name of the per-instance counters.
pub const COUNTER_ROLE: &str = "Counter";

/// A single counter role.
#[derive(Debug, Default)]
pub struct Counter {
    value: Mutex<i64>,
}

impl Counter {
    /// Increment and return the new value.
    pub fn increment(&self) -> i64 {
        let mut value = self.value.lock();
        *value += 1;
        *value
    }

    /// Current value.
    pub fn get(&self) -> i64 {
        *self.value.lock()
    }
}

impl Role for Counter {
    fn state(&self) -> ActionResult<Option<Vec<(String, Value)>>> {
        Ok(Some(vec![("value".to_string(), Value::Int(self.get()))]))
    }
}

/// Model with a root counter and a growable set of `Counter` roles.
#[derive(Debug)]
pub struct CounterModel {
    value: Mutex<i64>,
    initial_roles: usize,
    counters: Mutex<BTreeMap<i32, Arc<Counter>>>,
}

impl CounterModel {
    /// Create a model that starts `roles` counters on init.
    pub fn new(roles: usize) -> Self {
        Self {
            value: Mutex::new(0),
            initial_roles: roles,
            counters: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current root value.
    pub fn value(&self) -> i64 {
        *self.value.lock()
    }

    fn add(&self, amount: i64) -> ActionResult<i64> {
        let mut value = self.value.lock();
        *value = value
            .checked_add(amount)
            .ok_or_else(|| ActionError::failed(format!("counter overflow adding {}", amount)))?;
        Ok(*value)
    }

    fn spawn_counter(&self) -> i32 {
        let mut counters = self.counters.lock();
        let index = counters.keys().next_back().map_or(0, |last| last + 1);
        counters.insert(index, Arc::new(Counter::default()));
        index
    }
}

impl Default for CounterModel {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Role for CounterModel {
    fn state(&self) -> ActionResult<Option<Vec<(String, Value)>>> {
        Ok(Some(vec![("value".to_string(), Value::Int(self.value()))]))
    }
}

impl Model for CounterModel {
    fn init(&self) -> ActionResult<()> {
        *self.value.lock() = 0;
        self.counters.lock().clear();
        for _ in 0..self.initial_roles {
            self.spawn_counter();
        }
        Ok(())
    }

    fn cleanup(&self) -> ActionResult<()> {
        self.counters.lock().clear();
        Ok(())
    }

    fn role_registry(&self) -> Option<&dyn RoleRegistry> {
        Some(self)
    }
}

impl RoleRegistry for CounterModel {
    fn roles(&self) -> ActionResult<RoleMap> {
        Ok(self
            .counters
            .lock()
            .iter()
            .map(|(&index, counter)| {
                (
                    RoleId::new(COUNTER_ROLE, index),
                    counter.clone() as Arc<dyn Role>,
                )
            })
            .collect())
    }
}

/// Register every counter action.
pub fn register_actions(table: &mut ActionTable) {
    table
        .register_root("Increment", |model: &CounterModel, _| model.add(1))
        .register_root("Decrement", |model: &CounterModel, _| model.add(-1))
        .register_root("Get", |model: &CounterModel, _| Ok(model.value()))
        .register_root("Add", |model: &CounterModel, args: &[Arg]| {
            model.add(arg(args, "amount")?)
        })
        .register_root("AddCounter", |model: &CounterModel, _| Ok(model.spawn_counter()))
        .register_root("Fail", |_: &CounterModel, _| {
            Err::<(), _>(ActionError::failed("requested failure"))
        })
        .register_root("Unsupported", |_: &CounterModel, _| {
            Err::<(), _>(ActionError::not_implemented("Unsupported is not implemented"))
        })
        .register_role(COUNTER_ROLE, "Increment", |counter: &Counter, _| {
            Ok(counter.increment())
        })
        .register_role(COUNTER_ROLE, "Get", |counter: &Counter, _| Ok(counter.get()));
}

/// A fresh action table for the counter model.
pub fn actions() -> ActionTable {
    let mut table = ActionTable::new();
    register_actions(&mut table);
    table
}
