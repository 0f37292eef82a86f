//! Action arguments and the pre-registered action table
//!
//! The hosting harness registers every invocable ahead of time, keyed by
//! role name then action name. Root actions use the empty role name. The
//! bridge only reads the table; it never discovers actions itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::{ActionError, ActionResult, CodecError, CodecResult};
use super::role::{Model, Role};
use super::value::{Decode, Encode, Value};

/// Named action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    /// Parameter name
    pub name: String,
    /// Parameter value
    #[serde(default)]
    pub value: Value,
}

impl Arg {
    /// Create an argument.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Decode the argument value.
    pub fn decode<T: Decode>(&self) -> CodecResult<T> {
        T::decode(&self.value)
    }
}

/// Find and decode an argument by name.
pub fn arg<T: Decode>(args: &[Arg], name: &str) -> CodecResult<T> {
    args.iter()
        .find(|arg| arg.name == name)
        .ok_or_else(|| CodecError::MissingArg(name.to_string()))?
        .decode()
}

/// Native value returned by an action, encoded only when a response is built.
pub type ReturnValue = Box<dyn Encode + Send>;

/// Type-erased action: target instance and arguments in, native value out.
pub type Invocable = Arc<dyn Fn(&dyn Role, &[Arg]) -> ActionResult<ReturnValue> + Send + Sync>;

/// Two-level action table: role name -> action name -> invocable.
#[derive(Clone, Default)]
pub struct ActionTable {
    actions: HashMap<String, HashMap<String, Invocable>>,
}

impl ActionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw invocable.
    pub fn insert(&mut self, role_name: &str, action_name: &str, invocable: Invocable) {
        self.actions
            .entry(role_name.to_string())
            .or_default()
            .insert(action_name.to_string(), invocable);
    }

    /// Register an action on the model root.
    pub fn register_root<M, T, F>(&mut self, action_name: &str, action: F) -> &mut Self
    where
        M: Model + 'static,
        T: Encode + Send + 'static,
        F: Fn(&M, &[Arg]) -> ActionResult<T> + Send + Sync + 'static,
    {
        self.register_role::<M, T, F>("", action_name, action)
    }

    /// Register an action on instances of a role type.
    pub fn register_role<R, T, F>(
        &mut self,
        role_name: &str,
        action_name: &str,
        action: F,
    ) -> &mut Self
    where
        R: Role + 'static,
        T: Encode + Send + 'static,
        F: Fn(&R, &[Arg]) -> ActionResult<T> + Send + Sync + 'static,
    {
        let expected = std::any::type_name::<R>();
        let invocable: Invocable = Arc::new(move |target: &dyn Role, args: &[Arg]| {
            let role = target.downcast_ref::<R>().ok_or_else(|| {
                ActionError::failed(format!("target is not a {}", expected))
            })?;
            let value = action(role, args)?;
            Ok(Box::new(value) as ReturnValue)
        });
        self.insert(role_name, action_name, invocable);
        self
    }

    /// Look up an invocable.
    pub fn get(&self, role_name: &str, action_name: &str) -> Option<&Invocable> {
        self.actions.get(role_name)?.get(action_name)
    }

    /// Number of registered actions across all roles.
    pub fn len(&self) -> usize {
        self.actions.values().map(HashMap::len).sum()
    }

    /// Whether no actions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<(&str, Vec<&str>)> = self
            .actions
            .iter()
            .map(|(role, actions)| {
                let mut actions: Vec<&str> = actions.keys().map(String::as_str).collect();
                actions.sort_unstable();
                (role.as_str(), actions)
            })
            .collect();
        names.sort_unstable();
        f.debug_map().entries(names).finish()
    }
}
