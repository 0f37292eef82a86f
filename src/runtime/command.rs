//! Command resolution
//!
//! Binds an action request to its target instance and invocable. Resolution
//! never invokes anything: the action table is consulted first, then the
//! target is looked up (the model root for an empty role name, otherwise the
//! live role registry).

use std::fmt;
use std::sync::Arc;

use super::action::{ActionTable, Arg, Invocable};
use super::error::{ResolveError, ResolveResult};
use super::role::{Model, Role, RoleId};

/// A fully resolved action, ready to execute.
#[derive(Clone)]
pub struct Command {
    /// Instance the action runs against
    pub target: Arc<dyn Role>,
    /// Bound invocable
    pub invocable: Invocable,
    /// Action name
    pub action_name: String,
    /// Role name (empty for the model root)
    pub role_name: String,
    /// Role index
    pub role_index: i32,
    /// Ordered arguments
    pub args: Vec<Arg>,
}

impl Command {
    /// Identity of the targeted role.
    pub fn role_id(&self) -> RoleId {
        RoleId::new(self.role_name.clone(), self.role_index)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("action_name", &self.action_name)
            .field("role_name", &self.role_name)
            .field("role_index", &self.role_index)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// An ordered list of commands forming one logical thread of interaction.
pub type ActionSequence = Vec<Command>;

/// Resolves action requests against a model and its action table.
pub struct Resolver<'a, M: Model> {
    model: &'a Arc<M>,
    actions: &'a ActionTable,
}

impl<'a, M: Model + 'static> Resolver<'a, M> {
    /// Create a resolver.
    pub fn new(model: &'a Arc<M>, actions: &'a ActionTable) -> Self {
        Self { model, actions }
    }

    /// Resolve a single action.
    pub fn resolve(
        &self,
        role_name: &str,
        role_index: i32,
        action_name: &str,
        args: Vec<Arg>,
    ) -> ResolveResult<Command> {
        let invocable = self
            .actions
            .get(role_name, action_name)
            .cloned()
            .ok_or_else(|| ResolveError::ActionNotFound {
                role_name: role_name.to_string(),
                action_name: action_name.to_string(),
            })?;

        let target: Arc<dyn Role> = if role_name.is_empty() {
            self.model.clone()
        } else {
            self.model
                .role_registry()
                .ok_or_else(|| ResolveError::RoleNotFound {
                    role_name: role_name.to_string(),
                    index: role_index,
                })?
                .lookup(role_name, role_index)?
        };

        Ok(Command {
            target,
            invocable,
            action_name: action_name.to_string(),
            role_name: role_name.to_string(),
            role_index,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::ActionResult;
    use crate::runtime::role::{RoleMap, RoleRegistry};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Worker;

    impl Role for Worker {}

    #[derive(Default)]
    struct Fixture {
        invocations: Arc<AtomicUsize>,
        registry_queries: AtomicUsize,
    }

    impl Role for Fixture {}

    impl Model for Fixture {
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

    impl RoleRegistry for Fixture {
        fn roles(&self) -> ActionResult<RoleMap> {
            self.registry_queries.fetch_add(1, Ordering::SeqCst);
            let mut roles: RoleMap = HashMap::new();
            roles.insert(RoleId::new("Worker", 0), Arc::new(Worker));
            Ok(roles)
        }
    }

    fn table(counter: Arc<AtomicUsize>) -> ActionTable {
        let mut table = ActionTable::new();
        let root_counter = counter.clone();
        table.register_root("Ping", move |_: &Fixture, _| {
            root_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        table.register_role("Worker", "Work", move |_: &Worker, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        table
    }

    #[test]
    fn test_resolve_root_action() {
        let model = Arc::new(Fixture::default());
        let actions = table(model.invocations.clone());
        let resolver = Resolver::new(&model, &actions);

        let cmd = resolver.resolve("", 0, "Ping", vec![]).unwrap();
        assert_eq!(cmd.role_id(), RoleId::root());
        assert!(cmd.target.downcast_ref::<Fixture>().is_some());
        assert_eq!(model.registry_queries.load(Ordering::SeqCst), 0);
        assert_eq!(model.invocations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolve_role_action() {
        let model = Arc::new(Fixture::default());
        let actions = table(model.invocations.clone());
        let resolver = Resolver::new(&model, &actions);

        let cmd = resolver.resolve("Worker", 0, "Work", vec![]).unwrap();
        assert!(cmd.target.downcast_ref::<Worker>().is_some());
        assert_eq!(model.registry_queries.load(Ordering::SeqCst), 1);

        let err = resolver.resolve("Worker", 3, "Work", vec![]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::RoleNotFound {
                role_name: "Worker".into(),
                index: 3
            }
        );
        assert_eq!(model.invocations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_action_is_side_effect_free() {
        let model = Arc::new(Fixture::default());
        let actions = table(model.invocations.clone());
        let resolver = Resolver::new(&model, &actions);

        for (role, action) in [("", "DoesNotExist"), ("Ghost", "Work"), ("Worker", "Ping")] {
            let err = resolver.resolve(role, 0, action, vec![]).unwrap_err();
            assert!(matches!(err, ResolveError::ActionNotFound { .. }));
        }
        assert_eq!(model.invocations.load(Ordering::SeqCst), 0);
        assert_eq!(model.registry_queries.load(Ordering::SeqCst), 0);
    }
}
