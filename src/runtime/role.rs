//! Roles, the model root, and the role registry
//!
//! The model owns every role instance. The bridge only looks roles up by
//! [`RoleId`], fresh on every call, because the live set may change between
//! calls. No locking is added here: models synchronise their own state.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::{ActionResult, ResolveError, ResolveResult};
use super::value::Value;

/// Identity of a live role instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RoleId {
    /// Role name; empty for the model root
    pub role_name: String,
    /// Instance index within the role
    pub index: i32,
}

impl RoleId {
    /// Create a role identifier.
    pub fn new(role_name: impl Into<String>, index: i32) -> Self {
        Self {
            role_name: role_name.into(),
            index,
        }
    }

    /// Identifier of the model root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this identifies the model root.
    pub fn is_root(&self) -> bool {
        self.role_name.is_empty()
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.role_name, self.index)
    }
}

/// Upcast helper so registered actions can recover the concrete role type.
pub trait AsAny {
    /// View as `Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A role instance exposed by the model under test.
pub trait Role: AsAny + Send + Sync {
    /// Current state of the role, if it exposes any.
    ///
    /// Called concurrently with the role's actions when state capture is on,
    /// so implementations should return a consistent snapshot.
    fn state(&self) -> ActionResult<Option<Vec<(String, Value)>>> {
        Ok(None)
    }
}

impl<'a> dyn Role + 'a {
    /// Downcast to the concrete role type.
    pub fn downcast_ref<T: Role + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Live roles keyed by identity.
pub type RoleMap = HashMap<RoleId, Arc<dyn Role>>;

/// Lookup of live role instances.
pub trait RoleRegistry: Send + Sync {
    /// Current live role set, queried fresh on each call.
    fn roles(&self) -> ActionResult<RoleMap>;

    /// Look up a single live role.
    fn lookup(&self, role_name: &str, index: i32) -> ResolveResult<Arc<dyn Role>> {
        let roles = self.roles().map_err(ResolveError::Registry)?;
        roles
            .get(&RoleId::new(role_name, index))
            .cloned()
            .ok_or_else(|| ResolveError::RoleNotFound {
                role_name: role_name.to_string(),
                index,
            })
    }
}

/// The behavioural model driven by the bridge.
///
/// The model is itself the target of root actions (empty role name).
pub trait Model: Role {
    /// Prepare the model before a test run.
    fn init(&self) -> ActionResult<()>;

    /// Tear the model down after a test run.
    fn cleanup(&self) -> ActionResult<()>;

    /// Role registry, for models that expose roles.
    fn role_registry(&self) -> Option<&dyn RoleRegistry> {
        None
    }
}

/// Role identities and (optionally) states, sorted by identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleSnapshot {
    /// Live role identities
    pub roles: Vec<RoleId>,
    /// Captured role states (only roles that expose state)
    pub states: Vec<(RoleId, Vec<(String, Value)>)>,
}

impl RoleSnapshot {
    /// Query the model's live roles, capturing state when requested.
    pub fn capture<M: Model + ?Sized>(model: &M, capture_state: bool) -> ActionResult<Self> {
        let Some(registry) = model.role_registry() else {
            return Ok(Self::default());
        };

        let mut live: Vec<(RoleId, Arc<dyn Role>)> = registry.roles()?.into_iter().collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));

        let mut snapshot = Self {
            roles: Vec::with_capacity(live.len()),
            states: Vec::new(),
        };
        for (id, role) in live {
            if capture_state {
                if let Some(state) = role.state()? {
                    snapshot.states.push((id.clone(), state));
                }
            }
            snapshot.roles.push(id);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::ActionError;

    struct Gauge(i64);

    impl Role for Gauge {
        fn state(&self) -> ActionResult<Option<Vec<(String, Value)>>> {
            Ok(Some(vec![("value".to_string(), Value::Int(self.0))]))
        }
    }

    struct Silent;
    impl Role for Silent {}

    struct Registry;

    impl RoleRegistry for Registry {
        fn roles(&self) -> ActionResult<RoleMap> {
            let mut roles: RoleMap = HashMap::new();
            roles.insert(RoleId::new("Gauge", 1), Arc::new(Gauge(11)));
            roles.insert(RoleId::new("Gauge", 0), Arc::new(Gauge(10)));
            roles.insert(RoleId::new("Silent", 0), Arc::new(Silent));
            Ok(roles)
        }
    }

    struct Broken;

    impl RoleRegistry for Broken {
        fn roles(&self) -> ActionResult<RoleMap> {
            Err(ActionError::failed("registry offline"))
        }
    }

    struct Host(Registry);

    impl Role for Host {}

    impl Model for Host {
        fn init(&self) -> ActionResult<()> {
            Ok(())
        }

        fn cleanup(&self) -> ActionResult<()> {
            Ok(())
        }

        fn role_registry(&self) -> Option<&dyn RoleRegistry> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_lookup() {
        let role = Registry.lookup("Gauge", 1).unwrap();
        assert_eq!(role.downcast_ref::<Gauge>().map(|p| p.0), Some(11));
        assert!(role.downcast_ref::<Silent>().is_none());

        assert_eq!(
            Registry.lookup("Gauge", 7).err(),
            Some(ResolveError::RoleNotFound {
                role_name: "Gauge".into(),
                index: 7
            })
        );
        assert!(matches!(
            Broken.lookup("Gauge", 0),
            Err(ResolveError::Registry(_))
        ));
    }

    #[test]
    fn test_snapshot_is_sorted_and_skips_stateless_roles() {
        let host = Host(Registry);

        let snapshot = RoleSnapshot::capture(&host, false).unwrap();
        assert_eq!(
            snapshot.roles,
            vec![
                RoleId::new("Gauge", 0),
                RoleId::new("Gauge", 1),
                RoleId::new("Silent", 0)
            ]
        );
        assert!(snapshot.states.is_empty());

        let snapshot = RoleSnapshot::capture(&host, true).unwrap();
        assert_eq!(snapshot.states.len(), 2);
        assert_eq!(snapshot.states[0].0, RoleId::new("Gauge", 0));
        assert_eq!(snapshot.states[0].1, vec![("value".to_string(), Value::Int(10))]);
    }

    #[test]
    fn test_role_id_display() {
        assert_eq!(RoleId::new("Counter", 2).to_string(), "Counter#2");
        assert!(RoleId::root().is_root());
    }
}
