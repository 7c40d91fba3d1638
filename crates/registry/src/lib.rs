//! Entity-type and transition registry
//!
//! Process-wide table mapping entity types to their schemas and
//! transition definitions. Built once at startup via
//! [`RegistryBuilder`], immutable afterward, and therefore safe for
//! unsynchronized concurrent reads. Re-registering an existing key is a
//! build error, never a silent overwrite — shadowing transition
//! semantics by accident is how workflows rot.
//!
//! Transition definitions are stateless objects constructed once at
//! registration and reused across all invocations; the [`Transition`]
//! trait takes `&self` everywhere for that reason. For transitions that
//! are more naturally written as free functions than as types,
//! [`FnTransition`] wraps a validate/effect closure pair.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use traject_core::{Metadata, RegistryError, TransitionContext};

/// A named, validated operation moving an entity to a computed target state
///
/// Implementations must be stateless with respect to invocations: the
/// same instance is shared across concurrent executions.
pub trait Transition: Send + Sync {
    /// Registry key for this transition
    fn name(&self) -> &str;

    /// Compute the state this execution moves the entity into
    fn target_state(&self, ctx: &TransitionContext) -> String;

    /// Whether this execution is allowed from the current state
    ///
    /// Returning `false` rejects the execution before anything is
    /// written. Defaults to allowing everything.
    fn validate(&self, _ctx: &TransitionContext) -> bool {
        true
    }

    /// Produce the metadata payload stored on the new record
    ///
    /// Defaults to an empty object.
    fn effect(&self, _ctx: &TransitionContext) -> Metadata {
        Metadata::new()
    }

    /// Human-readable reason recorded with the new record
    ///
    /// Defaults to none; override for audit-facing transitions.
    fn reason(&self, _ctx: &TransitionContext) -> Option<String> {
        None
    }
}

/// Closure-backed [`Transition`]
///
/// An explicit target/validate/effect function triple keyed by name,
/// for entity definitions that live in configuration code rather than
/// dedicated types.
pub struct FnTransition {
    name: String,
    target: Box<dyn Fn(&TransitionContext) -> String + Send + Sync>,
    validate: Box<dyn Fn(&TransitionContext) -> bool + Send + Sync>,
    effect: Box<dyn Fn(&TransitionContext) -> Metadata + Send + Sync>,
}

impl FnTransition {
    /// Transition with a fixed target state and no validation
    pub fn to_state(name: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            name: name.into(),
            target: Box::new(move |_| target.clone()),
            validate: Box::new(|_| true),
            effect: Box::new(|_| Metadata::new()),
        }
    }

    /// Replace the target-state function
    pub fn with_target(
        mut self,
        target: impl Fn(&TransitionContext) -> String + Send + Sync + 'static,
    ) -> Self {
        self.target = Box::new(target);
        self
    }

    /// Replace the validation function
    pub fn with_validate(
        mut self,
        validate: impl Fn(&TransitionContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validate = Box::new(validate);
        self
    }

    /// Restrict the transition to a set of allowed source states
    ///
    /// The initial transition (no current state) is allowed only when
    /// `allow_initial` is set.
    pub fn from_states<S: Into<String>>(
        self,
        states: impl IntoIterator<Item = S>,
        allow_initial: bool,
    ) -> Self {
        let allowed: BTreeSet<String> = states.into_iter().map(Into::into).collect();
        self.with_validate(move |ctx| match ctx.current_state() {
            Some(state) => allowed.contains(state),
            None => allow_initial,
        })
    }

    /// Replace the effect function
    pub fn with_effect(
        mut self,
        effect: impl Fn(&TransitionContext) -> Metadata + Send + Sync + 'static,
    ) -> Self {
        self.effect = Box::new(effect);
        self
    }
}

impl Transition for FnTransition {
    fn name(&self) -> &str {
        &self.name
    }

    fn target_state(&self, ctx: &TransitionContext) -> String {
        (self.target)(ctx)
    }

    fn validate(&self, ctx: &TransitionContext) -> bool {
        (self.validate)(ctx)
    }

    fn effect(&self, ctx: &TransitionContext) -> Metadata {
        (self.effect)(ctx)
    }
}

impl std::fmt::Debug for FnTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransition").field("name", &self.name).finish()
    }
}

/// Schema of one entity type
#[derive(Clone)]
pub struct EntityTypeSchema {
    /// Registry key for this entity type
    pub entity_type: String,
    /// Set of valid state values
    pub states: BTreeSet<String>,
    /// State a freshly tracked entity starts in
    pub initial_state: String,
    /// Transition name -> definition
    transitions: BTreeMap<String, Arc<dyn Transition>>,
}

impl EntityTypeSchema {
    /// Define a schema from its state set and initial state
    pub fn new<S: Into<String>>(
        entity_type: impl Into<String>,
        states: impl IntoIterator<Item = S>,
        initial_state: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            states: states.into_iter().map(Into::into).collect(),
            initial_state: initial_state.into(),
            transitions: BTreeMap::new(),
        }
    }

    /// Whether `state` belongs to this schema's declared set
    pub fn is_declared_state(&self, state: &str) -> bool {
        self.states.contains(state)
    }

    /// Look up a transition definition by name
    pub fn transition(&self, name: &str) -> Option<&Arc<dyn Transition>> {
        self.transitions.get(name)
    }

    /// Registered transition names, in sorted order
    pub fn transition_names(&self) -> impl Iterator<Item = &str> {
        self.transitions.keys().map(String::as_str)
    }

    /// All registered transitions
    pub fn transitions(&self) -> impl Iterator<Item = &Arc<dyn Transition>> {
        self.transitions.values()
    }
}

impl std::fmt::Debug for EntityTypeSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTypeSchema")
            .field("entity_type", &self.entity_type)
            .field("states", &self.states)
            .field("initial_state", &self.initial_state)
            .field("transitions", &self.transitions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for the process-wide registry
///
/// Collects entity-type schemas and transition registrations during
/// process initialization; [`RegistryBuilder::build`] freezes them into
/// an immutable [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    schemas: BTreeMap<String, EntityTypeSchema>,
}

impl RegistryBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type schema
    ///
    /// Fails when the entity type is already registered or when the
    /// schema's initial state is not in its declared set.
    pub fn register_entity_type(&mut self, schema: EntityTypeSchema) -> Result<&mut Self, RegistryError> {
        if !schema.is_declared_state(&schema.initial_state) {
            return Err(RegistryError::UndeclaredInitialState {
                entity_type: schema.entity_type.clone(),
                state: schema.initial_state.clone(),
            });
        }
        if self.schemas.contains_key(&schema.entity_type) {
            return Err(RegistryError::DuplicateEntityType {
                entity_type: schema.entity_type,
            });
        }
        tracing::debug!(entity_type = %schema.entity_type, "registered entity type");
        self.schemas.insert(schema.entity_type.clone(), schema);
        Ok(self)
    }

    /// Register a transition definition for an entity type
    ///
    /// Fails when the entity type is unknown or the transition name is
    /// already taken for it.
    pub fn register_transition(
        &mut self,
        entity_type: &str,
        transition: impl Transition + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let name = transition.name().to_string();
        let Some(schema) = self.schemas.get_mut(entity_type) else {
            return Err(RegistryError::UnknownEntityType {
                entity_type: entity_type.to_string(),
                transition: name,
            });
        };
        if schema.transitions.contains_key(&name) {
            return Err(RegistryError::DuplicateTransition {
                entity_type: entity_type.to_string(),
                transition: name,
            });
        }
        tracing::debug!(entity_type, transition = %name, "registered transition");
        schema.transitions.insert(name, Arc::new(transition));
        Ok(self)
    }

    /// Freeze the builder into an immutable registry
    pub fn build(self) -> Registry {
        tracing::info!(entity_types = self.schemas.len(), "registry initialized");
        Registry {
            schemas: self.schemas,
        }
    }
}

/// Immutable, process-wide registry of entity types and transitions
///
/// Built once at startup and passed by reference (typically `Arc`) into
/// the engine — explicit object, no hidden global mutable state.
#[derive(Debug)]
pub struct Registry {
    schemas: BTreeMap<String, EntityTypeSchema>,
}

impl Registry {
    /// Look up the schema for an entity type
    pub fn resolve(&self, entity_type: &str) -> Option<&EntityTypeSchema> {
        self.schemas.get(entity_type)
    }

    /// Look up a transition definition
    pub fn resolve_transition(
        &self,
        entity_type: &str,
        name: &str,
    ) -> Option<&Arc<dyn Transition>> {
        self.schemas.get(entity_type).and_then(|s| s.transition(name))
    }

    /// All transitions registered for an entity type
    pub fn transitions_for(&self, entity_type: &str) -> Vec<&Arc<dyn Transition>> {
        self.schemas
            .get(entity_type)
            .map(|s| s.transitions().collect())
            .unwrap_or_default()
    }

    /// Registered entity type names, in sorted order
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_schema() -> EntityTypeSchema {
        EntityTypeSchema::new("order", ["CREATED", "PROCESSING", "SHIPPED"], "CREATED")
    }

    // ===== Schema =====

    #[test]
    fn test_schema_declared_states() {
        let schema = order_schema();
        assert!(schema.is_declared_state("CREATED"));
        assert!(!schema.is_declared_state("ARCHIVED"));
    }

    #[test]
    fn test_undeclared_initial_state_rejected() {
        let mut builder = RegistryBuilder::new();
        let schema = EntityTypeSchema::new("order", ["CREATED"], "OPEN");
        let result = builder.register_entity_type(schema);
        assert!(matches!(
            result,
            Err(RegistryError::UndeclaredInitialState { .. })
        ));
    }

    // ===== Registration =====

    #[test]
    fn test_duplicate_entity_type_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register_entity_type(order_schema()).unwrap();
        let result = builder.register_entity_type(order_schema());
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateEntityType { .. })
        ));
    }

    #[test]
    fn test_duplicate_transition_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register_entity_type(order_schema()).unwrap();
        builder
            .register_transition("order", FnTransition::to_state("create", "CREATED"))
            .unwrap();
        let result =
            builder.register_transition("order", FnTransition::to_state("create", "CREATED"));
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateTransition { .. })
        ));
    }

    #[test]
    fn test_transition_for_unknown_entity_type_rejected() {
        let mut builder = RegistryBuilder::new();
        let result =
            builder.register_transition("ghost", FnTransition::to_state("create", "CREATED"));
        assert!(matches!(
            result,
            Err(RegistryError::UnknownEntityType { .. })
        ));
    }

    // ===== Resolution =====

    #[test]
    fn test_resolve_schema_and_transition() {
        let mut builder = RegistryBuilder::new();
        builder.register_entity_type(order_schema()).unwrap();
        builder
            .register_transition(
                "order",
                FnTransition::to_state("process_order", "PROCESSING")
                    .from_states(["CREATED"], false),
            )
            .unwrap();
        let registry = builder.build();

        assert!(registry.resolve("order").is_some());
        assert!(registry.resolve("ghost").is_none());
        assert!(registry.resolve_transition("order", "process_order").is_some());
        assert!(registry.resolve_transition("order", "cancel").is_none());

        let names: Vec<_> = registry
            .resolve("order")
            .unwrap()
            .transition_names()
            .collect();
        assert_eq!(names, ["process_order"]);
    }

    // ===== FnTransition =====

    #[test]
    fn test_from_states_validation() {
        let transition =
            FnTransition::to_state("process_order", "PROCESSING").from_states(["CREATED"], false);

        let from_created = TransitionContext::new(
            Some("CREATED".to_string()),
            serde_json::Value::Null,
            None,
        );
        assert!(transition.validate(&from_created));

        let from_processing = TransitionContext::new(
            Some("PROCESSING".to_string()),
            serde_json::Value::Null,
            None,
        );
        assert!(!transition.validate(&from_processing));

        let initial = TransitionContext::new(None, serde_json::Value::Null, None);
        assert!(!transition.validate(&initial));
    }

    #[test]
    fn test_dynamic_target_and_effect() {
        let transition = FnTransition::to_state("route", "UNUSED")
            .with_target(|ctx| {
                if ctx.payload["expedite"].as_bool().unwrap_or(false) {
                    "EXPEDITED".to_string()
                } else {
                    "QUEUED".to_string()
                }
            })
            .with_effect(|ctx| {
                let mut meta = Metadata::new();
                meta.insert("routed_at".to_string(), serde_json::json!(ctx.now.to_rfc3339()));
                meta
            });

        let ctx = TransitionContext::new(None, serde_json::json!({"expedite": true}), None);
        assert_eq!(transition.target_state(&ctx), "EXPEDITED");
        assert!(transition.effect(&ctx).contains_key("routed_at"));
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        let mut builder = RegistryBuilder::new();
        builder.register_entity_type(order_schema()).unwrap();
        builder
            .register_transition("order", FnTransition::to_state("create", "CREATED"))
            .unwrap();
        let registry = std::sync::Arc::new(builder.build());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        assert!(registry.resolve_transition("order", "create").is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
