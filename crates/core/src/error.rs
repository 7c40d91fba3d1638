//! Error taxonomy for the state-tracking engine
//!
//! Every error that can change caller behavior is a distinct typed
//! variant, never a generic failure:
//!
//! | Code | Meaning | Retryable |
//! |------|---------|-----------|
//! | NotFound | Unknown entity type or transition name | No (fix the request) |
//! | InvalidTransition | Business-rule rejection | No (fix the request) |
//! | UndeclaredState | Computed target outside the schema's state set | No (fix the config) |
//! | Conflict | Optimistic concurrency loss | Yes (re-read and retry) |
//! | Storage | Backend append/read failure | Only with an idempotency key |
//!
//! Cache failures are deliberately not part of [`EngineError`]: the cache
//! is never load-bearing for safety, so [`CacheError`] is logged by the
//! engine and downgraded to a miss.

use crate::record::EntityRef;
use crate::record_id::RecordId;
use thiserror::Error;

/// Errors surfaced by state-store implementations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The backing datastore failed; the append outcome may be ambiguous
    #[error("storage backend failure: {message}")]
    Backend {
        /// Backend-specific description
        message: String,
    },

    /// The append precondition did not hold: a newer record was committed
    /// since the caller read the current state
    #[error("append precondition failed for {entity}: expected latest {expected:?}, found {actual:?}")]
    PreconditionFailed {
        /// Entity the append targeted
        entity: EntityRef,
        /// Latest id the caller observed (`None` = no history expected)
        expected: Option<RecordId>,
        /// Latest id actually in the store at append time
        actual: Option<RecordId>,
    },

    /// The record's idempotency key was already accepted for this entity
    #[error("duplicate append for {entity}: idempotency key already accepted as record {existing}")]
    Duplicate {
        /// Entity the append targeted
        entity: EntityRef,
        /// Id of the record that consumed the key
        existing: RecordId,
    },
}

/// Cache backend failure
///
/// Always non-fatal: callers treat it as a miss and fall back to the
/// store, which remains the source of truth.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cache backend failure: {message}")]
pub struct CacheError {
    /// Backend-specific description
    pub message: String,
}

impl CacheError {
    /// Create a cache error from any displayable cause
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Startup-time registration errors
///
/// The registry is built once during process initialization; every
/// variant here indicates a configuration bug and aborts the build.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// An entity type was registered twice
    #[error("entity type '{entity_type}' is already registered")]
    DuplicateEntityType {
        /// The conflicting registry key
        entity_type: String,
    },

    /// A transition name was registered twice for one entity type
    #[error("transition '{transition}' is already registered for entity type '{entity_type}'")]
    DuplicateTransition {
        /// The entity type the transition targets
        entity_type: String,
        /// The conflicting transition name
        transition: String,
    },

    /// A transition was registered for an entity type that does not exist
    #[error("cannot register transition '{transition}': unknown entity type '{entity_type}'")]
    UnknownEntityType {
        /// The missing entity type
        entity_type: String,
        /// The transition being registered
        transition: String,
    },

    /// A schema's initial state is not in its declared state set
    #[error("initial state '{state}' is not declared for entity type '{entity_type}'")]
    UndeclaredInitialState {
        /// The entity type with the broken schema
        entity_type: String,
        /// The undeclared state
        state: String,
    },
}

/// Errors surfaced by transition execution and state queries
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown entity type (not in the registry)
    #[error("unknown entity type: '{entity_type}'")]
    NotFound {
        /// The missing registry key
        entity_type: String,
    },

    /// Unknown transition name for a known entity type
    #[error("unknown transition '{transition}' for entity type '{entity_type}'")]
    UnknownTransition {
        /// The entity type that was resolved
        entity_type: String,
        /// The missing transition name
        transition: String,
    },

    /// The transition's `validate` rejected the current state
    #[error("transition '{transition}' is not allowed from state {from:?}")]
    InvalidTransition {
        /// State the entity was in when validation ran
        from: Option<String>,
        /// Name of the rejected transition
        transition: String,
    },

    /// The transition computed a target state outside the schema's set
    #[error("target state '{state}' is not declared for entity type '{entity_type}'")]
    UndeclaredState {
        /// The entity type whose schema was violated
        entity_type: String,
        /// The undeclared target state
        state: String,
    },

    /// A concurrent writer committed first; re-read and retry
    #[error("concurrent update detected for {entity}")]
    Conflict {
        /// The contended entity
        entity: EntityRef,
    },

    /// Backend failure, propagated unmodified and never auto-retried
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl EngineError {
    /// Canonical string code for wire encoding and logs
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } | EngineError::UnknownTransition { .. } => "NotFound",
            EngineError::InvalidTransition { .. } => "InvalidTransition",
            EngineError::UndeclaredState { .. } => "UndeclaredState",
            EngineError::Conflict { .. } => "Conflict",
            EngineError::Storage(_) => "Storage",
        }
    }

    /// Whether retrying the same call (after re-reading) can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}
