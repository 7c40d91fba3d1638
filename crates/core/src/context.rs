//! Context handed to transition implementations
//!
//! A [`TransitionContext`] is built by the engine for each execution and
//! passed read-only to `validate`, `target_state`, and `effect`.

use chrono::{DateTime, Utc};

/// Read-only context for one transition execution
#[derive(Debug, Clone)]
pub struct TransitionContext {
    /// Current state of the entity, `None` if it has no history yet
    pub current_state: Option<String>,
    /// Caller-supplied payload for this execution
    pub payload: serde_json::Value,
    /// Who or what is executing the transition
    pub actor: Option<String>,
    /// When the execution was initiated
    pub now: DateTime<Utc>,
}

impl TransitionContext {
    /// Build a context for the given inputs, stamped with the current time
    pub fn new(
        current_state: Option<String>,
        payload: serde_json::Value,
        actor: Option<String>,
    ) -> Self {
        Self {
            current_state,
            payload,
            actor,
            now: Utc::now(),
        }
    }

    /// Whether this would be the entity's first state record
    pub fn is_initial(&self) -> bool {
        self.current_state.is_none()
    }

    /// Current state as a string slice, if any
    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_context() {
        let ctx = TransitionContext::new(None, serde_json::Value::Null, None);
        assert!(ctx.is_initial());
        assert_eq!(ctx.current_state(), None);
    }

    #[test]
    fn test_context_with_state() {
        let ctx = TransitionContext::new(
            Some("CREATED".to_string()),
            serde_json::json!({"priority": 3}),
            Some("user:1".to_string()),
        );
        assert!(!ctx.is_initial());
        assert_eq!(ctx.current_state(), Some("CREATED"));
        assert_eq!(ctx.payload["priority"], 3);
    }
}
