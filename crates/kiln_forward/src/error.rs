//! Error types for forward caching.

use kiln_rules::{BoxError, RuleError};

/// Errors raised while forwarding a computation through the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// A forward result decoded to a different type than the caller expects.
    ///
    /// Two call sites derived the same identity for computations of
    /// different result types.
    #[error("forward slot holds a {got}, expected a {expected}")]
    ForwardSlotTypeMismatch {
        /// The result type the caller asked for.
        expected: String,
        /// The type recorded in the slot.
        got: String,
    },

    /// A forward slot was executed with no parked computation.
    #[error("no computation registered for forward slot {key}")]
    ForwardSlotMissing {
        /// Display text of the slot.
        key: String,
    },

    /// An identity or result could not be encoded or decoded.
    #[error("forward serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The scheduler failed to resolve the slot.
    #[error("failed to resolve forward slot: {0}")]
    Resolve(#[source] BoxError),

    /// Dispatch of the slot failed.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl ForwardError {
    /// Recovers a structured error from a scheduler failure.
    ///
    /// Forward errors raised inside the slot's rule come back boxed, possibly
    /// wrapped in [`RuleError::ActionFailed`]; those are unwrapped so callers
    /// can match on them. Anything else is kept as [`ForwardError::Resolve`].
    pub fn from_resolve(err: BoxError) -> Self {
        let err = match err.downcast::<ForwardError>() {
            Ok(forward) => return *forward,
            Err(other) => other,
        };
        match err.downcast::<RuleError>() {
            Ok(rule) => match *rule {
                RuleError::ActionFailed { source, .. } => ForwardError::from_resolve(source),
                rule => ForwardError::Rule(rule),
            },
            Err(other) => ForwardError::Resolve(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_display() {
        let err = ForwardError::ForwardSlotTypeMismatch {
            expected: "i64".to_string(),
            got: "&str".to_string(),
        };
        assert_eq!(err.to_string(), "forward slot holds a &str, expected a i64");
    }

    #[test]
    fn missing_display() {
        let err = ForwardError::ForwardSlotMissing {
            key: "42".to_string(),
        };
        assert!(err.to_string().contains("forward slot 42"));
    }

    #[test]
    fn from_resolve_unwraps_action_failure() {
        let inner: BoxError = Box::new(ForwardError::ForwardSlotMissing {
            key: "k".to_string(),
        });
        let wrapped: BoxError = Box::new(RuleError::ActionFailed {
            kind: "ForwardSlot".to_string(),
            key: "k".to_string(),
            source: inner,
        });
        assert!(matches!(
            ForwardError::from_resolve(wrapped),
            ForwardError::ForwardSlotMissing { .. }
        ));
    }

    #[test]
    fn from_resolve_keeps_rule_errors() {
        let err: BoxError = Box::new(RuleError::UnknownKind {
            kind: "ForwardSlot".to_string(),
        });
        assert!(matches!(
            ForwardError::from_resolve(err),
            ForwardError::Rule(RuleError::UnknownKind { .. })
        ));
    }

    #[test]
    fn from_resolve_boxes_foreign_errors() {
        let err = ForwardError::from_resolve("compiler not found".into());
        match err {
            ForwardError::Resolve(source) => assert_eq!(source.to_string(), "compiler not found"),
            other => panic!("expected Resolve, got {other:?}"),
        }
    }
}
