//! Error types for rule registration, compilation, and dispatch.

use kiln_common::InternalError;

/// A boxed error returned by user-supplied procedures and schedulers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while compiling a rule-set or dispatching a key.
///
/// All of these are configuration or logic errors: they are surfaced
/// synchronously and never retried. Dispatch errors fail only the key being
/// built.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Two builtin handlers were registered for one artifact kind.
    #[error("multiple builtin rules registered for artifact kind {kind}")]
    DuplicateBuiltinRule {
        /// The artifact kind with conflicting handlers.
        kind: String,
    },

    /// Several user rules match a key at the top priority.
    #[error("{count} user rules match key {key} of artifact kind {kind} at the top priority")]
    AmbiguousUserRule {
        /// The artifact kind being built.
        kind: String,
        /// Debug rendering of the key.
        key: String,
        /// Number of matches sharing the top priority.
        count: usize,
    },

    /// No user rule matches a key.
    #[error("no user rule matches key {key} of artifact kind {kind}")]
    NoMatchingUserRule {
        /// The artifact kind being built.
        kind: String,
        /// Debug rendering of the key.
        key: String,
    },

    /// A type-erased key or value did not hold the expected type.
    #[error("type mismatch: expected {expected}, got {got}")]
    KindMismatch {
        /// The type the caller asked for.
        expected: String,
        /// The type actually held by the envelope.
        got: String,
    },

    /// A rule-set was given a NaN or infinite priority.
    #[error("user rule priority {priority} is not finite")]
    InvalidPriority {
        /// The rejected priority.
        priority: f64,
    },

    /// No compiled rule exists for the requested artifact kind.
    #[error("no builtin rule registered for artifact kind {kind}")]
    UnknownKind {
        /// The requested artifact kind.
        kind: String,
    },

    /// A key or value could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The selected user rule ran and failed.
    #[error("rule for key {key} of artifact kind {kind} failed: {source}")]
    ActionFailed {
        /// The artifact kind being built.
        kind: String,
        /// Debug rendering of the key.
        key: String,
        /// The error returned by the procedure.
        source: BoxError,
    },

    /// A broken internal invariant.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_builtin_display() {
        let err = RuleError::DuplicateBuiltinRule {
            kind: "FileKey -> u64".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "multiple builtin rules registered for artifact kind FileKey -> u64"
        );
    }

    #[test]
    fn ambiguous_display() {
        let err = RuleError::AmbiguousUserRule {
            kind: "Obj".to_string(),
            key: "\"a.o\"".to_string(),
            count: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 user rules"));
        assert!(msg.contains("\"a.o\""));
    }

    #[test]
    fn action_failed_keeps_source() {
        let err = RuleError::ActionFailed {
            kind: "Obj".to_string(),
            key: "k".to_string(),
            source: "compiler crashed".into(),
        };
        assert!(err.to_string().ends_with("compiler crashed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn internal_is_transparent() {
        let err: RuleError = InternalError::new("bad envelope").into();
        assert_eq!(err.to_string(), "internal error: bad envelope");
    }
}
