//! Builtin rule handlers: how an artifact kind is probed and compared.

use std::marker::PhantomData;

use crate::kind::RuleKey;

/// Outcome of comparing two states of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    /// The states are the same. `cheap` is a cost hint: the comparison was
    /// cheap enough that the scheduler may skip extra downstream checks.
    Identical {
        /// Whether the comparison was cheap.
        cheap: bool,
    },
    /// The states differ.
    Different,
}

impl Equality {
    /// Builds an equality from a boolean comparison.
    pub fn from_eq(equal: bool, cheap: bool) -> Self {
        if equal {
            Equality::Identical { cheap }
        } else {
            Equality::Different
        }
    }

    /// Returns `true` for either flavor of [`Equality::Identical`].
    pub fn is_identical(self) -> bool {
        matches!(self, Equality::Identical { .. })
    }
}

/// The single probe/compare handler registered for one artifact kind.
///
/// Handlers are shared read-only across worker threads for a build's
/// duration.
pub trait BuiltinRuleHandler<K: RuleKey>: Send + Sync + 'static {
    /// Observes the current state of `key`, or `None` when it is unknown.
    fn probe(&self, key: &K) -> Option<K::Value>;

    /// Compares a stored state with another state of the same key.
    fn compare(&self, key: &K, old: &K::Value, new: &K::Value) -> Equality;

    /// Checks a freshly built value, returning a description of any problem.
    fn lint(&self, _key: &K, _value: &K::Value) -> Option<String> {
        None
    }

    /// A stable identity of the value for sharing results across machines.
    fn identity(&self, _key: &K, _value: &K::Value) -> Option<Vec<u8>> {
        None
    }
}

/// A handler assembled from a probe closure and a compare closure.
pub struct BuiltinFn<K, P, C> {
    probe: P,
    compare: C,
    _key: PhantomData<fn(&K)>,
}

impl<K, P, C> BuiltinFn<K, P, C>
where
    K: RuleKey,
    P: Fn(&K) -> Option<K::Value> + Send + Sync + 'static,
    C: Fn(&K, &K::Value, &K::Value) -> Equality + Send + Sync + 'static,
{
    /// Creates a handler from the two closures.
    pub fn new(probe: P, compare: C) -> Self {
        Self {
            probe,
            compare,
            _key: PhantomData,
        }
    }
}

impl<K, P, C> BuiltinRuleHandler<K> for BuiltinFn<K, P, C>
where
    K: RuleKey,
    P: Fn(&K) -> Option<K::Value> + Send + Sync + 'static,
    C: Fn(&K, &K::Value, &K::Value) -> Equality + Send + Sync + 'static,
{
    fn probe(&self, key: &K) -> Option<K::Value> {
        (self.probe)(key)
    }

    fn compare(&self, key: &K, old: &K::Value, new: &K::Value) -> Equality {
        (self.compare)(key, old, new)
    }
}
