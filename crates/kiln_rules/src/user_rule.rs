//! The user-rule algebra: how candidate procedures for one kind combine.
//!
//! A [`UserRule`] is a tree over an arbitrary payload. Matching a key
//! evaluates every leaf and yields prioritized matches; [`UserRule::Priority`]
//! and [`UserRule::Alternative`] are structural wrappers that only take effect
//! at match time.
//!
//! The algebra satisfies:
//!
//! * `priority(p1, priority(p2, r)) == priority(p1, r)` (the outer priority
//!   overwrites, it does not blend);
//! * `priority(p, group(a, b)) == group(priority(p, a), priority(p, b))`;
//! * `Group` is associative and commutative;
//! * `Alternative` is associative but not commutative: the first-listed
//!   match wins ties inside it.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, RuleError};
use crate::kind::{ArtifactKind, RuleKey};

/// Priority of a leaf match that no [`UserRule::Priority`] wrapper overrides.
pub const DEFAULT_PRIORITY: f64 = 1.0;

/// Orders two priorities the way selection ranks them.
///
/// `-0.0` equals `0.0` and NaN ranks with negative infinity, below every
/// finite priority.
pub fn compare_priority(a: f64, b: f64) -> Ordering {
    normalize_priority(a).total_cmp(&normalize_priority(b))
}

fn normalize_priority(p: f64) -> f64 {
    if p.is_nan() {
        f64::NEG_INFINITY
    } else {
        p + 0.0
    }
}

/// A deferred production procedure for one key.
pub type Action<V> = Box<dyn FnOnce() -> Result<V, BoxError> + Send>;

/// A user-rule payload: inspects a key and, if it applies, returns the
/// procedure that builds it.
pub type UserFn<K> = Arc<dyn Fn(&K) -> Option<Action<<K as RuleKey>::Value>> + Send + Sync>;

/// Boxes a procedure as an [`Action`].
pub fn produce<V, F>(procedure: F) -> Action<V>
where
    F: FnOnce() -> Result<V, BoxError> + Send + 'static,
{
    Box::new(procedure)
}

/// A combinator tree describing which payloads apply to which keys.
#[derive(Clone, Debug)]
pub enum UserRule<F> {
    /// A single payload, matching at [`DEFAULT_PRIORITY`].
    Leaf(F),
    /// The union of the children's matches.
    Group(Vec<UserRule<F>>),
    /// Overwrites the priority of every match of the child.
    Priority(f64, Box<UserRule<F>>),
    /// Keeps only the first of the child's top-priority matches.
    Alternative(Box<UserRule<F>>),
    /// Tags the child's matches with a rule version unless an inner
    /// wrapper already did.
    Versioned(u32, Box<UserRule<F>>),
}

impl<F> Default for UserRule<F> {
    fn default() -> Self {
        UserRule::Group(Vec::new())
    }
}

/// One matching payload result.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleMatch<T> {
    /// Effective priority of the match.
    pub priority: f64,
    /// Rule version, 0 when no [`UserRule::Versioned`] wrapper applies.
    pub version: u32,
    /// What the payload returned for the key.
    pub value: T,
}

impl<F> UserRule<F> {
    /// A single-payload rule.
    pub fn leaf(payload: F) -> Self {
        UserRule::Leaf(payload)
    }

    /// An unordered group of rules.
    pub fn group(children: impl IntoIterator<Item = UserRule<F>>) -> Self {
        UserRule::Group(children.into_iter().collect())
    }

    /// Wraps the rule in a priority, replacing an outer priority instead of
    /// nesting inside it.
    ///
    /// `-0.0` is stored as `0.0`.
    pub fn with_priority(self, priority: f64) -> Self {
        let priority = priority + 0.0;
        match self {
            UserRule::Priority(_, inner) => UserRule::Priority(priority, inner),
            other => UserRule::Priority(priority, Box::new(other)),
        }
    }

    /// Wraps the rule in an alternative.
    pub fn into_alternative(self) -> Self {
        UserRule::Alternative(Box::new(self))
    }

    /// Wraps the rule in a version tag.
    pub fn with_version(self, version: u32) -> Self {
        UserRule::Versioned(version, Box::new(self))
    }

    /// Groups two rules, flattening adjacent groups.
    pub fn combine(self, other: Self) -> Self {
        let mut children = match self {
            UserRule::Group(children) => children,
            single => vec![single],
        };
        match other {
            UserRule::Group(more) => children.extend(more),
            single => children.push(single),
        }
        UserRule::Group(children)
    }

    /// Number of payloads in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            UserRule::Leaf(_) => 1,
            UserRule::Group(children) => children.iter().map(UserRule::leaf_count).sum(),
            UserRule::Priority(_, inner)
            | UserRule::Alternative(inner)
            | UserRule::Versioned(_, inner) => inner.leaf_count(),
        }
    }

    /// Every match of the tree, in listing order.
    pub fn matches<T>(&self, mut f: impl FnMut(&F) -> Option<T>) -> Vec<RuleMatch<T>> {
        self.collect(&mut f)
            .into_iter()
            .map(|(priority, version, value)| RuleMatch {
                priority,
                version: version.unwrap_or(0),
                value,
            })
            .collect()
    }

    /// Matches grouped by priority, highest group first.
    ///
    /// Inside a group, matches keep their listing order.
    pub fn ranked<T>(&self, f: impl FnMut(&F) -> Option<T>) -> Vec<Vec<RuleMatch<T>>> {
        let mut matches = self.matches(f);
        matches.sort_by(|a, b| compare_priority(b.priority, a.priority));
        let mut groups: Vec<Vec<RuleMatch<T>>> = Vec::new();
        for m in matches {
            match groups.last_mut() {
                Some(group) if compare_priority(group[0].priority, m.priority).is_eq() => {
                    group.push(m)
                }
                _ => groups.push(vec![m]),
            }
        }
        groups
    }

    /// The matches sharing the highest priority, or none.
    pub fn top<T>(&self, f: impl FnMut(&F) -> Option<T>) -> Vec<RuleMatch<T>> {
        self.ranked(f).into_iter().next().unwrap_or_default()
    }

    fn collect<T>(
        &self,
        f: &mut dyn FnMut(&F) -> Option<T>,
    ) -> Vec<(f64, Option<u32>, T)> {
        match self {
            UserRule::Leaf(payload) => f(payload)
                .map(|value| vec![(DEFAULT_PRIORITY, None, value)])
                .unwrap_or_default(),
            UserRule::Group(children) => children.iter().flat_map(|c| c.collect(f)).collect(),
            UserRule::Priority(priority, inner) => inner
                .collect(f)
                .into_iter()
                .map(|(_, version, value)| (*priority, version, value))
                .collect(),
            UserRule::Versioned(version, inner) => inner
                .collect(f)
                .into_iter()
                .map(|(priority, v, value)| (priority, v.or(Some(*version)), value))
                .collect(),
            UserRule::Alternative(inner) => {
                let matches = inner.collect(f);
                let Some(best) = matches
                    .iter()
                    .map(|m| m.0)
                    .max_by(|a, b| compare_priority(*a, *b))
                else {
                    return Vec::new();
                };
                matches
                    .into_iter()
                    .find(|m| compare_priority(m.0, best).is_eq())
                    .into_iter()
                    .collect()
            }
        }
    }
}

/// The accumulated user rules of one artifact kind, with typed selection.
pub struct UserRules<K: RuleKey> {
    tree: UserRule<UserFn<K>>,
}

impl<K: RuleKey> UserRules<K> {
    /// Wraps a tree.
    pub fn new(tree: UserRule<UserFn<K>>) -> Self {
        Self { tree }
    }

    /// The underlying tree.
    pub fn tree(&self) -> &UserRule<UserFn<K>> {
        &self.tree
    }

    /// Unwraps the tree.
    pub fn into_tree(self) -> UserRule<UserFn<K>> {
        self.tree
    }

    /// Every top-priority match for `key`.
    pub fn all(&self, key: &K) -> Vec<RuleMatch<Action<K::Value>>> {
        self.tree.top(|f| f(key))
    }

    /// The single top-priority match for `key`, if any.
    ///
    /// Several matches at the top priority are an error.
    pub fn maybe(&self, key: &K) -> Result<Option<RuleMatch<Action<K::Value>>>, RuleError> {
        let mut top = self.all(key);
        tracing::trace!(
            kind = %ArtifactKind::of::<K>(),
            key = ?key,
            matches = top.len(),
            "matched user rules"
        );
        match top.len() {
            0 => Ok(None),
            1 => Ok(top.pop()),
            count => Err(RuleError::AmbiguousUserRule {
                kind: ArtifactKind::of::<K>().to_string(),
                key: format!("{key:?}"),
                count,
            }),
        }
    }

    /// The single top-priority match for `key`.
    ///
    /// No match and several matches are both errors.
    pub fn one(&self, key: &K) -> Result<RuleMatch<Action<K::Value>>, RuleError> {
        self.maybe(key)?
            .ok_or_else(|| RuleError::NoMatchingUserRule {
                kind: ArtifactKind::of::<K>().to_string(),
                key: format!("{key:?}"),
            })
    }
}

impl<K: RuleKey> Default for UserRules<K> {
    fn default() -> Self {
        Self::new(UserRule::default())
    }
}

impl<K: RuleKey> Clone for UserRules<K> {
    fn clone(&self) -> Self {
        Self::new(self.tree.clone())
    }
}

impl<K: RuleKey> fmt::Debug for UserRules<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRules")
            .field("kind", &ArtifactKind::of::<K>())
            .field("leaves", &self.tree.leaf_count())
            .finish()
    }
}
