//! The rule-set builder: an order-insensitive accumulation of actions,
//! builtin handlers, and user rules.
//!
//! Rule-sets form a monoid: [`RuleSet::default`] is the identity and
//! [`RuleSet::merge`] (also `+`, [`Extend`], [`FromIterator`]) combines two
//! sets. Conflicting builtin registrations are recorded during merging and
//! reported by [`compile`](crate::compile()).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

use kiln_common::{InternalError, KilnResult};

use crate::builtin::BuiltinRuleHandler;
use crate::compile::{ErasedBuiltin, TypedBuiltin};
use crate::error::{BoxError, RuleError};
use crate::kind::{ArtifactKind, RuleKey};
use crate::user_rule::{UserRule, UserRules};

pub use crate::user_rule::{Action, UserFn};

/// A procedure run once per build regardless of what is requested.
pub type BoxedAction = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// A structural wrapper applied to every user-rule tree of a rule-set.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Wrapper {
    Priority(f64),
    Alternative,
    Versioned(u32),
}

/// The user rules of one kind with their concrete type hidden.
pub(crate) trait ErasedUserRule: Send + Sync {
    fn kind(&self) -> ArtifactKind;
    fn leaf_count(&self) -> usize;
    fn wrap(self: Box<Self>, wrapper: Wrapper) -> Box<dyn ErasedUserRule>;
    fn combine(
        self: Box<Self>,
        other: Box<dyn ErasedUserRule>,
    ) -> Result<Box<dyn ErasedUserRule>, RuleError>;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<K: RuleKey> ErasedUserRule for UserRules<K> {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::of::<K>()
    }

    fn leaf_count(&self) -> usize {
        self.tree().leaf_count()
    }

    fn wrap(self: Box<Self>, wrapper: Wrapper) -> Box<dyn ErasedUserRule> {
        let tree = self.into_tree();
        let tree = match wrapper {
            Wrapper::Priority(p) => tree.with_priority(p),
            Wrapper::Alternative => tree.into_alternative(),
            Wrapper::Versioned(v) => tree.with_version(v),
        };
        Box::new(UserRules::new(tree))
    }

    fn combine(
        self: Box<Self>,
        other: Box<dyn ErasedUserRule>,
    ) -> Result<Box<dyn ErasedUserRule>, RuleError> {
        let other = downcast_user_rules::<K>(other)?;
        Ok(Box::new(UserRules::new(
            self.into_tree().combine(other.into_tree()),
        )))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Recovers the typed user rules behind an erased record.
pub(crate) fn downcast_user_rules<K: RuleKey>(
    rules: Box<dyn ErasedUserRule>,
) -> KilnResult<UserRules<K>> {
    let kind = rules.kind();
    rules
        .into_any()
        .downcast::<UserRules<K>>()
        .map(|rules| *rules)
        .map_err(|_| {
            InternalError::new(format!(
                "user rules of {kind} used as {}",
                ArtifactKind::of::<K>()
            ))
        })
}

/// Accumulated actions, builtin handlers, and user rules.
///
/// Built incrementally, consumed once by [`compile`](crate::compile()).
#[derive(Default)]
pub struct RuleSet {
    actions: Vec<BoxedAction>,
    builtins: HashMap<ArtifactKind, Vec<Box<dyn ErasedBuiltin>>>,
    user_rules: HashMap<ArtifactKind, Box<dyn ErasedUserRule>>,
    errors: Vec<RuleError>,
}

/// The pieces of a rule-set handed to the compiler.
pub(crate) struct RuleSetParts {
    pub actions: Vec<BoxedAction>,
    pub builtins: HashMap<ArtifactKind, Vec<Box<dyn ErasedBuiltin>>>,
    pub user_rules: HashMap<ArtifactKind, Box<dyn ErasedUserRule>>,
    pub errors: Vec<RuleError>,
}

impl RuleSet {
    /// Creates an empty rule-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A rule-set holding only a builtin handler for `K`.
    pub fn builtin<K: RuleKey>(handler: impl BuiltinRuleHandler<K>) -> Self {
        let mut rules = Self::new();
        rules.add_builtin(handler);
        rules
    }

    /// A rule-set holding only one user rule for `K`.
    pub fn user_rule<K, F>(rule: F) -> Self
    where
        K: RuleKey,
        F: Fn(&K) -> Option<Action<K::Value>> + Send + Sync + 'static,
    {
        let mut rules = Self::new();
        rules.add_user_rule(rule);
        rules
    }

    /// Registers the builtin handler for `K`.
    ///
    /// A second handler for the same kind is reported at compile time.
    pub fn add_builtin<K: RuleKey>(&mut self, handler: impl BuiltinRuleHandler<K>) -> &mut Self {
        self.builtins
            .entry(ArtifactKind::of::<K>())
            .or_default()
            .push(Box::new(TypedBuiltin::new(handler)));
        self
    }

    /// Adds a user rule for `K` to the kind's group.
    pub fn add_user_rule<K, F>(&mut self, rule: F) -> &mut Self
    where
        K: RuleKey,
        F: Fn(&K) -> Option<Action<K::Value>> + Send + Sync + 'static,
    {
        let payload: UserFn<K> = Arc::new(rule);
        self.insert_user_rules(Box::new(UserRules::<K>::new(UserRule::leaf(payload))));
        self
    }

    /// Appends a procedure to run once per build; its result is discarded.
    pub fn add_action<T, F>(&mut self, procedure: F) -> &mut Self
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        self.actions.push(Box::new(move || procedure().map(|_| ())));
        self
    }

    /// Combines two rule-sets.
    pub fn merge(mut self, other: RuleSet) -> RuleSet {
        self.absorb(other);
        self
    }

    /// Wraps every user-rule tree in a priority, replacing any existing
    /// outer priority.
    ///
    /// A non-finite priority is reported at compile time.
    pub fn with_priority(mut self, priority: f64) -> Self {
        if !priority.is_finite() {
            self.errors.push(RuleError::InvalidPriority { priority });
            return self;
        }
        self.wrap_all(Wrapper::Priority(priority))
    }

    /// Wraps every user-rule tree in an alternative.
    pub fn into_alternatives(self) -> Self {
        self.wrap_all(Wrapper::Alternative)
    }

    /// Tags every user-rule tree with a rule version.
    pub fn with_version(self, version: u32) -> Self {
        self.wrap_all(Wrapper::Versioned(version))
    }

    /// Drops the actions, keeping every rule.
    pub fn without_actions(mut self) -> Self {
        self.actions.clear();
        self
    }

    /// Number of registered actions.
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if a builtin handler is registered for `K`.
    pub fn has_builtin<K: RuleKey>(&self) -> bool {
        self.builtins.contains_key(&ArtifactKind::of::<K>())
    }

    /// Number of user-rule payloads registered for `K`.
    pub fn user_rule_count<K: RuleKey>(&self) -> usize {
        self.user_rules
            .get(&ArtifactKind::of::<K>())
            .map_or(0, |rules| rules.leaf_count())
    }

    pub(crate) fn into_parts(self) -> RuleSetParts {
        RuleSetParts {
            actions: self.actions,
            builtins: self.builtins,
            user_rules: self.user_rules,
            errors: self.errors,
        }
    }

    fn absorb(&mut self, other: RuleSet) {
        self.actions.extend(other.actions);
        for (kind, handlers) in other.builtins {
            self.builtins.entry(kind).or_default().extend(handlers);
        }
        for (_, rules) in other.user_rules {
            self.insert_user_rules(rules);
        }
        self.errors.extend(other.errors);
    }

    fn insert_user_rules(&mut self, rules: Box<dyn ErasedUserRule>) {
        let kind = rules.kind();
        let combined = match self.user_rules.remove(&kind) {
            Some(existing) => existing.combine(rules),
            None => Ok(rules),
        };
        match combined {
            Ok(rules) => {
                self.user_rules.insert(kind, rules);
            }
            Err(err) => self.errors.push(err),
        }
    }

    fn wrap_all(mut self, wrapper: Wrapper) -> Self {
        self.user_rules = self
            .user_rules
            .into_iter()
            .map(|(kind, rules)| (kind, rules.wrap(wrapper)))
            .collect();
        self
    }
}

impl Add for RuleSet {
    type Output = RuleSet;

    fn add(self, other: RuleSet) -> RuleSet {
        self.merge(other)
    }
}

impl AddAssign for RuleSet {
    fn add_assign(&mut self, other: RuleSet) {
        self.absorb(other);
    }
}

impl Extend<RuleSet> for RuleSet {
    fn extend<I: IntoIterator<Item = RuleSet>>(&mut self, iter: I) {
        for rules in iter {
            self.absorb(rules);
        }
    }
}

impl FromIterator<RuleSet> for RuleSet {
    fn from_iter<I: IntoIterator<Item = RuleSet>>(iter: I) -> Self {
        let mut rules = RuleSet::new();
        rules.extend(iter);
        rules
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builtins: Vec<String> = self.builtins.keys().map(|k| k.to_string()).collect();
        builtins.sort();
        let mut user_rules: Vec<String> =
            self.user_rules.keys().map(|k| k.to_string()).collect();
        user_rules.sort();
        f.debug_struct("RuleSet")
            .field("actions", &self.actions.len())
            .field("builtins", &builtins)
            .field("user_rules", &user_rules)
            .finish()
    }
}

/// Gives every user rule in `rules` the priority `p`.
pub fn priority(p: f64, rules: RuleSet) -> RuleSet {
    rules.with_priority(p)
}

/// Makes the user rules of each kind in `rules` first-match alternatives.
pub fn alternatives(rules: RuleSet) -> RuleSet {
    rules.into_alternatives()
}

/// Tags every user rule in `rules` with `version`.
pub fn versioned(version: u32, rules: RuleSet) -> RuleSet {
    rules.with_version(version)
}

/// A rule-set holding one action.
pub fn action<T, F>(procedure: F) -> RuleSet
where
    F: FnOnce() -> Result<T, BoxError> + Send + 'static,
{
    let mut rules = RuleSet::new();
    rules.add_action(procedure);
    rules
}

/// Drops the actions of `rules`, keeping its rules importable.
pub fn without_actions(rules: RuleSet) -> RuleSet {
    rules.without_actions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{BuiltinFn, Equality};
    use crate::user_rule::produce;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    struct Obj(String);

    impl RuleKey for Obj {
        type Value = String;
    }

    fn obj_builtin() -> RuleSet {
        RuleSet::builtin(BuiltinFn::new(
            |_: &Obj| None,
            |_: &Obj, a: &String, b: &String| Equality::from_eq(a == b, true),
        ))
    }

    fn obj_rule(output: &'static str) -> RuleSet {
        RuleSet::user_rule(move |_: &Obj| Some(produce(move || Ok(output.to_string()))))
    }

    #[test]
    fn empty_is_identity() {
        let rules = RuleSet::new() + obj_rule("a") + RuleSet::default();
        assert_eq!(rules.user_rule_count::<Obj>(), 1);
        assert_eq!(rules.action_count(), 0);
        assert!(!rules.has_builtin::<Obj>());
    }

    #[test]
    fn user_rules_accumulate() {
        let rules: RuleSet = [obj_rule("a"), obj_rule("b"), obj_rule("c")]
            .into_iter()
            .collect();
        assert_eq!(rules.user_rule_count::<Obj>(), 3);
    }

    #[test]
    fn actions_concatenate() {
        let mut rules = action(|| Ok(1)) + action(|| Ok("ignored"));
        rules += action(|| Ok(()));
        assert_eq!(rules.action_count(), 3);
    }

    #[test]
    fn without_actions_keeps_rules() {
        let rules = without_actions(action(|| Ok(())) + obj_builtin() + obj_rule("a"));
        assert_eq!(rules.action_count(), 0);
        assert!(rules.has_builtin::<Obj>());
        assert_eq!(rules.user_rule_count::<Obj>(), 1);
    }

    #[test]
    fn wrappers_preserve_leaves() {
        let rules = alternatives(priority(2.0, versioned(3, obj_rule("a") + obj_rule("b"))));
        assert_eq!(rules.user_rule_count::<Obj>(), 2);
    }

    #[test]
    fn non_finite_priority_fails_compile() {
        for p in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = crate::compile(obj_builtin() + priority(p, obj_rule("a"))).unwrap_err();
            assert!(matches!(err, RuleError::InvalidPriority { .. }), "{err}");
        }
    }

    #[test]
    fn signed_zero_priorities_are_ambiguous() {
        let rules = obj_builtin() + priority(0.0, obj_rule("a")) + priority(-0.0, obj_rule("b"));
        let compiled = crate::compile(rules).unwrap();
        let err = compiled.table.execute(&Obj("x".to_string())).unwrap_err();
        assert!(matches!(err, RuleError::AmbiguousUserRule { count: 2, .. }), "{err}");
    }

    #[test]
    fn debug_lists_kinds() {
        let rules = obj_builtin() + obj_rule("a");
        let text = format!("{rules:?}");
        assert!(text.contains("actions: 0"));
        assert!(text.contains("Obj"));
    }
}
