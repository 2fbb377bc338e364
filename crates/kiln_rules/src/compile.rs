//! The rule compiler: per-kind, type-erased dispatch records.
//!
//! [`compile`] pairs each kind's builtin handler with the kind's accumulated
//! user rules and produces one [`RuleInfo`] per kind. A scheduler drives
//! these through [`Dynamic`] envelopes without knowing the concrete key or
//! value types; every envelope is type-checked at the boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kiln_config::RulesConfig;

use crate::builtin::{BuiltinRuleHandler, Equality};
use crate::codec;
use crate::dynamic::Dynamic;
use crate::error::RuleError;
use crate::kind::{ArtifactKind, RuleKey, ValueKind};
use crate::rule_set::{downcast_user_rules, BoxedAction, ErasedUserRule, RuleSet};
use crate::user_rule::{Action, RuleMatch, UserRules};

/// A builtin handler with its key type hidden.
pub(crate) trait ErasedBuiltin: Send + Sync {
    fn compile(
        self: Box<Self>,
        rules: Option<Box<dyn ErasedUserRule>>,
        config: &RulesConfig,
    ) -> Result<RuleInfo, RuleError>;
}

pub(crate) struct TypedBuiltin<K: RuleKey> {
    handler: Arc<dyn BuiltinRuleHandler<K>>,
}

impl<K: RuleKey> TypedBuiltin<K> {
    pub(crate) fn new(handler: impl BuiltinRuleHandler<K>) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<K: RuleKey> ErasedBuiltin for TypedBuiltin<K> {
    fn compile(
        self: Box<Self>,
        rules: Option<Box<dyn ErasedUserRule>>,
        config: &RulesConfig,
    ) -> Result<RuleInfo, RuleError> {
        let kind = ArtifactKind::of::<K>();
        let rules = match rules {
            Some(rules) => downcast_user_rules::<K>(rules)?,
            None => UserRules::default(),
        };
        let user_rules = rules.tree().leaf_count();
        Ok(RuleInfo {
            kind,
            user_rules,
            lint: config.lint,
            rule: Box::new(CompiledRule {
                handler: self.handler,
                rules,
            }),
        })
    }
}

/// The typed operations behind a [`RuleInfo`].
trait ErasedRule: Send + Sync {
    fn probe(&self, key: &Dynamic) -> Result<Option<Dynamic>, RuleError>;
    fn compare(&self, key: &Dynamic, old: &Dynamic, new: &Dynamic)
        -> Result<Equality, RuleError>;
    fn execute(&self, key: &Dynamic) -> Result<Dynamic, RuleError>;
    fn execute_maybe(&self, key: &Dynamic) -> Result<Option<Dynamic>, RuleError>;
    fn version(&self, key: &Dynamic) -> Result<Option<u32>, RuleError>;
    fn lint(&self, key: &Dynamic, value: &Dynamic) -> Result<Option<String>, RuleError>;
    fn identity(&self, key: &Dynamic, value: &Dynamic) -> Result<Option<Vec<u8>>, RuleError>;
    fn encode_key(&self, key: &Dynamic) -> Result<Vec<u8>, RuleError>;
    fn decode_key(&self, bytes: &[u8]) -> Result<Dynamic, RuleError>;
    fn encode_value(&self, value: &Dynamic) -> Result<Vec<u8>, RuleError>;
    fn decode_value(&self, bytes: &[u8]) -> Result<Dynamic, RuleError>;
}

struct CompiledRule<K: RuleKey> {
    handler: Arc<dyn BuiltinRuleHandler<K>>,
    rules: UserRules<K>,
}

impl<K: RuleKey> CompiledRule<K> {
    fn run(&self, key: &K, selected: RuleMatch<Action<K::Value>>) -> Result<Dynamic, RuleError> {
        tracing::debug!(
            kind = %ArtifactKind::of::<K>(),
            key = ?key,
            priority = selected.priority,
            version = selected.version,
            "running user rule"
        );
        let value = (selected.value)().map_err(|source| RuleError::ActionFailed {
            kind: ArtifactKind::of::<K>().to_string(),
            key: format!("{key:?}"),
            source,
        })?;
        Ok(Dynamic::new(value))
    }
}

impl<K: RuleKey> ErasedRule for CompiledRule<K> {
    fn probe(&self, key: &Dynamic) -> Result<Option<Dynamic>, RuleError> {
        let key = key.downcast_ref::<K>()?;
        Ok(self.handler.probe(key).map(Dynamic::new))
    }

    fn compare(
        &self,
        key: &Dynamic,
        old: &Dynamic,
        new: &Dynamic,
    ) -> Result<Equality, RuleError> {
        Ok(self.handler.compare(
            key.downcast_ref::<K>()?,
            old.downcast_ref::<K::Value>()?,
            new.downcast_ref::<K::Value>()?,
        ))
    }

    fn execute(&self, key: &Dynamic) -> Result<Dynamic, RuleError> {
        let key = key.downcast_ref::<K>()?;
        let selected = self.rules.one(key)?;
        self.run(key, selected)
    }

    fn execute_maybe(&self, key: &Dynamic) -> Result<Option<Dynamic>, RuleError> {
        let key = key.downcast_ref::<K>()?;
        match self.rules.maybe(key)? {
            Some(selected) => self.run(key, selected).map(Some),
            None => Ok(None),
        }
    }

    fn version(&self, key: &Dynamic) -> Result<Option<u32>, RuleError> {
        let key = key.downcast_ref::<K>()?;
        Ok(self.rules.maybe(key)?.map(|m| m.version))
    }

    fn lint(&self, key: &Dynamic, value: &Dynamic) -> Result<Option<String>, RuleError> {
        Ok(self
            .handler
            .lint(key.downcast_ref::<K>()?, value.downcast_ref::<K::Value>()?))
    }

    fn identity(&self, key: &Dynamic, value: &Dynamic) -> Result<Option<Vec<u8>>, RuleError> {
        Ok(self
            .handler
            .identity(key.downcast_ref::<K>()?, value.downcast_ref::<K::Value>()?))
    }

    fn encode_key(&self, key: &Dynamic) -> Result<Vec<u8>, RuleError> {
        codec::encode(key.downcast_ref::<K>()?)
    }

    fn decode_key(&self, bytes: &[u8]) -> Result<Dynamic, RuleError> {
        Ok(Dynamic::new(codec::decode::<K>(bytes)?))
    }

    fn encode_value(&self, value: &Dynamic) -> Result<Vec<u8>, RuleError> {
        codec::encode(value.downcast_ref::<K::Value>()?)
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Dynamic, RuleError> {
        Ok(Dynamic::new(codec::decode::<K::Value>(bytes)?))
    }
}

/// The compiled dispatch record of one artifact kind.
///
/// Immutable once built and safe to share across worker threads.
pub struct RuleInfo {
    kind: ArtifactKind,
    user_rules: usize,
    lint: bool,
    rule: Box<dyn ErasedRule>,
}

impl RuleInfo {
    /// The artifact kind this record dispatches.
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// The value type produced by this kind.
    pub fn value_kind(&self) -> ValueKind {
        self.kind.value_kind()
    }

    /// Number of user-rule payloads compiled into this record.
    pub fn user_rule_count(&self) -> usize {
        self.user_rules
    }

    /// Observes the current state of `key` through the builtin handler.
    pub fn probe(&self, key: &Dynamic) -> Result<Option<Dynamic>, RuleError> {
        self.rule.probe(key)
    }

    /// Compares two states of `key` through the builtin handler.
    pub fn compare(
        &self,
        key: &Dynamic,
        old: &Dynamic,
        new: &Dynamic,
    ) -> Result<Equality, RuleError> {
        self.rule.compare(key, old, new)
    }

    /// Selects the single matching user rule for `key` and runs it.
    ///
    /// Fails with [`RuleError::NoMatchingUserRule`] when nothing matches and
    /// [`RuleError::AmbiguousUserRule`] when several rules tie at the top
    /// priority.
    pub fn execute(&self, key: &Dynamic) -> Result<Dynamic, RuleError> {
        self.rule.execute(key)
    }

    /// Like [`execute`](Self::execute), but no match yields `Ok(None)`.
    pub fn execute_maybe(&self, key: &Dynamic) -> Result<Option<Dynamic>, RuleError> {
        self.rule.execute_maybe(key)
    }

    /// Version of the user rule that would build `key`, if one matches.
    pub fn version(&self, key: &Dynamic) -> Result<Option<u32>, RuleError> {
        self.rule.version(key)
    }

    /// Returns `true` if lint hooks are enabled for this record.
    pub fn lint_enabled(&self) -> bool {
        self.lint
    }

    /// Runs the builtin lint hook on a freshly built value.
    ///
    /// Always `Ok(None)` when lint is disabled in the rules configuration.
    pub fn lint(&self, key: &Dynamic, value: &Dynamic) -> Result<Option<String>, RuleError> {
        if !self.lint {
            return Ok(None);
        }
        self.rule.lint(key, value)
    }

    /// A stable identity of `value` from the builtin handler, if it has one.
    pub fn identity(&self, key: &Dynamic, value: &Dynamic) -> Result<Option<Vec<u8>>, RuleError> {
        self.rule.identity(key, value)
    }

    /// Encodes a key of this kind.
    pub fn encode_key(&self, key: &Dynamic) -> Result<Vec<u8>, RuleError> {
        self.rule.encode_key(key)
    }

    /// Decodes a key of this kind.
    pub fn decode_key(&self, bytes: &[u8]) -> Result<Dynamic, RuleError> {
        self.rule.decode_key(bytes)
    }

    /// Encodes a value of this kind.
    pub fn encode_value(&self, value: &Dynamic) -> Result<Vec<u8>, RuleError> {
        self.rule.encode_value(value)
    }

    /// Decodes a value of this kind.
    pub fn decode_value(&self, bytes: &[u8]) -> Result<Dynamic, RuleError> {
        self.rule.decode_value(bytes)
    }
}

impl fmt::Debug for RuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleInfo")
            .field("kind", &self.kind)
            .field("user_rules", &self.user_rules)
            .field("lint", &self.lint)
            .finish()
    }
}

/// Compiled records for every schedulable artifact kind.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: HashMap<ArtifactKind, RuleInfo>,
}

impl RuleTable {
    /// The record for `kind`, if compiled.
    pub fn get(&self, kind: &ArtifactKind) -> Option<&RuleInfo> {
        self.rules.get(kind)
    }

    /// The record for `kind`, or [`RuleError::UnknownKind`].
    pub fn require(&self, kind: &ArtifactKind) -> Result<&RuleInfo, RuleError> {
        self.rules.get(kind).ok_or_else(|| RuleError::UnknownKind {
            kind: kind.to_string(),
        })
    }

    /// Returns `true` if `kind` has a compiled record.
    pub fn contains(&self, kind: &ArtifactKind) -> bool {
        self.rules.contains_key(kind)
    }

    /// Number of compiled kinds.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if no kind was compiled.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over the compiled kinds in unspecified order.
    pub fn kinds(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        self.rules.keys().copied()
    }

    /// Iterates over the compiled records in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactKind, &RuleInfo)> {
        self.rules.iter()
    }

    /// Probes a typed key.
    pub fn probe<K: RuleKey>(&self, key: &K) -> Result<Option<K::Value>, RuleError> {
        self.require(&ArtifactKind::of::<K>())?
            .probe(&Dynamic::new(key.clone()))?
            .map(|value| value.downcast::<K::Value>())
            .transpose()
    }

    /// Executes a typed key.
    pub fn execute<K: RuleKey>(&self, key: &K) -> Result<K::Value, RuleError> {
        self.require(&ArtifactKind::of::<K>())?
            .execute(&Dynamic::new(key.clone()))?
            .downcast::<K::Value>()
    }
}

/// The output of [`compile`]: the dispatch table and the build's actions.
pub struct CompiledRules {
    /// Per-kind dispatch records.
    pub table: RuleTable,
    /// Procedures to run once per build.
    pub actions: Vec<BoxedAction>,
}

impl fmt::Debug for CompiledRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRules")
            .field("table", &self.table)
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// Compiles a rule-set with the default rules configuration.
pub fn compile(rules: RuleSet) -> Result<CompiledRules, RuleError> {
    compile_with(rules, &RulesConfig::default())
}

/// Compiles a rule-set into per-kind dispatch records.
///
/// Fails with [`RuleError::DuplicateBuiltinRule`] if any kind has two
/// builtin handlers. User rules for kinds without a builtin handler are
/// dropped: they can never be scheduled.
pub fn compile_with(rules: RuleSet, config: &RulesConfig) -> Result<CompiledRules, RuleError> {
    let parts = rules.into_parts();
    if let Some(err) = parts.errors.into_iter().next() {
        return Err(err);
    }

    let mut duplicates: Vec<String> = parts
        .builtins
        .iter()
        .filter(|(_, handlers)| handlers.len() > 1)
        .map(|(kind, _)| kind.to_string())
        .collect();
    duplicates.sort();
    if let Some(kind) = duplicates.into_iter().next() {
        return Err(RuleError::DuplicateBuiltinRule { kind });
    }

    let mut user_rules = parts.user_rules;
    let mut table = HashMap::with_capacity(parts.builtins.len());
    for (kind, handlers) in parts.builtins {
        let Some(handler) = handlers.into_iter().next() else {
            continue;
        };
        let info = handler.compile(user_rules.remove(&kind), config)?;
        table.insert(kind, info);
    }
    for kind in user_rules.keys() {
        tracing::debug!(kind = %kind, "dropping user rules of a kind without a builtin rule");
    }
    tracing::debug!(
        kinds = table.len(),
        actions = parts.actions.len(),
        "compiled rule-set"
    );

    Ok(CompiledRules {
        table: RuleTable { rules: table },
        actions: parts.actions,
    })
}
