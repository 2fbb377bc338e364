//! Conformance helpers for the Kiln rule engine.
//!
//! Provides [`MemoScheduler`], a minimal in-memory scheduler that drives
//! compiled rules the way a real build database would (probe, compare,
//! reuse or execute, persist in encoded form), plus a small in-memory file
//! system kind for integration tests.

#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use kiln_rules::{
    apply, compile_with, produce, ArtifactKind, BoxError, BoxedAction, BuiltinRuleHandler, Dynamic,
    Equality, Resolve, RuleError, RuleKey, RuleSet, RuleTable,
};

/// A persisted result: the rule version it was built with and the encoded value.
#[derive(Debug, Clone)]
struct Stored {
    version: Option<u32>,
    value: Vec<u8>,
}

type StoreKey = (ArtifactKind, Vec<u8>);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory scheduler over a compiled rule table.
///
/// A stored value is reused when the kind's probe reports nothing or a state
/// the builtin handler compares as identical, and the matching rule's
/// version has not changed. Otherwise the kind's rule is executed and the
/// encoded result stored. Nothing is held locked while a rule runs, so
/// rules may call back into the scheduler.
pub struct MemoScheduler {
    table: Arc<RuleTable>,
    actions: Mutex<Vec<BoxedAction>>,
    store: Mutex<HashMap<StoreKey, Stored>>,
    lints: Mutex<Vec<String>>,
    executions: AtomicUsize,
}

impl MemoScheduler {
    /// Compiles `rules` with default settings and wraps the result.
    pub fn compile(rules: RuleSet) -> Result<Self, RuleError> {
        Self::compile_with(rules, &kiln_config::RulesConfig::default())
    }

    /// Compiles `rules` with explicit compiler settings.
    pub fn compile_with(
        rules: RuleSet,
        config: &kiln_config::RulesConfig,
    ) -> Result<Self, RuleError> {
        let compiled = compile_with(rules, config)?;
        Ok(Self {
            table: Arc::new(compiled.table),
            actions: Mutex::new(compiled.actions),
            store: Mutex::new(HashMap::new()),
            lints: Mutex::new(Vec::new()),
            executions: AtomicUsize::new(0),
        })
    }

    /// The compiled rule table.
    pub fn table(&self) -> &Arc<RuleTable> {
        &self.table
    }

    /// Runs the rule-set's actions in parallel, returning their failures.
    ///
    /// Actions run at most once; later calls find none left.
    pub fn run_actions(&self) -> Vec<BoxError> {
        let actions = std::mem::take(&mut *lock(&self.actions));
        actions
            .into_par_iter()
            .filter_map(|action| action().err())
            .collect()
    }

    /// Builds or reuses the value of a typed key.
    pub fn build<K: RuleKey>(&self, key: K) -> Result<K::Value, BoxError> {
        apply(self, key)
    }

    /// Number of rule executions so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Returns `true` if a value is stored for `key`.
    pub fn is_stored<K: RuleKey>(&self, key: &K) -> Result<bool, RuleError> {
        let store_key = self.store_key(ArtifactKind::of::<K>(), &Dynamic::new(key.clone()))?;
        Ok(lock(&self.store).contains_key(&store_key))
    }

    /// Forgets the stored value of `key`, forcing its rule to run again.
    pub fn invalidate<K: RuleKey>(&self, key: &K) -> Result<bool, RuleError> {
        let store_key = self.store_key(ArtifactKind::of::<K>(), &Dynamic::new(key.clone()))?;
        Ok(lock(&self.store).remove(&store_key).is_some())
    }

    /// Forgets every stored value.
    pub fn invalidate_all(&self) {
        lock(&self.store).clear();
    }

    /// Lint messages reported for freshly built values.
    pub fn lints(&self) -> Vec<String> {
        lock(&self.lints).clone()
    }

    fn store_key(&self, kind: ArtifactKind, key: &Dynamic) -> Result<StoreKey, RuleError> {
        let info = self.table.require(&kind)?;
        Ok((kind, info.encode_key(key)?))
    }

    fn reuse(
        &self,
        kind: ArtifactKind,
        key: &Dynamic,
        stored: &Stored,
    ) -> Result<Option<Dynamic>, RuleError> {
        let info = self.table.require(&kind)?;
        if info.version(key)? != stored.version {
            return Ok(None);
        }
        let old = info.decode_value(&stored.value)?;
        match info.probe(key)? {
            None => Ok(Some(old)),
            Some(current) => match info.compare(key, &old, &current)? {
                Equality::Identical { .. } => Ok(Some(old)),
                Equality::Different => Ok(None),
            },
        }
    }
}

impl Resolve for MemoScheduler {
    fn resolve(&self, kind: ArtifactKind, key: Dynamic) -> Result<Dynamic, BoxError> {
        let info = self.table.require(&kind)?;
        let store_key = self.store_key(kind, &key)?;
        let stored = lock(&self.store).get(&store_key).cloned();
        if let Some(stored) = stored {
            if let Some(value) = self.reuse(kind, &key, &stored)? {
                tracing::trace!(kind = %kind, key = ?key, "reusing stored value");
                return Ok(value);
            }
        }

        let version = info.version(&key)?;
        let value = info.execute(&key)?;
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = info.lint(&key, &value)? {
            lock(&self.lints).push(message);
        }
        let encoded = info.encode_value(&value)?;
        lock(&self.store).insert(
            store_key,
            Stored {
                version,
                value: encoded,
            },
        );
        Ok(value)
    }
}

/// Path of a file in a [`MemFs`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileKey(pub String);

impl FileKey {
    /// Creates a key for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl RuleKey for FileKey {
    type Value = String;
}

/// A shared in-memory file system.
#[derive(Debug, Default)]
pub struct MemFs {
    files: Mutex<HashMap<String, String>>,
}

impl MemFs {
    /// Creates an empty file system.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates or replaces a file.
    pub fn write(&self, path: &str, contents: &str) {
        lock(&self.files).insert(path.to_string(), contents.to_string());
    }

    /// Reads a file.
    pub fn read(&self, path: &str) -> Option<String> {
        lock(&self.files).get(path).cloned()
    }

    /// The rules of the [`FileKey`] kind over this file system: the builtin
    /// handler and a user rule reading the file.
    pub fn rules(self: &Arc<Self>) -> RuleSet {
        let fs = Arc::clone(self);
        let read = RuleSet::user_rule(move |key: &FileKey| {
            let fs = Arc::clone(&fs);
            let path = key.0.clone();
            Some(produce(move || {
                fs.read(&path)
                    .ok_or_else(|| format!("{path} does not exist").into())
            }))
        });
        RuleSet::builtin(MemFsHandler(Arc::clone(self))) + read
    }
}

/// Probes [`FileKey`]s against a [`MemFs`]; empty files are linted.
#[derive(Debug, Clone)]
pub struct MemFsHandler(pub Arc<MemFs>);

impl BuiltinRuleHandler<FileKey> for MemFsHandler {
    fn probe(&self, key: &FileKey) -> Option<String> {
        self.0.read(&key.0)
    }

    fn compare(&self, _key: &FileKey, old: &String, new: &String) -> Equality {
        Equality::from_eq(old == new, true)
    }

    fn lint(&self, key: &FileKey, value: &String) -> Option<String> {
        value.is_empty().then(|| format!("{} is empty", key.0))
    }

    fn identity(&self, _key: &FileKey, value: &String) -> Option<Vec<u8>> {
        Some(kiln_common::ContentHash::from_bytes(value.as_bytes()).to_string().into_bytes())
    }
}
