//! Routing imperative computations through the scheduler.
//!
//! [`ForwardCache::rules`] contributes the [`ForwardSlot`] kind to a build's
//! rule-set: its builtin handler never recognizes stored state, so the
//! scheduler only reuses a slot's value when it knows the slot's own
//! dependencies are unchanged, and its single user rule runs whatever
//! computation is parked for the slot.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use kiln_config::{ConfigError, ForwardConfig};
use kiln_rules::{apply, produce, BoxError, BuiltinRuleHandler, Equality, Resolve, RuleSet};

use crate::command::{command_key, CommandLine};
use crate::error::ForwardError;
use crate::registry::{Computation, ForwardRegistry};
use crate::slot::ForwardSlot;

/// The builtin handler of the [`ForwardSlot`] kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardHandler;

impl BuiltinRuleHandler<ForwardSlot> for ForwardHandler {
    fn probe(&self, _key: &ForwardSlot) -> Option<ForwardSlot> {
        None
    }

    fn compare(&self, _key: &ForwardSlot, old: &ForwardSlot, new: &ForwardSlot) -> Equality {
        Equality::from_eq(old == new, true)
    }
}

/// Forwards computations through one registry.
#[derive(Clone)]
pub struct ForwardCache {
    registry: Arc<ForwardRegistry>,
    config: ForwardConfig,
}

impl ForwardCache {
    /// A cache over the process-wide registry.
    pub fn global() -> Self {
        Self::with_registry(ForwardRegistry::global())
    }

    /// A cache over a fresh registry of its own.
    pub fn isolated() -> Self {
        Self::with_registry(Arc::new(ForwardRegistry::new()))
    }

    /// A cache over `registry`.
    pub fn with_registry(registry: Arc<ForwardRegistry>) -> Self {
        Self {
            registry,
            config: ForwardConfig::default(),
        }
    }

    /// Replaces the forward configuration.
    ///
    /// Fails if `hash_digits` is outside `1..=32`.
    pub fn with_config(mut self, config: ForwardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// The registry computations are parked in.
    pub fn registry(&self) -> &Arc<ForwardRegistry> {
        &self.registry
    }

    /// The forward configuration.
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// The builtin handler and user rule of the [`ForwardSlot`] kind.
    ///
    /// Must be part of the compiled rule-set of any scheduler passed to
    /// [`cache_action`](Self::cache_action).
    pub fn rules(&self) -> RuleSet {
        let registry = Arc::clone(&self.registry);
        let run = RuleSet::user_rule(move |slot: &ForwardSlot| {
            let registry = Arc::clone(&registry);
            let slot = slot.clone();
            Some(produce(move || match registry.take(&slot) {
                Some(computation) => computation(),
                None => Err(ForwardError::ForwardSlotMissing {
                    key: slot.to_string(),
                }
                .into()),
            }))
        });
        RuleSet::builtin(ForwardHandler) + run
    }

    /// Memoizes `computation` under `identity`.
    ///
    /// The computation is parked, the scheduler is asked for the identity's
    /// slot, and the result is decoded as a `V`. The scheduler decides
    /// whether the computation actually runs; if it reuses a stored value
    /// the parked computation is discarded.
    pub fn cache_action<I, V, F>(
        &self,
        scheduler: &(impl Resolve + ?Sized),
        identity: I,
        computation: F,
    ) -> Result<V, ForwardError>
    where
        I: Serialize + fmt::Debug,
        V: Serialize + DeserializeOwned + fmt::Debug + 'static,
        F: FnOnce() -> Result<V, BoxError> + Send + 'static,
    {
        let slot = ForwardSlot::for_identity(&identity)?;
        let parked: Computation = Box::new(move || -> Result<ForwardSlot, BoxError> {
            let value = computation()?;
            Ok(ForwardSlot::for_value(&value)?)
        });
        let registration = self.registry.register(slot.clone(), parked);
        tracing::debug!(slot = %slot, "resolving forward slot");
        let result = apply(scheduler, slot).map_err(ForwardError::from_resolve);
        drop(registration);
        result?.decode::<V>()
    }

    /// Memoizes `run` under a key derived from `command`.
    ///
    /// The key is the command's first non-option argument after the program
    /// (`"unknown"` if there is none) followed by a hash of every token, so
    /// `gcc -O2 -c a.c` is cached as `a.c #<HASH>`.
    pub fn cache<V, F>(
        &self,
        scheduler: &(impl Resolve + ?Sized),
        command: &CommandLine,
        run: F,
    ) -> Result<V, ForwardError>
    where
        V: Serialize + DeserializeOwned + fmt::Debug + 'static,
        F: FnOnce(&CommandLine) -> Result<V, BoxError> + Send + 'static,
    {
        let key = command_key(command, self.config.hash_digits);
        let command = command.clone();
        self.cache_action(scheduler, key, move || run(&command))
    }
}

impl fmt::Debug for ForwardCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardCache")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// The [`ForwardSlot`] rules over the process-wide registry.
pub fn forward_rules() -> RuleSet {
    ForwardCache::global().rules()
}

/// [`ForwardCache::cache_action`] over the process-wide registry.
pub fn cache_action<I, V, F>(
    scheduler: &(impl Resolve + ?Sized),
    identity: I,
    computation: F,
) -> Result<V, ForwardError>
where
    I: Serialize + fmt::Debug,
    V: Serialize + DeserializeOwned + fmt::Debug + 'static,
    F: FnOnce() -> Result<V, BoxError> + Send + 'static,
{
    ForwardCache::global().cache_action(scheduler, identity, computation)
}

/// [`ForwardCache::cache`] over the process-wide registry.
pub fn cache<V, F>(
    scheduler: &(impl Resolve + ?Sized),
    command: &CommandLine,
    run: F,
) -> Result<V, ForwardError>
where
    V: Serialize + DeserializeOwned + fmt::Debug + 'static,
    F: FnOnce(&CommandLine) -> Result<V, BoxError> + Send + 'static,
{
    ForwardCache::global().cache(scheduler, command, run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_rules::{compile, ArtifactKind, Dynamic, RuleError, RuleTable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Executes every request, never reusing a value.
    struct Direct(RuleTable);

    impl Resolve for Direct {
        fn resolve(&self, kind: ArtifactKind, key: Dynamic) -> Result<Dynamic, BoxError> {
            Ok(self.0.require(&kind)?.execute(&key)?)
        }
    }

    fn direct(cache: &ForwardCache) -> Direct {
        Direct(compile(cache.rules()).unwrap().table)
    }

    #[test]
    fn zero_hash_digits_are_rejected() {
        let err = ForwardCache::isolated()
            .with_config(ForwardConfig { hash_digits: 0 })
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(ForwardCache::isolated()
            .with_config(ForwardConfig { hash_digits: 33 })
            .is_err());
    }

    #[test]
    fn commands_differing_in_options_run_separately() {
        let cache = ForwardCache::isolated()
            .with_config(ForwardConfig { hash_digits: 32 })
            .unwrap();
        let s = direct(&cache);
        let a: String = cache
            .cache(&s, &CommandLine::parse("gcc -O2 -c a.c"), |cmd| Ok(cmd.to_string()))
            .unwrap();
        let b: String = cache
            .cache(&s, &CommandLine::parse("gcc -O0 -c a.c"), |cmd| Ok(cmd.to_string()))
            .unwrap();
        assert_eq!(a, "gcc -O2 -c a.c");
        assert_eq!(b, "gcc -O0 -c a.c");
    }

    #[test]
    fn handler_never_probes() {
        let slot = ForwardSlot::for_identity(&1u8).unwrap();
        assert!(ForwardHandler.probe(&slot).is_none());
        assert!(ForwardHandler.compare(&slot, &slot, &slot).is_identical());
    }

    #[test]
    fn runs_parked_computation() {
        let cache = ForwardCache::isolated();
        let scheduler = direct(&cache);
        let value: Vec<String> = cache
            .cache_action(&scheduler, "objects", || Ok(vec!["a.o".to_string()]))
            .unwrap();
        assert_eq!(value, vec!["a.o".to_string()]);
        assert!(cache.registry().is_empty());
    }

    #[test]
    fn computation_failure_surfaces() {
        let cache = ForwardCache::isolated();
        let scheduler = direct(&cache);
        let err = cache
            .cache_action(&scheduler, 1u8, || Err::<u8, BoxError>("exit code 1".into()))
            .unwrap_err();
        assert!(matches!(err, ForwardError::Resolve(_)));
        assert!(err.to_string().contains("exit code 1"));
        assert!(cache.registry().is_empty());
    }

    #[test]
    fn executing_without_parked_computation_is_missing() {
        let cache = ForwardCache::isolated();
        let scheduler = direct(&cache);
        let slot = ForwardSlot::for_identity(&"orphan").unwrap();
        let err = apply(&scheduler, slot).unwrap_err();
        assert!(matches!(
            ForwardError::from_resolve(err),
            ForwardError::ForwardSlotMissing { .. }
        ));
    }

    #[test]
    fn cache_passes_the_command() {
        let cache = ForwardCache::isolated();
        let scheduler = direct(&cache);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let out: String = cache
            .cache(&scheduler, &CommandLine::parse("cc -c a.c"), move |cmd| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(cmd.to_string())
            })
            .unwrap();
        assert_eq!(out, "cc -c a.c");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn without_forward_rules_kind_is_unknown() {
        let cache = ForwardCache::isolated();
        let scheduler = Direct(RuleTable::default());
        let err = cache.cache_action(&scheduler, 0u8, || Ok(0u8)).unwrap_err();
        assert!(matches!(err, ForwardError::Rule(RuleError::UnknownKind { .. })));
        assert!(cache.registry().is_empty());
    }
}
