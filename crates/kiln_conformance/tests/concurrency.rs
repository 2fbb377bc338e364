//! Concurrent use of compiled rules and the forward registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use kiln_conformance::{FileKey, MemFs, MemoScheduler};
use kiln_forward::{ForwardCache, ForwardSlot};
use kiln_rules::{compile, produce, BoxError, Resolve, RuleSet};
use rayon::prelude::*;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn compiled_rules_are_shareable() {
    assert_send_sync::<kiln_rules::RuleTable>();
    assert_send_sync::<kiln_rules::RuleInfo>();
    assert_send_sync::<MemoScheduler>();
    assert_send_sync::<kiln_forward::ForwardRegistry>();
}

#[test]
fn table_is_shared_across_threads() {
    let fs = MemFs::new();
    for i in 0..16 {
        fs.write(&format!("f{i}.c"), &format!("body {i}"));
    }
    let table = Arc::new(compile(fs.rules()).unwrap().table);
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let table = Arc::clone(&table);
            thread::spawn(move || table.execute(&FileKey::new(format!("f{i}.c"))).unwrap())
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!("body {i}"));
    }
}

#[test]
fn parallel_distinct_forwards_leave_no_entries() {
    let cache = ForwardCache::isolated();
    let s = MemoScheduler::compile(cache.rules()).unwrap();
    let results: Vec<u64> = (0..64u64)
        .into_par_iter()
        .map(|i| cache.cache_action(&s, i, move || Ok(i * i)).unwrap())
        .collect();
    assert_eq!(results, (0..64u64).map(|i| i * i).collect::<Vec<_>>());
    assert_eq!(s.executions(), 64);
    assert!(cache.registry().is_empty());
}

#[test]
fn parallel_same_identity_leaves_no_entries() {
    let cache = ForwardCache::isolated();
    let s = MemoScheduler::compile(cache.rules()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let results: Vec<String> = (0..32)
        .into_par_iter()
        .map(|_| {
            let runs = Arc::clone(&runs);
            cache
                .cache_action(&s, "shared", move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok("done".to_string())
                })
                .unwrap()
        })
        .collect();
    assert!(results.iter().all(|r| r == "done"));
    let runs = runs.load(Ordering::SeqCst);
    assert!((1..=32).contains(&runs), "{runs}");
    assert!(cache.registry().is_empty());
}

#[test]
fn aborted_caller_is_cleaned_up() {
    let cache = ForwardCache::isolated();
    let s = MemoScheduler::compile(cache.rules()).unwrap();
    let failed = thread::scope(|scope| {
        scope
            .spawn(|| {
                cache.cache_action::<_, u8, _>(&s, "aborted", || panic!("computation aborted"))
            })
            .join()
    });
    assert!(failed.is_err());
    assert!(cache.registry().is_empty());

    let value: u8 = cache.cache_action(&s, "aborted", || Ok(3)).unwrap();
    assert_eq!(value, 3);
}

#[test]
fn purge_releases_leftover_computations() {
    let cache = ForwardCache::isolated();
    let slot = ForwardSlot::for_identity(&"leftover").unwrap();
    let guard = cache
        .registry()
        .register(slot.clone(), Box::new(|| -> Result<ForwardSlot, BoxError> {
            Ok(ForwardSlot::for_value(&1u8)?)
        }));
    assert_eq!(cache.registry().purge(&slot), 1);
    assert!(cache.registry().is_empty());
    drop(guard);
    assert!(cache.registry().is_empty());
}

#[test]
fn keys_resolve_on_parallel_workers() {
    let fs = MemFs::new();
    fs.write("x", "1");
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let rules = fs.rules()
        + RuleSet::user_rule(move |key: &Len| {
            let counter = Arc::clone(&counter);
            let key = key.clone();
            Some(produce(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(key.0.len())
            }))
        })
        + RuleSet::builtin(kiln_rules::BuiltinFn::new(
            |_: &Len| None,
            |_: &Len, a: &usize, b: &usize| kiln_rules::Equality::from_eq(a == b, true),
        ));
    let s = MemoScheduler::compile(rules).unwrap();
    let lens: Vec<usize> = (0..8)
        .into_par_iter()
        .map(|i| kiln_rules::apply(&s as &dyn Resolve, Len("ab".repeat(i))).unwrap())
        .collect();
    assert_eq!(lens, (0..8).map(|i| 2 * i).collect::<Vec<_>>());
    assert_eq!(runs.load(Ordering::SeqCst), 8);
    assert_eq!(s.build(FileKey::new("x")).unwrap(), "1");
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
struct Len(String);

impl kiln_rules::RuleKey for Len {
    type Value = usize;
}
