use lineage_cache::{AncestorLookup, CacheError, ClosureCache, ClosureProvider, NoopClosureCache};
use lineage_graph::{EdgeFilter, GraphSource, NewEdge, TypeKey};
use lineage_test_utils::{derive, data, sample, Scenario, DATA_CLASS, PROTOCOL, SAMPLE_TYPE};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_unchanged_graph_reuses_table() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();

    let snapshot = scenario.store.snapshot();
    let first = cache.get_or_build(&snapshot, DATA_CLASS).unwrap();
    let again = cache.get_or_build(&scenario.store.snapshot(), DATA_CLASS).unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    let stats = cache.stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_ancestor_lookup_keeps_ambiguity() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    let table = cache
        .get_or_build(&scenario.store.snapshot(), DATA_CLASS)
        .unwrap();

    // bob has one sample ancestor, mike has two
    assert_eq!(
        table.lookup(scenario.bob.object_id, SAMPLE_TYPE),
        Some(AncestorLookup::Unique {
            node: scenario.s1.object_id,
            row_id: scenario.s1.row_id,
        })
    );
    assert_eq!(
        table.lookup(scenario.mike.object_id, SAMPLE_TYPE),
        Some(AncestorLookup::Ambiguous(2))
    );
    assert_eq!(
        table.lookup(scenario.mike.object_id, DATA_CLASS),
        Some(AncestorLookup::Ambiguous(2))
    );
    assert_eq!(table.lookup(scenario.bob.object_id, DATA_CLASS), None);
    assert_eq!(table.seed_count(), 3);
}

#[test]
fn test_new_edge_triggers_rebuild() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    let container = scenario.container;

    // A third root sample
    let s3 = scenario
        .store
        .transaction(|tx| tx.register(sample(3, "S-3", container)))
        .unwrap();
    let before = cache
        .get_or_build(&scenario.store.snapshot(), DATA_CLASS)
        .unwrap();
    assert_eq!(
        before.lookup(scenario.bob.object_id, SAMPLE_TYPE),
        Some(AncestorLookup::Unique {
            node: scenario.s1.object_id,
            row_id: scenario.s1.row_id,
        })
    );

    scenario
        .store
        .transaction(|tx| tx.add_edge(NewEdge::new(s3.object_id, scenario.bob.object_id)))
        .unwrap();

    let after = cache
        .get_or_build(&scenario.store.snapshot(), DATA_CLASS)
        .unwrap();
    assert_eq!(cache.stats().builds, 2);
    assert_eq!(
        after.lookup(scenario.bob.object_id, SAMPLE_TYPE),
        Some(AncestorLookup::Ambiguous(2))
    );
    // mike only changed through bob
    assert_eq!(
        after.lookup(scenario.mike.object_id, SAMPLE_TYPE),
        Some(AncestorLookup::Ambiguous(3))
    );
}

#[test]
fn test_grandchild_rebuild_after_upstream_removal() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    let store = &scenario.store;

    let table = cache.get_or_build(&store.snapshot(), DATA_CLASS).unwrap();
    assert_eq!(
        table.lookup(scenario.sally.object_id, SAMPLE_TYPE),
        Some(AncestorLookup::Ambiguous(2))
    );

    // Cut bob off from S-1; sally loses S-1 as an ancestor
    store
        .transaction(|tx| {
            Ok(tx.remove_edges(
                &EdgeFilter::new()
                    .from(scenario.s1.object_id)
                    .to(scenario.bob.object_id),
            ))
        })
        .unwrap();

    let table = cache.get_or_build(&store.snapshot(), DATA_CLASS).unwrap();
    assert_eq!(
        table.lookup(scenario.sally.object_id, SAMPLE_TYPE),
        Some(AncestorLookup::Unique {
            node: scenario.s2.object_id,
            row_id: scenario.s2.row_id,
        })
    );
}

#[test]
fn test_new_seed_changes_watermark() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    let store = &scenario.store;
    cache.get_or_build(&store.snapshot(), DATA_CLASS).unwrap();

    let container = scenario.container;
    let s1 = scenario.s1.clone();
    let zed = store
        .transaction(|tx| derive(tx, data(4, "zed", container), &[&s1], 4))
        .unwrap();

    let table = cache.get_or_build(&store.snapshot(), DATA_CLASS).unwrap();
    assert_eq!(table.seed_count(), 4);
    assert!(table.lookup(zed.object_id, SAMPLE_TYPE).is_some());
}

#[test]
fn test_stale_build_keeps_newer_table() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    let store = &scenario.store;
    let older = store.snapshot();

    let container = scenario.container;
    let s1 = scenario.s1.clone();
    store
        .transaction(|tx| derive(tx, data(4, "zed", container), &[&s1], 4))
        .unwrap();
    let newer = store.snapshot();
    assert!(newer.seq() > older.seq());

    let fresh = cache.get_or_build(&newer, DATA_CLASS).unwrap();
    let stale = cache.get_or_build(&older, DATA_CLASS).unwrap();
    assert_eq!(stale.built_at(), older.seq());
    assert_eq!(cache.stats().builds, 2);

    // The entry built at the newer commit is still the cached one
    let cached = cache.get_or_build(&newer, DATA_CLASS).unwrap();
    assert!(Arc::ptr_eq(&fresh, &cached));
    assert_eq!(cached.built_at(), newer.seq());
    assert_eq!(cache.stats().builds, 2);
}

#[test]
fn test_concurrent_requests_build_once() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    let snapshot = scenario.store.snapshot();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                cache.get_or_build(&snapshot, SAMPLE_TYPE).unwrap();
                cache.get_or_build(&snapshot, DATA_CLASS).unwrap();
            });
        }
    });

    let stats = cache.stats();
    assert_eq!(stats.builds, 2);
    assert_eq!(stats.hits, 14);
}

#[test]
fn test_invalidate_forces_rebuild() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    let snapshot = scenario.store.snapshot();

    cache.get_or_build(&snapshot, DATA_CLASS).unwrap();
    cache.invalidate(DATA_CLASS);
    cache.get_or_build(&snapshot, DATA_CLASS).unwrap();
    cache.invalidate_all();
    cache.get_or_build(&snapshot, DATA_CLASS).unwrap();

    assert_eq!(cache.stats().builds, 3);
}

#[test]
fn test_protocol_source_is_unsupported() {
    let scenario = Scenario::build();
    let cache = ClosureCache::default();
    assert_eq!(
        cache
            .get_or_build(&scenario.store.snapshot(), PROTOCOL)
            .unwrap_err(),
        CacheError::UnsupportedSource(PROTOCOL)
    );
    assert_eq!(
        cache
            .get_or_build(&scenario.store.snapshot(), TypeKey::DataClass(99))
            .map(|table| table.seed_count()),
        Ok(0)
    );
}

#[test]
fn test_noop_provider_always_rebuilds() {
    let scenario = Scenario::build();
    let cache = NoopClosureCache::new(20);
    let snapshot = scenario.store.snapshot();
    cache.get_or_build(&snapshot, DATA_CLASS).unwrap();
    cache.get_or_build(&snapshot, DATA_CLASS).unwrap();
    assert_eq!(cache.stats().builds, 2);
    assert_eq!(cache.stats().entry_count, 0);
}
