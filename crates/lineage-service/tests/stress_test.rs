//! Stress Test - concurrent derived-sample inserts through the service
//!
//! Run with: cargo test --package lineage-service --test stress_test

use lineage_graph::ContainerId;
use lineage_service::{LineageConfig, LineageOptions, LineageService, Parent, RetryPolicy};
use lineage_test_utils::{gid, sample};
use std::time::{Duration, Instant};

#[test]
fn stress_test_retried_derivations() {
    println!("\n[STRESS TEST] 8 writers x 50 derived samples through the retrying write path...");

    let config = LineageConfig::default().with_retry(RetryPolicy::attempts(1000));
    let service = LineageService::new(config).unwrap();
    let container = ContainerId::new();
    let root = service.register_node(sample(0, "root", container)).unwrap();

    let start = Instant::now();
    std::thread::scope(|scope| {
        for writer in 0..8i64 {
            let service = &service;
            let root = &root;
            scope.spawn(move || {
                for i in 0..50i64 {
                    let row = 1 + writer * 1000 + i;
                    service
                        .insert_derived(
                            sample(row, &format!("w{writer}-{i}"), container),
                            &[Parent::new(root.object_id)],
                            None,
                        )
                        .unwrap();
                }
            });
        }
    });
    let duration = start.elapsed();

    let counts = service.write_stats();
    println!(
        "  Completed in {:.2}s: {} commit(s), {} retry(ies)",
        duration.as_secs_f64(),
        counts.commits,
        counts.retries
    );

    let lineage = service
        .get_lineage(&[gid("root")], &LineageOptions::children())
        .unwrap();
    assert_eq!(lineage.descendants.len(), 400);
    assert!(lineage.descendants.iter().all(|e| e.depth == 1));
    assert_eq!(counts.commits, 401);
    assert_eq!(counts.exhausted, 0);
    service.validate_graph().unwrap();
    assert!(
        duration < Duration::from_secs(10),
        "Stress test too slow: {:.2}s",
        duration.as_secs_f64()
    );

    println!("  ✓ Stress test passed\n");
}
