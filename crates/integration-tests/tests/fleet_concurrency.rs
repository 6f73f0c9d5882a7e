// Concurrency: operator commands interleaved with the scaling loop, and
// shutdown escalation under the single fleet lock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use queueherd_core::application::Fleet;
use queueherd_core::port::process::mocks::{MockProcessSpawner, TermBehavior};
use queueherd_core::port::time_provider::SystemTimeProvider;
use queueherd_core::port::{ProcessSpawner, TimeProvider};
use queueherd_integration_tests::{scenario_config, Harness};

#[tokio::test]
async fn interleaved_operator_and_autoscaler_respect_bounds() {
    // Deep queue: the loop wants to grow while the operator pushes both ways
    let harness = Harness::new(1, 5, vec![Ok(100)]);
    harness.warm_up(2).await;

    let fleet = Arc::clone(&harness.fleet);
    let mut tasks = JoinSet::new();
    for i in 0..12 {
        let fleet = Arc::clone(&fleet);
        tasks.spawn(async move {
            match i % 3 {
                0 => {
                    fleet.grow(2).await;
                }
                1 => {
                    fleet.shrink(1).await;
                }
                _ => {
                    fleet.size().await;
                }
            }
        });
    }
    for _ in 0..4 {
        harness.tick().await;
    }
    while tasks.join_next().await.is_some() {}

    let size = harness.fleet.size().await;
    assert!(
        (1..=5).contains(&size.total),
        "bounds violated: {:?}",
        size
    );

    let snapshot = harness.fleet.snapshot().await;
    let pids: HashSet<u32> = snapshot.iter().map(|w| w.pid).collect();
    assert_eq!(pids.len(), snapshot.len(), "pids must be pairwise distinct");
}

#[tokio::test]
async fn operator_commands_are_sequentially_composed() {
    let harness = Harness::new(1, 5, vec![Ok(0)]);
    harness.warm_up(1).await;

    // grow(3) then shrink(2) behaves as the sequential composition
    assert_eq!(harness.fleet.grow(3).await, 3);
    harness.clock.advance(1_000);
    harness.fleet.size().await;
    assert_eq!(harness.fleet.shrink(2).await, 2);
    assert_eq!(harness.total().await, 2);
}

#[tokio::test]
async fn stop_all_escalates_stubborn_workers_in_real_time() {
    // Real clock: SIGTERM is ignored, the graceful window (200ms) lapses,
    // and every survivor is force-killed exactly once.
    let config = scenario_config(1, 5);
    let spawner = Arc::new(MockProcessSpawner::with_behavior(TermBehavior::Ignore));
    let fleet = Fleet::new(
        &config,
        Arc::clone(&spawner) as Arc<dyn ProcessSpawner>,
        Arc::new(SystemTimeProvider) as Arc<dyn TimeProvider>,
    );
    fleet.grow(3).await;

    let started = std::time::Instant::now();
    fleet.stop_all().await;
    let elapsed = started.elapsed();

    assert!(
        elapsed >= Duration::from_millis(150),
        "graceful window must be awaited, took {:?}",
        elapsed
    );
    assert_eq!(fleet.size().await.total, 0);
    for control in spawner.spawned() {
        assert_eq!(control.term_count(), 1);
        assert_eq!(control.kill_count(), 1, "force-kill exactly once");
        assert!(!control.is_alive());
    }
}
