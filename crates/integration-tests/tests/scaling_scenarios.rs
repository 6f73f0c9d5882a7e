// End-to-end scaling scenarios, tick-driven against deterministic mocks.
// Fixed parameters throughout: min=1, max=5, up=5.0, down=2.5.

use queueherd_integration_tests::Harness;
use std::time::Duration;

use queueherd_core::port::ProbeError;

#[tokio::test]
async fn cold_start_to_steady_idle() {
    // Start with no workers; the first tick's min-enforcement grows to 1.
    // With an empty queue the fleet then stays at 1 forever.
    let harness = Harness::new(1, 5, vec![Ok(0)]);
    assert_eq!(harness.total().await, 0);

    harness.tick().await;
    assert_eq!(harness.total().await, 1);

    for _ in 0..10 {
        harness.tick().await;
        assert_eq!(harness.total().await, 1);
    }
}

#[tokio::test]
async fn linear_ramp_caps_at_max() {
    let depths = [6, 6, 11, 11, 16, 16, 21, 21, 26, 26];
    let harness = Harness::new(1, 5, depths.iter().map(|&d| Ok(d)).collect());
    harness.warm_up(1).await;

    let mut evolution = Vec::new();
    for _ in 0..depths.len() {
        harness.tick().await;
        evolution.push(harness.total().await);
    }
    assert_eq!(evolution, vec![2, 2, 3, 3, 4, 4, 5, 5, 5, 5]);
}

#[tokio::test]
async fn depths_inside_dead_band_cause_no_mutations() {
    // 3 workers: the dead-band is [7.5, 15]; nothing in it moves the fleet
    let depths = [8, 8, 9, 14, 15];
    let harness = Harness::new(1, 5, depths.iter().map(|&d| Ok(d)).collect());
    harness.warm_up(3).await;

    for _ in 0..depths.len() {
        harness.tick().await;
        assert_eq!(harness.total().await, 3);
    }
    assert_eq!(harness.spawner.spawn_count(), 3, "no further spawns");
}

#[tokio::test]
async fn depth_below_band_shrinks_one_step_then_settles() {
    // 7 < 3 * 2.5 shrinks once; at 2 workers the band is [5, 10] and 7 holds
    let harness = Harness::new(1, 5, vec![Ok(7), Ok(7), Ok(7)]);
    harness.warm_up(3).await;

    harness.tick().await;
    assert_eq!(harness.total().await, 2);
    harness.tick().await;
    assert_eq!(harness.total().await, 2);
    harness.tick().await;
    assert_eq!(harness.total().await, 2);
}

#[tokio::test]
async fn drain_to_min_one_step_per_tick() {
    let harness = Harness::new(1, 5, vec![Ok(0)]);
    harness.warm_up(4).await;

    let mut evolution = Vec::new();
    for _ in 0..5 {
        harness.tick().await;
        evolution.push(harness.total().await);
    }
    assert_eq!(evolution, vec![3, 2, 1, 1, 1]);
}

#[tokio::test]
async fn broker_outage_freezes_fleet_then_recovers() {
    let mut script: Vec<Result<u64, ProbeError>> = (0..10)
        .map(|_| Err(ProbeError::Unreachable("connection refused".to_string())))
        .collect();
    script.push(Ok(20));

    let harness = Harness::new(1, 5, script);
    harness.warm_up(3).await;

    for _ in 0..10 {
        harness.tick().await;
        assert_eq!(harness.total().await, 3, "failed probes must not scale");
    }

    // Tick 11: the probe recovers with depth 20 > 15 and the fleet grows
    harness.tick().await;
    assert_eq!(harness.total().await, 4);
}

#[tokio::test]
async fn probe_timeouts_freeze_fleet_like_any_failure() {
    let script = vec![
        Err(ProbeError::Timeout(Duration::from_millis(300))),
        Err(ProbeError::MalformedResponse("not an integer".to_string())),
    ];
    let harness = Harness::new(1, 5, script);
    harness.warm_up(2).await;

    harness.tick().await;
    harness.tick().await;
    assert_eq!(harness.total().await, 2);
}

#[tokio::test]
async fn unexpected_death_above_min_is_not_replaced() {
    // 2 workers, min 1: after one dies on its own the fleet sits at 1;
    // only demand (depth 6 > 5) grows it back
    let harness = Harness::new(1, 5, vec![Ok(0), Ok(0), Ok(6)]);
    harness.warm_up(2).await;

    harness.spawner.spawned()[0].exit(1);

    harness.tick().await;
    assert_eq!(harness.total().await, 1);
    assert_eq!(harness.fleet.unexpected_exits(), 1);

    harness.tick().await;
    assert_eq!(harness.total().await, 1, "no auto-replacement above min");

    harness.tick().await;
    assert_eq!(harness.total().await, 2, "demand grew the fleet back");
}

#[tokio::test]
async fn unexpected_death_below_min_is_restored() {
    let harness = Harness::new(2, 5, vec![Ok(0)]);
    harness.warm_up(2).await;

    harness.spawner.spawned()[1].exit(9);

    harness.tick().await;
    assert_eq!(harness.total().await, 2, "min-enforcement restored the fleet");
}
