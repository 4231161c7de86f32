//! End-to-end admission scenarios through the public API.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use turnstile::{
    AdmissionEvaluator, Algorithm, Decision, DynamicListStore, LimiterKey, LimiterRegistry,
    ListPolicy, ManualClock, PolicyConfig, RateLimiter, RejectReason, TimeUnit, TurnstileConfig,
};

fn evaluator_with_clock() -> (AdmissionEvaluator, ManualClock) {
    let clock = ManualClock::new(Instant::now());
    let evaluator = AdmissionEvaluator::new(
        Arc::new(LimiterRegistry::with_clock(Arc::new(clock.clone()))),
        Arc::new(DynamicListStore::new()),
    );
    (evaluator, clock)
}

#[test]
fn third_call_in_the_same_second_is_rejected() {
    let (evaluator, _) = evaluator_with_clock();
    let policy = PolicyConfig::default()
        .with_algorithm(Algorithm::SlidingWindow)
        .with_list_policy(ListPolicy::None)
        .with_limit(2.0, 1, TimeUnit::Second);

    assert_eq!(evaluator.evaluate(&policy, "10.0.0.5"), Decision::Admit);
    assert_eq!(evaluator.evaluate(&policy, "10.0.0.5"), Decision::Admit);

    match evaluator.evaluate(&policy, "10.0.0.5") {
        Decision::Reject(rejection) => {
            assert_eq!(rejection.client_id, "10.0.0.5");
            assert_eq!(rejection.group_name, "COMMON");
            assert_eq!(rejection.reason, RejectReason::RateLimited);
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
}

#[test]
fn sliding_window_admits_again_after_window() {
    let (evaluator, clock) = evaluator_with_clock();
    let policy = PolicyConfig::default().with_limit(3.0, 1, TimeUnit::Second);

    for _ in 0..3 {
        assert!(evaluator.evaluate(&policy, "10.0.0.5").is_admitted());
    }
    assert!(evaluator.evaluate(&policy, "10.0.0.5").is_rejected());

    clock.advance(Duration::from_millis(1100));
    assert!(evaluator.evaluate(&policy, "10.0.0.5").is_admitted());
}

#[test]
fn sliding_window_with_real_time() {
    let evaluator = AdmissionEvaluator::default();
    let policy = PolicyConfig::for_group("realtime").with_limit(3.0, 100, TimeUnit::Millisecond);

    for _ in 0..3 {
        assert!(evaluator.evaluate(&policy, "10.0.0.5").is_admitted());
    }
    assert!(evaluator.evaluate(&policy, "10.0.0.5").is_rejected());

    thread::sleep(Duration::from_millis(150));
    assert!(evaluator.evaluate(&policy, "10.0.0.5").is_admitted());
}

#[test]
fn state_is_isolated_per_client_and_group() {
    let (evaluator, _) = evaluator_with_clock();
    let g1 = PolicyConfig::for_group("g1").with_limit(3.0, 1, TimeUnit::Second);
    let g2 = PolicyConfig::for_group("g2").with_limit(3.0, 1, TimeUnit::Second);

    assert!(evaluator.evaluate(&g1, "A").is_admitted());

    for _ in 0..50 {
        evaluator.evaluate(&g1, "B");
        evaluator.evaluate(&g2, "A");
    }

    assert!(evaluator.evaluate(&g1, "A").is_admitted());
    assert!(evaluator.evaluate(&g1, "A").is_admitted());
    assert!(evaluator.evaluate(&g1, "A").is_rejected());
}

#[test]
fn hot_key_does_not_grow_without_bound() {
    let (evaluator, clock) = evaluator_with_clock();
    let policy = PolicyConfig::default().with_limit(5.0, 1, TimeUnit::Second);

    for _ in 0..5_000 {
        evaluator.evaluate(&policy, "10.0.0.5");
        clock.advance(Duration::from_millis(3));
    }

    let limiter = evaluator
        .limiters()
        .get(&LimiterKey::new("10.0.0.5", "COMMON"))
        .unwrap();
    match limiter.as_ref() {
        RateLimiter::SlidingWindow(window) => assert!(window.len() <= 5),
        other => panic!("expected a sliding window, got {:?}", other),
    }
}

#[test]
fn deny_beats_allow_under_both_lists() {
    let (evaluator, _) = evaluator_with_clock();
    let policy = PolicyConfig::for_group("admin").with_list_policy(ListPolicy::DefaultPlusBoth);

    evaluator.lists().add_allow("admin", "10.0.0.5").unwrap();
    evaluator.lists().add_deny("admin", "10.0.0.*").unwrap();

    for _ in 0..10 {
        match evaluator.evaluate(&policy, "10.0.0.5") {
            Decision::Reject(rejection) => assert_eq!(rejection.reason, RejectReason::Denied),
            other => panic!("expected a denial, got {:?}", other),
        }
    }

    evaluator.lists().remove_deny_group("admin");
    assert_eq!(evaluator.evaluate(&policy, "10.0.0.5"), Decision::Bypass);
}

#[test]
fn concurrent_clients_share_one_budget_per_key() {
    let (evaluator, _) = evaluator_with_clock();
    let policy = Arc::new(PolicyConfig::default().with_limit(40.0, 1, TimeUnit::Minute));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let evaluator = evaluator.clone();
            let policy = Arc::clone(&policy);
            thread::spawn(move || {
                (0..25)
                    .filter(|_| evaluator.evaluate(&policy, "10.0.0.5").is_admitted())
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 40);
    assert_eq!(evaluator.limiters().limiter_count(), 1);
}

#[test]
fn token_bucket_spaced_calls_are_admitted() {
    let (evaluator, clock) = evaluator_with_clock();
    let policy = PolicyConfig::for_group("bucket")
        .with_algorithm(Algorithm::TokenBucket)
        .with_limit(4.0, 1, TimeUnit::Second);

    let burst: Vec<bool> = (0..6)
        .map(|_| evaluator.evaluate(&policy, "10.0.0.5").is_admitted())
        .collect();
    assert!(burst.contains(&false));

    for _ in 0..20 {
        clock.advance(Duration::from_millis(260));
        assert!(evaluator.evaluate(&policy, "10.0.0.5").is_admitted());
    }
}

#[test]
fn token_bucket_first_second_holds_to_the_rate() {
    let (evaluator, clock) = evaluator_with_clock();
    let policy = PolicyConfig::for_group("bucket")
        .with_algorithm(Algorithm::TokenBucket)
        .with_limit(5.0, 1, TimeUnit::Second);

    let mut admitted = 0;
    for _ in 0..9 {
        if evaluator.evaluate(&policy, "10.0.0.5").is_admitted() {
            admitted += 1;
        }
        clock.advance(Duration::from_millis(110));
    }
    assert_eq!(admitted, 5);
}

#[test]
fn configured_policies_drive_decisions() {
    let yaml = r#"
properties:
  trusted: "127.0.0.1"
policies:
  - operation: "POST /login"
    policy:
      group_name: login
      list_policy: DEFAULT_PLUS_WHITE
      max_requests: 1
      static_white_list: ["${trusted}"]
lists:
  deny:
    - group: login
      entries: ["10.9.*"]
"#;
    let config = TurnstileConfig::from_yaml(yaml).unwrap();
    let catalog = config.catalog().unwrap();
    let (evaluator, _) = evaluator_with_clock();
    config.seed_lists(evaluator.lists()).unwrap();

    let policy = catalog.require("POST /login").unwrap();
    for _ in 0..3 {
        assert_eq!(evaluator.evaluate(&policy, "127.0.0.1"), Decision::Bypass);
    }
    assert_eq!(evaluator.evaluate(&policy, "10.9.0.1"), Decision::Admit);
    assert!(evaluator.evaluate(&policy, "10.9.0.1").is_rejected());
}
