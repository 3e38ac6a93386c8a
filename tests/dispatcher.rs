// tests/dispatcher.rs

use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;

use wavesched::concurrency::ConcurrencyManager;
use wavesched::config::ConfigFile;
use wavesched::engine::{Admission, Dispatcher};
use wavesched::errors::WaveschedError;
use wavesched::ownership::{Owner, OwnershipRegistry};
use wavesched::types::TaskDescriptor;
use wavesched_test_utils::builders::{ConfigFileBuilder, TaskBuilder, ids, tasks};
use wavesched_test_utils::{assert_pending, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// A(1) and B(1) share the `heavy` tier (limit 1); C(2) runs on `light`.
fn three_task_plan() -> Vec<TaskDescriptor> {
    vec![
        TaskBuilder::new("A").wave(1).tier("heavy").file("src/a.ts").build(),
        TaskBuilder::new("B").wave(1).tier("heavy").file("src/b.ts").build(),
        TaskBuilder::new("C").wave(2).tier("light").file("src/c.ts").build(),
    ]
}

fn config() -> ConfigFile {
    ConfigFileBuilder::new()
        .tier_limit("heavy", 1)
        .tier_limit("light", 2)
        .reserved("package.json")
        .build()
}

fn worker(name: &str) -> Owner {
    Owner::Worker(name.to_string())
}

#[tokio::test]
async fn full_cycle_through_two_waves() -> TestResult {
    init_tracing();
    let d = Dispatcher::new(three_task_plan(), &config())?;

    let blockers: BTreeSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
    assert_eq!(d.dependency_map().blockers_of("C"), Some(&blockers));
    assert_eq!(ids(d.next_ready()), vec!["A", "B"]);

    assert_eq!(d.admit("w1", "A").await?, Admission::Granted);
    assert_eq!(d.owner_of("src/a.ts"), Some(worker("w1")));

    // `heavy` is full: B waits for A's slot.
    let b = assert_pending(d.admit("w2", "B")).await;
    assert!(d.next_ready().is_empty());
    assert_eq!(d.worker_of("B").as_deref(), Some("w2"));

    d.complete("w1", "A")?;
    assert_eq!(with_timeout(b).await?, Admission::Granted);
    assert_eq!(d.owner_of("src/a.ts"), None);
    assert_eq!(d.owner_of("src/b.ts"), Some(worker("w2")));
    assert_eq!(d.concurrency().count("heavy"), 1);

    assert!(d.next_ready().is_empty());
    d.complete("w2", "B")?;
    assert_eq!(d.concurrency().count("heavy"), 0);

    assert_eq!(ids(d.next_ready()), vec!["C"]);
    assert_eq!(d.admit("w1", "C").await?, Admission::Granted);
    d.complete("w1", "C")?;

    assert!(d.is_finished());
    assert!(d.next_ready().is_empty());
    assert!(!d.has_conflicts());
    Ok(())
}

#[tokio::test]
async fn blocked_or_taken_tasks_are_not_admitted() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;

    assert_eq!(d.admit("w1", "C").await?, Admission::NotReady);

    assert_eq!(d.admit("w1", "A").await?, Admission::Granted);
    assert_eq!(d.admit("w2", "A").await?, Admission::NotReady);

    d.complete("w1", "A")?;
    assert_eq!(d.admit("w1", "A").await?, Admission::NotReady);
    Ok(())
}

#[tokio::test]
async fn unknown_task_is_an_error() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;

    match d.admit("w1", "nope").await {
        Err(WaveschedError::TaskNotFound(id)) => assert_eq!(id, "nope"),
        other => panic!("expected TaskNotFound, got {:?}", other),
    }
    assert!(d.complete("w1", "nope").is_err());
    Ok(())
}

#[tokio::test]
async fn file_conflict_defers_and_rolls_back() -> TestResult {
    init_tracing();
    let plan = vec![
        TaskBuilder::new("first").tier("t").file("shared.ts").build(),
        TaskBuilder::new("second")
            .tier("t")
            .file("own.ts")
            .file("shared.ts")
            .build(),
    ];
    let d = Dispatcher::new(plan, &config())?;

    assert_eq!(d.admit("w1", "first").await?, Admission::Granted);

    match d.admit("w2", "second").await? {
        Admission::Deferred(conflict) => {
            assert_eq!(conflict.path, "shared.ts");
            assert_eq!(conflict.holder, worker("w1"));
        }
        other => panic!("expected Deferred, got {:?}", other),
    }

    // Nothing of `second` is held.
    assert_eq!(d.owner_of("own.ts"), None);
    assert_eq!(d.concurrency().count("t"), 1);
    assert_eq!(d.worker_of("second"), None);
    assert_eq!(ids(d.next_ready()), vec!["second"]);
    assert_eq!(d.conflicts(), vec!["shared.ts".to_string()]);

    d.complete("w1", "first")?;
    assert_eq!(d.admit("w2", "second").await?, Admission::Granted);
    Ok(())
}

#[tokio::test]
async fn reserved_file_defers_admission() -> TestResult {
    let plan = vec![TaskBuilder::new("deps").file("package.json").build()];
    let d = Dispatcher::new(plan, &config())?;

    match d.admit("w1", "deps").await? {
        Admission::Deferred(conflict) => assert!(conflict.is_reserved()),
        other => panic!("expected Deferred, got {:?}", other),
    }
    assert_eq!(d.owner_of("package.json"), Some(Owner::Coordinator));
    assert!(d.has_conflicts());
    Ok(())
}

#[tokio::test]
async fn cancelled_wait_makes_task_ready_again() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;

    let b = assert_pending(d.admit("w2", "B")).await;
    assert_eq!(d.concurrency().cancel_waiters("heavy"), 1);

    assert!(with_timeout(b).await.unwrap_err().is_cancelled());
    assert_eq!(ids(d.next_ready()), vec!["B"]);
    Ok(())
}

#[tokio::test]
async fn dropped_admit_makes_task_ready_again() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;

    let b = assert_pending(d.admit("w2", "B")).await;
    drop(b);

    assert_eq!(ids(d.next_ready()), vec!["B"]);
    assert_eq!(d.concurrency().queue_length("heavy"), 0);
    Ok(())
}

#[tokio::test]
async fn abandon_releases_without_completing() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;

    d.abandon("w1", "A")?;
    assert!(!d.is_completed("A"));
    assert_eq!(d.owner_of("src/a.ts"), None);
    assert_eq!(d.concurrency().count("heavy"), 0);
    assert_eq!(ids(d.next_ready()), vec!["A", "B"]);
    Ok(())
}

#[tokio::test]
async fn completion_from_wrong_worker_keeps_resources() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;

    d.abandon("w2", "A")?;
    assert_eq!(d.owner_of("src/a.ts"), Some(worker("w1")));
    assert_eq!(d.concurrency().count("heavy"), 1);
    Ok(())
}

#[tokio::test]
async fn release_worker_abandons_its_tasks() -> TestResult {
    let plan = tasks(&[("x", 1), ("y", 1), ("z", 1)]);
    let d = Dispatcher::new(plan, &config())?;

    d.admit("w1", "x").await?;
    d.admit("w1", "y").await?;
    d.admit("w2", "z").await?;

    let mut abandoned = d.release_worker("w1");
    abandoned.sort();
    assert_eq!(abandoned, vec!["x", "y"]);
    assert_eq!(ids(d.next_ready()), vec!["x", "y"]);
    assert_eq!(d.worker_of("z").as_deref(), Some("w2"));
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_waiters_and_drops_claims() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;
    let b = assert_pending(d.admit("w2", "B")).await;

    d.shutdown();

    assert!(with_timeout(b).await.unwrap_err().is_cancelled());
    assert_eq!(d.owner_of("src/a.ts"), None);
    assert_eq!(d.concurrency().count("heavy"), 0);
    Ok(())
}

#[tokio::test]
async fn concurrency_state_carries_over_between_cycles() -> TestResult {
    let shared = Arc::new(ConcurrencyManager::new(0).with_tier_limit("heavy", 1));

    let first = Dispatcher::with_parts(
        three_task_plan(),
        Arc::clone(&shared),
        OwnershipRegistry::default(),
    )?;
    first.admit("w1", "A").await?;

    let second = Dispatcher::with_parts(
        three_task_plan(),
        Arc::clone(&shared),
        OwnershipRegistry::default(),
    )?;
    assert_eq!(second.concurrency().count("heavy"), 1);

    let waiting = assert_pending(second.admit("w9", "B")).await;
    first.complete("w1", "A")?;
    assert_eq!(with_timeout(waiting).await?, Admission::Granted);
    Ok(())
}

#[tokio::test]
async fn abandoning_a_queued_admission_never_exceeds_the_limit() -> TestResult {
    init_tracing();
    let d = Dispatcher::new(three_task_plan(), &config())?;
    assert_eq!(d.admit("w1", "A").await?, Admission::Granted);

    let b = assert_pending(d.admit("w2", "B")).await;
    d.abandon("w2", "B")?;

    assert_eq!(with_timeout(b).await?, Admission::NotReady);
    assert_eq!(d.concurrency().count("heavy"), 1);
    assert_eq!(d.concurrency().queue_length("heavy"), 0);
    assert_eq!(d.owner_of("src/a.ts"), Some(worker("w1")));
    assert_eq!(d.worker_of("B"), None);
    assert_eq!(ids(d.next_ready()), vec!["B"]);

    // The slot stays with A until A is done.
    let again = assert_pending(d.admit("w3", "B")).await;
    d.complete("w1", "A")?;
    assert_eq!(with_timeout(again).await?, Admission::Granted);
    assert_eq!(d.concurrency().count("heavy"), 1);
    Ok(())
}

#[tokio::test]
async fn completing_a_queued_admission_withdraws_it() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;

    let b = assert_pending(d.admit("w2", "B")).await;
    d.complete("w2", "B")?;

    assert_eq!(with_timeout(b).await?, Admission::NotReady);
    assert!(d.is_completed("B"));
    assert!(d.is_admitted("A"));
    assert_eq!(d.concurrency().count("heavy"), 1);
    assert_eq!(d.owner_of("src/b.ts"), None);
    Ok(())
}

#[tokio::test]
async fn releasing_a_worker_withdraws_its_queued_admissions() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;

    let b = assert_pending(d.admit("w2", "B")).await;
    assert!(!d.is_admitted("B"));
    assert_eq!(d.release_worker("w2"), vec!["B".to_string()]);

    assert_eq!(with_timeout(b).await?, Admission::NotReady);
    assert_eq!(d.concurrency().count("heavy"), 1);
    assert_eq!(d.concurrency().queue_length("heavy"), 0);
    assert_eq!(ids(d.next_ready()), vec!["B"]);
    Ok(())
}

#[tokio::test]
async fn withdrawal_after_slot_handoff_passes_the_slot_back() -> TestResult {
    let d = Dispatcher::new(three_task_plan(), &config())?;
    d.admit("w1", "A").await?;

    let b = assert_pending(d.admit("w2", "B")).await;
    // The slot goes to B's waiter before B's admit observes it.
    d.complete("w1", "A")?;
    d.abandon("w2", "B")?;

    assert_eq!(with_timeout(b).await?, Admission::NotReady);
    assert_eq!(d.concurrency().count("heavy"), 0);
    assert_eq!(d.admit("w3", "B").await?, Admission::Granted);
    assert_eq!(d.concurrency().count("heavy"), 1);
    Ok(())
}

#[tokio::test]
async fn deferred_admission_keeps_files_of_sibling_tasks() -> TestResult {
    let plan = vec![
        TaskBuilder::new("T1").file("shared.ts").build(),
        TaskBuilder::new("T2").file("shared.ts").file("b.ts").build(),
        TaskBuilder::new("T3").file("b.ts").build(),
        TaskBuilder::new("T4").file("shared.ts").build(),
    ];
    let d = Dispatcher::new(plan, &config())?;

    assert_eq!(d.admit("w9", "T3").await?, Admission::Granted);
    assert_eq!(d.admit("w1", "T1").await?, Admission::Granted);

    match d.admit("w1", "T2").await? {
        Admission::Deferred(conflict) => assert_eq!(conflict.holder, worker("w9")),
        other => panic!("expected Deferred, got {:?}", other),
    }

    // T1 is still running and keeps its file.
    assert_eq!(d.owner_of("shared.ts"), Some(worker("w1")));
    match d.admit("w2", "T4").await? {
        Admission::Deferred(conflict) => assert_eq!(conflict.holder, worker("w1")),
        other => panic!("expected Deferred, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn shared_file_stays_claimed_until_last_task_of_worker_finishes() -> TestResult {
    let plan = vec![
        TaskBuilder::new("T1").file("shared.ts").build(),
        TaskBuilder::new("T2").file("./shared.ts").file("own.ts").build(),
        TaskBuilder::new("other").file("shared.ts").build(),
    ];
    let d = Dispatcher::new(plan, &config())?;

    assert_eq!(d.admit("w1", "T1").await?, Admission::Granted);
    assert_eq!(d.admit("w1", "T2").await?, Admission::Granted);

    d.complete("w1", "T1")?;
    assert_eq!(d.owner_of("shared.ts"), Some(worker("w1")));
    assert!(matches!(
        d.admit("w2", "other").await?,
        Admission::Deferred(_)
    ));

    d.complete("w1", "T2")?;
    assert_eq!(d.owner_of("shared.ts"), None);
    assert_eq!(d.owner_of("own.ts"), None);
    assert_eq!(d.admit("w2", "other").await?, Admission::Granted);
    Ok(())
}

#[test]
fn invalid_plan_fails_at_construction() {
    let plan = vec![TaskBuilder::new("zero").wave(0).build()];
    assert!(matches!(
        Dispatcher::new(plan, &config()),
        Err(WaveschedError::InvalidPlan(_))
    ));
}
