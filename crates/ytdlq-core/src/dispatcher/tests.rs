use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Dispatcher, DispatcherSettings};
use crate::error::{QueueError, Result};
use crate::retry::RetryPolicy;
use crate::runner::{JobRunner, RunOutcome};
use crate::store::{open_memory, QueueDb, Task};

#[derive(Clone, Copy)]
enum Behaviour {
    Outcome(RunOutcome),
    Error,
}

/// Runner that sleeps instead of spawning, and records what it saw.
#[derive(Default)]
struct FakeRunner {
    delays: HashMap<String, Duration>,
    behaviours: HashMap<String, Behaviour>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<String>>,
    started_at_seen: Mutex<Vec<i64>>,
}

impl FakeRunner {
    fn delay(mut self, id: &str, d: Duration) -> Self {
        self.delays.insert(id.to_string(), d);
        self
    }

    fn behave(mut self, id: &str, b: Behaviour) -> Self {
        self.behaviours.insert(id.to_string(), b);
        self
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {event}"))
    }
}

#[async_trait]
impl JobRunner for FakeRunner {
    async fn run(&self, task: &Task, cancel: CancellationToken) -> Result<RunOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("start:{}", task.id));
        self.started_at_seen.lock().unwrap().push(task.started_at);

        let delay = self
            .delays
            .get(&task.id)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        let cancelled = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = cancel.cancelled() => true,
        };

        self.events.lock().unwrap().push(format!("end:{}", task.id));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        match self.behaviours.get(&task.id) {
            Some(Behaviour::Outcome(outcome)) => Ok(*outcome),
            Some(Behaviour::Error) => Err(QueueError::Configuration("boom".into())),
            None => Ok(RunOutcome::Succeeded),
        }
    }
}

fn task_at(id: &str, created_at: i64) -> Task {
    Task {
        id: id.to_string(),
        video_format: "135".to_string(),
        audio_format: "140".to_string(),
        url: format!("https://www.youtube.com/watch?v={id}"),
        created_at,
        updated_at: created_at,
        ..Task::default()
    }
}

fn settings(worker_num: usize) -> DispatcherSettings {
    DispatcherSettings {
        worker_num,
        poll_interval: Duration::from_millis(10),
        retry: RetryPolicy::default(),
    }
}

async fn seeded(ids: &[&str]) -> QueueDb {
    let db = open_memory().await.unwrap();
    for (i, id) in ids.iter().enumerate() {
        db.insert_task(&task_at(id, 100 + i as i64)).await.unwrap();
    }
    db
}

async fn drain(db: &QueueDb) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !db.list_all_tasks().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue did not drain");
}

fn spawn(
    db: &QueueDb,
    runner: &Arc<FakeRunner>,
    settings: DispatcherSettings,
) -> (CancellationToken, tokio::task::JoinHandle<Result<()>>) {
    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(db.clone(), runner.clone(), settings, cancel.clone());
    (cancel, tokio::spawn(dispatcher.run()))
}

#[tokio::test]
async fn outcomes_are_recorded_in_the_store() {
    let db = seeded(&["ok", "bad", "err", "late"]).await;
    let runner = Arc::new(
        FakeRunner::default()
            .behave("bad", Behaviour::Outcome(RunOutcome::Failed { code: Some(1) }))
            .behave("err", Behaviour::Error)
            .behave("late", Behaviour::Outcome(RunOutcome::TimedOut)),
    );
    let (cancel, handle) = spawn(&db, &runner, settings(4));

    drain(&db).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let failed: Vec<String> = db
        .list_all_failed_tasks()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(failed.len(), 3);
    for id in ["bad", "err", "late"] {
        assert!(failed.contains(&id.to_string()), "{id} not failed");
    }
    assert!(db.list_in_flight().await.unwrap().is_empty());
    // Runners see the started task.
    assert!(runner.started_at_seen.lock().unwrap().iter().all(|t| *t > 0));
}

#[tokio::test]
async fn tasks_start_in_fifo_order() {
    let db = open_memory().await.unwrap();
    db.insert_task(&task_at("c", 300)).await.unwrap();
    db.insert_task(&task_at("a", 100)).await.unwrap();
    db.insert_task(&task_at("b", 200)).await.unwrap();
    let runner = Arc::new(FakeRunner::default());
    let (cancel, handle) = spawn(&db, &runner, settings(1));

    drain(&db).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let starts: Vec<String> = runner
        .events()
        .into_iter()
        .filter(|e| e.starts_with("start:"))
        .collect();
    assert_eq!(starts, vec!["start:a", "start:b", "start:c"]);
}

#[tokio::test]
async fn concurrency_never_exceeds_worker_num() {
    let ids = ["a", "b", "c", "d", "e"];
    let db = seeded(&ids).await;
    let mut runner = FakeRunner::default();
    for id in ids {
        runner = runner.delay(id, Duration::from_millis(40));
    }
    let runner = Arc::new(runner);
    let (cancel, handle) = spawn(&db, &runner, settings(2));

    drain(&db).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(runner.events().len(), 10);
}

#[tokio::test]
async fn next_batch_waits_for_the_slowest_job() {
    let db = seeded(&["slow", "fast", "next"]).await;
    let runner = Arc::new(
        FakeRunner::default()
            .delay("slow", Duration::from_millis(150))
            .delay("fast", Duration::from_millis(5)),
    );
    let (cancel, handle) = spawn(&db, &runner, settings(2));

    drain(&db).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(runner.position("end:fast") < runner.position("end:slow"));
    assert!(runner.position("start:next") > runner.position("end:slow"));
}

#[tokio::test]
async fn idle_dispatcher_stops_promptly() {
    let db = open_memory().await.unwrap();
    let runner = Arc::new(FakeRunner::default());
    let mut s = settings(1);
    s.poll_interval = Duration::from_secs(60);
    let (cancel, handle) = spawn(&db, &runner, s);

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn cancelled_job_stays_queued() {
    let db = seeded(&["long"]).await;
    let runner = Arc::new(FakeRunner::default().delay("long", Duration::from_secs(30)));
    let (cancel, handle) = spawn(&db, &runner, settings(1));

    tokio::time::timeout(Duration::from_secs(5), async {
        while runner.in_flight.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job never started");
    assert_eq!(db.list_in_flight().await.unwrap().len(), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap()
        .unwrap();

    let tasks = db.list_all_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "long");
    assert_eq!(tasks[0].started_at, 0);
    assert!(db.list_in_flight().await.unwrap().is_empty());
    assert!(db.list_all_failed_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn persistent_poll_failure_ends_the_loop() {
    let db = open_memory().await.unwrap();
    db.close().await;
    let runner = Arc::new(FakeRunner::default());
    let mut s = settings(1);
    s.retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    };
    let (_cancel, handle) = spawn(&db, &runner, s);

    let err = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("dispatcher kept retrying")
        .unwrap()
        .unwrap_err();
    assert!(err.is_storage());
    assert!(runner.events().is_empty());
}
