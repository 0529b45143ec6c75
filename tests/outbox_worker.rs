//! Outbox delivery integration tests
//!
//! Everything runs in one test so drains in this binary never race each
//! other over the shared `task_outbox` table.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use bank_ledger::fixtures::RandomGen;
use bank_ledger::ledger::{PgStore, Store, enqueue_verify_email};
use bank_ledger::outbox::{OutboxWorker, PendingTask, TaskDistributor, WorkerConfig};

use common::{random_user_params, setup_store};

/// Fails for the listed task ids, records everything it delivers
#[derive(Default)]
struct FlakyDistributor {
    failing: Mutex<HashSet<i64>>,
    delivered: Mutex<Vec<i64>>,
}

impl FlakyDistributor {
    fn fail_for(&self, id: i64) {
        self.failing.lock().unwrap().insert(id);
    }

    fn recover(&self, id: i64) {
        self.failing.lock().unwrap().remove(&id);
    }

    fn delivered(&self, id: i64) -> usize {
        self.delivered.lock().unwrap().iter().filter(|d| **d == id).count()
    }
}

#[async_trait]
impl TaskDistributor for FlakyDistributor {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn distribute(&self, task: &PendingTask) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(&task.id) {
            anyhow::bail!("smtp relay unavailable");
        }
        self.delivered.lock().unwrap().push(task.id);
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    attempts: i32,
    last_error: Option<String>,
    dispatched_at: Option<DateTime<Utc>>,
}

async fn outbox_row(store: &PgStore, id: i64) -> OutboxRow {
    sqlx::query_as("SELECT attempts, last_error, dispatched_at FROM task_outbox WHERE id = $1")
        .bind(id)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

async fn enqueue_for_new_user(store: &PgStore, rng: &mut RandomGen) -> i64 {
    let result = store
        .create_user_tx(random_user_params(rng), enqueue_verify_email())
        .await
        .unwrap();
    assert_eq!(result.enqueued_tasks.len(), 1);
    result.enqueued_tasks[0]
}

/// Drain until `done` holds for the task row; other rows may be pending too
async fn drain_until(
    worker: &OutboxWorker,
    store: &PgStore,
    id: i64,
    done: impl Fn(&OutboxRow) -> bool,
) -> OutboxRow {
    for _ in 0..50 {
        worker.drain_once().await.unwrap();
        let row = outbox_row(store, id).await;
        if done(&row) {
            return row;
        }
    }
    panic!("task {id} never reached the expected state");
}

fn worker_config(max_attempts: i32) -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(50),
        batch_size: 1000,
        max_attempts,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_outbox_delivery() {
    let store = setup_store().await;
    let mut rng = RandomGen::from_entropy();
    let distributor = Arc::new(FlakyDistributor::default());

    // ------------------------------------------------------------------
    // A failed dispatch is recorded and retried on a later drain
    // ------------------------------------------------------------------
    let worker = OutboxWorker::new(store.clone(), distributor.clone(), worker_config(25));
    let task_id = enqueue_for_new_user(&store, &mut rng).await;
    distributor.fail_for(task_id);

    let row = drain_until(&worker, &store, task_id, |r| r.attempts >= 1).await;
    assert_eq!(row.attempts, 1);
    assert!(row.last_error.unwrap().contains("smtp relay unavailable"));
    assert!(row.dispatched_at.is_none());
    assert_eq!(distributor.delivered(task_id), 0);

    distributor.recover(task_id);
    let row = drain_until(&worker, &store, task_id, |r| r.dispatched_at.is_some()).await;
    assert_eq!(row.attempts, 2);
    assert_eq!(distributor.delivered(task_id), 1);

    // Dispatched rows are not handed over again
    worker.drain_once().await.unwrap();
    assert_eq!(distributor.delivered(task_id), 1);

    // ------------------------------------------------------------------
    // Tasks at the attempt limit are parked
    // ------------------------------------------------------------------
    let strict = OutboxWorker::new(store.clone(), distributor.clone(), worker_config(1));
    let parked_id = enqueue_for_new_user(&store, &mut rng).await;
    distributor.fail_for(parked_id);

    drain_until(&strict, &store, parked_id, |r| r.attempts >= 1).await;
    distributor.recover(parked_id);
    strict.drain_once().await.unwrap();

    let row = outbox_row(&store, parked_id).await;
    assert_eq!(row.attempts, 1);
    assert!(row.dispatched_at.is_none());
    assert_eq!(distributor.delivered(parked_id), 0);

    // ------------------------------------------------------------------
    // Background loop delivers and stops on shutdown
    // ------------------------------------------------------------------
    let background = OutboxWorker::new(store.clone(), distributor.clone(), worker_config(25));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { background.run(shutdown_rx).await });

    let live_id = enqueue_for_new_user(&store, &mut rng).await;
    let mut delivered = false;
    for _ in 0..100 {
        if outbox_row(&store, live_id).await.dispatched_at.is_some() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered, "background worker never delivered task {live_id}");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}
