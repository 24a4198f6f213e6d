//! Background worker that fires due runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use db::models::{ScheduledRunRow, ScheduledRunStatus};
use db::repository::scheduled_runs;
use db::DbPool;
use engine::{RunRequest, WorkflowEngine};

use crate::QueueError;

/// Tuning knobs for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the queue is checked for due runs.
    pub poll_interval: Duration,
    /// A claim whose holder has not sent a heartbeat for this long is
    /// considered abandoned and goes back to the queue. Holders beat three
    /// times per lease.
    pub lease: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            lease: Duration::from_secs(30),
        }
    }
}

/// Claims due rows from `scheduled_runs` and executes them.
#[derive(Debug, Clone)]
pub struct Worker {
    id: String,
    pool: DbPool,
    engine: WorkflowEngine,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(pool: DbPool, engine: WorkflowEngine, config: WorkerConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pool,
            engine,
            config,
        }
    }

    /// Lease holder id written on every row this worker claims.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Poll until `shutdown` fires. Each claimed run executes on its own
    /// task, so a slow run never holds up the rest of the queue.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), QueueError> {
        info!(
            worker_id = %self.id,
            "worker started (poll interval {:?}, lease {:?})",
            self.config.poll_interval,
            self.config.lease
        );

        loop {
            match scheduled_runs::requeue_stale(&self.pool, self.stale_before()).await {
                Ok(0) => {}
                Ok(n) => warn!("re-queued {} runs whose worker stopped responding", n),
                Err(e) => error!("failed to re-queue stale runs: {}", e),
            }

            match self.claim().await {
                Ok(Some(row)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.execute(row).await {
                            error!("failed to record scheduled run outcome: {}", e);
                        }
                    });
                    // Drain everything that is already due before sleeping.
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!("failed to poll scheduled runs: {}", e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("worker stopped");
        Ok(())
    }

    /// Claim the oldest due run, if any.
    pub async fn claim(&self) -> Result<Option<ScheduledRunRow>, QueueError> {
        Ok(scheduled_runs::claim_due(&self.pool, Utc::now(), &self.id).await?)
    }

    fn stale_before(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.config.lease)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        Utc::now() - lease
    }

    fn heartbeat_interval(&self) -> Duration {
        (self.config.lease / 3).max(Duration::from_millis(1))
    }

    /// Claim and execute at most one due run inline. Returns the final
    /// status of the run it executed.
    pub async fn tick(&self) -> Result<Option<ScheduledRunStatus>, QueueError> {
        match self.claim().await? {
            Some(row) => Ok(Some(self.execute(row).await?)),
            None => Ok(None),
        }
    }

    /// Run a claimed row through the engine and record the outcome.
    ///
    /// The lease on the row is refreshed while the engine runs.
    #[instrument(skip(self, row), fields(schedule_id = %row.id, run_id = %row.run_id))]
    pub async fn execute(&self, row: ScheduledRunRow) -> Result<ScheduledRunStatus, QueueError> {
        let request: RunRequest = match row.decode_payload() {
            Ok(request) => request,
            Err(e) => {
                error!("unreadable scheduled run payload: {}", e);
                let message = e.to_string();
                scheduled_runs::finish(
                    &self.pool,
                    &row.id,
                    &self.id,
                    ScheduledRunStatus::Failed,
                    Some(&message),
                )
                .await?;
                return Ok(ScheduledRunStatus::Failed);
            }
        };

        let submit = self.engine.submit(request);
        tokio::pin!(submit);
        let mut beat = tokio::time::interval(self.heartbeat_interval());
        beat.tick().await;

        let outcome = loop {
            tokio::select! {
                outcome = &mut submit => break outcome,
                _ = beat.tick() => {
                    match scheduled_runs::heartbeat(&self.pool, &row.id, &self.id, Utc::now()).await {
                        Ok(true) => {}
                        Ok(false) => warn!("lost the lease on this run; another worker may fire it"),
                        Err(e) => warn!("failed to refresh lease: {}", e),
                    }
                }
            }
        };

        let (status, last_error) = match outcome {
            Ok(report) => {
                info!(status = %report.status, "scheduled run finished");
                (ScheduledRunStatus::Completed, None)
            }
            Err(failure) => {
                warn!("scheduled run failed: {}", failure);
                (ScheduledRunStatus::Failed, Some(failure.to_string()))
            }
        };

        scheduled_runs::finish(&self.pool, &row.id, &self.id, status, last_error.as_deref())
            .await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use db::pool::{create_memory_pool, run_migrations};
    use engine::models::{Edge, Step};
    use engine::{RunLog, RunLogConfig, SqliteLogStore};
    use nodes::mock::MockHandler;
    use nodes::{Credentials, ExecutionContext, HandlerRegistry, StepError, StepHandler, StepKind};
    use serde_json::{json, Value};

    use crate::DeferredScheduler;

    struct Fixture {
        pool: DbPool,
        scheduler: DeferredScheduler,
        worker: Worker,
        trigger: Arc<MockHandler>,
    }

    async fn fixture(trigger: MockHandler) -> Fixture {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let trigger = Arc::new(trigger);
        let registry = HandlerRegistry::new()
            .with(StepKind::Trigger, "mailbox", trigger.clone())
            .with(StepKind::Action, "notes", Arc::new(MockHandler::echo_trigger()));
        let engine = WorkflowEngine::new(Arc::new(registry), Arc::new(RunLog::default()));
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_secs(30),
        };

        Fixture {
            scheduler: DeferredScheduler::new(pool.clone()),
            worker: Worker::new(pool.clone(), engine, config),
            pool,
            trigger,
        }
    }

    fn request() -> RunRequest {
        RunRequest::new(
            "wf",
            vec![Step::trigger("t", "mailbox"), Step::action("n", "notes")],
            vec![Edge::new("t", "n")],
        )
    }

    #[tokio::test]
    async fn runs_are_not_fired_early() {
        let f = fixture(MockHandler::returning(json!("mail"))).await;
        f.scheduler.schedule(request(), Duration::from_secs(3600)).await.unwrap();

        assert_eq!(f.worker.tick().await.unwrap(), None);
        assert_eq!(f.trigger.call_count(), 0);
    }

    #[tokio::test]
    async fn due_run_executes_like_a_direct_submit() {
        let f = fixture(MockHandler::returning(json!("mail"))).await;
        let ack = f.scheduler.schedule(request(), Duration::ZERO).await.unwrap();

        assert_eq!(f.worker.tick().await.unwrap(), Some(ScheduledRunStatus::Completed));
        assert_eq!(f.trigger.call_count(), 1);

        let lines: Vec<String> = f
            .worker
            .engine
            .run_log()
            .tail(&ack.run_id, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(lines.last().map(String::as_str), Some("Workflow executed."));

        let row = scheduled_runs::get(&f.pool, &ack.schedule_id).await.unwrap();
        assert_eq!(row.status(), Some(ScheduledRunStatus::Completed));
    }

    #[tokio::test]
    async fn failed_run_is_recorded() {
        let f = fixture(MockHandler::failing("mailbox offline")).await;
        let ack = f.scheduler.schedule(request(), Duration::ZERO).await.unwrap();

        assert_eq!(f.worker.tick().await.unwrap(), Some(ScheduledRunStatus::Failed));
        let row = scheduled_runs::get(&f.pool, &ack.schedule_id).await.unwrap();
        assert!(row.last_error.unwrap().contains("mailbox offline"));
    }

    #[tokio::test]
    async fn run_loop_fires_due_runs_until_shutdown() {
        let f = fixture(MockHandler::returning(json!("mail"))).await;
        let ack = f.scheduler.schedule(request(), Duration::from_millis(50)).await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(f.worker.clone().run(shutdown.clone()));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let row = scheduled_runs::get(&f.pool, &ack.schedule_id).await.unwrap();
            if row.status() == Some(ScheduledRunStatus::Completed) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "scheduled run never completed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(f.trigger.call_count(), 1);
    }

    async fn wait_for_status(pool: &DbPool, id: &str, status: ScheduledRunStatus) -> ScheduledRunRow {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let row = scheduled_runs::get(pool, id).await.unwrap();
            if row.status() == Some(status) {
                return row;
            }
            assert!(tokio::time::Instant::now() < deadline, "run never reached {status}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn starting_a_worker_leaves_live_claims_alone() {
        let f = fixture(MockHandler::returning(json!("mail"))).await;
        let ack = f.scheduler.schedule(request(), Duration::ZERO).await.unwrap();

        // A claims the run but has not executed it yet.
        let a = f.worker.clone();
        let claimed = a.claim().await.unwrap().expect("run is due");

        // B starts against the same database while A holds the claim.
        let b = Worker::new(f.pool.clone(), f.worker.engine.clone(), f.worker.config.clone());
        assert_ne!(a.id(), b.id());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(b.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(a.execute(claimed).await.unwrap(), ScheduledRunStatus::Completed);
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(f.trigger.call_count(), 1);
        let row = scheduled_runs::get(&f.pool, &ack.schedule_id).await.unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.claimed_by.as_deref(), Some(a.id()));
    }

    #[tokio::test]
    async fn abandoned_claims_are_picked_up_after_the_lease() {
        let f = fixture(MockHandler::returning(json!("mail"))).await;
        let ack = f.scheduler.schedule(request(), Duration::ZERO).await.unwrap();

        // This claim is never executed or refreshed, as if its worker died.
        f.worker.claim().await.unwrap().expect("run is due");

        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_millis(100),
        };
        let rescuer = Worker::new(f.pool.clone(), f.worker.engine.clone(), config);
        let rescuer_id = rescuer.id().to_owned();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(rescuer.run(shutdown.clone()));

        let row = wait_for_status(&f.pool, &ack.schedule_id, ScheduledRunStatus::Completed).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(row.attempts, 2);
        assert_eq!(row.claimed_by, Some(rescuer_id));
        assert_eq!(f.trigger.call_count(), 1);
    }

    #[tokio::test]
    async fn scheduled_run_log_is_readable_from_another_engine() {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let shared_log = |pool: &DbPool| {
            Arc::new(RunLog::new(
                Arc::new(SqliteLogStore::new(pool.clone())),
                RunLogConfig::default(),
            ))
        };
        let registry = HandlerRegistry::new()
            .with(StepKind::Trigger, "mailbox", Arc::new(MockHandler::returning(json!("mail"))))
            .with(StepKind::Action, "notes", Arc::new(MockHandler::echo_trigger()));
        let worker_engine = WorkflowEngine::new(Arc::new(registry), shared_log(&pool));
        let worker = Worker::new(pool.clone(), worker_engine, WorkerConfig::default());
        // What an API process serving the same database would read.
        let api_log = shared_log(&pool);

        let ack = DeferredScheduler::new(pool.clone())
            .schedule(request(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(worker.tick().await.unwrap(), Some(ScheduledRunStatus::Completed));

        let lines: Vec<String> = api_log
            .tail(&ack.run_id, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(lines.first().map(String::as_str), Some("Workflow started."));
        assert_eq!(lines.last().map(String::as_str), Some("Workflow executed."));
    }

    /// Trigger that takes a while to answer.
    struct SlowHandler {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StepHandler for SlowHandler {
        async fn execute(
            &self,
            _step: &Step,
            _ctx: &ExecutionContext,
            _credentials: &Credentials,
        ) -> Result<Value, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(json!("mail"))
        }
    }

    #[tokio::test]
    async fn long_runs_keep_their_lease() {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let slow = Arc::new(SlowHandler {
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        });
        let registry = HandlerRegistry::new().with(StepKind::Trigger, "mailbox", slow.clone());
        let engine = WorkflowEngine::new(Arc::new(registry), Arc::new(RunLog::default()));
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_millis(90),
        };
        let holder = Worker::new(pool.clone(), engine.clone(), config.clone());
        let watcher = Worker::new(pool.clone(), engine, config);

        let scheduler = DeferredScheduler::new(pool.clone());
        let single = RunRequest::new("wf", vec![Step::trigger("t", "mailbox")], vec![]);
        let ack = scheduler.schedule(single, Duration::ZERO).await.unwrap();
        let claimed = holder.claim().await.unwrap().expect("run is due");

        // The watcher re-queues stale claims the whole time the holder's
        // run is in progress.
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(shutdown.clone()));
        assert_eq!(holder.execute(claimed).await.unwrap(), ScheduledRunStatus::Completed);
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
        let row = scheduled_runs::get(&pool, &ack.schedule_id).await.unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.status(), Some(ScheduledRunStatus::Completed));
    }
}
