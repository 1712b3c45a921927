use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use crate::database::Database;
use crate::error::FileTreeError;
use crate::job::{Job, JobContext, JobFailure, JobRecord, JobStatus, JobType};
use crate::utils::Utils;

/// Buffered events per subscriber before new events are dropped for it.
const EVENT_BUFFER: usize = 256;

/// Published when a job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub nodes_processed: i64,
    pub failure_count: i64,
}

type Subscribers = Arc<Mutex<Vec<Sender<JobEvent>>>>;

/// Runs subtree jobs on a worker pool and best-effort side tasks on a
/// single FIFO thread.
///
/// Every job is recorded in `tree_jobs` before it is queued, so its outcome
/// can be inspected (and its failures retried) after the request that started
/// it has returned.
pub struct JobManager {
    db: Database,
    workers: ThreadPool,
    side_channel: SideChannel,
    subscribers: Subscribers,
}

/// Single FIFO thread for best-effort tasks. Clones feed the same thread.
#[derive(Clone)]
pub struct SideChannel {
    db: Database,
    pool: ThreadPool,
}

impl SideChannel {
    fn new(db: Database) -> Self {
        SideChannel {
            db,
            pool: ThreadPool::with_name("filetree-side".into(), 1),
        }
    }

    /// Queue `f` behind every task already queued. Failures are logged and dropped.
    pub fn spawn<F>(&self, label: &'static str, f: F)
    where
        F: FnOnce(&Connection) -> Result<(), FileTreeError> + Send + 'static,
    {
        let db = self.db.clone();
        self.pool.execute(move || {
            let result = db.get_connection().and_then(|conn| f(&conn));
            if let Err(e) = result {
                error!("Side task '{}' failed: {}", label, e);
            }
        });
    }

    fn join(&self) {
        self.pool.join();
    }
}

impl JobManager {
    pub fn new(db: Database, worker_count: usize) -> Self {
        JobManager {
            side_channel: SideChannel::new(db.clone()),
            db,
            workers: ThreadPool::with_name("filetree-job".into(), worker_count.max(1)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Close out jobs a previous process left Pending or Running.
    pub fn recover_interrupted(&self) -> Result<usize, FileTreeError> {
        let conn = self.db.get_connection()?;
        let closed = JobRecord::fail_interrupted(&conn, Utils::now_secs())?;
        if closed > 0 {
            info!("Marked {} interrupted job(s) as failed", closed);
        }
        Ok(closed)
    }

    /// Record `job` as Pending and queue it. Returns the job id.
    pub fn submit(
        &self,
        job: Box<dyn Job>,
        requested_by: &str,
        retry_of: Option<i64>,
    ) -> Result<i64, FileTreeError> {
        let conn = self.db.get_connection()?;
        let job_id = JobRecord::create(
            &conn,
            job.job_type(),
            job.source_inode(),
            job.target_inode(),
            requested_by,
            retry_of,
            Utils::now_secs(),
        )?;
        drop(conn);

        debug!(
            "Queued job {} ({}) for node '{}'",
            job_id,
            job.job_type(),
            job.source_inode()
        );

        let db = self.db.clone();
        let side_channel = self.side_channel.clone();
        let subscribers = Arc::clone(&self.subscribers);
        self.workers
            .execute(move || Self::run_job(db, side_channel, job_id, job, subscribers));

        Ok(job_id)
    }

    /// Queue best-effort work (history snapshots and pruning). Tasks run one at
    /// a time in submission order; failures are logged and otherwise dropped.
    pub fn spawn_side_task<F>(&self, label: &'static str, f: F)
    where
        F: FnOnce(&Connection) -> Result<(), FileTreeError> + Send + 'static,
    {
        self.side_channel.spawn(label, f);
    }

    /// Receive an event for every job that finishes after this call.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = bounded(EVENT_BUFFER);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Block until every queued job and side task has run.
    pub fn wait_idle(&self) {
        // Running jobs queue side tasks; the side channel never queues jobs.
        self.workers.join();
        self.side_channel.join();
    }

    pub fn active_count(&self) -> usize {
        self.workers.active_count() + self.workers.queued_count()
    }

    fn run_job(
        db: Database,
        side_channel: SideChannel,
        job_id: i64,
        mut job: Box<dyn Job>,
        subscribers: Subscribers,
    ) {
        let _tmr = timer!(Level::Debug; "JobManager::run_job", "job {}", job_id);

        let conn = match db.get_connection() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Job {} could not get a connection: {}", job_id, e);
                let failure_count = Self::fail_unstarted(&db, job_id, &*job, &e);
                Self::broadcast(
                    &subscribers,
                    JobEvent {
                        job_id,
                        job_type: job.job_type(),
                        status: JobStatus::Error,
                        nodes_processed: 0,
                        failure_count,
                    },
                );
                return;
            }
        };

        info!("{} '{}' (job {})", job.action(), job.source_inode(), job_id);

        let mut ctx = JobContext::with_side_channel(job_id, side_channel);
        let result = JobRecord::mark_running(&conn, job_id, Utils::now_secs())
            .and_then(|_| job.run(&conn, &mut ctx));

        let (status, error_msg) = match result {
            Err(e) => {
                error!("Job {} aborted: {}", job_id, e);
                (JobStatus::Error, Some(e.to_string()))
            }
            Ok(()) if ctx.failure_count() > 0 => (
                JobStatus::Error,
                ctx.first_error().map(str::to_owned),
            ),
            Ok(()) => (JobStatus::Completed, None),
        };

        if let Err(e) = JobRecord::finish(
            &conn,
            job_id,
            status,
            ctx.nodes_processed(),
            ctx.failure_count(),
            error_msg.as_deref(),
            Utils::now_secs(),
        ) {
            error!("Job {} could not record its final status: {}", job_id, e);
        }

        info!(
            "Job {} finished: {} ({} processed, {} failed)",
            job_id,
            status,
            ctx.nodes_processed(),
            ctx.failure_count()
        );

        Self::broadcast(
            &subscribers,
            JobEvent {
                job_id,
                job_type: job.job_type(),
                status,
                nodes_processed: ctx.nodes_processed(),
                failure_count: ctx.failure_count(),
            },
        );
    }

    /// Close out a job that never got to run, on a connection outside the pool.
    /// Its remaining work is stored as failures so it can be retried. Returns
    /// the failure count written.
    fn fail_unstarted(db: &Database, job_id: i64, job: &dyn Job, cause: &FileTreeError) -> i64 {
        let message = cause.to_string();
        let result = job.remaining_work().and_then(|items| {
            let conn = db.connect_unpooled()?;
            let now = Utils::now_secs();
            Database::immediate_transaction(&conn, |conn| {
                for item in &items {
                    JobFailure::create(conn, job_id, item, &message, now)?;
                }
                let failure_count = i64::try_from(items.len()).unwrap_or(i64::MAX);
                JobRecord::finish(conn, job_id, JobStatus::Error, 0, failure_count, Some(&message), now)?;
                Ok(failure_count)
            })
        });

        match result {
            Ok(failure_count) => failure_count,
            Err(e) => {
                error!("Job {} could not record its failure: {}", job_id, e);
                0
            }
        }
    }

    fn broadcast(subscribers: &Subscribers, event: JobEvent) {
        let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Dropping event for job {}: subscriber is full", event.job_id);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}
