use log::warn;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::FileTreeError;
use crate::job_manager::SideChannel;
use crate::utils::Utils;

use super::job_record::{JobFailure, JobRecord};

/// Counters are written to `tree_jobs` every this many processed nodes.
const PROGRESS_FLUSH_INTERVAL: i64 = 100;

/// Per-run bookkeeping handed to [`super::Job::run`].
///
/// Tracks processed nodes and failures in memory and mirrors them into the job
/// row so `jobs` listings show progress while a large subtree is being walked.
pub struct JobContext {
    job_id: i64,
    nodes_processed: i64,
    failure_count: i64,
    first_error: Option<String>,
    side_channel: Option<SideChannel>,
}

impl JobContext {
    pub fn new(job_id: i64) -> Self {
        JobContext {
            job_id,
            nodes_processed: 0,
            failure_count: 0,
            first_error: None,
            side_channel: None,
        }
    }

    /// Context for a job run by the manager: side tasks go behind the ones
    /// already queued by requests.
    pub fn with_side_channel(job_id: i64, side_channel: SideChannel) -> Self {
        JobContext {
            side_channel: Some(side_channel),
            ..Self::new(job_id)
        }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn nodes_processed(&self) -> i64 {
        self.nodes_processed
    }

    pub fn failure_count(&self) -> i64 {
        self.failure_count
    }

    pub fn first_error(&self) -> Option<&str> {
        self.first_error.as_deref()
    }

    pub fn record_processed(&mut self, conn: &Connection) -> Result<(), FileTreeError> {
        self.nodes_processed += 1;
        if self.nodes_processed % PROGRESS_FLUSH_INTERVAL == 0 {
            self.flush(conn)?;
        }
        Ok(())
    }

    /// Log and persist a failed work item, then let the walk continue.
    pub fn record_failure<T: Serialize>(
        &mut self,
        conn: &Connection,
        item: &T,
        error: &FileTreeError,
    ) -> Result<(), FileTreeError> {
        let item_json = serde_json::to_string(item)?;
        warn!("Job {}: work item {} failed: {}", self.job_id, item_json, error);

        let message = error.to_string();
        JobFailure::create(conn, self.job_id, &item_json, &message, Utils::now_secs())?;

        self.failure_count += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message);
        }
        Ok(())
    }

    /// Best-effort work that must stay ordered with request side tasks (history).
    /// Without a side channel it runs inline on `conn`. Failures are only logged.
    pub fn spawn_side_task<F>(&self, conn: &Connection, label: &'static str, f: F)
    where
        F: FnOnce(&Connection) -> Result<(), FileTreeError> + Send + 'static,
    {
        match &self.side_channel {
            Some(side_channel) => side_channel.spawn(label, f),
            None => {
                if let Err(e) = f(conn) {
                    warn!("Job {}: side task '{}' failed: {}", self.job_id, label, e);
                }
            }
        }
    }

    pub fn flush(&self, conn: &Connection) -> Result<(), FileTreeError> {
        JobRecord::update_progress(conn, self.job_id, self.nodes_processed, self.failure_count)
    }
}
