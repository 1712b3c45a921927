use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::FileTreeError;

use super::job_status::JobStatus;
use super::job_type::JobType;

const JOB_COLUMNS: &str = "job_id, job_type, status, source_inode, target_inode, requested_by,
     retry_of, nodes_processed, failure_count, error, created_at, started_at, ended_at";

/// Durable record of a subtree job. Maps to the `tree_jobs` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    job_id: i64,
    job_type: JobType,
    status: JobStatus,
    source_inode: String,
    target_inode: Option<String>,
    requested_by: String,
    retry_of: Option<i64>,
    nodes_processed: i64,
    failure_count: i64,
    error: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    ended_at: Option<i64>,
}

/// One work item a job could not complete. Maps to `tree_job_failures`.
///
/// `work_item` holds the serialized item so a retry can replay it verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    failure_id: i64,
    job_id: i64,
    work_item: String,
    error: String,
    created_at: i64,
}

impl JobRecord {
    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn source_inode(&self) -> &str {
        &self.source_inode
    }

    pub fn target_inode(&self) -> Option<&str> {
        self.target_inode.as_deref()
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn retry_of(&self) -> Option<i64> {
        self.retry_of
    }

    pub fn nodes_processed(&self) -> i64 {
        self.nodes_processed
    }

    pub fn failure_count(&self) -> i64 {
        self.failure_count
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn started_at(&self) -> Option<i64> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<i64> {
        self.ended_at
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(JobRecord {
            job_id: row.get(0)?,
            job_type: JobType::from_i64(row.get(1)?),
            status: JobStatus::from_i64(row.get(2)?),
            source_inode: row.get(3)?,
            target_inode: row.get(4)?,
            requested_by: row.get(5)?,
            retry_of: row.get(6)?,
            nodes_processed: row.get(7)?,
            failure_count: row.get(8)?,
            error: row.get(9)?,
            created_at: row.get(10)?,
            started_at: row.get(11)?,
            ended_at: row.get(12)?,
        })
    }

    /// Insert a Pending job and return its id.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        conn: &Connection,
        job_type: JobType,
        source_inode: &str,
        target_inode: Option<&str>,
        requested_by: &str,
        retry_of: Option<i64>,
        now: i64,
    ) -> Result<i64, FileTreeError> {
        let job_id: i64 = conn.query_row(
            "INSERT INTO tree_jobs (
                job_type, status, source_inode, target_inode, requested_by, retry_of,
                nodes_processed, failure_count, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?)
             RETURNING job_id",
            params![
                job_type.as_i64(),
                JobStatus::Pending.as_i64(),
                source_inode,
                target_inode,
                requested_by,
                retry_of,
                now,
            ],
            |row| row.get(0),
        )?;
        Ok(job_id)
    }

    pub fn get_by_id(conn: &Connection, job_id: i64) -> Result<Option<Self>, FileTreeError> {
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM tree_jobs WHERE job_id = ?"),
            [job_id],
            Self::from_row,
        )
        .optional()
        .map_err(FileTreeError::DatabaseError)
    }

    /// Most recent jobs first, optionally only those in `status`.
    pub fn list(
        conn: &Connection,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Self>, FileTreeError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM tree_jobs
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY job_id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![status.map(|s| s.as_i64()), limit], Self::from_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    pub fn mark_running(conn: &Connection, job_id: i64, now: i64) -> Result<(), FileTreeError> {
        conn.execute(
            "UPDATE tree_jobs SET status = ?1, started_at = ?2 WHERE job_id = ?3",
            params![JobStatus::Running.as_i64(), now, job_id],
        )?;
        Ok(())
    }

    pub fn update_progress(
        conn: &Connection,
        job_id: i64,
        nodes_processed: i64,
        failure_count: i64,
    ) -> Result<(), FileTreeError> {
        conn.execute(
            "UPDATE tree_jobs SET nodes_processed = ?1, failure_count = ?2 WHERE job_id = ?3",
            params![nodes_processed, failure_count, job_id],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        conn: &Connection,
        job_id: i64,
        status: JobStatus,
        nodes_processed: i64,
        failure_count: i64,
        error: Option<&str>,
        now: i64,
    ) -> Result<(), FileTreeError> {
        conn.execute(
            "UPDATE tree_jobs SET
                status = ?1, nodes_processed = ?2, failure_count = ?3, error = ?4, ended_at = ?5
             WHERE job_id = ?6",
            params![status.as_i64(), nodes_processed, failure_count, error, now, job_id],
        )?;
        Ok(())
    }

    /// Jobs left Pending or Running by a process that exited are marked Error.
    /// Returns how many rows were closed out.
    pub fn fail_interrupted(conn: &Connection, now: i64) -> Result<usize, FileTreeError> {
        let updated = conn.execute(
            "UPDATE tree_jobs SET status = ?1, error = ?2, ended_at = ?3
             WHERE status IN (?4, ?5)",
            params![
                JobStatus::Error.as_i64(),
                "interrupted before completion",
                now,
                JobStatus::Pending.as_i64(),
                JobStatus::Running.as_i64(),
            ],
        )?;
        Ok(updated)
    }
}

impl JobFailure {
    pub fn failure_id(&self) -> i64 {
        self.failure_id
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn work_item(&self) -> &str {
        &self.work_item
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn create(
        conn: &Connection,
        job_id: i64,
        work_item: &str,
        error: &str,
        now: i64,
    ) -> Result<(), FileTreeError> {
        conn.execute(
            "INSERT INTO tree_job_failures (job_id, work_item, error, created_at)
             VALUES (?, ?, ?, ?)",
            params![job_id, work_item, error, now],
        )?;
        Ok(())
    }

    /// Failures recorded for `job_id`, in the order they happened.
    pub fn list_by_job(conn: &Connection, job_id: i64) -> Result<Vec<Self>, FileTreeError> {
        let mut stmt = conn.prepare(
            "SELECT failure_id, job_id, work_item, error, created_at
             FROM tree_job_failures
             WHERE job_id = ?
             ORDER BY failure_id ASC",
        )?;
        let rows = stmt.query_map([job_id], |row| {
            Ok(JobFailure {
                failure_id: row.get(0)?,
                job_id: row.get(1)?,
                work_item: row.get(2)?,
                error: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        let mut failures = Vec::new();
        for row in rows {
            failures.push(row?);
        }
        Ok(failures)
    }
}
