use crossbeam_channel::Receiver;
use log::info;

use crate::error::FileTreeError;
use crate::identity::Identity;
use crate::job::{Job, JobFailure, JobRecord, JobStatus, JobType};
use crate::job_manager::JobEvent;

use super::subtree::{SubtreeCopyJob, SubtreeDeleteJob, WorkItem};
use super::FileTree;

impl FileTree {
    pub fn get_job(&self, job_id: i64) -> Result<JobRecord, FileTreeError> {
        let conn = self.db.get_connection()?;
        load_job(&conn, job_id)
    }

    /// Most recent first.
    pub fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<JobRecord>, FileTreeError> {
        let conn = self.db.get_connection()?;
        JobRecord::list(&conn, status, limit)
    }

    pub fn job_failures(&self, job_id: i64) -> Result<Vec<JobFailure>, FileTreeError> {
        let conn = self.db.get_connection()?;
        load_job(&conn, job_id)?;
        JobFailure::list_by_job(&conn, job_id)
    }

    /// Queue a new job that replays the failed work items of `job_id`.
    pub fn retry_job(&self, identity: &Identity, job_id: i64) -> Result<i64, FileTreeError> {
        identity.ensure_present()?;

        let conn = self.db.get_connection()?;
        let job = load_job(&conn, job_id)?;
        if !job.status().is_terminal() {
            return Err(FileTreeError::InvalidState(format!(
                "job {} is still {}",
                job_id,
                job.status()
            )));
        }

        let failures = JobFailure::list_by_job(&conn, job_id)?;
        if failures.is_empty() {
            return Err(FileTreeError::InvalidState(format!(
                "job {} has no failed work items to retry",
                job_id
            )));
        }
        drop(conn);

        let items = failures
            .iter()
            .map(|f| serde_json::from_str::<WorkItem>(f.work_item()))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(stray) = items.iter().find(|item| item.job_type() != job.job_type()) {
            return Err(FileTreeError::InvalidState(format!(
                "job {} is a {} job but holds a {} work item ({:?})",
                job_id,
                job.job_type(),
                stray.job_type(),
                stray
            )));
        }

        let retry: Box<dyn Job> = match job.job_type() {
            JobType::CopySubtree => {
                let target = job.target_inode().ok_or_else(|| {
                    FileTreeError::Internal(format!("copy job {} has no target node", job_id))
                })?;
                Box::new(SubtreeCopyJob::resume(
                    job.source_inode(),
                    target,
                    identity.user_id(),
                    items,
                ))
            }
            JobType::DeleteSubtree => Box::new(SubtreeDeleteJob::resume(job.source_inode(), items)),
        };

        let retry_id = self.jobs.submit(retry, identity.user_id(), Some(job_id))?;
        info!(
            "Retrying {} failed item(s) of job {} as job {}",
            failures.len(),
            job_id,
            retry_id
        );
        Ok(retry_id)
    }

    /// Receive an event for each job that finishes from now on.
    pub fn subscribe_jobs(&self) -> Receiver<JobEvent> {
        self.jobs.subscribe()
    }

    /// Block until all queued subtree jobs and history writes have run.
    pub fn wait_idle(&self) {
        self.jobs.wait_idle();
    }
}

fn load_job(conn: &rusqlite::Connection, job_id: i64) -> Result<JobRecord, FileTreeError> {
    JobRecord::get_by_id(conn, job_id)?
        .ok_or_else(|| FileTreeError::NotFound(format!("job {} does not exist", job_id)))
}
