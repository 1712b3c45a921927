use rusqlite::Connection;

use crate::error::FileTreeError;

use super::context::JobContext;
use super::job_type::JobType;

/// A unit of background work over a subtree.
///
/// `JobManager` records the job, hands it a pooled connection on a worker
/// thread and turns the outcome (plus anything recorded in the context) into
/// the final `tree_jobs` status. The trait is object-safe so the manager can
/// queue `Box<dyn Job>`.
pub trait Job: Send {
    /// Walk the subtree. Per-node failures go to `ctx.record_failure` and the walk
    /// continues; returning `Err` aborts the whole job.
    fn run(&mut self, conn: &Connection, ctx: &mut JobContext) -> Result<(), FileTreeError>;

    fn job_type(&self) -> JobType;

    /// Top node the job was dispatched for (the copied or deleted directory)
    fn source_inode(&self) -> &str;

    /// Top node produced by the job's trigger, if any (the new copy)
    fn target_inode(&self) -> Option<&str>;

    /// Human-readable action name for logs (e.g., "Copying subtree")
    fn action(&self) -> &str;

    /// Work items not yet run, serialized the way `ctx.record_failure` stores
    /// them. Recorded as failures when the job cannot start, so a retry can
    /// pick them up.
    fn remaining_work(&self) -> Result<Vec<String>, FileTreeError> {
        Ok(Vec::new())
    }
}
