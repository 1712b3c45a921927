use log::{debug, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::FileTreeError;
use crate::job::{Job, JobContext, JobType};
use crate::node::TreeNode;
use crate::node_history::TreeNodeHistory;
use crate::node_meta::TreeNodeMeta;

use super::load_node;
use super::relocate::duplicate_node;

/// One step of a subtree walk. Failed items are stored as JSON in
/// `tree_job_failures` and replayed as-is by a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkItem {
    /// Queue a `CopyNode` for every child of `from`, targeting `into`
    CopyChildren { from: String, into: String },
    /// Duplicate `source` under `into`; directories queue their own children
    CopyNode { source: String, into: String },
    /// Queue a `DeleteNode` for every child of `of`
    DeleteChildren { of: String },
    /// Remove `inode` with its meta and history; directories queue their children
    DeleteNode { inode: String },
}

impl WorkItem {
    /// Apply the item and return the follow-up items it produced.
    fn execute(
        &self,
        conn: &Connection,
        ctx: &JobContext,
        user_id: &str,
    ) -> Result<Vec<WorkItem>, FileTreeError> {
        match self {
            WorkItem::CopyChildren { from, into } => Ok(TreeNode::list_by_pinode(conn, from)?
                .into_iter()
                .map(|child| WorkItem::CopyNode {
                    source: child.inode().to_owned(),
                    into: into.clone(),
                })
                .collect()),

            WorkItem::CopyNode { source, into } => {
                let copy = Database::immediate_transaction(conn, |conn| {
                    let source = load_node(conn, source)?;
                    let dest = load_node(conn, into)?;
                    let copy = duplicate_node(conn, &source, dest.inode(), user_id)?;
                    Ok((source, copy))
                })?;

                let (source, copy) = copy;
                debug!("Copied '{}' to '{}'", source.inode(), copy.inode());
                if source.is_dir() {
                    Ok(vec![WorkItem::CopyChildren {
                        from: source.inode().to_owned(),
                        into: copy.inode().to_owned(),
                    }])
                } else {
                    Ok(Vec::new())
                }
            }

            WorkItem::DeleteChildren { of } => Ok(TreeNode::list_by_pinode(conn, of)?
                .into_iter()
                .map(|child| WorkItem::DeleteNode {
                    inode: child.inode().to_owned(),
                })
                .collect()),

            WorkItem::DeleteNode { inode } => {
                let removed = Database::immediate_transaction(conn, |conn| {
                    let Some(node) = TreeNode::get_by_inode(conn, inode)? else {
                        return Ok(None);
                    };
                    TreeNodeMeta::delete_by_inode(conn, inode)?;
                    TreeNode::delete_by_inode(conn, inode)?;
                    Ok(Some(node))
                })?;

                let Some(node) = removed else {
                    debug!("Node '{}' already gone, nothing to delete", inode);
                    return Ok(Vec::new());
                };

                // Behind any snapshot of this node still waiting on the side channel
                let history_inode = inode.clone();
                ctx.spawn_side_task(conn, "discard history", move |conn| {
                    TreeNodeHistory::delete_by_inode(conn, &history_inode).map(|_| ())
                });

                if node.is_dir() {
                    Ok(vec![WorkItem::DeleteChildren {
                        of: inode.clone(),
                    }])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    /// The kind of job this item belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            WorkItem::CopyChildren { .. } | WorkItem::CopyNode { .. } => JobType::CopySubtree,
            WorkItem::DeleteChildren { .. } | WorkItem::DeleteNode { .. } => {
                JobType::DeleteSubtree
            }
        }
    }

    /// Whether completing this item accounts for one node.
    fn touches_node(&self) -> bool {
        matches!(self, WorkItem::CopyNode { .. } | WorkItem::DeleteNode { .. })
    }
}

/// Depth-first walk over an explicit stack. Children are pushed in reverse so
/// they are visited in listing order.
fn drain(
    conn: &Connection,
    ctx: &mut JobContext,
    pending: &mut Vec<WorkItem>,
    user_id: &str,
) -> Result<(), FileTreeError> {
    while let Some(item) = pending.pop() {
        match item.execute(conn, ctx, user_id) {
            Ok(mut next) => {
                if item.touches_node() {
                    ctx.record_processed(conn)?;
                }
                next.reverse();
                pending.extend(next);
            }
            Err(e) => ctx.record_failure(conn, &item, &e)?,
        }
    }
    ctx.flush(conn)
}

/// Pending items in run order, as JSON.
fn serialize_pending(pending: &[WorkItem]) -> Result<Vec<String>, FileTreeError> {
    pending
        .iter()
        .rev()
        .map(|item| serde_json::to_string(item).map_err(FileTreeError::from))
        .collect()
}

/// Copies the descendants of `source_inode` under `target_inode`, the copy of
/// the top node that was made synchronously.
pub struct SubtreeCopyJob {
    source_inode: String,
    target_inode: String,
    user_id: String,
    pending: Vec<WorkItem>,
}

impl SubtreeCopyJob {
    pub fn new(source_inode: &str, target_inode: &str, user_id: &str) -> Self {
        Self::resume(
            source_inode,
            target_inode,
            user_id,
            vec![WorkItem::CopyChildren {
                from: source_inode.to_owned(),
                into: target_inode.to_owned(),
            }],
        )
    }

    /// Continue from explicit work items (the failures of an earlier run).
    pub fn resume(
        source_inode: &str,
        target_inode: &str,
        user_id: &str,
        mut items: Vec<WorkItem>,
    ) -> Self {
        items.reverse();
        SubtreeCopyJob {
            source_inode: source_inode.to_owned(),
            target_inode: target_inode.to_owned(),
            user_id: user_id.to_owned(),
            pending: items,
        }
    }
}

impl Job for SubtreeCopyJob {
    fn run(&mut self, conn: &Connection, ctx: &mut JobContext) -> Result<(), FileTreeError> {
        let _tmr = timer!(Level::Debug; "SubtreeCopyJob::run", "{} -> {}", self.source_inode, self.target_inode);
        drain(conn, ctx, &mut self.pending, &self.user_id)
    }

    fn job_type(&self) -> JobType {
        JobType::CopySubtree
    }

    fn source_inode(&self) -> &str {
        &self.source_inode
    }

    fn target_inode(&self) -> Option<&str> {
        Some(&self.target_inode)
    }

    fn action(&self) -> &str {
        "Copying subtree"
    }

    fn remaining_work(&self) -> Result<Vec<String>, FileTreeError> {
        serialize_pending(&self.pending)
    }
}

/// Removes every descendant of `root_inode`, whose own row is already gone.
pub struct SubtreeDeleteJob {
    root_inode: String,
    pending: Vec<WorkItem>,
}

impl SubtreeDeleteJob {
    pub fn new(root_inode: &str) -> Self {
        Self::resume(
            root_inode,
            vec![WorkItem::DeleteChildren {
                of: root_inode.to_owned(),
            }],
        )
    }

    pub fn resume(root_inode: &str, mut items: Vec<WorkItem>) -> Self {
        items.reverse();
        SubtreeDeleteJob {
            root_inode: root_inode.to_owned(),
            pending: items,
        }
    }
}

impl Job for SubtreeDeleteJob {
    fn run(&mut self, conn: &Connection, ctx: &mut JobContext) -> Result<(), FileTreeError> {
        let _tmr = timer!(Level::Debug; "SubtreeDeleteJob::run", "{}", self.root_inode);
        drain(conn, ctx, &mut self.pending, "")
    }

    fn job_type(&self) -> JobType {
        JobType::DeleteSubtree
    }

    fn source_inode(&self) -> &str {
        &self.root_inode
    }

    fn target_inode(&self) -> Option<&str> {
        None
    }

    fn action(&self) -> &str {
        "Deleting subtree"
    }

    fn remaining_work(&self) -> Result<Vec<String>, FileTreeError> {
        serialize_pending(&self.pending)
    }
}
