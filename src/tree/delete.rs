use log::info;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::FileTreeError;
use crate::identity::Identity;
use crate::node::TreeNode;
use crate::node_history::TreeNodeHistory;
use crate::node_meta::TreeNodeMeta;

use super::subtree::SubtreeDeleteJob;
use super::{load_node, FileTree};

/// Result of [`FileTree::delete`]: the node as it was before deletion, plus the
/// background job removing its descendants when it was a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub node: TreeNode,
    pub job_id: Option<i64>,
}

impl FileTree {
    pub fn delete(&self, identity: &Identity, inode: &str) -> Result<DeleteOutcome, FileTreeError> {
        identity.ensure_present()?;

        let conn = self.db.get_connection()?;
        let node = Database::immediate_transaction(&conn, |conn| {
            let node = load_node(conn, inode)?;
            TreeNodeMeta::delete_by_inode(conn, node.inode())?;
            TreeNode::delete_by_inode(conn, node.inode())?;
            Ok(node)
        })?;
        drop(conn);

        // Queued behind any snapshot still pending for this inode
        let history_inode = node.inode().to_owned();
        self.jobs.spawn_side_task("discard history", move |conn| {
            TreeNodeHistory::delete_by_inode(conn, &history_inode).map(|_| ())
        });

        info!(
            "Deleted {} '{}' ({}) by {}",
            node.node_type().long_name(),
            node.name(),
            node.inode(),
            identity.user_id()
        );

        let job_id = if node.is_dir() {
            let job = SubtreeDeleteJob::new(node.inode());
            Some(self.jobs.submit(Box::new(job), identity.user_id(), None)?)
        } else {
            None
        };

        Ok(DeleteOutcome { node, job_id })
    }
}
