use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::FileTreeError;
use crate::identity::Identity;
use crate::naming::resolve_sibling_name;
use crate::node::TreeNode;
use crate::node_history::TreeNodeHistory;
use crate::node_meta::TreeNodeMeta;
use crate::utils::Utils;

use super::ancestors::ensure_outside_subtree;
use super::subtree::SubtreeCopyJob;
use super::{load_node, FileTree};

/// Result of [`FileTree::copy`]. `job_id` is set when the source was a
/// directory and its descendants are being copied in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub node: TreeNode,
    pub job_id: Option<i64>,
}

impl FileTree {
    /// Re-parent `inode` under `destination`. Moving a node to its current
    /// parent returns it unchanged.
    pub fn move_node(
        &self,
        identity: &Identity,
        inode: &str,
        destination: &str,
    ) -> Result<TreeNode, FileTreeError> {
        identity.ensure_present()?;
        let max_depth = self.settings.max_tree_depth;

        let conn = self.db.get_connection()?;
        let (node, snapshot) = Database::immediate_transaction(&conn, |conn| {
            let mut source = load_node(conn, inode)?;
            let dest = load_node(conn, destination)?;
            check_destination(&source, &dest, "move")?;

            if source.pinode() == dest.inode() {
                return Ok((source, None));
            }
            ensure_outside_subtree(conn, source.inode(), &dest, max_depth)?;

            let now = Utils::now_secs();
            let meta = TreeNodeMeta::get_by_inode(conn, source.inode())?;
            let snapshot = TreeNodeHistory::snapshot(&source, meta.as_ref(), now);

            let siblings = TreeNode::sibling_names(conn, dest.inode(), None)?;
            let name = resolve_sibling_name(source.name(), siblings.iter().map(String::as_str));

            TreeNode::move_to(conn, source.inode(), dest.inode(), &name, identity.user_id(), now)?;
            source.set_location(dest.inode(), name, identity.user_id(), now);
            Ok((source, Some(snapshot)))
        })?;

        match snapshot {
            Some(snapshot) => {
                self.record_history(snapshot);
                info!(
                    "Moved '{}' ({}) under '{}' by {}",
                    node.name(),
                    node.inode(),
                    node.pinode(),
                    identity.user_id()
                );
            }
            None => info!("Move of '{}' skipped: already under '{}'", inode, destination),
        }
        Ok(node)
    }

    /// Duplicate `inode` (and its meta) under `destination`.
    ///
    /// The top node is copied before this returns. A directory's descendants
    /// are copied by a background job whose id is returned in the outcome.
    pub fn copy(
        &self,
        identity: &Identity,
        inode: &str,
        destination: &str,
    ) -> Result<CopyOutcome, FileTreeError> {
        identity.ensure_present()?;
        let max_depth = self.settings.max_tree_depth;

        let conn = self.db.get_connection()?;
        let (source, node) = Database::immediate_transaction(&conn, |conn| {
            let source = load_node(conn, inode)?;
            let dest = load_node(conn, destination)?;
            check_destination(&source, &dest, "copy")?;
            ensure_outside_subtree(conn, source.inode(), &dest, max_depth)?;

            let node = duplicate_node(conn, &source, dest.inode(), identity.user_id())?;
            Ok((source, node))
        })?;
        drop(conn);

        info!(
            "Copied '{}' ({}) to '{}' ({}) by {}",
            source.name(),
            source.inode(),
            node.name(),
            node.inode(),
            identity.user_id()
        );

        let job_id = if source.is_dir() {
            let job = SubtreeCopyJob::new(source.inode(), node.inode(), identity.user_id());
            Some(self.jobs.submit(Box::new(job), identity.user_id(), None)?)
        } else {
            None
        };

        Ok(CopyOutcome { node, job_id })
    }
}

fn check_destination(source: &TreeNode, dest: &TreeNode, verb: &str) -> Result<(), FileTreeError> {
    if source.is_root() {
        return Err(FileTreeError::InvalidArgument(format!(
            "cannot {} scope root '{}'",
            verb,
            source.inode()
        )));
    }
    if !dest.is_dir() {
        return Err(FileTreeError::InvalidArgument(format!(
            "destination '{}' is not a directory",
            dest.inode()
        )));
    }
    if !source.same_scope(dest) {
        return Err(FileTreeError::InvalidArgument(format!(
            "cannot {} '{}' from scope '{}/{}' to scope '{}/{}'",
            verb,
            source.inode(),
            source.scope(),
            source.scope_id(),
            dest.scope(),
            dest.scope_id()
        )));
    }
    Ok(())
}

/// Insert a copy of `source` (with its meta, if any) under `dest_inode` and
/// return it. Children are not touched.
pub(crate) fn duplicate_node(
    conn: &Connection,
    source: &TreeNode,
    dest_inode: &str,
    user_id: &str,
) -> Result<TreeNode, FileTreeError> {
    let now = Utils::now_secs();
    let siblings = TreeNode::sibling_names(conn, dest_inode, None)?;
    let name = resolve_sibling_name(source.name(), siblings.iter().map(String::as_str));

    let copy = TreeNode::new(
        Utils::new_inode(),
        dest_inode.to_owned(),
        source.node_type(),
        source.scope().to_owned(),
        source.scope_id().to_owned(),
        name,
        source.desc().to_owned(),
        user_id,
        now,
    );
    TreeNode::create(conn, &copy)?;

    if let Some(meta) = TreeNodeMeta::get_by_inode(conn, source.inode())? {
        TreeNodeMeta::create(conn, &meta.duplicate_for(copy.inode(), now))?;
    }

    Ok(copy)
}
