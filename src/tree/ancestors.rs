use rusqlite::Connection;

use crate::error::FileTreeError;
use crate::node::TreeNode;

use super::{load_node, FileTree};

impl FileTree {
    /// The chain from the scope root down to `inode`, inclusive: `[root, ..., parent, self]`.
    pub fn find_ancestors(&self, inode: &str) -> Result<Vec<TreeNode>, FileTreeError> {
        let conn = self.db.get_connection()?;
        let node = load_node(&conn, inode)?;

        let mut chain = vec![node];
        loop {
            let current = &chain[chain.len() - 1];
            if current.is_root() {
                break;
            }
            if chain.len() > self.settings.max_tree_depth {
                return Err(too_deep(inode, self.settings.max_tree_depth));
            }

            let parent = TreeNode::get_by_inode(&conn, current.pinode())?.ok_or_else(|| {
                FileTreeError::NotFound(format!(
                    "broken ancestor chain: parent '{}' of '{}' does not exist",
                    current.pinode(),
                    current.inode()
                ))
            })?;
            chain.push(parent);
        }

        chain.reverse();
        Ok(chain)
    }
}

/// Fail unless `destination` lies outside the subtree rooted at `source_inode`.
///
/// Walks up from the destination itself, so moving a node under itself is
/// rejected too.
pub(crate) fn ensure_outside_subtree(
    conn: &Connection,
    source_inode: &str,
    destination: &TreeNode,
    max_depth: usize,
) -> Result<(), FileTreeError> {
    let mut current = destination.clone();
    let mut depth = 0;

    loop {
        if current.inode() == source_inode {
            return Err(FileTreeError::InvalidState(format!(
                "'{}' is inside the subtree of '{}'",
                destination.inode(),
                source_inode
            )));
        }
        if current.is_root() {
            return Ok(());
        }

        depth += 1;
        if depth > max_depth {
            return Err(too_deep(destination.inode(), max_depth));
        }
        current = load_node(conn, current.pinode())?;
    }
}

fn too_deep(inode: &str, max_depth: usize) -> FileTreeError {
    FileTreeError::InvalidState(format!(
        "parent chain of '{}' exceeds {} levels",
        inode, max_depth
    ))
}
