use log::debug;

use crate::error::FileTreeError;
use crate::identity::Identity;
use crate::node::TreeNode;
use crate::node_history::TreeNodeHistory;
use crate::node_meta::TreeNodeMeta;
use crate::utils::Utils;

use super::{load_node, FileTree};

impl FileTree {
    /// Snapshot the current state of `inode`. The state is read now; the write
    /// happens on the history side channel.
    pub fn create_history(&self, identity: &Identity, inode: &str) -> Result<(), FileTreeError> {
        identity.ensure_present()?;

        let conn = self.db.get_connection()?;
        let node = load_node(&conn, inode)?;
        let meta = TreeNodeMeta::get_by_inode(&conn, inode)?;
        self.record_history(TreeNodeHistory::snapshot(&node, meta.as_ref(), Utils::now_secs()));
        Ok(())
    }

    /// Snapshots of `inode`, newest first.
    pub fn query_history(&self, inode: &str) -> Result<Vec<TreeNodeHistory>, FileTreeError> {
        let conn = self.db.get_connection()?;
        TreeNodeHistory::list_by_inode(&conn, inode)
    }

    /// Prune to make room and append `snapshot`, best-effort.
    pub(crate) fn record_history(&self, snapshot: TreeNodeHistory) {
        let keep = self.settings.history_retention.saturating_sub(1);

        self.jobs.spawn_side_task("record history", move |conn| {
            if TreeNode::get_by_inode(conn, snapshot.inode())?.is_none() {
                debug!("Node '{}' is gone, dropping its snapshot", snapshot.inode());
                return Ok(());
            }
            let existing = TreeNodeHistory::list_by_inode(conn, snapshot.inode())?;
            for stale in existing.iter().skip(keep) {
                TreeNodeHistory::delete_one(conn, stale)?;
            }
            let history_id = TreeNodeHistory::create(conn, &snapshot)?;
            debug!(
                "Recorded history {} for '{}' (pruned {})",
                history_id,
                snapshot.inode(),
                existing.len().saturating_sub(keep)
            );
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_file, create_root, temp_tree, temp_tree_with};
    use crate::tree::{TreeSettings, UpdateBasicInfoRequest};
    use pretty_assertions::assert_eq;

    fn rename(tree: &FileTree, user: &Identity, inode: &str, desc: String) {
        tree.update_basic_info(
            user,
            inode,
            UpdateBasicInfoRequest {
                name: None,
                desc: Some(desc),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_history_is_capped_at_retention() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        let file = create_file(&tree, &user, root.inode(), "case");

        for i in 0..12 {
            rename(&tree, &user, file.inode(), format!("rev {}", i));
        }
        tree.wait_idle();

        let history = tree.query_history(file.inode()).unwrap();
        assert_eq!(history.len(), 10);
        // Each snapshot holds the state before its update; the newest is from before rev 11
        assert_eq!(history[0].desc(), "rev 10");
        assert_eq!(history[9].desc(), "rev 1");
    }

    #[test]
    fn test_retention_is_configurable() {
        let (_dir, tree) = temp_tree_with(TreeSettings {
            history_retention: 3,
            ..TreeSettings::default()
        });
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        let file = create_file(&tree, &user, root.inode(), "case");

        for i in 0..5 {
            rename(&tree, &user, file.inode(), format!("rev {}", i));
        }
        tree.wait_idle();
        assert_eq!(tree.query_history(file.inode()).unwrap().len(), 3);
    }

    #[test]
    fn test_create_history_captures_current_state() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        let file = create_file(&tree, &user, root.inode(), "case");

        tree.create_history(&user, file.inode()).unwrap();
        tree.wait_idle();

        let history = tree.query_history(file.inode()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name(), "case");
        assert_eq!(history[0].pinode(), root.inode());
        assert_eq!(
            tree.create_history(&user, "ghost").unwrap_err().kind(),
            crate::error::ErrorKind::NotFound
        );
    }
}
