use tempfile::TempDir;

use crate::database::Database;
use crate::identity::Identity;
use crate::node::TreeNode;
use crate::tree::{CreateNodeRequest, FileTree, SavePipelineRequest, TreeSettings};

pub const SCOPE: &str = "project-autotest";
pub const SCOPE_ID: &str = "42";

/// Fresh database in a temporary folder. Keep the `TempDir` alive for the test's duration.
pub fn temp_db() -> (TempDir, Database) {
    let dir = TempDir::new().expect("create temp dir");
    let db = Database::open_in_folder(dir.path()).expect("open database");
    (dir, db)
}

pub fn temp_tree() -> (TempDir, FileTree) {
    temp_tree_with(TreeSettings::default())
}

pub fn temp_tree_with(settings: TreeSettings) -> (TempDir, FileTree) {
    let (dir, db) = temp_db();
    (dir, FileTree::new(db, settings))
}

pub fn create_root(tree: &FileTree, user: &Identity) -> TreeNode {
    tree.create(
        user,
        CreateNodeRequest {
            node_type: "d".into(),
            pinode: None,
            scope: SCOPE.into(),
            scope_id: SCOPE_ID.into(),
            name: "root".into(),
            desc: String::new(),
        },
    )
    .expect("create root")
}

fn create_child(tree: &FileTree, user: &Identity, pinode: &str, node_type: &str, name: &str) -> TreeNode {
    tree.create(
        user,
        CreateNodeRequest {
            node_type: node_type.into(),
            pinode: Some(pinode.into()),
            name: name.into(),
            ..Default::default()
        },
    )
    .expect("create child")
}

pub fn create_dir(tree: &FileTree, user: &Identity, pinode: &str, name: &str) -> TreeNode {
    create_child(tree, user, pinode, "d", name)
}

pub fn create_file(tree: &FileTree, user: &Identity, pinode: &str, name: &str) -> TreeNode {
    create_child(tree, user, pinode, "f", name)
}

pub fn save_yml(tree: &FileTree, user: &Identity, inode: &str, yml: &str) {
    tree.save_pipeline(
        user,
        inode,
        SavePipelineRequest {
            pipeline_yml: yml.into(),
            ..Default::default()
        },
    )
    .expect("save pipeline");
}
