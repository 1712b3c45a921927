//! Tree operations over the node, meta and history stores.
//!
//! Top-level nodes are always handled synchronously inside one
//! `BEGIN IMMEDIATE` transaction. Directory fan-out for copy and delete is
//! handed to the [`JobManager`] and tracked in `tree_jobs`; history writes go
//! through its side channel.

mod ancestors;
mod create;
mod delete;
mod history;
mod jobs;
mod relocate;
mod search;
mod subtree;
mod update;

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::FileTreeError;
use crate::job_manager::JobManager;
use crate::node::{TreeNode, ROOT_PINODE};
use crate::node_meta::TreeNodeMeta;
use crate::snippet::{SnippetConfig, SnippetResolver, SnippetYaml};
use crate::utils::Utils;

pub use create::CreateNodeRequest;
pub use delete::DeleteOutcome;
pub use relocate::CopyOutcome;
pub use search::FuzzySearchRequest;
pub use subtree::{SubtreeCopyJob, SubtreeDeleteJob, WorkItem};
pub use update::{SavePipelineRequest, UpdateBasicInfoRequest};

/// Tunables for tree behavior. Built from the `[tree]` and `[jobs]` config sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSettings {
    /// Snapshots kept per inode
    pub history_retention: usize,
    /// Longest parent chain walked before the tree is considered corrupt
    pub max_tree_depth: usize,
    pub name_max_chars: usize,
    pub desc_max_chars: usize,
    pub job_workers: usize,
}

impl Default for TreeSettings {
    fn default() -> Self {
        TreeSettings {
            history_retention: 10,
            max_tree_depth: 1024,
            name_max_chars: 50,
            desc_max_chars: 1000,
            job_workers: 4,
        }
    }
}

/// Service handle for one tree database. Clones share the pool and the job manager.
#[derive(Clone)]
pub struct FileTree {
    db: Database,
    settings: TreeSettings,
    jobs: Arc<JobManager>,
}

impl FileTree {
    pub fn new(db: Database, settings: TreeSettings) -> Self {
        let jobs = Arc::new(JobManager::new(db.clone(), settings.job_workers));
        FileTree { db, settings, jobs }
    }

    /// Open the database at `db_path` and close out jobs a previous process left unfinished.
    pub fn open(db_path: &Path, settings: TreeSettings) -> Result<Self, FileTreeError> {
        // Every worker holds a connection while it runs, plus the side channel and callers
        let pool_size = u32::try_from(settings.job_workers + 4).unwrap_or(u32::MAX);
        let db = Database::open_with_pool_size(db_path, pool_size)?;
        let tree = FileTree::new(db, settings);
        tree.jobs.recover_interrupted()?;
        Ok(tree)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    pub fn get(&self, inode: &str) -> Result<TreeNode, FileTreeError> {
        let conn = self.db.get_connection()?;
        load_node(&conn, inode)
    }

    pub fn get_meta(&self, inode: &str) -> Result<Option<TreeNodeMeta>, FileTreeError> {
        let conn = self.db.get_connection()?;
        TreeNodeMeta::get_by_inode(&conn, inode)
    }

    /// Children of `pinode`, or the scope root when no parent is given.
    pub fn list(
        &self,
        scope: &str,
        scope_id: &str,
        pinode: Option<&str>,
    ) -> Result<Vec<TreeNode>, FileTreeError> {
        let conn = self.db.get_connection()?;

        match pinode.filter(|p| !is_root_pinode(Some(*p))) {
            Some(pinode) => {
                load_node(&conn, pinode)?;
                TreeNode::list_by_pinode(&conn, pinode)
            }
            None => {
                require_scope(scope, scope_id)?;
                Ok(TreeNode::get_scope_root(&conn, scope, scope_id)?
                    .into_iter()
                    .collect())
            }
        }
    }

    pub fn snippet_resolver(&self) -> SnippetResolver {
        SnippetResolver::new(self.db.clone())
    }

    pub fn resolve_snippet_yaml(&self, config: &SnippetConfig) -> Result<String, FileTreeError> {
        self.snippet_resolver().resolve(config)
    }

    pub fn batch_resolve_snippet_yaml(
        &self,
        configs: &[SnippetConfig],
    ) -> Result<Vec<SnippetYaml>, FileTreeError> {
        self.snippet_resolver().resolve_batch(configs)
    }

    fn validate_name(&self, name: &str) -> Result<String, FileTreeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FileTreeError::InvalidArgument("name is required".to_string()));
        }
        let len = Utils::char_count(name);
        if len > self.settings.name_max_chars {
            return Err(FileTreeError::InvalidArgument(format!(
                "name is {} characters, the limit is {}",
                len, self.settings.name_max_chars
            )));
        }
        Ok(name.to_owned())
    }

    fn validate_desc(&self, desc: &str) -> Result<(), FileTreeError> {
        let len = Utils::char_count(desc);
        if len > self.settings.desc_max_chars {
            return Err(FileTreeError::InvalidArgument(format!(
                "desc is {} characters, the limit is {}",
                len, self.settings.desc_max_chars
            )));
        }
        Ok(())
    }
}

/// `None`, `""` and `"0"` all address the scope root.
pub(crate) fn is_root_pinode(pinode: Option<&str>) -> bool {
    match pinode.map(str::trim) {
        None | Some("") => true,
        Some(p) => p == ROOT_PINODE,
    }
}

pub(crate) fn load_node(conn: &Connection, inode: &str) -> Result<TreeNode, FileTreeError> {
    TreeNode::get_by_inode(conn, inode)?.ok_or_else(|| FileTreeError::node_not_found(inode))
}

fn require_scope(scope: &str, scope_id: &str) -> Result<(), FileTreeError> {
    if scope.trim().is_empty() || scope_id.trim().is_empty() {
        return Err(FileTreeError::InvalidArgument(
            "scope and scope_id are required".to_string(),
        ));
    }
    Ok(())
}
