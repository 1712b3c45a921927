use std::collections::BTreeMap;

use log::debug;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::Database;
use crate::error::FileTreeError;
use crate::node::TreeNode;
use crate::node_meta::TreeNodeMeta;

/// `source` value identifying snippets served by this tree.
pub const SNIPPET_SOURCE_AUTOTEST: &str = "autotest";

/// Reference to a sub-pipeline, as sent by the pipeline engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetConfig {
    pub source: String,
    /// For autotest snippets, the inode of the node holding the YAML.
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SnippetConfig {
    pub fn autotest(inode: &str) -> Self {
        SnippetConfig {
            source: SNIPPET_SOURCE_AUTOTEST.to_owned(),
            name: inode.to_owned(),
            labels: BTreeMap::new(),
        }
    }
}

/// Descriptor the pipeline engine uses to splice a node in as a sub-pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    pub snippet_config: SnippetConfig,
}

impl SnippetAction {
    pub fn for_node(inode: &str, alias: Option<String>) -> Self {
        SnippetAction {
            alias,
            action_type: "snippet".to_owned(),
            params: BTreeMap::new(),
            snippet_config: SnippetConfig::autotest(inode),
        }
    }
}

/// A resolved snippet: the reference plus the YAML it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetYaml {
    pub config: SnippetConfig,
    pub yml: String,
}

/// Read-only view of node pipelines for the pipeline engine.
#[derive(Clone)]
pub struct SnippetResolver {
    db: Database,
}

impl SnippetResolver {
    pub fn new(db: Database) -> Self {
        SnippetResolver { db }
    }

    pub fn resolve(&self, config: &SnippetConfig) -> Result<String, FileTreeError> {
        let conn = self.db.get_connection()?;
        Self::resolve_locked(&conn, config)
    }

    /// Resolve every reference in order. The first failure aborts the batch.
    pub fn resolve_batch(
        &self,
        configs: &[SnippetConfig],
    ) -> Result<Vec<SnippetYaml>, FileTreeError> {
        let conn = self.db.get_connection()?;

        configs
            .iter()
            .map(|config| {
                Self::resolve_locked(&conn, config).map(|yml| SnippetYaml {
                    config: config.clone(),
                    yml,
                })
            })
            .collect()
    }

    fn resolve_locked(conn: &Connection, config: &SnippetConfig) -> Result<String, FileTreeError> {
        if config.source != SNIPPET_SOURCE_AUTOTEST {
            return Err(FileTreeError::InvalidArgument(format!(
                "snippet source '{}' is not served here (expected '{}')",
                config.source, SNIPPET_SOURCE_AUTOTEST
            )));
        }

        let inode = config.name.as_str();
        if TreeNode::get_by_inode(conn, inode)?.is_none() {
            return Err(FileTreeError::node_not_found(inode));
        }

        let meta = TreeNodeMeta::get_by_inode(conn, inode)?.ok_or_else(|| {
            FileTreeError::Internal(format!("node '{}' has no pipeline meta", inode))
        })?;

        if meta.pipeline_yml().is_empty() {
            return Err(FileTreeError::Internal(format!(
                "node '{}' has no pipeline yml",
                inode
            )));
        }

        debug!("Resolved snippet for node '{}'", inode);
        Ok(meta.pipeline_yml().to_owned())
    }
}
