use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::FileTreeError;
use crate::node::TreeNode;
use crate::node_meta::{Extra, TreeNodeMeta};
use crate::snippet::SnippetAction;

/// Immutable snapshot of a node and its payload. Maps to `tree_node_histories`.
///
/// Rows are only ever inserted or deleted; retention is enforced by the tree's
/// history side channel, not here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeNodeHistory {
    history_id: i64,
    inode: String,
    pinode: String,
    name: String,
    desc: String,
    creator_id: String,
    updater_id: String,
    pipeline_yml: String,
    snippet_action: Option<SnippetAction>,
    extra: Extra,
    created_at: i64,
}

impl TreeNodeHistory {
    /// Capture `node` (and its meta, if any). The id is assigned on [`TreeNodeHistory::create`].
    pub fn snapshot(node: &TreeNode, meta: Option<&TreeNodeMeta>, now: i64) -> Self {
        TreeNodeHistory {
            history_id: 0,
            inode: node.inode().to_owned(),
            pinode: node.pinode().to_owned(),
            name: node.name().to_owned(),
            desc: node.desc().to_owned(),
            creator_id: node.creator_id().to_owned(),
            updater_id: node.updater_id().to_owned(),
            pipeline_yml: meta.map(|m| m.pipeline_yml().to_owned()).unwrap_or_default(),
            snippet_action: meta.and_then(|m| m.snippet_action().cloned()),
            extra: meta.map(|m| m.extra().clone()).unwrap_or_default(),
            created_at: now,
        }
    }

    pub fn history_id(&self) -> i64 {
        self.history_id
    }

    pub fn inode(&self) -> &str {
        &self.inode
    }

    pub fn pinode(&self) -> &str {
        &self.pinode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn creator_id(&self) -> &str {
        &self.creator_id
    }

    pub fn updater_id(&self) -> &str {
        &self.updater_id
    }

    pub fn pipeline_yml(&self) -> &str {
        &self.pipeline_yml
    }

    pub fn snippet_action(&self) -> Option<&SnippetAction> {
        self.snippet_action.as_ref()
    }

    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let snippet_json: Option<String> = row.get(8)?;
        let snippet_action = snippet_json
            .map(|json| serde_json::from_str::<SnippetAction>(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

        let extra_json: String = row.get(9)?;
        let extra = serde_json::from_str::<Extra>(&extra_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

        Ok(TreeNodeHistory {
            history_id: row.get(0)?,
            inode: row.get(1)?,
            pinode: row.get(2)?,
            name: row.get(3)?,
            desc: row.get(4)?,
            creator_id: row.get(5)?,
            updater_id: row.get(6)?,
            pipeline_yml: row.get(7)?,
            snippet_action,
            extra,
            created_at: row.get(10)?,
        })
    }

    /// Append a snapshot. Returns the new `history_id`.
    pub fn create(conn: &Connection, history: &TreeNodeHistory) -> Result<i64, FileTreeError> {
        let snippet_json = history
            .snippet_action
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let extra_json = serde_json::to_string(&history.extra)?;

        let history_id: i64 = conn.query_row(
            "INSERT INTO tree_node_histories (
                inode, pinode, name, node_desc, creator_id, updater_id,
                pipeline_yml, snippet_action, extra, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING history_id",
            params![
                history.inode,
                history.pinode,
                history.name,
                history.desc,
                history.creator_id,
                history.updater_id,
                history.pipeline_yml,
                snippet_json,
                extra_json,
                history.created_at,
            ],
            |row| row.get(0),
        )?;

        Ok(history_id)
    }

    /// All snapshots of `inode`, newest first.
    pub fn list_by_inode(conn: &Connection, inode: &str) -> Result<Vec<Self>, FileTreeError> {
        let mut stmt = conn.prepare(
            "SELECT history_id, inode, pinode, name, node_desc, creator_id, updater_id,
                    pipeline_yml, snippet_action, extra, created_at
             FROM tree_node_histories
             WHERE inode = ?
             ORDER BY created_at DESC, history_id DESC",
        )?;

        let rows = stmt.query_map([inode], Self::from_row)?;

        let mut histories = Vec::new();
        for row in rows {
            histories.push(row?);
        }
        Ok(histories)
    }

    pub fn delete_one(conn: &Connection, history: &TreeNodeHistory) -> Result<(), FileTreeError> {
        conn.execute(
            "DELETE FROM tree_node_histories WHERE history_id = ?",
            [history.history_id],
        )?;
        Ok(())
    }

    pub fn delete_by_inode(conn: &Connection, inode: &str) -> Result<usize, FileTreeError> {
        let deleted = conn.execute("DELETE FROM tree_node_histories WHERE inode = ?", [inode])?;
        Ok(deleted)
    }
}
