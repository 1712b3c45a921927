use std::collections::BTreeMap;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FileTreeError;
use crate::snippet::SnippetAction;

pub type Extra = BTreeMap<String, Value>;

/// Per-node payload. Maps to `tree_node_meta`; at most one row per inode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeNodeMeta {
    inode: String,
    pipeline_yml: String,
    snippet_action: Option<SnippetAction>,
    extra: Extra,
    created_at: i64,
    updated_at: i64,
}

/// Fields written by [`TreeNodeMeta::update_by_inode`]. `None` keeps the stored value;
/// `extra` keys are merged into the stored map.
#[derive(Debug, Clone, Default)]
pub struct MetaUpdate {
    pub pipeline_yml: Option<String>,
    pub snippet_action: Option<SnippetAction>,
    pub extra: Option<Extra>,
}

impl TreeNodeMeta {
    pub fn new(
        inode: &str,
        pipeline_yml: String,
        snippet_action: Option<SnippetAction>,
        extra: Extra,
        now: i64,
    ) -> Self {
        TreeNodeMeta {
            inode: inode.to_owned(),
            pipeline_yml,
            snippet_action,
            extra,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn inode(&self) -> &str {
        &self.inode
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

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Verbatim copy of the payload attached to another inode.
    pub fn duplicate_for(&self, inode: &str, now: i64) -> Self {
        TreeNodeMeta {
            inode: inode.to_owned(),
            pipeline_yml: self.pipeline_yml.clone(),
            snippet_action: self.snippet_action.clone(),
            extra: self.extra.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: MetaUpdate, now: i64) {
        if let Some(pipeline_yml) = update.pipeline_yml {
            self.pipeline_yml = pipeline_yml;
        }
        if let Some(snippet_action) = update.snippet_action {
            self.snippet_action = Some(snippet_action);
        }
        if let Some(extra) = update.extra {
            self.extra.extend(extra);
        }
        self.updated_at = now;
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let snippet_json: Option<String> = row.get(2)?;
        let snippet_action = snippet_json
            .map(|json| serde_json::from_str::<SnippetAction>(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        let extra_json: String = row.get(3)?;
        let extra = serde_json::from_str::<Extra>(&extra_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(TreeNodeMeta {
            inode: row.get(0)?,
            pipeline_yml: row.get(1)?,
            snippet_action,
            extra,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    pub fn create(conn: &Connection, meta: &TreeNodeMeta) -> Result<(), FileTreeError> {
        let snippet_json = meta
            .snippet_action
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let extra_json = serde_json::to_string(&meta.extra)?;

        conn.execute(
            "INSERT INTO tree_node_meta (
                inode, pipeline_yml, snippet_action, extra, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                meta.inode,
                meta.pipeline_yml,
                snippet_json,
                extra_json,
                meta.created_at,
                meta.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_by_inode(conn: &Connection, inode: &str) -> Result<Option<Self>, FileTreeError> {
        conn.query_row(
            "SELECT inode, pipeline_yml, snippet_action, extra, created_at, updated_at
             FROM tree_node_meta
             WHERE inode = ?",
            [inode],
            Self::from_row,
        )
        .optional()
        .map_err(FileTreeError::DatabaseError)
    }

    /// Apply `update` to the stored row and return the merged result.
    ///
    /// Read-modify-write; callers that need atomicity run it inside
    /// [`crate::database::Database::immediate_transaction`].
    pub fn update_by_inode(
        conn: &Connection,
        inode: &str,
        update: MetaUpdate,
        now: i64,
    ) -> Result<Self, FileTreeError> {
        let mut meta = Self::get_by_inode(conn, inode)?.ok_or_else(|| {
            FileTreeError::NotFound(format!("node '{}' has no meta", inode))
        })?;
        meta.apply(update, now);

        let snippet_json = meta
            .snippet_action
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let extra_json = serde_json::to_string(&meta.extra)?;

        conn.execute(
            "UPDATE tree_node_meta SET
                pipeline_yml = ?1, snippet_action = ?2, extra = ?3, updated_at = ?4
             WHERE inode = ?5",
            params![meta.pipeline_yml, snippet_json, extra_json, now, inode],
        )?;

        Ok(meta)
    }

    pub fn delete_by_inode(conn: &Connection, inode: &str) -> Result<usize, FileTreeError> {
        let deleted = conn.execute("DELETE FROM tree_node_meta WHERE inode = ?", [inode])?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippet::SnippetConfig;
    use crate::test_support::temp_db;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn extra(pairs: &[(&str, Value)]) -> Extra {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_create_and_get_round_trips_snippet_action() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        let action = SnippetAction::for_node("abc", Some("login".into()));
        let meta = TreeNodeMeta::new(
            "abc",
            "version: \"1.1\"\nstages: []\n".into(),
            Some(action.clone()),
            extra(&[("owner", json!("qa"))]),
            10,
        );
        TreeNodeMeta::create(&conn, &meta).unwrap();

        let loaded = TreeNodeMeta::get_by_inode(&conn, "abc").unwrap().unwrap();
        assert_eq!(loaded, meta);
        assert_eq!(
            loaded.snippet_action().unwrap().snippet_config,
            SnippetConfig::autotest("abc")
        );
    }

    #[test]
    fn test_update_merges_extra() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        let meta = TreeNodeMeta::new(
            "abc",
            "old".into(),
            None,
            extra(&[("a", json!(1)), ("b", json!(2))]),
            10,
        );
        TreeNodeMeta::create(&conn, &meta).unwrap();

        let updated = TreeNodeMeta::update_by_inode(
            &conn,
            "abc",
            MetaUpdate {
                pipeline_yml: None,
                snippet_action: None,
                extra: Some(extra(&[("b", json!("two")), ("c", json!(true))])),
            },
            20,
        )
        .unwrap();

        assert_eq!(updated.pipeline_yml(), "old");
        assert_eq!(
            updated.extra(),
            &extra(&[("a", json!(1)), ("b", json!("two")), ("c", json!(true))])
        );
        assert_eq!(TreeNodeMeta::get_by_inode(&conn, "abc").unwrap().unwrap(), updated);
    }

    #[test]
    fn test_update_missing_meta_is_not_found() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        let err = TreeNodeMeta::update_by_inode(&conn, "nope", MetaUpdate::default(), 1)
            .unwrap_err();
        assert!(matches!(err, FileTreeError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_for_copies_payload() {
        let meta = TreeNodeMeta::new("a", "yml".into(), None, extra(&[("k", json!(1))]), 1);
        let copy = meta.duplicate_for("b", 2);
        assert_eq!(copy.inode(), "b");
        assert_eq!(copy.pipeline_yml(), "yml");
        assert_eq!(copy.extra(), meta.extra());
        assert_eq!(copy.created_at(), 2);
    }

    #[test]
    fn test_delete_by_inode() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNodeMeta::create(&conn, &TreeNodeMeta::new("a", "y".into(), None, Extra::new(), 1))
            .unwrap();
        assert_eq!(TreeNodeMeta::delete_by_inode(&conn, "a").unwrap(), 1);
        assert!(TreeNodeMeta::get_by_inode(&conn, "a").unwrap().is_none());
    }
}
