use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::FileTreeError;

/// `pinode` value carried by the root node of every (scope, scope_id) tree.
pub const ROOT_PINODE: &str = "0";

const NODE_COLUMNS: &str = "inode, pinode, node_type, scope, scope_id, name, node_desc,
     creator_id, updater_id, created_at, updated_at";

#[derive(AsRefStr, EnumString, Display, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum NodeType {
    #[strum(to_string = "d", serialize = "dir", serialize = "directory")]
    #[serde(rename = "d")]
    Directory,
    #[strum(to_string = "f", serialize = "file")]
    #[serde(rename = "f")]
    File,
}

impl NodeType {
    pub fn parse(value: &str) -> Result<Self, FileTreeError> {
        NodeType::from_str(value.trim()).map_err(|_| {
            FileTreeError::InvalidArgument(format!("unrecognized node type '{}'", value))
        })
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            NodeType::Directory => "Directory",
            NodeType::File => "File",
        }
    }
}

/// A directory or file in an autotest tree. Maps to the `tree_nodes` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    inode: String,
    pinode: String,
    #[serde(rename = "type")]
    node_type: NodeType,
    scope: String,
    scope_id: String,
    name: String,
    desc: String,
    creator_id: String,
    updater_id: String,
    created_at: i64,
    updated_at: i64,
}

/// Filter accepted by [`TreeNode::fuzzy_search`].
///
/// The name predicates are OR'ed together; everything else is AND'ed.
#[derive(Debug, Clone, Default)]
pub struct NodeSearchFilter {
    pub scope: String,
    pub scope_id: String,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub substring: Option<String>,
    /// Restrict to nodes whose parent is one of these. `None` means any parent in the scope.
    pub pinodes: Option<Vec<String>>,
    pub creator_id: Option<String>,
}

#[allow(clippy::too_many_arguments)]
impl TreeNode {
    pub fn new(
        inode: String,
        pinode: String,
        node_type: NodeType,
        scope: String,
        scope_id: String,
        name: String,
        desc: String,
        user_id: &str,
        now: i64,
    ) -> Self {
        TreeNode {
            inode,
            pinode,
            node_type,
            scope,
            scope_id,
            name,
            desc,
            creator_id: user_id.to_owned(),
            updater_id: user_id.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn inode(&self) -> &str {
        &self.inode
    }

    pub fn pinode(&self) -> &str {
        &self.pinode
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
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

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn is_root(&self) -> bool {
        self.pinode == ROOT_PINODE
    }

    pub fn is_dir(&self) -> bool {
        self.node_type == NodeType::Directory
    }

    pub fn same_scope(&self, other: &TreeNode) -> bool {
        self.scope == other.scope && self.scope_id == other.scope_id
    }

    pub(crate) fn set_location(&mut self, pinode: &str, name: String, updater_id: &str, now: i64) {
        self.pinode = pinode.to_owned();
        self.name = name;
        self.updater_id = updater_id.to_owned();
        self.updated_at = now;
    }

    pub(crate) fn set_basic_info(
        &mut self,
        name: Option<String>,
        desc: Option<String>,
        updater_id: &str,
        now: i64,
    ) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(desc) = desc {
            self.desc = desc;
        }
        self.updater_id = updater_id.to_owned();
        self.updated_at = now;
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let type_str: String = row.get(2)?;
        let node_type = NodeType::from_str(&type_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        Ok(TreeNode {
            inode: row.get(0)?,
            pinode: row.get(1)?,
            node_type,
            scope: row.get(3)?,
            scope_id: row.get(4)?,
            name: row.get(5)?,
            desc: row.get(6)?,
            creator_id: row.get(7)?,
            updater_id: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub fn create(conn: &Connection, node: &TreeNode) -> Result<(), FileTreeError> {
        conn.execute(
            "INSERT INTO tree_nodes (
                inode, pinode, node_type, scope, scope_id, name, node_desc,
                creator_id, updater_id, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                node.inode,
                node.pinode,
                node.node_type.as_ref(),
                node.scope,
                node.scope_id,
                node.name,
                node.desc,
                node.creator_id,
                node.updater_id,
                node.created_at,
                node.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_by_inode(conn: &Connection, inode: &str) -> Result<Option<Self>, FileTreeError> {
        conn.query_row(
            &format!(
                "SELECT {NODE_COLUMNS} FROM tree_nodes
                 WHERE inode = ? AND soft_deleted_at IS NULL"
            ),
            [inode],
            Self::from_row,
        )
        .optional()
        .map_err(FileTreeError::DatabaseError)
    }

    /// Direct children of `pinode`, directories first, then by name.
    pub fn list_by_pinode(conn: &Connection, pinode: &str) -> Result<Vec<Self>, FileTreeError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM tree_nodes
             WHERE pinode = ? AND soft_deleted_at IS NULL
             ORDER BY node_type ASC, name ASC"
        ))?;

        let rows = stmt.query_map([pinode], Self::from_row)?;

        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    /// Inodes of the directories directly under `pinode`.
    pub fn list_child_dir_inodes(
        conn: &Connection,
        pinode: &str,
    ) -> Result<Vec<String>, FileTreeError> {
        let mut stmt = conn.prepare(
            "SELECT inode FROM tree_nodes
             WHERE pinode = ? AND node_type = 'd' AND soft_deleted_at IS NULL",
        )?;
        let rows = stmt.query_map([pinode], |row| row.get::<_, String>(0))?;

        let mut inodes = Vec::new();
        for row in rows {
            inodes.push(row?);
        }
        Ok(inodes)
    }

    /// Names already used under `pinode`, optionally ignoring one node (the one being renamed).
    pub fn sibling_names(
        conn: &Connection,
        pinode: &str,
        exclude_inode: Option<&str>,
    ) -> Result<Vec<String>, FileTreeError> {
        let mut stmt = conn.prepare(
            "SELECT name FROM tree_nodes
             WHERE pinode = ?1 AND (?2 IS NULL OR inode <> ?2)",
        )?;
        let rows = stmt.query_map(params![pinode, exclude_inode], |row| {
            row.get::<_, String>(0)
        })?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    pub fn get_scope_root(
        conn: &Connection,
        scope: &str,
        scope_id: &str,
    ) -> Result<Option<Self>, FileTreeError> {
        conn.query_row(
            &format!(
                "SELECT {NODE_COLUMNS} FROM tree_nodes
                 WHERE scope = ? AND scope_id = ? AND pinode = '0' AND soft_deleted_at IS NULL"
            ),
            params![scope, scope_id],
            Self::from_row,
        )
        .optional()
        .map_err(FileTreeError::DatabaseError)
    }

    /// Persist new name and/or description. `None` leaves the column untouched.
    pub fn update_basic_info(
        conn: &Connection,
        inode: &str,
        name: Option<&str>,
        desc: Option<&str>,
        updater_id: &str,
        now: i64,
    ) -> Result<usize, FileTreeError> {
        let updated = conn.execute(
            "UPDATE tree_nodes SET
                name = COALESCE(?1, name),
                node_desc = COALESCE(?2, node_desc),
                updater_id = ?3,
                updated_at = ?4
             WHERE inode = ?5",
            params![name, desc, updater_id, now, inode],
        )?;
        Ok(updated)
    }

    /// Stamp the updater without changing anything else.
    pub fn touch(
        conn: &Connection,
        inode: &str,
        updater_id: &str,
        now: i64,
    ) -> Result<usize, FileTreeError> {
        let updated = conn.execute(
            "UPDATE tree_nodes SET updater_id = ?1, updated_at = ?2 WHERE inode = ?3",
            params![updater_id, now, inode],
        )?;
        Ok(updated)
    }

    pub fn move_to(
        conn: &Connection,
        inode: &str,
        new_pinode: &str,
        new_name: &str,
        updater_id: &str,
        now: i64,
    ) -> Result<usize, FileTreeError> {
        let updated = conn.execute(
            "UPDATE tree_nodes SET pinode = ?1, name = ?2, updater_id = ?3, updated_at = ?4
             WHERE inode = ?5",
            params![new_pinode, new_name, updater_id, now, inode],
        )?;
        Ok(updated)
    }

    /// Hard delete. Returns the number of rows removed (0 if the node was already gone).
    pub fn delete_by_inode(conn: &Connection, inode: &str) -> Result<usize, FileTreeError> {
        let deleted = conn.execute("DELETE FROM tree_nodes WHERE inode = ?", [inode])?;
        Ok(deleted)
    }

    pub fn fuzzy_search(
        conn: &Connection,
        filter: &NodeSearchFilter,
    ) -> Result<Vec<Self>, FileTreeError> {
        let mut sql = format!(
            "SELECT {NODE_COLUMNS} FROM tree_nodes
             WHERE soft_deleted_at IS NULL AND scope = ? AND scope_id = ?"
        );
        let mut values: Vec<String> = vec![filter.scope.clone(), filter.scope_id.clone()];

        let mut name_clauses: Vec<&str> = Vec::new();
        if let Some(prefix) = non_empty(&filter.prefix) {
            name_clauses.push("name LIKE ? ESCAPE '\\'");
            values.push(format!("{}%", crate::utils::Utils::escape_like(prefix)));
        }
        if let Some(suffix) = non_empty(&filter.suffix) {
            name_clauses.push("name LIKE ? ESCAPE '\\'");
            values.push(format!("%{}", crate::utils::Utils::escape_like(suffix)));
        }
        if let Some(substring) = non_empty(&filter.substring) {
            name_clauses.push("name LIKE ? ESCAPE '\\'");
            values.push(format!("%{}%", crate::utils::Utils::escape_like(substring)));
        }
        if !name_clauses.is_empty() {
            sql.push_str(&format!(" AND ({})", name_clauses.join(" OR ")));
        }

        if let Some(pinodes) = &filter.pinodes {
            sql.push_str(" AND pinode IN (SELECT value FROM json_each(?))");
            values.push(serde_json::to_string(pinodes)?);
        }

        if let Some(creator_id) = non_empty(&filter.creator_id) {
            sql.push_str(" AND creator_id = ?");
            values.push(creator_id.to_owned());
        }

        sql.push_str(" ORDER BY node_type ASC, name ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::from_row)?;

        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_db;
    use pretty_assertions::assert_eq;

    fn node(inode: &str, pinode: &str, node_type: NodeType, name: &str) -> TreeNode {
        TreeNode::new(
            inode.to_owned(),
            pinode.to_owned(),
            node_type,
            "project-autotest".to_owned(),
            "7".to_owned(),
            name.to_owned(),
            String::new(),
            "1001",
            1_700_000_000,
        )
    }

    #[test]
    fn test_node_type_parse() {
        assert_eq!(NodeType::parse("d").unwrap(), NodeType::Directory);
        assert_eq!(NodeType::parse("DIR").unwrap(), NodeType::Directory);
        assert_eq!(NodeType::parse("f").unwrap(), NodeType::File);
        assert_eq!(NodeType::parse("file").unwrap(), NodeType::File);
        assert!(NodeType::parse("symlink").is_err());
    }

    #[test]
    fn test_node_type_storage_form() {
        assert_eq!(NodeType::Directory.as_ref(), "d");
        assert_eq!(NodeType::File.to_string(), "f");
        assert_eq!(serde_json::to_string(&NodeType::File).unwrap(), "\"f\"");
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        let root = node("r", ROOT_PINODE, NodeType::Directory, "root");
        TreeNode::create(&conn, &root).unwrap();

        let loaded = TreeNode::get_by_inode(&conn, "r").unwrap().unwrap();
        assert_eq!(loaded, root);
        assert!(loaded.is_root());
        assert!(TreeNode::get_by_inode(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_scope_root_is_unique() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNode::create(&conn, &node("r1", ROOT_PINODE, NodeType::Directory, "a")).unwrap();
        let dup = TreeNode::create(&conn, &node("r2", ROOT_PINODE, NodeType::Directory, "b"));
        assert!(dup.is_err());

        let root = TreeNode::get_scope_root(&conn, "project-autotest", "7")
            .unwrap()
            .unwrap();
        assert_eq!(root.inode(), "r1");
    }

    #[test]
    fn test_list_by_pinode_orders_directories_first() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNode::create(&conn, &node("r", ROOT_PINODE, NodeType::Directory, "root")).unwrap();
        TreeNode::create(&conn, &node("f1", "r", NodeType::File, "alpha")).unwrap();
        TreeNode::create(&conn, &node("d1", "r", NodeType::Directory, "zulu")).unwrap();
        TreeNode::create(&conn, &node("d2", "r", NodeType::Directory, "bravo")).unwrap();

        let names: Vec<String> = TreeNode::list_by_pinode(&conn, "r")
            .unwrap()
            .iter()
            .map(|n| n.name().to_owned())
            .collect();
        assert_eq!(names, vec!["bravo", "zulu", "alpha"]);

        let dirs = TreeNode::list_child_dir_inodes(&conn, "r").unwrap();
        assert_eq!(dirs.len(), 2);
    }

    #[test]
    fn test_sibling_names_can_exclude_self() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNode::create(&conn, &node("r", ROOT_PINODE, NodeType::Directory, "root")).unwrap();
        TreeNode::create(&conn, &node("a", "r", NodeType::File, "one")).unwrap();
        TreeNode::create(&conn, &node("b", "r", NodeType::File, "two")).unwrap();

        let mut all = TreeNode::sibling_names(&conn, "r", None).unwrap();
        all.sort();
        assert_eq!(all, vec!["one", "two"]);
        assert_eq!(TreeNode::sibling_names(&conn, "r", Some("a")).unwrap(), vec!["two"]);
    }

    #[test]
    fn test_move_and_update_basic_info() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNode::create(&conn, &node("r", ROOT_PINODE, NodeType::Directory, "root")).unwrap();
        TreeNode::create(&conn, &node("d", "r", NodeType::Directory, "dir")).unwrap();
        TreeNode::create(&conn, &node("f", "r", NodeType::File, "case")).unwrap();

        assert_eq!(TreeNode::move_to(&conn, "f", "d", "case", "2002", 5).unwrap(), 1);
        TreeNode::update_basic_info(&conn, "f", None, Some("login flow"), "3003", 6).unwrap();

        let moved = TreeNode::get_by_inode(&conn, "f").unwrap().unwrap();
        assert_eq!(moved.pinode(), "d");
        assert_eq!(moved.name(), "case");
        assert_eq!(moved.desc(), "login flow");
        assert_eq!(moved.updater_id(), "3003");
        assert_eq!(moved.creator_id(), "1001");
    }

    #[test]
    fn test_delete_by_inode_is_hard() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNode::create(&conn, &node("r", ROOT_PINODE, NodeType::Directory, "root")).unwrap();
        assert_eq!(TreeNode::delete_by_inode(&conn, "r").unwrap(), 1);
        assert_eq!(TreeNode::delete_by_inode(&conn, "r").unwrap(), 0);

        let rows: i64 = conn
            .query_row("SELECT count(*) FROM tree_nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_soft_deleted_rows_are_invisible() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNode::create(&conn, &node("r", ROOT_PINODE, NodeType::Directory, "root")).unwrap();
        TreeNode::create(&conn, &node("a", "r", NodeType::File, "gone")).unwrap();
        conn.execute(
            "UPDATE tree_nodes SET soft_deleted_at = 1 WHERE inode = 'a'",
            [],
        )
        .unwrap();

        assert!(TreeNode::get_by_inode(&conn, "a").unwrap().is_none());
        assert!(TreeNode::list_by_pinode(&conn, "r").unwrap().is_empty());
    }

    #[test]
    fn test_fuzzy_search_predicates() {
        let (_dir, db) = temp_db();
        let conn = db.get_connection().unwrap();

        TreeNode::create(&conn, &node("r", ROOT_PINODE, NodeType::Directory, "root")).unwrap();
        TreeNode::create(&conn, &node("a", "r", NodeType::File, "login_ok")).unwrap();
        TreeNode::create(&conn, &node("b", "r", NodeType::File, "logout")).unwrap();
        TreeNode::create(&conn, &node("c", "r", NodeType::File, "pay100%")).unwrap();

        let base = NodeSearchFilter {
            scope: "project-autotest".into(),
            scope_id: "7".into(),
            ..Default::default()
        };

        let by_prefix = TreeNode::fuzzy_search(
            &conn,
            &NodeSearchFilter {
                prefix: Some("log".into()),
                ..base.clone()
            },
        )
        .unwrap();
        assert_eq!(by_prefix.len(), 2);

        // OR across predicates
        let either = TreeNode::fuzzy_search(
            &conn,
            &NodeSearchFilter {
                suffix: Some("out".into()),
                substring: Some("100%".into()),
                ..base.clone()
            },
        )
        .unwrap();
        let mut names: Vec<&str> = either.iter().map(|n| n.name()).collect();
        names.sort();
        assert_eq!(names, vec!["logout", "pay100%"]);

        // '_' is literal, not a wildcard
        let literal = TreeNode::fuzzy_search(
            &conn,
            &NodeSearchFilter {
                substring: Some("n_o".into()),
                ..base.clone()
            },
        )
        .unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].name(), "login_ok");

        let restricted = TreeNode::fuzzy_search(
            &conn,
            &NodeSearchFilter {
                pinodes: Some(vec!["nowhere".into()]),
                ..base.clone()
            },
        )
        .unwrap();
        assert!(restricted.is_empty());

        let by_creator = TreeNode::fuzzy_search(
            &conn,
            &NodeSearchFilter {
                creator_id: Some("someone-else".into()),
                ..base
            },
        )
        .unwrap();
        assert!(by_creator.is_empty());
    }
}
