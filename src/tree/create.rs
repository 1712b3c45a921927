use log::info;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::FileTreeError;
use crate::identity::Identity;
use crate::naming::resolve_sibling_name;
use crate::node::{NodeType, TreeNode, ROOT_PINODE};
use crate::utils::Utils;

use super::{is_root_pinode, load_node, require_scope, FileTree};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    /// "d"/"dir"/"directory" or "f"/"file"
    #[serde(rename = "type")]
    pub node_type: String,
    /// Parent inode. Empty (or "0") creates the scope root.
    #[serde(default)]
    pub pinode: Option<String>,
    /// Only read for roots; children inherit the parent's scope.
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub scope_id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

impl FileTree {
    /// Create a root or a child node.
    ///
    /// A taken name is never an error: the node is stored under the first free
    /// `name(n)` instead.
    pub fn create(
        &self,
        identity: &Identity,
        request: CreateNodeRequest,
    ) -> Result<TreeNode, FileTreeError> {
        identity.ensure_present()?;
        let node_type = NodeType::parse(&request.node_type)?;

        let conn = self.db.get_connection()?;
        let node = Database::immediate_transaction(&conn, |conn| {
            let now = Utils::now_secs();

            if is_root_pinode(request.pinode.as_deref()) {
                if node_type != NodeType::Directory {
                    return Err(FileTreeError::InvalidArgument(
                        "a scope root must be a directory".to_string(),
                    ));
                }
                require_scope(&request.scope, &request.scope_id)?;

                if let Some(existing) =
                    TreeNode::get_scope_root(conn, &request.scope, &request.scope_id)?
                {
                    return Err(FileTreeError::AlreadyExists(format!(
                        "scope '{}/{}' already has root '{}'",
                        request.scope,
                        request.scope_id,
                        existing.inode()
                    )));
                }

                let name = self.validate_name(&request.name)?;
                self.validate_desc(&request.desc)?;

                let root = TreeNode::new(
                    Utils::new_inode(),
                    ROOT_PINODE.to_owned(),
                    node_type,
                    request.scope.trim().to_owned(),
                    request.scope_id.trim().to_owned(),
                    name,
                    request.desc.clone(),
                    identity.user_id(),
                    now,
                );
                TreeNode::create(conn, &root)?;
                return Ok(root);
            }

            let pinode = request.pinode.as_deref().unwrap_or_default().trim();
            let parent = load_node(conn, pinode)?;
            if !parent.is_dir() {
                return Err(FileTreeError::InvalidState(format!(
                    "parent '{}' is not a directory",
                    parent.inode()
                )));
            }

            let name = self.validate_name(&request.name)?;
            self.validate_desc(&request.desc)?;

            let siblings = TreeNode::sibling_names(conn, parent.inode(), None)?;
            let name = resolve_sibling_name(&name, siblings.iter().map(String::as_str));

            let node = TreeNode::new(
                Utils::new_inode(),
                parent.inode().to_owned(),
                node_type,
                parent.scope().to_owned(),
                parent.scope_id().to_owned(),
                name,
                request.desc.clone(),
                identity.user_id(),
                now,
            );
            TreeNode::create(conn, &node)?;
            Ok(node)
        })?;

        info!(
            "Created {} '{}' ({}) under '{}' by {}",
            node.node_type().long_name(),
            node.name(),
            node.inode(),
            node.pinode(),
            identity.user_id()
        );
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{create_dir, create_file, create_root, temp_tree, SCOPE, SCOPE_ID};
    use pretty_assertions::assert_eq;

    fn child(pinode: &str, node_type: &str, name: &str) -> CreateNodeRequest {
        CreateNodeRequest {
            node_type: node_type.into(),
            pinode: Some(pinode.into()),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_root_is_unique_per_scope() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let first = create_root(&tree, &user);

        let err = tree
            .create(
                &user,
                CreateNodeRequest {
                    node_type: "d".into(),
                    pinode: Some("0".into()),
                    scope: SCOPE.into(),
                    scope_id: SCOPE_ID.into(),
                    name: "another".into(),
                    desc: String::new(),
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // First root untouched, and a different scope id still gets its own root
        assert_eq!(tree.get(first.inode()).unwrap(), first);
        let other = tree
            .create(
                &user,
                CreateNodeRequest {
                    node_type: "d".into(),
                    pinode: None,
                    scope: SCOPE.into(),
                    scope_id: "other".into(),
                    name: "root".into(),
                    desc: String::new(),
                },
            )
            .unwrap();
        assert!(other.is_root());
    }

    #[test]
    fn test_root_must_be_directory_with_scope() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");

        let as_file = CreateNodeRequest {
            node_type: "f".into(),
            scope: SCOPE.into(),
            scope_id: SCOPE_ID.into(),
            name: "root".into(),
            ..Default::default()
        };
        assert_eq!(
            tree.create(&user, as_file).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let no_scope = CreateNodeRequest {
            node_type: "d".into(),
            name: "root".into(),
            ..Default::default()
        };
        assert_eq!(
            tree.create(&user, no_scope).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_child_inherits_scope_and_stamps_identity() {
        let (_dir, tree) = temp_tree();
        let root = create_root(&tree, &Identity::new("1001"));

        let node = tree
            .create(&Identity::new("2002"), child(root.inode(), "file", "login"))
            .unwrap();
        assert_eq!(node.scope(), SCOPE);
        assert_eq!(node.scope_id(), SCOPE_ID);
        assert_eq!(node.pinode(), root.inode());
        assert_eq!(node.creator_id(), "2002");
        assert_eq!(node.updater_id(), "2002");
        assert_ne!(node.inode(), root.inode());
        assert!(tree.get_meta(node.inode()).unwrap().is_none());
    }

    #[test]
    fn test_name_collision_is_suffixed() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);

        let a = create_dir(&tree, &user, root.inode(), "foo");
        let b = create_dir(&tree, &user, root.inode(), "foo");
        let c = create_file(&tree, &user, root.inode(), "foo");
        assert_eq!(a.name(), "foo");
        assert_eq!(b.name(), "foo(1)");
        assert_eq!(c.name(), "foo(2)");
    }

    #[test]
    fn test_validation_order_and_kinds() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        let file = create_file(&tree, &user, root.inode(), "case");

        // Unknown type wins over everything else
        assert_eq!(
            tree.create(&user, child("ghost", "link", "x")).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        // Missing parent wins over a bad name
        assert_eq!(
            tree.create(&user, child("ghost", "f", "")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            tree.create(&user, child(file.inode(), "f", "nested")).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            tree.create(&user, child(root.inode(), "f", "  ")).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            tree.create(&Identity::new(""), child(root.inode(), "f", "x"))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_length_bounds_count_characters() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);

        let fifty_wide = "用".repeat(50);
        assert!(tree.create(&user, child(root.inode(), "f", &fifty_wide)).is_ok());

        let too_long = "a".repeat(51);
        assert_eq!(
            tree.create(&user, child(root.inode(), "f", &too_long)).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let mut long_desc = child(root.inode(), "f", "described");
        long_desc.desc = "d".repeat(1001);
        assert_eq!(
            tree.create(&user, long_desc).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
