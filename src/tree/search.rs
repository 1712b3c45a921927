use std::collections::HashSet;

use log::{debug, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::FileTreeError;
use crate::node::{NodeSearchFilter, TreeNode};

use super::{is_root_pinode, load_node, require_scope, FileTree};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzySearchRequest {
    pub scope: String,
    pub scope_id: String,
    /// Directory to search under. Defaults to the scope root.
    #[serde(default)]
    pub from_pinode: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub substring: Option<String>,
    #[serde(default)]
    pub creator_id: Option<String>,
}

impl FileTree {
    /// Match node names in a scope by prefix, suffix or substring (any of them).
    ///
    /// A recursive search from a directory below the root only considers nodes
    /// inside that directory's subtree. Every other combination scans the
    /// whole scope.
    pub fn fuzzy_search(&self, request: &FuzzySearchRequest) -> Result<Vec<TreeNode>, FileTreeError> {
        let _tmr = timer!(Level::Debug; "FileTree::fuzzy_search", "{}/{}", request.scope, request.scope_id);
        require_scope(&request.scope, &request.scope_id)?;

        let conn = self.db.get_connection()?;

        let pinodes = match request.from_pinode.as_deref() {
            Some(from) if request.recursive && !is_root_pinode(Some(from)) => {
                let start = load_node(&conn, from)?;
                if start.scope() != request.scope || start.scope_id() != request.scope_id {
                    return Err(FileTreeError::InvalidArgument(format!(
                        "'{}' is not in scope '{}/{}'",
                        from, request.scope, request.scope_id
                    )));
                }
                if !start.is_dir() {
                    return Err(FileTreeError::InvalidArgument(format!(
                        "'{}' is not a directory",
                        from
                    )));
                }
                if start.is_root() {
                    None
                } else {
                    Some(self.collect_dir_inodes(&conn, start.inode())?)
                }
            }
            _ => None,
        };

        if let Some(pinodes) = &pinodes {
            debug!("Searching under {} directories", pinodes.len());
        }

        TreeNode::fuzzy_search(
            &conn,
            &NodeSearchFilter {
                scope: request.scope.clone(),
                scope_id: request.scope_id.clone(),
                prefix: request.prefix.clone(),
                suffix: request.suffix.clone(),
                substring: request.substring.clone(),
                pinodes,
                creator_id: request.creator_id.clone(),
            },
        )
    }

    /// `start` plus every directory below it, depth first.
    fn collect_dir_inodes(&self, conn: &Connection, start: &str) -> Result<Vec<String>, FileTreeError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut collected = Vec::new();
        let mut stack = vec![start.to_owned()];

        while let Some(inode) = stack.pop() {
            if !seen.insert(inode.clone()) {
                continue;
            }
            stack.extend(TreeNode::list_child_dir_inodes(conn, &inode)?);
            collected.push(inode);
        }
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::identity::Identity;
    use crate::test_support::{create_dir, create_file, create_root, temp_tree, SCOPE, SCOPE_ID};
    use pretty_assertions::assert_eq;

    fn names(nodes: &[TreeNode]) -> Vec<&str> {
        let mut names: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
        names.sort();
        names
    }

    fn request() -> FuzzySearchRequest {
        FuzzySearchRequest {
            scope: SCOPE.into(),
            scope_id: SCOPE_ID.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_recursive_search_is_bounded_by_start() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        let a = create_dir(&tree, &user, root.inode(), "A");
        let b = create_dir(&tree, &user, a.inode(), "B");
        create_file(&tree, &user, a.inode(), "login_a");
        create_file(&tree, &user, b.inode(), "login_b");
        create_file(&tree, &user, root.inode(), "login_root");

        let under_a = tree
            .fuzzy_search(&FuzzySearchRequest {
                from_pinode: Some(a.inode().into()),
                recursive: true,
                prefix: Some("login".into()),
                ..request()
            })
            .unwrap();
        assert_eq!(names(&under_a), vec!["login_a", "login_b"]);

        let from_root = tree
            .fuzzy_search(&FuzzySearchRequest {
                from_pinode: Some(root.inode().into()),
                recursive: true,
                prefix: Some("login".into()),
                ..request()
            })
            .unwrap();
        assert_eq!(names(&from_root), vec!["login_a", "login_b", "login_root"]);

        let flat = tree
            .fuzzy_search(&FuzzySearchRequest {
                prefix: Some("login".into()),
                ..request()
            })
            .unwrap();
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_name_predicates_are_ored_and_creator_is_anded() {
        let (_dir, tree) = temp_tree();
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");
        let root = create_root(&tree, &alice);
        create_file(&tree, &alice, root.inode(), "pay_start");
        create_file(&tree, &bob, root.inode(), "refund_end");
        create_file(&tree, &alice, root.inode(), "middle");

        let either = tree
            .fuzzy_search(&FuzzySearchRequest {
                prefix: Some("pay".into()),
                suffix: Some("end".into()),
                ..request()
            })
            .unwrap();
        assert_eq!(names(&either), vec!["pay_start", "refund_end"]);

        let by_bob = tree
            .fuzzy_search(&FuzzySearchRequest {
                prefix: Some("pay".into()),
                suffix: Some("end".into()),
                creator_id: Some("bob".into()),
                ..request()
            })
            .unwrap();
        assert_eq!(names(&by_bob), vec!["refund_end"]);
    }

    #[test]
    fn test_search_argument_errors() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        let file = create_file(&tree, &user, root.inode(), "case");

        assert_eq!(
            tree.fuzzy_search(&FuzzySearchRequest {
                from_pinode: Some(file.inode().into()),
                recursive: true,
                ..request()
            })
            .unwrap_err()
            .kind(),
            ErrorKind::InvalidArgument
        );

        assert_eq!(
            tree.fuzzy_search(&FuzzySearchRequest::default()).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            tree.fuzzy_search(&FuzzySearchRequest {
                from_pinode: Some("ghost".into()),
                recursive: true,
                ..request()
            })
            .unwrap_err()
            .kind(),
            ErrorKind::NotFound
        );
    }
}
