use log::info;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::FileTreeError;
use crate::identity::Identity;
use crate::naming::resolve_sibling_name;
use crate::node::TreeNode;
use crate::node_history::TreeNodeHistory;
use crate::node_meta::{Extra, MetaUpdate, TreeNodeMeta};
use crate::snippet::SnippetAction;
use crate::utils::Utils;

use super::{load_node, FileTree};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBasicInfoRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavePipelineRequest {
    pub pipeline_yml: String,
    #[serde(default)]
    pub snippet_action: Option<SnippetAction>,
    /// Merged key by key into the stored map
    #[serde(default)]
    pub extra: Option<Extra>,
}

impl FileTree {
    /// Rename and/or re-describe a node. The pre-update state goes to history.
    pub fn update_basic_info(
        &self,
        identity: &Identity,
        inode: &str,
        request: UpdateBasicInfoRequest,
    ) -> Result<TreeNode, FileTreeError> {
        identity.ensure_present()?;

        let name = request
            .name
            .as_deref()
            .map(|name| self.validate_name(name))
            .transpose()?;
        if let Some(desc) = &request.desc {
            self.validate_desc(desc)?;
        }

        let conn = self.db.get_connection()?;
        let (node, snapshot) = Database::immediate_transaction(&conn, |conn| {
            let mut node = load_node(conn, inode)?;
            let now = Utils::now_secs();
            let meta = TreeNodeMeta::get_by_inode(conn, inode)?;
            let snapshot = TreeNodeHistory::snapshot(&node, meta.as_ref(), now);

            let name = match name {
                Some(name) if name != node.name() && !node.is_root() => {
                    let siblings = TreeNode::sibling_names(conn, node.pinode(), Some(inode))?;
                    Some(resolve_sibling_name(&name, siblings.iter().map(String::as_str)))
                }
                other => other,
            };

            TreeNode::update_basic_info(
                conn,
                inode,
                name.as_deref(),
                request.desc.as_deref(),
                identity.user_id(),
                now,
            )?;
            node.set_basic_info(name, request.desc.clone(), identity.user_id(), now);
            Ok((node, snapshot))
        })?;

        self.record_history(snapshot);
        info!(
            "Updated '{}' ({}) by {}",
            node.name(),
            node.inode(),
            identity.user_id()
        );
        Ok(node)
    }

    /// Create or update the pipeline payload of `inode` and stamp the node's updater.
    ///
    /// A new meta row without an explicit snippet action gets one pointing at
    /// the node itself, so the node can be referenced as a snippet right away.
    pub fn save_pipeline(
        &self,
        identity: &Identity,
        inode: &str,
        request: SavePipelineRequest,
    ) -> Result<TreeNodeMeta, FileTreeError> {
        identity.ensure_present()?;

        let conn = self.db.get_connection()?;
        let meta = Database::immediate_transaction(&conn, |conn| {
            load_node(conn, inode)?;
            let now = Utils::now_secs();

            let meta = if TreeNodeMeta::get_by_inode(conn, inode)?.is_some() {
                TreeNodeMeta::update_by_inode(
                    conn,
                    inode,
                    MetaUpdate {
                        pipeline_yml: Some(request.pipeline_yml.clone()),
                        snippet_action: request.snippet_action.clone(),
                        extra: request.extra.clone(),
                    },
                    now,
                )?
            } else {
                let action = request
                    .snippet_action
                    .clone()
                    .unwrap_or_else(|| SnippetAction::for_node(inode, None));
                let meta = TreeNodeMeta::new(
                    inode,
                    request.pipeline_yml.clone(),
                    Some(action),
                    request.extra.clone().unwrap_or_default(),
                    now,
                );
                TreeNodeMeta::create(conn, &meta)?;
                meta
            };

            TreeNode::touch(conn, inode, identity.user_id(), now)?;
            Ok(meta)
        })?;

        info!("Saved pipeline of '{}' by {}", inode, identity.user_id());
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::snippet::SnippetConfig;
    use crate::test_support::{create_dir, create_file, create_root, temp_tree};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_rename_resolves_collision_but_not_against_self() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        create_file(&tree, &user, root.inode(), "taken");
        let file = create_file(&tree, &user, root.inode(), "case");

        let renamed = tree
            .update_basic_info(
                &user,
                file.inode(),
                UpdateBasicInfoRequest {
                    name: Some("taken".into()),
                    desc: None,
                },
            )
            .unwrap();
        assert_eq!(renamed.name(), "taken(1)");

        let same = tree
            .update_basic_info(
                &Identity::new("2002"),
                file.inode(),
                UpdateBasicInfoRequest {
                    name: Some("taken(1)".into()),
                    desc: Some("now described".into()),
                },
            )
            .unwrap();
        assert_eq!(same.name(), "taken(1)");
        assert_eq!(same.desc(), "now described");
        assert_eq!(same.updater_id(), "2002");
        assert_eq!(tree.get(file.inode()).unwrap(), same);
    }

    #[test]
    fn test_rename_root_skips_sibling_resolution() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        create_dir(&tree, &user, root.inode(), "suite");

        let renamed = tree
            .update_basic_info(
                &user,
                root.inode(),
                UpdateBasicInfoRequest {
                    name: Some("suite".into()),
                    desc: None,
                },
            )
            .unwrap();
        assert_eq!(renamed.name(), "suite");
    }

    #[test]
    fn test_update_validates_before_touching_store() {
        let (_dir, tree) = temp_tree();
        let user = Identity::new("1001");
        let root = create_root(&tree, &user);
        let file = create_file(&tree, &user, root.inode(), "case");

        let err = tree
            .update_basic_info(
                &user,
                file.inode(),
                UpdateBasicInfoRequest {
                    name: Some("x".repeat(51)),
                    desc: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            tree.update_basic_info(&user, "ghost", UpdateBasicInfoRequest::default())
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );

        tree.wait_idle();
        assert!(tree.query_history(file.inode()).unwrap().is_empty());
    }

    #[test]
    fn test_save_pipeline_creates_then_merges() {
        let (_dir, tree) = temp_tree();
        let creator = Identity::new("1001");
        let root = create_root(&tree, &creator);
        let file = create_file(&tree, &creator, root.inode(), "case");

        let mut extra = Extra::new();
        extra.insert("owner".into(), json!("qa"));
        let created = tree
            .save_pipeline(
                &creator,
                file.inode(),
                SavePipelineRequest {
                    pipeline_yml: "version: 1.1".into(),
                    snippet_action: None,
                    extra: Some(extra),
                },
            )
            .unwrap();
        assert_eq!(
            created.snippet_action().unwrap().snippet_config,
            SnippetConfig::autotest(file.inode())
        );

        let mut more = Extra::new();
        more.insert("priority".into(), json!("P0"));
        let updated = tree
            .save_pipeline(
                &Identity::new("2002"),
                file.inode(),
                SavePipelineRequest {
                    pipeline_yml: "version: 1.2".into(),
                    snippet_action: None,
                    extra: Some(more),
                },
            )
            .unwrap();
        assert_eq!(updated.pipeline_yml(), "version: 1.2");
        assert_eq!(updated.extra().len(), 2);
        assert_eq!(updated.snippet_action(), created.snippet_action());
        assert_eq!(tree.get(file.inode()).unwrap().updater_id(), "2002");

        let yml = tree
            .resolve_snippet_yaml(&SnippetConfig::autotest(file.inode()))
            .unwrap();
        assert_eq!(yml, "version: 1.2");
    }

    #[test]
    fn test_save_pipeline_missing_node() {
        let (_dir, tree) = temp_tree();
        let err = tree
            .save_pipeline(&Identity::new("1001"), "ghost", SavePipelineRequest::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
