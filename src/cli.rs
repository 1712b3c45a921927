use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use serde::Serialize;

use autotest_filetree::config::Config;
use autotest_filetree::job::JobStatus;
use autotest_filetree::node_meta::Extra;
use autotest_filetree::snippet::SnippetConfig;
use autotest_filetree::tree::{
    CreateNodeRequest, FuzzySearchRequest, SavePipelineRequest, UpdateBasicInfoRequest,
};
use autotest_filetree::{FileTree, FileTreeError, Identity};

#[derive(Parser, Debug)]
#[command(
    name = "filetree",
    version,
    about = "Autotest file tree: inode-addressed directories and cases stored in SQLite"
)]
pub struct Cli {
    /// User id recorded as creator/updater
    #[arg(long, short = 'u', global = true, default_value = "cli")]
    pub user: String,

    /// Database file (overrides the configured path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a node. Without --pinode, creates the root of --scope/--scope-id
    Create {
        /// d|dir|directory or f|file
        #[arg(long = "type", short = 't')]
        node_type: String,
        #[arg(long)]
        pinode: Option<String>,
        #[arg(long, default_value = "")]
        scope: String,
        #[arg(long, default_value = "")]
        scope_id: String,
        #[arg(long, default_value = "")]
        desc: String,
        name: String,
    },

    /// Show a node
    Get {
        inode: String,
        /// Also show the pipeline payload
        #[arg(long)]
        meta: bool,
    },

    /// List children of a directory, or the scope root when no inode is given
    Ls {
        #[arg(long, default_value = "")]
        scope: String,
        #[arg(long, default_value = "")]
        scope_id: String,
        pinode: Option<String>,
    },

    /// Move a node under another directory
    Mv { inode: String, destination: String },

    /// Copy a node (and, in the background, its subtree) under another directory
    Cp { inode: String, destination: String },

    /// Delete a node (and, in the background, its subtree)
    Rm { inode: String },

    /// Show the chain from the scope root down to a node
    Ancestors { inode: String },

    /// Search node names in a scope
    Search {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        scope_id: String,
        /// Directory to search under (default: scope root)
        #[arg(long = "from")]
        from_pinode: Option<String>,
        #[arg(long, short = 'r')]
        recursive: bool,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        suffix: Option<String>,
        #[arg(long = "contains")]
        substring: Option<String>,
        #[arg(long = "creator")]
        creator_id: Option<String>,
    },

    /// Show the snapshots of a node, newest first
    History { inode: String },

    /// Change the name and/or description of a node
    Rename {
        inode: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        desc: Option<String>,
    },

    /// Store a pipeline YAML file on a node
    #[command(name = "save-pipeline")]
    SavePipeline {
        inode: String,
        /// YAML file to store
        #[arg(long, short = 'f')]
        file: PathBuf,
        /// JSON object merged into the node's extra map
        #[arg(long)]
        extra: Option<String>,
    },

    /// Resolve snippet references to their pipeline YAML
    Snippet {
        #[arg(required = true)]
        inodes: Vec<String>,
        #[arg(long, default_value = autotest_filetree::snippet::SNIPPET_SOURCE_AUTOTEST)]
        source: String,
    },

    /// Show subtree jobs
    Jobs {
        /// Show a single job
        #[arg(long, conflicts_with = "status")]
        id: Option<i64>,
        /// Include failed work items (requires --id)
        #[arg(long, requires = "id")]
        failures: bool,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Retry the failed work items of a finished job
    Retry { job_id: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    Pending,
    Running,
    Completed,
    Error,
}

impl From<StatusArg> for JobStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => JobStatus::Pending,
            StatusArg::Running => JobStatus::Running,
            StatusArg::Completed => JobStatus::Completed,
            StatusArg::Error => JobStatus::Error,
        }
    }
}

impl Cli {
    /// Run the parsed command against the configured database and wait for
    /// any background work it started.
    pub fn execute(self, config: &Config, data_dir: &Path) -> Result<(), FileTreeError> {
        let db_path = self.db.clone().unwrap_or_else(|| config.db_path(data_dir));
        debug!("Using database {}", db_path.display());

        let tree = FileTree::open(&db_path, config.tree_settings())?;
        let identity = Identity::new(self.user.clone());

        let result = Self::dispatch(&tree, &identity, self.command);
        tree.wait_idle();
        result
    }

    fn dispatch(tree: &FileTree, identity: &Identity, command: Command) -> Result<(), FileTreeError> {
        match command {
            Command::Create {
                node_type,
                pinode,
                scope,
                scope_id,
                desc,
                name,
            } => print_json(&tree.create(
                identity,
                CreateNodeRequest {
                    node_type,
                    pinode,
                    scope,
                    scope_id,
                    name,
                    desc,
                },
            )?),

            Command::Get { inode, meta } => {
                let node = tree.get(&inode)?;
                if meta {
                    print_json(&serde_json::json!({
                        "node": node,
                        "meta": tree.get_meta(&inode)?,
                    }))
                } else {
                    print_json(&node)
                }
            }

            Command::Ls {
                scope,
                scope_id,
                pinode,
            } => print_json(&tree.list(&scope, &scope_id, pinode.as_deref())?),

            Command::Mv { inode, destination } => {
                print_json(&tree.move_node(identity, &inode, &destination)?)
            }

            Command::Cp { inode, destination } => {
                print_json(&tree.copy(identity, &inode, &destination)?)
            }

            Command::Rm { inode } => print_json(&tree.delete(identity, &inode)?),

            Command::Ancestors { inode } => print_json(&tree.find_ancestors(&inode)?),

            Command::Search {
                scope,
                scope_id,
                from_pinode,
                recursive,
                prefix,
                suffix,
                substring,
                creator_id,
            } => print_json(&tree.fuzzy_search(&FuzzySearchRequest {
                scope,
                scope_id,
                from_pinode,
                recursive,
                prefix,
                suffix,
                substring,
                creator_id,
            })?),

            Command::History { inode } => print_json(&tree.query_history(&inode)?),

            Command::Rename { inode, name, desc } => print_json(&tree.update_basic_info(
                identity,
                &inode,
                UpdateBasicInfoRequest { name, desc },
            )?),

            Command::SavePipeline { inode, file, extra } => {
                let pipeline_yml = fs::read_to_string(&file)?;
                let extra = extra
                    .map(|json| serde_json::from_str::<Extra>(&json))
                    .transpose()
                    .map_err(|e| FileTreeError::InvalidArgument(format!("--extra: {}", e)))?;
                print_json(&tree.save_pipeline(
                    identity,
                    &inode,
                    SavePipelineRequest {
                        pipeline_yml,
                        snippet_action: None,
                        extra,
                    },
                )?)
            }

            Command::Snippet { inodes, source } => {
                let configs: Vec<SnippetConfig> = inodes
                    .iter()
                    .map(|inode| SnippetConfig {
                        source: source.clone(),
                        ..SnippetConfig::autotest(inode)
                    })
                    .collect();
                print_json(&tree.batch_resolve_snippet_yaml(&configs)?)
            }

            Command::Jobs {
                id: Some(job_id),
                failures,
                ..
            } => {
                let job = tree.get_job(job_id)?;
                if failures {
                    print_json(&serde_json::json!({
                        "job": job,
                        "failures": tree.job_failures(job_id)?,
                    }))
                } else {
                    print_json(&job)
                }
            }

            Command::Jobs {
                id: None,
                status,
                limit,
                ..
            } => print_json(&tree.list_jobs(status.map(JobStatus::from), limit)?),

            Command::Retry { job_id } => {
                let retry_id = tree.retry_job(identity, job_id)?;
                print_json(&serde_json::json!({ "job_id": retry_id, "retry_of": job_id }))
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), FileTreeError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
