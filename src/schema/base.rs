pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');

-- ========================================
-- Tree nodes
-- ========================================
-- One row per directory or file. pinode = '0' marks the root of a (scope, scope_id) tree.
CREATE TABLE IF NOT EXISTS tree_nodes (
    node_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    inode           TEXT NOT NULL UNIQUE,
    pinode          TEXT NOT NULL,
    node_type       TEXT NOT NULL CHECK(node_type IN ('d', 'f')),
    scope           TEXT NOT NULL,
    scope_id        TEXT NOT NULL,
    name            TEXT NOT NULL,
    node_desc       TEXT NOT NULL DEFAULT '',
    creator_id      TEXT NOT NULL,
    updater_id      TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    soft_deleted_at INTEGER DEFAULT NULL    -- Tombstone used by the wider DAO layer; tree deletes are hard
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tree_nodes_scope_root
    ON tree_nodes (scope, scope_id) WHERE pinode = '0';
CREATE UNIQUE INDEX IF NOT EXISTS idx_tree_nodes_sibling_name
    ON tree_nodes (pinode, name) WHERE pinode <> '0';
CREATE INDEX IF NOT EXISTS idx_tree_nodes_pinode ON tree_nodes (pinode);
CREATE INDEX IF NOT EXISTS idx_tree_nodes_scope ON tree_nodes (scope, scope_id, name);

-- ========================================
-- Per-node payload (0 or 1 row per node)
-- ========================================
CREATE TABLE IF NOT EXISTS tree_node_meta (
    meta_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    inode           TEXT NOT NULL UNIQUE,
    pipeline_yml    TEXT NOT NULL DEFAULT '',
    snippet_action  TEXT DEFAULT NULL,      -- JSON SnippetAction
    extra           TEXT NOT NULL DEFAULT '{}',
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

-- ========================================
-- Immutable node snapshots, capped per inode
-- ========================================
CREATE TABLE IF NOT EXISTS tree_node_histories (
    history_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    inode           TEXT NOT NULL,
    pinode          TEXT NOT NULL,
    name            TEXT NOT NULL,
    node_desc       TEXT NOT NULL,
    creator_id      TEXT NOT NULL,
    updater_id      TEXT NOT NULL,
    pipeline_yml    TEXT NOT NULL DEFAULT '',
    snippet_action  TEXT DEFAULT NULL,
    extra           TEXT NOT NULL DEFAULT '{}',
    created_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tree_node_histories_inode
    ON tree_node_histories (inode, created_at DESC, history_id DESC);

-- ========================================
-- Subtree jobs (copy / delete fan-out)
-- ========================================
CREATE TABLE IF NOT EXISTS tree_jobs (
    job_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type        INTEGER NOT NULL,          -- JobType enum: 0=CopySubtree, 1=DeleteSubtree
    status          INTEGER NOT NULL DEFAULT 0, -- JobStatus enum: 0=Pending, 1=Running, 2=Completed, 3=Error
    source_inode    TEXT NOT NULL,             -- Top node copied or deleted
    target_inode    TEXT DEFAULT NULL,         -- Top node created by a copy
    requested_by    TEXT NOT NULL,
    retry_of        INTEGER DEFAULT NULL,
    nodes_processed INTEGER NOT NULL DEFAULT 0,
    failure_count   INTEGER NOT NULL DEFAULT 0,
    error           TEXT DEFAULT NULL,
    created_at      INTEGER NOT NULL,
    started_at      INTEGER DEFAULT NULL,
    ended_at        INTEGER DEFAULT NULL,
    FOREIGN KEY (retry_of) REFERENCES tree_jobs(job_id)
);

CREATE INDEX IF NOT EXISTS idx_tree_jobs_status ON tree_jobs (status, job_id);

CREATE TABLE IF NOT EXISTS tree_job_failures (
    failure_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id          INTEGER NOT NULL,
    work_item       TEXT NOT NULL,             -- JSON WorkItem, replayed by a retry
    error           TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    FOREIGN KEY (job_id) REFERENCES tree_jobs(job_id)
);

CREATE INDEX IF NOT EXISTS idx_tree_job_failures_job ON tree_job_failures (job_id);

COMMIT;
"#;
