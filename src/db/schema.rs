//! SQL DDL for initializing the catalog.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - `repositories` table (one (owner, name) per row, carries the watermark)
/// - `blobs` table (one row per content hash)
/// - `commits` table (one (repository_id, sha) per row)
/// - `commit_files` table (one (repository_id, sha, file_path) per row)
/// - `last_commits` view (most recent recorded commit per repository)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Tracked repositories (last_commit_sha is the incremental watermark)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY NOT NULL,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    default_branch TEXT NULL,
    topics TEXT NOT NULL DEFAULT '', -- comma separated, sorted
    stars INTEGER NULL,
    discovered_at TEXT NOT NULL, -- RFC3339
    last_commit_sha TEXT NULL,
    last_commit_at TEXT NULL, -- RFC3339, committed time of the watermark commit
    last_synced_at TEXT NULL, -- RFC3339
    UNIQUE(owner, name)
);

-- ---------------------------------------------------------------------------
-- Content-addressed blobs (payload lives in the Blob Store)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blobs (
    hash TEXT PRIMARY KEY NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL -- RFC3339
);

-- ---------------------------------------------------------------------------
-- Commits (immutable once written)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS commits (
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    sha TEXT NOT NULL,
    parent_shas TEXT NOT NULL DEFAULT '', -- space separated, first parent first
    author_name TEXT NULL,
    author_email TEXT NULL,
    committer_name TEXT NULL,
    committer_email TEXT NULL,
    message TEXT NOT NULL,
    authored_at TEXT NULL, -- RFC3339
    committed_at TEXT NULL, -- RFC3339
    files_changed INTEGER NOT NULL,
    lines_added INTEGER NOT NULL,
    lines_removed INTEGER NOT NULL,
    collected_at TEXT NOT NULL, -- RFC3339
    PRIMARY KEY (repository_id, sha)
);

CREATE INDEX IF NOT EXISTS idx_commits_repo_ts ON commits(repository_id, committed_at);

-- ---------------------------------------------------------------------------
-- File-level diff of each commit
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS commit_files (
    repository_id INTEGER NOT NULL,
    sha TEXT NOT NULL,
    file_path TEXT NOT NULL,
    previous_path TEXT NULL,
    file_extension TEXT NOT NULL DEFAULT '',
    change_kind TEXT NOT NULL, -- added | modified | deleted | renamed
    lines_added INTEGER NOT NULL,
    lines_removed INTEGER NOT NULL,
    before_hash TEXT NULL REFERENCES blobs(hash),
    after_hash TEXT NULL REFERENCES blobs(hash),
    PRIMARY KEY (repository_id, sha, file_path),
    FOREIGN KEY (repository_id, sha) REFERENCES commits(repository_id, sha)
);

CREATE INDEX IF NOT EXISTS idx_commit_files_ext ON commit_files(file_extension);

-- ---------------------------------------------------------------------------
-- Most recent recorded commit per repository
-- ---------------------------------------------------------------------------
CREATE VIEW IF NOT EXISTS last_commits AS
SELECT
    r.id AS repository_id,
    r.owner AS owner,
    r.name AS name,
    c.sha AS sha,
    c.committed_at AS committed_at,
    r.last_commit_sha AS watermark_sha,
    r.last_synced_at AS last_synced_at
FROM repositories r
JOIN commits c ON c.repository_id = r.id
WHERE c.sha = (
    SELECT c2.sha FROM commits c2
    WHERE c2.repository_id = r.id
    ORDER BY c2.committed_at DESC, c2.collected_at DESC
    LIMIT 1
);
"#;
