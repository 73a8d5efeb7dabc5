use crate::db::models::{
    DbBlob, DbCommit, DbCommitFile, DbLastCommit, DbRepository, RepositoryId, merge_topics,
};
use crate::db::records::{CommitRecord, NewRepository, Registration, RepositoryFilter};
use crate::db::schema::SQLITE_INIT;
use crate::error::VaultError;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum CatalogMessage {
    /// Insert a repository unless `(owner, name)` is already known.
    Register(NewRepository, RpcReplyPort<Result<Registration, VaultError>>),

    /// Get a repository by id; `NotFound` if absent.
    GetRepository(RepositoryId, RpcReplyPort<Result<DbRepository, VaultError>>),

    /// Look a repository up by `(owner, name)`.
    FindRepository {
        owner: String,
        name: String,
        reply: RpcReplyPort<Result<Option<DbRepository>, VaultError>>,
    },

    /// List repositories matching a filter, ordered by id.
    ListRepositories(
        RepositoryFilter,
        RpcReplyPort<Result<Vec<DbRepository>, VaultError>>,
    ),

    /// Union `topics` into the repository's tag set and optionally refresh its star count.
    MergeTopics {
        id: RepositoryId,
        topics: Vec<String>,
        stars: Option<i64>,
        reply: RpcReplyPort<Result<(), VaultError>>,
    },

    /// Record the repository's default branch.
    SetDefaultBranch {
        id: RepositoryId,
        branch: String,
        reply: RpcReplyPort<Result<(), VaultError>>,
    },

    /// Write blob rows, the commit, its files and the watermark move in one transaction.
    RecordCommit(CommitRecord, RpcReplyPort<Result<(), VaultError>>),

    GetCommit {
        repository_id: RepositoryId,
        sha: String,
        reply: RpcReplyPort<Result<Option<DbCommit>, VaultError>>,
    },

    ListCommits(RepositoryId, RpcReplyPort<Result<Vec<DbCommit>, VaultError>>),

    /// The subset of `shas` already recorded for the repository.
    RecordedShas {
        repository_id: RepositoryId,
        shas: Vec<String>,
        reply: RpcReplyPort<Result<Vec<String>, VaultError>>,
    },

    ListCommitFiles {
        repository_id: RepositoryId,
        sha: String,
        reply: RpcReplyPort<Result<Vec<DbCommitFile>, VaultError>>,
    },

    /// Distinct non-null content hashes referenced by a repository's commit files.
    ReferencedHashes(RepositoryId, RpcReplyPort<Result<Vec<String>, VaultError>>),

    ListBlobs(RpcReplyPort<Result<Vec<DbBlob>, VaultError>>),

    LastCommits(RpcReplyPort<Result<Vec<DbLastCommit>, VaultError>>),
}

/// Cloneable handle to the catalog actor.
#[derive(Clone)]
pub struct CatalogHandle {
    actor: ActorRef<CatalogMessage>,
}

impl CatalogHandle {
    pub async fn register(&self, repo: NewRepository) -> Result<Registration, VaultError> {
        ractor::call!(self.actor, CatalogMessage::Register, repo)
            .map_err(|e| VaultError::RactorError(format!("Catalog Register RPC failed: {e}")))?
    }

    pub async fn get_repository(&self, id: RepositoryId) -> Result<DbRepository, VaultError> {
        ractor::call!(self.actor, CatalogMessage::GetRepository, id).map_err(|e| {
            VaultError::RactorError(format!("Catalog GetRepository RPC failed: {e}"))
        })?
    }

    pub async fn find_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<DbRepository>, VaultError> {
        let owner = owner.to_string();
        let name = name.to_string();
        ractor::call!(self.actor, |reply| CatalogMessage::FindRepository {
            owner,
            name,
            reply
        })
        .map_err(|e| VaultError::RactorError(format!("Catalog FindRepository RPC failed: {e}")))?
    }

    pub async fn list_repositories(
        &self,
        filter: RepositoryFilter,
    ) -> Result<Vec<DbRepository>, VaultError> {
        ractor::call!(self.actor, CatalogMessage::ListRepositories, filter).map_err(|e| {
            VaultError::RactorError(format!("Catalog ListRepositories RPC failed: {e}"))
        })?
    }

    pub async fn merge_topics(
        &self,
        id: RepositoryId,
        topics: Vec<String>,
        stars: Option<i64>,
    ) -> Result<(), VaultError> {
        ractor::call!(self.actor, |reply| CatalogMessage::MergeTopics {
            id,
            topics,
            stars,
            reply
        })
        .map_err(|e| VaultError::RactorError(format!("Catalog MergeTopics RPC failed: {e}")))?
    }

    pub async fn set_default_branch(
        &self,
        id: RepositoryId,
        branch: String,
    ) -> Result<(), VaultError> {
        ractor::call!(self.actor, |reply| CatalogMessage::SetDefaultBranch {
            id,
            branch,
            reply
        })
        .map_err(|e| VaultError::RactorError(format!("Catalog SetDefaultBranch RPC failed: {e}")))?
    }

    pub async fn record_commit(&self, record: CommitRecord) -> Result<(), VaultError> {
        ractor::call!(self.actor, CatalogMessage::RecordCommit, record)
            .map_err(|e| VaultError::RactorError(format!("Catalog RecordCommit RPC failed: {e}")))?
    }

    pub async fn get_commit(
        &self,
        repository_id: RepositoryId,
        sha: &str,
    ) -> Result<Option<DbCommit>, VaultError> {
        let sha = sha.to_string();
        ractor::call!(self.actor, |reply| CatalogMessage::GetCommit {
            repository_id,
            sha,
            reply
        })
        .map_err(|e| VaultError::RactorError(format!("Catalog GetCommit RPC failed: {e}")))?
    }

    pub async fn list_commits(
        &self,
        repository_id: RepositoryId,
    ) -> Result<Vec<DbCommit>, VaultError> {
        ractor::call!(self.actor, CatalogMessage::ListCommits, repository_id)
            .map_err(|e| VaultError::RactorError(format!("Catalog ListCommits RPC failed: {e}")))?
    }

    pub async fn recorded_shas(
        &self,
        repository_id: RepositoryId,
        shas: Vec<String>,
    ) -> Result<Vec<String>, VaultError> {
        ractor::call!(self.actor, |reply| CatalogMessage::RecordedShas {
            repository_id,
            shas,
            reply
        })
        .map_err(|e| VaultError::RactorError(format!("Catalog RecordedShas RPC failed: {e}")))?
    }

    pub async fn list_commit_files(
        &self,
        repository_id: RepositoryId,
        sha: &str,
    ) -> Result<Vec<DbCommitFile>, VaultError> {
        let sha = sha.to_string();
        ractor::call!(self.actor, |reply| CatalogMessage::ListCommitFiles {
            repository_id,
            sha,
            reply
        })
        .map_err(|e| VaultError::RactorError(format!("Catalog ListCommitFiles RPC failed: {e}")))?
    }

    pub async fn referenced_hashes(
        &self,
        repository_id: RepositoryId,
    ) -> Result<Vec<String>, VaultError> {
        ractor::call!(self.actor, CatalogMessage::ReferencedHashes, repository_id).map_err(|e| {
            VaultError::RactorError(format!("Catalog ReferencedHashes RPC failed: {e}"))
        })?
    }

    pub async fn list_blobs(&self) -> Result<Vec<DbBlob>, VaultError> {
        ractor::call!(self.actor, CatalogMessage::ListBlobs)
            .map_err(|e| VaultError::RactorError(format!("Catalog ListBlobs RPC failed: {e}")))?
    }

    pub async fn last_commits(&self) -> Result<Vec<DbLastCommit>, VaultError> {
        ractor::call!(self.actor, CatalogMessage::LastCommits)
            .map_err(|e| VaultError::RactorError(format!("Catalog LastCommits RPC failed: {e}")))?
    }
}

struct CatalogState {
    pool: SqlitePool,
}

struct CatalogActor;

#[ractor::async_trait]
impl Actor for CatalogActor {
    type Msg = CatalogMessage;
    type State = CatalogState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("CatalogActor initialized");
        Ok(CatalogState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let pool = &state.pool;
        match message {
            CatalogMessage::Register(repo, reply) => {
                let _ = reply.send(register(pool, repo).await);
            }
            CatalogMessage::GetRepository(id, reply) => {
                let res = find_repository_by_id(pool, id)
                    .await
                    .and_then(|row| row.ok_or(VaultError::NotFound(format!("repository {id}"))));
                let _ = reply.send(res);
            }
            CatalogMessage::FindRepository { owner, name, reply } => {
                let _ = reply.send(find_repository(pool, &owner, &name).await);
            }
            CatalogMessage::ListRepositories(filter, reply) => {
                let _ = reply.send(list_repositories(pool, &filter).await);
            }
            CatalogMessage::MergeTopics {
                id,
                topics,
                stars,
                reply,
            } => {
                let _ = reply.send(apply_merge_topics(pool, id, &topics, stars).await);
            }
            CatalogMessage::SetDefaultBranch { id, branch, reply } => {
                let _ = reply.send(set_default_branch(pool, id, &branch).await);
            }
            CatalogMessage::RecordCommit(record, reply) => {
                let _ = reply.send(record_commit(pool, record).await);
            }
            CatalogMessage::GetCommit {
                repository_id,
                sha,
                reply,
            } => {
                let _ = reply.send(get_commit(pool, repository_id, &sha).await);
            }
            CatalogMessage::ListCommits(repository_id, reply) => {
                let _ = reply.send(list_commits(pool, repository_id).await);
            }
            CatalogMessage::RecordedShas {
                repository_id,
                shas,
                reply,
            } => {
                let _ = reply.send(recorded_shas(pool, repository_id, &shas).await);
            }
            CatalogMessage::ListCommitFiles {
                repository_id,
                sha,
                reply,
            } => {
                let _ = reply.send(list_commit_files(pool, repository_id, &sha).await);
            }
            CatalogMessage::ReferencedHashes(repository_id, reply) => {
                let _ = reply.send(referenced_hashes(pool, repository_id).await);
            }
            CatalogMessage::ListBlobs(reply) => {
                let _ = reply.send(list_blobs(pool).await);
            }
            CatalogMessage::LastCommits(reply) => {
                let _ = reply.send(last_commits(pool).await);
            }
        }
        Ok(())
    }
}

const REPOSITORY_COLUMNS: &str = "id, owner, name, default_branch, topics, stars, discovered_at, \
     last_commit_sha, last_commit_at, last_synced_at";

async fn register(pool: &SqlitePool, repo: NewRepository) -> Result<Registration, VaultError> {
    let topics = merge_topics("", &repo.topics);
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO repositories (owner, name, default_branch, topics, stars, discovered_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(owner, name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&repo.owner)
    .bind(&repo.name)
    .bind(&repo.default_branch)
    .bind(topics)
    .bind(repo.stars)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    if let Some(id) = inserted {
        debug!(repository = %format!("{}/{}", repo.owner, repo.name), id, "Registered repository");
        return Ok(Registration { id, created: true });
    }

    let id: i64 = sqlx::query_scalar("SELECT id FROM repositories WHERE owner = ? AND name = ?")
        .bind(&repo.owner)
        .bind(&repo.name)
        .fetch_one(pool)
        .await?;
    Ok(Registration { id, created: false })
}

async fn find_repository_by_id(
    pool: &SqlitePool,
    id: RepositoryId,
) -> Result<Option<DbRepository>, VaultError> {
    let row = sqlx::query_as::<_, DbRepository>(&format!(
        "SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn find_repository(
    pool: &SqlitePool,
    owner: &str,
    name: &str,
) -> Result<Option<DbRepository>, VaultError> {
    let row = sqlx::query_as::<_, DbRepository>(&format!(
        "SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE owner = ? AND name = ?"
    ))
    .bind(owner)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn list_repositories(
    pool: &SqlitePool,
    filter: &RepositoryFilter,
) -> Result<Vec<DbRepository>, VaultError> {
    let rows = sqlx::query_as::<_, DbRepository>(&format!(
        "SELECT {REPOSITORY_COLUMNS} FROM repositories \
         WHERE (?1 IS NULL OR owner = ?1) ORDER BY id"
    ))
    .bind(&filter.owner)
    .fetch_all(pool)
    .await?;

    // Topics are a comma list; exact tag matching is simpler in Rust than in SQL.
    let rows = match &filter.topic {
        Some(topic) => rows.into_iter().filter(|r| r.has_topic(topic)).collect(),
        None => rows,
    };
    Ok(rows)
}

async fn apply_merge_topics(
    pool: &SqlitePool,
    id: RepositoryId,
    topics: &[String],
    stars: Option<i64>,
) -> Result<(), VaultError> {
    let current = find_repository_by_id(pool, id)
        .await?
        .ok_or(VaultError::NotFound(format!("repository {id}")))?;
    let merged = merge_topics(&current.topics, topics);

    sqlx::query("UPDATE repositories SET topics = ?, stars = COALESCE(?, stars) WHERE id = ?")
        .bind(merged)
        .bind(stars)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn set_default_branch(
    pool: &SqlitePool,
    id: RepositoryId,
    branch: &str,
) -> Result<(), VaultError> {
    let res = sqlx::query("UPDATE repositories SET default_branch = ? WHERE id = ?")
        .bind(branch)
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(VaultError::NotFound(format!("repository {id}")));
    }
    Ok(())
}

async fn record_commit(pool: &SqlitePool, record: CommitRecord) -> Result<(), VaultError> {
    let now = Utc::now();
    let CommitRecord {
        repository_id,
        expected_watermark,
        commit,
        files,
        blobs,
    } = record;

    let mut tx = pool.begin().await?;

    for blob in &blobs {
        sqlx::query(
            "INSERT INTO blobs (hash, size, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(hash) DO NOTHING",
        )
        .bind(&blob.hash)
        .bind(blob.size)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO commits (
            repository_id, sha, parent_shas, author_name, author_email, committer_name,
            committer_email, message, authored_at, committed_at, files_changed, lines_added,
            lines_removed, collected_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(repository_id, sha) DO NOTHING
        "#,
    )
    .bind(repository_id)
    .bind(&commit.sha)
    .bind(commit.parent_shas.join(" "))
    .bind(&commit.author_name)
    .bind(&commit.author_email)
    .bind(&commit.committer_name)
    .bind(&commit.committer_email)
    .bind(&commit.message)
    .bind(commit.authored_at)
    .bind(commit.committed_at)
    .bind(commit.files_changed)
    .bind(commit.lines_added)
    .bind(commit.lines_removed)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for file in &files {
        sqlx::query(
            r#"
            INSERT INTO commit_files (
                repository_id, sha, file_path, previous_path, file_extension, change_kind,
                lines_added, lines_removed, before_hash, after_hash
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repository_id, sha, file_path) DO NOTHING
            "#,
        )
        .bind(repository_id)
        .bind(&commit.sha)
        .bind(&file.file_path)
        .bind(&file.previous_path)
        .bind(file.file_extension())
        .bind(file.change_kind)
        .bind(file.lines_added)
        .bind(file.lines_removed)
        .bind(&file.before_hash)
        .bind(&file.after_hash)
        .execute(&mut *tx)
        .await?;
    }

    // Compare-and-swap: only the holder of the previous watermark may advance it.
    let advanced = sqlx::query(
        r#"
        UPDATE repositories
        SET last_commit_sha = ?, last_commit_at = ?, last_synced_at = ?
        WHERE id = ? AND last_commit_sha IS ?
        "#,
    )
    .bind(&commit.sha)
    .bind(commit.committed_at)
    .bind(now)
    .bind(repository_id)
    .bind(&expected_watermark)
    .execute(&mut *tx)
    .await?;

    if advanced.rows_affected() == 0 {
        tx.rollback().await?;
        warn!(
            repository_id,
            sha = %commit.sha,
            expected = ?expected_watermark,
            "Watermark moved underneath collector; commit not recorded"
        );
        return Err(VaultError::WatermarkConflict {
            repository_id,
            expected: expected_watermark,
        });
    }

    tx.commit().await?;
    Ok(())
}

async fn get_commit(
    pool: &SqlitePool,
    repository_id: RepositoryId,
    sha: &str,
) -> Result<Option<DbCommit>, VaultError> {
    let row = sqlx::query_as::<_, DbCommit>(
        r#"
        SELECT repository_id, sha, parent_shas, author_name, author_email, committer_name,
               committer_email, message, authored_at, committed_at, files_changed, lines_added,
               lines_removed, collected_at
        FROM commits
        WHERE repository_id = ? AND sha = ?
        "#,
    )
    .bind(repository_id)
    .bind(sha)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn list_commits(
    pool: &SqlitePool,
    repository_id: RepositoryId,
) -> Result<Vec<DbCommit>, VaultError> {
    let rows = sqlx::query_as::<_, DbCommit>(
        r#"
        SELECT repository_id, sha, parent_shas, author_name, author_email, committer_name,
               committer_email, message, authored_at, committed_at, files_changed, lines_added,
               lines_removed, collected_at
        FROM commits
        WHERE repository_id = ?
        ORDER BY collected_at, rowid
        "#,
    )
    .bind(repository_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn recorded_shas(
    pool: &SqlitePool,
    repository_id: RepositoryId,
    shas: &[String],
) -> Result<Vec<String>, VaultError> {
    if shas.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_scalar::<_, String>(
        r#"
        SELECT sha FROM commits
        WHERE repository_id = ? AND sha IN (SELECT value FROM json_each(?))
        "#,
    )
    .bind(repository_id)
    .bind(serde_json::to_string(shas)?)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn list_commit_files(
    pool: &SqlitePool,
    repository_id: RepositoryId,
    sha: &str,
) -> Result<Vec<DbCommitFile>, VaultError> {
    let rows = sqlx::query_as::<_, DbCommitFile>(
        r#"
        SELECT repository_id, sha, file_path, previous_path, file_extension, change_kind,
               lines_added, lines_removed, before_hash, after_hash
        FROM commit_files
        WHERE repository_id = ? AND sha = ?
        ORDER BY file_path
        "#,
    )
    .bind(repository_id)
    .bind(sha)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn referenced_hashes(
    pool: &SqlitePool,
    repository_id: RepositoryId,
) -> Result<Vec<String>, VaultError> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT before_hash AS hash FROM commit_files
        WHERE repository_id = ?1 AND before_hash IS NOT NULL
        UNION
        SELECT after_hash AS hash FROM commit_files
        WHERE repository_id = ?1 AND after_hash IS NOT NULL
        ORDER BY hash
        "#,
    )
    .bind(repository_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn list_blobs(pool: &SqlitePool) -> Result<Vec<DbBlob>, VaultError> {
    let rows = sqlx::query_as::<_, DbBlob>("SELECT hash, size, created_at FROM blobs ORDER BY hash")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

async fn last_commits(pool: &SqlitePool) -> Result<Vec<DbLastCommit>, VaultError> {
    let rows = sqlx::query_as::<_, DbLastCommit>(
        r#"
        SELECT repository_id, owner, name, sha, committed_at, watermark_sha, last_synced_at
        FROM last_commits
        ORDER BY repository_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Spawn the catalog actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> CatalogHandle {
    let (actor, _jh) = ractor::Actor::spawn(None, CatalogActor, database_url.to_string())
        .await
        .expect("failed to spawn CatalogActor");

    CatalogHandle { actor }
}

/// Runs the whole DDL script as one batch; SQLite parses comments and statement ends itself.
async fn apply_schema(pool: &SqlitePool) -> Result<(), VaultError> {
    sqlx::raw_sql(SQLITE_INIT).execute(pool).await?;
    Ok(())
}
