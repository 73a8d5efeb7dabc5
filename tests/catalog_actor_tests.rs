mod common;

use chrono::{DateTime, Utc};
use commitvault::db::{
    self, BlobRecord, ChangeKind, CommitRecord, NewCommit, NewCommitFile, NewRepository,
    RepositoryFilter,
};
use commitvault::error::VaultError;
use common::{remove_database, temp_database};

fn new_repository(owner: &str, name: &str, topics: &[&str]) -> NewRepository {
    NewRepository {
        owner: owner.to_string(),
        name: name.to_string(),
        topics: topics.iter().map(|t| (*t).to_string()).collect(),
        default_branch: None,
        stars: None,
    }
}

fn commit(sha: &str, parent: Option<&str>, committed_at: DateTime<Utc>) -> NewCommit {
    NewCommit {
        sha: sha.to_string(),
        parent_shas: parent.map(str::to_string).into_iter().collect(),
        author_name: Some("Mona".to_string()),
        author_email: None,
        committer_name: None,
        committer_email: None,
        message: format!("commit {sha}"),
        authored_at: Some(committed_at),
        committed_at: Some(committed_at),
        files_changed: 1,
        lines_added: 1,
        lines_removed: 0,
    }
}

fn added_file(path: &str, hash: &str) -> NewCommitFile {
    NewCommitFile {
        file_path: path.to_string(),
        previous_path: None,
        change_kind: ChangeKind::Added,
        lines_added: 1,
        lines_removed: 0,
        before_hash: None,
        after_hash: Some(hash.to_string()),
    }
}

fn record(
    repository_id: i64,
    expected: Option<&str>,
    commit: NewCommit,
    files: Vec<NewCommitFile>,
    blobs: Vec<BlobRecord>,
) -> CommitRecord {
    CommitRecord {
        repository_id,
        expected_watermark: expected.map(str::to_string),
        commit,
        files,
        blobs,
    }
}

fn blob(hash: &str, size: i64) -> BlobRecord {
    BlobRecord {
        hash: hash.to_string(),
        size,
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_714_557_600 + secs, 0).unwrap()
}

#[tokio::test]
async fn register_is_idempotent_per_owner_and_name() {
    let (url, path) = temp_database("catalog-register");
    let catalog = db::spawn(&url).await;

    let first = catalog
        .register(new_repository("acme", "widgets", &["rust"]))
        .await
        .expect("first register");
    assert!(first.created);

    let again = catalog
        .register(new_repository("acme", "widgets", &["ml"]))
        .await
        .expect("second register");
    assert!(!again.created);
    assert_eq!(again.id, first.id);

    let repo = catalog.get_repository(first.id).await.expect("get");
    assert_eq!(repo.full_name(), "acme/widgets");
    assert_eq!(repo.topic_list(), vec!["rust".to_string()]);
    assert!(repo.last_commit_sha.is_none());

    let found = catalog
        .find_repository("acme", "widgets")
        .await
        .expect("find")
        .expect("present");
    assert_eq!(found.id, first.id);
    assert!(
        catalog
            .find_repository("acme", "gadgets")
            .await
            .expect("find")
            .is_none()
    );

    assert!(matches!(
        catalog.get_repository(first.id + 100).await,
        Err(VaultError::NotFound(_))
    ));

    remove_database(&path);
}

#[tokio::test]
async fn merge_topics_and_filters() {
    let (url, path) = temp_database("catalog-topics");
    let catalog = db::spawn(&url).await;

    let a = catalog
        .register(new_repository("acme", "widgets", &["rust"]))
        .await
        .unwrap()
        .id;
    let b = catalog
        .register(new_repository("other", "gizmo", &["ML"]))
        .await
        .unwrap()
        .id;

    catalog
        .merge_topics(a, vec!["ml".to_string(), "rust".to_string()], Some(42))
        .await
        .expect("merge");
    let repo = catalog.get_repository(a).await.unwrap();
    assert_eq!(repo.topics, "ml,rust");
    assert_eq!(repo.stars, Some(42));

    // Stars are left alone when not supplied.
    catalog.merge_topics(a, Vec::new(), None).await.unwrap();
    assert_eq!(catalog.get_repository(a).await.unwrap().stars, Some(42));

    let ml: Vec<i64> = catalog
        .list_repositories(RepositoryFilter::topic("ml"))
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ml, vec![a, b]);

    let by_owner = catalog
        .list_repositories(RepositoryFilter {
            topic: None,
            owner: Some("other".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(by_owner.len(), 1);
    assert_eq!(by_owner[0].id, b);

    assert_eq!(
        catalog
            .list_repositories(RepositoryFilter::default())
            .await
            .unwrap()
            .len(),
        2
    );

    catalog
        .set_default_branch(b, "trunk".to_string())
        .await
        .unwrap();
    assert_eq!(
        catalog.get_repository(b).await.unwrap().default_branch.as_deref(),
        Some("trunk")
    );
    assert!(matches!(
        catalog.set_default_branch(999, "main".to_string()).await,
        Err(VaultError::NotFound(_))
    ));

    remove_database(&path);
}

#[tokio::test]
async fn record_commit_advances_watermark_atomically() {
    let (url, path) = temp_database("catalog-record");
    let catalog = db::spawn(&url).await;
    let id = catalog
        .register(new_repository("acme", "widgets", &[]))
        .await
        .unwrap()
        .id;

    catalog
        .record_commit(record(
            id,
            None,
            commit("c1", None, at(0)),
            vec![added_file("a.txt", "h1")],
            vec![blob("h1", 5)],
        ))
        .await
        .expect("first commit");

    let repo = catalog.get_repository(id).await.unwrap();
    assert_eq!(repo.last_commit_sha.as_deref(), Some("c1"));
    assert_eq!(repo.last_commit_at, Some(at(0)));
    assert!(repo.last_synced_at.is_some());

    // A writer holding a stale watermark loses, and nothing of its commit is kept.
    let stale = catalog
        .record_commit(record(
            id,
            None,
            commit("c2", Some("c1"), at(60)),
            vec![added_file("b.txt", "h2")],
            vec![blob("h2", 3)],
        ))
        .await;
    assert!(matches!(
        stale,
        Err(VaultError::WatermarkConflict { expected: None, .. })
    ));
    assert!(catalog.get_commit(id, "c2").await.unwrap().is_none());
    assert!(catalog.list_commit_files(id, "c2").await.unwrap().is_empty());
    assert_eq!(catalog.list_blobs().await.unwrap().len(), 1);
    assert_eq!(
        catalog
            .get_repository(id)
            .await
            .unwrap()
            .last_commit_sha
            .as_deref(),
        Some("c1")
    );

    catalog
        .record_commit(record(
            id,
            Some("c1"),
            commit("c2", Some("c1"), at(60)),
            vec![added_file("b.txt", "h2"), added_file("c.txt", "h1")],
            vec![blob("h2", 3), blob("h1", 5)],
        ))
        .await
        .expect("second commit");

    let commits = catalog.list_commits(id).await.unwrap();
    assert_eq!(
        commits.iter().map(|c| c.sha.as_str()).collect::<Vec<_>>(),
        vec!["c1", "c2"]
    );
    assert_eq!(commits[1].parents(), vec!["c1"]);

    let files = catalog.list_commit_files(id, "c2").await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].file_path, "b.txt");
    assert_eq!(files[0].file_extension, "txt");
    assert_eq!(files[0].change_kind, ChangeKind::Added);

    let mut hashes = catalog.referenced_hashes(id).await.unwrap();
    hashes.sort();
    assert_eq!(hashes, vec!["h1".to_string(), "h2".to_string()]);
    assert_eq!(catalog.list_blobs().await.unwrap().len(), 2);

    remove_database(&path);
}

#[tokio::test]
async fn files_must_reference_recorded_blobs() {
    let (url, path) = temp_database("catalog-fk");
    let catalog = db::spawn(&url).await;
    let id = catalog
        .register(new_repository("acme", "widgets", &[]))
        .await
        .unwrap()
        .id;

    let res = catalog
        .record_commit(record(
            id,
            None,
            commit("c1", None, at(0)),
            vec![added_file("a.txt", "missing")],
            Vec::new(),
        ))
        .await;
    assert!(res.is_err());
    assert!(catalog.get_commit(id, "c1").await.unwrap().is_none());
    assert!(
        catalog
            .get_repository(id)
            .await
            .unwrap()
            .last_commit_sha
            .is_none()
    );

    remove_database(&path);
}

#[tokio::test]
async fn last_commits_reports_newest_per_repository() {
    let (url, path) = temp_database("catalog-last");
    let catalog = db::spawn(&url).await;
    let a = catalog
        .register(new_repository("acme", "widgets", &[]))
        .await
        .unwrap()
        .id;
    let b = catalog
        .register(new_repository("acme", "gadgets", &[]))
        .await
        .unwrap()
        .id;
    catalog
        .register(new_repository("acme", "empty", &[]))
        .await
        .unwrap();

    catalog
        .record_commit(record(a, None, commit("a1", None, at(0)), Vec::new(), Vec::new()))
        .await
        .unwrap();
    catalog
        .record_commit(record(
            a,
            Some("a1"),
            commit("a2", Some("a1"), at(120)),
            Vec::new(),
            Vec::new(),
        ))
        .await
        .unwrap();
    catalog
        .record_commit(record(b, None, commit("b1", None, at(30)), Vec::new(), Vec::new()))
        .await
        .unwrap();

    let mut last = catalog.last_commits().await.unwrap();
    last.sort_by_key(|l| l.repository_id);
    assert_eq!(last.len(), 2);
    assert_eq!(last[0].repository_id, a);
    assert_eq!(last[0].sha, "a2");
    assert_eq!(last[0].watermark_sha.as_deref(), Some("a2"));
    assert_eq!(last[0].committed_at, Some(at(120)));
    assert_eq!(last[1].sha, "b1");

    remove_database(&path);
}

#[tokio::test]
async fn schema_applies_to_fresh_and_existing_databases() {
    let (url, path) = temp_database("catalog-schema");

    let first = db::spawn(&url).await;
    let id = first
        .register(new_repository("acme", "widgets", &[]))
        .await
        .unwrap()
        .id;
    assert!(first.last_commits().await.unwrap().is_empty());

    // Opening the same file again re-runs the DDL against the existing tables.
    let second = db::spawn(&url).await;
    let repo = second.get_repository(id).await.expect("row survives reopen");
    assert_eq!(repo.full_name(), "acme/widgets");

    remove_database(&path);
}

#[tokio::test]
async fn recorded_shas_reports_only_known_commits() {
    let (url, path) = temp_database("catalog-recorded");
    let catalog = db::spawn(&url).await;
    let id = catalog
        .register(new_repository("acme", "widgets", &[]))
        .await
        .unwrap()
        .id;
    let other = catalog
        .register(new_repository("acme", "gadgets", &[]))
        .await
        .unwrap()
        .id;

    catalog
        .record_commit(record(id, None, commit("c1", None, at(0)), Vec::new(), Vec::new()))
        .await
        .unwrap();
    catalog
        .record_commit(record(
            id,
            Some("c1"),
            commit("c2", Some("c1"), at(60)),
            Vec::new(),
            Vec::new(),
        ))
        .await
        .unwrap();

    let mut known = catalog
        .recorded_shas(id, vec!["c2".into(), "c9".into(), "c1".into()])
        .await
        .unwrap();
    known.sort();
    assert_eq!(known, vec!["c1".to_string(), "c2".to_string()]);

    assert!(
        catalog
            .recorded_shas(other, vec!["c1".into()])
            .await
            .unwrap()
            .is_empty()
    );
    assert!(catalog.recorded_shas(id, Vec::new()).await.unwrap().is_empty());

    remove_database(&path);
}
