//! Catalog: relational storage for repositories, commits, commit files and blob rows.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `records.rs`: write payloads accepted by the actor
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `actor.rs`: the single actor owning the connection pool

pub mod actor;
pub mod models;
pub mod records;
pub mod schema;

pub use actor::{CatalogHandle, spawn};
pub use models::{
    ChangeKind, DbBlob, DbCommit, DbCommitFile, DbLastCommit, DbRepository, RepositoryId,
};
pub use records::{
    BlobRecord, CommitRecord, NewCommit, NewCommitFile, NewRepository, Registration,
    RepositoryFilter,
};
pub use schema::SQLITE_INIT;
