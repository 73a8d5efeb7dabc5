pub mod github;

pub use github::{
    CommitDetail, CommitEntry, CommitFileEntry, CommitMeta, CommitStats, FileStatus, GitSignature,
    GithubErrorBody, ParentRef, RepositoryInfo, RepositoryOwner, RepositorySearchResults,
};
