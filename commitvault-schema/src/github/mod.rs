mod commit;
mod error;
mod repository;

pub use commit::{
    CommitDetail, CommitEntry, CommitFileEntry, CommitMeta, CommitStats, FileStatus, GitSignature,
    ParentRef,
};
pub use error::GithubErrorBody;
pub use repository::{RepositoryInfo, RepositoryOwner, RepositorySearchResults};
