use crate::db::ChangeKind;
use commitvault_schema::{CommitFileEntry, FileStatus};

/// Which contents to fetch for one changed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilePlan {
    pub path: String,
    pub previous_path: Option<String>,
    pub kind: ChangeKind,
}

impl FilePlan {
    /// Path to read in the parent tree, if the change has a before side.
    pub fn before_path(&self) -> Option<&str> {
        self.kind
            .has_before()
            .then(|| self.previous_path.as_deref().unwrap_or(&self.path))
    }

    /// Path to read in this commit's tree, if the change has an after side.
    pub fn after_path(&self) -> Option<&str> {
        self.kind.has_after().then_some(self.path.as_str())
    }
}

pub(crate) fn change_kind(status: FileStatus) -> ChangeKind {
    match status {
        FileStatus::Added | FileStatus::Copied => ChangeKind::Added,
        FileStatus::Removed => ChangeKind::Deleted,
        FileStatus::Renamed => ChangeKind::Renamed,
        FileStatus::Modified | FileStatus::Changed | FileStatus::Unchanged | FileStatus::Unknown => {
            ChangeKind::Modified
        }
    }
}

/// Plan the fetches for one file entry. A root commit has no parent tree, so every file it
/// reports is recorded as added and removals are dropped.
pub(crate) fn plan_file(entry: &CommitFileEntry, has_parent: bool) -> Option<FilePlan> {
    let mut kind = change_kind(entry.status);
    let mut previous_path = entry
        .previous_filename
        .clone()
        .filter(|p| p != &entry.filename);

    if kind == ChangeKind::Renamed && previous_path.is_none() {
        kind = ChangeKind::Modified;
    }

    if !has_parent {
        match kind {
            ChangeKind::Deleted => return None,
            ChangeKind::Modified | ChangeKind::Renamed => {
                kind = ChangeKind::Added;
                previous_path = None;
            }
            ChangeKind::Added => {}
        }
    }

    Some(FilePlan {
        path: entry.filename.clone(),
        previous_path,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str, status: FileStatus, previous: Option<&str>) -> CommitFileEntry {
        CommitFileEntry {
            filename: filename.to_string(),
            status,
            additions: 1,
            deletions: 1,
            changes: 2,
            previous_filename: previous.map(str::to_string),
        }
    }

    #[test]
    fn maps_host_statuses() {
        assert_eq!(change_kind(FileStatus::Added), ChangeKind::Added);
        assert_eq!(change_kind(FileStatus::Copied), ChangeKind::Added);
        assert_eq!(change_kind(FileStatus::Removed), ChangeKind::Deleted);
        assert_eq!(change_kind(FileStatus::Renamed), ChangeKind::Renamed);
        assert_eq!(change_kind(FileStatus::Changed), ChangeKind::Modified);
        assert_eq!(change_kind(FileStatus::Unknown), ChangeKind::Modified);
    }

    #[test]
    fn fetch_sides_follow_change_kind() {
        let added = plan_file(&entry("a.txt", FileStatus::Added, None), true).unwrap();
        assert_eq!(added.before_path(), None);
        assert_eq!(added.after_path(), Some("a.txt"));

        let deleted = plan_file(&entry("a.txt", FileStatus::Removed, None), true).unwrap();
        assert_eq!(deleted.before_path(), Some("a.txt"));
        assert_eq!(deleted.after_path(), None);

        let modified = plan_file(&entry("a.txt", FileStatus::Modified, None), true).unwrap();
        assert_eq!(modified.before_path(), Some("a.txt"));
        assert_eq!(modified.after_path(), Some("a.txt"));
    }

    #[test]
    fn renames_read_the_old_path_in_the_parent() {
        let plan = plan_file(
            &entry("src/new.rs", FileStatus::Renamed, Some("src/old.rs")),
            true,
        )
        .unwrap();
        assert_eq!(plan.kind, ChangeKind::Renamed);
        assert_eq!(plan.before_path(), Some("src/old.rs"));
        assert_eq!(plan.after_path(), Some("src/new.rs"));
    }

    #[test]
    fn copies_keep_their_source_but_fetch_no_before() {
        let plan = plan_file(&entry("b.txt", FileStatus::Copied, Some("a.txt")), true).unwrap();
        assert_eq!(plan.kind, ChangeKind::Added);
        assert_eq!(plan.previous_path.as_deref(), Some("a.txt"));
        assert_eq!(plan.before_path(), None);
    }

    #[test]
    fn root_commits_only_add() {
        let plan = plan_file(&entry("a.txt", FileStatus::Modified, None), false).unwrap();
        assert_eq!(plan.kind, ChangeKind::Added);
        assert!(plan_file(&entry("gone.txt", FileStatus::Removed, None), false).is_none());
    }
}
