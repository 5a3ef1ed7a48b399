//! The per-entry event taxonomy: error kinds and mismatch kinds.
//!
//! These are reported and tallied, never propagated as `Err`; a task that
//! hits one reports it and returns `false` so siblings keep going.

/// Ordinal and label used for enum-keyed counting.
pub trait CountKind: Copy {
    fn index(self) -> usize;
    fn label(self) -> &'static str;
}

/// Everything that can go wrong while touching one filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Exists,
    Status,
    SymlinkStatus,
    Size,
    UnsupportedType,
    DirIterMake,
    DirIterInc,
    CreateDirectory,
    Open,
    Read,
    Remove,
    Copy,
}

impl ErrorKind {
    /// Kinds that get reclassified into the "Access" bucket when the OS
    /// message indicates a permission denial.
    pub fn is_access_prone(self) -> bool {
        matches!(
            self,
            ErrorKind::Exists
                | ErrorKind::Status
                | ErrorKind::SymlinkStatus
                | ErrorKind::Size
                | ErrorKind::Open
                | ErrorKind::Read
        )
    }
}

impl CountKind for ErrorKind {
    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            ErrorKind::Exists => "Exists",
            ErrorKind::Status => "Status",
            ErrorKind::SymlinkStatus => "SymStatus",
            ErrorKind::Size => "Size",
            ErrorKind::UnsupportedType => "Type",
            ErrorKind::DirIterMake => "DirItrM",
            ErrorKind::DirIterInc => "DirItrI",
            ErrorKind::CreateDirectory => "CreateDir",
            ErrorKind::Open => "Open",
            ErrorKind::Read => "Read",
            ErrorKind::Remove => "Delete",
            ErrorKind::Copy => "Copy",
        }
    }
}

/// A structural or content difference between the two trees. Distinct from
/// errors: mismatches are findings, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    Modified,
    Size,
    Extra,
    Missing,
}

impl CountKind for MismatchKind {
    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            MismatchKind::Modified => "Modified",
            MismatchKind::Size => "Size",
            MismatchKind::Extra => "Extra",
            MismatchKind::Missing => "Missing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_prone_kinds() {
        assert!(ErrorKind::Open.is_access_prone());
        assert!(ErrorKind::Read.is_access_prone());
        assert!(ErrorKind::Status.is_access_prone());
        assert!(!ErrorKind::Copy.is_access_prone());
        assert!(!ErrorKind::Remove.is_access_prone());
        assert!(!ErrorKind::CreateDirectory.is_access_prone());
    }

    #[test]
    fn labels_are_distinct() {
        let labels = [
            ErrorKind::Exists.label(),
            ErrorKind::Status.label(),
            ErrorKind::SymlinkStatus.label(),
            ErrorKind::Size.label(),
            ErrorKind::UnsupportedType.label(),
            ErrorKind::DirIterMake.label(),
            ErrorKind::DirIterInc.label(),
            ErrorKind::CreateDirectory.label(),
            ErrorKind::Open.label(),
            ErrorKind::Read.label(),
            ErrorKind::Remove.label(),
            ErrorKind::Copy.label(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
