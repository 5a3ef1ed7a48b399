//! Normalized filesystem entries and the source/destination pairs that flow
//! through every task queue

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which of the two trees an entry belongs to. Every entry, event, and
/// counter is attributed to one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Source => "Source",
            Side::Destination => "Destination",
        }
    }

    /// Two-letter tag used in event lines.
    pub fn short(self) -> &'static str {
        match self {
            Side::Source => "src",
            Side::Destination => "dst",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filesystem item, normalized at enumeration time and immutable after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub side: Side,
    /// False means directory.
    pub is_file: bool,
    /// Absolute path of the item.
    pub path: PathBuf,
    /// Final path component. A root path ("/" or "C:\") has no final
    /// component, so the root itself stands in.
    pub name: String,
    /// Suffix of `name` after the final dot, empty when there is none.
    pub extension: String,
    /// Size in bytes; meaningful only for files, zero for directories.
    pub size: u64,
}

impl Entry {
    pub fn new(side: Side, is_file: bool, path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();

        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => path.to_string_lossy().into_owned(),
        };

        let extension = match name.rfind('.') {
            Some(dot) if dot > 0 && dot + 1 < name.len() => name[dot + 1..].to_string(),
            _ => String::new(),
        };

        Self {
            side,
            is_file,
            path,
            name,
            extension,
            size,
        }
    }
}

/// The unit of work carried by every queue: for compares both sides are real
/// entries, for a copy `dst` is the target the source prototype should land
/// at, and for a remove only `dst` matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPair {
    pub src: Entry,
    pub dst: Entry,
}

impl EntryPair {
    pub fn new(src: Entry, dst: Entry) -> Self {
        debug_assert_eq!(src.side, Side::Source);
        debug_assert_eq!(dst.side, Side::Destination);
        Self { src, dst }
    }

    pub fn get(&self, side: Side) -> &Entry {
        match side {
            Side::Source => &self.src,
            Side::Destination => &self.dst,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn name_is_final_component() {
        let entry = Entry::new(Side::Source, true, "/a/b/report.txt", 12);
        assert_eq!(entry.name, "report.txt");
        assert_eq!(entry.extension, "txt");
        assert_eq!(entry.size, 12);
    }

    #[test]
    fn root_path_uses_itself_as_name() {
        let entry = Entry::new(Side::Destination, false, "/", 0);
        assert_eq!(entry.name, "/");
        assert_eq!(entry.extension, "");
    }

    #[test]
    fn extension_edge_cases() {
        let dotfile = Entry::new(Side::Source, true, "/home/.bashrc", 1);
        assert_eq!(dotfile.extension, "");

        let trailing_dot = Entry::new(Side::Source, true, "/home/weird.", 1);
        assert_eq!(trailing_dot.extension, "");

        let doubled = Entry::new(Side::Source, true, "/home/archive.tar.gz", 1);
        assert_eq!(doubled.extension, "gz");

        let plain = Entry::new(Side::Source, true, "/home/readme", 1);
        assert_eq!(plain.extension, "");
    }

    #[test]
    fn pair_lookup_by_side() {
        let src = Entry::new(Side::Source, false, "/src", 0);
        let dst = Entry::new(Side::Destination, false, "/dst", 0);
        let pair = EntryPair::new(src, dst);
        assert_eq!(pair.get(Side::Source).path, Path::new("/src"));
        assert_eq!(pair.get(Side::Destination).path, Path::new("/dst"));
    }
}
