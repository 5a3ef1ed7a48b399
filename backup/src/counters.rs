//! Thread-safe tallies keyed by file extension and by event kind.
//!
//! A flat [`Counter`] aggregates `{name, number, count, bytes}` rows either
//! by string key (file extensions) or by enum ordinal (error and mismatch
//! kinds). A [`TreeCounter`] composes two of them with scalar file,
//! directory, byte, and access-error totals behind one mutex.

use std::sync::{Mutex, PoisonError};

use crate::entry::Entry;
use crate::events::CountKind;
use crate::output::Tint;
use crate::util::{format_count, format_size, percent_string};

/// One tally row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counted {
    pub name: String,
    pub number: usize,
    pub count: usize,
    pub bytes: u64,
}

/// A flat tally of rows, summarizable as justified text columns.
#[derive(Debug, Default)]
pub struct Counter {
    counteds: Vec<Counted>,
}

impl Counter {
    pub fn total_count(&self) -> usize {
        self.counteds.iter().map(|counted| counted.count).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.counteds.iter().map(|counted| counted.bytes).sum()
    }

    pub fn increment_by_name(&mut self, name: &str, bytes: u64) {
        match self
            .counteds
            .iter_mut()
            .find(|counted| counted.name == name)
        {
            Some(counted) => {
                counted.count += 1;
                counted.bytes += bytes;
            }
            None => self.counteds.push(Counted {
                name: name.to_string(),
                number: 0,
                count: 1,
                bytes,
            }),
        }
    }

    /// Ordinal-indexed increment, so repeated kinds never re-scan rows.
    pub fn increment_by_kind<K: CountKind>(&mut self, kind: K, bytes: u64) {
        let number = kind.index();
        if number >= self.counteds.len() {
            self.counteds.resize(20 + number * 2, Counted::default());
        }

        let counted = &mut self.counteds[number];
        if counted.name.is_empty() {
            counted.name = kind.label().to_string();
        }
        counted.number = number;
        counted.count += 1;
        counted.bytes += bytes;
    }

    /// Sorted, column-justified summary rows. `limit` of zero means
    /// unlimited; beyond the limit rows collapse into an `(unlisted)` tail.
    pub fn summary_lines(&mut self, limit: usize) -> Vec<String> {
        self.counteds.retain(|counted| {
            !(counted.name.is_empty()
                && counted.number == 0
                && counted.count == 0
                && counted.bytes == 0)
        });

        if self.counteds.is_empty() {
            return Vec::new();
        }

        self.counteds.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.bytes.cmp(&a.bytes))
                .then(b.name.cmp(&a.name))
                .then(b.number.cmp(&a.number))
        });

        let mut rows = self.build_rows(limit);
        justify_rows(&mut rows);

        rows.into_iter()
            .map(|row| {
                let mut line = format!("   {} -  {}x {}", row.name, row.count, row.count_percent);
                if !row.size.is_empty() {
                    line.push_str(&format!("  - {}", row.size));
                    if !row.size_percent.is_empty() {
                        line.push_str(&format!(" {}", row.size_percent));
                    }
                }
                line
            })
            .collect()
    }

    fn build_rows(&self, limit: usize) -> Vec<Row> {
        let total_count = self.total_count();
        let total_bytes = self.total_bytes();

        let listed = if limit == 0 {
            self.counteds.len()
        } else {
            limit.min(self.counteds.len())
        };

        let mut rows: Vec<Row> = self.counteds[..listed]
            .iter()
            .map(|counted| Row::new(counted, total_count, total_bytes))
            .collect();

        if listed < self.counteds.len() {
            let tail = self.counteds[listed..].iter().fold(
                Counted {
                    name: "(unlisted)".to_string(),
                    ..Counted::default()
                },
                |mut tail, counted| {
                    tail.count += counted.count;
                    tail.bytes += counted.bytes;
                    tail
                },
            );
            rows.push(Row::new(&tail, total_count, total_bytes));
        }

        rows
    }
}

struct Row {
    name: String,
    count: String,
    count_percent: String,
    size: String,
    size_percent: String,
}

impl Row {
    fn new(counted: &Counted, total_count: usize, total_bytes: u64) -> Self {
        Self {
            name: counted.name.clone(),
            count: format_count(counted.count as u64),
            count_percent: percent_string(counted.count as u64, total_count as u64),
            size: if counted.bytes == 0 {
                String::new()
            } else {
                format_size(counted.bytes)
            },
            size_percent: if counted.bytes == total_bytes {
                String::new()
            } else {
                percent_string(counted.bytes, total_bytes)
            },
        }
    }
}

fn justify_rows(rows: &mut [Row]) {
    let name_width = rows.iter().map(|row| row.name.len()).max().unwrap_or(0);
    let count_width = rows.iter().map(|row| row.count.len()).max().unwrap_or(0);
    let size_width = rows.iter().map(|row| row.size.len()).max().unwrap_or(0);

    for row in rows {
        pad_right(&mut row.name, name_width);
        pad_left(&mut row.count, count_width);
        pad_left(&mut row.count_percent, 4);
        pad_left(&mut row.size, size_width);
        pad_left(&mut row.size_percent, 4);
    }
}

fn pad_right(text: &mut String, width: usize) {
    while text.len() < width {
        text.push(' ');
    }
}

fn pad_left(text: &mut String, width: usize) {
    if text.is_empty() {
        return;
    }
    while text.len() < width {
        text.insert(0, ' ');
    }
}

#[derive(Debug, Default)]
struct TreeCounterState {
    files: usize,
    directories: usize,
    bytes: u64,
    access_errors: usize,
    extensions: Counter,
    kinds: Counter,
}

/// Per-tree (or per-category) tallies: extension counts for files plus an
/// enum-keyed counter for errors or mismatch kinds.
pub struct TreeCounter {
    file_title: String,
    file_tint: Tint,
    kind_title: String,
    kind_tint: Tint,
    state: Mutex<TreeCounterState>,
}

impl TreeCounter {
    pub fn new(file_title: &str, file_tint: Tint, kind_title: &str, kind_tint: Tint) -> Self {
        Self {
            file_title: file_title.to_string(),
            file_tint,
            kind_title: kind_title.to_string(),
            kind_tint,
            state: Mutex::new(TreeCounterState::default()),
        }
    }

    pub fn file_tint(&self) -> Tint {
        self.file_tint
    }

    pub fn kind_tint(&self) -> Tint {
        self.kind_tint
    }

    /// Tally one enumerated entry: file/dir totals, bytes, and the file's
    /// extension.
    pub fn count_entry(&self, entry: &Entry) {
        let mut state = self.lock();
        state.bytes += entry.size;

        if entry.is_file {
            state.files += 1;
            let key = if entry.extension.is_empty() {
                "\"\""
            } else {
                entry.extension.as_str()
            };
            state.extensions.increment_by_name(key, entry.size);
        } else {
            state.directories += 1;
        }
    }

    /// Tally one event kind, optionally folding it into the access bucket.
    pub fn count_kind<K: CountKind>(&self, kind: K, bytes: u64, is_access: bool) {
        let mut state = self.lock();
        state.bytes += bytes;
        if is_access {
            state.access_errors += 1;
        }
        state.kinds.increment_by_kind(kind, bytes);
    }

    /// Tally a kind and its entry together, adding the entry's bytes once.
    pub fn count_kind_with_entry<K: CountKind>(&self, entry: &Entry, kind: K, is_access: bool) {
        let mut state = self.lock();
        state.bytes += entry.size;
        if is_access {
            state.access_errors += 1;
        }
        state.kinds.increment_by_kind(kind, entry.size);

        if entry.is_file {
            state.files += 1;
            let key = if entry.extension.is_empty() {
                "\"\""
            } else {
                entry.extension.as_str()
            };
            state.extensions.increment_by_name(key, entry.size);
        } else {
            state.directories += 1;
        }
    }

    pub fn has_entries(&self) -> bool {
        let state = self.lock();
        state.files + state.directories > 0
    }

    pub fn has_kinds(&self) -> bool {
        self.lock().kinds.total_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.files + state.directories == 0 && state.kinds.total_count() == 0
    }

    /// (file-table rows, kind-table rows) ready for printing.
    pub fn summary(&self) -> (Vec<String>, Vec<String>) {
        let mut state = self.lock();

        let mut file_lines = Vec::new();
        if state.files + state.directories > 0 {
            file_lines.push(format!(
                "{} x{}",
                self.file_title,
                format_count((state.files + state.directories) as u64)
            ));
            file_lines.push(format!(
                " {:<10}Directories",
                format_count(state.directories as u64)
            ));
            file_lines.push(format!(
                " {:<10}Files  {} ({}bytes)",
                format_count(state.files as u64),
                format_size(state.bytes),
                format_count(state.bytes)
            ));
            file_lines.extend(state.extensions.summary_lines(0));
        }

        let mut kind_lines = Vec::new();
        let kind_rows = state.kinds.summary_lines(0);
        if !kind_rows.is_empty() {
            kind_lines.push(format!(
                "{} x{}",
                self.kind_title,
                format_count(kind_rows.len() as u64)
            ));
            kind_lines.extend(kind_rows);
            if state.access_errors > 0 {
                kind_lines.push(format!(
                    "   (Access x{})",
                    format_count(state.access_errors as u64)
                ));
            }
        }

        (file_lines, kind_lines)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreeCounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Side;
    use crate::events::{ErrorKind, MismatchKind};

    #[test]
    fn name_increments_aggregate() {
        let mut counter = Counter::default();
        counter.increment_by_name("txt", 10);
        counter.increment_by_name("txt", 5);
        counter.increment_by_name("log", 1);

        assert_eq!(counter.total_count(), 3);
        assert_eq!(counter.total_bytes(), 16);
    }

    #[test]
    fn kind_increments_keep_ordinal_rows() {
        let mut counter = Counter::default();
        counter.increment_by_kind(ErrorKind::Read, 4);
        counter.increment_by_kind(ErrorKind::Read, 4);
        counter.increment_by_kind(ErrorKind::Copy, 0);

        assert_eq!(counter.total_count(), 3);
        let lines = counter.summary_lines(0);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Read"));
        assert!(lines[1].contains("Copy"));
    }

    #[test]
    fn summary_sorts_by_count_then_bytes() {
        let mut counter = Counter::default();
        counter.increment_by_name("rare", 1_000_000);
        for _ in 0..3 {
            counter.increment_by_name("common", 1);
        }
        for _ in 0..3 {
            counter.increment_by_name("heavy", 500);
        }

        let lines = counter.summary_lines(0);
        assert!(lines[0].contains("heavy"));
        assert!(lines[1].contains("common"));
        assert!(lines[2].contains("rare"));
    }

    #[test]
    fn summary_limit_collapses_tail() {
        let mut counter = Counter::default();
        for name in ["a", "b", "c", "d"] {
            counter.increment_by_name(name, 1);
        }

        let lines = counter.summary_lines(2);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("(unlisted)"));
        assert!(lines[2].contains("2x"));
    }

    #[test]
    fn rows_share_column_widths() {
        let mut counter = Counter::default();
        counter.increment_by_name("a-very-long-extension", 100);
        counter.increment_by_name("go", 1);

        let lines = counter.summary_lines(0);
        let dash_columns: Vec<usize> = lines.iter().map(|line| line.find(" - ").unwrap()).collect();
        assert_eq!(dash_columns[0], dash_columns[1]);
    }

    #[test]
    fn tree_counter_tracks_files_dirs_and_bytes() {
        let tree = TreeCounter::new("Source Tree", Tint::Default, "Errors", Tint::Red);
        tree.count_entry(&Entry::new(Side::Source, true, "/a/x.txt", 10));
        tree.count_entry(&Entry::new(Side::Source, true, "/a/y.txt", 20));
        tree.count_entry(&Entry::new(Side::Source, false, "/a/sub", 0));

        assert!(tree.has_entries());
        assert!(!tree.has_kinds());
        assert!(!tree.is_empty());

        let (file_lines, kind_lines) = tree.summary();
        assert!(file_lines[0].contains("Source Tree x3"));
        assert!(file_lines.iter().any(|line| line.contains("txt")));
        assert!(kind_lines.is_empty());
    }

    #[test]
    fn tree_counter_reports_access_bucket() {
        let tree = TreeCounter::new("Destination Tree", Tint::Default, "Errors", Tint::Red);
        tree.count_kind(ErrorKind::Open, 0, true);
        tree.count_kind(ErrorKind::Remove, 0, false);

        let (_, kind_lines) = tree.summary();
        assert!(kind_lines[0].contains("Errors x2"));
        assert!(kind_lines.last().unwrap().contains("(Access x1)"));
    }

    #[test]
    fn mismatch_counting_records_entry_once() {
        let tree = TreeCounter::new("Mismatches", Tint::Yellow, "Categories", Tint::Yellow);
        let entry = Entry::new(Side::Destination, true, "/dst/a.bin", 100);
        tree.count_kind_with_entry(&entry, MismatchKind::Size, false);

        let (file_lines, kind_lines) = tree.summary();
        assert!(file_lines[0].contains("Mismatches x1"));
        assert!(file_lines.iter().any(|line| line.contains("100bytes")));
        assert!(kind_lines.iter().any(|line| line.contains("Size")));
    }
}
