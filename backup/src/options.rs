//! Run configuration: mode, flags, per-queue thread counts, and the two
//! validated root paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, Side};
use crate::error::{EngineError, Result};

/// What to do about the differences found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Report differences, change nothing.
    Compare,
    /// Replace missing/modified destination entries from the source.
    Copy,
    /// Delete destination entries the source does not have.
    Cull,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Compare => "Compare",
            Mode::Copy => "Copy",
            Mode::Cull => "Cull",
        }
    }

    /// Present-progressive form for the startup banner.
    pub fn gerund(self) -> &'static str {
        match self {
            Mode::Compare => "Comparing",
            Mode::Copy => "Copying",
            Mode::Cull => "Culling",
        }
    }
}

/// Worker counts per queue, derived from the detected hardware concurrency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCounts {
    pub total_detected: usize,
    pub dir_compare: usize,
    pub file_compare: usize,
    pub copy: usize,
    pub remove: usize,
}

impl ThreadCounts {
    /// The split that kept a variety of machines busy without grinding them
    /// to a halt: a quarter of the cores (plus one) walking directories and
    /// half (plus one) reading file contents.
    pub fn derive(mode: Mode, background: bool, skip_file_read: bool, detected: usize) -> Self {
        let total = detected.clamp(1, 64);

        let mut dir_compare = if total < 4 { 1 } else { total / 4 } + 1;
        let mut file_compare = if total < 2 { 1 } else { total / 2 } + 1;

        if background {
            dir_compare = (dir_compare / 2).max(1);
            file_compare = (file_compare / 2).max(1);
        }

        let copy = if mode == Mode::Copy { file_compare } else { 0 };
        let remove = if mode == Mode::Cull { file_compare } else { 0 };

        // with contents unchecked the directory walkers are the bottleneck
        if skip_file_read {
            dir_compare += file_compare / 2;
        }

        Self {
            total_detected: detected,
            dir_compare,
            file_compare,
            copy,
            remove,
        }
    }
}

/// Validated run configuration. Built by the CLI (or a test), consumed by
/// the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub mode: Mode,
    pub dry_run: bool,
    pub background: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub skip_file_read: bool,
    pub ignore_access: bool,
    pub ignore_extra: bool,
    pub ignore_unknown: bool,
    pub ignore_warnings: bool,
    pub show_relative: bool,
    pub color: bool,
    /// Where the logfile goes; `None` keeps the run console-only.
    pub log_dir: Option<PathBuf>,
    /// All zeros means "derive from the hardware at pipeline construction".
    pub thread_counts: ThreadCounts,
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
}

impl Options {
    /// Normalizes and validates the two root paths; everything else starts
    /// at its default and is set field-by-field.
    pub fn new(mode: Mode, source: &str, destination: &str) -> Result<Self> {
        Ok(Self {
            mode,
            dry_run: false,
            background: false,
            verbose: false,
            quiet: false,
            skip_file_read: false,
            ignore_access: false,
            ignore_extra: false,
            ignore_unknown: false,
            ignore_warnings: false,
            show_relative: false,
            color: cfg!(not(windows)),
            log_dir: None,
            thread_counts: ThreadCounts::default(),
            source_root: normalize_root(Side::Source, source)?,
            destination_root: normalize_root(Side::Destination, destination)?,
        })
    }

    /// Resolve flag combinations that cannot both hold, returning a warning
    /// per dropped flag.
    pub fn reconcile(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.mode == Mode::Cull && self.ignore_extra {
            self.ignore_extra = false;
            warnings.push("Warning:  The --ignore-extra option disabled by the --cull option.".to_string());
        }

        if self.quiet && self.verbose {
            self.quiet = false;
            warnings.push("Warning:  The --quiet option disabled by the --verbose option.".to_string());
        }

        warnings
    }

    pub fn root(&self, side: Side) -> &Path {
        match side {
            Side::Source => &self.source_root,
            Side::Destination => &self.destination_root,
        }
    }

    pub fn root_entry(&self, side: Side) -> Entry {
        Entry::new(side, false, self.root(side), 0)
    }

    /// Comma-separated list of non-default flags for the startup banner.
    pub fn flags_summary(&self) -> String {
        let mut flags = Vec::new();
        if self.background {
            flags.push("background".to_string());
        }
        if self.dry_run {
            flags.push("dry_run".to_string());
        }
        if self.skip_file_read {
            flags.push("skip_file_read".to_string());
        }
        if self.verbose {
            flags.push("verbose".to_string());
        }
        if self.quiet {
            flags.push("quiet".to_string());
        }
        if self.show_relative {
            flags.push("show_relative_path".to_string());
        }

        let ignored: Vec<&str> = [
            (self.ignore_access, "access"),
            (self.ignore_extra, "extras"),
            (self.ignore_unknown, "unknowns"),
            (self.ignore_warnings, "warnings"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();
        if !ignored.is_empty() {
            flags.push(format!("ignore_{}", ignored.join("/")));
        }

        if self.color != cfg!(not(windows)) {
            flags.push(if self.color { "color_on" } else { "color_off" }.to_string());
        }

        if self.verbose {
            flags.push(format!(
                "total_detected_threads={}, dir_compare_threads={}, file_compare_threads={}, copy_threads={}, delete_threads={}",
                self.thread_counts.total_detected,
                self.thread_counts.dir_compare,
                self.thread_counts.file_compare,
                self.thread_counts.copy,
                self.thread_counts.remove,
            ));
        }

        flags.join(", ")
    }
}

/// Strip surrounding whitespace and quotes, give bare Windows drive letters
/// their separator back, make the path absolute, and require an existing
/// directory.
pub fn normalize_root(side: Side, raw: &str) -> Result<PathBuf> {
    let mut text = raw
        .trim()
        .trim_matches('"')
        .trim()
        .to_string();

    if text.len() == 2
        && text.as_bytes()[0].is_ascii_alphabetic()
        && text.as_bytes()[1] == b':'
    {
        text.push(std::path::MAIN_SEPARATOR);
    }

    if text.is_empty() {
        return Err(EngineError::invalid_path(side, raw, "path is empty"));
    }

    let absolute = std::path::absolute(Path::new(&text))
        .map_err(|error| EngineError::invalid_path(side, &text, error.to_string()))?;

    let metadata = std::fs::symlink_metadata(&absolute).map_err(|error| {
        EngineError::invalid_path(side, &absolute, format!("path does not exist: {error}"))
    })?;

    if !metadata.is_dir() {
        return Err(EngineError::invalid_path(
            side,
            &absolute,
            "path is not a directory",
        ));
    }

    Ok(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn thread_counts_follow_the_quarter_half_split() {
        let counts = ThreadCounts::derive(Mode::Compare, false, false, 16);
        assert_eq!(counts.dir_compare, 5);
        assert_eq!(counts.file_compare, 9);
        assert_eq!(counts.copy, 0);
        assert_eq!(counts.remove, 0);
    }

    #[test]
    fn copy_and_cull_get_mutation_workers() {
        let copy = ThreadCounts::derive(Mode::Copy, false, false, 8);
        assert_eq!(copy.copy, copy.file_compare);
        assert_eq!(copy.remove, 0);

        let cull = ThreadCounts::derive(Mode::Cull, false, false, 8);
        assert_eq!(cull.remove, cull.file_compare);
        assert_eq!(cull.copy, 0);
    }

    #[test]
    fn background_halves_worker_counts() {
        let normal = ThreadCounts::derive(Mode::Compare, false, false, 16);
        let background = ThreadCounts::derive(Mode::Compare, true, false, 16);
        assert_eq!(background.dir_compare, (normal.dir_compare / 2).max(1));
        assert_eq!(background.file_compare, (normal.file_compare / 2).max(1));

        let tiny = ThreadCounts::derive(Mode::Compare, true, false, 1);
        assert_eq!(tiny.dir_compare, 1);
        assert_eq!(tiny.file_compare, 1);
    }

    #[test]
    fn skip_file_read_moves_workers_to_traversal() {
        let normal = ThreadCounts::derive(Mode::Compare, false, false, 16);
        let skipping = ThreadCounts::derive(Mode::Compare, false, true, 16);
        assert_eq!(
            skipping.dir_compare,
            normal.dir_compare + normal.file_compare / 2
        );
    }

    #[test]
    fn detected_concurrency_is_clamped() {
        let counts = ThreadCounts::derive(Mode::Compare, false, false, 1_000);
        assert_eq!(counts.dir_compare, 64 / 4 + 1);
        assert_eq!(counts.file_compare, 64 / 2 + 1);

        let one = ThreadCounts::derive(Mode::Compare, false, false, 0);
        assert_eq!(one.dir_compare, 2);
        assert_eq!(one.file_compare, 2);
    }

    #[test]
    fn normalize_strips_quotes_and_whitespace() {
        let dir = TempDir::new().unwrap();
        let quoted = format!("  \"{}\"  ", dir.path().display());
        let normalized = normalize_root(Side::Source, &quoted).unwrap();
        assert_eq!(normalized, std::path::absolute(dir.path()).unwrap());
    }

    #[test]
    fn normalize_rejects_missing_and_nondirectory_paths() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("nope");
        assert!(normalize_root(Side::Source, missing.to_str().unwrap()).is_err());

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(normalize_root(Side::Destination, file.to_str().unwrap()).is_err());

        assert!(normalize_root(Side::Source, "   ").is_err());
    }

    #[test]
    fn reconcile_resolves_conflicting_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();

        let mut options = Options::new(Mode::Cull, path, path).unwrap();
        options.ignore_extra = true;
        options.quiet = true;
        options.verbose = true;

        let warnings = options.reconcile();
        assert_eq!(warnings.len(), 2);
        assert!(!options.ignore_extra);
        assert!(!options.quiet);
        assert!(options.verbose);
    }

    #[test]
    fn flags_summary_lists_set_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();

        let mut options = Options::new(Mode::Compare, path, path).unwrap();
        assert_eq!(options.flags_summary(), "");

        options.dry_run = true;
        options.ignore_access = true;
        options.ignore_warnings = true;
        let summary = options.flags_summary();
        assert!(summary.contains("dry_run"));
        assert!(summary.contains("ignore_access/warnings"));
    }
}
