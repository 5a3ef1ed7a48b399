//! Pipeline controller: owns the four queues, enforces phase ordering,
//! routes mismatches into follow-up work, aggregates status, and collects
//! worker panics.
//!
//! Phase ordering is the safety invariant everything else leans on: the
//! copy and remove pools only start once every directory comparer has
//! finished, so mutation never races traversal.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::counters::TreeCounter;
use crate::entry::{Entry, EntryPair, Side};
use crate::error::{EngineError, Result};
use crate::events::{CountKind, ErrorKind, MismatchKind};
use crate::failures::FailureCollector;
use crate::options::{Mode, Options, ThreadCounts};
use crate::output::{Output, Tint};
use crate::queue::TaskQueueStatus;
use crate::resources::{CopyResource, DirCompareResource, FileCompareResource, RemoveResource};
use crate::tasker::Tasker;
use crate::util::{format_count, format_size, pretty_duration};
use crate::{copier, dir_compare, file_compare, remover};

/// Base name for the logfile and the startup banner.
const LOG_BASENAME: &str = "backup";
/// Console rows shown per file-extension table; the logfile gets them all.
const CONSOLE_TABLE_ROWS: usize = 9;

const STATUS_PERIOD_START: Duration = Duration::from_secs(5);
const STATUS_PERIOD_STEP: Duration = Duration::from_secs(3);
const STATUS_PERIOD_MAX: Duration = Duration::from_secs(20);

/// Which of the four queues a worker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    DirCompare,
    FileCompare,
    Copy,
    Remove,
}

impl QueueKind {
    pub fn name(self) -> &'static str {
        match self {
            QueueKind::DirCompare => "dir-compare",
            QueueKind::FileCompare => "file-compare",
            QueueKind::Copy => "copy",
            QueueKind::Remove => "remove",
        }
    }
}

/// Final tallies; the caller maps these to an exit code.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub dry_run: bool,
    pub skip_file_read: bool,
    pub errors: bool,
    pub mismatches: bool,
    pub copies: bool,
    pub removes: bool,
    pub aborted: bool,
}

impl RunReport {
    /// Zero-exit-code condition: Compare needs equal trees, Copy and Cull
    /// just need a clean run.
    pub fn is_success(&self) -> bool {
        if self.aborted || self.errors {
            return false;
        }
        match self.mode {
            Mode::Compare => !self.mismatches,
            Mode::Copy | Mode::Cull => true,
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

struct StatusMemory {
    period: Duration,
    dir_completed: usize,
    file_completed: usize,
    copy_completed: usize,
    remove_completed: usize,
}

struct Totals {
    errors: bool,
    mismatches: bool,
    copies: bool,
    removes: bool,
}

pub struct Pipeline {
    options: Options,
    output: Output,
    start_time: Instant,
    abort: AtomicBool,
    failures: FailureCollector,

    dir_tasker: Tasker<DirCompareResource>,
    file_tasker: Tasker<FileCompareResource>,
    copy_tasker: Tasker<CopyResource>,
    remove_tasker: Tasker<RemoveResource>,

    copied: TreeCounter,
    removed: TreeCounter,
    mismatches: TreeCounter,
    src_tree: TreeCounter,
    dst_tree: TreeCounter,

    status_memory: Mutex<StatusMemory>,
}

impl Pipeline {
    /// Builds the queues and the output sink from a validated
    /// configuration and prints the startup banner.
    pub fn new(mut options: Options) -> Arc<Self> {
        let reconcile_warnings = options.reconcile();

        if options.thread_counts == ThreadCounts::default() {
            options.thread_counts = ThreadCounts::derive(
                options.mode,
                options.background,
                options.skip_file_read,
                num_cpus::get(),
            );
        }

        let output = match &options.log_dir {
            Some(dir) => Output::new(LOG_BASENAME, dir, options.color, options.quiet),
            None => Output::console_only(options.color, options.quiet),
        };

        let pipeline = Arc::new(Self {
            dir_tasker: Tasker::new(options.thread_counts.dir_compare),
            file_tasker: Tasker::new(options.thread_counts.file_compare),
            copy_tasker: Tasker::new(options.thread_counts.copy),
            remove_tasker: Tasker::new(options.thread_counts.remove),

            copied: TreeCounter::new("Copied", Tint::Default, "", Tint::Default),
            removed: TreeCounter::new("Deleted", Tint::Default, "", Tint::Default),
            mismatches: TreeCounter::new(
                "Mismatches",
                Tint::Yellow,
                "Mismatch Categories",
                Tint::Yellow,
            ),
            src_tree: TreeCounter::new("Source Tree", Tint::Default, "Errors", Tint::Red),
            dst_tree: TreeCounter::new("Destination Tree", Tint::Default, "Errors", Tint::Red),

            status_memory: Mutex::new(StatusMemory {
                period: STATUS_PERIOD_START,
                dir_completed: 0,
                file_completed: 0,
                copy_completed: 0,
                remove_completed: 0,
            }),

            output,
            start_time: Instant::now(),
            abort: AtomicBool::new(false),
            failures: FailureCollector::new(),
            options,
        });

        pipeline.print_job_summary(&reconcile_warnings);
        pipeline
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn log_path(&self) -> Option<std::path::PathBuf> {
        self.output.log_path()
    }

    /// Drive the whole run: seed the root pair, start the comparison pools,
    /// drain traversal, then (and only then) start mutation, drain it, and
    /// print the final results.
    pub fn run(self: &Arc<Self>) -> Result<RunReport> {
        info!(
            mode = self.options.mode.as_str(),
            source = %self.options.source_root.display(),
            destination = %self.options.destination_root.display(),
            dir_workers = self.options.thread_counts.dir_compare,
            file_workers = self.options.thread_counts.file_compare,
            "starting run"
        );

        self.schedule_dir_compare(EntryPair::new(
            self.options.root_entry(Side::Source),
            self.options.root_entry(Side::Destination),
        ));

        self.start_workers(QueueKind::FileCompare);
        self.start_workers(QueueKind::DirCompare);

        self.wait_for(QueueKind::DirCompare);
        debug!("traversal drained, starting mutation pools");

        self.start_workers(QueueKind::Copy);
        self.start_workers(QueueKind::Remove);

        self.wait_for(QueueKind::FileCompare);
        self.wait_for(QueueKind::Copy);
        self.wait_for(QueueKind::Remove);

        let aborted = match self.failures.summary() {
            Some(summary) => {
                self.output.line(&summary, Tint::Red);
                true
            }
            None => false,
        };

        let report = self.print_final_results(aborted);
        info!(
            aborted,
            errors = report.errors,
            mismatches = report.mismatches,
            copies = report.copies,
            removes = report.removes,
            "run finished"
        );

        if let Some(first) = self.failures.first() {
            return Err(EngineError::WorkerPanic(format!(
                "[{}] {}",
                first.queue, first.message
            )));
        }

        Ok(report)
    }

    // ----- worker management -------------------------------------------

    fn start_workers(self: &Arc<Self>, kind: QueueKind) {
        let count = match kind {
            QueueKind::DirCompare => self.dir_tasker.capacity(),
            QueueKind::FileCompare => self.file_tasker.capacity(),
            QueueKind::Copy => self.copy_tasker.capacity(),
            QueueKind::Remove => self.remove_tasker.capacity(),
        };

        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let pipeline = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", kind.name()))
                .spawn(move || pipeline.worker_main(kind));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    self.failures
                        .record(kind.name(), format!("failed to spawn worker: {error}"));
                    self.flag_abort();
                    break;
                }
            }
        }

        match kind {
            QueueKind::DirCompare => self.dir_tasker.adopt_workers(handles),
            QueueKind::FileCompare => self.file_tasker.adopt_workers(handles),
            QueueKind::Copy => self.copy_tasker.adopt_workers(handles),
            QueueKind::Remove => self.remove_tasker.adopt_workers(handles),
        }
    }

    fn worker_main(&self, kind: QueueKind) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.worker_loop(kind)));
        if let Err(payload) = outcome {
            warn!(queue = kind.name(), "worker thread panicked");
            self.failures.record_panic(kind.name(), payload);
            self.flag_abort();
        }
    }

    fn worker_loop(&self, kind: QueueKind) {
        match kind {
            QueueKind::DirCompare => self.dir_tasker.worker_loop(
                || self.will_abort(),
                |resource, pair| dir_compare::execute(self, resource, pair),
                || self.dir_compare_may_wake(),
                // the root pair always lands here first, so a drained queue
                // with at least one completion means the whole tree is done
                |status| status.completed > 0,
            ),
            QueueKind::FileCompare => self.file_tasker.worker_loop(
                || self.will_abort(),
                |resource, pair| file_compare::execute(self, resource, pair),
                || self.file_compare_may_wake(),
                |_status| self.dir_tasker.is_finished(),
            ),
            QueueKind::Copy => self.copy_tasker.worker_loop(
                || self.will_abort(),
                |resource, pair| copier::execute(self, resource, pair),
                || true,
                |_status| self.dir_tasker.is_finished() && self.file_tasker.is_finished(),
            ),
            QueueKind::Remove => self.remove_tasker.worker_loop(
                || self.will_abort(),
                |resource, pair| remover::execute(self, resource, pair),
                || true,
                |_status| self.dir_tasker.is_finished() && self.file_tasker.is_finished(),
            ),
        }
    }

    /// Traversal stalls while the file-compare queue is visibly overloaded;
    /// this is what bounds memory on huge trees.
    fn dir_compare_may_wake(&self) -> bool {
        let status = self.dir_tasker.status();
        if !status.is_ready() && !status.is_done() {
            return false;
        }

        let file_status = self.file_tasker.status();
        file_status.queued <= file_status.resource_count * 2
    }

    fn file_compare_may_wake(&self) -> bool {
        let status = self.file_tasker.status();
        status.is_ready() || (status.is_done() && self.dir_tasker.is_finished())
    }

    fn wait_for(&self, kind: QueueKind) {
        match kind {
            QueueKind::DirCompare => self
                .dir_tasker
                .wait_until_finished(|| self.print_status_if_due()),
            QueueKind::FileCompare => self
                .file_tasker
                .wait_until_finished(|| self.print_status_if_due()),
            QueueKind::Copy => self
                .copy_tasker
                .wait_until_finished(|| self.print_status_if_due()),
            QueueKind::Remove => self
                .remove_tasker
                .wait_until_finished(|| self.print_status_if_due()),
        }
        // peer queues gate their finish predicates on this pool, so let
        // their waiters re-check right away
        self.notify_all_queues();
    }

    pub fn notify_all_queues(&self) {
        self.dir_tasker.notify_all();
        self.file_tasker.notify_all();
        self.copy_tasker.notify_all();
        self.remove_tasker.notify_all();
    }

    pub fn will_abort(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    fn flag_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
        self.notify_all_queues();
    }

    // ----- scheduling and routing --------------------------------------

    pub(crate) fn schedule_dir_compare(&self, pair: EntryPair) {
        self.dir_tasker.enqueue(pair);
    }

    pub(crate) fn schedule_file_compare(&self, pair: EntryPair) {
        self.file_tasker.enqueue(pair);
    }

    pub(crate) fn schedule_copy(&self, pair: EntryPair) {
        self.copy_tasker.enqueue(pair);
    }

    pub(crate) fn schedule_remove(&self, pair: EntryPair) {
        self.remove_tasker.enqueue(pair);
    }

    /// Route one mismatch according to the mode: log it against the side
    /// that best describes it and schedule the repair the mode calls for.
    pub(crate) fn handle_mismatch(&self, kind: MismatchKind, pair: &EntryPair) {
        if kind == MismatchKind::Extra && self.options.ignore_extra {
            return;
        }

        match self.options.mode {
            Mode::Copy => {
                if kind == MismatchKind::Extra {
                    self.report_mismatch(kind, &pair.dst);
                } else {
                    self.report_mismatch(kind, &pair.src);
                    self.schedule_copy(pair.clone());
                }
            }
            Mode::Cull => {
                if kind == MismatchKind::Extra {
                    self.report_mismatch(kind, &pair.dst);
                    self.schedule_remove(pair.clone());
                }
            }
            Mode::Compare => {
                let side = if kind == MismatchKind::Missing {
                    Side::Source
                } else {
                    Side::Destination
                };
                self.report_mismatch(kind, pair.get(side));
            }
        }
    }

    fn report_mismatch(&self, kind: MismatchKind, entry: &Entry) {
        self.output.event(
            "Mismatch",
            kind.label(),
            entry.side,
            entry.is_file,
            &self.display_path(entry.side, &entry.path),
            "",
            Tint::Yellow,
        );
        self.mismatches.count_kind_with_entry(entry, kind, false);
    }

    // ----- reporting and counting --------------------------------------

    /// Report and count one per-entry filesystem failure. Failures whose OS
    /// message indicates a permission denial fold into the Access bucket
    /// and can be suppressed wholesale.
    pub(crate) fn report_error(&self, kind: ErrorKind, entry: &Entry, detail: &str) {
        let is_access = kind.is_access_prone()
            && (detail.contains("denied") || detail.contains("permitted"));

        if self.options.ignore_access && is_access {
            return;
        }

        let (event_name, event_detail) = if is_access {
            ("Access", format!("{detail} ({})", kind.label()))
        } else {
            (kind.label(), detail.to_string())
        };

        self.output.event(
            "Error",
            event_name,
            entry.side,
            entry.is_file,
            &self.display_path(entry.side, &entry.path),
            &event_detail,
            Tint::Red,
        );

        self.tree_counter(entry.side)
            .count_kind(kind, entry.size, is_access);
    }

    pub(crate) fn report_warning(
        &self,
        name: &str,
        side: Side,
        is_file: bool,
        path: &Path,
        detail: &str,
    ) {
        if self.options.ignore_warnings {
            return;
        }
        self.output.event(
            "Warning",
            name,
            side,
            is_file,
            &self.display_path(side, path),
            detail,
            Tint::Gray,
        );
    }

    pub(crate) fn report_copied(&self, entry: &Entry, detail: &str) {
        self.output.event(
            "Copied",
            detail,
            entry.side,
            entry.is_file,
            &self.display_path(entry.side, &entry.path),
            "",
            Tint::Default,
        );
    }

    pub(crate) fn report_deleted(&self, entry: &Entry, detail: &str) {
        self.output.event(
            "Deleted",
            detail,
            entry.side,
            entry.is_file,
            &self.display_path(entry.side, &entry.path),
            "",
            Tint::Default,
        );
    }

    pub(crate) fn count_entry(&self, entry: &Entry) {
        self.tree_counter(entry.side).count_entry(entry);
    }

    pub(crate) fn count_copy(&self, entry: &Entry) {
        self.copied.count_entry(entry);
    }

    pub(crate) fn count_remove(&self, entry: &Entry) {
        self.removed.count_entry(entry);
    }

    fn tree_counter(&self, side: Side) -> &TreeCounter {
        match side {
            Side::Source => &self.src_tree,
            Side::Destination => &self.dst_tree,
        }
    }

    fn display_path(&self, side: Side, path: &Path) -> String {
        if self.options.show_relative {
            if let Ok(relative) = path.strip_prefix(self.options.root(side)) {
                let text = relative.to_string_lossy();
                if !text.is_empty() {
                    return text.into_owned();
                }
            }
        }
        path.to_string_lossy().into_owned()
    }

    // ----- status ------------------------------------------------------

    pub fn dir_compare_status(&self) -> TaskQueueStatus {
        self.dir_tasker.status()
    }

    pub fn file_compare_status(&self) -> TaskQueueStatus {
        self.file_tasker.status()
    }

    pub fn copy_status(&self) -> TaskQueueStatus {
        self.copy_tasker.status()
    }

    pub fn remove_status(&self) -> TaskQueueStatus {
        self.remove_tasker.status()
    }

    /// Heartbeat line while queues drain. The cadence starts at five
    /// seconds and backs off three more per print, capped at twenty.
    fn print_status_if_due(&self) {
        let elapsed = self.start_time.elapsed();

        let mut memory = self
            .status_memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if elapsed < memory.period || self.output.since_last_print() < memory.period {
            return;
        }
        memory.period = (memory.period + STATUS_PERIOD_STEP).min(STATUS_PERIOD_MAX);

        if self.dir_tasker.is_finished()
            && self.file_tasker.is_finished()
            && self.copy_tasker.is_finished()
            && self.remove_tasker.is_finished()
        {
            return;
        }

        let dir = self.dir_tasker.status();
        let file = self.file_tasker.status();
        let copy = self.copy_tasker.status();
        let remove = self.remove_tasker.status();

        let mut segments = Vec::new();
        push_status_segment(
            &mut segments,
            "Dirs",
            &dir,
            memory.dir_completed,
            format_count(dir.completed as u64),
        );
        push_status_segment(
            &mut segments,
            "Files",
            &file,
            memory.file_completed,
            format!(
                "{}%",
                if file.busy > 0 {
                    file.progress_sum / file.busy as u64
                } else {
                    0
                }
            ),
        );
        push_status_segment(
            &mut segments,
            "Copies",
            &copy,
            memory.copy_completed,
            format_size(copy.progress_sum),
        );
        push_status_segment(
            &mut segments,
            "Deletes",
            &remove,
            memory.remove_completed,
            remove_progress_text(&remove),
        );

        if !segments.is_empty() {
            self.output.line(
                &format!(
                    "{:>6} and still working..  Here, looking at numbers will make you feel better: {}",
                    pretty_duration(elapsed),
                    segments.join(", ")
                ),
                Tint::Gray,
            );
        }

        memory.dir_completed = dir.completed;
        memory.file_completed = file.completed;
        memory.copy_completed = copy.completed;
        memory.remove_completed = remove.completed;
    }

    // ----- banner and final results ------------------------------------

    fn print_job_summary(&self, reconcile_warnings: &[String]) {
        // the full invocation goes to the logfile only
        let invocation: Vec<String> = std::env::args().collect();
        self.output.log_line(&invocation.join(" "));

        self.output.line(
            &format!(
                "{}...\n   src: {}\n   dst: {}",
                self.options.mode.gerund(),
                self.options.source_root.display(),
                self.options.destination_root.display()
            ),
            Tint::Default,
        );

        for warning in reconcile_warnings {
            self.output.line(warning, Tint::Yellow);
        }

        let flags = self.options.flags_summary();
        if !flags.is_empty() {
            self.output.line(&format!("   ({flags})"), Tint::Default);
        }
    }

    fn print_final_results(&self, aborted: bool) -> RunReport {
        // capture the elapsed time before the tables are formatted
        let elapsed = pretty_duration(self.start_time.elapsed());

        let totals = self.print_counter_results();

        let (mut text, tint) = if aborted {
            (
                "ERROR (something caused the run to abort)".to_string(),
                Tint::Red,
            )
        } else {
            match self.options.mode {
                Mode::Compare => {
                    if totals.errors || totals.mismatches {
                        ("NOT equal".to_string(), Tint::Red)
                    } else {
                        ("Equal".to_string(), Tint::Green)
                    }
                }
                Mode::Copy => {
                    if totals.errors {
                        ("FAIL".to_string(), Tint::Red)
                    } else if totals.copies || self.options.dry_run {
                        ("Success".to_string(), Tint::Green)
                    } else {
                        ("Nothing to copy!".to_string(), Tint::Yellow)
                    }
                }
                Mode::Cull => {
                    if totals.errors {
                        ("FAIL".to_string(), Tint::Red)
                    } else if totals.removes || self.options.dry_run {
                        ("Success".to_string(), Tint::Green)
                    } else {
                        ("No extras to delete!".to_string(), Tint::Yellow)
                    }
                }
            }
        };

        if self.options.dry_run {
            text.push_str(" (dryrun)");
        }
        if self.options.mode != Mode::Cull && self.options.skip_file_read {
            text.push_str(" (skip_file_read -which means only file sizes were checked)");
        }

        if self.options.quiet {
            // the verdict prints even under --quiet
            self.output.set_quiet(false);
            self.output.line(&text, tint);
        } else {
            self.output.line(&text, tint);
            self.output.line(&elapsed, Tint::Default);
        }

        RunReport {
            mode: self.options.mode,
            dry_run: self.options.dry_run,
            skip_file_read: self.options.skip_file_read,
            errors: totals.errors,
            mismatches: totals.mismatches,
            copies: totals.copies,
            removes: totals.removes,
            aborted,
        }
    }

    fn print_counter_results(&self) -> Totals {
        if self.options.mode == Mode::Compare {
            self.print_counter_summary(&self.src_tree);
            self.print_counter_summary(&self.dst_tree);
            self.print_counter_summary(&self.mismatches);
        }
        self.print_counter_summary(&self.copied);
        self.print_counter_summary(&self.removed);

        Totals {
            errors: self.src_tree.has_kinds() || self.dst_tree.has_kinds(),
            mismatches: !self.mismatches.is_empty(),
            copies: !self.copied.is_empty(),
            removes: !self.removed.is_empty(),
        }
    }

    fn print_counter_summary(&self, counter: &TreeCounter) {
        let (file_lines, kind_lines) = counter.summary();

        let console_rows = file_lines.len().min(CONSOLE_TABLE_ROWS);
        for line in file_lines.iter().take(console_rows) {
            self.output.console_line(line, counter.file_tint());
        }
        if console_rows < file_lines.len() {
            self.output.console_line(
                &format!("   ({} unlisted)", file_lines.len() - console_rows),
                Tint::Default,
            );
        }
        for line in &file_lines {
            self.output.log_line(line);
        }

        for line in &kind_lines {
            self.output.line(line, counter.kind_tint());
        }
    }
}

fn push_status_segment(
    segments: &mut Vec<String>,
    name: &str,
    status: &TaskQueueStatus,
    previous_completed: usize,
    progress: String,
) {
    if status.queued == 0 && status.busy == 0 {
        return;
    }

    if status.completed != previous_completed {
        segments.push(format!("{name}={}", format_count(status.completed as u64)));
    } else {
        segments.push(format!(
            "{name}={} (queued={}, busy={}, {progress})",
            format_count(status.completed as u64),
            format_count(status.queued as u64),
            status.busy,
        ));
    }
}

/// The remove gauges hold task start times, so the useful display is how
/// long the average busy delete has been running.
fn remove_progress_text(status: &TaskQueueStatus) -> String {
    if status.busy == 0 {
        return "?".to_string();
    }

    let average_start_ms = status.progress_sum / status.busy as u64;
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0);

    if average_start_ms == 0 || now_ms <= average_start_ms {
        return "?".to_string();
    }

    pretty_duration(Duration::from_millis(now_ms - average_start_ms))
}
