//! Parallel directory-tree compare / copy / cull engine.
//!
//! Compares a *source* and a *destination* directory tree while ignoring
//! timestamps and permissions: equality means the same tree shape, names,
//! sizes, and (unless told otherwise) byte-for-byte file contents.
//! Depending on the mode the engine reports the differences, replaces
//! destination entries from the source, or deletes destination extras.
//!
//! The work runs on four cooperating bounded task queues (directory
//! compare, file compare, copy, remove), each backed by a fixed pool of
//! workers that own pre-allocated, reusable task resources. Traversal
//! always drains completely before any mutation starts.
//!
//! ```no_run
//! use backup::{Mode, Options};
//!
//! let options = Options::new(Mode::Compare, "/data/current", "/mnt/mirror")?;
//! let report = backup::run(options)?;
//! assert!(report.is_success());
//! # Ok::<(), backup::EngineError>(())
//! ```

pub mod counters;
pub mod entry;
pub mod error;
pub mod events;
pub mod failures;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod resources;
pub mod tasker;
pub mod util;

mod copier;
mod dir_compare;
mod file_compare;
mod remover;

pub use counters::{Counted, Counter, TreeCounter};
pub use entry::{Entry, EntryPair, Side};
pub use error::{EngineError, Result};
pub use events::{CountKind, ErrorKind, MismatchKind};
pub use failures::{FailureCollector, WorkerFailure};
pub use options::{Mode, Options, ThreadCounts};
pub use output::{Output, Tint};
pub use pipeline::{Pipeline, QueueKind, RunReport};
pub use queue::{TaskQueue, TaskQueueStatus};
pub use resources::{
    CopyResource, DirCompareResource, FileCompareResource, ProgressGauge, RemoveResource,
    TaskResource, MAX_READ, MIN_READ,
};
pub use tasker::Tasker;

/// Build a pipeline from validated options and drive it to completion.
pub fn run(options: Options) -> Result<RunReport> {
    let pipeline = pipeline::Pipeline::new(options);
    pipeline.run()
}

#[cfg(test)]
mod integration_tests;
