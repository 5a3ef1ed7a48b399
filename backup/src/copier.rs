//! Destination replacement: copy one entry from the source, recursively for
//! directories, removing whatever already sits at the destination first.

use std::fs;
use std::io;
use std::path::Path;

use crate::dir_compare;
use crate::entry::{Entry, EntryPair, Side};
use crate::events::ErrorKind;
use crate::pipeline::Pipeline;
use crate::remover;
use crate::resources::{CopyResource, ProgressGauge};
use crate::util::format_size;

pub(crate) fn execute(pipeline: &Pipeline, resource: &mut CopyResource, pair: &EntryPair) -> bool {
    debug_assert_eq!(pair.src.side, Side::Source);
    debug_assert_eq!(pair.dst.side, Side::Destination);
    debug_assert_eq!(pair.src.is_file, pair.dst.is_file);

    // replace semantics: whatever sits at the destination goes first; a
    // moment of absence is accepted
    if exists_ignoring_errors(&pair.dst.path, false) && !remover::remove_subtree(pipeline, &pair.dst)
    {
        return false;
    }

    let success = if pair.src.is_file {
        copy_file(pipeline, pair, &resource.progress)
    } else {
        copy_dir_deep(pipeline, pair, &resource.progress)
    };

    if success {
        let detail = if pipeline.options().dry_run {
            "(DryRun)".to_string()
        } else {
            format!("({})", format_size(resource.progress.get()))
        };
        pipeline.report_copied(&pair.src, &detail);
    }

    success
}

fn copy_file(pipeline: &Pipeline, pair: &EntryPair, progress: &ProgressGauge) -> bool {
    if !pipeline.options().dry_run {
        if let Err(error) = copy_file_raw(&pair.src.path, &pair.dst.path) {
            pipeline.report_error(ErrorKind::Copy, &pair.src, &error.to_string());
            return false;
        }
    }

    pipeline.count_copy(&pair.src);
    progress.add(pair.src.size);
    true
}

/// Copy one file, recreating a symlink as a symlink instead of following it.
fn copy_file_raw(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(from)?;
    if meta.file_type().is_symlink() {
        let target = fs::read_link(from)?;
        return make_symlink(&target, to);
    }
    fs::copy(from, to).map(|_| ())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn make_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

fn copy_dir_shallow(pipeline: &Pipeline, pair: &EntryPair) -> bool {
    if !pipeline.options().dry_run {
        if let Err(error) = fs::create_dir(&pair.dst.path) {
            pipeline.report_error(ErrorKind::CreateDirectory, &pair.dst, &error.to_string());
            return false;
        }
    }

    pipeline.count_copy(&pair.src);
    true
}

/// Create the directory, then copy its children: files first, then a
/// recursive descent into subdirectories. Sibling failures don't stop the
/// rest; the whole call reports partial failure by returning false.
fn copy_dir_deep(pipeline: &Pipeline, pair: &EntryPair, progress: &ProgressGauge) -> bool {
    if !copy_dir_shallow(pipeline, pair) {
        return false;
    }

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let mut any_errors = !dir_compare::enumerate_children(pipeline, &pair.src, &mut files, &mut dirs);

    for child in &files {
        if !copy_child(pipeline, pair, child, progress) {
            any_errors = true;
        }
    }

    // the file list can be large; release it before descending
    drop(files);

    for child in &dirs {
        if !copy_child(pipeline, pair, child, progress) {
            any_errors = true;
        }
    }

    !any_errors
}

fn copy_child(
    pipeline: &Pipeline,
    parents: &EntryPair,
    child: &Entry,
    progress: &ProgressGauge,
) -> bool {
    let dst = Entry::new(
        Side::Destination,
        child.is_file,
        parents.dst.path.join(&child.name),
        child.size,
    );
    let pair = EntryPair::new(child.clone(), dst);

    if child.is_file {
        copy_file(pipeline, &pair, progress)
    } else {
        copy_dir_deep(pipeline, &pair, progress)
    }
}

/// Existence probe that never reports; the follow-up operation surfaces the
/// real error if there is one.
fn exists_ignoring_errors(path: &Path, default_on_error: bool) -> bool {
    match fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(error) if error.kind() == io::ErrorKind::NotFound => false,
        Err(_) => default_on_error,
    }
}
