//! Directory comparison: enumerate both sides, classify every child, and
//! emit recursive dir-compares, file-compares, copies, removes, or mismatch
//! events.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::thread;

use crate::entry::{Entry, EntryPair, Side};
use crate::events::{ErrorKind, MismatchKind};
use crate::options::Mode;
use crate::pipeline::Pipeline;
use crate::resources::DirCompareResource;
use crate::util::{format_count, format_size};

/// Children at or past this count trigger a BigDir warning under --verbose.
const BIG_DIR_CHILDREN: usize = 5_000;
/// Files past this size trigger a BigFile warning under --verbose.
const BIG_FILE_BYTES: u64 = 10_000_000_000;

pub(crate) fn execute(
    pipeline: &Pipeline,
    resource: &mut DirCompareResource,
    pair: &EntryPair,
) -> bool {
    debug_assert!(!pair.src.is_file && !pair.dst.is_file);

    let DirCompareResource {
        src_files,
        dst_files,
        src_dirs,
        dst_dirs,
        ..
    } = resource;

    // each side enumerates on its own thread; both are joined before this
    // task returns
    let (src_ok, dst_ok) = thread::scope(|scope| {
        let src_half = scope.spawn(|| {
            enumerate_children(pipeline, &pair.src, &mut *src_files, &mut *src_dirs)
        });
        let dst_ok = enumerate_children(pipeline, &pair.dst, &mut *dst_files, &mut *dst_dirs);
        let src_ok = match src_half.join() {
            Ok(ok) => ok,
            Err(payload) => std::panic::resume_unwind(payload),
        };
        (src_ok, dst_ok)
    });

    if !src_ok || !dst_ok {
        return false;
    }

    if pipeline.options().verbose {
        warn_if_big_dir(pipeline, &pair.src, src_files.len(), src_dirs.len());
        warn_if_big_dir(pipeline, &pair.dst, dst_files.len(), dst_dirs.len());
    }

    merge_walk(pipeline, pair, src_files, dst_files);
    merge_walk(pipeline, pair, src_dirs, dst_dirs);
    true
}

/// List one directory's children into the file and dir vectors, classified
/// and sorted by name. Also used by the copier for its deep descent.
pub(crate) fn enumerate_children(
    pipeline: &Pipeline,
    parent: &Entry,
    files: &mut Vec<Entry>,
    dirs: &mut Vec<Entry>,
) -> bool {
    let reader = match fs::read_dir(&parent.path) {
        Ok(reader) => reader,
        Err(error) => {
            pipeline.report_error(ErrorKind::DirIterMake, parent, &error.to_string());
            return false;
        }
    };

    for child in reader {
        match child {
            Ok(child) => classify_and_store(pipeline, parent.side, &child, files, dirs),
            Err(error) => {
                pipeline.report_error(ErrorKind::DirIterInc, parent, &error.to_string());
                break;
            }
        }
    }

    // the merge pass walks both sides in lockstep, so sorted order is
    // required, not just nice to have
    files.sort_by(|a, b| a.name.cmp(&b.name));
    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    true
}

fn classify_and_store(
    pipeline: &Pipeline,
    side: Side,
    child: &fs::DirEntry,
    files: &mut Vec<Entry>,
    dirs: &mut Vec<Entry>,
) {
    let path = child.path();

    let symlink_meta = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(error) => {
            let probe = Entry::new(side, false, &path, 0);
            pipeline.report_error(ErrorKind::SymlinkStatus, &probe, &error.to_string());
            return;
        }
    };

    let file_type = symlink_meta.file_type();
    let is_regular = file_type.is_file();
    let is_directory = file_type.is_dir();
    let is_symlink = file_type.is_symlink();

    // a broken symlink fails here, so it is reported and skipped on every
    // platform
    let target_meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(error) => {
            let probe = Entry::new(side, false, &path, 0);
            pipeline.report_error(ErrorKind::Status, &probe, &error.to_string());
            return;
        }
    };

    // links are never followed: on Windows a symlink cannot be handled as a
    // flat file, elsewhere it can (with size zero)
    let (is_file, has_size) = if cfg!(windows) {
        (is_regular, is_regular)
    } else {
        (is_regular || is_symlink, is_regular)
    };

    if is_file == is_directory || (is_symlink && !is_file) {
        if !pipeline.options().ignore_unknown {
            let mut detail = format!("unsupported_type: {}", file_type_name(&file_type));
            if is_symlink {
                detail.push_str(": ");
                detail.push_str(&describe_symlink(&path, &target_meta));
            }
            let probe = Entry::new(side, false, &path, 0);
            pipeline.report_error(ErrorKind::UnsupportedType, &probe, &detail);
        }
        return;
    }

    let size = if is_file && has_size {
        match child.metadata() {
            Ok(meta) => meta.len(),
            Err(error) => {
                let probe = Entry::new(side, true, &path, 0);
                pipeline.report_error(ErrorKind::Size, &probe, &error.to_string());
                return;
            }
        }
    } else {
        0
    };

    let entry = Entry::new(side, is_file, path, size);
    pipeline.count_entry(&entry);

    if pipeline.options().verbose {
        if is_symlink {
            pipeline.report_warning(
                "Symlink",
                side,
                is_file,
                &entry.path,
                &describe_symlink(&entry.path, &target_meta),
            );
        }
        if entry.size > BIG_FILE_BYTES {
            pipeline.report_warning(
                "BigFile",
                side,
                true,
                &entry.path,
                &format_size(entry.size),
            );
        }
    }

    if is_file {
        files.push(entry);
    } else {
        dirs.push(entry);
    }
}

/// Walk both sorted child lists in lockstep, emitting the mismatch or the
/// follow-up task each position calls for.
fn merge_walk(
    pipeline: &Pipeline,
    parents: &EntryPair,
    src_children: &[Entry],
    dst_children: &[Entry],
) {
    let mut src_iter = src_children.iter().peekable();
    let mut dst_iter = dst_children.iter().peekable();

    loop {
        match (src_iter.peek(), dst_iter.peek()) {
            (None, None) => break,
            (Some(src), None) => {
                missing_on_destination(pipeline, parents, src);
                src_iter.next();
            }
            (None, Some(dst)) => {
                extra_on_destination(pipeline, parents, dst);
                dst_iter.next();
            }
            (Some(src), Some(dst)) => match src.name.cmp(&dst.name) {
                Ordering::Less => {
                    missing_on_destination(pipeline, parents, src);
                    src_iter.next();
                }
                Ordering::Greater => {
                    extra_on_destination(pipeline, parents, dst);
                    dst_iter.next();
                }
                Ordering::Equal => {
                    same_kind_same_name(pipeline, src, dst);
                    src_iter.next();
                    dst_iter.next();
                }
            },
        }
    }
}

fn missing_on_destination(pipeline: &Pipeline, parents: &EntryPair, src: &Entry) {
    if pipeline.options().mode == Mode::Cull {
        return;
    }

    // the destination entry does not exist yet; synthesize the twin the
    // source says it should have
    let dst = Entry::new(
        Side::Destination,
        src.is_file,
        parents.dst.path.join(&src.name),
        src.size,
    );
    pipeline.handle_mismatch(MismatchKind::Missing, &EntryPair::new(src.clone(), dst));
}

fn extra_on_destination(pipeline: &Pipeline, parents: &EntryPair, dst: &Entry) {
    // no source entry matches; the source parent stands in so the event
    // still names a real path
    pipeline.handle_mismatch(
        MismatchKind::Extra,
        &EntryPair::new(parents.src.clone(), dst.clone()),
    );
}

fn same_kind_same_name(pipeline: &Pipeline, src: &Entry, dst: &Entry) {
    debug_assert_eq!(src.is_file, dst.is_file);
    debug_assert_eq!(src.name, dst.name);

    if !src.is_file {
        pipeline.schedule_dir_compare(EntryPair::new(src.clone(), dst.clone()));
        return;
    }

    // culling only cares about extras, so matching files need no inspection
    if pipeline.options().mode == Mode::Cull {
        return;
    }

    if src.size != dst.size {
        pipeline.handle_mismatch(MismatchKind::Size, &EntryPair::new(src.clone(), dst.clone()));
    } else if !pipeline.options().skip_file_read && src.size > 0 {
        pipeline.schedule_file_compare(EntryPair::new(src.clone(), dst.clone()));
    }
}

fn warn_if_big_dir(pipeline: &Pipeline, parent: &Entry, file_count: usize, dir_count: usize) {
    if file_count + dir_count < BIG_DIR_CHILDREN {
        return;
    }
    pipeline.report_warning(
        "BigDir",
        parent.side,
        false,
        &parent.path,
        &format!(
            "dir has an unusually high number of entries: dirs={}, files={}",
            format_count(dir_count as u64),
            format_count(file_count as u64)
        ),
    );
}

fn describe_symlink(path: &Path, target_meta: &fs::Metadata) -> String {
    let target = match fs::read_link(path) {
        Ok(target) => target.to_string_lossy().into_owned(),
        Err(_) => "error_unable_to_follow_symlink".to_string(),
    };
    format!(
        "symlink to a {} at \"{}\"",
        file_type_name(&target_meta.file_type()),
        target
    )
}

#[cfg(unix)]
fn file_type_name(file_type: &fs::FileType) -> &'static str {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_file() {
        "file"
    } else if file_type.is_dir() {
        "directory"
    } else if file_type.is_symlink() {
        "symlink"
    } else if file_type.is_block_device() {
        "block"
    } else if file_type.is_char_device() {
        "character"
    } else if file_type.is_fifo() {
        "fifo"
    } else if file_type.is_socket() {
        "socket"
    } else {
        "unknown"
    }
}

#[cfg(not(unix))]
fn file_type_name(file_type: &fs::FileType) -> &'static str {
    if file_type.is_file() {
        "file"
    } else if file_type.is_dir() {
        "directory"
    } else if file_type.is_symlink() {
        "symlink"
    } else {
        "unknown"
    }
}
