//! Byte-for-byte file comparison: double-buffered reads, one side per
//! thread, with exponential chunk growth from [`MIN_READ`] up to
//! [`MAX_READ`].

use std::thread;

use crate::entry::EntryPair;
use crate::events::{ErrorKind, MismatchKind};
use crate::pipeline::Pipeline;
use crate::resources::{FileCompareResource, MAX_READ, MIN_READ};
use crate::util::percent;

/// Precondition: both sides are regular files with equal nonzero sizes; the
/// directory comparer only schedules such pairs.
pub(crate) fn execute(
    pipeline: &Pipeline,
    resource: &mut FileCompareResource,
    pair: &EntryPair,
) -> bool {
    if pipeline.options().skip_file_read {
        return true;
    }

    debug_assert!(pair.src.is_file && pair.dst.is_file);
    debug_assert!(pair.src.size > 0);
    debug_assert_eq!(pair.src.size, pair.dst.size);

    if let Err(error) = resource.src.open(&pair.src.path) {
        pipeline.report_error(ErrorKind::Open, &pair.src, &error.to_string());
        return false;
    }
    if let Err(error) = resource.dst.open(&pair.dst.path) {
        pipeline.report_error(ErrorKind::Open, &pair.dst, &error.to_string());
        return false;
    }

    let size = pair.src.size;
    let mut remaining = size;
    let mut chunk = size.min(MIN_READ as u64) as usize;

    while remaining > 0 {
        debug_assert!(chunk as u64 <= remaining);
        debug_assert!(chunk <= MAX_READ);

        let (src_read, dst_read) = {
            let FileCompareResource { src, dst, .. } = resource;
            // the source side reads on a helper thread that is joined
            // before the buffers are compared
            thread::scope(|scope| {
                let src_half = scope.spawn(|| src.read_exact(chunk));
                let dst_read = dst.read_exact(chunk);
                let src_read = match src_half.join() {
                    Ok(read) => read,
                    Err(payload) => std::panic::resume_unwind(payload),
                };
                (src_read, dst_read)
            })
        };

        if let Err(error) = src_read {
            pipeline.report_error(ErrorKind::Read, &pair.src, &error.to_string());
            return false;
        }
        if let Err(error) = dst_read {
            pipeline.report_error(ErrorKind::Read, &pair.dst, &error.to_string());
            return false;
        }

        resource.progress.set(percent(size - remaining, size));

        if resource.src.buffer[..chunk] != resource.dst.buffer[..chunk] {
            // handling this mismatch may enqueue a copy or remove that needs
            // exclusive access to these paths, so both streams must be
            // closed before the mismatch is surfaced
            resource.close_streams();
            pipeline.handle_mismatch(MismatchKind::Modified, pair);
            return false;
        }

        remaining -= chunk as u64;
        chunk = ((chunk as u64 * 2).min(MAX_READ as u64).min(remaining)) as usize;
    }

    true
}
