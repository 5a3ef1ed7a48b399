//! Destination subtree deletion with item accounting.

use std::fs;

use walkdir::WalkDir;

use crate::entry::{Entry, EntryPair, Side};
use crate::events::ErrorKind;
use crate::pipeline::Pipeline;
use crate::resources::RemoveResource;
use crate::util::format_count;

pub(crate) fn execute(
    pipeline: &Pipeline,
    _resource: &mut RemoveResource,
    pair: &EntryPair,
) -> bool {
    remove_subtree(pipeline, &pair.dst)
}

/// Delete a destination path and everything under it, reporting how many
/// filesystem items went away. Also invoked by the copier to clear a
/// destination before replacing it.
pub(crate) fn remove_subtree(pipeline: &Pipeline, entry: &Entry) -> bool {
    debug_assert_eq!(entry.side, Side::Destination);
    debug_assert!(!entry.path.as_os_str().is_empty());

    let detail = if pipeline.options().dry_run {
        "(DryRun)".to_string()
    } else {
        // count before deleting; links are not followed so the count is the
        // number of items that will actually go away
        let removed_count = WalkDir::new(&entry.path)
            .into_iter()
            .filter_map(|walked| walked.ok())
            .count() as u64;

        let is_dir = fs::symlink_metadata(&entry.path)
            .map(|meta| meta.is_dir())
            .unwrap_or(false);

        let removal = if is_dir {
            fs::remove_dir_all(&entry.path)
        } else {
            fs::remove_file(&entry.path)
        };

        if let Err(error) = removal {
            pipeline.report_error(ErrorKind::Remove, entry, &error.to_string());
            return false;
        }

        if removed_count == 0 {
            pipeline.report_error(ErrorKind::Remove, entry, "nothing was removed");
            return false;
        }

        format!("(x{})", format_count(removed_count))
    };

    pipeline.report_deleted(entry, &detail);
    pipeline.count_remove(entry);
    true
}
