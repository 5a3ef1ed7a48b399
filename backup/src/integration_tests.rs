//! Whole-run scenarios that also inspect the logfile the pipeline writes.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::options::{Mode, Options};
use crate::pipeline::RunReport;

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

fn run_logged(
    mode: Mode,
    src: &Path,
    dst: &Path,
    log_dir: &Path,
    tweak: impl FnOnce(&mut Options),
) -> (RunReport, String) {
    let mut options = Options::new(mode, src.to_str().unwrap(), dst.to_str().unwrap()).unwrap();
    options.color = false;
    options.log_dir = Some(log_dir.to_path_buf());
    tweak(&mut options);

    let report = crate::run(options).unwrap();

    let log_path = find_logfile(log_dir);
    let contents = fs::read_to_string(log_path).unwrap();
    (report, contents)
}

fn find_logfile(dir: &Path) -> PathBuf {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "log")
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with("backup--"))
        })
        .collect();
    logs.sort();
    logs.pop().expect("a logfile was written")
}

#[test]
fn copy_run_logs_mismatch_copy_and_verdict() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    write_file(&src.path().join("a"), b"xyz");

    let (report, contents) = run_logged(Mode::Copy, src.path(), dst.path(), logs.path(), |_| {});

    assert!(report.is_success());
    assert!(contents.contains("Copying..."));
    assert!(contents.contains("Mismatch"));
    assert!(contents.contains("Missing"));
    assert!(contents.contains("Copied"));
    assert!(contents.contains("Success"));
}

#[test]
fn cull_run_logs_deletion() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    write_file(&dst.path().join("junk"), b"12345");

    let (report, contents) = run_logged(Mode::Cull, src.path(), dst.path(), logs.path(), |_| {});

    assert!(report.is_success());
    assert!(contents.contains("Culling..."));
    assert!(contents.contains("Deleted"));
    assert!(contents.contains("Extra"));
    assert!(contents.contains("Success"));
    assert!(!dst.path().join("junk").exists());
}

#[test]
fn compare_run_logs_tables_and_verdict() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    write_file(&src.path().join("one.txt"), b"alpha");
    write_file(&src.path().join("two.log"), b"beta");
    write_file(&dst.path().join("one.txt"), b"alpha");
    write_file(&dst.path().join("two.log"), b"beta");

    let (report, contents) =
        run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |_| {});

    assert!(report.is_success());
    assert!(contents.contains("Comparing..."));
    assert!(contents.contains("Source Tree x2"));
    assert!(contents.contains("Destination Tree x2"));
    assert!(contents.contains("txt"));
    assert!(contents.contains("log"));
    assert!(contents.contains("Equal"));
}

#[test]
fn unequal_compare_logs_not_equal() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    write_file(&src.path().join("a"), b"AAAA");
    write_file(&dst.path().join("a"), b"BBBBB");

    let (report, contents) =
        run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |_| {});

    assert!(!report.is_success());
    assert!(contents.contains("Mismatch"));
    assert!(contents.contains("Size"));
    assert!(contents.contains("NOT equal"));
}

#[test]
fn dry_run_is_stamped_on_the_verdict() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    write_file(&src.path().join("a"), b"xyz");

    let (report, contents) = run_logged(Mode::Copy, src.path(), dst.path(), logs.path(), |o| {
        o.dry_run = true;
    });

    assert!(report.is_success());
    assert!(report.dry_run);
    assert!(contents.contains("(dryrun)"));
    assert!(contents.contains("(DryRun)"));
    assert!(!dst.path().join("a").exists());
}

#[test]
fn skip_file_read_is_stamped_on_the_verdict() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    write_file(&src.path().join("a"), b"same");
    write_file(&dst.path().join("a"), b"diff");

    let (report, contents) =
        run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |o| {
            o.skip_file_read = true;
        });

    assert!(report.is_success());
    assert!(contents.contains("(skip_file_read"));
}

#[test]
fn relative_paths_show_up_relative() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    write_file(&src.path().join("inner/missing.bin"), b"123");
    fs::create_dir(dst.path().join("inner")).unwrap();

    let (_, contents) = run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |o| {
        o.show_relative = true;
    });

    let event_line = contents
        .lines()
        .find(|line| line.contains("Missing"))
        .expect("a missing event");
    assert!(event_line.contains("inner/missing.bin") || event_line.contains("inner\\missing.bin"));
    assert!(!event_line.contains(src.path().to_str().unwrap()));
}

#[test]
fn big_directory_warning_under_verbose() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();

    for index in 0..5_000 {
        write_file(&src.path().join(format!("f{index:04}")), b"");
        write_file(&dst.path().join(format!("f{index:04}")), b"");
    }

    let (report, contents) =
        run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |o| {
            o.verbose = true;
        });

    assert!(report.is_success());
    assert!(contents.contains("Warning"));
    assert!(contents.contains("BigDir"));
    assert!(contents.contains("unusually high number of entries"));
}

#[test]
fn warnings_are_suppressible() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();

    for index in 0..5_000 {
        write_file(&src.path().join(format!("f{index:04}")), b"");
        write_file(&dst.path().join(format!("f{index:04}")), b"");
    }

    let (_, contents) = run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |o| {
        o.verbose = true;
        o.ignore_warnings = true;
    });

    assert!(!contents.contains("BigDir"));
}

#[test]
fn banner_lists_roots_and_flags() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();

    let (_, contents) = run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |o| {
        o.dry_run = true;
        o.background = true;
    });

    assert!(contents.contains("   src: "));
    assert!(contents.contains("   dst: "));
    assert!(contents.contains("background"));
    assert!(contents.contains("dry_run"));
}

#[test]
fn quiet_log_still_gets_the_verdict() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();

    let (_, contents) = run_logged(Mode::Compare, src.path(), dst.path(), logs.path(), |o| {
        o.quiet = true;
    });

    assert!(!contents.contains("Comparing..."));
    assert!(contents.contains("Equal"));
}
