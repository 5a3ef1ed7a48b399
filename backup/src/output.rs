//! Serialized console and logfile writer for the user-facing event stream.
//!
//! One mutex-guarded sink owned by the pipeline and shared by reference
//! with every worker. Color applies to the console only; the logfile gets
//! plain text and receives a superset of what the console shows.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Local;
use colored::Colorize;

use crate::entry::Side;

/// Console colors used by the reporting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Default,
    Gray,
    Green,
    Yellow,
    Red,
}

struct OutputState {
    color: bool,
    quiet: bool,
    log: Option<BufWriter<File>>,
    log_path: Option<PathBuf>,
    last_print: Instant,
}

pub struct Output {
    state: Mutex<OutputState>,
}

impl Output {
    /// A sink with a logfile named `<base>--<date>--<time>--<NNN>.log`
    /// inside `log_dir`, with `NNN` bumped until the name is free. If the
    /// logfile cannot be created the failure is printed in red and the sink
    /// keeps working console-only.
    pub fn new(base: &str, log_dir: &Path, color: bool, quiet: bool) -> Self {
        let output = Self::console_only(color, quiet);

        match open_logfile(base, log_dir) {
            Ok((path, writer)) => {
                let mut state = output.lock();
                state.log = Some(writer);
                state.log_path = Some(path);
            }
            Err(error) => {
                output.line(
                    &format!("Error: unable to create the logfile: {error}"),
                    Tint::Red,
                );
            }
        }

        output
    }

    pub fn console_only(color: bool, quiet: bool) -> Self {
        colored::control::set_override(color);
        Self {
            state: Mutex::new(OutputState {
                color,
                quiet,
                log: None,
                log_path: None,
                last_print: Instant::now(),
            }),
        }
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.lock().log_path.clone()
    }

    pub fn is_color(&self) -> bool {
        self.lock().color
    }

    /// Quiet suppresses everything except red lines; the pipeline lifts it
    /// for the final verdict.
    pub fn set_quiet(&self, quiet: bool) {
        self.lock().quiet = quiet;
    }

    pub fn since_last_print(&self) -> Duration {
        self.lock().last_print.elapsed()
    }

    /// Print to console and logfile.
    pub fn line(&self, text: &str, tint: Tint) {
        if text.is_empty() {
            return;
        }
        let mut state = self.lock();
        if state.quiet && tint != Tint::Red {
            return;
        }
        write_console(&mut state, text, tint);
        write_log(&mut state, text);
    }

    /// Print to console only (used for tables truncated on screen).
    pub fn console_line(&self, text: &str, tint: Tint) {
        let mut state = self.lock();
        if state.quiet && tint != Tint::Red {
            return;
        }
        write_console(&mut state, text, tint);
    }

    /// Print to the logfile only (never gated by quiet).
    pub fn log_line(&self, text: &str) {
        let mut state = self.lock();
        write_log(&mut state, text);
    }

    /// One reporting event: fixed-width category and name columns, a side
    /// tag, a file/dir marker, the path, and an optional `{detail}` with
    /// non-displayable characters stripped.
    pub fn event(
        &self,
        category: &str,
        name: &str,
        side: Side,
        is_file: bool,
        path: &str,
        detail: &str,
        tint: Tint,
    ) {
        let marker = if is_file { "f" } else { "d" };
        let mut line = format!(
            "{category:<12}{name:<10} {side}   {marker}   {path}",
            side = side.short()
        );

        if !detail.is_empty() {
            line.push_str(&format!("   {{{}}}", strip_nondisplayable(detail)));
        }

        self.line(&line, tint);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_console(state: &mut OutputState, text: &str, tint: Tint) {
    if state.color {
        match tint {
            Tint::Default => println!("{text}"),
            Tint::Gray => println!("{}", text.bright_black()),
            Tint::Green => println!("{}", text.green()),
            Tint::Yellow => println!("{}", text.yellow()),
            Tint::Red => println!("{}", text.bright_red()),
        }
    } else {
        println!("{text}");
    }
    state.last_print = Instant::now();
}

fn write_log(state: &mut OutputState, text: &str) {
    if let Some(log) = &mut state.log {
        let _ = writeln!(log, "{text}");
        let _ = log.flush();
    }
}

fn open_logfile(base: &str, dir: &Path) -> std::io::Result<(PathBuf, BufWriter<File>)> {
    let stamp = Local::now().format("--%Y-%m-%d--%H-%M-%S--");

    for number in 0..1_000u32 {
        let path = dir.join(format!("{base}{stamp}{number:03}.log"));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => return Ok((path, BufWriter::new(file))),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(error) => return Err(error),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "no free logfile name",
    ))
}

/// Some OS error strings carry newlines or control characters; those would
/// mangle the single-line event format.
fn strip_nondisplayable(text: &str) -> String {
    text.chars()
        .filter(|&ch| ch >= ' ' && ch != '\u{7f}')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn strips_control_characters() {
        assert_eq!(strip_nondisplayable("a\nb\tc\u{7f}d"), "abcd");
        assert_eq!(strip_nondisplayable("plain text"), "plain text");
    }

    #[test]
    fn logfile_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let (first, _) = open_logfile("backup", dir.path()).unwrap();
        let (second, _) = open_logfile("backup", dir.path()).unwrap();

        assert_ne!(first, second);
        assert!(first.file_name().unwrap().to_str().unwrap().ends_with("--000.log"));
        assert!(second.file_name().unwrap().to_str().unwrap().ends_with(".log"));
    }

    #[test]
    fn logfile_receives_lines() {
        let dir = TempDir::new().unwrap();
        let output = Output::new("backup", dir.path(), false, false);
        let path = output.log_path().unwrap();

        output.line("hello", Tint::Default);
        output.log_line("log only");
        output.console_line("console only", Tint::Default);

        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("hello"));
        assert!(contents.contains("log only"));
        assert!(!contents.contains("console only"));
    }

    #[test]
    fn quiet_blocks_all_but_red() {
        let dir = TempDir::new().unwrap();
        let output = Output::new("backup", dir.path(), false, true);
        let path = output.log_path().unwrap();

        output.line("suppressed", Tint::Default);
        output.line("loud failure", Tint::Red);

        let contents = std::fs::read_to_string(path).unwrap();
        assert!(!contents.contains("suppressed"));
        assert!(contents.contains("loud failure"));
    }

    #[test]
    fn event_formatting() {
        let dir = TempDir::new().unwrap();
        let output = Output::new("backup", dir.path(), false, false);
        let path = output.log_path().unwrap();

        output.event(
            "Error",
            "Open",
            Side::Destination,
            true,
            "/dst/a.txt",
            "permission denied",
            Tint::Red,
        );

        let contents = std::fs::read_to_string(path).unwrap();
        let line = contents.lines().next().unwrap();
        assert!(line.starts_with("Error"));
        assert!(line.contains(" dst   f   /dst/a.txt"));
        assert!(line.ends_with("{permission denied}"));
    }
}
