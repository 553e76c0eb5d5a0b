use crate::error::{CliError, CliResult};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{self, IsTerminal, Read, Write},
    path::{Path, PathBuf},
};

/// Text or JSON rendering, fixed once per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    json: bool,
}

impl Output {
    /// `--json` forces JSON; otherwise the config's `output.json` decides.
    pub fn new(flag: bool, configured: bool) -> Self {
        Self {
            json: flag || configured,
        }
    }

    pub fn is_json(self) -> bool {
        self.json
    }

    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> CliResult<()> {
        let text = serde_json::to_string_pretty(value)?;
        println!("{text}");
        Ok(())
    }
}

pub fn success(message: &str) {
    if io::stdout().is_terminal() {
        println!("{} {message}", "✓".green());
    } else {
        println!("{message}");
    }
}

pub fn warning(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{} {message}", "!".yellow());
    } else {
        eprintln!("{message}");
    }
}

/// Where a single downloaded file goes.
///
/// No path means `default_name` in the working directory. An existing
/// directory, or a path ending in a separator, receives `default_name`.
/// Anything else is a file path whose parent directories are created.
pub fn resolve_output_path(requested: Option<&Path>, default_name: &str) -> CliResult<PathBuf> {
    let Some(requested) = requested else {
        return Ok(PathBuf::from(default_name));
    };

    let raw = requested.as_os_str().to_string_lossy();
    let is_dir_hint = raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR);

    if requested.is_dir() || is_dir_hint {
        create_dirs(requested)?;
        return Ok(requested.join(default_name));
    }

    if let Some(parent) = requested.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dirs(parent)?;
    }
    Ok(requested.to_path_buf())
}

fn create_dirs(dir: &Path) -> CliResult<()> {
    fs::create_dir_all(dir).map_err(|source| CliError::Output {
        path: dir.to_path_buf(),
        source,
    })
}

/// Stream `body` to `path` behind a progress bar on stderr.
pub fn save_stream<R: Read>(body: R, length: Option<u64>, path: &Path) -> CliResult<u64> {
    let mut file = File::create(path).map_err(|source| CliError::Output {
        path: path.to_path_buf(),
        source,
    })?;

    let bar = progress_bar(length);
    let mut reader = bar.wrap_read(body);
    let written = io::copy(&mut reader, &mut file).map_err(|source| CliError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    bar.finish_and_clear();

    file.flush().map_err(|source| CliError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(written)
}

/// Copy `body` to stdout unchanged.
pub fn write_stdout<R: Read>(mut body: R) -> CliResult<u64> {
    let mut stdout = io::stdout().lock();
    let written = io::copy(&mut body, &mut stdout).map_err(CliError::Stdout)?;
    stdout.flush().map_err(CliError::Stdout)?;
    Ok(written)
}

fn progress_bar(length: Option<u64>) -> ProgressBar {
    if !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    match length {
        Some(total) => {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})",
            ) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {bytes} ({bytes_per_sec})") {
                bar.set_style(style);
            }
            bar
        }
    }
}
