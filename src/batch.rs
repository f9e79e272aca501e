//! Directory-level driver: container discovery, sheet matching and the batch run

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::MergeConfig;
use crate::error::{EdfError, Result};
use crate::pipeline::{process_file, FileReport, RunOptions};
use crate::sheet::SheetLayout;
use crate::writer::ContainerEncoder;

/// File name fragments of files this tool produced itself
const SKIP_MARKERS: [&str; 2] = ["_backup", "_with_events"];

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Finds every `.edf` container under `root`, sorted
///
/// Backups and earlier outputs (names containing `_backup` or
/// `_with_events`) are skipped. Symbolic links are not followed.
pub fn discover_containers<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root.as_ref()).follow_links(false) {
        let entry = entry.map_err(|e| EdfError::Io(e.into()))?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), "edf") {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if SKIP_MARKERS.iter().any(|m| name.contains(m)) {
            continue;
        }
        found.push(entry.path().to_path_buf());
    }

    found.sort();
    Ok(found)
}

/// Extracts the `{patient}_{YYYYMMDD}_{HHMM}` token from a file stem
///
/// The token is the leftmost run of digits followed by `_`, exactly eight
/// digits, `_` and four digits.
///
/// ```rust
/// use edfmerge::batch::event_token;
///
/// assert_eq!(event_token("5774131_20130701_2359"), Some("5774131_20130701_2359".to_string()));
/// assert_eq!(event_token("ward3_5774131_20130701_2359_v2"), Some("5774131_20130701_2359".to_string()));
/// assert_eq!(event_token("recording"), None);
/// ```
pub fn event_token(stem: &str) -> Option<String> {
    let b = stem.as_bytes();
    let digits = |from: usize, n: usize| b.len() >= from + n && b[from..from + n].iter().all(u8::is_ascii_digit);

    let mut i = 0;
    while i < b.len() {
        if !b[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        // i 指向数字串之后
        let date = i + 1;
        let time = date + 9;
        if b.get(i) == Some(&b'_') && digits(date, 8) && b.get(date + 8) == Some(&b'_') && digits(time, 4) {
            return Some(stem[start..time + 4].to_string());
        }
    }
    None
}

/// Event sheets that belong to a container
///
/// A sheet belongs to the container when it lives in the same directory,
/// has the layout's extension and its name contains the container's token.
pub fn find_event_sheets(container: &Path, layout: &SheetLayout) -> Result<Vec<PathBuf>> {
    let stem = container
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(token) = event_token(&stem) else {
        warn!("no patient_date_time token in {}, no event sheets", container.display());
        return Ok(Vec::new());
    };

    let dir = match container.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut sheets = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if !path.is_file() || !has_extension(&path, &layout.extension) {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains(&token) {
            sheets.push(path);
        }
    }

    sheets.sort();
    info!("{} event sheet(s) match {}", sheets.len(), token);
    Ok(sheets)
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
    /// Files that failed, with the error text
    pub failures: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.reports.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Processes every container under `root`, one after the other
///
/// A failing file is recorded and the run goes on with the next one.
pub fn run_batch<P: AsRef<Path>>(
    root: P,
    config: &MergeConfig,
    encoder: &dyn ContainerEncoder,
    options: RunOptions,
) -> Result<BatchSummary> {
    let containers = discover_containers(root.as_ref())?;
    info!("{} container(s) found under {}", containers.len(), root.as_ref().display());

    let mut summary = BatchSummary::default();
    for path in containers {
        match process_file(&path, config, encoder, options) {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                error!("{}: {}", path.display(), e);
                summary.failures.push((path, e.to_string()));
            }
        }
    }

    info!(
        total = summary.total(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "batch finished"
    );
    Ok(summary)
}
