//! Backup naming and restore
//!
//! Before a corrected container is written, the original is renamed to
//! `{original_stem}_backup_{final_stem}.edf`. Restoring renames it back and
//! removes `{final_stem}.edf`.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::batch::event_token;
use crate::error::{EdfError, Result};
use crate::sheet::{EventSheet, SheetLayout};

pub const BACKUP_MARKER: &str = "_backup_";

/// Backup location for `original` once its output is named `final_stem`
pub fn backup_path(original: &Path, final_stem: &str) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    original.with_file_name(format!("{}{}{}.edf", stem, BACKUP_MARKER, final_stem))
}

/// Parts of a backup file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupName {
    pub original_stem: String,
    /// Stem of the output written from the backup; unknown for old-style
    /// `{stem}_backup.edf` names
    pub final_stem: Option<String>,
}

/// Splits a backup stem at the first `_backup_`
///
/// Stems that only end in `_backup` are old-style backups without a known
/// output name.
///
/// ```rust
/// use edfmerge::backup::parse_backup_name;
///
/// let name = parse_backup_name("scan_backup_5774131_20130701_2359").unwrap();
/// assert_eq!(name.original_stem, "scan");
/// assert_eq!(name.final_stem.as_deref(), Some("5774131_20130701_2359"));
///
/// assert_eq!(parse_backup_name("scan_backup").unwrap().final_stem, None);
/// assert!(parse_backup_name("scan").is_none());
/// ```
pub fn parse_backup_name(stem: &str) -> Option<BackupName> {
    if let Some((original, final_stem)) = stem.split_once(BACKUP_MARKER) {
        return Some(BackupName {
            original_stem: original.to_string(),
            final_stem: Some(final_stem.to_string()),
        });
    }

    stem.strip_suffix("_backup").map(|original| BackupName {
        original_stem: original.to_string(),
        final_stem: None,
    })
}

/// What restoring one backup did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    pub backup: PathBuf,
    pub original: PathBuf,
    /// Output container that was deleted
    pub removed_output: Option<PathBuf>,
}

/// Puts one backup back under its original name
///
/// The output written from it is deleted first, unless it is the original
/// name itself (in which case the rename replaces it).
pub fn restore_backup(backup: &Path) -> Result<Restored> {
    let stem = backup
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = parse_backup_name(&stem)
        .ok_or_else(|| EdfError::InvalidFormat(format!("{} is not a backup", backup.display())))?;

    let original = backup.with_file_name(format!("{}.edf", name.original_stem));

    let mut removed_output = None;
    if let Some(final_stem) = &name.final_stem {
        let output = backup.with_file_name(format!("{}.edf", final_stem));
        if output != original && output.is_file() {
            std::fs::remove_file(&output)?;
            removed_output = Some(output);
        }
    }

    std::fs::rename(backup, &original)?;
    info!("restored {}", original.display());

    Ok(Restored {
        backup: backup.to_path_buf(),
        original,
        removed_output,
    })
}

/// Outcome of restoring a directory tree
#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub restored: Vec<Restored>,
    pub failures: Vec<(PathBuf, String)>,
    /// Event sheets whose write-back columns were cleared
    pub cleared_sheets: Vec<PathBuf>,
}

/// `(directory, token)` pairs of the containers a restored backup covers
fn restored_tokens(restored: &[Restored]) -> Vec<(PathBuf, String)> {
    let mut tokens = Vec::new();
    for item in restored {
        let dir = item.backup.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = item
            .backup
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(name) = parse_backup_name(&stem) else {
            continue;
        };
        for part in std::iter::once(name.original_stem).chain(name.final_stem) {
            if let Some(token) = event_token(&part) {
                tokens.push((dir.clone(), token));
            }
        }
    }
    tokens
}

/// Restores every backup under `root` and clears sheet write-back columns
///
/// Only sheets next to a restored backup whose name carries that backup's
/// `patient_date_time` token are cleared; other sheets are left alone.
///
/// With `dry_run` set nothing is touched; the summary lists the backups that
/// would be restored.
pub fn restore_all<P: AsRef<Path>>(root: P, layout: &SheetLayout, dry_run: bool) -> Result<RestoreSummary> {
    let mut backups = Vec::new();
    let mut sheets = Vec::new();

    for entry in WalkDir::new(root.as_ref()).follow_links(false) {
        let entry = entry.map_err(|e| EdfError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if ext == "edf" && parse_backup_name(&stem).is_some() {
            backups.push(path.to_path_buf());
        } else if ext == layout.extension.to_ascii_lowercase() {
            sheets.push(path.to_path_buf());
        }
    }
    backups.sort();
    sheets.sort();

    let mut summary = RestoreSummary::default();
    for backup in backups {
        if dry_run {
            let original = parse_backup_name(&backup.file_stem().unwrap_or_default().to_string_lossy())
                .map(|n| backup.with_file_name(format!("{}.edf", n.original_stem)))
                .unwrap_or_default();
            summary.restored.push(Restored {
                backup,
                original,
                removed_output: None,
            });
            continue;
        }

        match restore_backup(&backup) {
            Ok(restored) => summary.restored.push(restored),
            Err(e) => {
                warn!("{}: {}", backup.display(), e);
                summary.failures.push((backup, e.to_string()));
            }
        }
    }

    if !dry_run {
        let columns = [layout.relative_column, layout.status_column];
        let tokens = restored_tokens(&summary.restored);
        let matches = |sheet: &Path| {
            let dir = sheet.parent().map(Path::to_path_buf).unwrap_or_default();
            let name = sheet
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            tokens.iter().any(|(d, token)| *d == dir && name.contains(token.as_str()))
        };

        for path in sheets.into_iter().filter(|p| matches(p.as_path())) {
            let cleared = EventSheet::open(&path, 0).and_then(|mut sheet| {
                if sheet.clear_columns(&columns) > 0 {
                    sheet.save()?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            });
            match cleared {
                Ok(true) => summary.cleared_sheets.push(path),
                Ok(false) => {}
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    summary.failures.push((path, e.to_string()));
                }
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_path() {
        let path = backup_path(Path::new("/data/ward/scan 01.edf"), "5774131_20130701_2359");
        assert_eq!(
            path,
            PathBuf::from("/data/ward/scan 01_backup_5774131_20130701_2359.edf")
        );
    }

    #[test]
    fn test_parse_splits_at_first_marker() {
        let name = parse_backup_name("a_backup_b_backup_c").unwrap();
        assert_eq!(name.original_stem, "a");
        assert_eq!(name.final_stem.as_deref(), Some("b_backup_c"));
    }

    #[test]
    fn test_restore_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("scan_backup_1_20130701_2359.edf");
        let output = dir.path().join("1_20130701_2359.edf");
        std::fs::write(&backup, b"original").unwrap();
        std::fs::write(&output, b"merged").unwrap();

        let restored = restore_backup(&backup).unwrap();
        assert_eq!(restored.original, dir.path().join("scan.edf"));
        assert_eq!(restored.removed_output, Some(output.clone()));
        assert!(!output.exists());
        assert!(!backup.exists());
        assert_eq!(std::fs::read(dir.path().join("scan.edf")).unwrap(), b"original");
    }

    #[test]
    fn test_restore_when_output_kept_the_original_name() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("1_20130701_2359_backup_1_20130701_2359.edf");
        let output = dir.path().join("1_20130701_2359.edf");
        std::fs::write(&backup, b"original").unwrap();
        std::fs::write(&output, b"merged").unwrap();

        let restored = restore_backup(&backup).unwrap();
        assert_eq!(restored.removed_output, None);
        assert_eq!(std::fs::read(&output).unwrap(), b"original");
    }
}
