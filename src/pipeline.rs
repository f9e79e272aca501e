//! Per-file merge pipeline
//!
//! load → scale → reconcile → read event sheets → align → derive the output
//! name → encode → back up the original and write → write statuses back →
//! verify

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::align::{align_with, Alignment, EventRow};
use crate::backup::backup_path;
use crate::batch::find_event_sheets;
use crate::config::MergeConfig;
use crate::error::{DecodeWarning, EdfError, Result};
use crate::naming::derive_filename_with;
use crate::reader::EdfReader;
use crate::reconcile::{apply, final_duration, reconcile_with, ReconciliationState};
use crate::scaling::scale_channel;
use crate::sheet::EventSheet;
use crate::types::{FieldDefault, Recording};
use crate::writer::ContainerEncoder;

/// Largest accepted difference between written and expected duration (seconds)
pub const VERIFY_TOLERANCE: f64 = 0.1;

/// Switches that apply to a whole run, not to the merge rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute everything, move and write nothing
    pub dry_run: bool,
}

/// A decoded, calibrated and reconciled recording
#[derive(Debug, Clone)]
pub struct LoadedRecording {
    pub recording: Recording,
    pub reconciliation: ReconciliationState,
    /// Sample rate of the reference signal
    pub sample_rate: f64,
    /// Duration of the reference signal after reconciliation
    pub final_duration: f64,
    pub decode_warnings: Vec<DecodeWarning>,
    pub field_defaults: Vec<FieldDefault>,
}

/// Reads a container and repairs its duration
///
/// Annotation signals of the input are dropped. The reference signal (first
/// sample-carrying signal with a non-zero sample count) drives the
/// reconciliation decision; applying it resizes every signal.
///
/// # Errors
///
/// * `EdfError::InvalidFormat` - Non-positive record duration, or no signal
///   carries samples
/// * `EdfError::DegenerateCalibration` - A signal cannot be scaled
pub fn load_recording<P: AsRef<Path>>(path: P, config: &MergeConfig) -> Result<LoadedRecording> {
    let path = path.as_ref();
    let reader = EdfReader::open(path)?;
    let reference_channel = reader.reference_channel();
    let sample_indices = reader.signal_indices();
    let (mut header, channels, data) = reader.into_parts();

    debug!(
        records = header.record_count,
        record_duration = header.record_duration,
        signals = header.channel_count,
        "header parsed"
    );
    if header.header_bytes != header.expected_header_bytes() {
        warn!(
            "{}: header declares {} bytes, {} signals need {}",
            path.display(),
            header.header_bytes,
            header.channel_count,
            header.expected_header_bytes()
        );
    }
    for default in &header.defaults {
        warn!("{}: field {} defaulted (raw {:?})", path.display(), default.field, default.raw);
    }

    if header.record_duration.is_nan() || header.record_duration <= 0.0 {
        return Err(EdfError::InvalidFormat(format!(
            "record duration {} is not positive",
            header.record_duration
        )));
    }

    let reference = reference_channel
        .and_then(|r| sample_indices.iter().position(|&i| i == r))
        .ok_or_else(|| EdfError::InvalidFormat("no signal carries samples".to_string()))?;

    let mut signals = Vec::with_capacity(sample_indices.len());
    for &i in &sample_indices {
        signals.push(scale_channel(i, data.grid.decoded(i), &channels[i])?);
    }
    let channels: Vec<_> = sample_indices.iter().map(|&i| channels[i].clone()).collect();

    let rates: Vec<f64> = channels
        .iter()
        .map(|ch| ch.sample_rate(header.record_duration))
        .collect();
    let sample_rate = rates[reference];

    let current = signals[reference].len();
    let measured = final_duration(current, sample_rate);
    // 记录数未知时以实测时长为准
    let declared = header.declared_duration().unwrap_or(measured);

    let reconciliation = reconcile_with(
        config.mismatch_threshold,
        declared,
        measured,
        sample_rate,
        current,
    );
    apply(&reconciliation, &mut signals, &rates);
    let final_duration = final_duration(signals[reference].len(), sample_rate);

    info!(
        header_duration = declared,
        measured_duration = measured,
        action = ?reconciliation.action,
        final_duration,
        "duration reconciled"
    );

    if header.record_count < 0 {
        header.record_count = data.grid.complete_records() as i64;
    }
    header.channel_count = channels.len();
    let field_defaults = std::mem::take(&mut header.defaults);

    Ok(LoadedRecording {
        recording: Recording {
            header,
            channels,
            signals,
        },
        reconciliation,
        sample_rate,
        final_duration,
        decode_warnings: data.warnings,
        field_defaults,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Events were evaluated; `included` of them became annotations
    Merged { included: usize },
    /// No sheet or no usable event row; the container is re-emitted annotation-free
    NoMatchingEvents,
}

/// Everything that happened to one container
#[derive(Debug, Clone)]
pub struct FileReport {
    pub source: PathBuf,
    /// Canonical output path (also filled in on dry runs)
    pub output: PathBuf,
    /// Where the original was moved, if it was
    pub backup: Option<PathBuf>,
    pub sheets: Vec<PathBuf>,
    pub reconciliation: ReconciliationState,
    pub final_duration: f64,
    pub alignment: Alignment,
    pub outcome: MergeOutcome,
    pub decode_warnings: Vec<DecodeWarning>,
    pub field_defaults: Vec<FieldDefault>,
    /// Non-fatal findings, such as a fallback output name
    pub notes: Vec<String>,
    pub dry_run: bool,
}

/// Runs the whole merge for one container
pub fn process_file<P: AsRef<Path>>(
    path: P,
    config: &MergeConfig,
    encoder: &dyn ContainerEncoder,
    options: RunOptions,
) -> Result<FileReport> {
    let path = path.as_ref();
    info!("processing {}", path.display());

    let loaded = load_recording(path, config)?;
    let mut notes = Vec::new();

    // 查找并读取事件表
    let sheet_paths = find_event_sheets(path, &config.sheet)?;
    let mut sheets = Vec::with_capacity(sheet_paths.len());
    for (source, sheet_path) in sheet_paths.iter().enumerate() {
        debug!("reading event sheet {}", sheet_path.display());
        sheets.push(EventSheet::open(sheet_path, source)?);
    }
    let rows: Vec<EventRow> = sheets
        .iter()
        .flat_map(|s| s.event_rows(&config.sheet))
        .collect();

    let anchor = loaded.recording.header.anchor_seconds();
    let alignment = align_with(
        &config.alignment_policy(),
        &rows,
        anchor,
        &loaded.reconciliation,
        loaded.final_duration,
    );

    let outcome = if alignment.events.is_empty() {
        info!("no matching events for {}", path.display());
        MergeOutcome::NoMatchingEvents
    } else {
        MergeOutcome::Merged {
            included: alignment.annotations.len(),
        }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let canonical = match derive_filename_with(&config.naming_policy(), &loaded.recording.header, &file_name) {
        Ok(name) => name,
        Err(e) => {
            warn!("{}: {}, keeping the original name", path.display(), e);
            notes.push(format!("output name not derived ({}), original name kept", e));
            file_name.clone()
        }
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let output = dir.join(&canonical);

    let backup = config.backup.then(|| {
        let final_stem = Path::new(&canonical)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        backup_path(path, &final_stem)
    });

    // 先在内存中编码，失败时磁盘上什么都不变
    let mut encoded = Vec::new();
    encoder.encode(&loaded.recording, &alignment.annotations, &mut encoded)?;

    if !options.dry_run {
        write_output(path, &dir, &output, backup.as_deref(), &encoded)?;
        info!(
            annotations = alignment.annotations.len(),
            bytes = encoded.len(),
            "written {}",
            output.display()
        );

        if config.write_back {
            for sheet in sheets.iter_mut() {
                if sheet.apply_statuses(&config.sheet, &alignment.events) > 0 {
                    sheet.save()?;
                    debug!("statuses written to {}", sheet.path().display());
                }
            }
        }

        if config.verify_output {
            verify_output(&output, loaded.final_duration, alignment.annotations.len(), &mut notes)?;
        }
    }

    Ok(FileReport {
        source: path.to_path_buf(),
        output,
        backup,
        sheets: sheet_paths,
        reconciliation: loaded.reconciliation,
        final_duration: loaded.final_duration,
        alignment,
        outcome,
        decode_warnings: loaded.decode_warnings,
        field_defaults: loaded.field_defaults,
        notes,
        dry_run: options.dry_run,
    })
}

/// Moves the original to its backup name and puts `encoded` at `output`
///
/// The bytes go to a temporary file in the output directory first, which
/// then replaces `output` in one rename. If that fails after the original
/// was moved, the original is moved back.
fn write_output(source: &Path, dir: &Path, output: &Path, backup: Option<&Path>, encoded: &[u8]) -> Result<()> {
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(encoded)?;
    staged.as_file().sync_all()?;

    if let Some(backup) = backup {
        std::fs::rename(source, backup)?;
        info!("original moved to {}", backup.display());
    }

    if let Err(e) = staged.persist(output) {
        warn!("{}: {}", output.display(), e.error);
        if let Some(backup) = backup {
            std::fs::rename(backup, source)?;
            info!("original moved back to {}", source.display());
        }
        return Err(EdfError::Io(e.error));
    }
    Ok(())
}

/// Re-reads a written container and notes any disagreement
fn verify_output(
    output: &Path,
    expected_duration: f64,
    expected_annotations: usize,
    notes: &mut Vec<String>,
) -> Result<()> {
    let reader = EdfReader::open(output)?;
    let written = reader.header().declared_duration().unwrap_or(0.0);

    if (written - expected_duration).abs() > VERIFY_TOLERANCE {
        warn!(
            "{}: written duration {:.2}s, expected {:.2}s",
            output.display(),
            written,
            expected_duration
        );
        notes.push(format!(
            "written duration {:.2}s differs from {:.2}s",
            written, expected_duration
        ));
    }

    if reader.annotations().len() != expected_annotations {
        notes.push(format!(
            "{} annotations read back, {} written",
            reader.annotations().len(),
            expected_annotations
        ));
    }

    debug!("verified {}", output.display());
    Ok(())
}
