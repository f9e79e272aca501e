//! Human-readable rendering of run results

use std::fmt;

use crate::align::EventStatus;
use crate::backup::RestoreSummary;
use crate::batch::BatchSummary;
use crate::pipeline::{FileReport, LoadedRecording, MergeOutcome};
use crate::reconcile::{ReconcileAction, ReconciliationState};

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReconcileAction::None => "none",
            ReconcileAction::Pad => "pad",
            ReconcileAction::Truncate => "truncate",
        };
        f.write_str(text)
    }
}

impl fmt::Display for ReconciliationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "header {:.2}s, measured {:.2}s, delta {:.2}s, action {}",
            self.header_duration, self.measured_duration, self.delta, self.action
        )?;
        if self.changes_samples() {
            write!(f, " ({} -> {} samples)", self.current_samples, self.target_samples)?;
        }
        if let Some(start) = self.zero_padding_start {
            write!(f, ", zero padding from {:.2}s", start)?;
        }
        Ok(())
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.dry_run { "[dry run] " } else { "" };
        writeln!(f, "{}{}", prefix, self.source.display())?;
        writeln!(f, "  duration: {}", self.reconciliation)?;
        writeln!(f, "  final duration: {:.2}s", self.final_duration)?;

        for sheet in &self.sheets {
            writeln!(f, "  sheet: {}", sheet.display())?;
        }

        match self.outcome {
            MergeOutcome::NoMatchingEvents => writeln!(f, "  events: none matched")?,
            MergeOutcome::Merged { included } => writeln!(
                f,
                "  events: {} evaluated, {} included, {} out of range, {} in zero padding",
                self.alignment.events.len(),
                included,
                self.alignment.count(EventStatus::ExcludedOutOfRange),
                self.alignment.count(EventStatus::ExcludedZeroPadding)
            )?,
        }

        for event in &self.alignment.events {
            writeln!(
                f,
                "    {:<24} {:>10.2}s  {}  (row {})",
                event.label, event.relative_offset, event.status, event.row.row
            )?;
        }

        if let Some(backup) = &self.backup {
            writeln!(f, "  backup: {}", backup.display())?;
        }
        writeln!(f, "  output: {}", self.output.display())?;

        for warning in &self.decode_warnings {
            writeln!(f, "  warning: {}", warning)?;
        }
        for default in &self.field_defaults {
            writeln!(f, "  defaulted field {} (raw {:?})", default.field, default.raw)?;
        }
        for note in &self.notes {
            writeln!(f, "  note: {}", note)?;
        }
        Ok(())
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.reports {
            write!(f, "{}", report)?;
        }
        writeln!(
            f,
            "{} file(s): {} succeeded, {} failed",
            self.total(),
            self.succeeded(),
            self.failed()
        )?;
        for (path, error) in &self.failures {
            writeln!(f, "  failed: {}: {}", path.display(), error)?;
        }
        Ok(())
    }
}

impl fmt::Display for RestoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for restored in &self.restored {
            writeln!(
                f,
                "{} -> {}",
                restored.backup.display(),
                restored.original.display()
            )?;
            if let Some(output) = &restored.removed_output {
                writeln!(f, "  removed {}", output.display())?;
            }
        }
        for sheet in &self.cleared_sheets {
            writeln!(f, "cleared {}", sheet.display())?;
        }
        writeln!(
            f,
            "{} restored, {} sheet(s) cleared, {} failed",
            self.restored.len(),
            self.cleared_sheets.len(),
            self.failures.len()
        )?;
        for (path, error) in &self.failures {
            writeln!(f, "  failed: {}: {}", path.display(), error)?;
        }
        Ok(())
    }
}

/// Header, signal table and reconciliation decision of one container
pub struct Inspection<'a>(pub &'a LoadedRecording);

impl fmt::Display for Inspection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded = self.0;
        let h = &loaded.recording.header;

        writeln!(f, "patient:    {}", h.patient_id)?;
        writeln!(f, "recording:  {}", h.recording_id)?;
        writeln!(f, "start:      {} {}", h.start_date, h.start_time)?;
        writeln!(f, "records:    {} x {}s", h.record_count, h.record_duration)?;
        writeln!(f, "signals:    {}", loaded.recording.channels.len())?;

        for (i, ch) in loaded.recording.channels.iter().enumerate() {
            writeln!(
                f,
                "  {:>3} {:<16} {:>6.1} Hz  [{}, {}] {}  [{}, {}]",
                i,
                ch.label,
                ch.sample_rate(h.record_duration),
                ch.physical_min,
                ch.physical_max,
                ch.units,
                ch.digital_min,
                ch.digital_max
            )?;
        }

        writeln!(f, "duration:   {}", loaded.reconciliation)?;
        writeln!(f, "final:      {:.2}s", loaded.final_duration)?;

        for default in &loaded.field_defaults {
            writeln!(f, "defaulted:  {} (raw {:?})", default.field, default.raw)?;
        }
        for warning in &loaded.decode_warnings {
            writeln!(f, "warning:    {}", warning)?;
        }
        Ok(())
    }
}
