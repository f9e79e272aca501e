//! Alignment of externally recorded event times onto the recording axis
//!
//! Event rows carry a clock time of day. Subtracting the container's start
//! time (the anchor) gives the offset into the recording, which decides
//! whether the event becomes an annotation:
//!
//! * offsets at or after the start of zero padding are excluded, even inside the window
//! * offsets in `[0, final_duration + tolerance]` are included, clamped to `final_duration`
//! * everything else is out of range
//!
//! Alignment is pure: the same rows always give the same result.

use crate::reconcile::ReconciliationState;
use crate::types::AnnotationRecord;
use crate::utils::parse_event_clock;

/// Default slack (seconds) past the end of the recording that is still accepted
pub const DEFAULT_END_TOLERANCE: f64 = 0.1;

/// Where an event row came from: sheet index and physical row index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowRef {
    pub source: usize,
    pub row: usize,
}

/// One raw row handed over by the event sheet collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub timestamp: String,
    pub label: String,
    pub row: RowRef,
}

impl EventRow {
    pub fn new(timestamp: &str, label: &str, row: RowRef) -> Self {
        EventRow {
            timestamp: timestamp.to_string(),
            label: label.to_string(),
            row,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Pending,
    Included,
    ExcludedOutOfRange,
    ExcludedZeroPadding,
}

impl EventStatus {
    /// Text written back to the event sheet
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "PENDING",
            EventStatus::Included => "INCLUDED",
            EventStatus::ExcludedOutOfRange => "EXCLUDED_OUT_OF_RANGE",
            EventStatus::ExcludedZeroPadding => "EXCLUDED_ZERO_PADDING",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event row that passed ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEvent {
    pub raw_timestamp: String,
    /// 一天中的秒数
    pub absolute_seconds: f64,
    /// 相对于锚点的偏移（秒）
    pub relative_offset: f64,
    pub label: String,
    pub row: RowRef,
    pub status: EventStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentPolicy {
    pub end_tolerance: f64,
}

impl Default for AlignmentPolicy {
    fn default() -> Self {
        AlignmentPolicy {
            end_tolerance: DEFAULT_END_TOLERANCE,
        }
    }
}

/// Result of aligning a set of event rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alignment {
    /// Point annotations of the included events, ascending onset
    pub annotations: Vec<AnnotationRecord>,
    /// Every retained event with its final status, ascending offset
    pub events: Vec<ExternalEvent>,
}

impl Alignment {
    /// `(row, status)` for every evaluated row
    pub fn statuses(&self) -> Vec<(RowRef, EventStatus)> {
        self.events.iter().map(|e| (e.row, e.status)).collect()
    }

    pub fn count(&self, status: EventStatus) -> usize {
        self.events.iter().filter(|e| e.status == status).count()
    }
}

/// Labels that spreadsheet exports use for an empty cell
fn is_blank_label(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label == "nan" || label == "None"
}

/// Turns raw rows into pending events, dropping unusable rows
///
/// A row is dropped when its timestamp holds no `HH:MM:SS` clock time or
/// its label is blank. Dropped rows get no status at all.
pub fn ingest(rows: &[EventRow], anchor_seconds: f64) -> Vec<ExternalEvent> {
    rows.iter()
        .filter(|r| !is_blank_label(&r.label))
        .filter_map(|r| {
            let absolute = parse_event_clock(&r.timestamp)?;
            Some(ExternalEvent {
                raw_timestamp: r.timestamp.clone(),
                absolute_seconds: absolute,
                relative_offset: absolute - anchor_seconds,
                label: r.label.trim().to_string(),
                row: r.row,
                status: EventStatus::Pending,
            })
        })
        .collect()
}

/// Aligns event rows with the default end tolerance
///
/// # Examples
///
/// ```rust
/// use edfmerge::align::{align, EventRow, EventStatus, RowRef};
/// use edfmerge::reconcile::reconcile;
///
/// let state = reconcile(10.0, 9.0, 100.0, 900);
/// let rows = vec![
///     EventRow::new("00:00:09.5", "Seizure", RowRef { source: 0, row: 1 }),
///     EventRow::new("00:00:04", "Blink", RowRef { source: 0, row: 2 }),
/// ];
///
/// let alignment = align(&rows, 0.0, &state, 10.0);
/// assert_eq!(alignment.annotations.len(), 1);
/// assert_eq!(alignment.annotations[0].description, "Blink");
/// assert_eq!(alignment.count(EventStatus::ExcludedZeroPadding), 1);
/// ```
pub fn align(
    rows: &[EventRow],
    anchor_seconds: f64,
    reconciliation: &ReconciliationState,
    final_duration: f64,
) -> Alignment {
    align_with(
        &AlignmentPolicy::default(),
        rows,
        anchor_seconds,
        reconciliation,
        final_duration,
    )
}

pub fn align_with(
    policy: &AlignmentPolicy,
    rows: &[EventRow],
    anchor_seconds: f64,
    reconciliation: &ReconciliationState,
    final_duration: f64,
) -> Alignment {
    let mut events = ingest(rows, anchor_seconds);
    // 稳定排序
    events.sort_by(|a, b| a.relative_offset.total_cmp(&b.relative_offset));

    let padding_start = if reconciliation.is_padding() {
        reconciliation.zero_padding_start
    } else {
        None
    };

    let mut annotations = Vec::new();
    for event in events.iter_mut() {
        let offset = event.relative_offset;

        event.status = match padding_start {
            Some(start) if offset >= start => EventStatus::ExcludedZeroPadding,
            _ if offset >= 0.0 && offset <= final_duration + policy.end_tolerance => {
                annotations.push(AnnotationRecord::point(offset.min(final_duration), &event.label));
                EventStatus::Included
            }
            _ => EventStatus::ExcludedOutOfRange,
        };
    }

    Alignment {
        annotations,
        events,
    }
}
