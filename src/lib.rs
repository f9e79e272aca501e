//! # edfmerge
//!
//! Merges externally recorded event times into EDF recordings as EDF+
//! annotations.
//!
//! A container is decoded completely into memory, calibrated to physical
//! units, and its sample count is reconciled with the duration its header
//! declares. Event rows from spreadsheets are placed on the recording's time
//! axis relative to the header start time, and each row is classified as
//! included, out of range, or inside synthetic zero padding. The corrected
//! recording is re-emitted as EDF+ under a canonical
//! `{patient}_{YYYYMMDD}_{HHMM}.edf` name.
//!
//! ## Quick Start
//!
//! ### Reading a container
//!
//! ```rust
//! use edfmerge::{EdfReader, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir().unwrap();
//!     # let path = dir.path().join("test_data.edf");
//!     # edfmerge::doctest_utils::create_simple_test_file(&path)?;
//!     let reader = EdfReader::open(&path)?;
//!
//!     let header = reader.header();
//!     println!("Patient: {}", header.patient_id);
//!     println!("Declared duration: {:?} s", header.declared_duration());
//!
//!     let samples = reader.read_physical_samples(0)?;
//!     println!("Read {} samples", samples.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Reconciling and aligning
//!
//! Reconciliation and alignment are pure functions over plain values:
//!
//! ```rust
//! use edfmerge::align::{align, EventRow, EventStatus, RowRef};
//! use edfmerge::reconcile::{reconcile, ReconcileAction};
//!
//! // Header declares 60 s, samples cover 60 s: nothing to repair
//! let state = reconcile(60.0, 60.0, 256.0, 15360);
//! assert_eq!(state.action, ReconcileAction::None);
//!
//! // Recording started at 23:59:00
//! let anchor = 23.0 * 3600.0 + 59.0 * 60.0;
//! let rows = vec![
//!     EventRow::new("23:59:30", "Seizure onset", RowRef { source: 0, row: 1 }),
//!     EventRow::new("00:00:00.05", "Seizure end", RowRef { source: 0, row: 2 }),
//! ];
//!
//! let alignment = align(&rows, anchor, &state, 60.0);
//! assert_eq!(alignment.annotations[0].onset, 30.0);
//! // 次日的时间不会回绕
//! assert_eq!(alignment.events[0].status, EventStatus::ExcludedOutOfRange);
//! ```
//!
//! ### Merging a directory
//!
//! ```rust,no_run
//! use edfmerge::{run_batch, EdfWriter, MergeConfig, RunOptions};
//!
//! let config = MergeConfig::default();
//! let summary = run_batch("recordings", &config, &EdfWriter::new(), RunOptions::default())?;
//! print!("{}", summary);
//! # Ok::<(), edfmerge::EdfError>(())
//! ```

pub mod align;
pub mod backup;
pub mod batch;
pub mod config;
pub mod error;
pub mod header;
pub mod naming;
pub mod pipeline;
pub mod reader;
pub mod reconcile;
pub mod report;
pub mod scaling;
pub mod sheet;
pub mod tal;
pub mod types;
pub mod utils;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use batch::{run_batch, BatchSummary};
pub use config::MergeConfig;
pub use error::{DecodeWarning, EdfError, Result};
pub use pipeline::{process_file, FileReport, MergeOutcome, RunOptions};
pub use reader::EdfReader;
pub use types::{AnnotationRecord, ChannelHeader, ContainerHeader, Recording};
pub use writer::{ContainerEncoder, EdfWriter};

// Important constants
pub const EDFLIB_TIME_DIMENSION: i64 = 10_000_000; // 100 nanoseconds unit
pub const EDFLIB_MAXSIGNALS: usize = 4096;
pub const EDFLIB_MAX_ANNOTATION_LEN: usize = 512;

/// Library version
///
/// # Examples
///
/// ```rust
/// let version = edfmerge::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
