//! Merge run configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::align::{AlignmentPolicy, DEFAULT_END_TOLERANCE};
use crate::error::{EdfError, Result};
use crate::naming::{NamingPolicy, DEFAULT_CENTURY_PIVOT, MISSING_PATIENT_SENTINEL};
use crate::reconcile::DEFAULT_MISMATCH_THRESHOLD;
use crate::sheet::SheetLayout;

/// Settings for one merge run
///
/// Every field has a default, so a JSON file only needs the values it
/// changes:
///
/// ```rust
/// use edfmerge::MergeConfig;
///
/// let config = MergeConfig::from_json(r#"{ "end_tolerance": 0.25, "backup": false }"#)?;
/// assert_eq!(config.end_tolerance, 0.25);
/// assert!(!config.backup);
/// assert_eq!(config.mismatch_threshold, 0.01);
/// assert_eq!(config.sheet.time_column, 2);
/// # Ok::<(), edfmerge::EdfError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Duration mismatch (seconds) below which nothing is repaired
    pub mismatch_threshold: f64,
    /// Slack (seconds) past the end of the recording that still includes an event
    pub end_tolerance: f64,
    /// Patient field value that means "no patient id"
    pub missing_patient_sentinel: String,
    /// 两位年份的世纪分界
    pub century_pivot: u32,
    pub sheet: SheetLayout,
    /// Write status and relative offset back into event sheets
    pub write_back: bool,
    /// Keep the original container under a backup name
    pub backup: bool,
    /// Re-read every written container and compare its duration
    pub verify_output: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            mismatch_threshold: DEFAULT_MISMATCH_THRESHOLD,
            end_tolerance: DEFAULT_END_TOLERANCE,
            missing_patient_sentinel: MISSING_PATIENT_SENTINEL.to_string(),
            century_pivot: DEFAULT_CENTURY_PIVOT,
            sheet: SheetLayout::default(),
            write_back: true,
            backup: true,
            verify_output: true,
        }
    }
}

impl MergeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: MergeConfig = serde_json::from_str(json)
            .map_err(|e| EdfError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EdfError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EdfError::Config(format!("Failed to serialize configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.mismatch_threshold.is_nan() || self.mismatch_threshold < 0.0 {
            return Err(EdfError::Config("mismatch_threshold must be >= 0".to_string()));
        }
        if self.end_tolerance.is_nan() || self.end_tolerance < 0.0 {
            return Err(EdfError::Config("end_tolerance must be >= 0".to_string()));
        }
        if self.century_pivot > 100 {
            return Err(EdfError::Config("century_pivot must be <= 100".to_string()));
        }
        let s = &self.sheet;
        let written = [s.relative_column, s.status_column];
        if s.relative_column == s.status_column
            || written.contains(&s.time_column)
            || written.contains(&s.label_column)
        {
            return Err(EdfError::Config("sheet write-back columns overlap".to_string()));
        }
        Ok(())
    }

    pub fn alignment_policy(&self) -> AlignmentPolicy {
        AlignmentPolicy {
            end_tolerance: self.end_tolerance,
        }
    }

    pub fn naming_policy(&self) -> NamingPolicy {
        NamingPolicy {
            missing_patient_sentinel: self.missing_patient_sentinel.clone(),
            century_pivot: self.century_pivot,
        }
    }
}
