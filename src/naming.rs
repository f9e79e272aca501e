use chrono::{NaiveDate, NaiveTime};

use crate::error::{EdfError, Result};
use crate::types::ContainerHeader;

/// Patient field written by acquisition systems that had no patient on file
pub const MISSING_PATIENT_SENTINEL: &str = "No Database Record";

/// Two-digit years below this belong to the 2000s
pub const DEFAULT_CENTURY_PIVOT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    pub missing_patient_sentinel: String,
    pub century_pivot: u32,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        NamingPolicy {
            missing_patient_sentinel: MISSING_PATIENT_SENTINEL.to_string(),
            century_pivot: DEFAULT_CENTURY_PIVOT,
        }
    }
}

/// Builds `{patient_id}_{YYYYMMDD}_{HHMM}.edf` from the header
///
/// The patient id comes from the header unless it is empty or the
/// `"No Database Record"` sentinel; then the first run of digits directly
/// followed by `_` in `fallback_filename` is used.
///
/// # Errors
///
/// * `EdfError::UnresolvedIdentity` - Neither source yields a patient id
/// * `EdfError::InvalidFormat` - Start date or time is not a valid calendar value
///
/// # Examples
///
/// ```rust
/// use edfmerge::naming::derive_filename;
/// use edfmerge::ContainerHeader;
///
/// let header = ContainerHeader {
///     patient_id: "5774131".to_string(),
///     start_date: "01.07.13".to_string(),
///     start_time: "23.59.00".to_string(),
///     ..ContainerHeader::default()
/// };
/// assert_eq!(derive_filename(&header, "input.edf")?, "5774131_20130701_2359.edf");
/// # Ok::<(), edfmerge::EdfError>(())
/// ```
pub fn derive_filename(header: &ContainerHeader, fallback_filename: &str) -> Result<String> {
    derive_filename_with(&NamingPolicy::default(), header, fallback_filename)
}

pub fn derive_filename_with(
    policy: &NamingPolicy,
    header: &ContainerHeader,
    fallback_filename: &str,
) -> Result<String> {
    let patient = header.patient_id.trim();
    let id = if patient.is_empty() || patient == policy.missing_patient_sentinel {
        fallback_patient_id(fallback_filename)
            .ok_or_else(|| EdfError::UnresolvedIdentity(fallback_filename.to_string()))?
    } else {
        patient.to_string()
    };

    let date = canonical_date(&header.start_date, policy.century_pivot)?;
    let time = canonical_time(&header.start_time)?;

    Ok(format!("{}_{}_{}.edf", id, date, time))
}

/// First run of ASCII digits that is immediately followed by `_`
pub fn fallback_patient_id(filename: &str) -> Option<String> {
    let bytes = filename.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if bytes.get(i) == Some(&b'_') {
            return Some(filename[start..i].to_string());
        }
    }
    None
}

fn numeric_parts(raw: &str, what: &str) -> Result<Vec<u32>> {
    raw.trim()
        .split('.')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| EdfError::InvalidFormat(format!("{} {:?}", what, raw)))
}

/// `dd.mm.yy` → `YYYYMMDD`
pub fn canonical_date(raw: &str, century_pivot: u32) -> Result<String> {
    let parts = numeric_parts(raw, "start date")?;
    let (day, month, year) = match parts[..] {
        [d, m, y] => (d, m, y),
        _ => return Err(EdfError::InvalidFormat(format!("start date {:?}", raw))),
    };

    let year = if year >= 100 {
        year
    } else if year < century_pivot {
        2000 + year
    } else {
        1900 + year
    };

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| EdfError::InvalidFormat(format!("start date {:?}", raw)))?;
    Ok(date.format("%Y%m%d").to_string())
}

/// `hh.mm.ss` → `HHMM`, seconds dropped
pub fn canonical_time(raw: &str) -> Result<String> {
    let parts = numeric_parts(raw, "start time")?;
    let (hour, minute, second) = match parts[..] {
        [h, m, s] => (h, m, s),
        [h, m] => (h, m, 0),
        _ => return Err(EdfError::InvalidFormat(format!("start time {:?}", raw))),
    };

    let time = NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| EdfError::InvalidFormat(format!("start time {:?}", raw)))?;
    Ok(time.format("%H%M").to_string())
}
