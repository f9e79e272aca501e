//! Time-stamped Annotation Lists (TAL) carried by `EDF Annotations` signals
//!
//! Every data record holds one annotation block. The block starts with a
//! timekeeping TAL `+<record onset>\x14\x14\x00`, followed by one TAL per
//! annotation `+<onset>[\x15<duration>]\x14<description>\x14\x00`, and is
//! zero-padded to the signal's byte size.

use crate::error::Result;
use crate::types::AnnotationRecord;
use crate::utils::parse_edf_time;
use crate::{EDFLIB_MAX_ANNOTATION_LEN, EDFLIB_TIME_DIMENSION};

/// Minimum annotation bytes per data record (matches edflib)
pub const EDFLIB_ANNOTATION_BYTES: usize = 120;

const ANNOTATION_MARK: u8 = 0x14;
const DURATION_MARK: u8 = 0x15;

/// Formats a TAL time stamp with sign and at most 7 decimals
fn format_tal_time(seconds: f64) -> String {
    let body = if seconds.fract() == 0.0 {
        format!("{}", seconds.abs() as i64)
    } else {
        format!("{:.7}", seconds.abs())
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    };
    if seconds < 0.0 {
        format!("-{}", body)
    } else {
        format!("+{}", body)
    }
}

/// Description bytes safe to embed in a TAL
fn tal_description(description: &str) -> Vec<u8> {
    let mut end = description.len().min(EDFLIB_MAX_ANNOTATION_LEN);
    while !description.is_char_boundary(end) {
        end -= 1;
    }
    description[..end]
        .bytes()
        .map(|b| match b {
            0x00 | ANNOTATION_MARK | DURATION_MARK => b' ',
            other => other,
        })
        .collect()
}

/// Builds the annotation block of one data record, without padding
pub fn encode_record_tal(record_onset: f64, annotations: &[&AnnotationRecord]) -> Vec<u8> {
    let mut tal = Vec::with_capacity(EDFLIB_ANNOTATION_BYTES);

    // 时间戳注释
    tal.extend_from_slice(format_tal_time(record_onset).as_bytes());
    tal.push(ANNOTATION_MARK);
    tal.push(ANNOTATION_MARK);
    tal.push(0x00);

    for annotation in annotations {
        tal.extend_from_slice(format_tal_time(annotation.onset).as_bytes());
        // 点事件不写持续时间
        if annotation.duration > 0.0 {
            tal.push(DURATION_MARK);
            tal.extend_from_slice(format_tal_time(annotation.duration)[1..].as_bytes());
        }
        tal.push(ANNOTATION_MARK);
        tal.extend_from_slice(&tal_description(&annotation.description));
        tal.push(ANNOTATION_MARK);
        tal.push(0x00);
    }

    tal
}

/// Distributes annotations over data records and encodes every block
///
/// An annotation belongs to the record whose time span contains its onset.
/// Onsets at or past the end of the last record stay in the last record.
pub fn plan_tal_blocks(
    annotations: &[AnnotationRecord],
    record_duration: f64,
    record_count: usize,
) -> Vec<Vec<u8>> {
    let mut per_record: Vec<Vec<&AnnotationRecord>> = vec![Vec::new(); record_count];

    if record_count > 0 {
        for annotation in annotations {
            let index = if record_duration > 0.0 {
                (annotation.onset / record_duration).floor().max(0.0) as usize
            } else {
                0
            };
            per_record[index.min(record_count - 1)].push(annotation);
        }
    }

    per_record
        .iter()
        .enumerate()
        .map(|(i, items)| encode_record_tal(i as f64 * record_duration, items))
        .collect()
}

/// Contents of one decoded annotation block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TalBlock {
    /// Record onset from the timekeeping TAL, if present
    pub record_onset: Option<f64>,
    pub annotations: Vec<AnnotationRecord>,
    /// TALs skipped because their time stamp could not be read
    pub malformed: usize,
}

fn tal_seconds(raw: &[u8]) -> Result<f64> {
    let text = String::from_utf8_lossy(raw);
    Ok(parse_edf_time(&text)? as f64 / EDFLIB_TIME_DIMENSION as f64)
}

/// Decodes one annotation block
///
/// A TAL whose onset or duration is unreadable is skipped and counted in
/// [`TalBlock::malformed`]; the rest of the block is still decoded.
pub fn decode_tal(block: &[u8]) -> TalBlock {
    let mut decoded = TalBlock::default();

    for tal in block.split(|&b| b == 0x00).filter(|t| !t.is_empty()) {
        let mut fields = tal.split(|&b| b == ANNOTATION_MARK);
        let stamp = match fields.next() {
            Some(stamp) if !stamp.is_empty() => stamp,
            _ => continue,
        };

        let (onset_raw, duration_raw) = match stamp.iter().position(|&b| b == DURATION_MARK) {
            Some(pos) => (&stamp[..pos], Some(&stamp[pos + 1..])),
            None => (stamp, None),
        };

        let times = tal_seconds(onset_raw).and_then(|onset| {
            let duration = match duration_raw {
                Some(raw) if !raw.is_empty() => tal_seconds(raw)?,
                _ => 0.0,
            };
            Ok((onset, duration))
        });
        let (onset, duration) = match times {
            Ok(times) => times,
            Err(_) => {
                decoded.malformed += 1;
                continue;
            }
        };

        let texts: Vec<&[u8]> = fields.filter(|t| !t.is_empty()).collect();
        if texts.is_empty() {
            // 第一个空注释为时间戳注释
            if decoded.record_onset.is_none() {
                decoded.record_onset = Some(onset);
            }
            continue;
        }

        for text in texts {
            decoded.annotations.push(AnnotationRecord {
                onset,
                duration,
                description: String::from_utf8_lossy(text).into_owned(),
            });
        }
    }

    decoded
}
