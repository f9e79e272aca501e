use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{EdfError, Result};
use crate::header::{encode_channel_headers, encode_header, CHANNEL_HEADER_SIZE, MAIN_HEADER_SIZE};
use crate::scaling::Calibration;
use crate::tal::{plan_tal_blocks, EDFLIB_ANNOTATION_BYTES};
use crate::types::{AnnotationRecord, ChannelHeader, ContainerHeader, Recording, ANNOTATION_LABEL};
use crate::EDFLIB_MAXSIGNALS;

/// Narrow interface for turning a recording plus annotations into bytes
///
/// The merge pipeline only depends on this trait, so a different container
/// flavour can be plugged in without touching the pipeline.
pub trait ContainerEncoder {
    fn encode(
        &self,
        recording: &Recording,
        annotations: &[AnnotationRecord],
        out: &mut dyn Write,
    ) -> Result<()>;
}

/// EDF+ writer that adds one `EDF Annotations` signal to a recording
///
/// The main header and signal sub-headers are written in the same layout
/// they are parsed from (see [`crate::header`]), with the reserved field set
/// to `EDF+C`. Physical values go back through each signal's digital range,
/// clamped. Every data record ends with an annotation block holding the
/// record's timekeeping TAL and the annotations whose onset falls inside it.
///
/// # Examples
///
/// ```rust
/// use edfmerge::{AnnotationRecord, ChannelHeader, ContainerHeader, EdfReader, EdfWriter, Recording};
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("merged.edf");
/// let channel = ChannelHeader {
///     label: "EEG Fp1".to_string(),
///     units: "uV".to_string(),
///     physical_min: -200.0,
///     physical_max: 200.0,
///     digital_min: -32768,
///     digital_max: 32767,
///     samples_per_record: 100,
///     ..ChannelHeader::default()
/// };
/// let recording = Recording {
///     header: ContainerHeader { record_count: 2, channel_count: 1, ..ContainerHeader::default() },
///     channels: vec![channel],
///     signals: vec![vec![0.0; 200]],
/// };
///
/// let events = vec![AnnotationRecord::point(1.5, "Seizure")];
/// EdfWriter::new().write_file(&path, &recording, &events)?;
///
/// let reader = EdfReader::open(&path)?;
/// assert_eq!(reader.header().reserved, "EDF+C");
/// assert_eq!(reader.annotations()[0].description, "Seizure");
/// # Ok::<(), edfmerge::EdfError>(())
/// ```
#[derive(Debug, Clone)]
pub struct EdfWriter {
    min_annotation_bytes: usize,
}

impl Default for EdfWriter {
    fn default() -> Self {
        EdfWriter {
            min_annotation_bytes: EDFLIB_ANNOTATION_BYTES,
        }
    }
}

impl EdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the smallest annotation block per data record (rounded up to even)
    ///
    /// The block grows beyond this when a record holds more annotation text.
    pub fn with_min_annotation_bytes(mut self, bytes: usize) -> Self {
        self.min_annotation_bytes = bytes;
        self
    }

    /// Encodes into a new file, replacing any file at `path`
    pub fn write_file<P: AsRef<Path>>(
        &self,
        path: P,
        recording: &Recording,
        annotations: &[AnnotationRecord],
    ) -> Result<()> {
        let file = File::create(&path)?;
        let mut out = BufWriter::new(file);
        self.encode(recording, annotations, &mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Number of data records needed to hold every signal
    fn record_count(recording: &Recording) -> usize {
        let counts: Vec<usize> = recording
            .channels
            .iter()
            .zip(&recording.signals)
            .filter(|(ch, _)| ch.samples_per_record > 0)
            .map(|(ch, s)| s.len().div_ceil(ch.samples_per_record))
            .collect();

        match counts.iter().max() {
            Some(&n) => n,
            None => recording.header.record_count.max(0) as usize,
        }
    }

    fn annotation_channel(samples_per_record: usize) -> ChannelHeader {
        ChannelHeader {
            label: ANNOTATION_LABEL.to_string(),
            transducer: String::new(),
            units: String::new(),
            physical_min: -1.0,
            physical_max: 1.0,
            digital_min: -32768,
            digital_max: 32767,
            prefilter: String::new(),
            samples_per_record,
            reserved: String::new(),
        }
    }
}

impl ContainerEncoder for EdfWriter {
    fn encode(
        &self,
        recording: &Recording,
        annotations: &[AnnotationRecord],
        out: &mut dyn Write,
    ) -> Result<()> {
        if recording.signals.len() != recording.channels.len() {
            return Err(EdfError::InvalidFormat(format!(
                "{} signals for {} signal headers",
                recording.signals.len(),
                recording.channels.len()
            )));
        }

        if recording.channels.len() + 1 > EDFLIB_MAXSIGNALS {
            return Err(EdfError::InvalidFormat(format!(
                "{} signals exceed the limit of {}",
                recording.channels.len() + 1,
                EDFLIB_MAXSIGNALS
            )));
        }

        let records = Self::record_count(recording);
        let record_duration = recording.header.record_duration;

        let blocks = plan_tal_blocks(annotations, record_duration, records);
        // 注释块大小向上取偶数
        let largest = blocks.iter().map(|b| b.len()).max().unwrap_or(0);
        let annotation_bytes = largest.max(self.min_annotation_bytes).div_ceil(2) * 2;

        let mut channels = recording.channels.clone();
        channels.push(Self::annotation_channel(annotation_bytes / 2));

        let header = ContainerHeader {
            header_bytes: (MAIN_HEADER_SIZE + channels.len() * CHANNEL_HEADER_SIZE) as i64,
            reserved: "EDF+C".to_string(),
            record_count: records as i64,
            channel_count: channels.len(),
            defaults: Vec::new(),
            ..recording.header.clone()
        };

        out.write_all(&encode_header(&header))?;
        out.write_all(&encode_channel_headers(&channels))?;

        let calibrations = recording
            .channels
            .iter()
            .enumerate()
            .map(|(i, ch)| Calibration::from_channel(i, ch))
            .collect::<Result<Vec<_>>>()?;

        let mut buf = Vec::new();
        for (record, block) in blocks.iter().enumerate() {
            buf.clear();

            // 按信号顺序写入每个记录的样本
            for ((ch, signal), calibration) in recording
                .channels
                .iter()
                .zip(&recording.signals)
                .zip(&calibrations)
            {
                let spr = ch.samples_per_record;
                let start = record * spr;
                for k in start..start + spr {
                    let physical = signal.get(k).copied().unwrap_or(0.0);
                    let digital = calibration.to_digital(physical, ch.digital_min, ch.digital_max);
                    buf.extend_from_slice(&digital.to_le_bytes());
                }
            }

            buf.extend_from_slice(block);
            buf.resize(buf.len() + annotation_bytes - block.len(), 0);
            out.write_all(&buf)?;
        }

        debug!(
            records,
            signals = recording.channels.len(),
            annotations = annotations.len(),
            "container encoded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::EdfReader;
    use crate::tal::decode_tal;

    fn test_channel(spr: usize) -> ChannelHeader {
        ChannelHeader {
            label: "EEG C3".to_string(),
            units: "uV".to_string(),
            physical_min: -3276.8,
            physical_max: 3276.7,
            digital_min: -32768,
            digital_max: 32767,
            samples_per_record: spr,
            ..ChannelHeader::default()
        }
    }

    fn test_recording(records: i64, signals: Vec<Vec<f64>>, spr: usize) -> Recording {
        Recording {
            header: ContainerHeader {
                patient_id: "5774131".to_string(),
                record_count: records,
                channel_count: signals.len(),
                ..ContainerHeader::default()
            },
            channels: signals.iter().map(|_| test_channel(spr)).collect(),
            signals,
        }
    }

    #[test]
    fn test_header_layout() {
        let recording = test_recording(3, vec![vec![0.0; 30], vec![0.0; 30]], 10);
        let mut bytes = Vec::new();
        EdfWriter::new().encode(&recording, &[], &mut bytes).unwrap();

        assert_eq!(&bytes[192..197], b"EDF+C");
        assert_eq!(&bytes[184..187], b"1024");
        assert_eq!(&bytes[252..253], b"3");
        assert_eq!(&bytes[256 * 3..256 * 3 + 15], b"EDF Annotations");

        let record_size = 2 * 10 * 2 + EDFLIB_ANNOTATION_BYTES;
        assert_eq!(bytes.len(), 1024 + 3 * record_size);
    }

    #[test]
    fn test_samples_are_interleaved() {
        let a: Vec<f64> = (0..4).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..4).map(|i| -(i as f64)).collect();
        let recording = test_recording(2, vec![a, b], 2);

        let mut bytes = Vec::new();
        EdfWriter::new().encode(&recording, &[], &mut bytes).unwrap();

        let data = &bytes[256 * 3..];
        let first: Vec<i16> = data[..8]
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        // a0 a1 b0 b1，刻度为 0.1
        assert_eq!(first, vec![0, 10, 0, -10]);
    }

    #[test]
    fn test_partial_last_record_is_zero_padded() {
        let recording = test_recording(0, vec![vec![1.0; 25]], 10);
        let mut bytes = Vec::new();
        EdfWriter::new().encode(&recording, &[], &mut bytes).unwrap();

        let reader = EdfReader::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(reader.header().record_count, 3);
        let samples = reader.read_physical_samples(0).unwrap();
        assert_eq!(samples.len(), 30);
        assert!(samples[25..].iter().all(|v| v.abs() < 1e-9));
        assert!((samples[24] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_annotation_block_grows_with_text() {
        let recording = test_recording(1, vec![vec![0.0; 10]], 10);
        let events: Vec<AnnotationRecord> = (0..8)
            .map(|i| AnnotationRecord::point(i as f64 * 0.1, "a fairly long event description"))
            .collect();

        let mut bytes = Vec::new();
        EdfWriter::new().encode(&recording, &events, &mut bytes).unwrap();

        let reader = EdfReader::from_reader(bytes.as_slice()).unwrap();
        let annot = &reader.channels()[1];
        assert!(annot.is_annotation());
        assert!(annot.samples_per_record * 2 > EDFLIB_ANNOTATION_BYTES);
        assert_eq!(reader.annotations().len(), 8);
    }

    #[test]
    fn test_timekeeping_tal_per_record() {
        let recording = test_recording(2, vec![vec![0.0; 20]], 10);
        let mut bytes = Vec::new();
        EdfWriter::new().encode(&recording, &[], &mut bytes).unwrap();

        let record_size = 10 * 2 + EDFLIB_ANNOTATION_BYTES;
        let second = &bytes[768 + record_size..768 + 2 * record_size];
        let decoded = decode_tal(&second[20..]);
        assert_eq!(decoded.record_onset, Some(1.0));
        assert!(decoded.annotations.is_empty());
    }

    #[test]
    fn test_mismatched_signal_count() {
        let mut recording = test_recording(1, vec![vec![0.0; 10]], 10);
        recording.signals.push(vec![0.0; 10]);
        let mut bytes = Vec::new();
        assert!(EdfWriter::new().encode(&recording, &[], &mut bytes).is_err());
    }
}
