use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{DecodeWarning, EdfError, Result};
use crate::header::{read_full, read_headers, CHANNEL_HEADER_SIZE, MAIN_HEADER_SIZE};
use crate::scaling::scale_channel;
use crate::tal::decode_tal;
use crate::types::{AnnotationRecord, ChannelHeader, ContainerHeader};

/// Stored samples of every signal, one row per signal
///
/// Rows are pre-sized to the widest signal (`record_count ×
/// samples_per_record`, with the record count capped by the stream length
/// when it is known); a signal with fewer samples is zero beyond its own
/// length. Only the first [`complete_records`](Self::complete_records)
/// records of each row were actually read from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    rows: Vec<Vec<i16>>,
    samples_per_record: Vec<usize>,
    complete_records: usize,
}

impl SampleGrid {
    /// Zero grid sized for `record_count` records of `channels`
    pub fn new(channels: &[ChannelHeader], record_count: usize) -> Self {
        let width = channels
            .iter()
            .map(|c| c.samples_per_record * record_count)
            .max()
            .unwrap_or(0);

        SampleGrid {
            rows: vec![vec![0i16; width]; channels.len()],
            samples_per_record: channels.iter().map(|c| c.samples_per_record).collect(),
            complete_records: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.rows.len()
    }

    /// Allocated samples per row
    pub fn width(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    /// Whole row of a signal, including zero fill
    pub fn row(&self, channel: usize) -> &[i16] {
        &self.rows[channel]
    }

    /// Number of records read completely for every signal
    pub fn complete_records(&self) -> usize {
        self.complete_records
    }

    /// Samples of a signal covered by the complete records
    pub fn decoded(&self, channel: usize) -> &[i16] {
        let len = (self.complete_records * self.samples_per_record[channel]).min(self.rows[channel].len());
        &self.rows[channel][..len]
    }

    /// Raw little-endian bytes of a signal's decoded samples
    pub fn decoded_bytes(&self, channel: usize) -> Vec<u8> {
        self.decoded(channel)
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }
}

/// Result of decoding the data records
#[derive(Debug, Clone)]
pub struct DecodedData {
    pub grid: SampleGrid,
    pub warnings: Vec<DecodeWarning>,
}

/// Decodes all data records from a stream positioned after the headers
///
/// Every record holds, for each signal in header order, `samples_per_record`
/// little-endian `i16` values. A block cut short by the end of the stream is
/// dropped (its grid region stays zero) and decoding stops there. A record
/// count of `-1` means "unknown": records are read until the stream ends.
///
/// Only I/O errors fail the decode.
pub fn decode_records<R: Read>(
    reader: &mut R,
    header: &ContainerHeader,
    channels: &[ChannelHeader],
) -> Result<DecodedData> {
    decode_records_capped(reader, header, channels, None)
}

/// Like [`decode_records`], for a stream known to hold `available` data bytes
///
/// The grid is pre-sized to the records those bytes can hold (a partial
/// last record counts), not to the declared count, so a corrupt record
/// count cannot force a huge allocation. Records the stream lacks are
/// reported as truncation just the same.
pub fn decode_records_capped<R: Read>(
    reader: &mut R,
    header: &ContainerHeader,
    channels: &[ChannelHeader],
    available: Option<u64>,
) -> Result<DecodedData> {
    let unknown_length = header.record_count < 0;
    let declared = header.record_count.max(0) as usize;
    let record_bytes: usize = channels.iter().map(|c| c.samples_per_record * 2).sum();

    let presized = match available {
        Some(bytes) if record_bytes > 0 => {
            let fits = bytes.div_ceil(record_bytes as u64);
            declared.min(usize::try_from(fits).unwrap_or(usize::MAX))
        }
        _ => declared,
    };
    if presized < declared {
        debug!(declared, presized, "record count exceeds the data in the stream");
    }
    let mut grid = SampleGrid::new(channels, presized);
    let mut warnings = Vec::new();

    if record_bytes == 0 {
        debug!("no signal declares samples, nothing to decode");
        return Ok(DecodedData { grid, warnings });
    }

    let mut record = 0usize;
    'records: while unknown_length || record < declared {
        if unknown_length {
            // 未知记录数时按需扩展网格
            for (row, spr) in grid.rows.iter_mut().zip(&grid.samples_per_record) {
                let needed = (record + 1) * spr;
                if row.len() < needed {
                    row.resize(needed, 0);
                }
            }
            let width = grid.rows.iter().map(|r| r.len()).max().unwrap_or(0);
            for row in grid.rows.iter_mut() {
                row.resize(width, 0);
            }
        }

        let mut record_started = false;
        for (channel, ch) in channels.iter().enumerate() {
            let spr = ch.samples_per_record;
            if spr == 0 {
                continue;
            }

            let mut buf = vec![0u8; spr * 2];
            let got = read_full(reader, &mut buf)?;

            if got < buf.len() {
                if unknown_length && got == 0 && !record_started {
                    // 正常结束
                    trim_rows(&mut grid, record);
                    break 'records;
                }
                let warning = DecodeWarning::TruncatedStream {
                    record,
                    channel,
                    expected: spr,
                    got: got / 2,
                };
                warn!("{}", warning);
                warnings.push(warning);
                if unknown_length {
                    trim_rows(&mut grid, record);
                }
                break 'records;
            }
            record_started = true;

            let start = record * spr;
            let row = &mut grid.rows[channel];
            if start + spr > row.len() {
                let warning = DecodeWarning::GridOverflow { record, channel };
                warn!("{}", warning);
                warnings.push(warning);
                continue;
            }

            for (slot, pair) in row[start..start + spr].iter_mut().zip(buf.chunks_exact(2)) {
                *slot = i16::from_le_bytes([pair[0], pair[1]]);
            }
        }

        record += 1;
        grid.complete_records = record;
    }

    debug!(
        records = grid.complete_records,
        declared = header.record_count,
        "data records decoded"
    );

    Ok(DecodedData { grid, warnings })
}

/// Shrinks grown rows back to the records actually read
fn trim_rows(grid: &mut SampleGrid, records: usize) {
    let width = grid
        .samples_per_record
        .iter()
        .map(|spr| spr * records)
        .max()
        .unwrap_or(0);
    for row in grid.rows.iter_mut() {
        row.truncate(width);
    }
}

/// Reader that loads a whole container into memory
///
/// # Examples
///
/// ```rust
/// use edfmerge::EdfReader;
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("recording.edf");
/// # edfmerge::doctest_utils::create_simple_test_file(&path)?;
/// let reader = EdfReader::open(&path)?;
///
/// println!("Signals: {}", reader.signal_indices().len());
/// println!("Measured duration: {:.1} s", reader.measured_duration());
///
/// let samples = reader.read_physical_samples(0)?;
/// assert_eq!(samples.len(), 10 * 256);
/// # Ok::<(), edfmerge::EdfError>(())
/// ```
pub struct EdfReader {
    header: ContainerHeader,
    channels: Vec<ChannelHeader>,
    data: DecodedData,
    annotations: Vec<AnnotationRecord>,
}

impl EdfReader {
    /// Opens and fully decodes a container file
    ///
    /// # Errors
    ///
    /// * `EdfError::FileNotFound` - File doesn't exist or can't be opened
    /// * `EdfError::Io` - Reading failed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)
            .map_err(|e| EdfError::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;
        let file_len = file.metadata()?.len();

        Self::decode(BufReader::new(file), Some(file_len))
    }

    /// Decodes a container from any byte stream
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::decode(reader, None)
    }

    fn decode<R: Read>(mut reader: R, stream_len: Option<u64>) -> Result<Self> {
        let (header, channels) = read_headers(&mut reader)?;
        let header_len = (MAIN_HEADER_SIZE + channels.len() * CHANNEL_HEADER_SIZE) as u64;
        let available = stream_len.map(|len| len.saturating_sub(header_len));
        let mut data = decode_records_capped(&mut reader, &header, &channels, available)?;

        let mut annotations = Vec::new();
        for (i, ch) in channels.iter().enumerate() {
            if !ch.is_annotation() {
                continue;
            }
            let bytes = data.grid.decoded_bytes(i);
            let block_size = ch.samples_per_record * 2;
            for (record, block) in bytes.chunks(block_size.max(1)).enumerate() {
                let mut decoded = decode_tal(block);
                if decoded.malformed > 0 {
                    let warning = DecodeWarning::MalformedAnnotation {
                        record,
                        channel: i,
                        skipped: decoded.malformed,
                    };
                    warn!("{}", warning);
                    data.warnings.push(warning);
                }
                annotations.append(&mut decoded.annotations);
            }
        }

        Ok(EdfReader {
            header,
            channels,
            data,
            annotations,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// All signal sub-headers, annotation signals included
    pub fn channels(&self) -> &[ChannelHeader] {
        &self.channels
    }

    /// Indices of the signals that carry samples (annotation signals excluded)
    pub fn signal_indices(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| !ch.is_annotation())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn grid(&self) -> &SampleGrid {
        &self.data.grid
    }

    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.data.warnings
    }

    /// Annotations found in `EDF Annotations` signals
    pub fn annotations(&self) -> &[AnnotationRecord] {
        &self.annotations
    }

    /// First sample-carrying signal with a non-zero sample count
    pub fn reference_channel(&self) -> Option<usize> {
        self.signal_indices()
            .into_iter()
            .find(|&i| self.channels[i].samples_per_record > 0)
    }

    /// Duration covered by the records actually decoded, in seconds
    pub fn measured_duration(&self) -> f64 {
        self.data.grid.complete_records() as f64 * self.header.record_duration
    }

    /// Decoded digital samples of one signal
    pub fn read_digital_samples(&self, signal: usize) -> Result<&[i16]> {
        if signal >= self.channels.len() {
            return Err(EdfError::InvalidSignalIndex(signal));
        }
        Ok(self.data.grid.decoded(signal))
    }

    /// Decoded samples of one signal in physical units
    pub fn read_physical_samples(&self, signal: usize) -> Result<Vec<f64>> {
        let digital = self.read_digital_samples(signal)?;
        scale_channel(signal, digital, &self.channels[signal])
    }

    /// Hands out the decoded parts, consuming the reader
    pub fn into_parts(self) -> (ContainerHeader, Vec<ChannelHeader>, DecodedData) {
        (self.header, self.channels, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn channel(spr: usize) -> ChannelHeader {
        ChannelHeader {
            label: "EEG".to_string(),
            samples_per_record: spr,
            ..ChannelHeader::default()
        }
    }

    fn header(records: i64, channels: usize) -> ContainerHeader {
        ContainerHeader {
            record_count: records,
            record_duration: 1.0,
            channel_count: channels,
            ..ContainerHeader::default()
        }
    }

    fn le(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_interleaved_records_with_mixed_rates() {
        let channels = vec![channel(2), channel(1)];
        // record 0: a0 a1 | b0, record 1: a2 a3 | b1
        let bytes = le(&[1, 2, 100, 3, 4, 200]);

        let data = decode_records(&mut Cursor::new(bytes), &header(2, 2), &channels).unwrap();
        assert!(data.warnings.is_empty());
        assert_eq!(data.grid.width(), 4);
        assert_eq!(data.grid.row(0), &[1, 2, 3, 4]);
        assert_eq!(data.grid.row(1), &[100, 200, 0, 0]);
        assert_eq!(data.grid.decoded(1), &[100, 200]);
        assert_eq!(data.grid.complete_records(), 2);
    }

    #[test]
    fn test_zero_rate_channel_is_skipped() {
        let channels = vec![channel(0), channel(2)];
        let bytes = le(&[7, 8, 9, 10]);

        let data = decode_records(&mut Cursor::new(bytes), &header(2, 2), &channels).unwrap();
        assert_eq!(data.grid.row(0), &[0, 0, 0, 0]);
        assert_eq!(data.grid.row(1), &[7, 8, 9, 10]);
    }

    #[test]
    fn test_truncated_stream_leaves_zeros() {
        let channels = vec![channel(2)];
        // 第三个记录只有一个样本
        let bytes = le(&[1, 2, 3, 4, 5]);

        let data = decode_records(&mut Cursor::new(bytes), &header(3, 1), &channels).unwrap();
        assert_eq!(data.grid.row(0), &[1, 2, 3, 4, 0, 0]);
        assert_eq!(data.grid.complete_records(), 2);
        assert_eq!(
            data.warnings,
            vec![DecodeWarning::TruncatedStream {
                record: 2,
                channel: 0,
                expected: 2,
                got: 1
            }]
        );
    }

    #[test]
    fn test_unknown_record_count_reads_to_end() {
        let channels = vec![channel(2), channel(1)];
        let bytes = le(&[1, 2, 10, 3, 4, 20, 5, 6, 30]);

        let data = decode_records(&mut Cursor::new(bytes), &header(-1, 2), &channels).unwrap();
        assert!(data.warnings.is_empty());
        assert_eq!(data.grid.complete_records(), 3);
        assert_eq!(data.grid.row(0), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(data.grid.decoded(1), &[10, 20, 30]);
    }

    #[test]
    fn test_corrupt_record_count_is_capped_by_stream() {
        let channels = vec![channel(2)];
        let bytes = le(&[1, 2, 3, 4, 5]);
        let available = bytes.len() as u64;

        let data = decode_records_capped(&mut Cursor::new(bytes), &header(99_999_999, 1), &channels, Some(available))
            .unwrap();
        // 10 字节只够 2.5 个记录
        assert_eq!(data.grid.width(), 6);
        assert_eq!(data.grid.complete_records(), 2);
        assert_eq!(
            data.warnings,
            vec![DecodeWarning::TruncatedStream {
                record: 2,
                channel: 0,
                expected: 2,
                got: 1
            }]
        );
    }

    #[test]
    fn test_open_caps_grid_to_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt_count.edf");
        let header = ContainerHeader {
            record_count: 99_999_999,
            ..header(0, 1)
        };
        crate::doctest_utils::write_raw_container(&path, &header, &[channel(100)], &[7; 300]).unwrap();

        let reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.grid().width(), 300);
        assert_eq!(reader.grid().complete_records(), 3);
        assert_eq!(reader.read_digital_samples(0).unwrap().len(), 300);
        assert!(matches!(
            reader.warnings(),
            [DecodeWarning::TruncatedStream { record: 3, got: 0, .. }]
        ));
    }

    #[test]
    fn test_malformed_annotation_is_a_warning() {
        let mut tal = b"+0\x14\x14\x00+x\x14junk\x14\x00".to_vec();
        tal.resize(20, 0);
        let mut second = b"+1\x14\x14\x00+1.5\x14Blink\x14\x00".to_vec();
        second.resize(20, 0);

        let annotation = ChannelHeader {
            label: "EDF Annotations".to_string(),
            samples_per_record: 10,
            ..ChannelHeader::default()
        };
        let channels = vec![channel(2), annotation];
        let header = ContainerHeader {
            header_bytes: 768,
            ..header(2, 2)
        };

        let mut bytes = crate::header::encode_header(&header).to_vec();
        bytes.extend(crate::header::encode_channel_headers(&channels));
        for block in [&tal, &second] {
            bytes.extend(le(&[1, 2]));
            bytes.extend_from_slice(block);
        }

        let reader = EdfReader::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(reader.annotations().len(), 1);
        assert_eq!(reader.annotations()[0].description, "Blink");
        assert_eq!(
            reader.warnings(),
            &[DecodeWarning::MalformedAnnotation {
                record: 0,
                channel: 1,
                skipped: 1
            }]
        );
        assert_eq!(reader.read_digital_samples(0).unwrap(), &[1, 2, 1, 2]);
    }

    #[test]
    fn test_empty_signal_list() {
        let data = decode_records(&mut Cursor::new(Vec::new()), &header(5, 0), &[]).unwrap();
        assert_eq!(data.grid.channel_count(), 0);
        assert_eq!(data.grid.width(), 0);
    }
}
