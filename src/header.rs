//! Fixed-width container header model
//!
//! The container starts with a 256-byte ASCII main header followed by one
//! contiguous 256-byte sub-header per signal. Field positions are fixed:
//!
//! | main header      | bytes     | signal sub-header   | bytes    |
//! |------------------|-----------|---------------------|----------|
//! | version          | 0..8      | label               | 0..16    |
//! | patient id       | 8..88     | transducer          | 16..32   |
//! | recording id     | 88..168   | units               | 32..40   |
//! | start date       | 168..176  | physical min        | 40..48   |
//! | start time       | 176..184  | physical max        | 48..56   |
//! | header bytes     | 184..192  | digital min         | 56..64   |
//! | reserved         | 192..236  | digital max         | 64..72   |
//! | record count     | 236..244  | prefilter           | 72..80   |
//! | record duration  | 244..252  | samples per record  | 80..88   |
//! | signal count     | 252..256  | reserved            | 88..256  |
//!
//! Numeric fields never fail the parse: an unreadable value becomes zero and
//! is listed in [`ContainerHeader::defaults`].

use std::io::Read;
use std::ops::Range;

use crate::error::Result;
use crate::types::{ChannelHeader, ContainerHeader, FieldDefault};
use crate::utils::{ascii_field, fixed_ascii, format_number_field, parse_field, FieldResultExt};

pub const MAIN_HEADER_SIZE: usize = 256;
pub const CHANNEL_HEADER_SIZE: usize = 256;

const VERSION: Range<usize> = 0..8;
const PATIENT: Range<usize> = 8..88;
const RECORDING: Range<usize> = 88..168;
const START_DATE: Range<usize> = 168..176;
const START_TIME: Range<usize> = 176..184;
const HEADER_BYTES: Range<usize> = 184..192;
const RESERVED: Range<usize> = 192..236;
const RECORD_COUNT: Range<usize> = 236..244;
const RECORD_DURATION: Range<usize> = 244..252;
const SIGNAL_COUNT: Range<usize> = 252..256;

const LABEL: Range<usize> = 0..16;
const TRANSDUCER: Range<usize> = 16..32;
const UNITS: Range<usize> = 32..40;
const PHYSICAL_MIN: Range<usize> = 40..48;
const PHYSICAL_MAX: Range<usize> = 48..56;
const DIGITAL_MIN: Range<usize> = 56..64;
const DIGITAL_MAX: Range<usize> = 64..72;
const PREFILTER: Range<usize> = 72..80;
const SAMPLES_PER_RECORD: Range<usize> = 80..88;
const CHANNEL_RESERVED: Range<usize> = 88..256;

/// Slices a field, treating bytes past the end of `bytes` as absent
fn slot(bytes: &[u8], range: Range<usize>) -> String {
    let start = range.start.min(bytes.len());
    let end = range.end.min(bytes.len());
    ascii_field(&bytes[start..end])
}

/// Parses the 256-byte main header
///
/// Only the first 256 bytes of `bytes` are looked at. Missing or
/// non-numeric numeric fields resolve to zero; the parse itself never fails.
///
/// # Examples
///
/// ```rust
/// use edfmerge::header::parse_header;
///
/// let mut raw = vec![b' '; 256];
/// raw[236..238].copy_from_slice(b"10");
/// raw[244..245].copy_from_slice(b"1");
/// raw[252..255].copy_from_slice(b"abc");
///
/// let header = parse_header(&raw);
/// assert_eq!(header.record_count, 10);
/// assert_eq!(header.record_duration, 1.0);
/// assert_eq!(header.channel_count, 0);
/// assert!(header.defaults.iter().any(|d| d.field == "signal_count"));
/// ```
pub fn parse_header(bytes: &[u8]) -> ContainerHeader {
    let bytes = &bytes[..bytes.len().min(MAIN_HEADER_SIZE)];
    let mut defaults = Vec::new();

    let header_bytes = parse_field::<i64>(&slot(bytes, HEADER_BYTES))
        .or_default_noted("header_bytes", &mut defaults);
    let record_count = parse_field::<i64>(&slot(bytes, RECORD_COUNT))
        .or_default_noted("record_count", &mut defaults);
    let record_duration = parse_field::<f64>(&slot(bytes, RECORD_DURATION))
        .or_default_noted("record_duration", &mut defaults);
    let channel_count = parse_field::<usize>(&slot(bytes, SIGNAL_COUNT))
        .or_default_noted("signal_count", &mut defaults);

    ContainerHeader {
        version: slot(bytes, VERSION),
        patient_id: slot(bytes, PATIENT),
        recording_id: slot(bytes, RECORDING),
        start_date: slot(bytes, START_DATE),
        start_time: slot(bytes, START_TIME),
        header_bytes,
        reserved: slot(bytes, RESERVED),
        record_count,
        record_duration,
        channel_count,
        defaults,
    }
}

/// Parses `channel_count` contiguous 256-byte signal sub-headers
///
/// Defaulted fields are appended to `defaults` as `signal[i].<field>`.
pub fn parse_channel_headers(
    bytes: &[u8],
    channel_count: usize,
    defaults: &mut Vec<FieldDefault>,
) -> Vec<ChannelHeader> {
    let mut channels = Vec::with_capacity(channel_count);

    for i in 0..channel_count {
        let start = (i * CHANNEL_HEADER_SIZE).min(bytes.len());
        let end = ((i + 1) * CHANNEL_HEADER_SIZE).min(bytes.len());
        let segment = &bytes[start..end];
        let name = |field: &str| format!("signal[{}].{}", i, field);

        let physical_min = parse_field::<f64>(&slot(segment, PHYSICAL_MIN))
            .or_default_noted(&name("physical_min"), defaults);
        let physical_max = parse_field::<f64>(&slot(segment, PHYSICAL_MAX))
            .or_default_noted(&name("physical_max"), defaults);
        let digital_min = parse_field::<i32>(&slot(segment, DIGITAL_MIN))
            .or_default_noted(&name("digital_min"), defaults);
        let digital_max = parse_field::<i32>(&slot(segment, DIGITAL_MAX))
            .or_default_noted(&name("digital_max"), defaults);
        let samples_per_record = parse_field::<usize>(&slot(segment, SAMPLES_PER_RECORD))
            .or_default_noted(&name("samples_per_record"), defaults);

        channels.push(ChannelHeader {
            label: slot(segment, LABEL),
            transducer: slot(segment, TRANSDUCER),
            units: slot(segment, UNITS),
            physical_min,
            physical_max,
            digital_min,
            digital_max,
            prefilter: slot(segment, PREFILTER),
            samples_per_record,
            reserved: slot(segment, CHANNEL_RESERVED),
        });
    }

    channels
}

/// Reads the main header and all signal sub-headers from a stream
///
/// The stream is left positioned at the first data record. Only I/O
/// failures are errors; a stream that ends inside the header is read as far
/// as it goes and the rest counts as absent.
pub fn read_headers<R: Read>(reader: &mut R) -> Result<(ContainerHeader, Vec<ChannelHeader>)> {
    let mut main = vec![0u8; MAIN_HEADER_SIZE];
    let got = read_full(reader, &mut main)?;
    main.truncate(got);

    let mut header = parse_header(&main);

    let mut block = vec![0u8; header.channel_count * CHANNEL_HEADER_SIZE];
    let got = read_full(reader, &mut block)?;
    block.truncate(got);

    let channels = parse_channel_headers(&block, header.channel_count, &mut header.defaults);
    Ok((header, channels))
}

/// Reads until `buf` is full or the stream ends, returning the byte count
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn put(buf: &mut [u8], range: Range<usize>, text: &str) {
    let width = range.len();
    buf[range].copy_from_slice(&fixed_ascii(text, width));
}

/// Serializes the main header
pub fn encode_header(header: &ContainerHeader) -> [u8; MAIN_HEADER_SIZE] {
    let mut buf = [b' '; MAIN_HEADER_SIZE];

    put(&mut buf, VERSION, &header.version);
    put(&mut buf, PATIENT, &header.patient_id);
    put(&mut buf, RECORDING, &header.recording_id);
    put(&mut buf, START_DATE, &header.start_date);
    put(&mut buf, START_TIME, &header.start_time);
    put(&mut buf, HEADER_BYTES, &header.header_bytes.to_string());
    put(&mut buf, RESERVED, &header.reserved);
    put(&mut buf, RECORD_COUNT, &header.record_count.to_string());
    put(
        &mut buf,
        RECORD_DURATION,
        &format_number_field(header.record_duration, RECORD_DURATION.len()),
    );
    put(&mut buf, SIGNAL_COUNT, &header.channel_count.to_string());

    buf
}

/// Serializes signal sub-headers into one contiguous block
pub fn encode_channel_headers(channels: &[ChannelHeader]) -> Vec<u8> {
    let mut block = Vec::with_capacity(channels.len() * CHANNEL_HEADER_SIZE);

    for channel in channels {
        let mut buf = [b' '; CHANNEL_HEADER_SIZE];
        put(&mut buf, LABEL, &channel.label);
        put(&mut buf, TRANSDUCER, &channel.transducer);
        put(&mut buf, UNITS, &channel.units);
        put(&mut buf, PHYSICAL_MIN, &format_number_field(channel.physical_min, PHYSICAL_MIN.len()));
        put(&mut buf, PHYSICAL_MAX, &format_number_field(channel.physical_max, PHYSICAL_MAX.len()));
        put(&mut buf, DIGITAL_MIN, &channel.digital_min.to_string());
        put(&mut buf, DIGITAL_MAX, &channel.digital_max.to_string());
        put(&mut buf, PREFILTER, &channel.prefilter);
        put(&mut buf, SAMPLES_PER_RECORD, &channel.samples_per_record.to_string());
        put(&mut buf, CHANNEL_RESERVED, &channel.reserved);
        block.extend_from_slice(&buf);
    }

    block
}
