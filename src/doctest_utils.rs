// Internal utilities for documentation tests and integration tests
// Generates small containers on disk

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::header::{encode_channel_headers, encode_header, CHANNEL_HEADER_SIZE, MAIN_HEADER_SIZE};
use crate::{ChannelHeader, ContainerHeader, EdfWriter, Recording, Result};

/// EEG signal calibrated to ±200 uV, `samples_per_record` samples per record
pub fn eeg_channel(label: &str, samples_per_record: usize) -> ChannelHeader {
    ChannelHeader {
        label: label.to_string(),
        transducer: "AgAgCl cup electrodes".to_string(),
        units: "uV".to_string(),
        physical_min: -200.0,
        physical_max: 200.0,
        digital_min: -32768,
        digital_max: 32767,
        prefilter: "HP:0.1Hz LP:70Hz".to_string(),
        samples_per_record,
        reserved: String::new(),
    }
}

/// Creates a 10 second, single signal container with a 10 Hz sine wave
pub fn create_simple_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let channel = eeg_channel("EEG Fp1", 256);

    // 生成 10 秒的 10Hz 正弦波
    let samples: Vec<f64> = (0..2560)
        .map(|i| {
            let t = i as f64 / 256.0;
            50.0 * (2.0 * std::f64::consts::PI * 10.0 * t).sin()
        })
        .collect();

    let recording = Recording {
        header: ContainerHeader {
            patient_id: "5774131".to_string(),
            recording_id: "Startdate 01-JUL-2013".to_string(),
            start_date: "01.07.13".to_string(),
            start_time: "23.59.00".to_string(),
            record_count: 10,
            record_duration: 1.0,
            channel_count: 1,
            ..ContainerHeader::default()
        },
        channels: vec![channel],
        signals: vec![samples],
    };

    EdfWriter::new().write_file(path, &recording, &[])
}

/// Writes a plain container byte for byte: headers, then `data` as given
///
/// `header.header_bytes` and `header.channel_count` are filled in from
/// `channels`; `record_count` is written as given, so a header can declare
/// more records than `data` holds.
pub fn write_raw_container<P: AsRef<Path>>(
    path: P,
    header: &ContainerHeader,
    channels: &[ChannelHeader],
    data: &[i16],
) -> Result<()> {
    let header = ContainerHeader {
        header_bytes: (MAIN_HEADER_SIZE + channels.len() * CHANNEL_HEADER_SIZE) as i64,
        channel_count: channels.len(),
        ..header.clone()
    };

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&encode_header(&header))?;
    out.write_all(&encode_channel_headers(channels))?;
    for sample in data {
        out.write_all(&sample.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}
