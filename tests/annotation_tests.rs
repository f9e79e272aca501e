use edfmerge::align::{align, align_with, AlignmentPolicy, EventRow, EventStatus, RowRef};
use edfmerge::doctest_utils::eeg_channel;
use edfmerge::reconcile::reconcile;
use edfmerge::tal::EDFLIB_ANNOTATION_BYTES;
use edfmerge::{AnnotationRecord, ContainerEncoder, ContainerHeader, EdfReader, EdfWriter, Recording};

// 创建测试记录的辅助函数
fn test_recording(seconds: usize, rate: usize) -> Recording {
    let samples: Vec<f64> = (0..seconds * rate)
        .map(|i| 30.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / rate as f64).sin())
        .collect();

    Recording {
        header: ContainerHeader {
            patient_id: "ANN001".to_string(),
            start_date: "15.07.85".to_string(),
            start_time: "10.00.00".to_string(),
            record_count: seconds as i64,
            record_duration: 1.0,
            channel_count: 1,
            ..ContainerHeader::default()
        },
        channels: vec![eeg_channel("EEG Test", rate)],
        signals: vec![samples],
    }
}

fn write_and_read(recording: &Recording, annotations: &[AnnotationRecord]) -> EdfReader {
    let mut bytes = Vec::new();
    EdfWriter::new().encode(recording, annotations, &mut bytes).unwrap();
    EdfReader::from_reader(bytes.as_slice()).unwrap()
}

fn row(time: &str, label: &str, index: usize) -> EventRow {
    EventRow::new(time, label, RowRef { source: 0, row: index })
}

#[test]
fn test_basic_annotation_write_read() {
    let recording = test_recording(10, 256);
    let annotations = vec![
        AnnotationRecord::point(0.0, "Recording Start"),
        AnnotationRecord::point(1.5, "Sleep Stage N1"),
        AnnotationRecord::point(3.5, "Eye Movement"),
        AnnotationRecord::point(5.2, "Artifact"),
        AnnotationRecord::point(7.8, "K-Complex"),
    ];

    let reader = write_and_read(&recording, &annotations);
    let read_back = reader.annotations();

    assert_eq!(read_back.len(), annotations.len());
    for (written, read) in annotations.iter().zip(read_back) {
        assert_eq!(read.description, written.description);
        assert!((read.onset - written.onset).abs() < 1e-6);
        assert_eq!(read.duration, 0.0);
    }

    // 注释信号不计入数据信号
    assert_eq!(reader.signal_indices(), vec![0]);
    assert!(reader.channels()[1].is_annotation());
}

#[test]
fn test_annotation_with_duration() {
    let recording = test_recording(3, 100);
    let annotations = vec![AnnotationRecord {
        onset: 0.25,
        duration: 1.5,
        description: "Sleep Stage N2".to_string(),
    }];

    let reader = write_and_read(&recording, &annotations);
    assert_eq!(reader.annotations().len(), 1);
    assert!((reader.annotations()[0].duration - 1.5).abs() < 1e-6);
}

#[test]
fn test_annotation_past_last_record_stays_in_file() {
    let recording = test_recording(2, 100);
    // 起始时间等于记录结束时间
    let annotations = vec![AnnotationRecord::point(2.0, "End")];

    let reader = write_and_read(&recording, &annotations);
    assert_eq!(reader.header().record_count, 2);
    assert_eq!(reader.annotations().len(), 1);
    assert!((reader.annotations()[0].onset - 2.0).abs() < 1e-9);
}

#[test]
fn test_utf8_and_control_bytes_in_description() {
    let recording = test_recording(1, 100);
    let annotations = vec![
        AnnotationRecord::point(0.1, "癫痫发作"),
        AnnotationRecord::point(0.2, "tab\u{14}split"),
    ];

    let reader = write_and_read(&recording, &annotations);
    let read_back = reader.annotations();
    assert_eq!(read_back[0].description, "癫痫发作");
    // 分隔符被替换为空格
    assert_eq!(read_back[1].description, "tab split");
}

#[test]
fn test_many_annotations_in_one_record() {
    let recording = test_recording(1, 100);
    let annotations: Vec<AnnotationRecord> = (0..20)
        .map(|i| AnnotationRecord::point(i as f64 * 0.05, &format!("Event {}", i)))
        .collect();

    let reader = write_and_read(&recording, &annotations);
    assert_eq!(reader.annotations().len(), 20);
    assert!(reader.channels()[1].samples_per_record * 2 > EDFLIB_ANNOTATION_BYTES);
    assert_eq!(reader.read_physical_samples(0).unwrap().len(), 100);
}

#[test]
fn test_aligned_events_survive_encoding() {
    let recording = test_recording(60, 100);
    let state = reconcile(60.0, 60.0, 100.0, 6000);
    let anchor = 10.0 * 3600.0;

    let rows = vec![
        row("10:00:59", "Late", 1),
        row("10:00:05.5", "Early", 2),
        row("10:01:00.05", "Clamped", 3),
    ];
    let alignment = align(&rows, anchor, &state, 60.0);
    assert_eq!(alignment.annotations.len(), 3);

    let reader = write_and_read(&recording, &alignment.annotations);
    let onsets: Vec<f64> = reader.annotations().iter().map(|a| a.onset).collect();
    let labels: Vec<&str> = reader
        .annotations()
        .iter()
        .map(|a| a.description.as_str())
        .collect();

    // 按相对时间排序，越界 0.05 秒的事件被钳制到 60 秒
    assert_eq!(labels, vec!["Early", "Late", "Clamped"]);
    assert!((onsets[0] - 5.5).abs() < 1e-6);
    assert!((onsets[2] - 60.0).abs() < 1e-9);
}

#[test]
fn test_end_tolerance_window() {
    let state = reconcile(60.0, 60.0, 100.0, 6000);
    let rows = vec![
        row("00:01:00.05", "inside tolerance", 1),
        row("00:01:00.2", "outside tolerance", 2),
        row("00:00:00", "at start", 3),
    ];

    let alignment = align(&rows, 0.0, &state, 60.0);
    let statuses = alignment.statuses();
    assert_eq!(statuses[0], (RowRef { source: 0, row: 3 }, EventStatus::Included));
    assert_eq!(statuses[1], (RowRef { source: 0, row: 1 }, EventStatus::Included));
    assert_eq!(statuses[2], (RowRef { source: 0, row: 2 }, EventStatus::ExcludedOutOfRange));
    assert_eq!(alignment.annotations[1].onset, 60.0);

    // 放宽容差后也被接受
    let wide = AlignmentPolicy { end_tolerance: 0.5 };
    let alignment = align_with(&wide, &rows, 0.0, &state, 60.0);
    assert_eq!(alignment.count(EventStatus::Included), 3);
}

#[test]
fn test_zero_padding_boundary() {
    let state = reconcile(10.0, 9.0, 100.0, 900);
    let rows = vec![
        row("00:00:09", "at boundary", 1),
        row("00:00:08.99", "just before", 2),
        row("00:00:09.5", "inside padding", 3),
        row("00:00:12", "past padding", 4),
    ];

    let alignment = align(&rows, 0.0, &state, 10.0);
    let by_row = |index: usize| {
        alignment
            .events
            .iter()
            .find(|e| e.row.row == index)
            .map(|e| e.status)
            .unwrap()
    };

    assert_eq!(by_row(1), EventStatus::ExcludedZeroPadding);
    assert_eq!(by_row(2), EventStatus::Included);
    assert_eq!(by_row(3), EventStatus::ExcludedZeroPadding);
    // 填充区判断优先于范围判断
    assert_eq!(by_row(4), EventStatus::ExcludedZeroPadding);
    assert_eq!(alignment.annotations.len(), 1);
}

#[test]
fn test_events_before_start_are_out_of_range() {
    let state = reconcile(30.0, 30.0, 100.0, 3000);
    let anchor = 23.0 * 3600.0 + 59.0 * 60.0;
    let rows = vec![row("23:58:59.9", "before", 1), row("00:00:10", "next day", 2)];

    let alignment = align(&rows, anchor, &state, 30.0);
    assert!(alignment.annotations.is_empty());
    assert_eq!(alignment.count(EventStatus::ExcludedOutOfRange), 2);
    assert!(alignment.events.iter().all(|e| e.relative_offset < 0.0));
}
