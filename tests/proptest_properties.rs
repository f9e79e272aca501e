//! Property tests for the header codec, calibration, duration repair and
//! event classification.

use proptest::prelude::*;

use edfmerge::align::{align, EventRow, EventStatus, RowRef};
use edfmerge::header::{encode_channel_headers, encode_header, parse_channel_headers, parse_header};
use edfmerge::reconcile::{apply, reconcile, ReconcileAction};
use edfmerge::scaling::{scale_channel, Calibration};
use edfmerge::{ChannelHeader, ContainerHeader};

fn arb_header() -> impl Strategy<Value = ContainerHeader> {
    (
        "[A-Z0-9_]{0,80}",
        -1i64..99_999_999,
        1u32..100_000,
        0usize..500,
    )
        .prop_map(|(patient, records, duration, channels)| ContainerHeader {
            patient_id: patient,
            record_count: records,
            record_duration: duration as f64 / 100.0,
            channel_count: channels,
            header_bytes: (channels as i64 + 1) * 256,
            ..ContainerHeader::default()
        })
}

fn arb_channel() -> impl Strategy<Value = ChannelHeader> {
    (
        "[A-Za-z0-9 ]{0,16}",
        -9_999i32..0,
        1i32..9_999,
        -32_768i32..0,
        1i32..32_767,
        0usize..100_000,
    )
        .prop_map(|(label, pmin, pmax, dmin, dmax, spr)| ChannelHeader {
            label: label.trim().to_string(),
            physical_min: pmin as f64,
            physical_max: pmax as f64,
            digital_min: dmin,
            digital_max: dmax,
            samples_per_record: spr,
            ..ChannelHeader::default()
        })
}

// 时间格式 HH:MM:SS.mmm，锚点为 0 时相对时间即为秒数
fn clock(millis: u32) -> String {
    let seconds = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60,
        millis % 1000
    )
}

proptest! {
    #[test]
    fn prop_main_header_numeric_fields_survive_encoding(header in arb_header()) {
        let parsed = parse_header(&encode_header(&header));
        prop_assert_eq!(parsed.record_count, header.record_count);
        prop_assert_eq!(parsed.record_duration, header.record_duration);
        prop_assert_eq!(parsed.channel_count, header.channel_count);
        prop_assert_eq!(parsed.header_bytes, header.header_bytes);
        prop_assert_eq!(parsed.patient_id, header.patient_id);
        prop_assert!(parsed.defaults.is_empty());
    }

    #[test]
    fn prop_channel_headers_survive_encoding(channels in proptest::collection::vec(arb_channel(), 1..8)) {
        let block = encode_channel_headers(&channels);
        prop_assert_eq!(block.len(), channels.len() * 256);

        let mut defaults = Vec::new();
        let parsed = parse_channel_headers(&block, channels.len(), &mut defaults);
        prop_assert!(defaults.is_empty());
        prop_assert_eq!(parsed, channels);
    }

    #[test]
    fn prop_identity_calibration_is_exact(samples in proptest::collection::vec(any::<i16>(), 0..512)) {
        let channel = ChannelHeader::default();
        let physical = scale_channel(0, &samples, &channel).unwrap();

        let calibration = Calibration::from_channel(0, &channel).unwrap();
        for (&digital, &value) in samples.iter().zip(&physical) {
            prop_assert_eq!(value, digital as f64);
            prop_assert_eq!(calibration.to_digital(value, -32768, 32767), digital);
        }
    }

    #[test]
    fn prop_small_mismatch_changes_nothing(
        header_duration in 1.0f64..3_600.0,
        jitter in -0.009f64..0.009,
        rate in prop_oneof![Just(100.0f64), Just(128.0), Just(256.0), Just(500.0)],
    ) {
        let measured = header_duration + jitter;
        let current = (measured * rate).round() as usize;
        let state = reconcile(header_duration, measured, rate, current);

        prop_assert_eq!(state.action, ReconcileAction::None);
        prop_assert_eq!(state.target_samples, current);
        prop_assert_eq!(state.zero_padding_start, None);

        let mut signals = vec![vec![1.0; current]];
        apply(&state, &mut signals, &[rate]);
        prop_assert_eq!(signals[0].len(), current);
    }

    #[test]
    fn prop_padding_is_zero(
        records in 2usize..120,
        missing in 1usize..60,
        rate in prop_oneof![Just(1usize), Just(10), Just(100), Just(256)],
    ) {
        let missing = missing.min(records - 1);
        let current = (records - missing) * rate;
        let measured = (records - missing) as f64;

        let state = reconcile(records as f64, measured, rate as f64, current);
        prop_assert_eq!(state.action, ReconcileAction::Pad);
        prop_assert_eq!(state.zero_padding_start, Some(measured));

        let mut signals = vec![vec![7.5; current]];
        apply(&state, &mut signals, &[rate as f64]);
        prop_assert_eq!(signals[0].len(), records * rate);
        prop_assert!(signals[0][..current].iter().all(|&v| v == 7.5));
        prop_assert!(signals[0][current..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn prop_classification_window(
        offsets in proptest::collection::vec(0u32..200_000, 1..40),
        padded in any::<bool>(),
    ) {
        let state = if padded {
            reconcile(120.0, 90.0, 100.0, 9_000)
        } else {
            reconcile(120.0, 120.0, 100.0, 12_000)
        };
        let rows: Vec<EventRow> = offsets
            .iter()
            .enumerate()
            .map(|(i, &ms)| EventRow::new(&clock(ms), "event", RowRef { source: 0, row: i }))
            .collect();

        let alignment = align(&rows, 0.0, &state, 120.0);
        prop_assert_eq!(alignment.events.len(), rows.len());

        for event in &alignment.events {
            let offset = event.relative_offset;
            let expected = if padded && offset >= 90.0 {
                EventStatus::ExcludedZeroPadding
            } else if offset <= 120.0 + 0.1 {
                EventStatus::Included
            } else {
                EventStatus::ExcludedOutOfRange
            };
            prop_assert_eq!(event.status, expected);
        }

        // 注释按时间升序且不超过记录末尾
        let onsets: Vec<f64> = alignment.annotations.iter().map(|a| a.onset).collect();
        prop_assert!(onsets.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(onsets.iter().all(|&t| (0.0..=120.0).contains(&t)));
        prop_assert_eq!(alignment.annotations.len(), alignment.count(EventStatus::Included));
    }
}
