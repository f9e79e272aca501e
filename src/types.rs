use crate::utils::parse_header_clock;

/// Label that marks a signal as an EDF+ annotation channel
pub const ANNOTATION_LABEL: &str = "EDF Annotations";

/// A numeric header field that was replaced by its zero default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefault {
    /// Field name, prefixed with the signal index for sub-header fields
    /// (e.g. `signal[2].digital_min`)
    pub field: String,
    /// Raw text found in the fixed-width slot
    pub raw: String,
}

/// Main 256-byte container header
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHeader {
    pub version: String,
    pub patient_id: String,
    pub recording_id: String,
    /// 开始日期 "dd.mm.yy"
    pub start_date: String,
    /// 开始时间 "hh.mm.ss"
    pub start_time: String,
    pub header_bytes: i64,
    pub reserved: String,
    /// 数据记录数，-1 表示未知
    pub record_count: i64,
    /// 每个数据记录的持续时间（秒）
    pub record_duration: f64,
    pub channel_count: usize,
    /// Numeric fields that fell back to their defaults while parsing
    pub defaults: Vec<FieldDefault>,
}

impl ContainerHeader {
    /// Duration declared by the header (`record_count × record_duration`).
    ///
    /// Returns `None` when the record count is unknown (negative).
    pub fn declared_duration(&self) -> Option<f64> {
        if self.record_count < 0 {
            None
        } else {
            Some(self.record_count as f64 * self.record_duration)
        }
    }

    /// Start-of-day of the recording in seconds, the anchor for event offsets
    pub fn anchor_seconds(&self) -> f64 {
        parse_header_clock(&self.start_time)
    }

    /// Total size of main header plus sub-headers for this channel count
    pub fn expected_header_bytes(&self) -> i64 {
        (self.channel_count as i64 + 1) * 256
    }
}

impl Default for ContainerHeader {
    fn default() -> Self {
        ContainerHeader {
            version: "0".to_string(),
            patient_id: String::new(),
            recording_id: String::new(),
            start_date: "01.01.85".to_string(),
            start_time: "00.00.00".to_string(),
            header_bytes: 256,
            reserved: String::new(),
            record_count: 0,
            record_duration: 1.0,
            channel_count: 0,
            defaults: Vec::new(),
        }
    }
}

/// Per-signal 256-byte sub-header
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelHeader {
    pub label: String,
    pub transducer: String,
    pub units: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefilter: String,
    pub samples_per_record: usize,
    pub reserved: String,
}

impl ChannelHeader {
    /// Whether this signal carries EDF+ annotation lists instead of samples
    pub fn is_annotation(&self) -> bool {
        self.label.trim() == ANNOTATION_LABEL
    }

    /// 采样率 (Hz)
    pub fn sample_rate(&self, record_duration: f64) -> f64 {
        self.samples_per_record as f64 / record_duration
    }

    /// Whether physical scaling is skipped for this signal
    pub fn is_passthrough(&self) -> bool {
        self.physical_max == self.physical_min
    }
}

impl Default for ChannelHeader {
    fn default() -> Self {
        ChannelHeader {
            label: String::new(),
            transducer: String::new(),
            units: String::new(),
            physical_min: -32768.0,
            physical_max: 32767.0,
            digital_min: -32768,
            digital_max: 32767,
            prefilter: String::new(),
            samples_per_record: 0,
            reserved: String::new(),
        }
    }
}

/// A point annotation on the relative time axis
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    /// 开始时间（秒，相对于记录开始）
    pub onset: f64,
    /// 持续时间（秒），事件注释始终为 0
    pub duration: f64,
    pub description: String,
}

impl AnnotationRecord {
    pub fn point(onset: f64, description: &str) -> Self {
        AnnotationRecord {
            onset,
            duration: 0.0,
            description: description.to_string(),
        }
    }
}

/// A decoded, calibrated recording ready to be re-encoded
///
/// `signals[i]` holds the physical values of `channels[i]`. Annotation
/// channels are never part of `channels`.
#[derive(Debug, Clone)]
pub struct Recording {
    pub header: ContainerHeader,
    pub channels: Vec<ChannelHeader>,
    pub signals: Vec<Vec<f64>>,
}
