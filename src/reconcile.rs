//! Repair of the mismatch between declared and measured duration
//!
//! The header says how long the recording is (`record_count ×
//! record_duration`); the decoded samples say how long it really is. When the
//! two disagree by more than the mismatch threshold, every signal is padded
//! with zeros or truncated so that it covers exactly the declared duration.
//!
//! Nothing in here logs or touches files.

/// Largest duration difference (seconds) that is left alone
pub const DEFAULT_MISMATCH_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    None,
    /// 补零到目标长度
    Pad,
    /// 截断到目标长度
    Truncate,
}

/// Outcome of comparing declared and measured duration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationState {
    pub header_duration: f64,
    pub measured_duration: f64,
    /// `|measured - header|`
    pub delta: f64,
    pub action: ReconcileAction,
    /// Sample count of the reference signal before reconciliation
    pub current_samples: usize,
    /// Sample count of the reference signal afterwards
    pub target_samples: usize,
    /// Relative second where synthetic zeros begin; set only when padding
    pub zero_padding_start: Option<f64>,
}

impl ReconciliationState {
    pub fn is_padding(&self) -> bool {
        self.action == ReconcileAction::Pad
    }

    /// Whether applying this state changes any sample
    pub fn changes_samples(&self) -> bool {
        self.action != ReconcileAction::None
    }
}

/// Decides how to reconcile with the default 0.01 s threshold
///
/// `sample_rate` and `current_sample_count` describe the reference signal.
///
/// # Examples
///
/// ```rust
/// use edfmerge::reconcile::{reconcile, ReconcileAction};
///
/// // 10 records of 1 s declared, only 9 s of 100 Hz samples present
/// let state = reconcile(10.0, 9.0, 100.0, 900);
/// assert_eq!(state.action, ReconcileAction::Pad);
/// assert_eq!(state.target_samples, 1000);
/// assert_eq!(state.zero_padding_start, Some(9.0));
/// ```
pub fn reconcile(
    header_duration: f64,
    measured_duration: f64,
    sample_rate: f64,
    current_sample_count: usize,
) -> ReconciliationState {
    reconcile_with(
        DEFAULT_MISMATCH_THRESHOLD,
        header_duration,
        measured_duration,
        sample_rate,
        current_sample_count,
    )
}

/// Same as [`reconcile`] with an explicit mismatch threshold
pub fn reconcile_with(
    threshold: f64,
    header_duration: f64,
    measured_duration: f64,
    sample_rate: f64,
    current_sample_count: usize,
) -> ReconciliationState {
    let delta = (measured_duration - header_duration).abs();

    let mut state = ReconciliationState {
        header_duration,
        measured_duration,
        delta,
        action: ReconcileAction::None,
        current_samples: current_sample_count,
        target_samples: current_sample_count,
        zero_padding_start: None,
    };

    if delta <= threshold {
        return state;
    }

    let target = target_samples(header_duration, sample_rate);
    if target > current_sample_count {
        state.action = ReconcileAction::Pad;
        state.target_samples = target;
        state.zero_padding_start = Some(measured_duration);
    } else if target < current_sample_count {
        state.action = ReconcileAction::Truncate;
        state.target_samples = target;
    }

    state
}

/// `round(duration × rate)`, never negative
pub fn target_samples(duration: f64, sample_rate: f64) -> usize {
    let target = (duration * sample_rate).round();
    if target.is_finite() && target > 0.0 {
        target as usize
    } else {
        0
    }
}

/// Resizes every signal to cover the declared duration
///
/// `rates[i]` is the sample rate of `signals[i]`. Each signal becomes exactly
/// `round(header_duration × rate)` samples long; padding appends zeros. A
/// state whose action is `None` leaves the signals untouched.
pub fn apply(state: &ReconciliationState, signals: &mut [Vec<f64>], rates: &[f64]) {
    if !state.changes_samples() {
        return;
    }

    for (signal, &rate) in signals.iter_mut().zip(rates) {
        let target = target_samples(state.header_duration, rate);
        signal.resize(target, 0.0);
    }
}

/// Duration covered by `sample_count` samples at `sample_rate`
pub fn final_duration(sample_count: usize, sample_rate: f64) -> f64 {
    if sample_rate > 0.0 {
        sample_count as f64 / sample_rate
    } else {
        0.0
    }
}
