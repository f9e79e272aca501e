use crate::error::{EdfError, Result};
use crate::reader::SampleGrid;
use crate::types::ChannelHeader;

/// Linear digital to physical mapping of one signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calibration {
    /// `value = sample × scale + offset`
    Linear { scale: f64, offset: f64 },
    /// 物理范围为零，直接转换为浮点
    Passthrough,
}

impl Calibration {
    /// Derives the calibration from a signal sub-header
    ///
    /// # Errors
    ///
    /// * `EdfError::DegenerateCalibration` - The physical range is non-empty
    ///   but the digital range is empty
    pub fn from_channel(index: usize, channel: &ChannelHeader) -> Result<Self> {
        if channel.is_passthrough() {
            return Ok(Calibration::Passthrough);
        }

        if channel.digital_max == channel.digital_min {
            return Err(EdfError::DegenerateCalibration {
                channel: index,
                label: channel.label.clone(),
            });
        }

        let scale = (channel.physical_max - channel.physical_min)
            / (channel.digital_max - channel.digital_min) as f64;
        let offset = channel.physical_min - scale * channel.digital_min as f64;

        Ok(Calibration::Linear { scale, offset })
    }

    /// 将数字值转换为物理值
    pub fn to_physical(&self, digital: i16) -> f64 {
        match *self {
            Calibration::Linear { scale, offset } => digital as f64 * scale + offset,
            Calibration::Passthrough => digital as f64,
        }
    }

    /// 将物理值转换为数字值（四舍五入并限制在范围内）
    ///
    /// Pass-through signals are only limited to the `i16` range.
    pub fn to_digital(&self, physical: f64, digital_min: i32, digital_max: i32) -> i16 {
        let (raw, range) = match *self {
            Calibration::Linear { scale, offset } => ((physical - offset) / scale, (digital_min, digital_max)),
            Calibration::Passthrough => (physical, (i16::MIN as i32, i16::MAX as i32)),
        };

        let high = range.0.max(range.1).min(i16::MAX as i32);
        let low = range.0.min(range.1).max(i16::MIN as i32).min(high);
        if raw.is_nan() {
            return 0i32.clamp(low, high) as i16;
        }

        raw.round().clamp(low as f64, high as f64) as i16
    }
}

/// Converts one signal's stored samples to physical values
pub fn scale_channel(index: usize, samples: &[i16], channel: &ChannelHeader) -> Result<Vec<f64>> {
    let calibration = Calibration::from_channel(index, channel)?;
    Ok(samples.iter().map(|&s| calibration.to_physical(s)).collect())
}

/// Converts the decoded part of every row of the grid to physical values
///
/// Row `i` of the result belongs to `channels[i]` and holds exactly the
/// samples of the complete records.
///
/// # Examples
///
/// ```rust
/// use edfmerge::scaling::scale;
/// use edfmerge::reader::decode_records;
/// use edfmerge::{ChannelHeader, ContainerHeader};
///
/// let channel = ChannelHeader {
///     label: "EEG".to_string(),
///     physical_min: -100.0,
///     physical_max: 100.0,
///     digital_min: -1000,
///     digital_max: 1000,
///     samples_per_record: 2,
///     ..ChannelHeader::default()
/// };
/// let header = ContainerHeader { record_count: 1, channel_count: 1, ..ContainerHeader::default() };
///
/// let bytes: Vec<u8> = [500i16, -1000].iter().flat_map(|v| v.to_le_bytes()).collect();
/// let data = decode_records(&mut bytes.as_slice(), &header, &[channel.clone()])?;
///
/// let physical = scale(&data.grid, &[channel])?;
/// assert_eq!(physical[0], vec![50.0, -100.0]);
/// # Ok::<(), edfmerge::EdfError>(())
/// ```
pub fn scale(grid: &SampleGrid, channels: &[ChannelHeader]) -> Result<Vec<Vec<f64>>> {
    channels
        .iter()
        .enumerate()
        .map(|(i, ch)| scale_channel(i, grid.decoded(i), ch))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eeg(pmin: f64, pmax: f64, dmin: i32, dmax: i32) -> ChannelHeader {
        ChannelHeader {
            label: "EEG Fp1".to_string(),
            physical_min: pmin,
            physical_max: pmax,
            digital_min: dmin,
            digital_max: dmax,
            samples_per_record: 1,
            ..ChannelHeader::default()
        }
    }

    #[test]
    fn test_linear_calibration() {
        let cal = Calibration::from_channel(0, &eeg(-3276.8, 3276.7, -32768, 32767)).unwrap();
        match cal {
            Calibration::Linear { scale, offset } => {
                assert!((scale - 0.1).abs() < 1e-12);
                assert!(offset.abs() < 1e-9);
            }
            Calibration::Passthrough => panic!("expected linear calibration"),
        }
        assert!((cal.to_physical(1000) - 100.0).abs() < 1e-9);
        assert!((cal.to_physical(-32768) + 3276.8).abs() < 1e-9);
    }

    #[test]
    fn test_equal_physical_range_is_passthrough() {
        let ch = eeg(5.0, 5.0, 0, 0);
        assert_eq!(Calibration::from_channel(0, &ch).unwrap(), Calibration::Passthrough);
        assert_eq!(scale_channel(0, &[-7, 0, 12], &ch).unwrap(), vec![-7.0, 0.0, 12.0]);
    }

    #[test]
    fn test_degenerate_digital_range() {
        let err = Calibration::from_channel(3, &eeg(-1.0, 1.0, 10, 10)).unwrap_err();
        match err {
            EdfError::DegenerateCalibration { channel, label } => {
                assert_eq!(channel, 3);
                assert_eq!(label, "EEG Fp1");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_to_digital_round_trip_and_clamp() {
        let ch = eeg(-200.0, 200.0, -2000, 2000);
        let cal = Calibration::from_channel(0, &ch).unwrap();

        assert_eq!(cal.to_digital(12.34, ch.digital_min, ch.digital_max), 123);
        assert_eq!(cal.to_digital(0.0, ch.digital_min, ch.digital_max), 0);
        // 超出范围的值被限制
        assert_eq!(cal.to_digital(500.0, ch.digital_min, ch.digital_max), 2000);
        assert_eq!(cal.to_digital(-500.0, ch.digital_min, ch.digital_max), -2000);
    }

    #[test]
    fn test_passthrough_to_digital_clamps_to_i16() {
        let cal = Calibration::Passthrough;
        assert_eq!(cal.to_digital(70000.0, 0, 0), 32767);
        assert_eq!(cal.to_digital(-3.6, 0, 0), -4);
    }
}
