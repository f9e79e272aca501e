use std::str::FromStr;

use chrono::{NaiveTime, Timelike};

use crate::error::{EdfError, FieldError, Result};
use crate::types::FieldDefault;

/// Decodes a fixed-width slot as ASCII, dropping any non-ASCII byte
pub fn ascii_field(bytes: &[u8]) -> String {
    let ascii: String = bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();
    ascii.trim().to_string()
}

/// Parses one fixed-width numeric slot
///
/// The locale never matters here: EDF numbers are plain ASCII.
pub fn parse_field<T: FromStr>(raw: &str) -> std::result::Result<T, FieldError> {
    let s = raw.trim();
    s.parse::<T>().map_err(|_| FieldError { raw: s.to_string() })
}

/// Defaulting combinator for header fields
///
/// A failed parse resolves to `T::default()` and leaves a note in `log`,
/// so every defaulted field stays visible to diagnostics.
pub trait FieldResultExt<T> {
    fn or_default_noted(self, field: &str, log: &mut Vec<FieldDefault>) -> T;
}

impl<T: Default> FieldResultExt<T> for std::result::Result<T, FieldError> {
    fn or_default_noted(self, field: &str, log: &mut Vec<FieldDefault>) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                log.push(FieldDefault {
                    field: field.to_string(),
                    raw: err.raw,
                });
                T::default()
            }
        }
    }
}

/// 解析EDF时间字符串为100纳秒单位
pub fn parse_edf_time(s: &str) -> Result<i64> {
    let s = s.trim();

    if s.is_empty() {
        return Err(EdfError::InvalidFormat("Empty time string".to_string()));
    }

    // 处理符号
    let (negative, s) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let mut value = 0i64;

    if let Some(dot_pos) = s.find('.') {
        let integer_part = &s[..dot_pos];
        let decimal_part = &s[dot_pos + 1..];

        if !integer_part.is_empty() {
            value += integer_part
                .parse::<i64>()
                .map_err(|_| EdfError::InvalidFormat("Invalid integer part".to_string()))?
                * crate::EDFLIB_TIME_DIMENSION;
        }

        // 小数部分（最多7位精度）
        if !decimal_part.is_empty() {
            if !decimal_part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(EdfError::InvalidFormat("Invalid decimal part".to_string()));
            }
            let decimal_str = &decimal_part[..decimal_part.len().min(7)];

            let decimal_value = decimal_str
                .parse::<i64>()
                .map_err(|_| EdfError::InvalidFormat("Invalid decimal part".to_string()))?;

            let scale = 10i64.pow(7 - decimal_str.len() as u32);
            value += decimal_value * scale;
        }
    } else {
        value = s
            .parse::<i64>()
            .map_err(|_| EdfError::InvalidFormat("Invalid integer".to_string()))?
            * crate::EDFLIB_TIME_DIMENSION;
    }

    if negative {
        value = -value;
    }

    Ok(value)
}

/// Parses the header start time `hh.mm.ss` into seconds since midnight
///
/// A two-part `hh.mm` means zero seconds. Anything unreadable is `0.0`.
pub fn parse_header_clock(s: &str) -> f64 {
    let parts: Vec<f64> = match s
        .trim()
        .split('.')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        Ok(parts) => parts,
        Err(_) => return 0.0,
    };

    match parts.as_slice() {
        [h, m, sec, ..] => h * 3600.0 + m * 60.0 + sec,
        [h, m] => h * 3600.0 + m * 60.0,
        _ => 0.0,
    }
}

/// Parses a spreadsheet time cell `HH:MM:SS[.fraction]` into seconds since midnight
///
/// Cells exported with a leading date (`2013-07-01 23:59:10.5`) use their
/// last whitespace-separated token. Returns `None` when no clock time is found.
pub fn parse_event_clock(s: &str) -> Option<f64> {
    let token = s.split_whitespace().last()?;
    if !token.contains(':') {
        return None;
    }

    let time = NaiveTime::parse_from_str(token, "%H:%M:%S%.f").ok()?;
    Some(time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 / 1e9)
}

/// Formats a number so that it fits a fixed-width header slot
pub fn format_number_field(value: f64, width: usize) -> String {
    let plain = format!("{}", value);
    if plain.len() <= width {
        return plain;
    }

    for precision in (0..width).rev() {
        let candidate = format!("{:.*}", precision, value);
        let candidate = if candidate.contains('.') {
            candidate.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            candidate
        };
        if candidate.len() <= width {
            return candidate;
        }
    }

    for precision in (0..width).rev() {
        let candidate = format!("{:.*e}", precision, value);
        if candidate.len() <= width {
            return candidate;
        }
    }

    plain.chars().take(width).collect()
}

/// Left-aligned, space-padded ASCII slot of exactly `width` bytes
///
/// Non-ASCII characters become `_`; longer text is cut.
pub fn fixed_ascii(s: &str, width: usize) -> Vec<u8> {
    let mut slot: Vec<u8> = s
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'_' })
        .take(width)
        .collect();
    slot.resize(width, b' ');
    slot
}
