//! Decoders for fixed-width column values.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::{
    encoding::read_array,
    types::value::{ColumnType, Value},
};

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const CURRENCY_SCALE: u32 = 4;

/// Day zero of stored date/time values.
pub fn access_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a day count to a timestamp.
///
/// The integer part counts days from the epoch; the fraction is the time of
/// day and is positive even for dates before the epoch.
pub fn decode_datetime(days: f64) -> Option<NaiveDateTime> {
    if !days.is_finite() {
        return None;
    }
    let whole = days.trunc();
    let millis = (days.fract().abs() * MILLIS_PER_DAY).round();
    if whole.abs() > 3_000_000.0 {
        return None;
    }
    let date = access_epoch().checked_add_signed(Duration::days(whole as i64))?;
    date.checked_add_signed(Duration::milliseconds(millis as i64))
}

/// Encode a timestamp as a day count; the inverse of [`decode_datetime`].
pub fn encode_datetime(value: NaiveDateTime) -> f64 {
    let epoch = access_epoch();
    let date_part = value.date().and_hms_opt(0, 0, 0).unwrap_or(value);
    let days = (date_part - epoch).num_days() as f64;
    let fraction = (value - date_part).num_milliseconds() as f64 / MILLIS_PER_DAY;
    if days < 0.0 { days - fraction } else { days + fraction }
}

/// Render a scaled integer as exact decimal text.
pub fn format_scaled(negative: bool, magnitude: u128, scale: u32) -> String {
    let digits = magnitude.to_string();
    let scale = scale as usize;
    let mut text = String::with_capacity(digits.len() + scale + 2);
    if negative && magnitude != 0 {
        text.push('-');
    }
    if scale == 0 {
        text.push_str(&digits);
    } else if digits.len() > scale {
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        text.push_str(int_part);
        text.push('.');
        text.push_str(frac_part);
    } else {
        text.push_str("0.");
        text.push_str(&"0".repeat(scale - digits.len()));
        text.push_str(&digits);
    }
    text
}

/// Currency is an i64 count of ten-thousandths.
pub fn format_currency(raw: i64) -> String {
    format_scaled(raw < 0, raw.unsigned_abs() as u128, CURRENCY_SCALE)
}

/// Numeric values are a sign byte followed by four u32 words, most significant first.
pub fn format_numeric(bytes: &[u8; 17], scale: u8) -> String {
    let negative = bytes[0] != 0;
    let magnitude = bytes[1..]
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as u128)
        .fold(0u128, |acc, word| (acc << 32) | word);
    format_scaled(negative, magnitude, scale as u32)
}

pub fn format_guid(bytes: &[u8; 16]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Decode a fixed-width value of `column_type` from the start of `bytes`.
///
/// Returns `None` when `bytes` is shorter than the type's width, or for
/// types that are not fixed-width. Booleans are not decoded here, their
/// value is a null mask bit.
pub fn decode_fixed(column_type: ColumnType, bytes: &[u8], scale: u8) -> Option<Value> {
    match column_type {
        ColumnType::Byte => read_array::<1>(bytes, 0).map(|b| Value::Integer(b[0] as i64)),
        ColumnType::Int16 => {
            read_array::<2>(bytes, 0).map(|b| Value::Integer(i16::from_le_bytes(b) as i64))
        }
        ColumnType::Int32 | ColumnType::Complex => {
            read_array::<4>(bytes, 0).map(|b| Value::Integer(i32::from_le_bytes(b) as i64))
        }
        ColumnType::Int64 => read_array::<8>(bytes, 0).map(|b| Value::Integer(i64::from_le_bytes(b))),
        ColumnType::Float32 => {
            read_array::<4>(bytes, 0).map(|b| Value::Float(f32::from_le_bytes(b) as f64))
        }
        ColumnType::Float64 => read_array::<8>(bytes, 0).map(|b| Value::Float(f64::from_le_bytes(b))),
        ColumnType::Currency => {
            read_array::<8>(bytes, 0).map(|b| Value::Text(format_currency(i64::from_le_bytes(b))))
        }
        ColumnType::DateTime => read_array::<8>(bytes, 0).map(|b| {
            let days = f64::from_le_bytes(b);
            match decode_datetime(days) {
                Some(timestamp) => Value::DateTime(timestamp),
                None => {
                    log::debug!("Date value {} is out of range, keeping the day count", days);
                    Value::Float(days)
                }
            }
        }),
        ColumnType::Guid => read_array::<16>(bytes, 0).map(|b| Value::Text(format_guid(&b))),
        ColumnType::Numeric => read_array::<17>(bytes, 0).map(|b| Value::Text(format_numeric(&b, scale))),
        ColumnType::Boolean
        | ColumnType::Binary
        | ColumnType::Text
        | ColumnType::Ole
        | ColumnType::Memo
        | ColumnType::Unknown(_) => None,
    }
}
