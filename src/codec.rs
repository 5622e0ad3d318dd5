//! Value codecs for the command protocol.
//!
//! Values travel as unquoted decimal text. Integers are signed 16-bit; floats
//! and doubles are plain decimals with an optional sign. Formatting uses the
//! shortest exact decimal form so that every formatted value parses back to
//! the same bits.

use std::fmt::Write;

// ---------------------------------------------------------------------------
// Kinds and values
// ---------------------------------------------------------------------------

/// Storage kind of a dispatch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kind {
    Void,
    Int16,
    Float,
    Double,
}

/// A converted value, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Void,
    Int16(i16),
    Float(f32),
    Double(f64),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Void => Kind::Void,
            Value::Int16(_) => Kind::Int16,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
        }
    }

    /// Integer representation handed to callbacks. Void is 0.
    pub fn as_int(&self) -> i16 {
        match self {
            Value::Int16(v) => *v,
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse helpers
// ---------------------------------------------------------------------------

/// Parse a signed 16-bit integer: optional `+`/`-`, then decimal digits.
pub fn parse_int16(raw: &str) -> Option<i16> {
    let text = raw.trim();
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<i16>().ok()
}

/// Parse a single-precision decimal. Literals beyond the `f32` range are
/// rejected rather than rounded to infinity.
pub fn parse_float(raw: &str) -> Option<f32> {
    let text = raw.trim();
    if !is_decimal(text) {
        return None;
    }
    text.parse::<f32>().ok().filter(|v| v.is_finite())
}

/// Parse a double-precision decimal.
pub fn parse_double(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if !is_decimal(text) {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert raw text according to `kind`. Void ignores the text.
pub fn convert(kind: Kind, raw: &str) -> Option<Value> {
    match kind {
        Kind::Void => Some(Value::Void),
        Kind::Int16 => parse_int16(raw).map(Value::Int16),
        Kind::Float => parse_float(raw).map(Value::Float),
        Kind::Double => parse_double(raw).map(Value::Double),
    }
}

// ---------------------------------------------------------------------------
// Write helpers
// ---------------------------------------------------------------------------

/// Append the wire text of `value`. Void writes nothing.
pub fn write_value(buf: &mut String, value: Value) {
    // Writing into a String cannot fail.
    let _ = match value {
        Value::Void => Ok(()),
        Value::Int16(v) => write!(buf, "{v}"),
        Value::Float(v) => write!(buf, "{v}"),
        Value::Double(v) => write!(buf, "{v}"),
    };
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

/// `[+-]digits[.digits]` or `[+-].digits`, at least one digit, no exponent.
fn is_decimal(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let mut digits = 0;
    let mut points = 0;
    for b in body.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => points += 1,
            _ => return false,
        }
    }
    digits > 0 && points <= 1
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
