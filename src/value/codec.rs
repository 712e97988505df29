//! Value codec
//!
//! Text encoding of values stored in entry pages.
//!
//! ## Wire Format
//! Whitespace separated tokens, led by a three letter kind tag:
//! ```text
//! NUL
//! SCA <x>
//! VEC <n> <x1> ... <xn>
//! MAT <rows> <cols> <a11> <a12> ... <a_rows_cols>   (row-major)
//! ```

use std::str::SplitWhitespace;

use crate::error::{Result, VarpackError};

use super::{Matrix, Value, ValueKind};

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value to its tagged text form
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = String::from(value.kind().tag());

    match value {
        Value::Null => {}
        Value::Scalar(x) => {
            out.push(' ');
            out.push_str(&x.to_string());
        }
        Value::Vector(items) => {
            out.push_str(&format!(" {}", items.len()));
            push_numbers(&mut out, items);
        }
        Value::Matrix(matrix) => {
            out.push_str(&format!(" {} {}", matrix.rows(), matrix.cols()));
            push_numbers(&mut out, matrix.data());
        }
    }

    out.into_bytes()
}

fn push_numbers(out: &mut String, numbers: &[f64]) {
    for x in numbers {
        out.push(' ');
        out.push_str(&x.to_string());
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a value from its tagged text form
///
/// Trailing zero padding is ignored; any other trailing token is an error.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| VarpackError::Format(format!("value payload is not UTF-8: {}", e)))?;
    let text = text.trim_end_matches('\0');

    let mut tokens = text.split_whitespace();
    let tag = tokens
        .next()
        .ok_or_else(|| VarpackError::Format("empty value payload".to_string()))?;
    let kind = ValueKind::from_tag(tag)
        .ok_or_else(|| VarpackError::Format(format!("unknown value tag '{}'", tag)))?;

    let value = match kind {
        ValueKind::Null => Value::Null,
        ValueKind::Scalar => Value::Scalar(next_number(&mut tokens, "scalar")?),
        ValueKind::Vector => {
            let dim = next_count(&mut tokens, "vector dimension")?;
            Value::Vector(take_numbers(&mut tokens, dim, "vector")?)
        }
        ValueKind::Matrix => {
            let rows = next_count(&mut tokens, "matrix rows")?;
            let cols = next_count(&mut tokens, "matrix columns")?;
            let len = rows.checked_mul(cols).ok_or_else(|| {
                VarpackError::Format(format!("matrix {}x{} is too large", rows, cols))
            })?;
            let data = take_numbers(&mut tokens, len, "matrix")?;
            Value::Matrix(Matrix::new(rows, cols, data)?)
        }
    };

    if let Some(extra) = tokens.next() {
        return Err(VarpackError::Format(format!(
            "unexpected trailing token '{}' after {} value",
            extra,
            kind.tag()
        )));
    }

    Ok(value)
}

fn next_number(tokens: &mut SplitWhitespace<'_>, what: &str) -> Result<f64> {
    let token = tokens
        .next()
        .ok_or_else(|| VarpackError::Format(format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| VarpackError::Format(format!("invalid {} '{}'", what, token)))
}

fn next_count(tokens: &mut SplitWhitespace<'_>, what: &str) -> Result<usize> {
    let token = tokens
        .next()
        .ok_or_else(|| VarpackError::Format(format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| VarpackError::Format(format!("invalid {} '{}'", what, token)))
}

fn take_numbers(tokens: &mut SplitWhitespace<'_>, count: usize, what: &str) -> Result<Vec<f64>> {
    let mut numbers = Vec::with_capacity(count.min(1024));
    for i in 0..count {
        let token = tokens.next().ok_or_else(|| {
            VarpackError::Format(format!("{} expects {} elements, found {}", what, count, i))
        })?;
        let x = token
            .parse()
            .map_err(|_| VarpackError::Format(format!("invalid {} element '{}'", what, token)))?;
        numbers.push(x);
    }
    Ok(numbers)
}
