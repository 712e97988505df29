//! Value Module
//!
//! The numeric values a package stores: scalars, vectors and matrices.
//! Arithmetic lives with the calculator; this module only carries the data
//! and its text codec.

mod codec;

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VarpackError};

pub use codec::{decode, encode};

/// Kind tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Scalar,
    Vector,
    Matrix,
}

impl ValueKind {
    /// Three letter tag used in payloads and index lines
    pub fn tag(self) -> &'static str {
        match self {
            ValueKind::Null => "NUL",
            ValueKind::Scalar => "SCA",
            ValueKind::Vector => "VEC",
            ValueKind::Matrix => "MAT",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "NUL" => Some(ValueKind::Null),
            "SCA" => Some(ValueKind::Scalar),
            "VEC" => Some(ValueKind::Vector),
            "MAT" => Some(ValueKind::Matrix),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Dense row-major matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Build from row-major data
    ///
    /// # Errors
    /// `Format` if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(VarpackError::Format(format!(
                "{}x{} matrix needs {} elements, got {}",
                rows,
                cols,
                rows.saturating_mul(cols),
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from a list of equally long rows
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(VarpackError::Format(
                "matrix rows have different lengths".to_string(),
            ));
        }
        let count = rows.len();
        Self::new(count, cols, rows.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    /// Row-major elements
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// A stored calculator value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Present but empty
    Null,
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Matrix),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Vector(_) => ValueKind::Vector,
            Value::Matrix(_) => ValueKind::Matrix,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Tagged text form, see [`encode`]
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self)
    }

    /// Parse the tagged text form, see [`decode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Scalar(x) => write!(f, "{}", x),
            Value::Vector(items) => write_list(f, items),
            Value::Matrix(matrix) => {
                f.write_str("[")?;
                for row in 0..matrix.rows() {
                    if row > 0 {
                        f.write_str(", ")?;
                    }
                    let start = row * matrix.cols();
                    write_list(f, &matrix.data()[start..start + matrix.cols()])?;
                }
                f.write_str("]")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[f64]) -> fmt::Result {
    f.write_str("[")?;
    for (i, x) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", x)?;
    }
    f.write_str("]")
}

impl FromStr for Value {
    type Err = VarpackError;

    /// Accepts the tagged codec form (`SCA 3.4`), `null`, a bare number,
    /// `[1, 2, 3]` or `[[1, 2], [3, 4]]`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let first = s.split_whitespace().next().unwrap_or("");

        if ValueKind::from_tag(first).is_some() {
            return decode(s.as_bytes());
        }
        if s.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }

        let inner = match s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            Some(inner) => inner.trim(),
            None => {
                return s
                    .parse()
                    .map(Value::Scalar)
                    .map_err(|_| VarpackError::Format(format!("cannot parse value '{}'", s)))
            }
        };

        if inner.starts_with('[') {
            let rows = inner
                .split(']')
                .map(|chunk| chunk.trim().trim_start_matches(',').trim())
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| {
                    let row = chunk.strip_prefix('[').ok_or_else(|| {
                        VarpackError::Format(format!("malformed matrix row '{}'", chunk))
                    })?;
                    parse_list(row)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Matrix(Matrix::from_rows(rows)?))
        } else {
            Ok(Value::Vector(parse_list(inner)?))
        }
    }
}

fn parse_list(list: &str) -> Result<Vec<f64>> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse()
                .map_err(|_| VarpackError::Format(format!("invalid number '{}'", token)))
        })
        .collect()
}
