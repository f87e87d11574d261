//! Whitespace-separated text matrices: one line per row.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use lightmem_core::{Element, ElementType, HostArray, Matrix, MemError, Memory, Result};

use crate::MatrixData;

/// Render column-major `data` as `rows` lines of `cols` tokens.
pub fn format_matrix(rows: usize, cols: usize, data: &HostArray) -> Result<String> {
    if rows * cols != data.len() {
        return Err(MemError::SizeMismatch {
            expected: rows * cols,
            got: data.len(),
        });
    }
    Ok(match data {
        HostArray::Int32(v) => format_rows(rows, cols, v),
        HostArray::Float32(v) => format_rows(rows, cols, v),
        HostArray::Float64(v) => format_rows(rows, cols, v),
    })
}

fn format_rows<T: Element>(rows: usize, cols: usize, v: &[T]) -> String {
    let mut out = String::new();
    for i in 0..rows {
        for j in 0..cols {
            if j > 0 {
                out.push(' ');
            }
            // `Display` for numbers is locale-independent and round-trips.
            let _ = write!(out, "{}", v[i + j * rows]);
        }
        out.push('\n');
    }
    out
}

/// Parse text rows into a column-major matrix of `dtype`.
///
/// Blank lines are skipped; every remaining line must hold the same number
/// of tokens.
pub fn parse_matrix(text: &str, dtype: ElementType) -> Result<MatrixData> {
    match dtype {
        ElementType::Int32 => parse_rows::<i32>(text),
        ElementType::Float32 => parse_rows::<f32>(text),
        ElementType::Float64 => parse_rows::<f64>(text),
    }
}

fn parse_rows<T: Element>(text: &str) -> Result<MatrixData> {
    let mut rows: Vec<Vec<T>> = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| {
                T::parse_token(tok).ok_or_else(|| {
                    MemError::Decode(format!(
                        "line {}: cannot parse {tok:?} as {}",
                        lineno + 1,
                        T::DTYPE
                    ))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        if let Some(first) = rows.first()
            && first.len() != row.len()
        {
            return Err(MemError::Decode(format!(
                "line {}: expected {} tokens, found {}",
                lineno + 1,
                first.len(),
                row.len()
            )));
        }
        rows.push(row);
    }
    let (n_rows, n_cols) = (rows.len(), rows.first().map_or(0, Vec::len));
    let mut data = vec![T::default(); n_rows * n_cols];
    for (i, row) in rows.iter().enumerate() {
        for (j, &x) in row.iter().enumerate() {
            data[i + j * n_rows] = x;
        }
    }
    Ok(MatrixData {
        rows: n_rows,
        cols: n_cols,
        data: T::into_array(data),
    })
}

pub fn write_matrix_text(path: &Path, m: &Matrix) -> Result<()> {
    let text = format_matrix(m.rows(), m.cols(), &m.to_host()?)?;
    tracing::debug!(path = %path.display(), rows = m.rows(), cols = m.cols(), "write matrix text");
    fs::write(path, text)?;
    Ok(())
}

pub fn read_matrix_text(path: &Path, dtype: ElementType) -> Result<MatrixData> {
    parse_matrix(&fs::read_to_string(path)?, dtype)
}

/// Overwrite `m` with the text matrix at `path`, reshaping as needed.
pub fn read_matrix_text_into(path: &Path, m: &mut Matrix) -> Result<()> {
    read_matrix_text(path, m.dtype())?.load_into(m)
}
