//! Length-prefixed binary files.
//!
//! Layout: a little-endian `i32` element count followed by that many
//! little-endian elements of the buffer's dtype. Matrix files append `rows`
//! and `cols` as two extra elements of the same dtype, included in the count,
//! so vector and matrix files are not interchangeable.

use std::fs;
use std::path::Path;

use memmap2::Mmap;

use lightmem_core::{Element, ElementType, HostArray, Matrix, MemError, Memory, Result, Vector};

use crate::MatrixData;

const PREFIX_BYTES: usize = 4;

// ── Encoding ────────────────────────────────────────────────────────────

/// Encode `values` with a count prefix.
pub fn encode(values: &HostArray) -> Result<Vec<u8>> {
    let count = i32::try_from(values.len()).map_err(|_| {
        MemError::InvalidArgument(format!("{} elements exceed the i32 count prefix", values.len()))
    })?;
    let mut out = Vec::with_capacity(PREFIX_BYTES + values.len() * values.dtype().size_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    match values {
        HostArray::Int32(v) => write_all(v, &mut out),
        HostArray::Float32(v) => write_all(v, &mut out),
        HostArray::Float64(v) => write_all(v, &mut out),
    }
    Ok(out)
}

/// Encode a column-major matrix with its `rows, cols` trailer.
pub fn encode_matrix(rows: usize, cols: usize, values: &HostArray) -> Result<Vec<u8>> {
    if rows * cols != values.len() {
        return Err(MemError::SizeMismatch {
            expected: rows * cols,
            got: values.len(),
        });
    }
    let dtype = values.dtype();
    let (r, c) = (dim_to_element(rows, dtype)?, dim_to_element(cols, dtype)?);
    let with_trailer = match values {
        HostArray::Int32(v) => with_dims(v, r, c),
        HostArray::Float32(v) => with_dims(v, r, c),
        HostArray::Float64(v) => with_dims(v, r, c),
    };
    encode(&with_trailer)
}

fn write_all<T: Element>(values: &[T], out: &mut Vec<u8>) {
    for &v in values {
        v.write_le(out);
    }
}

fn with_dims<T: Element>(values: &[T], rows: f64, cols: f64) -> HostArray {
    let mut v = Vec::with_capacity(values.len() + 2);
    v.extend_from_slice(values);
    v.push(T::from_f64(rows));
    v.push(T::from_f64(cols));
    T::into_array(v)
}

/// Largest dimension the payload dtype stores exactly.
fn max_dim(dtype: ElementType) -> usize {
    match dtype {
        ElementType::Int32 => i32::MAX as usize,
        ElementType::Float32 => 1 << 24,
        ElementType::Float64 => 1 << 53,
    }
}

fn dim_to_element(dim: usize, dtype: ElementType) -> Result<f64> {
    if dim > max_dim(dtype) {
        return Err(MemError::InvalidArgument(format!(
            "dimension {dim} is not representable as {dtype}"
        )));
    }
    Ok(dim as f64)
}

// ── Decoding ────────────────────────────────────────────────────────────

/// Decode a count-prefixed array of `dtype`.
pub fn decode(bytes: &[u8], dtype: ElementType) -> Result<HostArray> {
    let (prefix, payload) = bytes
        .split_first_chunk::<PREFIX_BYTES>()
        .ok_or_else(|| MemError::Decode(format!("{} bytes is too short for a count prefix", bytes.len())))?;
    let count = i32::from_le_bytes(*prefix);
    let count = usize::try_from(count)
        .map_err(|_| MemError::Decode(format!("negative element count {count}")))?;
    let expected = count * dtype.size_bytes();
    if payload.len() != expected {
        return Err(MemError::Decode(format!(
            "count {count} of {dtype} needs {expected} payload bytes, found {}",
            payload.len()
        )));
    }
    Ok(match dtype {
        ElementType::Int32 => HostArray::Int32(read_all(payload)),
        ElementType::Float32 => HostArray::Float32(read_all(payload)),
        ElementType::Float64 => HostArray::Float64(read_all(payload)),
    })
}

/// Decode a matrix file, popping the `rows, cols` trailer.
pub fn decode_matrix(bytes: &[u8], dtype: ElementType) -> Result<MatrixData> {
    let all = decode(bytes, dtype)?;
    if all.len() < 2 {
        return Err(MemError::Decode(format!(
            "matrix file holds {} elements, missing the shape trailer",
            all.len()
        )));
    }
    let n = all.len() - 2;
    let rows = element_to_dim(all.get_f64(n), dtype)?;
    let cols = element_to_dim(all.get_f64(n + 1), dtype)?;
    if rows.checked_mul(cols) != Some(n) {
        return Err(MemError::Decode(format!(
            "shape {rows}x{cols} does not match {n} payload elements"
        )));
    }
    let data = match all {
        HostArray::Int32(mut v) => {
            v.truncate(n);
            HostArray::Int32(v)
        }
        HostArray::Float32(mut v) => {
            v.truncate(n);
            HostArray::Float32(v)
        }
        HostArray::Float64(mut v) => {
            v.truncate(n);
            HostArray::Float64(v)
        }
    };
    Ok(MatrixData { rows, cols, data })
}

fn read_all<T: Element>(payload: &[u8]) -> Vec<T> {
    payload
        .chunks_exact(T::DTYPE.size_bytes())
        .map(T::read_le)
        .collect()
}

fn element_to_dim(value: Option<f64>, dtype: ElementType) -> Result<usize> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= max_dim(dtype) as f64 => {
            Ok(v as usize)
        }
        other => Err(MemError::Decode(format!("invalid matrix dimension {other:?}"))),
    }
}

// ── Files ───────────────────────────────────────────────────────────────

/// Write the flat contents of `buf`.
pub fn write_binary<M: Memory>(path: &Path, buf: &M) -> Result<()> {
    let bytes = encode(&buf.to_host()?)?;
    tracing::debug!(path = %path.display(), len = buf.len(), dtype = %buf.dtype(), "write binary");
    fs::write(path, bytes)?;
    Ok(())
}

/// Read a flat array of `dtype`.
pub fn read_binary(path: &Path, dtype: ElementType) -> Result<HostArray> {
    decode(&fs::read(path)?, dtype)
}

/// Read a flat array of `dtype` through a memory map.
pub fn read_binary_mmap(path: &Path, dtype: ElementType) -> Result<HostArray> {
    let file = fs::File::open(path)?;
    // SAFETY: The file must not be modified while the mmap is alive; the
    // mapping is dropped before returning.
    let mmap = unsafe { Mmap::map(&file)? };
    decode(&mmap, dtype)
}

/// Overwrite `v`, reallocating when the file length differs.
pub fn read_binary_into(path: &Path, v: &mut Vector) -> Result<()> {
    let data = read_binary(path, v.dtype())?;
    v.read_from_host(&data)
}

/// Write `m` with its shape trailer.
pub fn write_matrix_binary(path: &Path, m: &Matrix) -> Result<()> {
    let bytes = encode_matrix(m.rows(), m.cols(), &m.to_host()?)?;
    tracing::debug!(path = %path.display(), rows = m.rows(), cols = m.cols(), dtype = %m.dtype(), "write matrix binary");
    fs::write(path, bytes)?;
    Ok(())
}

pub fn read_matrix_binary(path: &Path, dtype: ElementType) -> Result<MatrixData> {
    decode_matrix(&fs::read(path)?, dtype)
}

/// Overwrite `m` with the matrix stored at `path`, reshaping as needed.
pub fn read_matrix_binary_into(path: &Path, m: &mut Matrix) -> Result<()> {
    read_matrix_binary(path, m.dtype())?.load_into(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_layout() {
        let bytes = encode(&HostArray::Int32(vec![7, -1])).unwrap();
        assert_eq!(bytes, vec![2, 0, 0, 0, 7, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_matrix_trailer_counted() {
        let bytes = encode_matrix(1, 2, &HostArray::Float32(vec![0.5, 1.5])).unwrap();
        assert_eq!(&bytes[..4], &4i32.to_le_bytes());
        assert_eq!(bytes.len(), 4 + 4 * 4);
        let back = decode_matrix(&bytes, ElementType::Float32).unwrap();
        assert_eq!((back.rows, back.cols), (1, 2));
        assert_eq!(back.data, HostArray::Float32(vec![0.5, 1.5]));
    }

    #[test]
    fn test_vector_file_is_not_a_matrix() {
        let bytes = encode(&HostArray::Float64(vec![1.0, 2.0, 3.0])).unwrap();
        assert!(matches!(
            decode_matrix(&bytes, ElementType::Float64),
            Err(MemError::Decode(_))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = encode(&HostArray::Float64(vec![1.0, 2.0])).unwrap();
        bytes.pop();
        assert!(matches!(decode(&bytes, ElementType::Float64), Err(MemError::Decode(_))));
        assert!(matches!(decode(&[1, 0], ElementType::Int32), Err(MemError::Decode(_))));
        assert!(matches!(
            decode(&(-1i32).to_le_bytes(), ElementType::Int32),
            Err(MemError::Decode(_))
        ));
    }

    #[test]
    fn test_narrow_dims_rejected() {
        let n = (1 << 24) + 1;
        assert!(dim_to_element(n, ElementType::Float32).is_err());
        assert!(dim_to_element(n, ElementType::Float64).is_ok());
        assert!(element_to_dim(Some(2.5), ElementType::Float64).is_err());
        assert!(element_to_dim(Some(-1.0), ElementType::Float64).is_err());
    }
}
