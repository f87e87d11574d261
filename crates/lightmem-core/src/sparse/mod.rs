//! Dense ↔ sparse compression.
//!
//! Sparse containers own their backing dense vectors (values and Int32
//! indices) in the same space and context as the dense source. Their
//! descriptors are derived from those vectors on every call, so they always
//! reflect the current allocations.

pub mod csr;
pub mod vector;

pub use csr::CsrMatrix;
pub use vector::SparseVector;

use crate::types::HostArray;
use crate::{MemError, Result};

/// Positions (in iteration order) and values of entries with `|x| > threshold`.
fn gather(dense: &HostArray, order: impl Iterator<Item = usize>, threshold: f64) -> (Vec<usize>, HostArray) {
    fn keep<T: Copy>(
        v: &[T],
        order: impl Iterator<Item = usize>,
        pred: impl Fn(T) -> bool,
    ) -> (Vec<usize>, Vec<T>) {
        let mut positions = Vec::new();
        let mut values = Vec::new();
        for i in order {
            if pred(v[i]) {
                positions.push(i);
                values.push(v[i]);
            }
        }
        (positions, values)
    }
    match dense {
        HostArray::Int32(v) => {
            let (p, x) = keep(v, order, |x| (x as f64).abs() > threshold);
            (p, HostArray::Int32(x))
        }
        HostArray::Float32(v) => {
            let (p, x) = keep(v, order, |x| (x as f64).abs() > threshold);
            (p, HostArray::Float32(x))
        }
        HostArray::Float64(v) => {
            let (p, x) = keep(v, order, |x| x.abs() > threshold);
            (p, HostArray::Float64(x))
        }
    }
}

/// Write `values[k]` to `out[positions[k]]`.
fn scatter(out: &mut HostArray, positions: impl Iterator<Item = usize>, values: &HostArray) -> Result<()> {
    fn put<T: Copy>(out: &mut [T], positions: impl Iterator<Item = usize>, values: &[T]) -> Result<()> {
        for (k, pos) in positions.enumerate() {
            let len = out.len();
            let slot = out
                .get_mut(pos)
                .ok_or(MemError::IndexOutOfRange { index: pos, len })?;
            *slot = values[k];
        }
        Ok(())
    }
    match (out, values) {
        (HostArray::Int32(o), HostArray::Int32(v)) => put(o, positions, v),
        (HostArray::Float32(o), HostArray::Float32(v)) => put(o, positions, v),
        (HostArray::Float64(o), HostArray::Float64(v)) => put(o, positions, v),
        (o, v) => Err(MemError::DTypeMismatch {
            expected: o.dtype(),
            got: v.dtype(),
        }),
    }
}

fn to_index(i: usize) -> Result<i32> {
    i32::try_from(i).map_err(|_| MemError::InvalidArgument(format!("index {i} exceeds i32 range")))
}

fn index_vec(host: HostArray) -> Result<Vec<i32>> {
    match host {
        HostArray::Int32(v) => Ok(v),
        other => Err(MemError::DTypeMismatch {
            expected: crate::types::ElementType::Int32,
            got: other.dtype(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_threshold() {
        let dense = HostArray::Float64(vec![0.0, 1e-8, -2.0, 1e-7, 3.0]);
        let (p, v) = gather(&dense, 0..5, 1e-7);
        assert_eq!(p, vec![2, 4]);
        assert_eq!(v, HostArray::Float64(vec![-2.0, 3.0]));
    }

    #[test]
    fn test_scatter_out_of_range() {
        let mut out = HostArray::zeros(crate::types::ElementType::Int32, 2);
        let err = scatter(&mut out, [5usize].into_iter(), &HostArray::Int32(vec![1]));
        assert!(matches!(err, Err(MemError::IndexOutOfRange { index: 5, len: 2 })));
    }
}
