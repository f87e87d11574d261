use std::fmt;

use crate::backend::Context;
use crate::buffer::{Memory, MemoryMut, require_dtype, require_len};
use crate::config::DEFAULT_COMPRESS_THRESHOLD;
use crate::descriptor::SparseVectorDescriptor;
use crate::types::{ElementType, HostArray, MemorySpace};
use crate::vector::Vector;
use crate::{MemError, Result};

use super::{gather, index_vec, scatter, to_index};

/// A compressed vector: `values[i]` lives at dense position `indices[i]`.
pub struct SparseVector {
    values: Vector,
    indices: Vector,
    dense_len: usize,
}

impl SparseVector {
    /// Keep the entries of `dense` with `|x| > threshold`.
    pub fn compress<M: Memory>(dense: &M, threshold: f64) -> Result<Self> {
        let host = dense.to_host()?;
        let (positions, values) = gather(&host, 0..host.len(), threshold);
        let indices = positions
            .into_iter()
            .map(to_index)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(dense_len = host.len(), nnz = indices.len(), threshold, "compress vector");
        let ctx = dense.context();
        Ok(Self {
            values: Vector::from_host(ctx, &values, dense.space())?,
            indices: Vector::from_slice(ctx, &indices, dense.space())?,
            dense_len: host.len(),
        })
    }

    /// [`SparseVector::compress`] with the default threshold.
    pub fn compress_default<M: Memory>(dense: &M) -> Result<Self> {
        Self::compress(dense, DEFAULT_COMPRESS_THRESHOLD)
    }

    /// Build from strictly increasing `indices` into a vector of `dense_len`.
    pub fn from_indices(
        ctx: &Context,
        dense_len: usize,
        indices: &[i32],
        values: &HostArray,
        space: MemorySpace,
    ) -> Result<Self> {
        validate_indices(dense_len, indices)?;
        require_len(indices.len(), values.len())?;
        Ok(Self {
            values: Vector::from_host(ctx, values, space)?,
            indices: Vector::from_slice(ctx, indices, space)?,
            dense_len,
        })
    }

    /// Pattern `indices`, every stored value set to `value`.
    pub fn with_value(
        ctx: &Context,
        dense_len: usize,
        indices: &[i32],
        value: f64,
        space: MemorySpace,
        dtype: ElementType,
    ) -> Result<Self> {
        validate_indices(dense_len, indices)?;
        Ok(Self {
            values: Vector::filled(ctx, indices.len(), space, dtype, value)?,
            indices: Vector::from_slice(ctx, indices, space)?,
            dense_len,
        })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            values: self.values.try_clone()?,
            indices: self.indices.try_clone()?,
            dense_len: self.dense_len,
        })
    }

    pub fn descriptor(&self) -> SparseVectorDescriptor {
        SparseVectorDescriptor {
            values: self.values.descriptor(),
            indices: self.indices.descriptor(),
            dense_len: self.dense_len,
        }
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn dense_len(&self) -> usize {
        self.dense_len
    }

    pub fn values(&self) -> &Vector {
        &self.values
    }

    pub fn indices(&self) -> &Vector {
        &self.indices
    }

    pub fn dtype(&self) -> ElementType {
        self.values.dtype()
    }

    pub fn space(&self) -> MemorySpace {
        self.values.space()
    }

    pub fn context(&self) -> &Context {
        self.values.context()
    }

    /// Zero-filled host array of `dense_len` with the stored values scattered in.
    pub fn decompress(&self) -> Result<HostArray> {
        let mut out = HostArray::zeros(self.dtype(), self.dense_len);
        let indices = index_vec(self.indices.to_host()?)?;
        let values = self.values.to_host()?;
        scatter(&mut out, indices.iter().map(|&i| i as usize), &values)?;
        Ok(out)
    }

    /// Decompress into a dense vector in the same space.
    pub fn to_dense(&self) -> Result<Vector> {
        let mut out = Vector::new(self.context(), self.dense_len, self.space(), self.dtype())?;
        if self.dense_len > 0 {
            self.add_to_dense(&mut out, 1.0)?;
        }
        Ok(out)
    }

    /// `y += alpha * self` for a dense `y` of `dense_len` elements.
    pub fn add_to_dense<M: MemoryMut>(&self, y: &mut M, alpha: f64) -> Result<()> {
        self.context().require_same(y.context())?;
        let desc = y.descriptor();
        require_dtype(desc.dtype, self.dtype())?;
        require_len(desc.len, self.dense_len)?;
        if desc.space != self.space() {
            return Err(MemError::SpaceMismatch {
                left: desc.space,
                right: self.space(),
            });
        }
        if self.nnz() == 0 {
            return Ok(());
        }
        if desc.is_null() {
            return Err(MemError::BufferNotInitialized);
        }
        // SAFETY: `y` is exclusively borrowed, the sparse regions are owned by `self`.
        unsafe { self.context().sparse_axpy(&desc, &self.descriptor(), alpha) }
    }

    /// Whether both vectors store the same dense positions.
    pub fn same_pattern(&self, other: &SparseVector) -> Result<bool> {
        if self.dense_len != other.dense_len || self.nnz() != other.nnz() {
            return Ok(false);
        }
        Ok(self.indices.to_host()? == other.indices.to_host()?)
    }

    /// `self += alpha * other`; both must share one sparsity pattern.
    pub fn add_assign(&mut self, other: &SparseVector, alpha: f64) -> Result<()> {
        self.require_same_pattern(other)?;
        if self.nnz() == 0 {
            return Ok(());
        }
        self.values.add_assign_scaled(&other.values, alpha)
    }

    /// `self -= other`; both must share one sparsity pattern.
    pub fn sub_assign(&mut self, other: &SparseVector) -> Result<()> {
        self.add_assign(other, -1.0)
    }

    /// `self *= other` element-wise; both must share one sparsity pattern.
    pub fn hadamard_assign(&mut self, other: &SparseVector) -> Result<()> {
        self.require_same_pattern(other)?;
        if self.nnz() == 0 {
            return Ok(());
        }
        self.values.hadamard_assign(&other.values)
    }

    pub fn scale(&mut self, alpha: f64) -> Result<()> {
        if self.nnz() == 0 {
            return Ok(());
        }
        self.values.scale(alpha)
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.values.dispose()?;
        self.indices.dispose()
    }

    fn require_same_pattern(&self, other: &SparseVector) -> Result<()> {
        if !self.same_pattern(other)? {
            return Err(MemError::SparsityPatternMismatch);
        }
        Ok(())
    }
}

fn validate_indices(dense_len: usize, indices: &[i32]) -> Result<()> {
    if indices.len() > dense_len {
        return Err(MemError::InvalidArgument(format!(
            "{} stored values exceed dense length {dense_len}",
            indices.len()
        )));
    }
    let mut prev: Option<i32> = None;
    for &i in indices {
        if i < 0 || i as usize >= dense_len {
            return Err(MemError::IndexOutOfRange {
                index: i.max(0) as usize,
                len: dense_len,
            });
        }
        if prev.is_some_and(|p| p >= i) {
            return Err(MemError::InvalidArgument(
                "sparse indices must be strictly increasing".into(),
            ));
        }
        prev = Some(i);
    }
    Ok(())
}

impl fmt::Debug for SparseVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseVector")
            .field("dense_len", &self.dense_len)
            .field("nnz", &self.nnz())
            .field("space", &self.space())
            .field("dtype", &self.dtype())
            .finish()
    }
}
