use std::fmt;

use crate::backend::Context;
use crate::buffer::{Memory, MemoryMut, require_dtype, require_len};
use crate::config::DEFAULT_COMPRESS_THRESHOLD;
use crate::descriptor::{CsrDescriptor, shape_len};
use crate::matrix::Matrix;
use crate::types::{ElementType, HostArray, MemorySpace};
use crate::vector::Vector;
use crate::{MemError, Result};

use super::{gather, index_vec, scatter, to_index};

/// A compressed sparse row matrix.
///
/// `row_offsets` holds `rows + 1` entries starting at 0; the nonzeros of
/// row `i` are `row_offsets[i]..row_offsets[i + 1]` in `values` and
/// `column_indices`.
pub struct CsrMatrix {
    values: Vector,
    column_indices: Vector,
    row_offsets: Vector,
    rows: usize,
    cols: usize,
}

impl CsrMatrix {
    /// Keep the entries of a column-major `rows x cols` region with `|x| > threshold`.
    pub fn compress_tile<M: Memory>(dense: &M, rows: usize, cols: usize, threshold: f64) -> Result<Self> {
        require_len(shape_len(&[rows, cols])?, dense.len())?;
        let offsets_len = offsets_len(rows)?;
        let host = dense.to_host()?;
        let row_major = (0..rows).flat_map(|i| (0..cols).map(move |j| i + j * rows));
        let (positions, values) = gather(&host, row_major, threshold);

        let mut column_indices = Vec::with_capacity(positions.len());
        let mut row_offsets = vec![0i32; offsets_len];
        for &p in &positions {
            let (i, j) = (p % rows, p / rows);
            column_indices.push(to_index(j)?);
            row_offsets[i + 1] += 1;
        }
        for i in 0..rows {
            row_offsets[i + 1] += row_offsets[i];
        }
        tracing::debug!(rows, cols, nnz = positions.len(), threshold, "compress csr");

        let (ctx, space) = (dense.context(), dense.space());
        Ok(Self {
            values: Vector::from_host(ctx, &values, space)?,
            column_indices: Vector::from_slice(ctx, &column_indices, space)?,
            row_offsets: Vector::from_slice(ctx, &row_offsets, space)?,
            rows,
            cols,
        })
    }

    pub fn compress(dense: &Matrix, threshold: f64) -> Result<Self> {
        Self::compress_tile(dense, dense.rows(), dense.cols(), threshold)
    }

    /// [`CsrMatrix::compress`] with the default threshold.
    pub fn compress_default(dense: &Matrix) -> Result<Self> {
        Self::compress(dense, DEFAULT_COMPRESS_THRESHOLD)
    }

    /// Build from an explicit pattern and values.
    pub fn from_pattern(
        ctx: &Context,
        rows: usize,
        cols: usize,
        row_offsets: &[i32],
        column_indices: &[i32],
        values: &HostArray,
        space: MemorySpace,
    ) -> Result<Self> {
        validate_pattern(rows, cols, row_offsets, column_indices)?;
        require_len(column_indices.len(), values.len())?;
        Ok(Self {
            values: Vector::from_host(ctx, values, space)?,
            column_indices: Vector::from_slice(ctx, column_indices, space)?,
            row_offsets: Vector::from_slice(ctx, row_offsets, space)?,
            rows,
            cols,
        })
    }

    /// Pattern from `row_offsets` / `column_indices`, every stored value set to `value`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_value(
        ctx: &Context,
        rows: usize,
        cols: usize,
        row_offsets: &[i32],
        column_indices: &[i32],
        value: f64,
        space: MemorySpace,
        dtype: ElementType,
    ) -> Result<Self> {
        validate_pattern(rows, cols, row_offsets, column_indices)?;
        Ok(Self {
            values: Vector::filled(ctx, column_indices.len(), space, dtype, value)?,
            column_indices: Vector::from_slice(ctx, column_indices, space)?,
            row_offsets: Vector::from_slice(ctx, row_offsets, space)?,
            rows,
            cols,
        })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            values: self.values.try_clone()?,
            column_indices: self.column_indices.try_clone()?,
            row_offsets: self.row_offsets.try_clone()?,
            rows: self.rows,
            cols: self.cols,
        })
    }

    pub fn descriptor(&self) -> CsrDescriptor {
        CsrDescriptor {
            values: self.values.descriptor(),
            column_indices: self.column_indices.descriptor(),
            row_offsets: self.row_offsets.descriptor(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &Vector {
        &self.values
    }

    pub fn column_indices(&self) -> &Vector {
        &self.column_indices
    }

    pub fn row_offsets(&self) -> &Vector {
        &self.row_offsets
    }

    pub fn dtype(&self) -> ElementType {
        self.values.dtype()
    }

    pub fn space(&self) -> MemorySpace {
        self.values.space()
    }

    pub fn context(&self) -> &Context {
        self.row_offsets.context()
    }

    /// Zero-filled column-major host array with the stored values scattered in.
    pub fn decompress(&self) -> Result<HostArray> {
        let mut out = HostArray::zeros(self.dtype(), shape_len(&[self.rows, self.cols])?);
        let offsets = index_vec(self.row_offsets.to_host()?)?;
        let cols = index_vec(self.column_indices.to_host()?)?;
        let values = self.values.to_host()?;
        let rows = self.rows;
        let positions = (0..rows).flat_map(|i| {
            let (start, end) = (offsets[i] as usize, offsets[i + 1] as usize);
            cols[start..end]
                .iter()
                .map(move |&j| i + j as usize * rows)
        });
        scatter(&mut out, positions, &values)?;
        Ok(out)
    }

    /// Decompress into a dense matrix in the same space.
    pub fn to_dense(&self) -> Result<Matrix> {
        Matrix::from_host(
            self.context(),
            self.rows,
            self.cols,
            &self.decompress()?,
            self.space(),
        )
    }

    /// `y = alpha * A x`.
    pub fn multiply_vector<X: Memory, Y: MemoryMut>(&self, x: &X, y: &mut Y, alpha: f64) -> Result<()> {
        let ctx = self.context();
        ctx.require_same(x.context())?;
        ctx.require_same(y.context())?;
        let (xd, yd) = (x.descriptor(), y.descriptor());
        require_dtype(self.dtype(), xd.dtype)?;
        require_dtype(self.dtype(), yd.dtype)?;
        require_len(self.cols, xd.len)?;
        require_len(self.rows, yd.len)?;
        for d in [&xd, &yd] {
            if d.space != self.space() {
                return Err(MemError::SpaceMismatch {
                    left: self.space(),
                    right: d.space,
                });
            }
        }
        if self.rows == 0 {
            return Ok(());
        }
        if self.nnz() == 0 || self.cols == 0 {
            return y.set(0.0);
        }
        // SAFETY: `y` is exclusively borrowed, `x` and the CSR regions are kept alive by their owners.
        unsafe { ctx.csr_mv(&yd, &self.descriptor(), &xd, alpha) }
    }

    /// `A x` into a fresh vector.
    pub fn dot<X: Memory>(&self, x: &X) -> Result<Vector> {
        let mut y = Vector::new(self.context(), self.rows, self.space(), self.dtype())?;
        self.multiply_vector(x, &mut y, 1.0)?;
        Ok(y)
    }

    /// Whether both matrices share shape and nonzero positions.
    pub fn same_pattern(&self, other: &CsrMatrix) -> Result<bool> {
        if self.rows != other.rows || self.cols != other.cols || self.nnz() != other.nnz() {
            return Ok(false);
        }
        Ok(self.row_offsets.to_host()? == other.row_offsets.to_host()?
            && self.column_indices.to_host()? == other.column_indices.to_host()?)
    }

    /// `self += alpha * other`; both must share one sparsity pattern.
    pub fn add_assign(&mut self, other: &CsrMatrix, alpha: f64) -> Result<()> {
        self.require_same_pattern(other)?;
        if self.nnz() == 0 {
            return Ok(());
        }
        self.values.add_assign_scaled(&other.values, alpha)
    }

    pub fn sub_assign(&mut self, other: &CsrMatrix) -> Result<()> {
        self.add_assign(other, -1.0)
    }

    /// `self *= other` element-wise; both must share one sparsity pattern.
    pub fn hadamard_assign(&mut self, other: &CsrMatrix) -> Result<()> {
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
        self.column_indices.dispose()?;
        self.row_offsets.dispose()
    }

    fn require_same_pattern(&self, other: &CsrMatrix) -> Result<()> {
        if !self.same_pattern(other)? {
            return Err(MemError::SparsityPatternMismatch);
        }
        Ok(())
    }
}

fn offsets_len(rows: usize) -> Result<usize> {
    rows.checked_add(1)
        .ok_or_else(|| MemError::InvalidArgument(format!("{rows} rows overflow row_offsets")))
}

fn validate_pattern(rows: usize, cols: usize, row_offsets: &[i32], column_indices: &[i32]) -> Result<()> {
    shape_len(&[rows, cols])?;
    require_len(offsets_len(rows)?, row_offsets.len())?;
    if row_offsets[0] != 0 {
        return Err(MemError::InvalidArgument("row_offsets must start at 0".into()));
    }
    if row_offsets[rows] as usize != column_indices.len() || row_offsets[rows] < 0 {
        return Err(MemError::SizeMismatch {
            expected: column_indices.len(),
            got: row_offsets[rows].max(0) as usize,
        });
    }
    for i in 0..rows {
        let (start, end) = (row_offsets[i], row_offsets[i + 1]);
        if end < start || end as usize > column_indices.len() {
            return Err(MemError::InvalidArgument(format!(
                "row_offsets decrease at row {i}"
            )));
        }
        let row = &column_indices[start as usize..end as usize];
        for (k, &j) in row.iter().enumerate() {
            if j < 0 || j as usize >= cols {
                return Err(MemError::IndexOutOfRange {
                    index: j.max(0) as usize,
                    len: cols,
                });
            }
            if k > 0 && row[k - 1] >= j {
                return Err(MemError::InvalidArgument(format!(
                    "column indices of row {i} must be strictly increasing"
                )));
            }
        }
    }
    Ok(())
}

impl fmt::Debug for CsrMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("nnz", &self.nnz())
            .field("space", &self.space())
            .field("dtype", &self.dtype())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // [[1, 0, 2],
    //  [0, 0, 0],
    //  [0, 3, 4]]
    fn sample(ctx: &Context) -> Matrix {
        Matrix::from_column_major(
            ctx,
            3,
            3,
            &[1.0f64, 0.0, 0.0, 0.0, 0.0, 3.0, 2.0, 0.0, 4.0],
            MemorySpace::Device,
        )
        .unwrap()
    }

    #[test]
    fn test_compress_layout() {
        let ctx = Context::cpu();
        let csr = CsrMatrix::compress_default(&sample(&ctx)).unwrap();
        assert_eq!(csr.nnz(), 4);
        assert_eq!(csr.row_offsets().get::<i32>().unwrap(), vec![0, 2, 2, 4]);
        assert_eq!(csr.column_indices().get::<i32>().unwrap(), vec![0, 2, 1, 2]);
        assert_eq!(csr.values().get::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_decompress_roundtrip() {
        let ctx = Context::cpu();
        let m = sample(&ctx);
        let csr = CsrMatrix::compress_default(&m).unwrap();
        assert_eq!(csr.to_dense().unwrap(), m);
    }

    #[test]
    fn test_multiply_vector() {
        let ctx = Context::cpu();
        let csr = CsrMatrix::compress_default(&sample(&ctx)).unwrap();
        let x = Vector::from_slice(&ctx, &[1.0f64, 1.0, 2.0], MemorySpace::Device).unwrap();
        assert_eq!(csr.dot(&x).unwrap().get::<f64>().unwrap(), vec![5.0, 0.0, 11.0]);

        let mut y = Vector::new(&ctx, 3, MemorySpace::Device, ElementType::Float64).unwrap();
        csr.multiply_vector(&x, &mut y, 2.0).unwrap();
        assert_eq!(y.get::<f64>().unwrap(), vec![10.0, 0.0, 22.0]);

        let short = Vector::new(&ctx, 2, MemorySpace::Device, ElementType::Float64).unwrap();
        assert!(matches!(
            csr.dot(&short),
            Err(MemError::SizeMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_pattern_validation() {
        let ctx = Context::cpu();
        let vals = HostArray::Float32(vec![1.0, 2.0]);
        let space = MemorySpace::Host;
        assert!(CsrMatrix::from_pattern(&ctx, 2, 2, &[0, 1], &[0, 1], &vals, space).is_err());
        assert!(CsrMatrix::from_pattern(&ctx, 2, 2, &[1, 1, 2], &[0, 1], &vals, space).is_err());
        assert!(CsrMatrix::from_pattern(&ctx, 2, 2, &[0, 2, 1], &[0, 1], &vals, space).is_err());
        assert!(CsrMatrix::from_pattern(&ctx, 2, 2, &[0, 1, 2], &[0, 2], &vals, space).is_err());
        assert!(CsrMatrix::from_pattern(&ctx, 2, 2, &[0, 2, 2], &[1, 0], &vals, space).is_err());
        let csr = CsrMatrix::from_pattern(&ctx, 2, 2, &[0, 1, 2], &[1, 0], &vals, space).unwrap();
        assert_eq!(csr.decompress().unwrap(), HostArray::Float32(vec![0.0, 2.0, 1.0, 0.0]));
    }

    #[test]
    fn test_same_pattern_ops() {
        let ctx = Context::cpu();
        let space = MemorySpace::Device;
        let dt = ElementType::Float64;
        let mut a = CsrMatrix::with_value(&ctx, 2, 3, &[0, 1, 3], &[2, 0, 1], 2.0, space, dt).unwrap();
        let b = CsrMatrix::with_value(&ctx, 2, 3, &[0, 1, 3], &[2, 0, 1], 3.0, space, dt).unwrap();
        let c = CsrMatrix::with_value(&ctx, 2, 3, &[0, 2, 3], &[0, 2, 1], 3.0, space, dt).unwrap();
        a.hadamard_assign(&b).unwrap();
        a.sub_assign(&b).unwrap();
        assert_eq!(a.values().get::<f64>().unwrap(), vec![3.0; 3]);
        assert!(matches!(
            a.add_assign(&c, 1.0),
            Err(MemError::SparsityPatternMismatch)
        ));
    }

    #[test]
    fn test_all_zero_matrix() {
        let ctx = Context::cpu();
        let m = Matrix::new(&ctx, 2, 4, MemorySpace::Device, ElementType::Int32).unwrap();
        let csr = CsrMatrix::compress_default(&m).unwrap();
        assert_eq!(csr.nnz(), 0);
        assert_eq!(csr.row_offsets().get::<i32>().unwrap(), vec![0, 0, 0]);
        assert_eq!(csr.to_dense().unwrap(), m);
    }

    #[test]
    fn test_shape_overflow_rejected() {
        let ctx = Context::cpu();
        let v = Vector::new(&ctx, 0, MemorySpace::Device, ElementType::Float64).unwrap();
        assert!(matches!(
            CsrMatrix::compress_tile(&v, usize::MAX, 2, 0.0),
            Err(MemError::InvalidArgument(_))
        ));
        assert!(matches!(
            CsrMatrix::compress_tile(&v, usize::MAX, 0, 0.0),
            Err(MemError::InvalidArgument(_))
        ));
    }
}
