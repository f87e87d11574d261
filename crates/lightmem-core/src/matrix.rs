//! Column-major matrices and their column views.
//!
//! A [`Matrix`] precomputes one descriptor per column when it is allocated,
//! so `column(j)` is a lookup. The layout is rebuilt whenever the matrix is
//! reallocated.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use crate::backend::Context;
use crate::buffer::sealed::Sealed;
use crate::buffer::{Buffer, BufferView, BufferViewMut, Memory, MemoryMut, require_dtype};
use crate::descriptor::{MemoryDescriptor, TiledDescriptor, shape_len};
use crate::types::{Element, ElementType, HostArray, MemorySpace};
use crate::vector::Vector;
use crate::{MemError, Result};

/// Shape plus precomputed per-column descriptors.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixLayout {
    tile: TiledDescriptor,
    columns: Vec<MemoryDescriptor>,
}

impl MatrixLayout {
    pub fn new(tile: TiledDescriptor) -> Result<Self> {
        let columns = if tile.is_empty() {
            let base = tile.base();
            vec![MemoryDescriptor::unallocated(0, base.space, base.dtype); tile.cols()]
        } else {
            (0..tile.cols())
                .map(|j| tile.column(j))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(Self { tile, columns })
    }

    pub fn tile(&self) -> &TiledDescriptor {
        &self.tile
    }

    pub fn rows(&self) -> usize {
        self.tile.rows()
    }

    pub fn cols(&self) -> usize {
        self.tile.cols()
    }

    pub fn column(&self, j: usize) -> Result<MemoryDescriptor> {
        self.columns
            .get(j)
            .copied()
            .ok_or(MemError::IndexOutOfRange {
                index: j,
                len: self.columns.len(),
            })
    }
}

// ── Matrix ──────────────────────────────────────────────────────────────

/// A column-major matrix that owns its storage.
pub struct Matrix {
    buf: Buffer,
    layout: MatrixLayout,
}

impl Matrix {
    pub fn new(
        ctx: &Context,
        rows: usize,
        cols: usize,
        space: MemorySpace,
        dtype: ElementType,
    ) -> Result<Self> {
        let buf = Buffer::new(ctx, shape_len(&[rows, cols])?, space, dtype)?;
        let layout = MatrixLayout::new(TiledDescriptor::new(buf.descriptor(), rows, cols)?)?;
        Ok(Self { buf, layout })
    }

    pub fn filled(
        ctx: &Context,
        rows: usize,
        cols: usize,
        space: MemorySpace,
        dtype: ElementType,
        value: f64,
    ) -> Result<Self> {
        let mut m = Self::new(ctx, rows, cols, space, dtype)?;
        if !m.is_empty() {
            m.set(value)?;
        }
        Ok(m)
    }

    /// Build from column-major `data` of length `rows * cols`.
    pub fn from_column_major<T: Element>(
        ctx: &Context,
        rows: usize,
        cols: usize,
        data: &[T],
        space: MemorySpace,
    ) -> Result<Self> {
        let mut m = Self::new(ctx, rows, cols, space, T::DTYPE)?;
        m.copy_from_slice(data)?;
        Ok(m)
    }

    pub fn from_host(
        ctx: &Context,
        rows: usize,
        cols: usize,
        data: &HostArray,
        space: MemorySpace,
    ) -> Result<Self> {
        let mut m = Self::new(ctx, rows, cols, space, data.dtype())?;
        m.copy_from_host(data)?;
        Ok(m)
    }

    /// `n x n` identity.
    pub fn identity(ctx: &Context, n: usize, space: MemorySpace, dtype: ElementType) -> Result<Self> {
        let mut values = vec![0.0f64; n * n];
        for i in 0..n {
            values[i + i * n] = 1.0;
        }
        Self::from_host(ctx, n, n, &HostArray::Float64(values).cast(dtype), space)
    }

    /// An `n x 1` copy of `v`.
    pub fn from_vector(v: &Vector) -> Result<Self> {
        let mut m = Self::new(v.context(), v.len(), 1, v.space(), v.dtype())?;
        m.copy_from(v)?;
        Ok(m)
    }

    pub fn try_clone(&self) -> Result<Self> {
        let buf = self.buf.try_clone()?;
        let layout = MatrixLayout::new(TiledDescriptor::new(
            buf.descriptor(),
            self.rows(),
            self.cols(),
        )?)?;
        Ok(Self { buf, layout })
    }

    pub fn rows(&self) -> usize {
        self.layout.rows()
    }

    pub fn cols(&self) -> usize {
        self.layout.cols()
    }

    pub fn tile(&self) -> &TiledDescriptor {
        self.layout.tile()
    }

    /// Column `j` as a view into this matrix.
    pub fn column(&self, j: usize) -> Result<BufferView<'_>> {
        Ok(BufferView::borrowed(self.buf.context(), self.layout.column(j)?))
    }

    pub fn column_mut(&mut self, j: usize) -> Result<BufferViewMut<'_>> {
        let desc = self.layout.column(j)?;
        Ok(BufferViewMut::borrowed(self.buf.context(), desc))
    }

    pub fn get_column<T: Element>(&self, j: usize) -> Result<Vec<T>> {
        self.column(j)?.get()
    }

    pub fn set_column(&mut self, j: usize, value: f64) -> Result<()> {
        self.column_mut(j)?.set(value)
    }

    /// Fill column `j` with evenly spaced values between the two endpoints.
    ///
    /// Endpoints are applied in ascending order and must differ.
    pub fn lin_space_column(&mut self, j: usize, a: f64, b: f64) -> Result<()> {
        if a == b {
            return Err(MemError::InvalidArgument(
                "lin_space endpoints must differ".into(),
            ));
        }
        let (x0, x1) = if a < b { (a, b) } else { (b, a) };
        self.column_mut(j)?.lin_space(x0, x1)
    }

    pub fn random_uniform_column(&mut self, j: usize, seed: u64) -> Result<()> {
        self.column_mut(j)?.random_uniform(seed)
    }

    pub fn random_gaussian_column(&mut self, j: usize, seed: u64) -> Result<()> {
        self.column_mut(j)?.random_gaussian(seed)
    }

    /// Element `(i, j)`.
    pub fn get_element<T: Element>(&self, i: usize, j: usize) -> Result<T> {
        if i >= self.rows() {
            return Err(MemError::IndexOutOfRange {
                index: i,
                len: self.rows(),
            });
        }
        let values = self.column(j)?.slice(i, 1)?.get::<T>()?;
        values.first().copied().ok_or(MemError::IndexOutOfRange {
            index: i,
            len: self.rows(),
        })
    }

    /// Overwrite with column-major `data`, reallocating when the size differs.
    pub fn read_from<T: Element>(&mut self, rows: usize, cols: usize, data: &[T]) -> Result<()> {
        require_dtype(self.dtype(), T::DTYPE)?;
        self.reshape_storage(rows, cols, data.len())?;
        self.copy_from_slice(data)
    }

    pub fn read_from_host(&mut self, rows: usize, cols: usize, data: &HostArray) -> Result<()> {
        require_dtype(self.dtype(), data.dtype())?;
        self.reshape_storage(rows, cols, data.len())?;
        self.copy_from_host(data)
    }

    fn reshape_storage(&mut self, rows: usize, cols: usize, len: usize) -> Result<()> {
        let expected = shape_len(&[rows, cols])?;
        if expected != len {
            return Err(MemError::SizeMismatch { expected, got: len });
        }
        if len != self.buf.len() || self.buf.descriptor().is_null() {
            self.buf.resize(len)?;
        }
        self.layout = MatrixLayout::new(TiledDescriptor::new(self.buf.descriptor(), rows, cols)?)?;
        Ok(())
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.buf.dispose()?;
        self.layout = MatrixLayout::new(TiledDescriptor::new(self.buf.descriptor(), 0, 0)?)?;
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.buf.is_disposed()
    }

    pub fn view(&self) -> MatrixView<'_> {
        MatrixView {
            ctx: self.buf.context(),
            layout: Cow::Borrowed(&self.layout),
        }
    }

    pub fn view_mut(&mut self) -> MatrixViewMut<'_> {
        MatrixViewMut {
            ctx: self.buf.context(),
            layout: Cow::Borrowed(&self.layout),
            _owner: PhantomData,
        }
    }

    /// Flatten into a vector of `rows * cols` elements.
    pub fn into_vector(self) -> Vector {
        Vector::from(self.buf)
    }
}

impl Memory for Matrix {
    fn descriptor(&self) -> MemoryDescriptor {
        self.buf.descriptor()
    }

    fn context(&self) -> &Context {
        self.buf.context()
    }
}

impl MemoryMut for Matrix {}

impl Sealed for Matrix {}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows() == other.rows() && self.cols() == other.cols() && self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("rows", &self.rows())
            .field("cols", &self.cols())
            .field("space", &self.space())
            .field("dtype", &self.dtype())
            .finish()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rows(f, self, self.rows(), self.cols())
    }
}

/// Print a column-major region one row per line.
pub(crate) fn write_rows<M: Memory>(
    f: &mut fmt::Formatter<'_>,
    m: &M,
    rows: usize,
    cols: usize,
) -> fmt::Result {
    let values = match m.to_host() {
        Ok(v) => v,
        Err(e) => return write!(f, "<unreadable: {e}>"),
    };
    for i in 0..rows {
        for j in 0..cols {
            if j > 0 {
                write!(f, " ")?;
            }
            match &values {
                HostArray::Int32(v) => write!(f, "{}", v[i + j * rows])?,
                HostArray::Float32(v) => write!(f, "{}", v[i + j * rows])?,
                HostArray::Float64(v) => write!(f, "{}", v[i + j * rows])?,
            }
        }
        writeln!(f)?;
    }
    Ok(())
}

// ── Views ───────────────────────────────────────────────────────────────

/// Read-only matrix view over memory owned elsewhere.
#[derive(Clone, Debug)]
pub struct MatrixView<'a> {
    ctx: &'a Context,
    layout: Cow<'a, MatrixLayout>,
}

impl<'a> MatrixView<'a> {
    pub(crate) fn borrowed(ctx: &'a Context, layout: &'a MatrixLayout) -> Self {
        Self {
            ctx,
            layout: Cow::Borrowed(layout),
        }
    }

    /// A `rows x cols` tile starting `offset` elements into `owner`.
    pub fn over<M: Memory>(owner: &'a M, offset: usize, rows: usize, cols: usize) -> Result<Self> {
        let desc = owner.descriptor().slice(offset, shape_len(&[rows, cols])?)?;
        Ok(Self {
            ctx: owner.context(),
            layout: Cow::Owned(MatrixLayout::new(TiledDescriptor::new(desc, rows, cols)?)?),
        })
    }

    pub fn rows(&self) -> usize {
        self.layout.rows()
    }

    pub fn cols(&self) -> usize {
        self.layout.cols()
    }

    pub fn column(&self, j: usize) -> Result<BufferView<'a>> {
        Ok(BufferView::borrowed(self.ctx, self.layout.column(j)?))
    }

    pub fn get_column<T: Element>(&self, j: usize) -> Result<Vec<T>> {
        self.column(j)?.get()
    }

    /// Copy into a new owning matrix.
    pub fn to_matrix(&self) -> Result<Matrix> {
        let mut m = Matrix::new(self.ctx, self.rows(), self.cols(), self.space(), self.dtype())?;
        m.copy_from(self)?;
        Ok(m)
    }
}

impl Sealed for MatrixView<'_> {}

impl Memory for MatrixView<'_> {
    fn descriptor(&self) -> MemoryDescriptor {
        self.layout.tile().base()
    }

    fn context(&self) -> &Context {
        self.ctx
    }
}

impl fmt::Display for MatrixView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rows(f, self, self.rows(), self.cols())
    }
}

/// Mutable matrix view over memory owned elsewhere.
#[derive(Debug)]
pub struct MatrixViewMut<'a> {
    ctx: &'a Context,
    layout: Cow<'a, MatrixLayout>,
    _owner: PhantomData<&'a mut ()>,
}

impl<'a> MatrixViewMut<'a> {
    pub(crate) fn borrowed(ctx: &'a Context, layout: &'a MatrixLayout) -> Self {
        Self {
            ctx,
            layout: Cow::Borrowed(layout),
            _owner: PhantomData,
        }
    }

    /// A writable `rows x cols` tile starting `offset` elements into `owner`.
    pub fn over<M: MemoryMut>(
        owner: &'a mut M,
        offset: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let desc = owner.descriptor().slice(offset, shape_len(&[rows, cols])?)?;
        let layout = MatrixLayout::new(TiledDescriptor::new(desc, rows, cols)?)?;
        let owner: &'a M = owner;
        Ok(Self {
            ctx: owner.context(),
            layout: Cow::Owned(layout),
            _owner: PhantomData,
        })
    }

    pub fn rows(&self) -> usize {
        self.layout.rows()
    }

    pub fn cols(&self) -> usize {
        self.layout.cols()
    }

    pub fn column(&self, j: usize) -> Result<BufferView<'_>> {
        Ok(BufferView::borrowed(self.ctx, self.layout.column(j)?))
    }

    pub fn column_mut(&mut self, j: usize) -> Result<BufferViewMut<'_>> {
        Ok(BufferViewMut::borrowed(self.ctx, self.layout.column(j)?))
    }

    pub fn get_column<T: Element>(&self, j: usize) -> Result<Vec<T>> {
        self.column(j)?.get()
    }

    pub fn set_column(&mut self, j: usize, value: f64) -> Result<()> {
        self.column_mut(j)?.set(value)
    }
}

impl Memory for MatrixViewMut<'_> {
    fn descriptor(&self) -> MemoryDescriptor {
        self.layout.tile().base()
    }

    fn context(&self) -> &Context {
        self.ctx
    }
}

impl MemoryMut for MatrixViewMut<'_> {}

impl Sealed for MatrixViewMut<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::cpu()
    }

    #[test]
    fn test_column_write_visible_in_matrix() {
        let ctx = ctx();
        let mut m = Matrix::new(&ctx, 3, 4, MemorySpace::Device, ElementType::Float32).unwrap();
        m.column_mut(2).unwrap().set(5.0).unwrap();
        assert_eq!(m.get_column::<f32>(2).unwrap(), vec![5.0; 3]);
        assert_eq!(m.get_column::<f32>(1).unwrap(), vec![0.0; 3]);
        let all = m.get::<f32>().unwrap();
        assert_eq!(&all[6..9], &[5.0, 5.0, 5.0]);
        assert_eq!(all.iter().filter(|v| **v != 0.0).count(), 3);
    }

    #[test]
    fn test_column_out_of_range() {
        let m = Matrix::new(&ctx(), 2, 2, MemorySpace::Host, ElementType::Int32).unwrap();
        assert!(matches!(
            m.column(2),
            Err(MemError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_column_major_layout() {
        let m = Matrix::from_column_major(&ctx(), 2, 3, &[1i32, 2, 3, 4, 5, 6], MemorySpace::Device)
            .unwrap();
        assert_eq!(m.get_column::<i32>(1).unwrap(), vec![3, 4]);
        assert_eq!(m.get_element::<i32>(1, 2).unwrap(), 6);
        assert_eq!(m.to_string(), "1 3 5\n2 4 6\n");
    }

    #[test]
    fn test_read_from_resizes_and_rebuilds_columns() {
        let ctx = ctx();
        let mut m = Matrix::new(&ctx, 2, 2, MemorySpace::Device, ElementType::Float64).unwrap();
        m.read_from(3, 2, &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!((m.rows(), m.cols()), (3, 2));
        assert_eq!(m.get_column::<f64>(1).unwrap(), vec![4.0, 5.0, 6.0]);
        assert!(m.read_from(4, 2, &[1.0f64; 6]).is_err());
        assert_eq!(ctx.live_allocations(), 1);
    }

    #[test]
    fn test_identity() {
        let m = Matrix::identity(&ctx(), 3, MemorySpace::Device, ElementType::Float32).unwrap();
        assert_eq!(m.get_column::<f32>(1).unwrap(), vec![0.0, 1.0, 0.0]);
        assert_eq!(m.sum().unwrap(), 3.0);
    }

    #[test]
    fn test_lin_space_column_sorted() {
        let mut m = Matrix::new(&ctx(), 3, 2, MemorySpace::Device, ElementType::Float64).unwrap();
        m.lin_space_column(1, 2.0, 0.0).unwrap();
        assert_eq!(m.get_column::<f64>(1).unwrap(), vec![0.0, 1.0, 2.0]);
        assert!(matches!(
            m.lin_space_column(0, 1.0, 1.0),
            Err(MemError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_view_over_vector() {
        let ctx = ctx();
        let mut v = Vector::linspace(&ctx, 8, MemorySpace::Device, ElementType::Float64, 0.0, 7.0)
            .unwrap();
        {
            let view = MatrixView::over(&v, 2, 2, 3).unwrap();
            assert_eq!(view.get_column::<f64>(0).unwrap(), vec![2.0, 3.0]);
            assert_eq!(view.get_column::<f64>(2).unwrap(), vec![6.0, 7.0]);
        }
        assert!(MatrixView::over(&v, 3, 2, 3).is_err());
        {
            let mut view = MatrixViewMut::over(&mut v, 0, 2, 2).unwrap();
            view.set_column(1, -1.0).unwrap();
        }
        assert_eq!(v.get::<f64>().unwrap()[..4], [0.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_dispose_frees_once() {
        let ctx = ctx();
        let mut m = Matrix::filled(&ctx, 10, 5, MemorySpace::Device, ElementType::Int32, 2.0).unwrap();
        assert_eq!(ctx.live_allocations(), 1);
        m.dispose().unwrap();
        m.dispose().unwrap();
        assert_eq!(ctx.live_allocations(), 0);
        assert!(m.column(0).is_err());
    }

    #[test]
    fn test_from_vector_and_clone() {
        let ctx = ctx();
        let v = Vector::from_slice(&ctx, &[1i32, 2, 3], MemorySpace::Device).unwrap();
        let m = Matrix::from_vector(&v).unwrap();
        assert_eq!((m.rows(), m.cols()), (3, 1));
        assert_eq!(m.try_clone().unwrap(), m);
    }

    #[test]
    fn test_shape_overflow_rejected() {
        let ctx = Context::cpu();
        let err = Matrix::new(&ctx, usize::MAX, 2, MemorySpace::Device, ElementType::Float32);
        assert!(matches!(err, Err(MemError::InvalidArgument(_))));
        let mut m = Matrix::new(&ctx, 1, 1, MemorySpace::Host, ElementType::Float32).unwrap();
        assert!(matches!(
            m.read_from(usize::MAX, 3, &[1.0f32]),
            Err(MemError::InvalidArgument(_))
        ));
    }
}
