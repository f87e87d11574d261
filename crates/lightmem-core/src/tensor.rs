//! Three-dimensional buffers stored as consecutive column-major cubes.

use std::fmt;

use crate::backend::Context;
use crate::buffer::sealed::Sealed;
use crate::buffer::{Buffer, BufferView, BufferViewMut, Memory, MemoryMut, require_dtype};
use crate::descriptor::{CubedDescriptor, MemoryDescriptor, TiledDescriptor, shape_len};
use crate::matrix::{Matrix, MatrixLayout, MatrixView, MatrixViewMut, write_rows};
use crate::types::{Element, ElementType, HostArray, MemorySpace};
use crate::{MemError, Result};

/// A `rows x cols x cubes` tensor that owns its storage.
///
/// Cube `k` is a matrix view at element offset `k * rows * cols`; each cube
/// carries its own precomputed column views.
pub struct Tensor {
    buf: Buffer,
    cubed: CubedDescriptor,
    cubes: Vec<MatrixLayout>,
}

impl Tensor {
    pub fn new(
        ctx: &Context,
        rows: usize,
        cols: usize,
        cubes: usize,
        space: MemorySpace,
        dtype: ElementType,
    ) -> Result<Self> {
        let buf = Buffer::new(ctx, shape_len(&[rows, cols, cubes])?, space, dtype)?;
        let (cubed, layouts) = layout(buf.descriptor(), rows, cols, cubes)?;
        Ok(Self {
            buf,
            cubed,
            cubes: layouts,
        })
    }

    pub fn filled(
        ctx: &Context,
        rows: usize,
        cols: usize,
        cubes: usize,
        space: MemorySpace,
        dtype: ElementType,
        value: f64,
    ) -> Result<Self> {
        let mut t = Self::new(ctx, rows, cols, cubes, space, dtype)?;
        if !t.is_empty() {
            t.set(value)?;
        }
        Ok(t)
    }

    pub fn from_host(
        ctx: &Context,
        rows: usize,
        cols: usize,
        cubes: usize,
        data: &HostArray,
        space: MemorySpace,
    ) -> Result<Self> {
        let mut t = Self::new(ctx, rows, cols, cubes, space, data.dtype())?;
        t.copy_from_host(data)?;
        Ok(t)
    }

    /// Stack equally shaped matrices into cubes, in order.
    pub fn from_matrices(matrices: &[&Matrix]) -> Result<Self> {
        let first = matrices
            .first()
            .ok_or_else(|| MemError::InvalidArgument("no matrices to stack".into()))?;
        let mut t = Self::new(
            first.context(),
            first.rows(),
            first.cols(),
            matrices.len(),
            first.space(),
            first.dtype(),
        )?;
        for (k, m) in matrices.iter().enumerate() {
            if m.rows() != first.rows() || m.cols() != first.cols() {
                return Err(MemError::SizeMismatch {
                    expected: first.len(),
                    got: m.len(),
                });
            }
            t.cube_mut(k)?.copy_from(*m)?;
        }
        Ok(t)
    }

    /// A `rows x cols x 1` copy of `m`.
    pub fn from_matrix(m: &Matrix) -> Result<Self> {
        Self::from_matrices(&[m])
    }

    pub fn try_clone(&self) -> Result<Self> {
        let buf = self.buf.try_clone()?;
        let (cubed, layouts) = layout(buf.descriptor(), self.rows(), self.cols(), self.n_cubes())?;
        Ok(Self {
            buf,
            cubed,
            cubes: layouts,
        })
    }

    pub fn rows(&self) -> usize {
        self.cubed.rows()
    }

    pub fn cols(&self) -> usize {
        self.cubed.cols()
    }

    pub fn n_cubes(&self) -> usize {
        self.cubed.cubes()
    }

    pub fn cubed(&self) -> &CubedDescriptor {
        &self.cubed
    }

    pub fn cube(&self, k: usize) -> Result<MatrixView<'_>> {
        let layout = self.cube_layout(k)?;
        Ok(MatrixView::borrowed(self.buf.context(), layout))
    }

    pub fn cube_mut(&mut self, k: usize) -> Result<MatrixViewMut<'_>> {
        let layout = self.cube_layout(k)?;
        Ok(MatrixViewMut::borrowed(self.buf.context(), layout))
    }

    /// Column `j` of cube `k`.
    pub fn column(&self, k: usize, j: usize) -> Result<BufferView<'_>> {
        let desc = self.cube_layout(k)?.column(j)?;
        Ok(BufferView::borrowed(self.buf.context(), desc))
    }

    pub fn column_mut(&mut self, k: usize, j: usize) -> Result<BufferViewMut<'_>> {
        let desc = self.cube_layout(k)?.column(j)?;
        Ok(BufferViewMut::borrowed(self.buf.context(), desc))
    }

    pub fn get_cube(&self, k: usize) -> Result<HostArray> {
        self.cube(k)?.to_host()
    }

    pub fn get_column<T: Element>(&self, k: usize, j: usize) -> Result<Vec<T>> {
        self.column(k, j)?.get()
    }

    pub fn set_cube(&mut self, k: usize, value: f64) -> Result<()> {
        self.cube_mut(k)?.set(value)
    }

    pub fn set_column(&mut self, k: usize, j: usize, value: f64) -> Result<()> {
        self.column_mut(k, j)?.set(value)
    }

    /// Overwrite with `data`, reallocating when the size differs.
    pub fn read_from<T: Element>(
        &mut self,
        rows: usize,
        cols: usize,
        cubes: usize,
        data: &[T],
    ) -> Result<()> {
        require_dtype(self.dtype(), T::DTYPE)?;
        self.reshape_storage(rows, cols, cubes, data.len())?;
        self.copy_from_slice(data)
    }

    pub fn read_from_host(
        &mut self,
        rows: usize,
        cols: usize,
        cubes: usize,
        data: &HostArray,
    ) -> Result<()> {
        require_dtype(self.dtype(), data.dtype())?;
        self.reshape_storage(rows, cols, cubes, data.len())?;
        self.copy_from_host(data)
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.buf.dispose()?;
        let (cubed, layouts) = layout(self.buf.descriptor(), 0, 0, 0)?;
        self.cubed = cubed;
        self.cubes = layouts;
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.buf.is_disposed()
    }

    fn cube_layout(&self, k: usize) -> Result<&MatrixLayout> {
        self.cubes.get(k).ok_or(MemError::IndexOutOfRange {
            index: k,
            len: self.cubes.len(),
        })
    }

    fn reshape_storage(&mut self, rows: usize, cols: usize, cubes: usize, len: usize) -> Result<()> {
        let expected = shape_len(&[rows, cols, cubes])?;
        if expected != len {
            return Err(MemError::SizeMismatch { expected, got: len });
        }
        if len != self.buf.len() || self.buf.descriptor().is_null() {
            self.buf.resize(len)?;
        }
        let (cubed, layouts) = layout(self.buf.descriptor(), rows, cols, cubes)?;
        self.cubed = cubed;
        self.cubes = layouts;
        Ok(())
    }
}

fn layout(
    base: MemoryDescriptor,
    rows: usize,
    cols: usize,
    cubes: usize,
) -> Result<(CubedDescriptor, Vec<MatrixLayout>)> {
    let cubed = CubedDescriptor::new(base, rows, cols, cubes)?;
    let layouts = if cubed.is_empty() {
        let empty = MemoryDescriptor::unallocated(0, base.space, base.dtype);
        (0..cubes)
            .map(|_| TiledDescriptor::new(empty, rows, cols).and_then(MatrixLayout::new))
            .collect::<Result<Vec<_>>>()?
    } else {
        (0..cubes)
            .map(|k| cubed.cube(k).and_then(MatrixLayout::new))
            .collect::<Result<Vec<_>>>()?
    };
    Ok((cubed, layouts))
}

impl Memory for Tensor {
    fn descriptor(&self) -> MemoryDescriptor {
        self.buf.descriptor()
    }

    fn context(&self) -> &Context {
        self.buf.context()
    }
}

impl MemoryMut for Tensor {}

impl Sealed for Tensor {}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.cubed.rows() == other.cubed.rows()
            && self.cubed.cols() == other.cubed.cols()
            && self.cubed.cubes() == other.cubed.cubes()
            && self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("rows", &self.rows())
            .field("cols", &self.cols())
            .field("cubes", &self.n_cubes())
            .field("space", &self.space())
            .field("dtype", &self.dtype())
            .finish()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for k in 0..self.n_cubes() {
            writeln!(f, "cube {k}:")?;
            match self.cube(k) {
                Ok(cube) => write_rows(f, &cube, self.rows(), self.cols())?,
                Err(e) => writeln!(f, "<unreadable: {e}>")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_offsets() {
        let ctx = Context::cpu();
        let t = Tensor::new(&ctx, 4, 3, 2, MemorySpace::Device, ElementType::Float64).unwrap();
        let base = t.descriptor().address;
        assert_eq!(t.cube(1).unwrap().descriptor().address, base + 4 * 3 * 8);
        assert_eq!(
            t.column(1, 2).unwrap().descriptor().address,
            base + 4 * (3 + 2) * 8
        );
        assert!(t.cube(2).is_err());
        assert!(t.column(0, 3).is_err());
    }

    #[test]
    fn test_cube_writes_visible() {
        let ctx = Context::cpu();
        let mut t = Tensor::new(&ctx, 2, 2, 3, MemorySpace::Device, ElementType::Int32).unwrap();
        t.set_cube(1, 7.0).unwrap();
        t.set_column(2, 0, 1.0).unwrap();
        assert_eq!(
            t.get::<i32>().unwrap(),
            vec![0, 0, 0, 0, 7, 7, 7, 7, 1, 1, 0, 0]
        );
        assert_eq!(t.cube(1).unwrap().get_column::<i32>(1).unwrap(), vec![7, 7]);
    }

    #[test]
    fn test_from_matrices() {
        let ctx = Context::cpu();
        let a = Matrix::filled(&ctx, 2, 2, MemorySpace::Device, ElementType::Float32, 1.0).unwrap();
        let b = Matrix::filled(&ctx, 2, 2, MemorySpace::Device, ElementType::Float32, 2.0).unwrap();
        let t = Tensor::from_matrices(&[&a, &b]).unwrap();
        assert_eq!(t.n_cubes(), 2);
        assert_eq!(t.get_cube(1).unwrap(), HostArray::Float32(vec![2.0; 4]));
        assert_eq!(t.cube(0).unwrap().to_matrix().unwrap(), a);

        let c = Matrix::new(&ctx, 3, 2, MemorySpace::Device, ElementType::Float32).unwrap();
        assert!(Tensor::from_matrices(&[&a, &c]).is_err());
    }

    #[test]
    fn test_read_from_resizes() {
        let ctx = Context::cpu();
        let mut t = Tensor::new(&ctx, 1, 1, 1, MemorySpace::Host, ElementType::Float64).unwrap();
        let data: Vec<f64> = (0..12).map(|i| i as f64).collect();
        t.read_from(2, 3, 2, &data).unwrap();
        assert_eq!((t.rows(), t.cols(), t.n_cubes()), (2, 3, 2));
        assert_eq!(t.get_column::<f64>(1, 0).unwrap(), vec![6.0, 7.0]);
        let copy = t.try_clone().unwrap();
        assert_eq!(copy, t);
    }

    #[test]
    fn test_dispose() {
        let ctx = Context::cpu();
        let mut t = Tensor::new(&ctx, 2, 2, 2, MemorySpace::Device, ElementType::Float32).unwrap();
        t.dispose().unwrap();
        t.dispose().unwrap();
        assert_eq!(ctx.live_allocations(), 0);
        assert!(t.cube(0).is_err());
    }

    #[test]
    fn test_empty_cubes_still_indexable() {
        let ctx = Context::cpu();
        let t = Tensor::new(&ctx, 0, 3, 2, MemorySpace::Device, ElementType::Float64).unwrap();
        assert_eq!(t.n_cubes(), 2);
        let cube = t.cube(1).unwrap();
        assert_eq!((cube.rows(), cube.cols()), (0, 3));
        assert_eq!(t.get_cube(0).unwrap(), HostArray::Float64(Vec::new()));
        assert!(t.get_column::<f64>(1, 2).unwrap().is_empty());
        assert!(t.cube(2).is_err());
        assert_eq!(ctx.live_allocations(), 0);
    }

    #[test]
    fn test_shape_overflow_rejected() {
        let ctx = Context::cpu();
        let err = Tensor::new(&ctx, usize::MAX, 2, 2, MemorySpace::Host, ElementType::Int32);
        assert!(matches!(err, Err(MemError::InvalidArgument(_))));
    }
}
