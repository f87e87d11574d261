//! Region descriptors: plain value records handed to compute backends.
//!
//! A descriptor never owns memory. Owning buffers hand out descriptors of
//! their allocation; views are built from descriptors produced by
//! [`MemoryDescriptor::slice`], which validates the sub-range against the
//! parent's bounds.

use crate::types::{Element, ElementType, MemorySpace};
use crate::{MemError, Result};

/// A contiguous region of `len` elements of `dtype` living in `space`.
///
/// `address == 0` means the region is not allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryDescriptor {
    pub address: usize,
    pub len: usize,
    pub space: MemorySpace,
    pub dtype: ElementType,
}

impl MemoryDescriptor {
    pub fn new(address: usize, len: usize, space: MemorySpace, dtype: ElementType) -> Self {
        Self {
            address,
            len,
            space,
            dtype,
        }
    }

    /// An unallocated region of `len` elements.
    pub fn unallocated(len: usize, space: MemorySpace, dtype: ElementType) -> Self {
        Self::new(0, len, space, dtype)
    }

    /// Host descriptor over a borrowed slice.
    pub fn from_host_slice<T: Element>(data: &[T]) -> Self {
        Self::new(
            data.as_ptr() as usize,
            data.len(),
            MemorySpace::Host,
            T::DTYPE,
        )
    }

    /// Host descriptor over a mutably borrowed slice.
    pub fn from_host_slice_mut<T: Element>(data: &mut [T]) -> Self {
        Self::new(
            data.as_mut_ptr() as usize,
            data.len(),
            MemorySpace::Host,
            T::DTYPE,
        )
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    pub fn elem_size(&self) -> usize {
        self.dtype.size_bytes()
    }

    pub fn byte_size(&self) -> usize {
        self.len * self.dtype.size_bytes()
    }

    /// Sub-region of `len` elements starting `offset` elements in.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        if self.is_null() {
            return Err(MemError::BufferNotInitialized);
        }
        let end = offset
            .checked_add(len)
            .ok_or_else(|| MemError::InvalidArgument("slice range overflows".into()))?;
        if end > self.len {
            return Err(MemError::IndexOutOfRange {
                index: end,
                len: self.len,
            });
        }
        Ok(Self::new(
            self.address + offset * self.elem_size(),
            len,
            self.space,
            self.dtype,
        ))
    }

    /// Whether `other` lies entirely inside this region.
    pub fn contains(&self, other: &MemoryDescriptor) -> bool {
        other.space == self.space
            && other.dtype == self.dtype
            && other.address >= self.address
            && other.address + other.byte_size() <= self.address + self.byte_size()
    }
}

// ── Tiled ───────────────────────────────────────────────────────────────

/// A column-major `rows x cols` region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TiledDescriptor {
    base: MemoryDescriptor,
    rows: usize,
    cols: usize,
}

impl TiledDescriptor {
    pub fn new(base: MemoryDescriptor, rows: usize, cols: usize) -> Result<Self> {
        check_len(base.len, shape_len(&[rows, cols])?)?;
        Ok(Self { base, rows, cols })
    }

    pub fn base(&self) -> MemoryDescriptor {
        self.base
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.base.len
    }

    pub fn is_empty(&self) -> bool {
        self.base.len == 0
    }

    /// Replace the shape and the backing region together.
    pub fn reshape(&mut self, base: MemoryDescriptor, rows: usize, cols: usize) -> Result<()> {
        check_len(base.len, shape_len(&[rows, cols])?)?;
        self.base = base;
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    /// Column `j`: `rows` elements at `base + j * rows * elem_size`.
    pub fn column(&self, j: usize) -> Result<MemoryDescriptor> {
        if j >= self.cols {
            return Err(MemError::IndexOutOfRange {
                index: j,
                len: self.cols,
            });
        }
        self.base.slice(j * self.rows, self.rows)
    }
}

// ── Cubed ───────────────────────────────────────────────────────────────

/// `cubes` consecutive `rows x cols` tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubedDescriptor {
    base: MemoryDescriptor,
    rows: usize,
    cols: usize,
    cubes: usize,
}

impl CubedDescriptor {
    pub fn new(base: MemoryDescriptor, rows: usize, cols: usize, cubes: usize) -> Result<Self> {
        check_len(base.len, shape_len(&[rows, cols, cubes])?)?;
        Ok(Self {
            base,
            rows,
            cols,
            cubes,
        })
    }

    pub fn base(&self) -> MemoryDescriptor {
        self.base
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cubes(&self) -> usize {
        self.cubes
    }

    pub fn len(&self) -> usize {
        self.base.len
    }

    pub fn is_empty(&self) -> bool {
        self.base.len == 0
    }

    /// Cube `k`: a tile at `base + k * rows * cols * elem_size`.
    pub fn cube(&self, k: usize) -> Result<TiledDescriptor> {
        if k >= self.cubes {
            return Err(MemError::IndexOutOfRange {
                index: k,
                len: self.cubes,
            });
        }
        let tile = self.rows * self.cols;
        TiledDescriptor::new(self.base.slice(k * tile, tile)?, self.rows, self.cols)
    }

    /// Column `j` of cube `k`: `base + rows * (k * cols + j) * elem_size`.
    pub fn column(&self, k: usize, j: usize) -> Result<MemoryDescriptor> {
        self.cube(k)?.column(j)
    }
}

/// Element count of a shape; `InvalidArgument` when the product overflows.
pub fn shape_len(dims: &[usize]) -> Result<usize> {
    dims.iter().try_fold(1usize, |acc, &d| {
        acc.checked_mul(d)
            .ok_or_else(|| MemError::InvalidArgument(format!("shape {dims:?} overflows usize")))
    })
}

fn check_len(len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(MemError::SizeMismatch { expected, got: len });
    }
    Ok(())
}

// ── Sparse ──────────────────────────────────────────────────────────────

/// Compressed vector: `values[i]` sits at dense position `indices[i]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SparseVectorDescriptor {
    pub values: MemoryDescriptor,
    /// Int32 positions, same length as `values`.
    pub indices: MemoryDescriptor,
    pub dense_len: usize,
}

impl SparseVectorDescriptor {
    pub fn nnz(&self) -> usize {
        self.values.len
    }
}

/// Compressed sparse row matrix.
///
/// `row_offsets` has `rows + 1` Int32 entries starting at 0; row `i` owns
/// entries `row_offsets[i]..row_offsets[i + 1]` of `values` and
/// `column_indices`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsrDescriptor {
    pub values: MemoryDescriptor,
    pub column_indices: MemoryDescriptor,
    pub row_offsets: MemoryDescriptor,
    pub rows: usize,
    pub cols: usize,
}

impl CsrDescriptor {
    pub fn nnz(&self) -> usize {
        self.values.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(len: usize, dtype: ElementType) -> MemoryDescriptor {
        MemoryDescriptor::new(0x1000, len, MemorySpace::Device, dtype)
    }

    #[test]
    fn test_byte_size() {
        assert_eq!(region(10, ElementType::Float64).byte_size(), 80);
        assert_eq!(region(10, ElementType::Int32).byte_size(), 40);
    }

    #[test]
    fn test_slice_bounds() {
        let r = region(10, ElementType::Float32);
        let s = r.slice(4, 6).unwrap();
        assert_eq!(s.address, 0x1000 + 16);
        assert_eq!(s.len, 6);
        assert!(r.contains(&s));
        assert!(matches!(
            r.slice(5, 6),
            Err(MemError::IndexOutOfRange { index: 11, len: 10 })
        ));
    }

    #[test]
    fn test_slice_of_null_fails() {
        let r = MemoryDescriptor::unallocated(4, MemorySpace::Host, ElementType::Int32);
        assert!(matches!(r.slice(0, 1), Err(MemError::BufferNotInitialized)));
    }

    #[test]
    fn test_column_address() {
        let t = TiledDescriptor::new(region(15, ElementType::Float64), 5, 3).unwrap();
        let c = t.column(2).unwrap();
        assert_eq!(c.address, 0x1000 + 2 * 5 * 8);
        assert_eq!(c.len, 5);
        assert!(t.column(3).is_err());
    }

    #[test]
    fn test_tiled_len_checked() {
        assert!(matches!(
            TiledDescriptor::new(region(14, ElementType::Float32), 5, 3),
            Err(MemError::SizeMismatch {
                expected: 15,
                got: 14
            })
        ));
    }

    #[test]
    fn test_reshape_updates_together() {
        let mut t = TiledDescriptor::new(region(6, ElementType::Int32), 2, 3).unwrap();
        assert!(t.reshape(region(8, ElementType::Int32), 2, 3).is_err());
        assert_eq!((t.rows(), t.cols(), t.len()), (2, 3, 6));
        t.reshape(region(8, ElementType::Int32), 4, 2).unwrap();
        assert_eq!((t.rows(), t.cols(), t.len()), (4, 2, 8));
    }

    #[test]
    fn test_cube_column_address() {
        let c = CubedDescriptor::new(region(4 * 3 * 2, ElementType::Float32), 4, 3, 2).unwrap();
        let col = c.column(1, 2).unwrap();
        assert_eq!(col.address, 0x1000 + 4 * (3 + 2) * 4);
        let cube = c.cube(1).unwrap();
        assert_eq!(cube.base().address, 0x1000 + 4 * 3 * 4);
        assert!(c.cube(2).is_err());
    }
}
