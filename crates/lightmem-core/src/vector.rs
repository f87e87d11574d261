//! One-dimensional owning buffer.

use std::fmt;

use crate::backend::Context;
use crate::buffer::sealed::Sealed;
use crate::buffer::{Buffer, BufferView, BufferViewMut, Memory, MemoryMut};
use crate::descriptor::MemoryDescriptor;
use crate::types::{Element, ElementType, HostArray, MemorySpace};
use crate::Result;

/// Non-owning vector handle (a matrix column, a slice of a vector).
pub type VectorView<'a> = BufferView<'a>;
pub type VectorViewMut<'a> = BufferViewMut<'a>;

/// A dense vector that owns its storage.
pub struct Vector {
    buf: Buffer,
}

impl Vector {
    pub fn new(ctx: &Context, len: usize, space: MemorySpace, dtype: ElementType) -> Result<Self> {
        Ok(Self {
            buf: Buffer::new(ctx, len, space, dtype)?,
        })
    }

    pub fn filled(
        ctx: &Context,
        len: usize,
        space: MemorySpace,
        dtype: ElementType,
        value: f64,
    ) -> Result<Self> {
        Ok(Self {
            buf: Buffer::filled(ctx, len, space, dtype, value)?,
        })
    }

    pub fn from_slice<T: Element>(ctx: &Context, data: &[T], space: MemorySpace) -> Result<Self> {
        Ok(Self {
            buf: Buffer::from_slice(ctx, data, space)?,
        })
    }

    pub fn from_host(ctx: &Context, data: &HostArray, space: MemorySpace) -> Result<Self> {
        Ok(Self {
            buf: Buffer::from_host(ctx, data, space)?,
        })
    }

    /// `len` evenly spaced values from `x0` to `x1`.
    pub fn linspace(
        ctx: &Context,
        len: usize,
        space: MemorySpace,
        dtype: ElementType,
        x0: f64,
        x1: f64,
    ) -> Result<Self> {
        let mut v = Self::new(ctx, len, space, dtype)?;
        if len > 0 {
            v.lin_space(x0, x1)?;
        }
        Ok(v)
    }

    pub fn random_uniform_with(
        ctx: &Context,
        len: usize,
        space: MemorySpace,
        dtype: ElementType,
        seed: u64,
    ) -> Result<Self> {
        let mut v = Self::new(ctx, len, space, dtype)?;
        if len > 0 {
            v.random_uniform(seed)?;
        }
        Ok(v)
    }

    pub fn random_gaussian_with(
        ctx: &Context,
        len: usize,
        space: MemorySpace,
        dtype: ElementType,
        seed: u64,
    ) -> Result<Self> {
        let mut v = Self::new(ctx, len, space, dtype)?;
        if len > 0 {
            v.random_gaussian(seed)?;
        }
        Ok(v)
    }

    /// Copy of any vector-shaped region.
    pub fn copy_of<M: Memory>(src: &M) -> Result<Self> {
        let d = src.descriptor();
        let mut v = Self::new(src.context(), d.len, d.space, d.dtype)?;
        v.copy_from(src)?;
        Ok(v)
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            buf: self.buf.try_clone()?,
        })
    }

    pub fn to_space(&self, space: MemorySpace) -> Result<Self> {
        Ok(Self {
            buf: self.buf.to_space(space)?,
        })
    }

    /// Overwrite with `data`, reallocating when the length differs.
    pub fn read_from<T: Element>(&mut self, data: &[T]) -> Result<()> {
        self.buf.read_from(data)
    }

    pub fn read_from_host(&mut self, data: &HostArray) -> Result<()> {
        self.buf.read_from_host(data)
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.buf.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.buf.is_disposed()
    }

    pub fn view(&self) -> VectorView<'_> {
        self.buf.view()
    }

    pub fn view_mut(&mut self) -> VectorViewMut<'_> {
        self.buf.view_mut()
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<VectorView<'_>> {
        self.buf.slice(offset, len)
    }

    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<VectorViewMut<'_>> {
        self.buf.slice_mut(offset, len)
    }

    pub fn as_buffer(&self) -> &Buffer {
        &self.buf
    }

    pub fn into_buffer(self) -> Buffer {
        self.buf
    }
}

impl From<Buffer> for Vector {
    fn from(buf: Buffer) -> Self {
        Self { buf }
    }
}

impl Memory for Vector {
    fn descriptor(&self) -> MemoryDescriptor {
        self.buf.descriptor()
    }

    fn context(&self) -> &Context {
        self.buf.context()
    }
}

impl MemoryMut for Vector {}

impl Sealed for Vector {}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("len", &self.len())
            .field("space", &self.space())
            .field("dtype", &self.dtype())
            .finish()
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_host() {
            Ok(values) => write!(f, "{values}"),
            Err(e) => write!(f, "<unreadable: {e}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_roundtrip() {
        let ctx = Context::cpu();
        let v = Vector::from_slice(&ctx, &[1.5f64, -2.0, 3.25], MemorySpace::Device).unwrap();
        assert_eq!(v.get::<f64>().unwrap(), vec![1.5, -2.0, 3.25]);
        assert_eq!(v.to_string(), "1.5 -2 3.25");
    }

    #[test]
    fn test_linspace() {
        let ctx = Context::cpu();
        let v = Vector::linspace(&ctx, 3, MemorySpace::Device, ElementType::Float32, 0.0, 1.0)
            .unwrap();
        assert_eq!(v.get::<f32>().unwrap(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_random_int_rejected() {
        let ctx = Context::cpu();
        let err = Vector::random_uniform_with(&ctx, 4, MemorySpace::Device, ElementType::Int32, 7)
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_clone_is_deep() {
        let ctx = Context::cpu();
        let a = Vector::filled(&ctx, 4, MemorySpace::Device, ElementType::Int32, 1.0).unwrap();
        let mut b = a.try_clone().unwrap();
        b.set(9.0).unwrap();
        assert_eq!(a.get::<i32>().unwrap(), vec![1; 4]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_slice_writes_owner() {
        let ctx = Context::cpu();
        let mut v = Vector::new(&ctx, 6, MemorySpace::Device, ElementType::Float64).unwrap();
        v.slice_mut(2, 3).unwrap().set(4.0).unwrap();
        assert_eq!(
            v.get::<f64>().unwrap(),
            vec![0.0, 0.0, 4.0, 4.0, 4.0, 0.0]
        );
        assert_eq!(Vector::copy_of(&v.slice(2, 2).unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_initializers() {
        let ctx = Context::cpu();
        let a = Vector::linspace(&ctx, 0, MemorySpace::Device, ElementType::Float64, 0.0, 1.0)
            .unwrap();
        let b = Vector::random_uniform_with(&ctx, 0, MemorySpace::Device, ElementType::Float32, 1)
            .unwrap();
        let c = Vector::random_gaussian_with(&ctx, 0, MemorySpace::Host, ElementType::Float64, 1)
            .unwrap();
        assert!(a.is_empty() && b.is_empty() && c.is_empty());
        assert_eq!(ctx.live_allocations(), 0);
    }
}
