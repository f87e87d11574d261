//! Owning buffers and borrowed views.
//!
//! A [`Buffer`] exclusively owns one backend allocation and frees it exactly
//! once, either through [`Buffer::dispose`] or on drop. [`BufferView`] and
//! [`BufferViewMut`] alias memory owned by a live buffer; they never
//! allocate or free, and the borrow checker keeps them from outliving the
//! owner.
//!
//! Read and write operations shared by every buffer-like type live on the
//! [`Memory`] and [`MemoryMut`] traits.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::Context;
use crate::config::{self, EqualityPolicy};
use crate::descriptor::MemoryDescriptor;
use crate::types::{Element, ElementType, HostArray, MemorySpace};
use crate::{MemError, Result};

static LIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);

/// Number of owning buffers currently holding an allocation.
pub fn live_buffers() -> usize {
    LIVE_BUFFERS.load(Ordering::Relaxed)
}

// ── Traits ──────────────────────────────────────────────────────────────

pub(crate) mod sealed {
    /// Implemented only by handles whose descriptor is derived from a live
    /// backend allocation.
    pub trait Sealed {}
}

/// Read access to a typed region.
///
/// The trait is sealed: the default methods hand `descriptor()` to raw
/// backend copies, so only handles that own or borrow a live allocation
/// may implement it.
///
/// ```compile_fail
/// use lightmem_core::{Context, Memory, MemorySpace, ElementType};
/// use lightmem_core::descriptor::MemoryDescriptor;
///
/// struct Forged(Context);
///
/// impl Memory for Forged {
///     fn descriptor(&self) -> MemoryDescriptor {
///         MemoryDescriptor::new(0x10, 4, MemorySpace::Host, ElementType::Int32)
///     }
///
///     fn context(&self) -> &Context {
///         &self.0
///     }
/// }
/// ```
pub trait Memory: sealed::Sealed {
    fn descriptor(&self) -> MemoryDescriptor;

    fn context(&self) -> &Context;

    fn len(&self) -> usize {
        self.descriptor().len
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dtype(&self) -> ElementType {
        self.descriptor().dtype
    }

    fn space(&self) -> MemorySpace {
        self.descriptor().space
    }

    /// Copy the contents into a typed host array.
    fn to_host(&self) -> Result<HostArray> {
        download(self.context(), &self.descriptor())
    }

    /// Copy the contents into a `Vec<T>`; `T` must match the dtype.
    fn get<T: Element>(&self) -> Result<Vec<T>>
    where
        Self: Sized,
    {
        require_dtype(self.dtype(), T::DTYPE)?;
        T::from_array(self.to_host()?).ok_or(MemError::DTypeMismatch {
            expected: self.dtype(),
            got: T::DTYPE,
        })
    }

    fn sum(&self) -> Result<f64> {
        let desc = require_allocated(self.descriptor())?;
        if desc.len == 0 {
            return Ok(0.0);
        }
        // SAFETY: `desc` addresses memory kept alive by `self`.
        unsafe { self.context().sum(&desc) }
    }

    /// Value equality under the process-wide [`EqualityPolicy`].
    fn equals<M: Memory>(&self, other: &M) -> Result<bool>
    where
        Self: Sized,
    {
        self.equals_with(other, config::equality_policy())
    }

    /// Value equality under `policy`.
    ///
    /// Buffers of different dtype, space or length are never equal.
    fn equals_with<M: Memory>(&self, other: &M, policy: EqualityPolicy) -> Result<bool>
    where
        Self: Sized,
    {
        let (a, b) = (self.descriptor(), other.descriptor());
        if a.dtype != b.dtype || a.space != b.space || a.len != b.len {
            return Ok(false);
        }
        if a.len == 0 {
            return Ok(true);
        }
        let diff = if self.context().same_backend(other.context()) {
            let (a, b) = (require_allocated(a)?, require_allocated(b)?);
            // SAFETY: both descriptors address memory kept alive by `self` and `other`.
            unsafe { self.context().abs_max_diff(&a, &b)? }
        } else {
            let (x, y) = (self.to_host()?.to_f64_vec(), other.to_host()?.to_f64_vec());
            host_abs_max_diff(&x, &y)
        };
        Ok(policy.accepts(a.dtype, diff))
    }
}

/// Largest `|x - y|`; NaN as soon as any pair differs by NaN.
fn host_abs_max_diff(x: &[f64], y: &[f64]) -> f64 {
    let mut max = 0.0f64;
    for (p, q) in x.iter().zip(y) {
        let d = (p - q).abs();
        if d.is_nan() {
            return f64::NAN;
        }
        max = max.max(d);
    }
    max
}

/// Write access to a typed region.
///
/// `&mut self` guarantees no other handle reads the region during a write.
pub trait MemoryMut: Memory {
    /// Broadcast `value` (converted to the dtype) into every element.
    fn set(&mut self, value: f64) -> Result<()> {
        let desc = require_allocated(self.descriptor())?;
        // SAFETY: exclusive access to memory kept alive by `self`.
        unsafe { self.context().initialize(&desc, value) }
    }

    /// Overwrite with `data`; lengths and dtypes must match exactly.
    fn copy_from_host(&mut self, data: &HostArray) -> Result<()> {
        let desc = self.descriptor();
        require_dtype(desc.dtype, data.dtype())?;
        require_len(desc.len, data.len())?;
        upload(self.context(), &desc, data)
    }

    /// Overwrite with `data`; lengths must match and `T` must be the dtype.
    fn copy_from_slice<T: Element>(&mut self, data: &[T]) -> Result<()>
    where
        Self: Sized,
    {
        let desc = self.descriptor();
        require_dtype(desc.dtype, T::DTYPE)?;
        require_len(desc.len, data.len())?;
        if desc.len == 0 {
            return Ok(());
        }
        let desc = require_allocated(desc)?;
        // SAFETY: `data` is a live host slice of `desc.len` elements.
        unsafe {
            self.context()
                .copy(&desc, &MemoryDescriptor::from_host_slice(data))
        }
    }

    /// Copy another region of equal length and dtype, across spaces if needed.
    fn copy_from<M: Memory>(&mut self, src: &M) -> Result<()>
    where
        Self: Sized,
    {
        let (dst, s) = (self.descriptor(), src.descriptor());
        require_dtype(dst.dtype, s.dtype)?;
        require_len(dst.len, s.len)?;
        if dst.len == 0 {
            return Ok(());
        }
        if self.context().same_backend(src.context()) {
            let (dst, s) = (require_allocated(dst)?, require_allocated(s)?);
            // SAFETY: `dst` is exclusively borrowed, `s` is kept alive by `src`.
            unsafe { self.context().copy(&dst, &s) }
        } else {
            let staged = src.to_host()?;
            upload(self.context(), &dst, &staged)
        }
    }

    /// Evenly spaced values from `x0` to `x1` inclusive.
    fn lin_space(&mut self, x0: f64, x1: f64) -> Result<()> {
        let desc = require_allocated(self.descriptor())?;
        // SAFETY: exclusive access to memory kept alive by `self`.
        unsafe { self.context().lin_space(&desc, x0, x1) }
    }

    fn random_uniform(&mut self, seed: u64) -> Result<()> {
        let desc = require_allocated(self.descriptor())?;
        // SAFETY: exclusive access to memory kept alive by `self`.
        unsafe { self.context().random_uniform(&desc, seed) }
    }

    fn random_gaussian(&mut self, seed: u64) -> Result<()> {
        let desc = require_allocated(self.descriptor())?;
        // SAFETY: exclusive access to memory kept alive by `self`.
        unsafe { self.context().random_gaussian(&desc, seed) }
    }

    fn scale(&mut self, alpha: f64) -> Result<()> {
        let desc = require_allocated(self.descriptor())?;
        // SAFETY: exclusive access to memory kept alive by `self`.
        unsafe { self.context().scale(&desc, alpha) }
    }

    /// `self += alpha * x`.
    fn add_assign_scaled<M: Memory>(&mut self, x: &M, alpha: f64) -> Result<()>
    where
        Self: Sized,
    {
        let (y, x_desc) = require_compatible(self, x)?;
        // SAFETY: `y` is exclusively borrowed, `x_desc` is kept alive by `x`.
        unsafe { self.context().axpy(&y, &x_desc, alpha) }
    }

    /// `self -= x`.
    fn sub_assign<M: Memory>(&mut self, x: &M) -> Result<()>
    where
        Self: Sized,
    {
        self.add_assign_scaled(x, -1.0)
    }

    /// `self *= x` element-wise.
    fn hadamard_assign<M: Memory>(&mut self, x: &M) -> Result<()>
    where
        Self: Sized,
    {
        let (z, x_desc) = require_compatible(self, x)?;
        // SAFETY: `z` is exclusively borrowed, `x_desc` is kept alive by `x`.
        unsafe { self.context().hadamard(&z, &z, &x_desc) }
    }
}

// ── Owning buffer ───────────────────────────────────────────────────────

/// A buffer that owns its allocation.
pub struct Buffer {
    ctx: Context,
    desc: MemoryDescriptor,
    disposed: bool,
}

impl Buffer {
    /// Allocate `len` zeroed elements. A zero-sized buffer stays unallocated.
    pub fn new(ctx: &Context, len: usize, space: MemorySpace, dtype: ElementType) -> Result<Self> {
        let desc = if len == 0 {
            MemoryDescriptor::unallocated(0, space, dtype)
        } else {
            let desc = ctx.alloc(len, space, dtype)?;
            LIVE_BUFFERS.fetch_add(1, Ordering::Relaxed);
            desc
        };
        Ok(Self {
            ctx: ctx.clone(),
            desc,
            disposed: false,
        })
    }

    /// Allocate and fill with `value`.
    pub fn filled(
        ctx: &Context,
        len: usize,
        space: MemorySpace,
        dtype: ElementType,
        value: f64,
    ) -> Result<Self> {
        let mut buf = Self::new(ctx, len, space, dtype)?;
        if len > 0 {
            buf.set(value)?;
        }
        Ok(buf)
    }

    /// Allocate and copy `data` in.
    pub fn from_slice<T: Element>(ctx: &Context, data: &[T], space: MemorySpace) -> Result<Self> {
        let mut buf = Self::new(ctx, data.len(), space, T::DTYPE)?;
        buf.copy_from_slice(data)?;
        Ok(buf)
    }

    pub fn from_host(ctx: &Context, data: &HostArray, space: MemorySpace) -> Result<Self> {
        let mut buf = Self::new(ctx, data.len(), space, data.dtype())?;
        buf.copy_from_host(data)?;
        Ok(buf)
    }

    /// Deep copy into a fresh allocation on the same context.
    pub fn try_clone(&self) -> Result<Self> {
        let mut out = Self::new(&self.ctx, self.desc.len, self.desc.space, self.desc.dtype)?;
        out.copy_from(self)?;
        Ok(out)
    }

    /// Copy into a fresh buffer in `space`.
    pub fn to_space(&self, space: MemorySpace) -> Result<Self> {
        let mut out = Self::new(&self.ctx, self.desc.len, space, self.desc.dtype)?;
        out.copy_from(self)?;
        Ok(out)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release the allocation. Idempotent.
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.release()?;
        self.desc.len = 0;
        self.disposed = true;
        Ok(())
    }

    /// Free and reallocate for `len` zeroed elements.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        if self.disposed {
            return Err(MemError::BufferNotInitialized);
        }
        tracing::debug!(from = self.desc.len, to = len, space = %self.desc.space, "resize");
        self.release()?;
        if len > 0 {
            self.desc = self.ctx.alloc(len, self.desc.space, self.desc.dtype)?;
            LIVE_BUFFERS.fetch_add(1, Ordering::Relaxed);
        } else {
            self.desc.len = 0;
        }
        Ok(())
    }

    /// Overwrite with `data`, reallocating when the length differs.
    pub fn read_from<T: Element>(&mut self, data: &[T]) -> Result<()> {
        require_dtype(self.desc.dtype, T::DTYPE)?;
        if data.len() != self.desc.len || self.desc.is_null() {
            self.resize(data.len())?;
        }
        self.copy_from_slice(data)
    }

    /// Overwrite with `data`, reallocating when the length differs.
    pub fn read_from_host(&mut self, data: &HostArray) -> Result<()> {
        require_dtype(self.desc.dtype, data.dtype())?;
        if data.len() != self.desc.len || self.desc.is_null() {
            self.resize(data.len())?;
        }
        self.copy_from_host(data)
    }

    pub fn view(&self) -> BufferView<'_> {
        BufferView {
            ctx: &self.ctx,
            desc: self.desc,
            _owner: PhantomData,
        }
    }

    pub fn view_mut(&mut self) -> BufferViewMut<'_> {
        BufferViewMut {
            ctx: &self.ctx,
            desc: self.desc,
            _owner: PhantomData,
        }
    }

    /// View of `len` elements starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<BufferView<'_>> {
        Ok(BufferView {
            ctx: &self.ctx,
            desc: self.desc.slice(offset, len)?,
            _owner: PhantomData,
        })
    }

    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<BufferViewMut<'_>> {
        let desc = self.desc.slice(offset, len)?;
        Ok(BufferViewMut {
            ctx: &self.ctx,
            desc,
            _owner: PhantomData,
        })
    }

    fn release(&mut self) -> Result<()> {
        if self.desc.is_null() {
            return Ok(());
        }
        let desc = self.desc;
        self.desc.address = 0;
        LIVE_BUFFERS.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: `desc` was returned by `alloc` on this context and is cleared
        // above, so it is freed at most once.
        unsafe { self.ctx.free(&desc) }
    }
}

impl Memory for Buffer {
    fn descriptor(&self) -> MemoryDescriptor {
        self.desc
    }

    fn context(&self) -> &Context {
        &self.ctx
    }
}

impl MemoryMut for Buffer {}

impl sealed::Sealed for Buffer {}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.disposed || self.desc.is_null() {
            return;
        }
        tracing::debug!(
            len = self.desc.len,
            space = %self.desc.space,
            dtype = %self.desc.dtype,
            "buffer dropped without dispose"
        );
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release buffer");
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.desc.len)
            .field("space", &self.desc.space)
            .field("dtype", &self.desc.dtype)
            .field("disposed", &self.disposed)
            .finish()
    }
}

// ── Views ───────────────────────────────────────────────────────────────

/// Read-only view into memory owned elsewhere.
#[derive(Clone, Copy, Debug)]
pub struct BufferView<'a> {
    ctx: &'a Context,
    desc: MemoryDescriptor,
    _owner: PhantomData<&'a ()>,
}

impl<'a> BufferView<'a> {
    /// View of a region derived from a live owner borrowed for `'a`.
    pub(crate) fn borrowed(ctx: &'a Context, desc: MemoryDescriptor) -> Self {
        Self {
            ctx,
            desc,
            _owner: PhantomData,
        }
    }

    /// Wrap an externally owned region.
    ///
    /// # Safety
    ///
    /// `desc` must address live memory of its stated length, space and dtype,
    /// reachable by `ctx`'s backend, for all of `'a`, with no concurrent
    /// writer.
    pub unsafe fn from_raw_parts(ctx: &'a Context, desc: MemoryDescriptor) -> Result<Self> {
        if desc.is_null() {
            return Err(MemError::BufferNotInitialized);
        }
        Ok(Self {
            ctx,
            desc,
            _owner: PhantomData,
        })
    }

    /// Sub-view of `len` elements starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<BufferView<'a>> {
        Ok(BufferView {
            ctx: self.ctx,
            desc: self.desc.slice(offset, len)?,
            _owner: PhantomData,
        })
    }

    /// Copy into a new owning buffer.
    pub fn to_buffer(&self) -> Result<Buffer> {
        let mut out = Buffer::new(self.ctx, self.desc.len, self.desc.space, self.desc.dtype)?;
        out.copy_from(self)?;
        Ok(out)
    }
}

impl sealed::Sealed for BufferView<'_> {}

impl Memory for BufferView<'_> {
    fn descriptor(&self) -> MemoryDescriptor {
        self.desc
    }

    fn context(&self) -> &Context {
        self.ctx
    }
}

/// Mutable view into memory owned elsewhere.
#[derive(Debug)]
pub struct BufferViewMut<'a> {
    ctx: &'a Context,
    desc: MemoryDescriptor,
    _owner: PhantomData<&'a mut ()>,
}

impl<'a> BufferViewMut<'a> {
    /// Mutable view of a region derived from an owner exclusively borrowed for `'a`.
    pub(crate) fn borrowed(ctx: &'a Context, desc: MemoryDescriptor) -> Self {
        Self {
            ctx,
            desc,
            _owner: PhantomData,
        }
    }

    /// Wrap an externally owned region for writing.
    ///
    /// # Safety
    ///
    /// As [`BufferView::from_raw_parts`], and no other handle may access the
    /// region during `'a`.
    pub unsafe fn from_raw_parts(ctx: &'a Context, desc: MemoryDescriptor) -> Result<Self> {
        if desc.is_null() {
            return Err(MemError::BufferNotInitialized);
        }
        Ok(Self {
            ctx,
            desc,
            _owner: PhantomData,
        })
    }

    pub fn as_view(&self) -> BufferView<'_> {
        BufferView {
            ctx: self.ctx,
            desc: self.desc,
            _owner: PhantomData,
        }
    }

    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<BufferViewMut<'_>> {
        let desc = self.desc.slice(offset, len)?;
        Ok(BufferViewMut {
            ctx: self.ctx,
            desc,
            _owner: PhantomData,
        })
    }
}

impl Memory for BufferViewMut<'_> {
    fn descriptor(&self) -> MemoryDescriptor {
        self.desc
    }

    fn context(&self) -> &Context {
        self.ctx
    }
}

impl MemoryMut for BufferViewMut<'_> {}

impl sealed::Sealed for BufferViewMut<'_> {}

// ── Helpers ─────────────────────────────────────────────────────────────

pub(crate) fn require_allocated(desc: MemoryDescriptor) -> Result<MemoryDescriptor> {
    if desc.is_null() {
        return Err(MemError::BufferNotInitialized);
    }
    Ok(desc)
}

pub(crate) fn require_dtype(expected: ElementType, got: ElementType) -> Result<()> {
    if expected != got {
        return Err(MemError::DTypeMismatch { expected, got });
    }
    Ok(())
}

pub(crate) fn require_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(MemError::SizeMismatch { expected, got });
    }
    Ok(())
}

/// Check two operands share backend, space, dtype and length.
pub(crate) fn require_compatible<A: Memory, B: Memory>(
    a: &A,
    b: &B,
) -> Result<(MemoryDescriptor, MemoryDescriptor)> {
    a.context().require_same(b.context())?;
    let (x, y) = (a.descriptor(), b.descriptor());
    if x.space != y.space {
        return Err(MemError::SpaceMismatch {
            left: x.space,
            right: y.space,
        });
    }
    require_dtype(x.dtype, y.dtype)?;
    require_len(x.len, y.len)?;
    Ok((require_allocated(x)?, require_allocated(y)?))
}

/// Read `desc` into host memory, staging device regions through a host buffer.
pub(crate) fn download(ctx: &Context, desc: &MemoryDescriptor) -> Result<HostArray> {
    let mut out = HostArray::zeros(desc.dtype, desc.len);
    if desc.len == 0 {
        return Ok(out);
    }
    let src = require_allocated(*desc)?;
    let dst = out.descriptor_mut();
    match src.space {
        MemorySpace::Host => {
            // SAFETY: `out` is a fresh host array of `src.len` elements.
            unsafe { ctx.copy(&dst, &src)? };
        }
        MemorySpace::Device => {
            tracing::trace!(len = src.len, dtype = %src.dtype, "staging device read");
            let staging = Buffer::new(ctx, src.len, MemorySpace::Host, src.dtype)?;
            // SAFETY: `staging` and `out` are fresh regions of `src.len` elements.
            unsafe {
                ctx.copy(&staging.descriptor(), &src)?;
                ctx.copy(&dst, &staging.descriptor())?;
            }
        }
    }
    Ok(out)
}

/// Write host data into `desc`; lengths and dtypes must already match.
pub(crate) fn upload(ctx: &Context, desc: &MemoryDescriptor, data: &HostArray) -> Result<()> {
    if desc.len == 0 {
        return Ok(());
    }
    let dst = require_allocated(*desc)?;
    // SAFETY: `data` is a live host array of `dst.len` elements.
    unsafe { ctx.copy(&dst, &data.descriptor()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::cpu()
    }

    #[test]
    fn test_host_diff_propagates_nan() {
        assert_eq!(host_abs_max_diff(&[1.0, 4.0], &[1.5, 2.0]), 2.0);
        assert!(host_abs_max_diff(&[f64::NAN, 2.0], &[1.0, 2.0]).is_nan());
        assert!(host_abs_max_diff(&[0.0, 2.0], &[1.0, f64::NAN]).is_nan());
        assert_eq!(host_abs_max_diff(&[], &[]), 0.0);
    }

    #[test]
    fn test_new_allocates_and_drop_frees() {
        let ctx = ctx();
        {
            let buf = Buffer::new(&ctx, 10, MemorySpace::Device, ElementType::Float32).unwrap();
            assert_eq!(buf.len(), 10);
            assert_eq!(ctx.live_allocations(), 1);
        }
        assert_eq!(ctx.live_allocations(), 0);
    }

    #[test]
    fn test_zero_sized_is_unallocated() {
        let ctx = ctx();
        let buf = Buffer::new(&ctx, 0, MemorySpace::Host, ElementType::Int32).unwrap();
        assert!(buf.descriptor().is_null());
        assert_eq!(ctx.live_allocations(), 0);
        assert_eq!(buf.to_host().unwrap(), HostArray::Int32(vec![]));
    }

    #[test]
    fn test_dispose_idempotent() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 4, MemorySpace::Device, ElementType::Float64).unwrap();
        buf.dispose().unwrap();
        buf.dispose().unwrap();
        assert!(buf.is_disposed());
        assert_eq!(ctx.live_allocations(), 0);
        assert!(matches!(buf.set(1.0), Err(MemError::BufferNotInitialized)));
    }

    #[test]
    fn test_set_and_get_device() {
        let ctx = ctx();
        let buf = Buffer::filled(&ctx, 3, MemorySpace::Device, ElementType::Int32, 2.0).unwrap();
        assert_eq!(buf.get::<i32>().unwrap(), vec![2, 2, 2]);
        assert!(matches!(
            buf.get::<f32>(),
            Err(MemError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_read_from_resizes() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 2, MemorySpace::Device, ElementType::Float32).unwrap();
        buf.read_from(&[1.0f32, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.get::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ctx.live_allocations(), 1);
    }

    #[test]
    fn test_view_rejects_size_mismatch() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 4, MemorySpace::Device, ElementType::Float64).unwrap();
        let mut view = buf.slice_mut(1, 2).unwrap();
        assert!(matches!(
            view.copy_from_slice(&[1.0f64, 2.0, 3.0]),
            Err(MemError::SizeMismatch {
                expected: 2,
                got: 3
            })
        ));
        view.copy_from_slice(&[7.0f64, 8.0]).unwrap();
        assert_eq!(buf.get::<f64>().unwrap(), vec![0.0, 7.0, 8.0, 0.0]);
    }

    #[test]
    fn test_view_from_null_fails() {
        let ctx = ctx();
        let desc = MemoryDescriptor::unallocated(3, MemorySpace::Device, ElementType::Int32);
        assert!(matches!(
            unsafe { BufferView::from_raw_parts(&ctx, desc) },
            Err(MemError::BufferNotInitialized)
        ));
    }

    #[test]
    fn test_equality_rules() {
        let ctx = ctx();
        let a = Buffer::from_slice(&ctx, &[1.0f32, 2.0], MemorySpace::Device).unwrap();
        let b = Buffer::from_slice(&ctx, &[1.0f32, 2.0], MemorySpace::Device).unwrap();
        let host = Buffer::from_slice(&ctx, &[1.0f32, 2.0], MemorySpace::Host).unwrap();
        let f64s = Buffer::from_slice(&ctx, &[1.0f64, 2.0], MemorySpace::Device).unwrap();
        assert!(a.equals(&b).unwrap());
        assert!(!a.equals(&host).unwrap());
        assert!(!a.equals(&f64s).unwrap());

        let x = Buffer::from_slice(&ctx, &[1.0f64, 2.0], MemorySpace::Device).unwrap();
        let y = Buffer::from_slice(&ctx, &[1.0f64, 2.0 + 4.440892098500626e-16], MemorySpace::Device)
            .unwrap();
        assert!(x.equals_with(&y, EqualityPolicy::DEFAULT_TOLERANCE).unwrap());
        assert!(!x.equals_with(&y, EqualityPolicy::Exact).unwrap());
        assert!(!x.equals(&f64s.to_space(MemorySpace::Host).unwrap()).unwrap());
    }

    #[test]
    fn test_equality_across_backends() {
        let a = Buffer::from_slice(&ctx(), &[3i32, 4], MemorySpace::Host).unwrap();
        let b = Buffer::from_slice(&ctx(), &[3i32, 4], MemorySpace::Host).unwrap();
        assert!(a.equals(&b).unwrap());
    }

    #[test]
    fn test_copy_from_across_spaces() {
        let ctx = ctx();
        let host = Buffer::from_slice(&ctx, &[1i32, 2, 3], MemorySpace::Host).unwrap();
        let mut dev = Buffer::new(&ctx, 3, MemorySpace::Device, ElementType::Int32).unwrap();
        dev.copy_from(&host).unwrap();
        assert_eq!(dev.get::<i32>().unwrap(), vec![1, 2, 3]);
        assert_eq!(host.to_space(MemorySpace::Device).unwrap().get::<i32>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_arithmetic() {
        let ctx = ctx();
        let mut y = Buffer::from_slice(&ctx, &[1.0f64, 2.0, 3.0], MemorySpace::Device).unwrap();
        let x = Buffer::from_slice(&ctx, &[1.0f64, 1.0, 1.0], MemorySpace::Device).unwrap();
        y.add_assign_scaled(&x, 2.0).unwrap();
        assert_eq!(y.get::<f64>().unwrap(), vec![3.0, 4.0, 5.0]);
        y.sub_assign(&x).unwrap();
        y.scale(0.5).unwrap();
        assert_eq!(y.get::<f64>().unwrap(), vec![1.0, 1.5, 2.0]);
        let copy = y.try_clone().unwrap();
        y.hadamard_assign(&copy).unwrap();
        assert_eq!(y.get::<f64>().unwrap(), vec![1.0, 2.25, 4.0]);
        assert_eq!(y.sum().unwrap(), 7.25);
    }

    #[test]
    fn test_arithmetic_space_mismatch() {
        let ctx = ctx();
        let mut y = Buffer::new(&ctx, 2, MemorySpace::Device, ElementType::Float32).unwrap();
        let x = Buffer::new(&ctx, 2, MemorySpace::Host, ElementType::Float32).unwrap();
        assert!(matches!(
            y.add_assign_scaled(&x, 1.0),
            Err(MemError::SpaceMismatch { .. })
        ));
    }

    #[test]
    fn test_arithmetic_backend_mismatch() {
        let mut y = Buffer::new(&ctx(), 2, MemorySpace::Device, ElementType::Float32).unwrap();
        let x = Buffer::new(&ctx(), 2, MemorySpace::Device, ElementType::Float32).unwrap();
        assert!(matches!(
            y.add_assign_scaled(&x, 1.0),
            Err(MemError::BackendMismatch { .. })
        ));
    }
}
