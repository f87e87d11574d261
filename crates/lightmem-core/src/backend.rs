//! Backend trait and Context: the pluggable engine behind every buffer.
//!
//! A `ComputeBackend` allocates, copies and transforms raw regions described
//! by [`MemoryDescriptor`]s and reports failures as `i32` status codes. A
//! [`Context`] shares one backend between buffers and turns those statuses
//! into [`MemError`]s through the tables in [`crate::status`].

use std::sync::{Arc, LazyLock};

use crate::config::{self, BackendKind};
use crate::cpu_backend::CpuRefBackend;
use crate::descriptor::{CsrDescriptor, MemoryDescriptor, SparseVectorDescriptor};
use crate::status::{StatusFamily, check, check_alloc};
use crate::types::{ElementType, MemorySpace};
use crate::{MemError, Result};

/// Pluggable compute backend.
///
/// All methods return `0` on success. Memory, initializer and device
/// methods report [`StatusFamily::Runtime`] codes, dense kernels report
/// [`StatusFamily::Blas`] codes and sparse kernels [`StatusFamily::Sparse`].
///
/// # Safety
///
/// Methods taking descriptors are `unsafe`: callers guarantee that every
/// descriptor addresses live memory of the stated length, space and dtype for
/// the duration of the call, and that destination regions are not
/// concurrently accessed.
pub trait ComputeBackend: Send + Sync {
    /// Short name used in logs and mismatch errors.
    fn name(&self) -> &'static str;

    /// Allocate `len` zeroed elements and store the address in `out`.
    fn alloc(&self, len: usize, space: MemorySpace, dtype: ElementType, out: &mut usize) -> i32;

    /// Release a region previously returned by `alloc`.
    unsafe fn free(&self, region: &MemoryDescriptor) -> i32;

    /// Copy `src` into `dst`; both must have the same length and dtype.
    unsafe fn copy(&self, dst: &MemoryDescriptor, src: &MemoryDescriptor) -> i32;

    /// Fill `dst` with `value`, converted to its dtype.
    unsafe fn initialize(&self, dst: &MemoryDescriptor, value: f64) -> i32;

    /// Evenly spaced values from `x0` to `x1` inclusive.
    unsafe fn lin_space(&self, dst: &MemoryDescriptor, x0: f64, x1: f64) -> i32;

    /// Uniform samples in `[0, 1)`; floating point dtypes only.
    unsafe fn random_uniform(&self, dst: &MemoryDescriptor, seed: u64) -> i32;

    /// Standard normal samples; floating point dtypes only.
    unsafe fn random_gaussian(&self, dst: &MemoryDescriptor, seed: u64) -> i32;

    /// `out = max_i |x[i] - y[i]|`.
    unsafe fn abs_max_diff(&self, x: &MemoryDescriptor, y: &MemoryDescriptor, out: &mut f64)
    -> i32;

    /// `out = sum_i x[i]`.
    unsafe fn sum(&self, x: &MemoryDescriptor, out: &mut f64) -> i32;

    /// `y += alpha * x`.
    unsafe fn axpy(&self, y: &MemoryDescriptor, x: &MemoryDescriptor, alpha: f64) -> i32;

    /// `x *= alpha`.
    unsafe fn scale(&self, x: &MemoryDescriptor, alpha: f64) -> i32;

    /// `z = x * y` element-wise.
    unsafe fn hadamard(
        &self,
        z: &MemoryDescriptor,
        x: &MemoryDescriptor,
        y: &MemoryDescriptor,
    ) -> i32;

    /// Dense `y += alpha * x` for a compressed `x`.
    unsafe fn sparse_axpy(
        &self,
        y: &MemoryDescriptor,
        x: &SparseVectorDescriptor,
        alpha: f64,
    ) -> i32;

    /// `y = alpha * A x` for a CSR matrix `A`.
    unsafe fn csr_mv(
        &self,
        y: &MemoryDescriptor,
        a: &CsrDescriptor,
        x: &MemoryDescriptor,
        alpha: f64,
    ) -> i32;

    fn device_count(&self, out: &mut i32) -> i32;

    fn set_device(&self, id: i32) -> i32;

    fn best_device(&self, out: &mut i32) -> i32;

    /// Block until all queued work has finished.
    fn synchronize(&self) -> i32;

    /// Sticky status of the current device.
    fn device_status(&self) -> i32;

    /// Number of regions allocated and not yet freed.
    fn live_allocations(&self) -> usize;
}

/// Shared handle to a compute backend.
#[derive(Clone)]
pub struct Context {
    backend: Arc<dyn ComputeBackend>,
}

impl Context {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend }
    }

    /// A fresh CPU reference backend, independent of the default context.
    pub fn cpu() -> Self {
        Self::new(Arc::new(CpuRefBackend::new()))
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether both contexts share one backend instance.
    pub fn same_backend(&self, other: &Context) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.backend), Arc::as_ptr(&other.backend))
    }

    pub(crate) fn require_same(&self, other: &Context) -> Result<()> {
        if self.same_backend(other) {
            Ok(())
        } else {
            Err(MemError::BackendMismatch {
                left: self.name(),
                right: other.name(),
            })
        }
    }

    pub fn live_allocations(&self) -> usize {
        self.backend.live_allocations()
    }

    // ── Memory ──────────────────────────────────────────────────────────

    pub fn alloc(
        &self,
        len: usize,
        space: MemorySpace,
        dtype: ElementType,
    ) -> Result<MemoryDescriptor> {
        let mut address = 0usize;
        check_alloc("alloc", self.backend.alloc(len, space, dtype, &mut address))?;
        if address == 0 {
            return Err(MemError::BackendUnavailable("alloc returned a null address"));
        }
        tracing::trace!(backend = self.name(), len, %space, %dtype, address, "alloc");
        Ok(MemoryDescriptor::new(address, len, space, dtype))
    }

    /// # Safety
    ///
    /// `region` must have been returned by [`Context::alloc`] on this context
    /// and not freed since.
    pub unsafe fn free(&self, region: &MemoryDescriptor) -> Result<()> {
        tracing::trace!(backend = self.name(), address = region.address, "free");
        check(
            "free",
            StatusFamily::Runtime,
            unsafe { self.backend.free(region) },
        )
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn copy(&self, dst: &MemoryDescriptor, src: &MemoryDescriptor) -> Result<()> {
        check(
            "copy",
            StatusFamily::Runtime,
            unsafe { self.backend.copy(dst, src) },
        )
    }

    // ── Initializers ────────────────────────────────────────────────────

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn initialize(&self, dst: &MemoryDescriptor, value: f64) -> Result<()> {
        check(
            "initialize",
            StatusFamily::Runtime,
            unsafe { self.backend.initialize(dst, value) },
        )
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn lin_space(&self, dst: &MemoryDescriptor, x0: f64, x1: f64) -> Result<()> {
        check(
            "lin_space",
            StatusFamily::Runtime,
            unsafe { self.backend.lin_space(dst, x0, x1) },
        )
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn random_uniform(&self, dst: &MemoryDescriptor, seed: u64) -> Result<()> {
        check(
            "random_uniform",
            StatusFamily::Runtime,
            unsafe { self.backend.random_uniform(dst, seed) },
        )
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn random_gaussian(&self, dst: &MemoryDescriptor, seed: u64) -> Result<()> {
        check(
            "random_gaussian",
            StatusFamily::Runtime,
            unsafe { self.backend.random_gaussian(dst, seed) },
        )
    }

    // ── Dense kernels ───────────────────────────────────────────────────

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn abs_max_diff(&self, x: &MemoryDescriptor, y: &MemoryDescriptor) -> Result<f64> {
        let mut out = 0.0;
        check(
            "abs_max_diff",
            StatusFamily::Blas,
            unsafe { self.backend.abs_max_diff(x, y, &mut out) },
        )?;
        Ok(out)
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn sum(&self, x: &MemoryDescriptor) -> Result<f64> {
        let mut out = 0.0;
        check(
            "sum",
            StatusFamily::Runtime,
            unsafe { self.backend.sum(x, &mut out) },
        )?;
        Ok(out)
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn axpy(&self, y: &MemoryDescriptor, x: &MemoryDescriptor, alpha: f64) -> Result<()> {
        check(
            "axpy",
            StatusFamily::Blas,
            unsafe { self.backend.axpy(y, x, alpha) },
        )
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn scale(&self, x: &MemoryDescriptor, alpha: f64) -> Result<()> {
        check(
            "scale",
            StatusFamily::Blas,
            unsafe { self.backend.scale(x, alpha) },
        )
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn hadamard(
        &self,
        z: &MemoryDescriptor,
        x: &MemoryDescriptor,
        y: &MemoryDescriptor,
    ) -> Result<()> {
        check(
            "hadamard",
            StatusFamily::Blas,
            unsafe { self.backend.hadamard(z, x, y) },
        )
    }

    // ── Sparse kernels ──────────────────────────────────────────────────

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn sparse_axpy(
        &self,
        y: &MemoryDescriptor,
        x: &SparseVectorDescriptor,
        alpha: f64,
    ) -> Result<()> {
        check(
            "sparse_axpy",
            StatusFamily::Sparse,
            unsafe { self.backend.sparse_axpy(y, x, alpha) },
        )
    }

    /// # Safety
    ///
    /// See [`ComputeBackend`].
    pub unsafe fn csr_mv(
        &self,
        y: &MemoryDescriptor,
        a: &CsrDescriptor,
        x: &MemoryDescriptor,
        alpha: f64,
    ) -> Result<()> {
        check(
            "csr_mv",
            StatusFamily::Sparse,
            unsafe { self.backend.csr_mv(y, a, x, alpha) },
        )
    }

    // ── Device control ──────────────────────────────────────────────────

    pub fn device_count(&self) -> Result<i32> {
        let mut out = 0;
        check(
            "device_count",
            StatusFamily::Runtime,
            self.backend.device_count(&mut out),
        )?;
        Ok(out)
    }

    pub fn set_device(&self, id: i32) -> Result<()> {
        check("set_device", StatusFamily::Runtime, self.backend.set_device(id))
    }

    pub fn best_device(&self) -> Result<i32> {
        let mut out = 0;
        check(
            "best_device",
            StatusFamily::Runtime,
            self.backend.best_device(&mut out),
        )?;
        Ok(out)
    }

    pub fn synchronize(&self) -> Result<()> {
        check("synchronize", StatusFamily::Runtime, self.backend.synchronize())
    }

    pub fn device_status(&self) -> Result<()> {
        check(
            "device_status",
            StatusFamily::Runtime,
            self.backend.device_status(),
        )
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.name())
            .finish_non_exhaustive()
    }
}

/// Process-wide CPU reference context.
///
/// When [`config::default_backend`] selects `Ffi`, `lightmem-ffi-backend`
/// is responsible for building that context; this static always provides a
/// working CPU fallback.
static DEFAULT_CONTEXT: LazyLock<Context> = LazyLock::new(|| {
    let kind = config::default_backend();
    if kind != BackendKind::Cpu {
        tracing::debug!(?kind, "lightmem-core only provides the CPU backend");
    }
    Context::cpu()
});

/// Get the default context.
pub fn default_context() -> Context {
    DEFAULT_CONTEXT.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{KernelError, RuntimeError};

    #[test]
    fn test_default_context_is_shared() {
        let a = default_context();
        let b = default_context();
        assert!(a.same_backend(&b));
        assert!(!a.same_backend(&Context::cpu()));
    }

    #[test]
    fn test_alloc_free() {
        let ctx = Context::cpu();
        let region = ctx.alloc(16, MemorySpace::Device, ElementType::Float64).unwrap();
        assert!(!region.is_null());
        assert_eq!(ctx.live_allocations(), 1);
        unsafe { ctx.free(&region).unwrap() };
        assert_eq!(ctx.live_allocations(), 0);
    }

    #[test]
    fn test_double_free_is_error() {
        let ctx = Context::cpu();
        let region = ctx.alloc(4, MemorySpace::Device, ElementType::Int32).unwrap();
        unsafe {
            ctx.free(&region).unwrap();
            let err = ctx.free(&region).unwrap_err();
            assert!(matches!(
                err,
                MemError::Kernel {
                    op: "free",
                    source: KernelError::Runtime(RuntimeError::InvalidDevicePointer)
                }
            ));
        }
    }

    #[test]
    fn test_zero_alloc_is_allocation_error() {
        let ctx = Context::cpu();
        assert!(matches!(
            ctx.alloc(0, MemorySpace::Host, ElementType::Float32),
            Err(MemError::Allocation { .. })
        ));
    }
}
