//! Compute backend that delegates every kernel to the lightmem-sys C ABI.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use lightmem_core::config::{self, BackendKind};
use lightmem_core::{
    ComputeBackend, Context, CsrDescriptor, ElementType, MemoryDescriptor, MemorySpace,
    SparseVectorDescriptor,
};
use lightmem_sys as sys;
use parking_lot::Mutex;

/// Backend that dispatches through the `lm_*` C ABI.
///
/// Regions allocated through this backend are tracked in an arena and freed
/// when the backend is dropped.
pub struct FfiBackend {
    arena: Mutex<HashMap<usize, sys::lm_desc_t>>,
}

// SAFETY: the arena only stores addresses handed out by `lm_alloc`; the C ABI
// is thread-safe and every access to the arena goes through the Mutex.
unsafe impl Send for FfiBackend {}
unsafe impl Sync for FfiBackend {}

impl FfiBackend {
    pub fn new() -> Self {
        Self {
            arena: Mutex::new(HashMap::new()),
        }
    }

    fn space_to_sys(space: MemorySpace) -> sys::lm_space_t {
        match space {
            MemorySpace::Host => sys::lm_space_t::Host,
            MemorySpace::Device => sys::lm_space_t::Device,
        }
    }

    fn dtype_to_sys(dtype: ElementType) -> sys::lm_dtype_t {
        match dtype {
            ElementType::Int32 => sys::lm_dtype_t::Int32,
            ElementType::Float32 => sys::lm_dtype_t::Float32,
            ElementType::Float64 => sys::lm_dtype_t::Float64,
        }
    }

    fn desc_to_sys(d: &MemoryDescriptor) -> sys::lm_desc_t {
        sys::lm_desc_t {
            address: d.address as *mut _,
            len: d.len,
            space: Self::space_to_sys(d.space),
            dtype: Self::dtype_to_sys(d.dtype),
        }
    }

    fn sparse_to_sys(x: &SparseVectorDescriptor) -> sys::lm_sparse_vec_t {
        sys::lm_sparse_vec_t {
            values: Self::desc_to_sys(&x.values),
            indices: Self::desc_to_sys(&x.indices),
            dense_len: x.dense_len,
        }
    }

    fn csr_to_sys(a: &CsrDescriptor) -> sys::lm_csr_t {
        sys::lm_csr_t {
            values: Self::desc_to_sys(&a.values),
            column_indices: Self::desc_to_sys(&a.column_indices),
            row_offsets: Self::desc_to_sys(&a.row_offsets),
            rows: a.rows,
            cols: a.cols,
        }
    }
}

impl Default for FfiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FfiBackend {
    fn drop(&mut self) {
        let outstanding: Vec<_> = self.arena.get_mut().drain().map(|(_, d)| d).collect();
        if !outstanding.is_empty() {
            tracing::debug!(count = outstanding.len(), "freeing regions left in ffi arena");
        }
        for d in outstanding {
            unsafe { sys::lm_free(&d) };
        }
    }
}

impl ComputeBackend for FfiBackend {
    fn name(&self) -> &'static str {
        "ffi"
    }

    fn alloc(&self, len: usize, space: MemorySpace, dtype: ElementType, out: &mut usize) -> i32 {
        let mut ptr = std::ptr::null_mut();
        let rc = unsafe {
            sys::lm_alloc(
                len,
                Self::space_to_sys(space),
                Self::dtype_to_sys(dtype),
                &mut ptr,
            )
        };
        if rc == 0 {
            *out = ptr as usize;
            let desc = MemoryDescriptor::new(*out, len, space, dtype);
            self.arena.lock().insert(*out, Self::desc_to_sys(&desc));
        }
        rc
    }

    unsafe fn free(&self, region: &MemoryDescriptor) -> i32 {
        let tracked = self.arena.lock().remove(&region.address);
        // Free with the recorded extent so views of a region cannot shrink it.
        let desc = tracked.unwrap_or_else(|| Self::desc_to_sys(region));
        unsafe { sys::lm_free(&desc) }
    }

    unsafe fn copy(&self, dst: &MemoryDescriptor, src: &MemoryDescriptor) -> i32 {
        unsafe { sys::lm_copy(&Self::desc_to_sys(dst), &Self::desc_to_sys(src)) }
    }

    unsafe fn initialize(&self, dst: &MemoryDescriptor, value: f64) -> i32 {
        unsafe { sys::lm_initialize(&Self::desc_to_sys(dst), value) }
    }

    unsafe fn lin_space(&self, dst: &MemoryDescriptor, x0: f64, x1: f64) -> i32 {
        unsafe { sys::lm_lin_space(&Self::desc_to_sys(dst), x0, x1) }
    }

    unsafe fn random_uniform(&self, dst: &MemoryDescriptor, seed: u64) -> i32 {
        unsafe { sys::lm_random_uniform(&Self::desc_to_sys(dst), seed) }
    }

    unsafe fn random_gaussian(&self, dst: &MemoryDescriptor, seed: u64) -> i32 {
        unsafe { sys::lm_random_gaussian(&Self::desc_to_sys(dst), seed) }
    }

    unsafe fn abs_max_diff(
        &self,
        x: &MemoryDescriptor,
        y: &MemoryDescriptor,
        out: &mut f64,
    ) -> i32 {
        unsafe { sys::lm_abs_max_diff(&Self::desc_to_sys(x), &Self::desc_to_sys(y), out) }
    }

    unsafe fn sum(&self, x: &MemoryDescriptor, out: &mut f64) -> i32 {
        unsafe { sys::lm_sum(&Self::desc_to_sys(x), out) }
    }

    unsafe fn axpy(&self, y: &MemoryDescriptor, x: &MemoryDescriptor, alpha: f64) -> i32 {
        unsafe { sys::lm_axpy(&Self::desc_to_sys(y), &Self::desc_to_sys(x), alpha) }
    }

    unsafe fn scale(&self, x: &MemoryDescriptor, alpha: f64) -> i32 {
        unsafe { sys::lm_scale(&Self::desc_to_sys(x), alpha) }
    }

    unsafe fn hadamard(
        &self,
        z: &MemoryDescriptor,
        x: &MemoryDescriptor,
        y: &MemoryDescriptor,
    ) -> i32 {
        unsafe {
            sys::lm_hadamard(
                &Self::desc_to_sys(z),
                &Self::desc_to_sys(x),
                &Self::desc_to_sys(y),
            )
        }
    }

    unsafe fn sparse_axpy(
        &self,
        y: &MemoryDescriptor,
        x: &SparseVectorDescriptor,
        alpha: f64,
    ) -> i32 {
        unsafe { sys::lm_sparse_axpy(&Self::desc_to_sys(y), &Self::sparse_to_sys(x), alpha) }
    }

    unsafe fn csr_mv(
        &self,
        y: &MemoryDescriptor,
        a: &CsrDescriptor,
        x: &MemoryDescriptor,
        alpha: f64,
    ) -> i32 {
        unsafe {
            sys::lm_csr_mv(
                &Self::desc_to_sys(y),
                &Self::csr_to_sys(a),
                &Self::desc_to_sys(x),
                alpha,
            )
        }
    }

    fn device_count(&self, out: &mut i32) -> i32 {
        unsafe { sys::lm_device_count(out) }
    }

    fn set_device(&self, id: i32) -> i32 {
        unsafe { sys::lm_set_device(id) }
    }

    fn best_device(&self, out: &mut i32) -> i32 {
        unsafe { sys::lm_best_device(out) }
    }

    fn synchronize(&self) -> i32 {
        unsafe { sys::lm_synchronize() }
    }

    fn device_status(&self) -> i32 {
        unsafe { sys::lm_device_status() }
    }

    fn live_allocations(&self) -> usize {
        self.arena.lock().len()
    }
}

// ── Context selection ───────────────────────────────────────────────────

/// Build a fresh context for `kind`.
pub fn context_for(kind: BackendKind) -> Context {
    match kind {
        BackendKind::Cpu => Context::cpu(),
        BackendKind::Ffi => Context::new(Arc::new(FfiBackend::new())),
    }
}

static DEFAULT_CONTEXT: LazyLock<Context> = LazyLock::new(|| {
    let kind = config::default_backend();
    tracing::debug!(?kind, "initializing default context");
    context_for(kind)
});

/// Process-wide context for the backend selected by `LIGHTMEM_BACKEND` or
/// the `default-backend-ffi` feature of `lightmem-core`.
pub fn default_context() -> Context {
    DEFAULT_CONTEXT.clone()
}
