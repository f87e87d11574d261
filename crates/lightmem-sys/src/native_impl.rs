//! Pure-Rust implementation of the `lm_*` C ABI functions.
//!
//! Every function converts its `#[repr(C)]` arguments into `lightmem-core`
//! descriptors and delegates to one process-wide [`CpuRefBackend`].
//!
//! # Safety
//!
//! Callers must pass valid, non-null pointers to ABI structs and descriptors
//! that address live memory of the stated length, space and dtype. Regions
//! returned by `lm_alloc` must be released exactly once via `lm_free`.

#![allow(clippy::missing_safety_doc)]

use std::sync::LazyLock;

use libc::{c_int, c_void, size_t};

use lightmem_core::{
    ComputeBackend, CpuRefBackend, CsrDescriptor, ElementType, MemoryDescriptor, MemorySpace,
    SparseVectorDescriptor,
};

use crate::{lm_csr_t, lm_desc_t, lm_dtype_t, lm_space_t, lm_sparse_vec_t};

/// Returned when a tag is `Null` or otherwise unusable.
const NOT_SUPPORTED: c_int = -2;

static BACKEND: LazyLock<CpuRefBackend> = LazyLock::new(CpuRefBackend::new);

// ── Conversion helpers ──────────────────────────────────────────────────

fn convert_space(s: lm_space_t) -> Option<MemorySpace> {
    MemorySpace::from_raw(s as i32).ok()
}

fn convert_dtype(d: lm_dtype_t) -> Option<ElementType> {
    ElementType::from_raw(d as i32).ok()
}

unsafe fn convert_desc(p: *const lm_desc_t) -> Option<MemoryDescriptor> {
    let d = unsafe { p.as_ref() }?;
    Some(MemoryDescriptor::new(
        d.address as usize,
        d.len,
        convert_space(d.space)?,
        convert_dtype(d.dtype)?,
    ))
}

unsafe fn convert_sparse(p: *const lm_sparse_vec_t) -> Option<SparseVectorDescriptor> {
    let s = unsafe { p.as_ref() }?;
    Some(SparseVectorDescriptor {
        values: unsafe { convert_desc(&s.values) }?,
        indices: unsafe { convert_desc(&s.indices) }?,
        dense_len: s.dense_len,
    })
}

unsafe fn convert_csr(p: *const lm_csr_t) -> Option<CsrDescriptor> {
    let a = unsafe { p.as_ref() }?;
    Some(CsrDescriptor {
        values: unsafe { convert_desc(&a.values) }?,
        column_indices: unsafe { convert_desc(&a.column_indices) }?,
        row_offsets: unsafe { convert_desc(&a.row_offsets) }?,
        rows: a.rows,
        cols: a.cols,
    })
}

macro_rules! desc_or_bail {
    ($p:expr) => {
        match unsafe { convert_desc($p) } {
            Some(d) => d,
            None => return NOT_SUPPORTED,
        }
    };
}

// ── Memory ──────────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_alloc(
    len: size_t,
    space: lm_space_t,
    dtype: lm_dtype_t,
    out: *mut *mut c_void,
) -> c_int {
    let (Some(space), Some(dtype)) = (convert_space(space), convert_dtype(dtype)) else {
        return NOT_SUPPORTED;
    };
    if out.is_null() {
        return NOT_SUPPORTED;
    }
    let mut address = 0usize;
    let rc = BACKEND.alloc(len, space, dtype, &mut address);
    if rc == 0 {
        unsafe { *out = address as *mut c_void };
    }
    rc
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_free(region: *const lm_desc_t) -> c_int {
    let region = desc_or_bail!(region);
    unsafe { BACKEND.free(&region) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_copy(dst: *const lm_desc_t, src: *const lm_desc_t) -> c_int {
    let (dst, src) = (desc_or_bail!(dst), desc_or_bail!(src));
    unsafe { BACKEND.copy(&dst, &src) }
}

// ── Initializers ────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_initialize(dst: *const lm_desc_t, value: f64) -> c_int {
    let dst = desc_or_bail!(dst);
    unsafe { BACKEND.initialize(&dst, value) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_lin_space(dst: *const lm_desc_t, x0: f64, x1: f64) -> c_int {
    let dst = desc_or_bail!(dst);
    unsafe { BACKEND.lin_space(&dst, x0, x1) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_random_uniform(dst: *const lm_desc_t, seed: u64) -> c_int {
    let dst = desc_or_bail!(dst);
    unsafe { BACKEND.random_uniform(&dst, seed) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_random_gaussian(dst: *const lm_desc_t, seed: u64) -> c_int {
    let dst = desc_or_bail!(dst);
    unsafe { BACKEND.random_gaussian(&dst, seed) }
}

// ── Dense kernels ───────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_abs_max_diff(
    x: *const lm_desc_t,
    y: *const lm_desc_t,
    out: *mut f64,
) -> c_int {
    let (x, y) = (desc_or_bail!(x), desc_or_bail!(y));
    let Some(out) = (unsafe { out.as_mut() }) else {
        return NOT_SUPPORTED;
    };
    unsafe { BACKEND.abs_max_diff(&x, &y, out) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_sum(x: *const lm_desc_t, out: *mut f64) -> c_int {
    let x = desc_or_bail!(x);
    let Some(out) = (unsafe { out.as_mut() }) else {
        return NOT_SUPPORTED;
    };
    unsafe { BACKEND.sum(&x, out) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_axpy(y: *const lm_desc_t, x: *const lm_desc_t, alpha: f64) -> c_int {
    let (y, x) = (desc_or_bail!(y), desc_or_bail!(x));
    unsafe { BACKEND.axpy(&y, &x, alpha) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_scale(x: *const lm_desc_t, alpha: f64) -> c_int {
    let x = desc_or_bail!(x);
    unsafe { BACKEND.scale(&x, alpha) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_hadamard(
    z: *const lm_desc_t,
    x: *const lm_desc_t,
    y: *const lm_desc_t,
) -> c_int {
    let (z, x, y) = (desc_or_bail!(z), desc_or_bail!(x), desc_or_bail!(y));
    unsafe { BACKEND.hadamard(&z, &x, &y) }
}

// ── Sparse kernels ──────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_sparse_axpy(
    y: *const lm_desc_t,
    x: *const lm_sparse_vec_t,
    alpha: f64,
) -> c_int {
    let y = desc_or_bail!(y);
    let Some(x) = (unsafe { convert_sparse(x) }) else {
        return NOT_SUPPORTED;
    };
    unsafe { BACKEND.sparse_axpy(&y, &x, alpha) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_csr_mv(
    y: *const lm_desc_t,
    a: *const lm_csr_t,
    x: *const lm_desc_t,
    alpha: f64,
) -> c_int {
    let (y, x) = (desc_or_bail!(y), desc_or_bail!(x));
    let Some(a) = (unsafe { convert_csr(a) }) else {
        return NOT_SUPPORTED;
    };
    unsafe { BACKEND.csr_mv(&y, &a, &x, alpha) }
}

// ── Devices ─────────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_device_count(out: *mut c_int) -> c_int {
    let Some(out) = (unsafe { out.as_mut() }) else {
        return NOT_SUPPORTED;
    };
    BACKEND.device_count(out)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_set_device(id: c_int) -> c_int {
    BACKEND.set_device(id)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_best_device(out: *mut c_int) -> c_int {
    let Some(out) = (unsafe { out.as_mut() }) else {
        return NOT_SUPPORTED;
    };
    BACKEND.best_device(out)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_synchronize() -> c_int {
    BACKEND.synchronize()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_device_status() -> c_int {
    BACKEND.device_status()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lm_live_allocations() -> size_t {
    BACKEND.live_allocations()
}
