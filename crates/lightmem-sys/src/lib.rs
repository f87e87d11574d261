//! C ABI for lightmem compute kernels.
//!
//! With the default `native` feature every `lm_*` function is implemented in
//! pure Rust on top of the `lightmem-core` CPU reference backend. With the
//! `kernels` feature they link against an external kernel library built via
//! cmake. All functions return `0` on success or a status code from the
//! runtime, BLAS or sparse family of the kernel they wrap.

#![allow(non_camel_case_types)]

use libc::{c_void, size_t};

#[cfg(all(feature = "native", feature = "kernels"))]
compile_error!("features `native` and `kernels` both export `lm_*`; enable only one");

// ── ABI types ───────────────────────────────────────────────────────────

/// Memory space tag. `Null` marks an unset descriptor.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum lm_space_t {
    Null = 0,
    Host = 1,
    Device = 2,
}

/// Element type tag. `Null` marks an unset descriptor.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum lm_dtype_t {
    Null = 0,
    Int32 = 1,
    Float32 = 2,
    Float64 = 3,
}

/// A contiguous typed region.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct lm_desc_t {
    pub address: *mut c_void,
    pub len: size_t,
    pub space: lm_space_t,
    pub dtype: lm_dtype_t,
}

/// A compressed vector: `values[i]` belongs at dense position `indices[i]`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct lm_sparse_vec_t {
    pub values: lm_desc_t,
    pub indices: lm_desc_t,
    pub dense_len: size_t,
}

/// A CSR matrix with `rows + 1` row offsets.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct lm_csr_t {
    pub values: lm_desc_t,
    pub column_indices: lm_desc_t,
    pub row_offsets: lm_desc_t,
    pub rows: size_t,
    pub cols: size_t,
}

impl lm_desc_t {
    pub const NULL: Self = Self {
        address: std::ptr::null_mut(),
        len: 0,
        space: lm_space_t::Null,
        dtype: lm_dtype_t::Null,
    };
}

// ── External kernel library (enabled with `kernels` feature) ────────────

#[cfg(feature = "kernels")]
unsafe extern "C" {
    pub fn lm_alloc(
        len: size_t,
        space: lm_space_t,
        dtype: lm_dtype_t,
        out: *mut *mut c_void,
    ) -> libc::c_int;
    pub fn lm_free(region: *const lm_desc_t) -> libc::c_int;
    pub fn lm_copy(dst: *const lm_desc_t, src: *const lm_desc_t) -> libc::c_int;
    pub fn lm_initialize(dst: *const lm_desc_t, value: f64) -> libc::c_int;
    pub fn lm_lin_space(dst: *const lm_desc_t, x0: f64, x1: f64) -> libc::c_int;
    pub fn lm_random_uniform(dst: *const lm_desc_t, seed: u64) -> libc::c_int;
    pub fn lm_random_gaussian(dst: *const lm_desc_t, seed: u64) -> libc::c_int;
    pub fn lm_abs_max_diff(
        x: *const lm_desc_t,
        y: *const lm_desc_t,
        out: *mut f64,
    ) -> libc::c_int;
    pub fn lm_sum(x: *const lm_desc_t, out: *mut f64) -> libc::c_int;
    pub fn lm_axpy(y: *const lm_desc_t, x: *const lm_desc_t, alpha: f64) -> libc::c_int;
    pub fn lm_scale(x: *const lm_desc_t, alpha: f64) -> libc::c_int;
    pub fn lm_hadamard(
        z: *const lm_desc_t,
        x: *const lm_desc_t,
        y: *const lm_desc_t,
    ) -> libc::c_int;
    pub fn lm_sparse_axpy(
        y: *const lm_desc_t,
        x: *const lm_sparse_vec_t,
        alpha: f64,
    ) -> libc::c_int;
    pub fn lm_csr_mv(
        y: *const lm_desc_t,
        a: *const lm_csr_t,
        x: *const lm_desc_t,
        alpha: f64,
    ) -> libc::c_int;
    pub fn lm_device_count(out: *mut libc::c_int) -> libc::c_int;
    pub fn lm_set_device(id: libc::c_int) -> libc::c_int;
    pub fn lm_best_device(out: *mut libc::c_int) -> libc::c_int;
    pub fn lm_synchronize() -> libc::c_int;
    pub fn lm_device_status() -> libc::c_int;
    pub fn lm_live_allocations() -> size_t;
}

// ── Pure-Rust native implementation (enabled with `native` feature) ─────

#[cfg(feature = "native")]
mod native_impl;

#[cfg(feature = "native")]
pub use native_impl::*;
