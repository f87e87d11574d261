//! CPU reference backend.
//!
//! Both address spaces are backed by host RAM. Every region handed out by
//! `alloc` is recorded in a registry so device pointers, frees and bounds
//! can be validated; host regions that were not allocated here (caller
//! slices) are accepted as-is. Failures are reported with the same status
//! codes a hardware backend would use for that operation family.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::backend::ComputeBackend;
use crate::descriptor::{CsrDescriptor, MemoryDescriptor, SparseVectorDescriptor};
use crate::status::{RuntimeError, StatusFamily};
use crate::types::{ElementType, MemorySpace};

const ALIGN: usize = 64;

const OK: i32 = 0;
const NOT_SUPPORTED: i32 = -2;

struct Region {
    len: usize,
    space: MemorySpace,
    dtype: ElementType,
    layout: Layout,
}

impl Region {
    fn end(&self, start: usize) -> usize {
        start + self.len * self.dtype.size_bytes()
    }
}

/// Pure-Rust reference backend.
pub struct CpuRefBackend {
    regions: Mutex<BTreeMap<usize, Region>>,
    devices: i32,
    current: AtomicI32,
    status: AtomicI32,
}

impl CpuRefBackend {
    pub fn new() -> Self {
        Self::with_device_count(1)
    }

    /// A backend reporting `devices` simulated accelerators.
    pub fn with_device_count(devices: i32) -> Self {
        Self {
            regions: Mutex::new(BTreeMap::new()),
            devices,
            current: AtomicI32::new(0),
            status: AtomicI32::new(OK),
        }
    }

    pub fn current_device(&self) -> i32 {
        self.current.load(Ordering::Relaxed)
    }

    /// Validate `d` against the registry; returns a status code.
    fn validate(&self, d: &MemoryDescriptor, family: StatusFamily) -> i32 {
        if d.is_null() {
            return bad_pointer(family, d.space);
        }
        let regions = self.regions.lock();
        match regions.range(..=d.address).next_back() {
            Some((&start, r)) if d.address < r.end(start) => {
                if r.space != d.space || r.dtype != d.dtype || d.address + d.byte_size() > r.end(start)
                {
                    invalid_value(family)
                } else {
                    OK
                }
            }
            _ if d.space == MemorySpace::Host => OK,
            _ => bad_pointer(family, d.space),
        }
    }

    fn validate_all(&self, ds: &[&MemoryDescriptor], family: StatusFamily) -> i32 {
        for d in ds {
            let rc = self.validate(d, family);
            if rc != OK {
                return rc;
            }
        }
        OK
    }
}

impl Default for CpuRefBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CpuRefBackend {
    fn drop(&mut self) {
        let regions = std::mem::take(&mut *self.regions.lock());
        if !regions.is_empty() {
            tracing::debug!(count = regions.len(), "releasing outstanding regions");
        }
        for (address, r) in regions {
            // SAFETY: every registered address came from `alloc_zeroed` with `r.layout`.
            unsafe { dealloc(address as *mut u8, r.layout) };
        }
    }
}

fn invalid_value(family: StatusFamily) -> i32 {
    match family {
        StatusFamily::Runtime => RuntimeError::InvalidValue as i32,
        StatusFamily::Blas => 7,
        StatusFamily::Sparse => 3,
    }
}

fn bad_pointer(family: StatusFamily, space: MemorySpace) -> i32 {
    match (family, space) {
        (StatusFamily::Runtime, MemorySpace::Host) => RuntimeError::InvalidHostPointer as i32,
        (StatusFamily::Runtime, MemorySpace::Device) => RuntimeError::InvalidDevicePointer as i32,
        (family, _) => invalid_value(family),
    }
}

// ── Element access ──────────────────────────────────────────────────────

unsafe fn load(d: &MemoryDescriptor, i: usize) -> f64 {
    unsafe {
        match d.dtype {
            ElementType::Int32 => (d.address as *const i32).add(i).read() as f64,
            ElementType::Float32 => (d.address as *const f32).add(i).read() as f64,
            ElementType::Float64 => (d.address as *const f64).add(i).read(),
        }
    }
}

unsafe fn store(d: &MemoryDescriptor, i: usize, v: f64) {
    unsafe {
        match d.dtype {
            ElementType::Int32 => (d.address as *mut i32).add(i).write(v as i32),
            ElementType::Float32 => (d.address as *mut f32).add(i).write(v as f32),
            ElementType::Float64 => (d.address as *mut f64).add(i).write(v),
        }
    }
}

unsafe fn load_index(d: &MemoryDescriptor, i: usize) -> i64 {
    unsafe { (d.address as *const i32).add(i).read() as i64 }
}

impl ComputeBackend for CpuRefBackend {
    fn name(&self) -> &'static str {
        "cpu-ref"
    }

    fn alloc(&self, len: usize, space: MemorySpace, dtype: ElementType, out: &mut usize) -> i32 {
        if len == 0 {
            return invalid_value(StatusFamily::Runtime);
        }
        let Some(bytes) = len.checked_mul(dtype.size_bytes()) else {
            return RuntimeError::MemoryAllocation as i32;
        };
        let Ok(layout) = Layout::from_size_align(bytes, ALIGN) else {
            return RuntimeError::MemoryAllocation as i32;
        };
        // SAFETY: layout has non-zero size since len > 0.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return RuntimeError::MemoryAllocation as i32;
        }
        let address = ptr as usize;
        self.regions.lock().insert(
            address,
            Region {
                len,
                space,
                dtype,
                layout,
            },
        );
        *out = address;
        OK
    }

    unsafe fn free(&self, region: &MemoryDescriptor) -> i32 {
        let Some(r) = self.regions.lock().remove(&region.address) else {
            return bad_pointer(StatusFamily::Runtime, region.space);
        };
        // SAFETY: the registry only holds addresses returned by `alloc_zeroed`.
        unsafe { dealloc(region.address as *mut u8, r.layout) };
        OK
    }

    unsafe fn copy(&self, dst: &MemoryDescriptor, src: &MemoryDescriptor) -> i32 {
        if dst.len != src.len || dst.dtype != src.dtype {
            return invalid_value(StatusFamily::Runtime);
        }
        let rc = self.validate_all(&[dst, src], StatusFamily::Runtime);
        if rc != OK {
            return rc;
        }
        // SAFETY: both regions validated (or trusted host memory) for `byte_size` bytes.
        unsafe {
            std::ptr::copy(
                src.address as *const u8,
                dst.address as *mut u8,
                src.byte_size(),
            )
        };
        OK
    }

    unsafe fn initialize(&self, dst: &MemoryDescriptor, value: f64) -> i32 {
        let rc = self.validate(dst, StatusFamily::Runtime);
        if rc != OK {
            return rc;
        }
        for i in 0..dst.len {
            unsafe { store(dst, i, value) };
        }
        OK
    }

    unsafe fn lin_space(&self, dst: &MemoryDescriptor, x0: f64, x1: f64) -> i32 {
        let rc = self.validate(dst, StatusFamily::Runtime);
        if rc != OK {
            return rc;
        }
        let step = if dst.len > 1 {
            (x1 - x0) / (dst.len - 1) as f64
        } else {
            0.0
        };
        for i in 0..dst.len {
            unsafe { store(dst, i, x0 + step * i as f64) };
        }
        OK
    }

    unsafe fn random_uniform(&self, dst: &MemoryDescriptor, seed: u64) -> i32 {
        if !dst.dtype.is_float() {
            return NOT_SUPPORTED;
        }
        let rc = self.validate(dst, StatusFamily::Runtime);
        if rc != OK {
            return rc;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        for i in 0..dst.len {
            let v: f64 = rng.random();
            unsafe { store(dst, i, v) };
        }
        OK
    }

    unsafe fn random_gaussian(&self, dst: &MemoryDescriptor, seed: u64) -> i32 {
        if !dst.dtype.is_float() {
            return NOT_SUPPORTED;
        }
        let rc = self.validate(dst, StatusFamily::Runtime);
        if rc != OK {
            return rc;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        for i in 0..dst.len {
            let v: f64 = StandardNormal.sample(&mut rng);
            unsafe { store(dst, i, v) };
        }
        OK
    }

    unsafe fn abs_max_diff(
        &self,
        x: &MemoryDescriptor,
        y: &MemoryDescriptor,
        out: &mut f64,
    ) -> i32 {
        if x.len != y.len || x.dtype != y.dtype {
            return invalid_value(StatusFamily::Blas);
        }
        let rc = self.validate_all(&[x, y], StatusFamily::Blas);
        if rc != OK {
            return rc;
        }
        let mut max = 0.0f64;
        for i in 0..x.len {
            let d = unsafe { (load(x, i) - load(y, i)).abs() };
            if d.is_nan() {
                max = f64::NAN;
                break;
            }
            max = max.max(d);
        }
        *out = max;
        OK
    }

    unsafe fn sum(&self, x: &MemoryDescriptor, out: &mut f64) -> i32 {
        let rc = self.validate(x, StatusFamily::Runtime);
        if rc != OK {
            return rc;
        }
        *out = (0..x.len).map(|i| unsafe { load(x, i) }).sum();
        OK
    }

    unsafe fn axpy(&self, y: &MemoryDescriptor, x: &MemoryDescriptor, alpha: f64) -> i32 {
        if x.len != y.len || x.dtype != y.dtype {
            return invalid_value(StatusFamily::Blas);
        }
        let rc = self.validate_all(&[y, x], StatusFamily::Blas);
        if rc != OK {
            return rc;
        }
        for i in 0..y.len {
            unsafe { store(y, i, load(y, i) + alpha * load(x, i)) };
        }
        OK
    }

    unsafe fn scale(&self, x: &MemoryDescriptor, alpha: f64) -> i32 {
        let rc = self.validate(x, StatusFamily::Blas);
        if rc != OK {
            return rc;
        }
        for i in 0..x.len {
            unsafe { store(x, i, alpha * load(x, i)) };
        }
        OK
    }

    unsafe fn hadamard(
        &self,
        z: &MemoryDescriptor,
        x: &MemoryDescriptor,
        y: &MemoryDescriptor,
    ) -> i32 {
        if x.len != y.len || z.len != x.len || x.dtype != y.dtype || z.dtype != x.dtype {
            return invalid_value(StatusFamily::Blas);
        }
        let rc = self.validate_all(&[z, x, y], StatusFamily::Blas);
        if rc != OK {
            return rc;
        }
        for i in 0..z.len {
            unsafe { store(z, i, load(x, i) * load(y, i)) };
        }
        OK
    }

    unsafe fn sparse_axpy(
        &self,
        y: &MemoryDescriptor,
        x: &SparseVectorDescriptor,
        alpha: f64,
    ) -> i32 {
        let family = StatusFamily::Sparse;
        if x.indices.dtype != ElementType::Int32
            || x.indices.len != x.values.len
            || x.values.dtype != y.dtype
            || x.dense_len != y.len
        {
            return invalid_value(family);
        }
        let rc = self.validate_all(&[y, &x.values, &x.indices], family);
        if rc != OK {
            return rc;
        }
        for k in 0..x.nnz() {
            let idx = unsafe { load_index(&x.indices, k) };
            if idx < 0 || idx as usize >= y.len {
                return invalid_value(family);
            }
            let i = idx as usize;
            unsafe { store(y, i, load(y, i) + alpha * load(&x.values, k)) };
        }
        OK
    }

    unsafe fn csr_mv(
        &self,
        y: &MemoryDescriptor,
        a: &CsrDescriptor,
        x: &MemoryDescriptor,
        alpha: f64,
    ) -> i32 {
        let family = StatusFamily::Sparse;
        if a.column_indices.dtype != ElementType::Int32
            || a.row_offsets.dtype != ElementType::Int32
            || a.row_offsets.len != a.rows + 1
            || a.column_indices.len != a.values.len
            || y.len != a.rows
            || x.len != a.cols
            || y.dtype != a.values.dtype
            || x.dtype != a.values.dtype
        {
            return invalid_value(family);
        }
        let rc = self.validate_all(
            &[y, x, &a.values, &a.column_indices, &a.row_offsets],
            family,
        );
        if rc != OK {
            return rc;
        }
        let mut out = vec![0.0f64; a.rows];
        for (i, acc) in out.iter_mut().enumerate() {
            let (start, end) = unsafe { (load_index(&a.row_offsets, i), load_index(&a.row_offsets, i + 1)) };
            if start < 0 || end < start || end as usize > a.nnz() {
                return invalid_value(family);
            }
            for k in start as usize..end as usize {
                let col = unsafe { load_index(&a.column_indices, k) };
                if col < 0 || col as usize >= a.cols {
                    return invalid_value(family);
                }
                *acc += unsafe { load(&a.values, k) * load(x, col as usize) };
            }
        }
        for (i, v) in out.into_iter().enumerate() {
            unsafe { store(y, i, alpha * v) };
        }
        OK
    }

    fn device_count(&self, out: &mut i32) -> i32 {
        if self.devices == 0 {
            return RuntimeError::NoDevice as i32;
        }
        *out = self.devices;
        OK
    }

    fn set_device(&self, id: i32) -> i32 {
        if id < 0 || id >= self.devices {
            return RuntimeError::InvalidDevice as i32;
        }
        self.current.store(id, Ordering::Relaxed);
        OK
    }

    fn best_device(&self, out: &mut i32) -> i32 {
        if self.devices == 0 {
            return RuntimeError::NoDevice as i32;
        }
        *out = 0;
        OK
    }

    fn synchronize(&self) -> i32 {
        OK
    }

    fn device_status(&self) -> i32 {
        self.status.load(Ordering::Relaxed)
    }

    fn live_allocations(&self) -> usize {
        self.regions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(b: &CpuRefBackend, len: usize, space: MemorySpace, dtype: ElementType) -> MemoryDescriptor {
        let mut address = 0;
        assert_eq!(b.alloc(len, space, dtype, &mut address), OK);
        MemoryDescriptor::new(address, len, space, dtype)
    }

    fn read_all(d: &MemoryDescriptor) -> Vec<f64> {
        (0..d.len).map(|i| unsafe { load(d, i) }).collect()
    }

    #[test]
    fn test_alloc_is_zeroed_and_aligned() {
        let b = CpuRefBackend::new();
        let d = alloc(&b, 7, MemorySpace::Device, ElementType::Float64);
        assert_eq!(d.address % ALIGN, 0);
        assert_eq!(read_all(&d), vec![0.0; 7]);
        unsafe { assert_eq!(b.free(&d), OK) };
    }

    #[test]
    fn test_unknown_device_pointer_rejected() {
        let b = CpuRefBackend::new();
        let bogus = MemoryDescriptor::new(0x10, 4, MemorySpace::Device, ElementType::Int32);
        unsafe {
            assert_eq!(b.initialize(&bogus, 1.0), RuntimeError::InvalidDevicePointer as i32);
            assert_eq!(b.scale(&bogus, 2.0), 7);
        }
    }

    #[test]
    fn test_out_of_bounds_descriptor_rejected() {
        let b = CpuRefBackend::new();
        let d = alloc(&b, 4, MemorySpace::Device, ElementType::Float32);
        let too_long = MemoryDescriptor { len: 5, ..d };
        unsafe {
            assert_eq!(b.initialize(&too_long, 1.0), RuntimeError::InvalidValue as i32);
        }
    }

    #[test]
    fn test_copy_host_device() {
        let b = CpuRefBackend::new();
        let src = [1.0f32, 2.0, 3.0];
        let d = alloc(&b, 3, MemorySpace::Device, ElementType::Float32);
        unsafe {
            assert_eq!(b.copy(&d, &MemoryDescriptor::from_host_slice(&src)), OK);
        }
        assert_eq!(read_all(&d), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_lin_space() {
        let b = CpuRefBackend::new();
        let d = alloc(&b, 5, MemorySpace::Host, ElementType::Float64);
        unsafe { assert_eq!(b.lin_space(&d, 0.0, 1.0), OK) };
        assert_eq!(read_all(&d), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_random_is_seeded() {
        let b = CpuRefBackend::new();
        let x = alloc(&b, 16, MemorySpace::Device, ElementType::Float64);
        let y = alloc(&b, 16, MemorySpace::Device, ElementType::Float64);
        unsafe {
            assert_eq!(b.random_uniform(&x, 42), OK);
            assert_eq!(b.random_uniform(&y, 42), OK);
        }
        assert_eq!(read_all(&x), read_all(&y));
        assert!(read_all(&x).iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_random_int_not_supported() {
        let b = CpuRefBackend::new();
        let x = alloc(&b, 4, MemorySpace::Device, ElementType::Int32);
        unsafe { assert_eq!(b.random_gaussian(&x, 1), NOT_SUPPORTED) };
    }

    #[test]
    fn test_axpy_and_abs_max_diff() {
        let b = CpuRefBackend::new();
        let xs = [1.0f64, 2.0, 3.0];
        let mut ys = [1.0f64, 1.0, 1.0];
        let x = MemoryDescriptor::from_host_slice(&xs);
        let y = MemoryDescriptor::from_host_slice_mut(&mut ys);
        unsafe { assert_eq!(b.axpy(&y, &x, 2.0), OK) };
        let mut diff = 0.0;
        unsafe { assert_eq!(b.abs_max_diff(&y, &x, &mut diff), OK) };
        assert_eq!(diff, 4.0);
        assert_eq!(ys, [3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_csr_mv() {
        // [[1, 0], [0, 2], [3, 4]]
        let values = [1.0f64, 2.0, 3.0, 4.0];
        let cols = [0i32, 1, 0, 1];
        let offsets = [0i32, 1, 2, 4];
        let xs = [1.0f64, 10.0];
        let mut ys = [0.0f64; 3];
        let a = CsrDescriptor {
            values: MemoryDescriptor::from_host_slice(&values),
            column_indices: MemoryDescriptor::from_host_slice(&cols),
            row_offsets: MemoryDescriptor::from_host_slice(&offsets),
            rows: 3,
            cols: 2,
        };
        let b = CpuRefBackend::new();
        unsafe {
            assert_eq!(
                b.csr_mv(
                    &MemoryDescriptor::from_host_slice_mut(&mut ys),
                    &a,
                    &MemoryDescriptor::from_host_slice(&xs),
                    1.0
                ),
                OK
            );
        }
        assert_eq!(ys, [1.0, 20.0, 43.0]);
    }

    #[test]
    fn test_sparse_axpy_rejects_bad_index() {
        let values = [1.0f32];
        let indices = [9i32];
        let mut ys = [0.0f32; 4];
        let x = SparseVectorDescriptor {
            values: MemoryDescriptor::from_host_slice(&values),
            indices: MemoryDescriptor::from_host_slice(&indices),
            dense_len: 4,
        };
        let b = CpuRefBackend::new();
        unsafe {
            assert_eq!(
                b.sparse_axpy(&MemoryDescriptor::from_host_slice_mut(&mut ys), &x, 1.0),
                3
            );
        }
    }

    #[test]
    fn test_set_device_bounds() {
        let b = CpuRefBackend::with_device_count(2);
        assert_eq!(b.set_device(1), OK);
        assert_eq!(b.current_device(), 1);
        assert_eq!(b.set_device(2), RuntimeError::InvalidDevice as i32);
    }

    #[test]
    fn test_drop_releases_outstanding() {
        let b = CpuRefBackend::new();
        alloc(&b, 8, MemorySpace::Device, ElementType::Int32);
        alloc(&b, 8, MemorySpace::Host, ElementType::Float32);
        assert_eq!(b.live_allocations(), 2);
        drop(b);
    }
}
