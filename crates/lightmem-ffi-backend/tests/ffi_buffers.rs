//! Buffer, matrix and sparse operations routed through the C ABI backend.

use lightmem_core::config::BackendKind;
use lightmem_core::{
    CsrMatrix, DeviceManager, ElementType, MemError, Matrix, Memory, MemoryMut, MemorySpace,
    SparseVector, Tensor, Vector,
};
use lightmem_ffi_backend::context_for;

fn ffi() -> lightmem_core::Context {
    let _ = tracing_subscriber::fmt::try_init();
    context_for(BackendKind::Ffi)
}

// ── Dense ────────────────────────────────────────────────────────────────

#[test]
fn matrix_columns_through_ffi() {
    let ctx = ffi();
    let mut m = Matrix::new(&ctx, 3, 4, MemorySpace::Device, ElementType::Float64).unwrap();
    m.lin_space_column(2, 1.0, 3.0).unwrap();
    m.set_column(3, 5.0).unwrap();
    assert_eq!(m.get_column::<f64>(2).unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(m.sum().unwrap(), 21.0);
    assert_eq!(ctx.live_allocations(), 1);
    m.dispose().unwrap();
    assert_eq!(ctx.live_allocations(), 0);
}

#[test]
fn tensor_cubes_through_ffi() {
    let ctx = ffi();
    let mut t = Tensor::new(&ctx, 2, 2, 3, MemorySpace::Device, ElementType::Int32).unwrap();
    t.set_cube(2, 4.0).unwrap();
    assert_eq!(t.get_column::<i32>(2, 1).unwrap(), vec![4, 4]);
    assert_eq!(t.sum().unwrap(), 16.0);
}

#[test]
fn equality_across_backends_compares_on_host() {
    let ffi_ctx = ffi();
    let cpu_ctx = context_for(BackendKind::Cpu);
    let a = Vector::from_slice(&ffi_ctx, &[1.0f32, 2.0, 3.0], MemorySpace::Device).unwrap();
    let b = Vector::from_slice(&cpu_ctx, &[1.0f32, 2.0, 3.0], MemorySpace::Device).unwrap();
    assert!(a.equals(&b).unwrap());
}

#[test]
fn nan_never_equal_across_backends() {
    let ffi_ctx = ffi();
    let cpu_ctx = context_for(BackendKind::Cpu);
    let a = Vector::from_slice(&ffi_ctx, &[f64::NAN, 2.0], MemorySpace::Device).unwrap();
    let b = Vector::from_slice(&cpu_ctx, &[1.0f64, 2.0], MemorySpace::Device).unwrap();
    let c = Vector::from_slice(&cpu_ctx, &[f64::NAN, 2.0], MemorySpace::Device).unwrap();
    assert!(!a.equals(&b).unwrap());
    assert!(!b.equals(&a).unwrap());
    assert_eq!(a.equals(&b).unwrap(), c.equals(&b).unwrap());
}

#[test]
fn arithmetic_requires_one_backend() {
    let mut a = Vector::filled(&ffi(), 2, MemorySpace::Device, ElementType::Float64, 1.0).unwrap();
    let b = Vector::filled(&ffi(), 2, MemorySpace::Device, ElementType::Float64, 1.0).unwrap();
    assert!(matches!(
        a.add_assign_scaled(&b, 1.0),
        Err(MemError::BackendMismatch { .. })
    ));
}

// ── Sparse ───────────────────────────────────────────────────────────────

#[test]
fn sparse_roundtrip_through_ffi() {
    let ctx = ffi();
    let dense = Vector::from_slice(&ctx, &[0.0f64, 3.0, 0.0, -1.0], MemorySpace::Device).unwrap();
    let sv = SparseVector::compress_default(&dense).unwrap();
    assert_eq!(sv.nnz(), 2);
    assert_eq!(sv.to_dense().unwrap().get::<f64>().unwrap(), vec![0.0, 3.0, 0.0, -1.0]);
}

#[test]
fn csr_dot_through_ffi() {
    let ctx = ffi();
    let m = Matrix::from_column_major(
        &ctx,
        3,
        3,
        &[1.0f32, 0.0, 0.0, 0.0, 0.0, 3.0, 2.0, 0.0, 4.0],
        MemorySpace::Device,
    )
    .unwrap();
    let csr = CsrMatrix::compress_default(&m).unwrap();
    let x = Vector::filled(&ctx, 3, MemorySpace::Device, ElementType::Float32, 1.0).unwrap();
    assert_eq!(csr.dot(&x).unwrap().get::<f32>().unwrap(), vec![3.0, 0.0, 7.0]);
}

// ── Devices ──────────────────────────────────────────────────────────────

#[test]
fn device_manager_through_ffi() {
    let ctx = ffi();
    let dm = DeviceManager::new(&ctx);
    assert_eq!(dm.device_count().unwrap(), 1);
    dm.set_best_device().unwrap();
    assert!(dm.set_device(3).is_err());
    dm.check_sanity().unwrap();
}
