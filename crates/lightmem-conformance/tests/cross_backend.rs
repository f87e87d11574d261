//! Buffers produced on one backend and consumed on another.

use lightmem_core::config::BackendKind;
use lightmem_core::{ElementType, Matrix, Memory, MemoryMut, MemorySpace, Vector};
use lightmem_ffi_backend::context_for;

#[test]
fn seeded_initializers_agree() {
    let cpu = context_for(BackendKind::Cpu);
    let ffi = context_for(BackendKind::Ffi);
    let mut a = Vector::new(&cpu, 64, MemorySpace::Device, ElementType::Float64).unwrap();
    let mut b = Vector::new(&ffi, 64, MemorySpace::Device, ElementType::Float64).unwrap();
    a.random_gaussian(1234).unwrap();
    b.random_gaussian(1234).unwrap();
    assert!(a.equals(&b).unwrap());

    b.random_gaussian(4321).unwrap();
    assert!(!a.equals(&b).unwrap());
}

#[test]
fn copy_between_backends_stages_on_host() {
    let cpu = context_for(BackendKind::Cpu);
    let ffi = context_for(BackendKind::Ffi);
    let src = Matrix::identity(&cpu, 4, MemorySpace::Device, ElementType::Float32).unwrap();
    let mut dst = Matrix::new(&ffi, 4, 4, MemorySpace::Device, ElementType::Float32).unwrap();
    dst.copy_from(&src).unwrap();
    assert_eq!(dst, src);
    assert_eq!(dst.sum().unwrap(), 4.0);
}

#[test]
fn binary_file_read_by_other_backend() {
    let cpu = context_for(BackendKind::Cpu);
    let ffi = context_for(BackendKind::Ffi);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m.bin");

    let m = Matrix::filled(&cpu, 10, 5, MemorySpace::Device, ElementType::Int32, 2.0).unwrap();
    lightmem_io::write_matrix_binary(&path, &m).unwrap();

    let mut fresh = Matrix::new(&ffi, 1, 1, MemorySpace::Device, ElementType::Int32).unwrap();
    lightmem_io::read_matrix_binary_into(&path, &mut fresh).unwrap();
    assert_eq!(fresh, m);
}
