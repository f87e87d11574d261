//! Typed numeric buffers for host and accelerator memory.
//!
//! `lightmem-core` provides the descriptor types (`MemoryDescriptor`,
//! `TiledDescriptor`, `CubedDescriptor`), owning buffers and borrowed views,
//! the `Vector` / `Matrix` / `Tensor` shapes with zero-copy column and cube
//! views, and dense ↔ sparse compression.
//!
//! # Backends
//!
//! All memory is allocated, copied and initialized by a [`ComputeBackend`]
//! reached through a [`Context`]:
//!
//! - `CpuRefBackend`: pure Rust reference, device memory simulated in RAM
//! - `lightmem-ffi-backend`: dispatches through the `lightmem-sys` C ABI

pub mod backend;
pub mod buffer;
pub mod config;
pub mod cpu_backend;
pub mod descriptor;
pub mod device;
pub mod matrix;
pub mod sparse;
pub mod status;
pub mod tensor;
pub mod types;
pub mod vector;

pub use backend::{ComputeBackend, Context, default_context};
pub use buffer::{Buffer, BufferView, BufferViewMut, Memory, MemoryMut, live_buffers};
pub use config::{BackendKind, EqualityPolicy};
pub use cpu_backend::CpuRefBackend;
pub use descriptor::{
    CsrDescriptor, CubedDescriptor, MemoryDescriptor, SparseVectorDescriptor, TiledDescriptor,
};
pub use device::DeviceManager;
pub use matrix::{Matrix, MatrixView, MatrixViewMut};
pub use sparse::{CsrMatrix, SparseVector};
pub use status::{KernelError, StatusFamily};
pub use tensor::Tensor;
pub use types::{Element, ElementType, HostArray, MemorySpace};
pub use vector::Vector;

pub type Result<T> = std::result::Result<T, MemError>;

#[derive(thiserror::Error, Debug)]
pub enum MemError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported element type tag: {0}")]
    UnsupportedElementType(i32),

    #[error("Unsupported memory space tag: {0}")]
    UnsupportedMemorySpace(i32),

    #[error("Size mismatch: expected {expected}, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("Memory space mismatch: {left} vs {right}")]
    SpaceMismatch {
        left: MemorySpace,
        right: MemorySpace,
    },

    #[error("Element type mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        expected: ElementType,
        got: ElementType,
    },

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Buffer not initialized (null address)")]
    BufferNotInitialized,

    #[error("Allocation failed in {op}: {source}")]
    Allocation {
        op: &'static str,
        #[source]
        source: KernelError,
    },

    #[error("Kernel {op} failed: {source}")]
    Kernel {
        op: &'static str,
        #[source]
        source: KernelError,
    },

    #[error("Operands do not share the same sparsity pattern")]
    SparsityPatternMismatch,

    #[error("Buffers belong to different backends ({left} vs {right})")]
    BackendMismatch {
        left: &'static str,
        right: &'static str,
    },

    #[error("Backend not available: {0}")]
    BackendUnavailable(&'static str),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
