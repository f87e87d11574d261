//! Translation of backend status codes into typed errors.
//!
//! Every backend entry point returns an `i32`: `0` is success, `-1..=-4` are
//! library-internal codes, positive values come from the backend library the
//! call was routed to. Which table applies depends on the [`StatusFamily`]
//! of the operation.

use std::fmt;

use crate::{MemError, Result};

/// Which backend library produced a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusFamily {
    /// Device runtime: allocation, copies, initializers, device control.
    Runtime,
    /// Dense linear algebra.
    Blas,
    /// Sparse linear algebra.
    Sparse,
}

/// A non-zero backend status, decoded.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    #[error("not implemented")]
    NotImplemented,
    #[error("not supported")]
    NotSupported,
    #[error("expected an even size")]
    ExpectedEvenSize,
    #[error("internal error")]
    Internal,
    #[error("runtime error: {0}")]
    Runtime(RuntimeError),
    #[error("blas error: {0}")]
    Blas(BlasError),
    #[error("sparse error: {0}")]
    Sparse(SparseError),
    #[error("returned {0}")]
    Generic(i32),
}

impl KernelError {
    /// Decode `status`; `None` when it signals success.
    pub fn from_status(family: StatusFamily, status: i32) -> Option<Self> {
        let err = match status {
            0 => return None,
            -1 => KernelError::NotImplemented,
            -2 => KernelError::NotSupported,
            -3 => KernelError::ExpectedEvenSize,
            -4 => KernelError::Internal,
            code => {
                let named = match family {
                    StatusFamily::Runtime => RuntimeError::from_code(code).map(KernelError::Runtime),
                    StatusFamily::Blas => BlasError::from_code(code).map(KernelError::Blas),
                    StatusFamily::Sparse => SparseError::from_code(code).map(KernelError::Sparse),
                };
                named.unwrap_or(KernelError::Generic(code))
            }
        };
        Some(err)
    }

    /// The raw status this error was decoded from.
    pub fn code(&self) -> i32 {
        match self {
            KernelError::NotImplemented => -1,
            KernelError::NotSupported => -2,
            KernelError::ExpectedEvenSize => -3,
            KernelError::Internal => -4,
            KernelError::Runtime(e) => *e as i32,
            KernelError::Blas(e) => *e as i32,
            KernelError::Sparse(e) => *e as i32,
            KernelError::Generic(code) => *code,
        }
    }

    /// Whether the device context is unusable after this error.
    pub fn is_context_fatal(&self) -> bool {
        matches!(self, KernelError::Runtime(e) if e.is_context_fatal())
    }
}

/// Map `status` of kernel `op` to `MemError::Kernel`.
pub fn check(op: &'static str, family: StatusFamily, status: i32) -> Result<()> {
    match KernelError::from_status(family, status) {
        None => Ok(()),
        Some(source) => {
            tracing::debug!(op, status, %source, "kernel failed");
            Err(MemError::Kernel { op, source })
        }
    }
}

/// Like [`check`], but reports `MemError::Allocation`.
pub fn check_alloc(op: &'static str, status: i32) -> Result<()> {
    match KernelError::from_status(StatusFamily::Runtime, status) {
        None => Ok(()),
        Some(source) => {
            tracing::warn!(op, status, %source, "allocation failed");
            Err(MemError::Allocation { op, source })
        }
    }
}

// ── Runtime ─────────────────────────────────────────────────────────────

/// Device runtime status codes.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeError {
    MissingConfiguration = 1,
    MemoryAllocation = 2,
    InitializationError = 3,
    LaunchFailure = 4,
    PriorLaunchFailure = 5,
    LaunchTimeout = 6,
    LaunchOutOfResources = 7,
    InvalidDeviceFunction = 8,
    InvalidConfiguration = 9,
    InvalidDevice = 10,
    InvalidValue = 11,
    InvalidPitchValue = 12,
    InvalidSymbol = 13,
    MapBufferObjectFailed = 14,
    UnmapBufferObjectFailed = 15,
    InvalidHostPointer = 16,
    InvalidDevicePointer = 17,
    InvalidTexture = 18,
    InvalidTextureBinding = 19,
    InvalidChannelDescriptor = 20,
    InvalidMemcpyDirection = 21,
    AddressOfConstant = 22,
    TextureFetchFailed = 23,
    TextureNotBound = 24,
    SynchronizationError = 25,
    InvalidFilterSetting = 26,
    InvalidNormSetting = 27,
    MixedDeviceExecution = 28,
    RuntimeUnloading = 29,
    Unknown = 30,
    NotYetImplemented = 31,
    MemoryValueTooLarge = 32,
    InvalidResourceHandle = 33,
    NotReady = 34,
    InsufficientDriver = 35,
    SetOnActiveProcess = 36,
    InvalidSurface = 37,
    NoDevice = 38,
    EccUncorrectable = 39,
    SharedObjectSymbolNotFound = 40,
    SharedObjectInitFailed = 41,
    UnsupportedLimit = 42,
    DuplicateVariableName = 43,
    DuplicateTextureName = 44,
    DuplicateSurfaceName = 45,
    DevicesUnavailable = 46,
    InvalidKernelImage = 47,
    NoKernelImageForDevice = 48,
    IncompatibleDriverContext = 49,
    PeerAccessAlreadyEnabled = 50,
    PeerAccessNotEnabled = 51,
    DeviceAlreadyInUse = 54,
    ProfilerDisabled = 55,
    ProfilerNotInitialized = 56,
    ProfilerAlreadyStarted = 57,
    ProfilerAlreadyStopped = 58,
    Assert = 59,
    TooManyPeers = 60,
    HostMemoryAlreadyRegistered = 61,
    HostMemoryNotRegistered = 62,
    OperatingSystem = 63,
    PeerAccessUnsupported = 64,
    LaunchMaxDepthExceeded = 65,
    LaunchFileScopedTex = 66,
    LaunchFileScopedSurf = 67,
    SyncDepthExceeded = 68,
    LaunchPendingCountExceeded = 69,
    NotPermitted = 70,
    NotSupported = 71,
    HardwareStackError = 72,
    IllegalInstruction = 73,
    MisalignedAddress = 74,
    InvalidAddressSpace = 75,
    InvalidPc = 76,
    IllegalAddress = 77,
    InvalidPtx = 78,
    InvalidGraphicsContext = 79,
    NvlinkUncorrectable = 80,
    JitCompilerNotFound = 81,
    CooperativeLaunchTooLarge = 82,
    StartupFailure = 0x7f,
    ApiFailureBase = 10000,
}

impl RuntimeError {
    pub fn from_code(code: i32) -> Option<Self> {
        use RuntimeError::*;
        let e = match code {
            1 => MissingConfiguration,
            2 => MemoryAllocation,
            3 => InitializationError,
            4 => LaunchFailure,
            5 => PriorLaunchFailure,
            6 => LaunchTimeout,
            7 => LaunchOutOfResources,
            8 => InvalidDeviceFunction,
            9 => InvalidConfiguration,
            10 => InvalidDevice,
            11 => InvalidValue,
            12 => InvalidPitchValue,
            13 => InvalidSymbol,
            14 => MapBufferObjectFailed,
            15 => UnmapBufferObjectFailed,
            16 => InvalidHostPointer,
            17 => InvalidDevicePointer,
            18 => InvalidTexture,
            19 => InvalidTextureBinding,
            20 => InvalidChannelDescriptor,
            21 => InvalidMemcpyDirection,
            22 => AddressOfConstant,
            23 => TextureFetchFailed,
            24 => TextureNotBound,
            25 => SynchronizationError,
            26 => InvalidFilterSetting,
            27 => InvalidNormSetting,
            28 => MixedDeviceExecution,
            29 => RuntimeUnloading,
            30 => Unknown,
            31 => NotYetImplemented,
            32 => MemoryValueTooLarge,
            33 => InvalidResourceHandle,
            34 => NotReady,
            35 => InsufficientDriver,
            36 => SetOnActiveProcess,
            37 => InvalidSurface,
            38 => NoDevice,
            39 => EccUncorrectable,
            40 => SharedObjectSymbolNotFound,
            41 => SharedObjectInitFailed,
            42 => UnsupportedLimit,
            43 => DuplicateVariableName,
            44 => DuplicateTextureName,
            45 => DuplicateSurfaceName,
            46 => DevicesUnavailable,
            47 => InvalidKernelImage,
            48 => NoKernelImageForDevice,
            49 => IncompatibleDriverContext,
            50 => PeerAccessAlreadyEnabled,
            51 => PeerAccessNotEnabled,
            54 => DeviceAlreadyInUse,
            55 => ProfilerDisabled,
            56 => ProfilerNotInitialized,
            57 => ProfilerAlreadyStarted,
            58 => ProfilerAlreadyStopped,
            59 => Assert,
            60 => TooManyPeers,
            61 => HostMemoryAlreadyRegistered,
            62 => HostMemoryNotRegistered,
            63 => OperatingSystem,
            64 => PeerAccessUnsupported,
            65 => LaunchMaxDepthExceeded,
            66 => LaunchFileScopedTex,
            67 => LaunchFileScopedSurf,
            68 => SyncDepthExceeded,
            69 => LaunchPendingCountExceeded,
            70 => NotPermitted,
            71 => NotSupported,
            72 => HardwareStackError,
            73 => IllegalInstruction,
            74 => MisalignedAddress,
            75 => InvalidAddressSpace,
            76 => InvalidPc,
            77 => IllegalAddress,
            78 => InvalidPtx,
            79 => InvalidGraphicsContext,
            80 => NvlinkUncorrectable,
            81 => JitCompilerNotFound,
            82 => CooperativeLaunchTooLarge,
            0x7f => StartupFailure,
            10000 => ApiFailureBase,
            _ => return None,
        };
        Some(e)
    }

    /// Errors after which the process must re-create its device context.
    pub fn is_context_fatal(self) -> bool {
        use RuntimeError::*;
        matches!(
            self,
            LaunchFailure
                | LaunchTimeout
                | EccUncorrectable
                | Assert
                | HardwareStackError
                | IllegalInstruction
                | MisalignedAddress
                | InvalidAddressSpace
                | InvalidPc
                | IllegalAddress
                | NvlinkUncorrectable
        )
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", *self as i32)
    }
}

// ── Blas ────────────────────────────────────────────────────────────────

/// Dense linear algebra status codes.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlasError {
    NotInitialised = 1,
    AllocFailed = 3,
    InvalidValue = 7,
    ArchMismatch = 8,
    MappingError = 11,
    ExecutionFailed = 13,
    InternalError = 14,
    NotSupported = 15,
    LicenseError = 16,
}

impl BlasError {
    pub fn from_code(code: i32) -> Option<Self> {
        use BlasError::*;
        let e = match code {
            1 => NotInitialised,
            3 => AllocFailed,
            7 => InvalidValue,
            8 => ArchMismatch,
            11 => MappingError,
            13 => ExecutionFailed,
            14 => InternalError,
            15 => NotSupported,
            16 => LicenseError,
            _ => return None,
        };
        Some(e)
    }
}

impl fmt::Display for BlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", *self as i32)
    }
}

// ── Sparse ──────────────────────────────────────────────────────────────

/// Sparse linear algebra status codes.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SparseError {
    NotInitialised = 1,
    AllocFailed = 2,
    InvalidValue = 3,
    ArchMismatch = 4,
    MappingError = 5,
    ExecutionFailed = 6,
    InternalError = 7,
    MatrixTypeNotSupported = 8,
    ZeroPivot = 9,
}

impl SparseError {
    pub fn from_code(code: i32) -> Option<Self> {
        use SparseError::*;
        let e = match code {
            1 => NotInitialised,
            2 => AllocFailed,
            3 => InvalidValue,
            4 => ArchMismatch,
            5 => MappingError,
            6 => ExecutionFailed,
            7 => InternalError,
            8 => MatrixTypeNotSupported,
            9 => ZeroPivot,
            _ => return None,
        };
        Some(e)
    }
}

impl fmt::Display for SparseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", *self as i32)
    }
}
