//! Runtime configuration: backend selection and equality policy.

use std::sync::LazyLock;

use crate::types::ElementType;

/// Values with magnitude at or below this are dropped by compression.
pub const DEFAULT_COMPRESS_THRESHOLD: f64 = 1e-7;

/// Which backend to use by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Ffi,
}

/// Determine the default backend via env var → compile-time feature → CPU fallback.
///
/// Priority:
/// 1. `LIGHTMEM_BACKEND` env var (`"cpu"` or `"ffi"`, case-insensitive)
/// 2. Cargo feature `default-backend-ffi`
/// 3. CPU fallback
pub fn default_backend() -> BackendKind {
    if let Ok(val) = std::env::var("LIGHTMEM_BACKEND")
        && let Some(kind) = parse_backend(&val)
    {
        return kind;
    }

    if cfg!(feature = "default-backend-ffi") {
        BackendKind::Ffi
    } else {
        BackendKind::Cpu
    }
}

fn parse_backend(val: &str) -> Option<BackendKind> {
    match val.trim().to_lowercase().as_str() {
        "cpu" => Some(BackendKind::Cpu),
        "ffi" => Some(BackendKind::Ffi),
        _ => None,
    }
}

/// How floating point buffers are compared.
///
/// Int32 buffers always compare exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EqualityPolicy {
    /// Bitwise value equality (max absolute difference of zero).
    Exact,
    /// Max absolute difference at or below the per-dtype tolerance.
    Tolerance { float32: f64, float64: f64 },
}

impl EqualityPolicy {
    pub const DEFAULT_TOLERANCE: EqualityPolicy = EqualityPolicy::Tolerance {
        float32: 1e-7,
        float64: 1e-15,
    };

    /// Read `LIGHTMEM_EQUALITY` (`"exact"` or `"tolerance"`); defaults to tolerance.
    pub fn from_env() -> Self {
        match std::env::var("LIGHTMEM_EQUALITY") {
            Ok(val) if val.trim().eq_ignore_ascii_case("exact") => EqualityPolicy::Exact,
            _ => Self::DEFAULT_TOLERANCE,
        }
    }

    pub fn tolerance(&self, dtype: ElementType) -> f64 {
        match (self, dtype) {
            (EqualityPolicy::Exact, _) | (_, ElementType::Int32) => 0.0,
            (EqualityPolicy::Tolerance { float32, .. }, ElementType::Float32) => *float32,
            (EqualityPolicy::Tolerance { float64, .. }, ElementType::Float64) => *float64,
        }
    }

    /// Whether a max absolute difference of `diff` counts as equal.
    pub fn accepts(&self, dtype: ElementType, diff: f64) -> bool {
        diff <= self.tolerance(dtype)
    }
}

static EQUALITY_POLICY: LazyLock<EqualityPolicy> = LazyLock::new(EqualityPolicy::from_env);

/// Process-wide equality policy, read once from the environment.
pub fn equality_policy() -> EqualityPolicy {
    *EQUALITY_POLICY
}

impl Default for EqualityPolicy {
    fn default() -> Self {
        Self::DEFAULT_TOLERANCE
    }
}
