//! Element types, memory spaces and the typed host representation.

use std::fmt;

use crate::descriptor::MemoryDescriptor;
use crate::{MemError, Result};

/// Element type of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int32,
    Float32,
    Float64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            ElementType::Int32 => 4,
            ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        !matches!(self, ElementType::Int32)
    }

    pub const ALL: [ElementType; 3] = [
        ElementType::Int32,
        ElementType::Float32,
        ElementType::Float64,
    ];

    /// ABI tag; `0` is reserved for "null".
    pub fn raw(self) -> i32 {
        match self {
            ElementType::Int32 => 1,
            ElementType::Float32 => 2,
            ElementType::Float64 => 3,
        }
    }

    pub fn from_raw(tag: i32) -> Result<Self> {
        match tag {
            1 => Ok(ElementType::Int32),
            2 => Ok(ElementType::Float32),
            3 => Ok(ElementType::Float64),
            other => Err(MemError::UnsupportedElementType(other)),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementType::Int32 => "int32",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        };
        write!(f, "{s}")
    }
}

/// Address space a buffer lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    Host,
    Device,
}

impl MemorySpace {
    /// ABI tag; `0` is reserved for "null".
    pub fn raw(self) -> i32 {
        match self {
            MemorySpace::Host => 1,
            MemorySpace::Device => 2,
        }
    }

    pub fn from_raw(tag: i32) -> Result<Self> {
        match tag {
            1 => Ok(MemorySpace::Host),
            2 => Ok(MemorySpace::Device),
            other => Err(MemError::UnsupportedMemorySpace(other)),
        }
    }
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySpace::Host => write!(f, "host"),
            MemorySpace::Device => write!(f, "device"),
        }
    }
}

// ── Element trait ───────────────────────────────────────────────────────

/// Rust scalar types that map onto an [`ElementType`].
pub trait Element:
    Copy + Default + PartialEq + PartialOrd + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const DTYPE: ElementType;

    fn to_f64(self) -> f64;

    /// Saturating conversion for integer targets.
    fn from_f64(v: f64) -> Self;

    fn parse_token(token: &str) -> Option<Self>;

    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one element from exactly `DTYPE.size_bytes()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    fn into_array(values: Vec<Self>) -> HostArray;

    fn from_array(array: HostArray) -> Option<Vec<Self>>;
}

impl Element for i32 {
    const DTYPE: ElementType = ElementType::Int32;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as i32
    }

    fn parse_token(token: &str) -> Option<Self> {
        token.parse().ok()
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn into_array(values: Vec<Self>) -> HostArray {
        HostArray::Int32(values)
    }

    fn from_array(array: HostArray) -> Option<Vec<Self>> {
        match array {
            HostArray::Int32(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for f32 {
    const DTYPE: ElementType = ElementType::Float32;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn parse_token(token: &str) -> Option<Self> {
        token.parse().ok()
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn into_array(values: Vec<Self>) -> HostArray {
        HostArray::Float32(values)
    }

    fn from_array(array: HostArray) -> Option<Vec<Self>> {
        match array {
            HostArray::Float32(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for f64 {
    const DTYPE: ElementType = ElementType::Float64;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(v: f64) -> Self {
        v
    }

    fn parse_token(token: &str) -> Option<Self> {
        token.parse().ok()
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(b)
    }

    fn into_array(values: Vec<Self>) -> HostArray {
        HostArray::Float64(values)
    }

    fn from_array(array: HostArray) -> Option<Vec<Self>> {
        match array {
            HostArray::Float64(v) => Some(v),
            _ => None,
        }
    }
}

// ── HostArray ───────────────────────────────────────────────────────────

/// A typed host copy of a buffer's contents.
#[derive(Clone, Debug, PartialEq)]
pub enum HostArray {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl HostArray {
    /// A zero-filled array of `len` elements.
    pub fn zeros(dtype: ElementType, len: usize) -> Self {
        match dtype {
            ElementType::Int32 => HostArray::Int32(vec![0; len]),
            ElementType::Float32 => HostArray::Float32(vec![0.0; len]),
            ElementType::Float64 => HostArray::Float64(vec![0.0; len]),
        }
    }

    pub fn dtype(&self) -> ElementType {
        match self {
            HostArray::Int32(_) => ElementType::Int32,
            HostArray::Float32(_) => ElementType::Float32,
            HostArray::Float64(_) => ElementType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostArray::Int32(v) => v.len(),
            HostArray::Float32(v) => v.len(),
            HostArray::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            HostArray::Int32(v) => v.get(index).map(|x| *x as f64),
            HostArray::Float32(v) => v.get(index).map(|x| *x as f64),
            HostArray::Float64(v) => v.get(index).copied(),
        }
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            HostArray::Int32(v) => v.iter().map(|x| *x as f64).collect(),
            HostArray::Float32(v) => v.iter().map(|x| *x as f64).collect(),
            HostArray::Float64(v) => v.clone(),
        }
    }

    /// Convert every element into `dtype` (saturating for Int32).
    pub fn cast(&self, dtype: ElementType) -> HostArray {
        if dtype == self.dtype() {
            return self.clone();
        }
        let values = self.to_f64_vec();
        match dtype {
            ElementType::Int32 => HostArray::Int32(values.into_iter().map(i32::from_f64).collect()),
            ElementType::Float32 => {
                HostArray::Float32(values.into_iter().map(f32::from_f64).collect())
            }
            ElementType::Float64 => HostArray::Float64(values),
        }
    }

    /// Host descriptor addressing this array's storage.
    ///
    /// The descriptor is only valid while `self` is alive and unmodified.
    pub fn descriptor(&self) -> MemoryDescriptor {
        match self {
            HostArray::Int32(v) => MemoryDescriptor::from_host_slice(v),
            HostArray::Float32(v) => MemoryDescriptor::from_host_slice(v),
            HostArray::Float64(v) => MemoryDescriptor::from_host_slice(v),
        }
    }

    /// Mutable counterpart of [`HostArray::descriptor`].
    pub fn descriptor_mut(&mut self) -> MemoryDescriptor {
        match self {
            HostArray::Int32(v) => MemoryDescriptor::from_host_slice_mut(v),
            HostArray::Float32(v) => MemoryDescriptor::from_host_slice_mut(v),
            HostArray::Float64(v) => MemoryDescriptor::from_host_slice_mut(v),
        }
    }
}

impl fmt::Display for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_all<T: fmt::Display>(f: &mut fmt::Formatter<'_>, v: &[T]) -> fmt::Result {
            for (i, x) in v.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{x}")?;
            }
            Ok(())
        }
        match self {
            HostArray::Int32(v) => write_all(f, v),
            HostArray::Float32(v) => write_all(f, v),
            HostArray::Float64(v) => write_all(f, v),
        }
    }
}
