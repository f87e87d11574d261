//! Golden conformance testing infrastructure.
//!
//! Scenarios are stored as JSON and replayed on any [`Context`]; results are
//! compared against the recorded outputs with per-dtype tolerances.

use serde::{Deserialize, Serialize};

use lightmem_core::{
    Context, CsrMatrix, ElementType, HostArray, Matrix, MemError, Memory, MemoryMut,
    MemorySpace, Result, SparseVector, Vector,
};
use lightmem_io::{binary, text};

/// The built-in golden suite.
pub const SUITE_JSON: &str = include_str!("../goldens/suite.json");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DTypeSpec {
    Int32,
    Float32,
    Float64,
}

impl From<DTypeSpec> for ElementType {
    fn from(d: DTypeSpec) -> Self {
        match d {
            DTypeSpec::Int32 => ElementType::Int32,
            DTypeSpec::Float32 => ElementType::Float32,
            DTypeSpec::Float64 => ElementType::Float64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOp {
    Sum,
    Axpy,
    Scale,
    Hadamard,
    LinSpace,
    Compress,
    CsrCompress,
    CsrDot,
    BinaryRoundtrip,
    TextRoundtrip,
}

/// One recorded operation on a column-major `rows x cols` input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub op: ScenarioOp,
    pub dtype: DTypeSpec,
    pub rows: usize,
    pub cols: usize,
    /// Empty means a zero-filled input.
    #[serde(default)]
    pub input: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    pub expected: Vec<f64>,
}

impl Scenario {
    pub fn element_type(&self) -> ElementType {
        self.dtype.into()
    }

    /// `(atol, rtol)` for comparing results of this scenario's dtype.
    pub fn tolerance(&self) -> (f64, f64) {
        match self.dtype {
            DTypeSpec::Int32 => (0.0, 0.0),
            DTypeSpec::Float32 => (1e-6, 1e-6),
            DTypeSpec::Float64 => (1e-12, 1e-12),
        }
    }

    fn missing(&self, field: &str) -> MemError {
        MemError::InvalidArgument(format!("scenario {}: missing `{field}`", self.name))
    }
}

/// Parse the built-in suite.
pub fn builtin_suite() -> serde_json::Result<Vec<Scenario>> {
    serde_json::from_str(SUITE_JSON)
}

/// Run `s` on `ctx` with device-resident buffers and return the host result.
pub fn run(ctx: &Context, s: &Scenario) -> Result<Vec<f64>> {
    tracing::debug!(scenario = %s.name, backend = ctx.name(), "run scenario");
    let space = MemorySpace::Device;
    let dtype = s.element_type();
    let mut a = if s.input.is_empty() {
        Matrix::new(ctx, s.rows, s.cols, space, dtype)?
    } else {
        Matrix::from_host(ctx, s.rows, s.cols, &host(&s.input, dtype), space)?
    };
    let other = || -> Result<HostArray> {
        let v = s.other.as_ref().ok_or_else(|| s.missing("other"))?;
        Ok(host(v, dtype))
    };
    let alpha = || s.alpha.ok_or_else(|| s.missing("alpha"));

    match s.op {
        ScenarioOp::Sum => Ok(vec![a.sum()?]),
        ScenarioOp::Axpy => {
            let x = Vector::from_host(ctx, &other()?, space)?;
            a.add_assign_scaled(&x, alpha()?)?;
            values(&a)
        }
        ScenarioOp::Scale => {
            a.scale(alpha()?)?;
            values(&a)
        }
        ScenarioOp::Hadamard => {
            let x = Vector::from_host(ctx, &other()?, space)?;
            a.hadamard_assign(&x)?;
            values(&a)
        }
        ScenarioOp::LinSpace => {
            let start = s.start.ok_or_else(|| s.missing("start"))?;
            let end = s.end.ok_or_else(|| s.missing("end"))?;
            a.lin_space(start, end)?;
            values(&a)
        }
        ScenarioOp::Compress => {
            let threshold = s.threshold.ok_or_else(|| s.missing("threshold"))?;
            let sv = SparseVector::compress(&a, threshold)?;
            values(&sv.to_dense()?)
        }
        ScenarioOp::CsrCompress => {
            let threshold = s.threshold.ok_or_else(|| s.missing("threshold"))?;
            let csr = CsrMatrix::compress(&a, threshold)?;
            values(&csr.to_dense()?)
        }
        ScenarioOp::CsrDot => {
            let csr = CsrMatrix::compress_default(&a)?;
            let x = Vector::from_host(ctx, &other()?, space)?;
            values(&csr.dot(&x)?)
        }
        ScenarioOp::BinaryRoundtrip => {
            let bytes = binary::encode_matrix(a.rows(), a.cols(), &a.to_host()?)?;
            let back = binary::decode_matrix(&bytes, dtype)?.to_matrix(ctx, space)?;
            require_equal(&back, &a)?;
            values(&back)
        }
        ScenarioOp::TextRoundtrip => {
            let rendered = text::format_matrix(a.rows(), a.cols(), &a.to_host()?)?;
            let back = text::parse_matrix(&rendered, dtype)?.to_matrix(ctx, space)?;
            require_equal(&back, &a)?;
            values(&back)
        }
    }
}

fn host(values: &[f64], dtype: ElementType) -> HostArray {
    HostArray::Float64(values.to_vec()).cast(dtype)
}

fn values<M: Memory>(m: &M) -> Result<Vec<f64>> {
    Ok(m.to_host()?.to_f64_vec())
}

fn require_equal(a: &Matrix, b: &Matrix) -> Result<()> {
    if a.rows() != b.rows() || a.cols() != b.cols() || !a.equals(b)? {
        return Err(MemError::Decode("round trip changed the matrix".into()));
    }
    Ok(())
}

/// Assert two f64 slices are element-wise close.
pub fn assert_allclose(a: &[f64], b: &[f64], atol: f64, rtol: f64) {
    assert_eq!(
        a.len(),
        b.len(),
        "length mismatch: actual={} expected={}",
        a.len(),
        b.len()
    );
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "mismatch at [{i}]: actual={x} expected={y} diff={diff} tol={tol}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allclose_exact() {
        assert_allclose(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 0.0, 0.0);
    }

    #[test]
    fn test_allclose_within_tolerance() {
        assert_allclose(&[1.0001], &[1.0], 1e-3, 1e-3);
    }

    #[test]
    #[should_panic(expected = "mismatch")]
    fn test_allclose_fails() {
        assert_allclose(&[1.0], &[2.0], 1e-6, 1e-6);
    }

    #[test]
    fn test_suite_parses() {
        let suite = builtin_suite().unwrap();
        assert!(suite.len() >= 10);
        assert!(suite.iter().any(|s| s.op == ScenarioOp::CsrDot));
    }

    #[test]
    fn test_missing_field_reported() {
        let mut s = builtin_suite().unwrap().remove(1);
        s.alpha = None;
        let err = run(&Context::cpu(), &s).unwrap_err();
        assert!(err.to_string().contains("alpha"));
    }
}
