//! Property tests for dense ↔ sparse compression.
//!
//! Any dense input must decompress back to itself with entries at or below
//! the threshold zeroed, regardless of shape, sparsity or memory space.

use lightmem_core::{
    Context, CsrMatrix, HostArray, Matrix, Memory, MemorySpace, SparseVector, Vector,
};
use proptest::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────────

/// Mostly-zero values with a sprinkling of tiny ones below the threshold.
fn sparse_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        6 => Just(0.0),
        1 => Just(5e-8),
        3 => -100.0f64..100.0,
    ]
}

fn space() -> impl Strategy<Value = MemorySpace> {
    prop_oneof![Just(MemorySpace::Host), Just(MemorySpace::Device)]
}

fn dense_matrix() -> impl Strategy<Value = (usize, usize, Vec<f64>)> {
    (1usize..=8, 1usize..=8).prop_flat_map(|(r, c)| {
        prop::collection::vec(sparse_value(), r * c).prop_map(move |v| (r, c, v))
    })
}

fn thresholded(values: &[f64], threshold: f64) -> Vec<f64> {
    values
        .iter()
        .map(|&x| if x.abs() > threshold { x } else { 0.0 })
        .collect()
}

proptest! {
    #[test]
    fn vector_roundtrip(values in prop::collection::vec(sparse_value(), 1..64), space in space()) {
        let ctx = Context::cpu();
        let v = Vector::from_slice(&ctx, &values, space).unwrap();
        let sv = SparseVector::compress(&v, 1e-7).unwrap();
        let expected = thresholded(&values, 1e-7);
        prop_assert_eq!(sv.nnz(), expected.iter().filter(|x| **x != 0.0).count());
        prop_assert_eq!(sv.decompress().unwrap(), HostArray::Float64(expected.clone()));
        prop_assert_eq!(sv.to_dense().unwrap().get::<f64>().unwrap(), expected);
    }

    #[test]
    fn csr_roundtrip((rows, cols, values) in dense_matrix(), space in space()) {
        let ctx = Context::cpu();
        let m = Matrix::from_column_major(&ctx, rows, cols, &values, space).unwrap();
        let csr = CsrMatrix::compress(&m, 1e-7).unwrap();
        let offsets = csr.row_offsets().get::<i32>().unwrap();
        prop_assert_eq!(offsets.len(), rows + 1);
        prop_assert_eq!(offsets[0], 0);
        prop_assert_eq!(offsets[rows] as usize, csr.nnz());
        prop_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(csr.decompress().unwrap(), HostArray::Float64(thresholded(&values, 1e-7)));
    }

    #[test]
    fn csr_dot_matches_dense((rows, cols, values) in dense_matrix()) {
        let ctx = Context::cpu();
        let m = Matrix::from_column_major(&ctx, rows, cols, &values, MemorySpace::Device).unwrap();
        let csr = CsrMatrix::compress(&m, 0.0).unwrap();
        let x: Vec<f64> = (0..cols).map(|j| j as f64 + 1.0).collect();
        let xv = Vector::from_slice(&ctx, &x, MemorySpace::Device).unwrap();
        let y = csr.dot(&xv).unwrap().get::<f64>().unwrap();
        for i in 0..rows {
            let expected: f64 = (0..cols).map(|j| values[i + j * rows] * x[j]).sum();
            prop_assert!((y[i] - expected).abs() <= 1e-9 * (1.0 + expected.abs()));
        }
    }
}
