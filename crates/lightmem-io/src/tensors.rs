//! Safetensors archives of named matrices.
//!
//! Matrices are stored row-major with shape `[rows, cols]`; rank-1 tensors
//! load as `n x 1` matrices.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use memmap2::Mmap;
use safetensors::SafeTensors;
use safetensors::tensor::TensorView;

use lightmem_core::{
    Context, Element, ElementType, HostArray, Matrix, MemError, Memory, MemorySpace, Result,
};

/// Load all matrices from a safetensors file into memory.
pub fn load_safetensors(
    path: &Path,
    ctx: &Context,
    space: MemorySpace,
) -> Result<HashMap<String, Matrix>> {
    let data = fs::read(path)?;
    let st = SafeTensors::deserialize(&data)
        .map_err(|e| MemError::Decode(format!("safetensors parse error: {e}")))?;
    deserialize_matrices(&st, ctx, space)
}

/// Load all matrices from a safetensors file using memory-mapped I/O.
pub fn load_safetensors_mmap(
    path: &Path,
    ctx: &Context,
    space: MemorySpace,
) -> Result<HashMap<String, Matrix>> {
    let file = fs::File::open(path)?;
    // SAFETY: The file must not be modified while the mmap is alive.
    let mmap = unsafe { Mmap::map(&file)? };
    let st = SafeTensors::deserialize(&mmap)
        .map_err(|e| MemError::Decode(format!("safetensors parse error: {e}")))?;
    deserialize_matrices(&st, ctx, space)
}

/// Save matrices to a safetensors file.
pub fn save_safetensors(path: &Path, matrices: &HashMap<String, Matrix>) -> Result<()> {
    let mut entries: Vec<(&str, Vec<u8>, safetensors::Dtype, Vec<usize>)> =
        Vec::with_capacity(matrices.len());
    for (name, m) in matrices {
        let bytes = row_major_bytes(m.rows(), m.cols(), &m.to_host()?);
        entries.push((name.as_str(), bytes, map_dtype_reverse(m.dtype()), vec![m.rows(), m.cols()]));
    }

    let views = entries
        .iter()
        .map(|(name, bytes, dtype, shape)| {
            TensorView::new(*dtype, shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| MemError::InvalidArgument(format!("safetensors view error: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(path = %path.display(), count = views.len(), "save safetensors");
    safetensors::serialize_to_file(views, &None, path)
        .map_err(|e| MemError::InvalidArgument(format!("safetensors save error: {e}")))?;
    Ok(())
}

fn deserialize_matrices(
    st: &SafeTensors<'_>,
    ctx: &Context,
    space: MemorySpace,
) -> Result<HashMap<String, Matrix>> {
    let mut result = HashMap::new();
    for (name, view) in st.tensors() {
        let dtype = map_dtype(view.dtype())?;
        let (rows, cols) = match view.shape() {
            [n] => (*n, 1),
            [r, c] => (*r, *c),
            other => {
                return Err(MemError::Decode(format!(
                    "tensor {name:?} has rank {}, expected a matrix",
                    other.len()
                )));
            }
        };
        let data = column_major(dtype, rows, cols, view.data());
        result.insert(name, Matrix::from_host(ctx, rows, cols, &data, space)?);
    }
    Ok(result)
}

fn map_dtype(st_dtype: safetensors::Dtype) -> Result<ElementType> {
    match st_dtype {
        safetensors::Dtype::I32 => Ok(ElementType::Int32),
        safetensors::Dtype::F32 => Ok(ElementType::Float32),
        safetensors::Dtype::F64 => Ok(ElementType::Float64),
        other => Err(MemError::Decode(format!(
            "unsupported safetensors dtype: {other:?}"
        ))),
    }
}

fn map_dtype_reverse(dtype: ElementType) -> safetensors::Dtype {
    match dtype {
        ElementType::Int32 => safetensors::Dtype::I32,
        ElementType::Float32 => safetensors::Dtype::F32,
        ElementType::Float64 => safetensors::Dtype::F64,
    }
}

fn row_major_bytes(rows: usize, cols: usize, data: &HostArray) -> Vec<u8> {
    fn transpose<T: Element>(rows: usize, cols: usize, v: &[T]) -> Vec<u8> {
        let mut out = Vec::with_capacity(v.len() * T::DTYPE.size_bytes());
        for i in 0..rows {
            for j in 0..cols {
                v[i + j * rows].write_le(&mut out);
            }
        }
        out
    }
    match data {
        HostArray::Int32(v) => transpose(rows, cols, v),
        HostArray::Float32(v) => transpose(rows, cols, v),
        HostArray::Float64(v) => transpose(rows, cols, v),
    }
}

fn column_major(dtype: ElementType, rows: usize, cols: usize, bytes: &[u8]) -> HostArray {
    fn transpose<T: Element>(rows: usize, cols: usize, bytes: &[u8]) -> HostArray {
        let row_major: Vec<T> = bytes
            .chunks_exact(T::DTYPE.size_bytes())
            .map(T::read_le)
            .collect();
        let mut out = vec![T::default(); rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                out[i + j * rows] = row_major[i * cols + j];
            }
        }
        T::into_array(out)
    }
    match dtype {
        ElementType::Int32 => transpose::<i32>(rows, cols, bytes),
        ElementType::Float32 => transpose::<f32>(rows, cols, bytes),
        ElementType::Float64 => transpose::<f64>(rows, cols, bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_transposes() {
        // column-major [[1, 2, 3], [4, 5, 6]]
        let cm = HostArray::Int32(vec![1, 4, 2, 5, 3, 6]);
        let bytes = row_major_bytes(2, 3, &cm);
        let rm: Vec<i32> = bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(rm, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(column_major(ElementType::Int32, 2, 3, &bytes), cm);
    }

    #[test]
    fn test_unsupported_dtype() {
        assert!(matches!(
            map_dtype(safetensors::Dtype::BF16),
            Err(MemError::Decode(_))
        ));
    }
}
