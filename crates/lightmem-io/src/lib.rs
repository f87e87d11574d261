//! Buffer I/O: length-prefixed binary files, whitespace text matrices and
//! safetensors archives of named matrices.

pub mod binary;
pub mod tensors;
pub mod text;

pub use binary::{
    read_binary, read_binary_into, read_binary_mmap, read_matrix_binary,
    read_matrix_binary_into, write_binary, write_matrix_binary,
};
pub use tensors::{load_safetensors, load_safetensors_mmap, save_safetensors};
pub use text::{read_matrix_text, read_matrix_text_into, write_matrix_text};

use lightmem_core::{Context, HostArray, Matrix, MemorySpace, Result};

/// A decoded matrix: shape plus column-major host values.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixData {
    pub rows: usize,
    pub cols: usize,
    pub data: HostArray,
}

impl MatrixData {
    /// Upload into a new matrix.
    pub fn to_matrix(&self, ctx: &Context, space: MemorySpace) -> Result<Matrix> {
        Matrix::from_host(ctx, self.rows, self.cols, &self.data, space)
    }

    /// Overwrite `m`, reallocating when the size differs.
    pub fn load_into(&self, m: &mut Matrix) -> Result<()> {
        m.read_from_host(self.rows, self.cols, &self.data)
    }
}
