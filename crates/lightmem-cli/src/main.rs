use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lightmem_core::config::{BackendKind, DEFAULT_COMPRESS_THRESHOLD};
use lightmem_core::{
    Context, CsrMatrix, DeviceManager, ElementType, HostArray, Matrix, Memory, MemoryMut,
    MemorySpace, Result, SparseVector, Tensor, Vector,
};

#[derive(Parser)]
#[command(name = "lightmem")]
#[command(about = "lightmem development CLI")]
struct Args {
    /// Backend override; defaults to LIGHTMEM_BACKEND.
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a quick smoke test of buffers, views and sparse kernels.
    Smoke,
    /// Summarize a binary or text buffer file.
    Inspect {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "float64")]
        dtype: DTypeArg,
        /// Treat the file as a matrix (shape trailer, or text rows with --text).
        #[arg(long)]
        matrix: bool,
        /// Parse whitespace-separated text rows instead of binary.
        #[arg(long, requires = "matrix")]
        text: bool,
        #[arg(long)]
        json: bool,
    },
    /// Report how a buffer file compresses at a threshold.
    Compress {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "float64")]
        dtype: DTypeArg,
        #[arg(long)]
        matrix: bool,
        #[arg(long, default_value_t = DEFAULT_COMPRESS_THRESHOLD)]
        threshold: f64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Cpu,
    Ffi,
}

#[derive(Clone, Copy, ValueEnum)]
enum DTypeArg {
    Int32,
    Float32,
    Float64,
}

impl From<DTypeArg> for ElementType {
    fn from(d: DTypeArg) -> Self {
        match d {
            DTypeArg::Int32 => ElementType::Int32,
            DTypeArg::Float32 => ElementType::Float32,
            DTypeArg::Float64 => ElementType::Float64,
        }
    }
}

#[derive(Serialize)]
struct Summary {
    dtype: String,
    len: usize,
    rows: Option<usize>,
    cols: Option<usize>,
    min: Option<f64>,
    max: Option<f64>,
    sum: f64,
}

#[derive(Serialize)]
struct CompressReport {
    dtype: String,
    dense_len: usize,
    nnz: usize,
    density: f64,
    threshold: f64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let ctx = match args.backend {
        Some(BackendArg::Cpu) => lightmem_ffi_backend::context_for(BackendKind::Cpu),
        Some(BackendArg::Ffi) => lightmem_ffi_backend::context_for(BackendKind::Ffi),
        None => lightmem_ffi_backend::default_context(),
    };
    tracing::debug!(backend = ctx.name(), "context ready");

    let result = match args.cmd {
        Cmd::Smoke => smoke(&ctx),
        Cmd::Inspect {
            path,
            dtype,
            matrix,
            text,
            json,
        } => inspect(&ctx, &path, dtype.into(), matrix, text, json),
        Cmd::Compress {
            path,
            dtype,
            matrix,
            threshold,
            json,
        } => compress(&ctx, &path, dtype.into(), matrix, threshold, json),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn smoke(ctx: &Context) -> Result<()> {
    let dm = DeviceManager::new(ctx);
    println!("Backend: {}", ctx.name());
    println!("Devices: {}\n", dm.device_count()?);
    dm.check_sanity()?;

    // matrix with per-column initializers
    let mut m = Matrix::new(ctx, 3, 3, MemorySpace::Device, ElementType::Float32)?;
    m.lin_space_column(0, 0.0, 1.0)?;
    m.set_column(2, 5.0)?;
    println!("matrix 3x3 (col 0 linspace, col 2 = 5):\n{m}");

    // axpy through a view
    let x = Vector::filled(ctx, 3, MemorySpace::Device, ElementType::Float32, 1.0)?;
    m.column_mut(1)?.add_assign_scaled(&x, 2.0)?;
    println!("column 1 after += 2 * ones = {:?}", m.get_column::<f32>(1)?);

    // tensor cubes
    let t = Tensor::from_matrices(&[&m, &Matrix::identity(ctx, 3, MemorySpace::Device, ElementType::Float32)?])?;
    println!("tensor 3x3x{} sum = {}", t.n_cubes(), t.sum()?);

    // sparse vector
    let mut dense = vec![0.0f32; 100];
    for i in [0, 5, 10, 50, 75] {
        dense[i] = 1.2345;
    }
    let v = Vector::from_slice(ctx, &dense, MemorySpace::Device)?;
    let sv = SparseVector::compress_default(&v)?;
    let back = sv.to_dense()?.get::<f32>()?;
    println!("sparse 100 -> nnz {} (back[5] = {}, back[6] = {})", sv.nnz(), back[5], back[6]);

    // csr matrix-vector
    let a = Matrix::from_column_major(
        ctx,
        3,
        3,
        &[1.0f64, 0.0, 0.0, 0.0, 0.0, 3.0, 2.0, 0.0, 4.0],
        MemorySpace::Device,
    )?;
    let csr = CsrMatrix::compress_default(&a)?;
    let ones = Vector::filled(ctx, 3, MemorySpace::Device, ElementType::Float64, 1.0)?;
    println!(
        "csr row_offsets = {:?}, A * ones = {:?}",
        csr.row_offsets().get::<i32>()?,
        csr.dot(&ones)?.get::<f64>()?
    );

    println!("\nLive allocations: {}", ctx.live_allocations());
    println!("All smoke tests passed.");
    Ok(())
}

fn load(
    ctx: &Context,
    path: &std::path::Path,
    dtype: ElementType,
    matrix: bool,
    text: bool,
) -> Result<(Option<(usize, usize)>, HostArray, Option<Matrix>)> {
    if matrix {
        let data = if text {
            lightmem_io::read_matrix_text(path, dtype)?
        } else {
            lightmem_io::read_matrix_binary(path, dtype)?
        };
        let m = data.to_matrix(ctx, MemorySpace::Device)?;
        Ok((Some((data.rows, data.cols)), data.data, Some(m)))
    } else {
        Ok((None, lightmem_io::read_binary_mmap(path, dtype)?, None))
    }
}

fn inspect(
    ctx: &Context,
    path: &std::path::Path,
    dtype: ElementType,
    matrix: bool,
    text: bool,
    json: bool,
) -> Result<()> {
    let (shape, data, m) = load(ctx, path, dtype, matrix, text)?;
    let values = data.to_f64_vec();
    let summary = Summary {
        dtype: dtype.to_string(),
        len: data.len(),
        rows: shape.map(|s| s.0),
        cols: shape.map(|s| s.1),
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        sum: values.iter().sum(),
    };
    if json {
        print_json(&summary);
    } else {
        println!("{}: {} x {}", path.display(), summary.len, summary.dtype);
        if let Some((r, c)) = shape {
            println!("shape: {r} x {c}");
        }
        println!("min: {:?}  max: {:?}  sum: {}", summary.min, summary.max, summary.sum);
        if let Some(m) = m
            && m.len() <= 64
        {
            print!("{m}");
        }
    }
    Ok(())
}

fn compress(
    ctx: &Context,
    path: &std::path::Path,
    dtype: ElementType,
    matrix: bool,
    threshold: f64,
    json: bool,
) -> Result<()> {
    let (_, data, m) = load(ctx, path, dtype, matrix, false)?;
    let nnz = match m {
        Some(m) => CsrMatrix::compress(&m, threshold)?.nnz(),
        None => {
            let v = Vector::from_host(ctx, &data, MemorySpace::Device)?;
            SparseVector::compress(&v, threshold)?.nnz()
        }
    };
    let report = CompressReport {
        dtype: dtype.to_string(),
        dense_len: data.len(),
        nnz,
        density: if data.is_empty() {
            0.0
        } else {
            nnz as f64 / data.len() as f64
        },
        threshold,
    };
    if json {
        print_json(&report);
    } else {
        println!(
            "{}: {} of {} entries above {} (density {:.4})",
            path.display(),
            report.nnz,
            report.dense_len,
            report.threshold,
            report.density
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("error: cannot serialize report: {e}"),
    }
}
