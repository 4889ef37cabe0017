use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use parallel_reduce::*;

/// Device the reduction runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeviceKind {
    /// This machine's CPU.
    Host,
    /// A simulated accelerator executed on host threads.
    Accelerator,
    /// A real GPU through CubeCL (needs the `cuda` or `wgpu` feature).
    Gpu,
}

/// Checks the parallel minimum reduction against a sequential scan
#[derive(Parser, Debug)]
#[command(name = "reduce_min")]
#[command(version)]
struct Args {
    /// Side length N of the N*N dataset
    #[arg(short = 'n', long, default_value_t = 128)]
    size: usize,

    /// Number of repeated runs
    #[arg(short, long, default_value_t = 100)]
    runs: usize,

    /// Use the hand-written reduction instead of the generic engine
    #[arg(long)]
    non_generic: bool,

    /// Device to run on
    #[arg(short, long, value_enum, default_value_t = DeviceKind::Host)]
    device: DeviceKind,

    /// Override the reported compute unit count
    #[arg(long)]
    compute_units: Option<usize>,

    /// Override the reported native double vector width
    #[arg(long)]
    vector_width: Option<usize>,

    /// Override the reported maximum work-group size
    #[arg(long)]
    max_work_group_size: Option<usize>,
}

impl Args {
    fn device_info(&self) -> DeviceInfo {
        let mut info = match self.device {
            DeviceKind::Accelerator => DeviceInfo::accelerator("simulated accelerator", 4, 64),
            _ => DeviceInfo::host(),
        };
        if let Some(units) = self.compute_units {
            info = info.with_compute_units(units);
        }
        if let Some(width) = self.vector_width {
            info = info.with_native_vector_width_double(width);
        }
        if let Some(size) = self.max_work_group_size {
            info = info.with_max_work_group_size(size);
        }
        info
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.device == DeviceKind::Gpu {
        return run_gpu(&args);
    }

    let queue = HostQueue::new(args.device_info());
    print_device_info(queue.device());

    let sizing = GroupSizing::for_device(queue.device(), args.size.saturating_mul(args.size));
    tracing::info!(
        "N = {}, {} groups of {} workers, {} implementation",
        args.size,
        sizing.num_groups,
        sizing.group_size,
        if args.non_generic { "non-generic" } else { "generic" }
    );

    let failures = run_harness(&args, |n| {
        if args.non_generic {
            reduce_min_non_generic(&queue, n)
        } else {
            reduce_min(&queue, n)
        }
    })?;
    finish(args.runs, failures)
}

/// Run every iteration, printing one line per run. Returns the mismatch count.
fn run_harness<F>(args: &Args, mut reduce: F) -> Result<usize>
where
    F: FnMut(usize) -> parallel_reduce::Result<f64>,
{
    let mut failures = 0;
    for run in 0..args.runs {
        let expected = reduce_min_reference(args.size).context("dataset is empty")?;
        let actual = reduce(args.size).with_context(|| format!("run #{run} failed"))?;
        let ok = actual == expected;
        if !ok {
            failures += 1;
        }
        println!(
            "Run #{run} Expected={expected} Actual={actual} {}",
            if ok { "OK!" } else { "FAIL!" }
        );
    }
    println!("Done");
    Ok(failures)
}

fn finish(runs: usize, failures: usize) -> Result<()> {
    println!("{} of {} runs matched", runs - failures, runs);
    if failures > 0 {
        bail!("{failures} runs did not match the sequential minimum");
    }
    Ok(())
}

fn print_device_info(info: &DeviceInfo) {
    println!("Device Name: {}", info.name());
    println!("Device Vendor: {}", info.vendor());
    println!("Device Extensions: {}", info.extensions().join(" "));
    println!("Platform Name: {}", info.platform());
    println!("Platform Vendor: {}", info.platform_vendor());
    println!("Platform Version: {}", info.version());
    println!("Platform Profile: {}", info.profile());
    println!(
        "Class: {}, compute units: {}, double vector width: {}, max work-group size: {}",
        info.class(),
        info.max_compute_units(),
        info.native_vector_width_double(),
        info.max_work_group_size()
    );
    println!();
}

#[cfg(feature = "cuda")]
fn run_gpu(args: &Args) -> Result<()> {
    tracing::info!("Initializing CUDA runtime...");
    let runtime = init_cuda_runtime()?;
    run_gpu_harness(args, &runtime)
}

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
fn run_gpu(args: &Args) -> Result<()> {
    tracing::info!("Initializing WGPU runtime...");
    let runtime = init_wgpu_runtime()?;
    run_gpu_harness(args, &runtime)
}

#[cfg(not(any(feature = "cuda", feature = "wgpu")))]
fn run_gpu(_args: &Args) -> Result<()> {
    bail!("no GPU backend compiled in; build with `--features cuda` or `--features wgpu`")
}

#[cfg(any(feature = "cuda", feature = "wgpu"))]
fn run_gpu_harness<R: CubeclRuntime>(args: &Args, runtime: &RuntimeContext<R>) -> Result<()> {
    print_device_info(runtime.device_info());
    tracing::info!("Backend: {}", runtime.backend_name());
    let failures = run_harness(args, |n| reduce_min_gpu(runtime, n).map(f64::from))?;
    finish(args.runs, failures)
}
