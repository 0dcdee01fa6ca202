//! High-resolution regridding driver.
//!
//! Runs one or more YAML jobs. Each job streams a raw source raster from disk
//! block by block, aggregates it onto a coarser grid for every configured
//! variable, and writes the results with:
//! - Area weighting on a sphere or the WGS84 ellipsoid
//! - Cropping of the source to the target extent
//! - Degree tiles or automatic strips to bound memory
//! - Raw little-endian arrays plus JSON sidecars

mod job;
mod output;
mod source;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use regrid_engine::{
    AggregationSpec, AreaCache, BlockShape, BlockSource, CellBlock, Grid, RegridConfig,
    RegridStats, Regridder, TargetRaster, WindowedSource,
};

use job::JobConfig;
use source::RawFileSource;

#[derive(Parser, Debug)]
#[command(name = "regridder")]
#[command(about = "Area-weighted regridding of high-resolution rasters")]
struct Args {
    /// Job file(s) to run, in order
    #[arg(short, long, required = true)]
    job: Vec<PathBuf>,

    /// Override the output directory of every job
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Process blocks on all cores (also enabled by REGRID_PARALLEL)
    #[arg(long)]
    parallel: bool,

    /// Validate jobs and log the block plan without reading data
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// Options shared by every job of one invocation.
#[derive(Debug, Clone, Default)]
struct RunOptions {
    output_dir: Option<PathBuf>,
    parallel: bool,
    dry_run: bool,
}

/// What a job produced.
#[derive(Debug)]
struct JobSummary {
    variables: Vec<PathBuf>,
    stats: Option<RegridStats>,
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    info!(jobs = args.job.len(), "Starting regridder");

    let env_config = RegridConfig::from_env();
    env_config.validate().map_err(|e| anyhow!(e))?;
    let mut cache = AreaCache::new(env_config.area_cache_size_bytes());

    let options = RunOptions {
        output_dir: args.output_dir,
        parallel: args.parallel,
        dry_run: args.dry_run,
    };

    for path in &args.job {
        let summary = run_job(path, &env_config, &options, &mut cache)
            .with_context(|| format!("Job failed: {}", path.display()))?;
        if let Some(stats) = summary.stats {
            info!(
                job = %path.display(),
                variables = summary.variables.len(),
                blocks = stats.blocks,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                "Job complete"
            );
        }
    }

    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate(),
        "Area cache"
    );
    Ok(())
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Load, plan and run one job, then write its variables.
fn run_job(
    path: &Path,
    env_config: &RegridConfig,
    options: &RunOptions,
    cache: &mut AreaCache,
) -> Result<JobSummary> {
    let job = JobConfig::load(path)?;

    let mut config = env_config.clone();
    job.apply(&mut config)?;
    config.parallel |= options.parallel;

    let target = job.target_grid()?;
    let shape = job.block_shape()?;
    let specs = job.specs()?;
    let regridder = Regridder::new(config);

    if options.dry_run {
        // Nothing is read, so the source file need not exist yet.
        let window = job.source.grid.window(&target)?;
        let source_grid = job.source.grid.sub_grid(&window)?;
        let plan = regridder.plan(&source_grid, &target, &shape)?;
        info!(
            job = %path.display(),
            source = %source_grid,
            target = %target,
            blocks = plan.blocks.len(),
            max_block_cells = plan.max_block_cells(),
            "Dry run"
        );
        return Ok(JobSummary {
            variables: Vec::new(),
            stats: None,
        });
    }

    let source = RawFileSource::open(&job.source.path, job.source.grid, job.source.byte_order)
        .with_context(|| format!("Failed to open source: {}", job.source.path.display()))?;

    let window = source.grid().window(&target)?;
    let (targets, stats) = if window == CellBlock::full(source.grid()) {
        regrid_source(&regridder, &source, &target, &specs, &shape, cache)?
    } else {
        info!(window = %window, "Cropping source to target extent");
        let cropped = WindowedSource::new(&source, window)?;
        regrid_source(&regridder, &cropped, &target, &specs, &shape, cache)?
    };

    let dir = options.output_dir.as_deref().unwrap_or(job.output.dir.as_path());
    let mut variables = Vec::with_capacity(targets.len());
    for (target, variable) in targets.iter().zip(&job.variables) {
        let files = output::write_target(
            dir,
            target,
            job.output.dtype,
            variable.units.as_deref(),
            source.path(),
        )?;
        debug!(sidecar = %files.sidecar.display(), "Wrote sidecar");
        variables.push(files.data);
    }

    Ok(JobSummary {
        variables,
        stats: Some(stats),
    })
}

fn regrid_source<S: BlockSource + Sync>(
    regridder: &Regridder,
    source: &S,
    target: &Grid,
    specs: &[AggregationSpec],
    shape: &BlockShape,
    cache: &mut AreaCache,
) -> Result<(Vec<TargetRaster>, RegridStats)> {
    let output = regridder.run_cached(source, target, specs, cache, shape)?;
    Ok((output.targets, output.stats))
}
