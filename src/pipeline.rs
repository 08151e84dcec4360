//! Loader -> calculator -> regridder -> assembler -> writer.

use crate::assemble::{assemble, Provenance};
use crate::config::{ConfigError, PreprocessConfig};
use crate::crs::{CrsDescriptor, CrsError};
use crate::data_io::{discover_input_files, ReaderError, SchemaError, WrfReader, WriteError, ZarrStoreWriter};
use crate::derived::compute_derived;
use crate::parallel::{SchedulerError, TaskScheduler};
use crate::regrid::regrid;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data access error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Projection error: {0}")]
    Crs(#[from] CrsError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Worker pool error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub store_path: PathBuf,
    pub input_files: usize,
    pub time_steps: usize,
    pub variables: Vec<String>,
}

/// Run every stage; a failure is logged inside this span before it is
/// returned
#[instrument(skip_all, fields(case = %config.case_name))]
pub fn run(config: &PreprocessConfig) -> Result<RunSummary, PipelineError> {
    let result = run_stages(config);
    if let Err(e) = &result {
        error!(error = %e, "Preprocessing failed");
    }
    result
}

fn run_stages(config: &PreprocessConfig) -> Result<RunSummary, PipelineError> {
    let started = Instant::now();
    info!(
        wrf_run = %config.wrf_run.display(),
        case_name = %config.case_name,
        file_prefix = %config.file_prefix,
        proc_dir = %config.proc_dir.display(),
        levs = %config.levs_expr,
        interp_var = %config.interp_var,
        logfile = %config.logfile.display(),
        num_threads = config.num_threads,
        "Preprocessing arguments"
    );

    let files = discover_input_files(&config.case_dir(), &config.file_prefix)?;
    info!(count = files.len(), "Found input files");

    let native = WrfReader::new(config.constants.clone()).read_files(&files)?;
    let crs = CrsDescriptor::from_wrf_attributes(&native.attrs, config.constants.earth_radius)?;
    info!(crs = %crs, "Domain projection");

    let derived = compute_derived(&native, &config.constants)?;
    info!("Computed derived variables");

    let scheduler = TaskScheduler::new(config.num_threads)?;
    let regridded = regrid(&derived, &config.levels, config.interp_var, &scheduler)?;
    info!(levels = config.levels.len(), "Regridded to target levels");

    let provenance = Provenance::from_config(config);
    let output = assemble(&derived, &regridded, config.interp_var, &crs, &provenance)?;

    let store_path = config.store_path();
    ZarrStoreWriter::new(&store_path).write(&output)?;
    info!(
        path = %store_path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Finished"
    );

    Ok(RunSummary {
        store_path,
        input_files: files.len(),
        time_steps: output.num_times(),
        variables: output.variable_names(),
    })
}
