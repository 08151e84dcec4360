//! Read-only views of a processed store: map slices, cross-sections,
//! point time series, vertical profiles and time-step comparisons.

use crate::assemble::PROJECTION_ATTR;
use crate::config::{InspectConfig, InterpVar};
use crate::crs::{CrsDescriptor, CrsError};
use crate::data_io::{Field, StoreError, ZarrStoreReader, SOUTH_NORTH_DIM, TIME_DIM, WEST_EAST_DIM};
use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayViewD, Axis, Ix2};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crs(#[from] CrsError),

    #[error("Index {index} out of range for dimension {dim} of length {len}")]
    IndexOutOfRange { dim: String, index: usize, len: usize },

    #[error("Variable {0} has no vertical dimension")]
    NotVertical(String),

    #[error("Variable {name} lacks dimension {dim}")]
    MissingDimension { name: String, dim: String },

    #[error("No variable selected")]
    NoVariable,

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Vertical section along one grid row (constant south_north index) or one
/// grid column (constant west_east index)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossSection {
    Row(usize),
    Col(usize),
}

impl FromStr for CrossSection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = s
            .split_once(':')
            .ok_or_else(|| format!("Expected row:INDEX or col:INDEX, got '{}'", s))?;
        let index: usize = index
            .trim()
            .parse()
            .map_err(|_| format!("Invalid cross-section index '{}'", index))?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "row" | "we" | "x" => Ok(CrossSection::Row(index)),
            "col" | "column" | "ns" | "y" => Ok(CrossSection::Col(index)),
            other => Err(format!("Unknown cross-section orientation '{}'", other)),
        }
    }
}

impl fmt::Display for CrossSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossSection::Row(j) => write!(f, "row:{}", j),
            CrossSection::Col(i) => write!(f, "col:{}", i),
        }
    }
}

/// Min / max / mean over the finite values of a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub valid: usize,
    pub total: usize,
}

impl FieldStats {
    pub fn compute(data: ArrayViewD<f32>) -> Self {
        let mut stats = FieldStats {
            min: f32::NAN,
            max: f32::NAN,
            mean: f64::NAN,
            valid: 0,
            total: data.len(),
        };
        let mut sum = 0.0f64;
        for &v in data.iter().filter(|v| v.is_finite()) {
            stats.min = if stats.valid == 0 { v } else { stats.min.min(v) };
            stats.max = if stats.valid == 0 { v } else { stats.max.max(v) };
            sum += v as f64;
            stats.valid += 1;
        }
        if stats.valid > 0 {
            stats.mean = sum / stats.valid as f64;
        }
        stats
    }
}

fn check_index(dim: &str, index: usize, len: usize) -> Result<(), ViewerError> {
    if index >= len {
        return Err(ViewerError::IndexOutOfRange {
            dim: dim.to_string(),
            index,
            len,
        });
    }
    Ok(())
}

/// A processed store opened for inspection
pub struct StoreViewer {
    reader: ZarrStoreReader,
    crs: Option<CrsDescriptor>,
    vertical_dim: Option<String>,
    times: Vec<NaiveDateTime>,
    vars_2d: Vec<String>,
    vars_3d: Vec<String>,
}

impl StoreViewer {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ViewerError> {
        let reader = ZarrStoreReader::open(path)?;
        let crs = reader
            .attr_str(PROJECTION_ATTR)
            .map(CrsDescriptor::from_proj4)
            .transpose()?;

        let vertical_dim = reader
            .attr_str("PREPROCESS_INTERP_VAR")
            .map(str::to_string)
            .or_else(|| {
                [InterpVar::GeopotentialHeight, InterpVar::AirPressure]
                    .iter()
                    .map(|v| v.as_str().to_string())
                    .find(|name| reader.has_array(name))
            });

        let mut vars_2d = Vec::new();
        let mut vars_3d = Vec::new();
        for name in reader.variable_names() {
            let dims = reader.dimensions(&name)?;
            match &vertical_dim {
                Some(v) if dims.contains(v) => vars_3d.push(name),
                _ => vars_2d.push(name),
            }
        }
        let times = reader.times()?;
        info!(vars_2d = vars_2d.len(), vars_3d = vars_3d.len(), times = times.len(), "Opened store");

        Ok(Self {
            reader,
            crs,
            vertical_dim,
            times,
            vars_2d,
            vars_3d,
        })
    }

    pub fn crs(&self) -> Option<&CrsDescriptor> {
        self.crs.as_ref()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn vars_2d(&self) -> &[String] {
        &self.vars_2d
    }

    pub fn vars_3d(&self) -> &[String] {
        &self.vars_3d
    }

    pub fn vertical_dim(&self) -> Option<&str> {
        self.vertical_dim.as_deref()
    }

    pub fn reader(&self) -> &ZarrStoreReader {
        &self.reader
    }

    /// Values of the vertical coordinate
    pub fn levels(&self) -> Result<Vec<f32>, ViewerError> {
        match &self.vertical_dim {
            Some(dim) if self.reader.has_array(dim) => {
                Ok(self.reader.read_field(dim)?.data.iter().copied().collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn is_3d(&self, name: &str) -> bool {
        self.vars_3d.iter().any(|v| v == name)
    }

    fn axis(field: &Field, dim: &str) -> Result<usize, ViewerError> {
        field.axis_of(dim).ok_or_else(|| ViewerError::MissingDimension {
            name: field.name.clone(),
            dim: dim.to_string(),
        })
    }

    /// Select one index along a named dimension
    fn select<'a>(
        field: &Field,
        view: ArrayViewD<'a, f32>,
        dims: &mut Vec<String>,
        dim: &str,
        index: usize,
    ) -> Result<ArrayViewD<'a, f32>, ViewerError> {
        let axis = dims.iter().position(|d| d == dim).ok_or_else(|| ViewerError::MissingDimension {
            name: field.name.clone(),
            dim: dim.to_string(),
        })?;
        check_index(dim, index, view.shape()[axis])?;
        dims.remove(axis);
        Ok(view.index_axis_move(Axis(axis), index))
    }

    fn into_2d(view: ArrayViewD<f32>, name: &str) -> Result<Array2<f32>, ViewerError> {
        let rank = view.ndim();
        view.into_dimensionality::<Ix2>()
            .map(|v| v.to_owned())
            .map_err(|_| ViewerError::MissingDimension {
                name: name.to_string(),
                dim: format!("2-D slice (rank {})", rank),
            })
    }

    /// Horizontal slice `[south_north, west_east]` at one time step and,
    /// for 3-D variables, one level
    pub fn map_slice(&self, name: &str, time: usize, level: usize) -> Result<Array2<f32>, ViewerError> {
        let field = self.reader.read_field(name)?;
        let mut dims = field.dims.clone();
        let mut view = Self::select(&field, field.data.view(), &mut dims, TIME_DIM, time)?;
        if let (true, Some(vdim)) = (self.is_3d(name), &self.vertical_dim) {
            view = Self::select(&field, view, &mut dims, vdim, level)?;
        }
        Self::into_2d(view, name)
    }

    /// Vertical section `[level, along]` through a 3-D variable
    pub fn cross_section(
        &self,
        name: &str,
        time: usize,
        section: CrossSection,
    ) -> Result<Array2<f32>, ViewerError> {
        if !self.is_3d(name) {
            return Err(ViewerError::NotVertical(name.to_string()));
        }
        let field = self.reader.read_field(name)?;
        let mut dims = field.dims.clone();
        let view = Self::select(&field, field.data.view(), &mut dims, TIME_DIM, time)?;
        let view = match section {
            CrossSection::Row(j) => Self::select(&field, view, &mut dims, SOUTH_NORTH_DIM, j)?,
            CrossSection::Col(i) => Self::select(&field, view, &mut dims, WEST_EAST_DIM, i)?,
        };
        Self::into_2d(view, name)
    }

    /// Values at grid point `(j, i)` for every time step
    pub fn time_series(
        &self,
        name: &str,
        point: (usize, usize),
        level: usize,
    ) -> Result<Vec<(NaiveDateTime, f32)>, ViewerError> {
        let field = self.reader.read_field(name)?;
        let mut dims = field.dims.clone();
        let mut view = field.data.view();
        if let (true, Some(vdim)) = (self.is_3d(name), &self.vertical_dim) {
            view = Self::select(&field, view, &mut dims, vdim, level)?;
        }
        let view = Self::select(&field, view, &mut dims, SOUTH_NORTH_DIM, point.0)?;
        let view = Self::select(&field, view, &mut dims, WEST_EAST_DIM, point.1)?;
        Self::axis(&field, TIME_DIM)?;
        Ok(self.times.iter().copied().zip(view.iter().copied()).collect())
    }

    /// `(level, value)` pairs at grid point `(j, i)` and one time step
    pub fn profile(
        &self,
        name: &str,
        time: usize,
        point: (usize, usize),
    ) -> Result<Vec<(f32, f32)>, ViewerError> {
        if !self.is_3d(name) {
            return Err(ViewerError::NotVertical(name.to_string()));
        }
        let field = self.reader.read_field(name)?;
        let mut dims = field.dims.clone();
        let view = Self::select(&field, field.data.view(), &mut dims, TIME_DIM, time)?;
        let view = Self::select(&field, view, &mut dims, SOUTH_NORTH_DIM, point.0)?;
        let view = Self::select(&field, view, &mut dims, WEST_EAST_DIM, point.1)?;
        let levels = self.levels()?;
        Ok(levels.into_iter().zip(view.iter().copied()).collect())
    }

    /// Map of `t1 - t0`
    pub fn compare(&self, name: &str, t0: usize, t1: usize, level: usize) -> Result<Array2<f32>, ViewerError> {
        let a = self.map_slice(name, t0, level)?;
        let b = self.map_slice(name, t1, level)?;
        Ok(b - a)
    }

    /// Human-readable description of the store
    pub fn write_summary(&self, out: &mut impl Write) -> Result<(), ViewerError> {
        writeln!(out, "Store: {}", self.reader.path().display())?;
        match &self.crs {
            Some(crs) => writeln!(out, "CRS: {}", crs)?,
            None => writeln!(out, "CRS: unknown")?,
        }
        if let (Some(first), Some(last)) = (self.times.first(), self.times.last()) {
            writeln!(out, "Times: {} ({} .. {})", self.times.len(), first, last)?;
        }
        if let Some(vdim) = &self.vertical_dim {
            let levels = self.levels()?;
            writeln!(out, "Vertical: {} ({} levels)", vdim, levels.len())?;
        }
        writeln!(out, "Coordinates: {}", self.reader.coordinate_names().join(", "))?;
        for key in [
            "PREPROCESS_WRFRUN",
            "PREPROCESS_CASE_NAME",
            "PREPROCESS_FILE_PREFIX",
            "PREPROCESS_LEVS",
            "PREPROCESS_TIMESTAMP",
        ] {
            if let Some(value) = self.reader.attr_str(key) {
                writeln!(out, "{}: {}", key, value)?;
            }
        }
        for (label, names) in [("2-D", &self.vars_2d), ("3-D", &self.vars_3d)] {
            writeln!(out, "{} variables ({}):", label, names.len())?;
            for name in names {
                let field = self.reader.read_field(name)?;
                let stats = FieldStats::compute(field.data.view());
                writeln!(
                    out,
                    "  {:<24} {:<10} min={:.3} max={:.3} mean={:.3} valid={}/{}",
                    name,
                    field.units().unwrap_or("-"),
                    stats.min,
                    stats.max,
                    stats.mean,
                    stats.valid,
                    stats.total
                )?;
            }
        }
        Ok(())
    }
}

/// Rows of a 2-D array as comma separated values
pub fn write_grid_csv(out: &mut impl Write, grid: &Array2<f32>) -> std::io::Result<()> {
    for row in grid.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(())
}

pub fn write_grid_text(out: &mut impl Write, label: &str, grid: &Array2<f32>) -> std::io::Result<()> {
    let stats = FieldStats::compute(grid.view().into_dyn());
    let (rows, cols) = grid.dim();
    writeln!(
        out,
        "{}: {}x{} min={:.3} max={:.3} mean={:.3} valid={}/{}",
        label, rows, cols, stats.min, stats.max, stats.mean, stats.valid, stats.total
    )
}

/// Run the `inspect` subcommand
pub fn run_inspect(config: &InspectConfig, out: &mut impl Write) -> Result<(), ViewerError> {
    let viewer = StoreViewer::open(&config.store)?;

    let wants_data = config.point.is_some() || config.cross_section.is_some() || config.compare.is_some();
    let name = match (&config.variable, wants_data) {
        (Some(name), _) => name.as_str(),
        (None, false) => return viewer.write_summary(out),
        (None, true) => return Err(ViewerError::NoVariable),
    };

    if let Some(section) = config.cross_section {
        let grid = viewer.cross_section(name, config.time, section)?;
        emit(out, config.csv, &format!("{} {} t={}", name, section, config.time), &grid)?;
    } else if let Some((t0, t1)) = config.compare {
        let grid = viewer.compare(name, t0, t1, config.level)?;
        emit(out, config.csv, &format!("{} t{}-t{}", name, t1, t0), &grid)?;
    } else if let Some(point) = config.point {
        if viewer.vars_3d().iter().any(|v| v == name) {
            writeln!(out, "level,value")?;
            for (level, value) in viewer.profile(name, config.time, point)? {
                writeln!(out, "{},{}", level, value)?;
            }
        }
        writeln!(out, "time,value")?;
        for (time, value) in viewer.time_series(name, point, config.level)? {
            writeln!(out, "{},{}", time.format("%Y-%m-%dT%H:%M:%S"), value)?;
        }
    } else {
        let grid = viewer.map_slice(name, config.time, config.level)?;
        emit(out, config.csv, &format!("{} t={} level={}", name, config.time, config.level), &grid)?;
    }
    Ok(())
}

fn emit(out: &mut impl Write, csv: bool, label: &str, grid: &Array2<f32>) -> std::io::Result<()> {
    if csv {
        write_grid_csv(out, grid)
    } else {
        write_grid_text(out, label, grid)
    }
}
