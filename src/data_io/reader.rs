use super::postprocess::{apply_wrf_diagnostics, destagger};
use super::utils::{annotate, is_coordinate_var, is_grid_layout};
use super::{AttributeValue, Attributes, Dataset, Field, SchemaError, SOUTH_NORTH_DIM, TIME_DIM, WEST_EAST_DIM};
use crate::config::Constants;
use crate::time_utils::{time_from_filename, TimeUnits};
use chrono::NaiveDateTime;
use ndarray::{concatenate, ArrayD, ArrayView, Axis, IxDyn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Name of the WRF model-time variable
pub const XTIME_VAR: &str = "XTIME";

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No files starting with '{prefix}' in {dir}")]
    NoInputFiles { dir: String, prefix: String },

    #[error("Incompatible dimensions in {path}: {detail}")]
    IncompatibleDimensions { path: String, detail: String },

    #[error("Invalid time metadata in {path}: {detail}")]
    TimeMetadata { path: String, detail: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// All regular files in `case_dir` whose name starts with `prefix`, sorted
/// by name
pub fn discover_input_files(case_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ReaderError> {
    if !case_dir.is_dir() {
        return Err(ReaderError::FileNotFound(format!(
            "Case directory not found: {}",
            case_dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(case_dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(ReaderError::NoInputFiles {
            dir: case_dir.display().to_string(),
            prefix: prefix.to_string(),
        });
    }
    Ok(files)
}

/// Contents of one `wrfout` file before concatenation
#[derive(Debug)]
struct FileContents {
    path: PathBuf,
    times: Vec<NaiveDateTime>,
    /// Sizes of every non-time dimension used by a loaded variable
    dim_sizes: BTreeMap<String, usize>,
    variables: BTreeMap<String, Field>,
    coords: BTreeMap<String, Field>,
    attrs: Attributes,
}

/// Loads a set of WRF output files into one time-sorted, destaggered
/// [`Dataset`] with the standard diagnostics added
#[derive(Debug, Clone, Default)]
pub struct WrfReader {
    pub constants: Constants,
}

impl WrfReader {
    pub fn new(constants: Constants) -> Self {
        Self { constants }
    }

    #[instrument(skip_all, fields(files = paths.len()))]
    pub fn read_files(&self, paths: &[PathBuf]) -> Result<Dataset, ReaderError> {
        if paths.is_empty() {
            return Err(ReaderError::FileNotFound("no input files given".to_string()));
        }

        let mut contents = Vec::with_capacity(paths.len());
        for path in paths {
            let file = read_wrf_file(path)?;
            debug!(
                path = %path.display(),
                times = file.times.len(),
                variables = file.variables.len(),
                "read WRF file"
            );
            contents.push(file);
        }

        check_dimensions(&contents)?;
        let mut ds = concatenate_files(contents)?;
        sort_by_time(&mut ds);

        for field in ds.variables.values_mut() {
            *field = destagger(field);
        }
        apply_wrf_diagnostics(&mut ds, &self.constants)?;

        info!(
            times = ds.num_times(),
            variables = ds.variables.len(),
            "Loaded WRF output"
        );
        Ok(ds)
    }
}

fn read_wrf_file(path: &Path) -> Result<FileContents, ReaderError> {
    if !path.exists() {
        return Err(ReaderError::FileNotFound(format!(
            "NetCDF file not found: {}",
            path.display()
        )));
    }
    let file = netcdf::open(path)?;

    let mut attrs = Attributes::new();
    for attr in file.attributes() {
        if let Some(value) = attr.value().ok().and_then(convert_attribute) {
            attrs.insert(attr.name().to_string(), value);
        }
    }

    let mut dim_sizes = BTreeMap::new();
    let mut variables = BTreeMap::new();
    let mut coords = BTreeMap::new();

    for var in file.variables() {
        let name = var.name();
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let is_latlon = name == "XLAT" || name == "XLONG";
        if !is_latlon && (is_coordinate_var(&name) || !is_grid_layout(&dims)) {
            continue;
        }

        let mut values: Vec<f32> = var.get_values(..)?;
        if let Some(fill) = var
            .attribute_value("_FillValue")
            .and_then(|v| v.ok())
            .and_then(|v| f64::try_from(v).ok())
        {
            let fill = fill as f32;
            values.iter_mut().filter(|v| **v == fill).for_each(|v| *v = f32::NAN);
        }

        let mut field = Field::from_shape_vec(name.clone(), &dims, &shape, values)?;
        for attr in var.attributes() {
            let key = attr.name();
            if key == "units" || key == "description" {
                if let Some(value) = attr.value().ok().and_then(convert_attribute) {
                    field.attrs.insert(key.to_string(), value);
                }
            }
        }

        if is_latlon {
            coords.insert(name, latlon_coordinate(field)?);
            continue;
        }
        for (dim, len) in dims.iter().zip(&shape).skip(1) {
            dim_sizes.insert(dim.clone(), *len);
        }
        variables.insert(name, field);
    }

    let ntimes = file
        .dimension(TIME_DIM)
        .map(|d| d.len())
        .ok_or_else(|| ReaderError::TimeMetadata {
            path: path.display().to_string(),
            detail: format!("no {} dimension", TIME_DIM),
        })?;
    let times = read_times(&file, path, ntimes)?;

    Ok(FileContents {
        path: path.to_path_buf(),
        times,
        dim_sizes,
        variables,
        coords,
        attrs,
    })
}

/// Horizontal coordinate from the first time step, as [south_north, west_east]
fn latlon_coordinate(field: Field) -> Result<Field, SchemaError> {
    let data = if field.dims.first().map(String::as_str) == Some(TIME_DIM) {
        field.data.index_axis(Axis(0), 0).to_owned()
    } else {
        field.data
    };
    let coord = Field::new(field.name, &[SOUTH_NORTH_DIM, WEST_EAST_DIM], data)?;
    Ok(annotate(coord))
}

/// Valid times of a file: decoded from `XTIME` and its CF `units` when
/// available, otherwise the timestamp in the file name (single-time files)
fn read_times(
    file: &netcdf::File,
    path: &Path,
    ntimes: usize,
) -> Result<Vec<NaiveDateTime>, ReaderError> {
    let time_error = |detail: String| ReaderError::TimeMetadata {
        path: path.display().to_string(),
        detail,
    };

    if let Some(xtime) = file.variable(XTIME_VAR) {
        let units = xtime
            .attribute_value("units")
            .and_then(|v| v.ok())
            .and_then(|v| match v {
                netcdf::AttributeValue::Str(s) => Some(s),
                _ => None,
            });
        if let Some(units) = units {
            let parsed = TimeUnits::parse(&units).map_err(time_error)?;
            let offsets: Vec<f64> = xtime.get_values(..)?;
            if offsets.len() != ntimes {
                return Err(time_error(format!(
                    "{} has {} values for {} time steps",
                    XTIME_VAR,
                    offsets.len(),
                    ntimes
                )));
            }
            return offsets
                .into_iter()
                .map(|v| parsed.decode(v).map_err(time_error))
                .collect();
        }
        debug!(path = %path.display(), "XTIME has no units; using file name");
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match time_from_filename(name) {
        Some(t) if ntimes == 1 => Ok(vec![t]),
        Some(_) => Err(time_error(format!(
            "{} time steps but no {} variable with units",
            ntimes, XTIME_VAR
        ))),
        None => Err(time_error(
            "no time variable and no timestamp in the file name".to_string(),
        )),
    }
}

fn check_dimensions(contents: &[FileContents]) -> Result<(), ReaderError> {
    let Some(first) = contents.first() else {
        return Ok(());
    };
    for file in &contents[1..] {
        for (dim, len) in &file.dim_sizes {
            if let Some(expected) = first.dim_sizes.get(dim) {
                if expected != len {
                    return Err(ReaderError::IncompatibleDimensions {
                        path: file.path.display().to_string(),
                        detail: format!(
                            "{} has size {} but {} has size {}",
                            dim,
                            len,
                            first.path.display(),
                            expected
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Join the per-file fields along the time axis. Variables missing from
/// any file are dropped.
fn concatenate_files(contents: Vec<FileContents>) -> Result<Dataset, ReaderError> {
    let mut iter = contents.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Dataset::default());
    };
    let rest: Vec<FileContents> = iter.collect();

    let mut ds = Dataset::new(first.times.clone());
    ds.attrs = first.attrs;
    ds.coords = first.coords;
    for file in &rest {
        ds.times.extend(file.times.iter().copied());
    }

    for (name, field) in first.variables {
        let mut parts: Vec<ArrayView<f32, IxDyn>> = vec![field.data.view()];
        let mut complete = true;
        for file in &rest {
            match file.variables.get(&name) {
                Some(other) if other.dims == field.dims => parts.push(other.data.view()),
                Some(_) => {
                    return Err(ReaderError::IncompatibleDimensions {
                        path: file.path.display().to_string(),
                        detail: format!("{} has dimensions that differ from the first file", name),
                    })
                }
                None => {
                    warn!(variable = %name, path = %file.path.display(), "variable missing; dropping it");
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        let data: ArrayD<f32> = if parts.len() == 1 {
            field.data.clone()
        } else {
            concatenate(Axis(0), &parts).map_err(|_| SchemaError::ShapeMismatch {
                name: name.clone(),
                expected: field.shape().to_vec(),
                actual: Vec::new(),
            })?
        };
        if data.len_of(Axis(0)) != ds.times.len() {
            return Err(ReaderError::TimeMetadata {
                path: first.path.display().to_string(),
                detail: format!(
                    "{} has {} time steps but {} times were decoded",
                    name,
                    data.len_of(Axis(0)),
                    ds.times.len()
                ),
            });
        }
        ds.insert_variable(Field {
            data,
            ..field
        });
    }
    Ok(ds)
}

/// Reorder every field so the time axis ascends
fn sort_by_time(ds: &mut Dataset) {
    let mut order: Vec<usize> = (0..ds.times.len()).collect();
    order.sort_by_key(|&i| ds.times[i]);
    if order.iter().enumerate().all(|(pos, &i)| pos == i) {
        return;
    }
    debug!("reordering time axis");
    ds.times = order.iter().map(|&i| ds.times[i]).collect();
    for field in ds.variables.values_mut() {
        field.data = field.data.select(Axis(0), &order);
    }
}

/// Map NetCDF attribute values onto the crate's attribute model
fn convert_attribute(value: netcdf::AttributeValue) -> Option<AttributeValue> {
    use netcdf::AttributeValue as Nc;
    let converted = match value {
        Nc::Str(s) => AttributeValue::String(s),
        Nc::Strs(v) => AttributeValue::String(v.join(", ")),
        Nc::Uchar(v) => AttributeValue::Int(v as i64),
        Nc::Schar(v) => AttributeValue::Int(v as i64),
        Nc::Ushort(v) => AttributeValue::Int(v as i64),
        Nc::Short(v) => AttributeValue::Int(v as i64),
        Nc::Uint(v) => AttributeValue::Int(v as i64),
        Nc::Int(v) => AttributeValue::Int(v as i64),
        Nc::Longlong(v) => AttributeValue::Int(v),
        Nc::Ulonglong(v) => AttributeValue::Int(i64::try_from(v).ok()?),
        Nc::Float(v) => AttributeValue::Double(v as f64),
        Nc::Double(v) => AttributeValue::Double(v),
        Nc::Uchars(v) => AttributeValue::IntArray(v.into_iter().map(i64::from).collect()),
        Nc::Schars(v) => AttributeValue::IntArray(v.into_iter().map(i64::from).collect()),
        Nc::Ushorts(v) => AttributeValue::IntArray(v.into_iter().map(i64::from).collect()),
        Nc::Shorts(v) => AttributeValue::IntArray(v.into_iter().map(i64::from).collect()),
        Nc::Uints(v) => AttributeValue::IntArray(v.into_iter().map(i64::from).collect()),
        Nc::Ints(v) => AttributeValue::IntArray(v.into_iter().map(i64::from).collect()),
        Nc::Longlongs(v) => AttributeValue::IntArray(v),
        Nc::Ulonglongs(v) => {
            AttributeValue::IntArray(v.into_iter().filter_map(|x| i64::try_from(x).ok()).collect())
        }
        Nc::Floats(v) => AttributeValue::DoubleArray(v.into_iter().map(f64::from).collect()),
        Nc::Doubles(v) => AttributeValue::DoubleArray(v),
    };
    Some(converted)
}
