//! Zarr store output. Every variable and coordinate becomes one array in a
//! directory store; dataset attributes land on the root group.

use super::{Attributes, Dataset, Field, TIME_DIM};
use crate::time_utils::to_epoch_seconds;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use zarrs::array::{ArrayBuilder, ChunkGrid, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

/// Attribute xarray uses to name the dimensions of a Zarr array
pub const ARRAY_DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";
pub const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00";

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zarr error writing {name}: {message}")]
    Zarr { name: String, message: String },

    #[error("Inconsistent dataset: {0}")]
    InvalidData(String),
}

impl WriteError {
    fn zarr(name: &str, err: impl std::fmt::Display) -> Self {
        WriteError::Zarr {
            name: name.to_string(),
            message: err.to_string(),
        }
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn attrs_to_json(attrs: &Attributes) -> Map<String, Value> {
    attrs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// Writes a [`Dataset`] as a Zarr store, replacing whatever is at the
/// destination only once the new store is complete
pub struct ZarrStoreWriter {
    path: PathBuf,
}

impl ZarrStoreWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn write(&self, ds: &Dataset) -> Result<(), WriteError> {
        self.validate(ds)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(WriteError::io(parent))?;
        }

        let staging = self.staging_path();
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(WriteError::io(&staging))?;
        }

        if let Err(err) = self.write_store(&staging, ds) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "could not remove partial store");
            }
            return Err(err);
        }

        if self.path.exists() {
            debug!("replacing existing store");
            fs::remove_dir_all(&self.path).map_err(WriteError::io(&self.path))?;
        }
        fs::rename(&staging, &self.path).map_err(WriteError::io(&self.path))?;

        info!(
            variables = ds.variables.len(),
            coords = ds.coords.len(),
            times = ds.num_times(),
            "Wrote Zarr store"
        );
        Ok(())
    }

    fn validate(&self, ds: &Dataset) -> Result<(), WriteError> {
        for field in ds.variables.values().chain(ds.coords.values()) {
            if field.name == TIME_DIM {
                return Err(WriteError::InvalidData(format!(
                    "{} is reserved for the time coordinate",
                    TIME_DIM
                )));
            }
            if let Some(axis) = field.axis_of(TIME_DIM) {
                if field.shape()[axis] != ds.num_times() {
                    return Err(WriteError::InvalidData(format!(
                        "{} has {} time steps, dataset has {}",
                        field.name,
                        field.shape()[axis],
                        ds.num_times()
                    )));
                }
            }
        }
        Ok(())
    }

    fn write_store(&self, root: &Path, ds: &Dataset) -> Result<(), WriteError> {
        fs::create_dir_all(root).map_err(WriteError::io(root))?;
        let store = Arc::new(FilesystemStore::new(root).map_err(|e| WriteError::zarr("/", e))?);

        let group = GroupBuilder::new()
            .attributes(attrs_to_json(&ds.attrs))
            .build(store.clone(), "/")
            .map_err(|e| WriteError::zarr("/", e))?;
        group.store_metadata().map_err(|e| WriteError::zarr("/", e))?;

        self.write_time(&store, ds)?;
        for coord in ds.coords.values() {
            self.write_field(&store, coord, None)?;
        }
        for field in ds.variables.values() {
            let coordinates: Vec<&str> = ds
                .coords
                .values()
                .filter(|c| c.dims.iter().all(|d| field.has_dim(d)))
                .map(|c| c.name.as_str())
                .collect();
            self.write_field(&store, field, Some(&coordinates))?;
        }
        Ok(())
    }

    fn write_time(&self, store: &Arc<FilesystemStore>, ds: &Dataset) -> Result<(), WriteError> {
        let values: Vec<i64> = ds.times.iter().map(to_epoch_seconds).collect();
        let mut attrs = Map::new();
        attrs.insert(ARRAY_DIMENSIONS_ATTR.to_string(), Value::from(vec![TIME_DIM]));
        attrs.insert("units".to_string(), Value::from(TIME_UNITS));
        attrs.insert("calendar".to_string(), Value::from("proleptic_gregorian"));
        attrs.insert("standard_name".to_string(), Value::from("time"));

        let shape = vec![values.len() as u64];
        let chunk_grid: ChunkGrid = vec![1u64]
            .try_into()
            .map_err(|e| WriteError::zarr(TIME_DIM, format!("{:?}", e)))?;
        let array = ArrayBuilder::new(shape.clone(), DataType::Int64, chunk_grid, FillValue::from(0i64))
            .attributes(attrs)
            .build(store.clone(), &format!("/{}", TIME_DIM))
            .map_err(|e| WriteError::zarr(TIME_DIM, e))?;
        array.store_metadata().map_err(|e| WriteError::zarr(TIME_DIM, e))?;

        if !values.is_empty() {
            let subset = ArraySubset::new_with_start_shape(vec![0], shape)
                .map_err(|e| WriteError::zarr(TIME_DIM, e))?;
            array
                .store_array_subset_elements(&subset, &values)
                .map_err(|e| WriteError::zarr(TIME_DIM, e))?;
        }
        Ok(())
    }

    /// One array per field, chunked by single time steps when the field
    /// has a time axis, uncompressed
    fn write_field(
        &self,
        store: &Arc<FilesystemStore>,
        field: &Field,
        coordinates: Option<&[&str]>,
    ) -> Result<(), WriteError> {
        let name = field.name.as_str();
        let shape: Vec<u64> = field.shape().iter().map(|&n| n as u64).collect();
        let time_axis = field.axis_of(TIME_DIM);
        let chunk: Vec<u64> = shape
            .iter()
            .enumerate()
            .map(|(axis, &n)| if Some(axis) == time_axis { 1 } else { n.max(1) })
            .collect();

        let mut attrs = attrs_to_json(&field.attrs);
        attrs.insert(
            ARRAY_DIMENSIONS_ATTR.to_string(),
            Value::from(field.dims.clone()),
        );
        if let Some(coordinates) = coordinates.filter(|c| !c.is_empty()) {
            attrs.insert("coordinates".to_string(), Value::from(coordinates.join(" ")));
        }

        let chunk_grid: ChunkGrid = chunk
            .try_into()
            .map_err(|e| WriteError::zarr(name, format!("{:?}", e)))?;
        let array = ArrayBuilder::new(shape.clone(), DataType::Float32, chunk_grid, FillValue::from(f32::NAN))
            .attributes(attrs)
            .build(store.clone(), &format!("/{}", name))
            .map_err(|e| WriteError::zarr(name, e))?;
        array.store_metadata().map_err(|e| WriteError::zarr(name, e))?;

        if field.data.is_empty() {
            return Ok(());
        }
        let values: Vec<f32> = field.data.iter().copied().collect();
        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)
            .map_err(|e| WriteError::zarr(name, e))?;
        array
            .store_array_subset_elements(&subset, &values)
            .map_err(|e| WriteError::zarr(name, e))?;
        debug!(name, dims = ?field.dims, "stored array");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_io::{DIMS_2D, ZarrStoreReader};
    use crate::time_utils::parse_time_string;

    fn dataset() -> Dataset {
        let times = vec![
            parse_time_string("2024-01-01 00:00:00").unwrap(),
            parse_time_string("2024-01-01 01:00:00").unwrap(),
        ];
        let mut ds = Dataset::new(times);
        ds.attrs.insert("PREPROCESS_CASE_NAME".into(), "case".into());
        ds.insert_variable(
            Field::from_shape_vec("T2", &DIMS_2D, &[2, 1, 2], vec![1.0, f32::NAN, 3.0, 4.0])
                .unwrap()
                .with_attr("units", "K"),
        );
        ds.insert_coord(Field::from_shape_vec("XLAT", &["south_north", "west_east"], &[1, 2], vec![45.0, 45.0]).unwrap());
        ds
    }

    #[test]
    fn test_write_replaces_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case").join("wrfout_d01_hlevs.zarr");
        fs::create_dir_all(path.join("stale")).unwrap();

        let writer = ZarrStoreWriter::new(&path);
        writer.write(&dataset()).unwrap();

        assert!(!path.join("stale").exists());
        assert!(!writer.staging_path().exists());

        let back = ZarrStoreReader::open(&path).unwrap().read_all().unwrap();
        assert_eq!(back.times, dataset().times);
        assert_eq!(back.attr_str("PREPROCESS_CASE_NAME"), Some("case"));
        let t2 = back.require("T2").unwrap();
        assert_eq!(t2.units(), Some("K"));
        assert_eq!(t2.data[[1, 0, 1]], 4.0);
        assert!(t2.data[[0, 0, 1]].is_nan());
        assert!(back.coords.contains_key("XLAT"));
    }

    #[test]
    fn test_inconsistent_time_axis_leaves_destination_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.zarr");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("marker"), "old").unwrap();

        let mut ds = dataset();
        ds.times.pop();
        let err = ZarrStoreWriter::new(&path).write(&ds).unwrap_err();
        assert!(matches!(err, WriteError::InvalidData(_)));
        assert!(path.join("marker").exists());
    }
}
