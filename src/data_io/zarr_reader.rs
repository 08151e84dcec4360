//! Read access to stores written by [`super::ZarrStoreWriter`].

use super::zarr_writer::ARRAY_DIMENSIONS_ATTR;
use super::{AttributeValue, Attributes, Dataset, Field, SchemaError, TIME_DIM};
use crate::time_utils::TimeUnits;
use chrono::NaiveDateTime;
use ndarray::{ArrayD, IxDyn};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zarr error reading {name}: {message}")]
    Zarr { name: String, message: String },

    #[error("Array {0} has no _ARRAY_DIMENSIONS attribute")]
    MissingDimensions(String),

    #[error("Invalid time coordinate: {0}")]
    Time(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl StoreError {
    fn zarr(name: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Zarr {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

fn attrs_from_json(map: &Map<String, Value>) -> Attributes {
    map.iter()
        .filter(|(k, _)| k.as_str() != ARRAY_DIMENSIONS_ATTR)
        .filter_map(|(k, v)| AttributeValue::from_json(v).map(|v| (k.clone(), v)))
        .collect()
}

fn is_array_dir(dir: &Path) -> bool {
    dir.join("zarr.json").is_file() || dir.join(".zarray").is_file()
}

/// Lazily reads arrays from a Zarr directory store
pub struct ZarrStoreReader {
    path: PathBuf,
    store: Arc<FilesystemStore>,
    attrs: Attributes,
    arrays: Vec<String>,
    coords: BTreeSet<String>,
}

impl ZarrStoreReader {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(StoreError::NotFound(path));
        }
        let store = Arc::new(FilesystemStore::new(&path).map_err(|e| StoreError::zarr("/", e))?);

        let group = Group::open(store.clone(), "/").map_err(|e| StoreError::zarr("/", e))?;
        let attrs = attrs_from_json(group.attributes());

        let entries = fs::read_dir(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let mut arrays: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| is_array_dir(&e.path()))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        arrays.sort();

        let mut reader = Self {
            path,
            store,
            attrs,
            arrays,
            coords: BTreeSet::new(),
        };
        reader.coords = reader.find_coordinates()?;
        debug!(arrays = reader.arrays.len(), coords = reader.coords.len(), "opened store");
        Ok(reader)
    }

    /// Arrays named by a `coordinates` attribute, or 1-D arrays indexing
    /// their own dimension
    fn find_coordinates(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut coords = BTreeSet::new();
        for name in &self.arrays {
            if name == TIME_DIM {
                continue;
            }
            let array = self.open_array(name)?;
            let attrs = array.attributes();
            if let Some(listed) = attrs.get("coordinates").and_then(Value::as_str) {
                coords.extend(listed.split_whitespace().map(str::to_string));
            }
            if self.dims_of(name, attrs)? == [name.clone()] {
                coords.insert(name.clone());
            }
        }
        coords.retain(|c| self.arrays.contains(c));
        Ok(coords)
    }

    fn open_array(&self, name: &str) -> Result<Array<FilesystemStore>, StoreError> {
        Array::open(self.store.clone(), &format!("/{}", name)).map_err(|e| StoreError::zarr(name, e))
    }

    fn dims_of(&self, name: &str, attrs: &Map<String, Value>) -> Result<Vec<String>, StoreError> {
        attrs
            .get(ARRAY_DIMENSIONS_ATTR)
            .and_then(Value::as_array)
            .map(|dims| dims.iter().filter_map(|d| d.as_str().map(str::to_string)).collect())
            .ok_or_else(|| StoreError::MissingDimensions(name.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root group attributes
    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttributeValue::as_str)
    }

    /// Data variables, excluding coordinates and time
    pub fn variable_names(&self) -> Vec<String> {
        self.arrays
            .iter()
            .filter(|n| n.as_str() != TIME_DIM && !self.coords.contains(*n))
            .cloned()
            .collect()
    }

    pub fn coordinate_names(&self) -> Vec<String> {
        self.coords.iter().cloned().collect()
    }

    pub fn has_array(&self, name: &str) -> bool {
        self.arrays.iter().any(|n| n == name)
    }

    /// Dimension names of one array without reading its data
    pub fn dimensions(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let array = self.open_array(name)?;
        self.dims_of(name, array.attributes())
    }

    /// Read one array as a labeled field
    pub fn read_field(&self, name: &str) -> Result<Field, StoreError> {
        if !self.has_array(name) {
            return Err(SchemaError::MissingVariable(name.to_string()).into());
        }
        let array = self.open_array(name)?;
        let dims = self.dims_of(name, array.attributes())?;
        let shape: Vec<usize> = array.shape().iter().map(|&n| n as usize).collect();

        let values: Vec<f32> = if shape.iter().product::<usize>() == 0 {
            Vec::new()
        } else {
            let subset = ArraySubset::new_with_shape(array.shape().to_vec());
            array
                .retrieve_array_subset_elements(&subset)
                .map_err(|e| StoreError::zarr(name, e))?
        };
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| StoreError::zarr(name, e))?;
        let mut field = Field::new(name, &dims, data)?;
        field.attrs = attrs_from_json(array.attributes());
        Ok(field)
    }

    /// Decode the time coordinate
    pub fn times(&self) -> Result<Vec<NaiveDateTime>, StoreError> {
        if !self.has_array(TIME_DIM) {
            return Ok(Vec::new());
        }
        let array = self.open_array(TIME_DIM)?;
        let units = array
            .attributes()
            .get("units")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Time("missing units".to_string()))?;
        let units = TimeUnits::parse(units).map_err(StoreError::Time)?;

        let n = array.shape().first().copied().unwrap_or(0);
        if n == 0 {
            return Ok(Vec::new());
        }
        let subset = ArraySubset::new_with_shape(vec![n]);
        let values: Vec<i64> = array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| StoreError::zarr(TIME_DIM, e))?;
        values
            .into_iter()
            .map(|v| units.decode(v as f64).map_err(StoreError::Time))
            .collect()
    }

    /// Load the whole store into memory
    pub fn read_all(&self) -> Result<Dataset, StoreError> {
        let mut ds = Dataset::new(self.times()?);
        ds.attrs = self.attrs.clone();
        for name in &self.coords {
            ds.insert_coord(self.read_field(name)?);
        }
        for name in self.variable_names() {
            ds.insert_variable(self.read_field(&name)?);
        }
        Ok(ds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let err = ZarrStoreReader::open(dir.path().join("nope.zarr")).err().unwrap();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
