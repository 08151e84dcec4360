pub mod postprocess;
pub mod reader;
pub mod utils;
pub mod zarr_reader;
pub mod zarr_writer;

pub use reader::*;
pub use zarr_reader::{StoreError, ZarrStoreReader};
pub use zarr_writer::{WriteError, ZarrStoreWriter};

use chrono::NaiveDateTime;
use ndarray::{ArrayD, IxDyn};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Name of the record (time) dimension in WRF output
pub const TIME_DIM: &str = "Time";
/// Native terrain-following vertical dimension (mass levels)
pub const VERTICAL_DIM: &str = "bottom_top";
pub const SOUTH_NORTH_DIM: &str = "south_north";
pub const WEST_EAST_DIM: &str = "west_east";
/// Suffix WRF appends to edge-centred dimensions
pub const STAG_SUFFIX: &str = "_stag";

/// Dimension layout of surface fields: [Time, south_north, west_east]
pub const DIMS_2D: [&str; 3] = [TIME_DIM, SOUTH_NORTH_DIM, WEST_EAST_DIM];
/// Dimension layout of native 3-D fields: [Time, bottom_top, south_north, west_east]
pub const DIMS_3D: [&str; 4] = [TIME_DIM, VERTICAL_DIM, SOUTH_NORTH_DIM, WEST_EAST_DIM];

/// Errors raised when a dataset does not have the layout an operation expects
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Variable {name} has no dimension {dim}")]
    MissingDimension { name: String, dim: String },

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Variable {name} declares {dims} dimensions but its data has rank {rank}")]
    RankMismatch { name: String, dims: usize, rank: usize },
}

/// Supported attribute value types
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Double(f64),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Double(v) => Some(*v),
            AttributeValue::IntArray(v) if v.len() == 1 => Some(v[0] as f64),
            AttributeValue::DoubleArray(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    /// JSON form used in Zarr attribute documents
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::String(s) => Value::from(s.as_str()),
            AttributeValue::Int(v) => Value::from(*v),
            // NaN/inf have no JSON form; Zarr readers expect the string spelling
            AttributeValue::Double(v) => float_to_json(*v),
            AttributeValue::IntArray(v) => Value::from(v.clone()),
            AttributeValue::DoubleArray(v) => Value::Array(v.iter().map(|x| float_to_json(*x)).collect()),
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => match s.as_str() {
                "NaN" => Some(AttributeValue::Double(f64::NAN)),
                "Infinity" => Some(AttributeValue::Double(f64::INFINITY)),
                "-Infinity" => Some(AttributeValue::Double(f64::NEG_INFINITY)),
                _ => Some(AttributeValue::String(s.clone())),
            },
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(AttributeValue::Int(i)),
                None => n.as_f64().map(AttributeValue::Double),
            },
            Value::Bool(b) => Some(AttributeValue::Int(*b as i64)),
            Value::Array(items) => {
                if items.iter().all(|v| v.is_i64()) {
                    Some(AttributeValue::IntArray(
                        items.iter().filter_map(Value::as_i64).collect(),
                    ))
                } else if items.iter().all(Value::is_number) {
                    Some(AttributeValue::DoubleArray(
                        items.iter().filter_map(Value::as_f64).collect(),
                    ))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

fn float_to_json(v: f64) -> Value {
    if v.is_nan() {
        Value::from("NaN")
    } else if v.is_infinite() {
        Value::from(if v > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        Value::from(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Double(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

/// Global and variable attributes
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A labeled multi-dimensional array
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    /// Dimension names, outermost first
    pub dims: Vec<String>,
    /// Values; missing values are NaN
    pub data: ArrayD<f32>,
    pub attrs: Attributes,
}

impl Field {
    pub fn new<S: AsRef<str>>(
        name: impl Into<String>,
        dims: &[S],
        data: ArrayD<f32>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if dims.len() != data.ndim() {
            return Err(SchemaError::RankMismatch {
                name,
                dims: dims.len(),
                rank: data.ndim(),
            });
        }
        Ok(Self {
            name,
            dims: dims.iter().map(|d| d.as_ref().to_string()).collect(),
            data,
            attrs: Attributes::new(),
        })
    }

    /// Build a field from a flat row-major buffer
    pub fn from_shape_vec<S: AsRef<str>>(
        name: impl Into<String>,
        dims: &[S],
        shape: &[usize],
        values: Vec<f32>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        let actual = values.len();
        let data = ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| {
            SchemaError::ShapeMismatch {
                name: name.clone(),
                expected: vec![expected],
                actual: vec![actual],
            }
        })?;
        Self::new(name, dims, data)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn units(&self) -> Option<&str> {
        self.attrs.get("units").and_then(AttributeValue::as_str)
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Axis index of a named dimension
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.axis_of(dim).is_some()
    }

    pub fn has_dims(&self, layout: &[&str]) -> bool {
        self.dims.len() == layout.len() && self.dims.iter().zip(layout).all(|(a, b)| a == b)
    }

    /// Surface field on the mass grid
    pub fn is_2d(&self) -> bool {
        self.has_dims(&DIMS_2D)
    }

    /// Field on the native vertical coordinate
    pub fn is_3d(&self) -> bool {
        self.has_dims(&DIMS_3D)
    }
}

/// In-memory collection of fields sharing a time axis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Valid times, ascending
    pub times: Vec<NaiveDateTime>,
    pub variables: BTreeMap<String, Field>,
    /// Coordinate fields (XLAT, XLONG, target vertical levels)
    pub coords: BTreeMap<String, Field>,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new(times: Vec<NaiveDateTime>) -> Self {
        Self {
            times,
            ..Default::default()
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Field> {
        self.variables.get(name)
    }

    /// Look up a variable that an operation cannot proceed without
    pub fn require(&self, name: &str) -> Result<&Field, SchemaError> {
        self.variables
            .get(name)
            .ok_or_else(|| SchemaError::MissingVariable(name.to_string()))
    }

    pub fn insert_variable(&mut self, field: Field) {
        self.variables.insert(field.name.clone(), field);
    }

    pub fn insert_coord(&mut self, field: Field) {
        self.coords.insert(field.name.clone(), field);
    }

    /// New dataset with `fields` added on top of this one
    pub fn with_variables(&self, fields: impl IntoIterator<Item = Field>) -> Self {
        let mut out = self.clone();
        for field in fields {
            out.insert_variable(field);
        }
        out
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttributeValue::as_str)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attrs.get(key).and_then(AttributeValue::as_f64)
    }

    pub fn num_times(&self) -> usize {
        self.times.len()
    }
}
