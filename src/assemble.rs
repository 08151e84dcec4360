//! Builds the consolidated output dataset: regridded 3-D fields, surface
//! fields, coordinates, projection and provenance attributes.

use crate::config::{ConfigError, InterpVar, PreprocessConfig};
use crate::crs::CrsDescriptor;
use crate::data_io::{Dataset, Field};
use crate::regrid::regridded_dims;
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// Dataset attribute carrying the PROJ.4 string of the domain
pub const PROJECTION_ATTR: &str = "wrf_projection";

/// Settings of the run that produced a store, recorded as
/// `PREPROCESS_*` attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub wrf_run: String,
    pub case_name: String,
    pub file_prefix: String,
    pub levs: String,
    pub interp_var: InterpVar,
    /// Local wall-clock time of processing
    pub timestamp: NaiveDateTime,
}

impl Provenance {
    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            wrf_run: config.wrf_run.display().to_string(),
            case_name: config.case_name.clone(),
            file_prefix: config.file_prefix.clone(),
            levs: config.levs_expr.clone(),
            interp_var: config.interp_var,
            timestamp: Local::now().naive_local(),
        }
    }

    pub fn attributes(&self) -> [(&'static str, String); 6] {
        [
            ("PREPROCESS_WRFRUN", self.wrf_run.clone()),
            ("PREPROCESS_CASE_NAME", self.case_name.clone()),
            ("PREPROCESS_FILE_PREFIX", self.file_prefix.clone()),
            ("PREPROCESS_LEVS", self.levs.clone()),
            ("PREPROCESS_INTERP_VAR", self.interp_var.as_str().to_string()),
            (
                "PREPROCESS_TIMESTAMP",
                self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            ),
        ]
    }
}

/// Merge the regridded 3-D variables with the untouched surface variables
/// of `native`. Anything that is neither is dropped. A name found in both
/// groups is a configuration error.
#[instrument(skip_all)]
pub fn assemble(
    native: &Dataset,
    regridded: &Dataset,
    interp_var: InterpVar,
    crs: &CrsDescriptor,
    provenance: &Provenance,
) -> Result<Dataset, ConfigError> {
    let dims_3d = regridded_dims(interp_var);

    let vars_3d: Vec<&Field> = regridded
        .variables
        .values()
        .filter(|f| f.has_dims(&dims_3d))
        .collect();
    let vars_2d: Vec<&Field> = native.variables.values().filter(|f| f.is_2d()).collect();

    let names_3d: BTreeSet<&str> = vars_3d.iter().map(|f| f.name.as_str()).collect();
    let collisions: Vec<String> = vars_2d
        .iter()
        .filter(|f| names_3d.contains(f.name.as_str()))
        .map(|f| f.name.clone())
        .collect();
    if !collisions.is_empty() {
        return Err(ConfigError::NameCollision(collisions));
    }

    let dropped: Vec<&str> = native
        .variables
        .values()
        .filter(|f| !f.is_2d() && !f.is_3d())
        .map(|f| f.name.as_str())
        .collect();
    if !dropped.is_empty() {
        warn!(?dropped, "variables without a 2-D or 3-D grid layout are not written");
    }

    let mut out = Dataset::new(regridded.times.clone());
    for field in vars_3d.into_iter().chain(vars_2d) {
        out.insert_variable(field.clone());
    }
    out.coords = native.coords.clone();
    for (name, coord) in &regridded.coords {
        out.coords.insert(name.clone(), coord.clone());
    }

    out.attrs = native.attrs.clone();
    out.attrs.insert(PROJECTION_ATTR.to_string(), crs.to_proj4().into());
    for (key, value) in provenance.attributes() {
        out.attrs.insert(key.to_string(), value.into());
    }

    info!(
        variables = out.variables.len(),
        coords = out.coords.len(),
        attrs = out.attrs.len(),
        "Assembled output dataset"
    );
    Ok(out)
}
