//! Vertical regridding from terrain-following model levels onto fixed
//! height or pressure levels.

use crate::config::{InterpVar, LevelSpec};
use crate::data_io::{Dataset, Field, SchemaError, SOUTH_NORTH_DIM, TIME_DIM, VERTICAL_DIM, WEST_EAST_DIM};
use crate::math::interpolate::interp_levels;
use crate::parallel::TaskScheduler;
use ndarray::{Array1, Array4, ArrayD, ArrayView4, Axis, Ix4};
use tracing::{debug, info, instrument};

/// Output layout of regridded fields; the vertical dimension is named after
/// the interpolation variable
pub fn regridded_dims(interp_var: InterpVar) -> [&'static str; 4] {
    [TIME_DIM, interp_var.as_str(), SOUTH_NORTH_DIM, WEST_EAST_DIM]
}

fn as_4d<'a>(field: &'a Field, data: &'a ArrayD<f32>) -> Result<ArrayView4<'a, f32>, SchemaError> {
    data.view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| SchemaError::RankMismatch {
            name: field.name.clone(),
            dims: 4,
            rank: data.ndim(),
        })
}

/// Reference column values in the unit the target levels use
fn reference_values(reference: &Field, interp_var: InterpVar) -> ArrayD<f32> {
    match interp_var {
        InterpVar::AirPressure if reference.units() != Some("hPa") => {
            reference.data.mapv(|pa| pa / 100.0)
        }
        _ => reference.data.clone(),
    }
}

/// Coordinate field holding the target levels
pub fn level_coordinate(levels: &[f32], interp_var: InterpVar) -> Result<Field, SchemaError> {
    let data = Array1::from(levels.to_vec()).into_dyn();
    let positive = match interp_var {
        InterpVar::GeopotentialHeight => "up",
        InterpVar::AirPressure => "down",
    };
    Ok(Field::new(interp_var.as_str(), &[interp_var.as_str()], data)?
        .with_attr("units", interp_var.units())
        .with_attr("positive", positive)
        .with_attr("axis", "Z"))
}

/// Resample every variable on the native vertical axis onto `levels` of
/// `interp_var`; other variables pass through unchanged. The interpolation
/// variable itself becomes the new vertical coordinate.
#[instrument(skip_all, fields(interp_var = %interp_var, levels = %levels))]
pub fn regrid(
    ds: &Dataset,
    levels: &LevelSpec,
    interp_var: InterpVar,
    scheduler: &TaskScheduler,
) -> Result<Dataset, SchemaError> {
    let reference = ds.require(interp_var.as_str())?;
    if !reference.has_dim(VERTICAL_DIM) {
        return Err(SchemaError::MissingDimension {
            name: reference.name.clone(),
            dim: VERTICAL_DIM.to_string(),
        });
    }
    let reference_data = reference_values(reference, interp_var);
    let reference4 = as_4d(reference, &reference_data)?;
    let (nt, _, ny, nx) = reference4.dim();

    let targets: Vec<f32> = levels.values().into_iter().map(|v| v as f32).collect();
    let target_slice: &[f32] = &targets;

    let names: Vec<&str> = ds
        .variables
        .values()
        .filter(|f| f.is_3d() && f.name != interp_var.as_str())
        .map(|f| f.name.as_str())
        .collect();

    let mut views = Vec::with_capacity(names.len());
    for &name in &names {
        let field = ds.require(name)?;
        if field.shape() != reference.shape() {
            return Err(SchemaError::ShapeMismatch {
                name: name.to_string(),
                expected: reference.shape().to_vec(),
                actual: field.shape().to_vec(),
            });
        }
        views.push(as_4d(field, &field.data)?);
    }

    let mut tasks = Vec::with_capacity(names.len() * nt);
    for values in &views {
        for t in 0..nt {
            let column_ref = reference4.index_axis(Axis(0), t);
            let column_values = values.index_axis(Axis(0), t);
            tasks.push(move || {
                Ok::<_, SchemaError>(interp_levels(column_ref, column_values, target_slice))
            });
        }
    }

    info!(
        variables = names.len(),
        levels = targets.len(),
        tasks = tasks.len(),
        threads = scheduler.num_threads(),
        "Regridding 3-D variables"
    );
    let results = scheduler.run(tasks)?;

    let dims = regridded_dims(interp_var);
    let mut out = Dataset {
        times: ds.times.clone(),
        variables: ds
            .variables
            .values()
            .filter(|f| !f.has_dim(VERTICAL_DIM))
            .map(|f| (f.name.clone(), f.clone()))
            .collect(),
        coords: ds.coords.clone(),
        attrs: ds.attrs.clone(),
    };

    for (v, &name) in names.iter().enumerate() {
        let mut data = Array4::<f32>::from_elem((nt, targets.len(), ny, nx), f32::NAN);
        for t in 0..nt {
            data.index_axis_mut(Axis(0), t)
                .assign(&results[v * nt + t]);
        }
        let source = ds.require(name)?;
        let mut field = Field::new(name, &dims, data.into_dyn())?;
        field.attrs = source.attrs.clone();
        debug!(name, "regridded");
        out.insert_variable(field);
    }
    out.insert_coord(level_coordinate(&targets, interp_var)?);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_io::{DIMS_2D, DIMS_3D};

    fn dataset(heights: &[f32]) -> Dataset {
        let nz = heights.len();
        let mut ds = Dataset::default();
        ds.times = vec![chrono::NaiveDateTime::default(); 2];
        let z: Vec<f32> = heights.iter().chain(heights).copied().collect();
        let temp: Vec<f32> = z.iter().map(|h| 300.0 - h / 100.0).collect();
        ds.insert_variable(Field::from_shape_vec("geopotential_height", &DIMS_3D, &[2, nz, 1, 1], z).unwrap());
        ds.insert_variable(
            Field::from_shape_vec("Ta", &DIMS_3D, &[2, nz, 1, 1], temp)
                .unwrap()
                .with_attr("units", "K"),
        );
        ds.insert_variable(Field::from_shape_vec("T2", &DIMS_2D, &[2, 1, 1], vec![290.0, 291.0]).unwrap());
        ds
    }

    #[test]
    fn test_regrid_heights() {
        let ds = dataset(&[50.0, 500.0, 1000.0, 1800.0]);
        let levels = LevelSpec::new(0.0, 2000.0, 100.0).unwrap();
        let out = regrid(&ds, &levels, InterpVar::GeopotentialHeight, &TaskScheduler::synchronous()).unwrap();

        let ta = out.require("Ta").unwrap();
        assert_eq!(ta.dims, vec!["Time", "geopotential_height", "south_north", "west_east"]);
        assert_eq!(ta.shape(), &[2, 20, 1, 1]);
        assert_eq!(ta.units(), Some("K"));
        assert!(ta.data[[0, 0, 0, 0]].is_nan());
        assert!(ta.data[[1, 19, 0, 0]].is_nan());
        assert!((ta.data[[0, 10, 0, 0]] - 290.0).abs() < 1e-4);
        assert!((ta.data[[1, 18, 0, 0]] - 282.0).abs() < 1e-4);

        // 2-D passes through, the reference becomes the coordinate
        assert_eq!(out.require("T2").unwrap(), ds.require("T2").unwrap());
        assert!(out.variable("geopotential_height").is_none());
        let coord = &out.coords["geopotential_height"];
        assert_eq!(coord.data.len(), 20);
        assert_eq!(coord.units(), Some("m"));
    }

    #[test]
    fn test_pooled_matches_synchronous() {
        let ds = dataset(&[0.0, 300.0, 900.0]);
        let levels = LevelSpec::new(0.0, 1000.0, 50.0).unwrap();
        let sync = regrid(&ds, &levels, InterpVar::GeopotentialHeight, &TaskScheduler::synchronous()).unwrap();
        let pooled = regrid(&ds, &levels, InterpVar::GeopotentialHeight, &TaskScheduler::new(3).unwrap()).unwrap();
        let a = &sync.require("Ta").unwrap().data;
        let b = &pooled.require("Ta").unwrap().data;
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x == y || (x.is_nan() && y.is_nan())));
    }

    #[test]
    fn test_pressure_levels_in_hpa() {
        let mut ds = Dataset::default();
        ds.times = vec![chrono::NaiveDateTime::default()];
        ds.insert_variable(
            Field::from_shape_vec("air_pressure", &DIMS_3D, &[1, 3, 1, 1], vec![100_000.0, 85_000.0, 70_000.0])
                .unwrap()
                .with_attr("units", "Pa"),
        );
        ds.insert_variable(Field::from_shape_vec("Ta", &DIMS_3D, &[1, 3, 1, 1], vec![290.0, 280.0, 270.0]).unwrap());
        let levels = LevelSpec::new(1000.0, 600.0, -100.0).unwrap();
        let out = regrid(&ds, &levels, InterpVar::AirPressure, &TaskScheduler::synchronous()).unwrap();
        let ta = out.require("Ta").unwrap();
        assert_eq!(ta.dims[1], "air_pressure");
        assert_eq!(ta.data[[0, 0, 0, 0]], 290.0);
        assert!((ta.data[[0, 1, 0, 0]] - 283.3333).abs() < 1e-3);
        assert_eq!(ta.data[[0, 3, 0, 0]], 270.0);
        assert_eq!(out.coords["air_pressure"].units(), Some("hPa"));
    }

    #[test]
    fn test_shape_mismatch_and_missing_reference() {
        let mut ds = dataset(&[0.0, 100.0]);
        ds.insert_variable(Field::from_shape_vec("W", &DIMS_3D, &[2, 3, 1, 1], vec![0.0; 6]).unwrap());
        let levels = LevelSpec::new(0.0, 100.0, 10.0).unwrap();
        assert!(matches!(
            regrid(&ds, &levels, InterpVar::GeopotentialHeight, &TaskScheduler::synchronous()),
            Err(SchemaError::ShapeMismatch { .. })
        ));
        assert_eq!(
            regrid(&ds, &levels, InterpVar::AirPressure, &TaskScheduler::synchronous()).unwrap_err(),
            SchemaError::MissingVariable("air_pressure".to_string())
        );
    }
}
