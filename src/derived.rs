//! Derived meteorological variables computed on the native model levels.

use crate::config::Constants;
use crate::data_io::utils::annotate;
use crate::data_io::{Dataset, Field, SchemaError};
use crate::math::physics::{relative_humidity, temperature_from_potential, wind_direction, wind_speed};
use crate::math::units::{Pressure, SpecificHumidity, Temperature};
use ndarray::{ArrayD, Zip};
use tracing::{debug, instrument};

fn check_same_shape(reference: &Field, other: &Field) -> Result<(), SchemaError> {
    if reference.shape() != other.shape() {
        return Err(SchemaError::ShapeMismatch {
            name: other.name.clone(),
            expected: reference.shape().to_vec(),
            actual: other.shape().to_vec(),
        });
    }
    Ok(())
}

fn map2(name: &str, a: &Field, b: &Field, f: impl Fn(f64, f64) -> f64) -> Result<Field, SchemaError> {
    check_same_shape(a, b)?;
    let mut out = ArrayD::<f32>::zeros(a.data.raw_dim());
    Zip::from(&mut out)
        .and(&a.data)
        .and(&b.data)
        .for_each(|o, &x, &y| *o = f(x as f64, y as f64) as f32);
    Ok(annotate(Field::new(name, &a.dims, out)?))
}

fn map3(
    name: &str,
    a: &Field,
    b: &Field,
    c: &Field,
    f: impl Fn(f64, f64, f64) -> f64,
) -> Result<Field, SchemaError> {
    check_same_shape(a, b)?;
    check_same_shape(a, c)?;
    let mut out = ArrayD::<f32>::zeros(a.data.raw_dim());
    Zip::from(&mut out)
        .and(&a.data)
        .and(&b.data)
        .and(&c.data)
        .for_each(|o, &x, &y, &z| *o = f(x as f64, y as f64, z as f64) as f32);
    Ok(annotate(Field::new(name, &a.dims, out)?))
}

/// Speed and direction fields for one pair of wind components
fn wind_fields(
    ds: &Dataset,
    u: &str,
    v: &str,
    speed_name: &str,
    direction_name: &str,
) -> Result<[Field; 2], SchemaError> {
    let u = ds.require(u)?;
    let v = ds.require(v)?;
    let speed = map2(speed_name, u, v, |u, v| wind_speed(u, v).meters_per_second())?;
    let mut direction = map2(direction_name, u, v, |u, v| wind_direction(u, v).degrees())?;
    // just below 360 in f64 can round up to 360 in f32
    direction.data.mapv_inplace(|d| if d >= 360.0 { d - 360.0 } else { d });
    Ok([speed, direction])
}

/// Air temperature `Ta` (K) from pressure (Pa) and potential temperature
pub fn air_temperature(ds: &Dataset, constants: &Constants) -> Result<Field, SchemaError> {
    let pressure = ds.require("air_pressure")?;
    let theta = ds.require("air_potential_temperature")?;
    map2("Ta", pressure, theta, |p, th| {
        temperature_from_potential(Temperature::from_kelvin(th), Pressure::from_pascals(p), constants)
            .kelvin()
    })
}

/// Relative humidity (fraction) from pressure (Pa), air temperature (K) and
/// water vapour
pub fn relative_humidity_field(
    pressure: &Field,
    temperature: &Field,
    qvapor: &Field,
    constants: &Constants,
) -> Result<Field, SchemaError> {
    map3("RH", pressure, temperature, qvapor, |p, t, q| {
        relative_humidity(
            Pressure::from_pascals(p),
            Temperature::from_kelvin(t),
            SpecificHumidity::new(q),
            constants,
        )
        .fraction()
    })
}

/// Return a new dataset holding the input variables plus `wind_speed_10`,
/// `wind_direction_10`, `wind_speed`, `wind_direction`, `Ta` and `RH`
#[instrument(skip_all)]
pub fn compute_derived(ds: &Dataset, constants: &Constants) -> Result<Dataset, SchemaError> {
    let [speed_10, direction_10] = wind_fields(ds, "U10", "V10", "wind_speed_10", "wind_direction_10")?;
    let [speed, direction] = wind_fields(ds, "U", "V", "wind_speed", "wind_direction")?;

    let ta = air_temperature(ds, constants)?;
    let rh = relative_humidity_field(ds.require("air_pressure")?, &ta, ds.require("QVAPOR")?, constants)?;

    let fields = [speed_10, direction_10, speed, direction, ta, rh];
    for field in &fields {
        debug!(name = %field.name, dims = ?field.dims, "derived variable");
    }
    Ok(ds.with_variables(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_io::{DIMS_2D, DIMS_3D};

    fn dataset() -> Dataset {
        let mut ds = Dataset::default();
        let shape3 = [1, 2, 1, 1];
        let shape2 = [1, 1, 1];
        let f3 = |name: &str, v: Vec<f32>| Field::from_shape_vec(name, &DIMS_3D, &shape3, v).unwrap();
        let f2 = |name: &str, v: Vec<f32>| Field::from_shape_vec(name, &DIMS_2D, &shape2, v).unwrap();
        ds.insert_variable(f2("U10", vec![3.0]));
        ds.insert_variable(f2("V10", vec![4.0]));
        ds.insert_variable(f3("U", vec![0.0, -2.0]));
        ds.insert_variable(f3("V", vec![0.0, 0.0]));
        ds.insert_variable(f3("air_pressure", vec![100_000.0, 50_000.0]));
        ds.insert_variable(f3("air_potential_temperature", vec![300.0, 300.0]));
        ds.insert_variable(f3("QVAPOR", vec![0.01, 0.0]));
        ds
    }

    #[test]
    fn test_compute_derived_adds_fields() {
        let input = dataset();
        let out = compute_derived(&input, &Constants::default()).unwrap();

        // input is untouched
        assert!(input.variable("Ta").is_none());

        let speed_10 = out.require("wind_speed_10").unwrap();
        assert_eq!(speed_10.data[[0, 0, 0]], 5.0);
        assert_eq!(speed_10.units(), Some("m s-1"));
        let dir_10 = out.require("wind_direction_10").unwrap();
        assert!((dir_10.data[[0, 0, 0]] - 216.8699).abs() < 1e-3);

        let direction = out.require("wind_direction").unwrap();
        assert_eq!(direction.data[[0, 0, 0, 0]], 0.0);
        assert!((direction.data[[0, 1, 0, 0]] - 90.0).abs() < 1e-4);

        let ta = out.require("Ta").unwrap();
        assert!((ta.data[[0, 0, 0, 0]] - 300.0).abs() < 1e-3);
        assert!((ta.data[[0, 1, 0, 0]] - 246.1).abs() < 0.2);

        let rh = out.require("RH").unwrap();
        assert!(rh.data[[0, 0, 0, 0]] > 0.3 && rh.data[[0, 0, 0, 0]] < 0.5);
        assert_eq!(rh.data[[0, 1, 0, 0]], 0.0);
        assert_eq!(rh.dims, DIMS_3D.to_vec());
    }

    #[test]
    fn test_near_northerly_direction_stays_below_360() {
        let mut ds = dataset();
        ds.insert_variable(Field::from_shape_vec("U10", &DIMS_2D, &[1, 1, 1], vec![1e-7]).unwrap());
        ds.insert_variable(Field::from_shape_vec("V10", &DIMS_2D, &[1, 1, 1], vec![-1.0]).unwrap());
        let out = compute_derived(&ds, &Constants::default()).unwrap();

        let d = out.require("wind_direction_10").unwrap().data[[0, 0, 0]];
        assert!((0.0..360.0).contains(&d), "direction {} outside [0, 360)", d);
    }

    #[test]
    fn test_missing_input_reported() {
        let mut ds = dataset();
        ds.variables.remove("QVAPOR");
        assert_eq!(
            compute_derived(&ds, &Constants::default()).unwrap_err(),
            SchemaError::MissingVariable("QVAPOR".to_string())
        );

        let mut ds = dataset();
        ds.variables.remove("V10");
        assert_eq!(
            compute_derived(&ds, &Constants::default()).unwrap_err(),
            SchemaError::MissingVariable("V10".to_string())
        );
    }
}
