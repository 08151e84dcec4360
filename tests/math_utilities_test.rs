use ndarray::Array3;
use wrf_levels::config::Constants;
use wrf_levels::math::*;

#[test]
fn test_lin_interp() {
    assert_eq!(lin_interp(1.0, 3.0, 0.5), 2.0);
    assert_eq!(lin_interp(0.0, 10.0, 0.25), 2.5);
    assert_eq!(lin_interp(5.0, 15.0, 0.0), 5.0);
    assert_eq!(lin_interp(5.0, 15.0, 1.0), 15.0);
}

#[test]
fn test_linear_interpolation() {
    let result = linear_interpolate(0.0, 0.0, 1.0, 10.0, 0.5);
    assert_eq!(result, 5.0);

    let result = linear_interpolate(2.0, 20.0, 4.0, 40.0, 3.0);
    assert_eq!(result, 30.0);
}

#[test]
fn test_interp_levels_pressure_column() {
    // decreasing reference, as pressure is
    let reference = Array3::from_shape_vec((3, 1, 1), vec![1000.0f32, 850.0, 700.0]).unwrap();
    let values = Array3::from_shape_vec((3, 1, 1), vec![20.0f32, 10.0, 0.0]).unwrap();
    let out = interp_levels(reference.view(), values.view(), &[1050.0, 1000.0, 925.0, 700.0, 500.0]);

    assert!(out[[0, 0, 0]].is_nan());
    assert_eq!(out[[1, 0, 0]], 20.0);
    assert_eq!(out[[2, 0, 0]], 15.0);
    assert_eq!(out[[3, 0, 0]], 0.0);
    assert!(out[[4, 0, 0]].is_nan());
}

#[test]
fn test_wind_speed_and_direction() {
    assert_eq!(wind_speed(3.0, 4.0).meters_per_second(), 5.0);

    // westerly, southerly, easterly, northerly
    assert!((wind_direction(1.0, 0.0).degrees() - 270.0).abs() < 1e-9);
    assert!((wind_direction(0.0, 1.0).degrees() - 180.0).abs() < 1e-9);
    assert!((wind_direction(-1.0, 0.0).degrees() - 90.0).abs() < 1e-9);
    assert!(wind_direction(0.0, -1.0).degrees().abs() < 1e-9);
    assert_eq!(wind_direction(0.0, 0.0), Direction::NORTH);

    for (u, v) in [(0.3, -7.0), (-2.0, -2.0), (1e-7, 5.0), (-4.0, 1e-9)] {
        let d = wind_direction(u, v).degrees();
        assert!((0.0..360.0).contains(&d), "{} out of range for ({}, {})", d, u, v);
    }
}

#[test]
fn test_grid_to_earth_rotation_preserves_speed() {
    let angle = 0.3f64;
    let (ue, ve) = grid_to_earth_wind(3.0, 4.0, angle.sin(), angle.cos());
    assert!((ue.hypot(ve) - 5.0).abs() < 1e-12);
    assert_eq!(grid_to_earth_wind(3.0, 4.0, 0.0, 1.0), (3.0, 4.0));
}

#[test]
fn test_thermodynamics() {
    let constants = Constants::default();
    let theta = Temperature::from_kelvin(300.0);

    let t = temperature_from_potential(theta, Pressure::REFERENCE, &constants);
    assert!((t.kelvin() - 300.0).abs() < 1e-9);

    let t = temperature_from_potential(theta, Pressure::from_hectopascals(850.0), &constants);
    let back = potential_temperature(t, Pressure::from_hectopascals(850.0), &constants);
    assert!((back.kelvin() - 300.0).abs() < 1e-9);
    assert!(t.kelvin() < 300.0);

    let es = saturation_vapor_pressure(Temperature::from_celsius(0.0));
    assert!((es.hectopascals() - 6.112).abs() < 1e-9);

    let rh = relative_humidity(
        Pressure::from_hectopascals(1000.0),
        Temperature::from_celsius(20.0),
        SpecificHumidity::new(0.0),
        &constants,
    );
    assert_eq!(rh.fraction(), 0.0);
}
