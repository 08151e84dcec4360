use super::units::{
    Direction, Pressure, RelativeHumidity, SpecificHumidity, Speed, Temperature,
};
use crate::config::Constants;

/// Saturation vapour pressure coefficients (Bolton 1980)
const BOLTON_E0_HPA: f64 = 6.112;
const BOLTON_A: f64 = 17.67;
const BOLTON_B_K: f64 = 29.65;

/// Convert wind components from grid-relative to earth-relative using the
/// sine and cosine of the local map rotation
pub fn grid_to_earth_wind(u_grid: f64, v_grid: f64, sin_rot: f64, cos_rot: f64) -> (f64, f64) {
    let u_earth = u_grid * cos_rot - v_grid * sin_rot;
    let v_earth = u_grid * sin_rot + v_grid * cos_rot;

    (u_earth, v_earth)
}

/// Horizontal wind speed |(u, v)|
pub fn wind_speed(u: f64, v: f64) -> Speed {
    Speed::new(u.hypot(v))
}

/// Meteorological wind direction: the bearing the wind blows FROM, in
/// degrees clockwise from north. Calm wind returns 0.
pub fn wind_direction(u: f64, v: f64) -> Direction {
    if u == 0.0 && v == 0.0 {
        return Direction::NORTH;
    }
    Direction::from_degrees(90.0 - (-v).atan2(-u).to_degrees())
}

/// Air temperature from potential temperature: T = theta (p / p0)^(Rd/cp)
pub fn temperature_from_potential(
    theta: Temperature,
    pressure: Pressure,
    constants: &Constants,
) -> Temperature {
    let kappa = constants.r_dry / constants.cp;
    let ratio = pressure.pascals() / Pressure::REFERENCE.pascals();
    Temperature::from_kelvin(theta.kelvin() * ratio.powf(kappa))
}

/// Potential temperature from air temperature
pub fn potential_temperature(
    temperature: Temperature,
    pressure: Pressure,
    constants: &Constants,
) -> Temperature {
    let kappa = constants.r_dry / constants.cp;
    let ratio = Pressure::REFERENCE.pascals() / pressure.pascals();
    Temperature::from_kelvin(temperature.kelvin() * ratio.powf(kappa))
}

/// Saturation vapour pressure over water (Bolton)
pub fn saturation_vapor_pressure(temperature: Temperature) -> Pressure {
    let t = temperature.kelvin();
    let es = BOLTON_E0_HPA * (BOLTON_A * (t - 273.15) / (t - BOLTON_B_K)).exp();
    Pressure::from_hectopascals(es)
}

/// Partial pressure of water vapour for a given specific humidity
pub fn vapor_pressure(pressure: Pressure, q: SpecificHumidity, constants: &Constants) -> Pressure {
    let w = q.mixing_ratio().kg_per_kg();
    Pressure::from_pascals(pressure.pascals() * w / (constants.epsilon + w))
}

/// Relative humidity (fraction) from pressure, air temperature and
/// specific humidity
pub fn relative_humidity(
    pressure: Pressure,
    temperature: Temperature,
    q: SpecificHumidity,
    constants: &Constants,
) -> RelativeHumidity {
    let e = vapor_pressure(pressure, q, constants);
    let es = saturation_vapor_pressure(temperature);
    RelativeHumidity::from_fraction(e.pascals() / es.pascals())
}
