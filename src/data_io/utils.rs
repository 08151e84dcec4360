/// Variable metadata helpers for WRF output and the derived fields
use super::{Field, STAG_SUFFIX};

/// Variables the loader always treats as coordinates
pub const COORDINATE_VARS: &[&str] = &["XLAT", "XLONG", "XTIME", "Times"];

/// Staggered coordinate variables that duplicate XLAT/XLONG
pub const STAGGERED_COORDINATE_VARS: &[&str] = &["XLAT_U", "XLONG_U", "XLAT_V", "XLONG_V"];

/// Get the SI units for a WRF or derived variable
pub fn get_variable_units(variable_name: &str) -> &'static str {
    match variable_name {
        // Wind components and derived speeds
        "U" | "V" | "W" | "U10" | "V10" | "wind_east" | "wind_north" | "wind_east_10"
        | "wind_north_10" | "wind_speed" | "wind_speed_10" => "m s-1",
        "wind_direction" | "wind_direction_10" => "degree",
        // Temperatures
        "T" => "K",
        "T2" | "TH2" | "TSK" | "Ta" | "air_potential_temperature" => "K",
        // Moisture
        "QVAPOR" | "QCLOUD" | "QRAIN" | "QICE" | "QSNOW" | "QGRAUP" | "Q2" => "kg kg-1",
        "RH" => "1",
        // Precipitation
        "RAINC" | "RAINNC" => "mm",
        // Pressure
        "P" | "PB" | "PSFC" | "air_pressure" => "Pa",
        // Geopotential
        "PH" | "PHB" | "geopotential" => "m2 s-2",
        "geopotential_height" | "HGT" | "PBLH" => "m",
        "XLAT" => "degree_north",
        "XLONG" => "degree_east",
        _ => "unknown",
    }
}

/// Short human-readable description for the variables this crate creates
pub fn get_variable_description(variable_name: &str) -> Option<&'static str> {
    let description = match variable_name {
        "air_pressure" => "air pressure",
        "geopotential" => "geopotential",
        "geopotential_height" => "geopotential height",
        "air_potential_temperature" => "air potential temperature",
        "wind_east" => "earth-relative x-wind component",
        "wind_north" => "earth-relative y-wind component",
        "wind_east_10" => "earth-relative 10m x-wind component",
        "wind_north_10" => "earth-relative 10m y-wind component",
        "wind_speed" => "horizontal wind speed",
        "wind_speed_10" => "10m wind speed",
        "wind_direction" => "meteorological wind direction",
        "wind_direction_10" => "10m meteorological wind direction",
        "Ta" => "air temperature",
        "RH" => "relative humidity",
        _ => return None,
    };
    Some(description)
}

/// Attach `units` (and `description` when known) unless already present
pub fn annotate(mut field: Field) -> Field {
    if !field.attrs.contains_key("units") {
        let units = get_variable_units(&field.name);
        if units != "unknown" {
            field = field.with_attr("units", units);
        }
    }
    if !field.attrs.contains_key("description") {
        if let Some(description) = get_variable_description(&field.name) {
            field = field.with_attr("description", description);
        }
    }
    field
}

/// Check if a variable name represents a coordinate variable
pub fn is_coordinate_var(variable_name: &str) -> bool {
    COORDINATE_VARS.contains(&variable_name) || STAGGERED_COORDINATE_VARS.contains(&variable_name)
}

/// Check if a dimension name is edge-centred
pub fn is_staggered_dim(dim: &str) -> bool {
    dim.ends_with(STAG_SUFFIX)
}

/// Cell-centred name of a (possibly staggered) dimension
pub fn unstaggered_dim(dim: &str) -> &str {
    dim.strip_suffix(STAG_SUFFIX).unwrap_or(dim)
}

/// Whether every dimension belongs to the WRF model grid, so the variable
/// can be destaggered and classified as a 2-D or 3-D field
pub fn is_grid_layout(dims: &[String]) -> bool {
    matches!(dims.len(), 3 | 4)
        && dims[0] == super::TIME_DIM
        && dims[1..].iter().all(|d| {
            matches!(
                unstaggered_dim(d),
                super::VERTICAL_DIM | super::SOUTH_NORTH_DIM | super::WEST_EAST_DIM
            )
        })
}
