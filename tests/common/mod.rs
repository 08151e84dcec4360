//! Synthetic `wrfout` files for the integration tests.
#![allow(dead_code)]

use std::path::Path;
use wrf_levels::config::{Constants, InterpVar, LevelSpec, PreprocessConfig};

pub const NZ: usize = 4;
pub const NY: usize = 2;
pub const NX: usize = 2;

/// Heights of the staggered (w) levels; their midpoints are 50, 500,
/// 1000 and 1800 m
pub const STAG_HEIGHTS: [f32; NZ + 1] = [0.0, 100.0, 900.0, 1100.0, 2500.0];

/// Mass-level heights the file resolves to after destaggering
pub const MASS_HEIGHTS: [f32; NZ] = [50.0, 500.0, 1000.0, 1800.0];

fn fill(len: usize, value: f32) -> Vec<f32> {
    vec![value; len]
}

/// Write one single-time `wrfout` file valid `minutes` after
/// 2024-01-01 00:00:00. `T2` holds `t2`; every 3-D field is horizontally
/// uniform.
pub fn write_wrfout(path: &Path, minutes: f64, t2: f32) -> Result<(), netcdf::Error> {
    let g = Constants::default().g as f32;
    let mut file = netcdf::create(path)?;

    file.add_dimension("Time", 1)?;
    file.add_dimension("bottom_top", NZ)?;
    file.add_dimension("bottom_top_stag", NZ + 1)?;
    file.add_dimension("south_north", NY)?;
    file.add_dimension("south_north_stag", NY + 1)?;
    file.add_dimension("west_east", NX)?;
    file.add_dimension("west_east_stag", NX + 1)?;
    file.add_dimension("soil_layers", 2)?;

    file.add_attribute("TITLE", "OUTPUT FROM WRF V4.5 MODEL")?;
    file.add_attribute("MAP_PROJ", 1i32)?;
    file.add_attribute("TRUELAT1", 30.0f32)?;
    file.add_attribute("TRUELAT2", 60.0f32)?;
    file.add_attribute("STAND_LON", 10.0f32)?;
    file.add_attribute("MOAD_CEN_LAT", 45.0f32)?;
    file.add_attribute("CEN_LAT", 45.0f32)?;

    {
        let mut xtime = file.add_variable::<f32>("XTIME", &["Time"])?;
        xtime.put_attribute("units", "minutes since 2024-01-01 00:00:00")?;
        xtime.put_values(&[minutes as f32], ..)?;
    }

    let d2 = ["Time", "south_north", "west_east"];
    let n2 = NY * NX;
    for (name, values) in [
        ("XLAT", vec![44.0, 44.0, 46.0, 46.0]),
        ("XLONG", vec![9.0, 11.0, 9.0, 11.0]),
        ("T2", fill(n2, t2)),
        ("U10", fill(n2, 3.0)),
        ("V10", fill(n2, 4.0)),
        ("SINALPHA", fill(n2, 0.0)),
        ("COSALPHA", fill(n2, 1.0)),
    ] {
        let mut var = file.add_variable::<f32>(name, &d2)?;
        var.put_values(&values, ..)?;
    }

    let d3 = ["Time", "bottom_top", "south_north", "west_east"];
    let theta_perturbation: Vec<f32> = MASS_HEIGHTS
        .iter()
        .flat_map(|z| std::iter::repeat(-z / 100.0).take(n2))
        .collect();
    let pressure: Vec<f32> = MASS_HEIGHTS
        .iter()
        .flat_map(|z| std::iter::repeat(100_000.0 - 10.0 * z).take(n2))
        .collect();
    for (name, values, units) in [
        ("T", theta_perturbation, "K"),
        ("P", fill(NZ * n2, 0.0), "Pa"),
        ("PB", pressure, "Pa"),
        ("QVAPOR", fill(NZ * n2, 0.005), "kg kg-1"),
    ] {
        let mut var = file.add_variable::<f32>(name, &d3)?;
        var.put_attribute("units", units)?;
        var.put_values(&values, ..)?;
    }

    let phb: Vec<f32> = STAG_HEIGHTS
        .iter()
        .flat_map(|z| std::iter::repeat(z * g).take(n2))
        .collect();
    let staggered: [(&str, [&str; 4], Vec<f32>); 5] = [
        ("PHB", ["Time", "bottom_top_stag", "south_north", "west_east"], phb),
        ("PH", ["Time", "bottom_top_stag", "south_north", "west_east"], fill((NZ + 1) * n2, 0.0)),
        ("U", ["Time", "bottom_top", "south_north", "west_east_stag"], fill(NZ * NY * (NX + 1), 3.0)),
        ("V", ["Time", "bottom_top", "south_north_stag", "west_east"], fill(NZ * (NY + 1) * NX, 4.0)),
        ("TSLB", ["Time", "soil_layers", "south_north", "west_east"], fill(2 * n2, 285.0)),
    ];
    for (name, dims, values) in staggered {
        let mut var = file.add_variable::<f32>(name, &dims)?;
        var.put_values(&values, ..)?;
    }
    Ok(())
}

/// Run configuration for a case directory `<root>/run/case`
pub fn config(root: &Path, levs: &str, num_threads: usize) -> PreprocessConfig {
    PreprocessConfig {
        wrf_run: root.join("run"),
        case_name: "case".to_string(),
        file_prefix: "wrfout_d01".to_string(),
        proc_dir: root.join("data"),
        levels: LevelSpec::parse(levs).expect("valid levels"),
        levs_expr: levs.to_string(),
        interp_var: InterpVar::GeopotentialHeight,
        logfile: root.join("app.log"),
        num_threads,
        constants: Constants::default(),
    }
}
