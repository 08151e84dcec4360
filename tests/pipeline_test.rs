mod common;

use common::{config, write_wrfout};
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use wrf_levels::data_io::{ReaderError, ZarrStoreReader};
use wrf_levels::pipeline::{run, PipelineError};
use wrf_levels::time_utils::parse_time_string;

/// Three hourly files whose names do not sort in time order
fn write_case(root: &std::path::Path) {
    let case_dir = root.join("run").join("case");
    fs::create_dir_all(&case_dir).unwrap();
    write_wrfout(&case_dir.join("wrfout_d01_a"), 120.0, 2.0).unwrap();
    write_wrfout(&case_dir.join("wrfout_d01_b"), 0.0, 0.0).unwrap();
    write_wrfout(&case_dir.join("wrfout_d01_c"), 60.0, 1.0).unwrap();
    // not an input file
    fs::write(case_dir.join("namelist.input"), "&time_control /").unwrap();
}

#[test]
fn test_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_case(dir.path());
    let cfg = config(dir.path(), "np.arange(0, 2000, 100)", 1);

    let summary = run(&cfg).unwrap();
    assert_eq!(summary.input_files, 3);
    assert_eq!(summary.time_steps, 3);
    assert_eq!(
        summary.store_path,
        dir.path().join("data").join("case").join("wrfout_d01_hlevs.zarr")
    );

    let store = ZarrStoreReader::open(&summary.store_path).unwrap();
    let ds = store.read_all().unwrap();

    // times ascend and the fields follow them
    let expected: Vec<_> = ["2024-01-01 00:00:00", "2024-01-01 01:00:00", "2024-01-01 02:00:00"]
        .iter()
        .map(|s| parse_time_string(s).unwrap())
        .collect();
    assert_eq!(ds.times, expected);
    let t2 = ds.require("T2").unwrap();
    assert_eq!(t2.dims, vec!["Time", "south_north", "west_east"]);
    for t in 0..3 {
        assert_eq!(t2.data[[t, 1, 1]], t as f32);
    }

    // U=3, V=4 everywhere
    let speed = ds.require("wind_speed").unwrap();
    assert_eq!(speed.dims, vec!["Time", "geopotential_height", "south_north", "west_east"]);
    assert_eq!(speed.shape(), &[3, 20, 2, 2]);
    for t in 0..3 {
        for k in 1..18 {
            assert!((speed.data[[t, k, 0, 1]] - 5.0).abs() < 1e-5);
        }
    }
    let speed_10 = ds.require("wind_speed_10").unwrap();
    assert!(speed_10.data.iter().all(|v| (v - 5.0).abs() < 1e-5));

    for name in ["wind_direction", "wind_direction_10"] {
        let direction = ds.require(name).unwrap();
        assert!(direction
            .data
            .iter()
            .filter(|v| !v.is_nan())
            .all(|v| (0.0..360.0).contains(v)));
    }

    // levels 0..1900 over native heights 50..1800
    let theta = ds.require("air_potential_temperature").unwrap();
    assert!(theta.data[[0, 0, 0, 0]].is_nan());
    assert!(theta.data[[0, 19, 0, 0]].is_nan());
    assert!((theta.data[[0, 1, 0, 0]] - 299.0).abs() < 1e-3);
    assert!((theta.data[[2, 10, 1, 0]] - 290.0).abs() < 1e-3);
    assert!((theta.data[[1, 17, 0, 1]] - 283.0).abs() < 1e-3);

    // reference becomes the vertical coordinate
    assert!(ds.variable("geopotential_height").is_none());
    let levels = &ds.coords["geopotential_height"];
    assert_eq!(levels.data.len(), 20);
    assert_eq!(levels.data[[19]], 1900.0);
    assert!(ds.coords.contains_key("XLAT") && ds.coords.contains_key("XLONG"));

    // attributes
    assert_eq!(ds.attr_str("TITLE"), Some("OUTPUT FROM WRF V4.5 MODEL"));
    assert!(ds.attr_str("wrf_projection").unwrap().starts_with("+proj=lcc"));
    assert_eq!(ds.attr_str("PREPROCESS_CASE_NAME"), Some("case"));
    assert_eq!(ds.attr_str("PREPROCESS_FILE_PREFIX"), Some("wrfout_d01"));
    assert_eq!(ds.attr_str("PREPROCESS_LEVS"), Some("np.arange(0, 2000, 100)"));
    assert_eq!(ds.attr_str("PREPROCESS_INTERP_VAR"), Some("geopotential_height"));
    assert!(ds.attr_str("PREPROCESS_TIMESTAMP").is_some());

    // soil fields are neither 2-D nor 3-D
    assert!(ds.variable("TSLB").is_none());
}

#[test]
fn test_worker_pool_matches_synchronous_run() {
    let dir = tempfile::tempdir().unwrap();
    write_case(dir.path());

    let sync = run(&config(dir.path(), "100:2000:100", 1)).unwrap();
    let sync_ds = ZarrStoreReader::open(&sync.store_path).unwrap().read_all().unwrap();

    let pooled = run(&config(dir.path(), "100:2000:100", 4)).unwrap();
    assert_eq!(pooled.store_path, sync.store_path);
    let pooled_ds = ZarrStoreReader::open(&pooled.store_path).unwrap().read_all().unwrap();

    assert_eq!(sync_ds.variable_names(), pooled_ds.variable_names());
    for name in sync_ds.variable_names() {
        let a = &sync_ds.require(&name).unwrap().data;
        let b = &pooled_ds.require(&name).unwrap().data;
        assert!(
            a.iter().zip(b.iter()).all(|(x, y)| x == y || (x.is_nan() && y.is_nan())),
            "{} differs",
            name
        );
    }
}

#[test]
fn test_missing_case_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = run(&config(dir.path(), "0:100:10", 1)).unwrap_err();
    assert!(matches!(err, PipelineError::Reader(ReaderError::FileNotFound(_))));
    assert!(!dir.path().join("data").join("case").exists());
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_failure_logged_within_run_span() {
    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || run(&config(dir.path(), "0:100:10", 1)));
    assert!(result.is_err());

    let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    let line = logs
        .lines()
        .find(|l| l.contains("Preprocessing failed"))
        .expect("failure was not logged");
    assert!(line.contains("ERROR"));
    assert!(line.contains("run{case=case}"), "no span context in: {}", line);
}
