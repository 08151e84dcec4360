mod common;

use common::{config, write_wrfout, NX, NY};
use std::fs;
use wrf_levels::config::InspectConfig;
use wrf_levels::pipeline::run;
use wrf_levels::viewer::{run_inspect, CrossSection, StoreViewer, ViewerError};

fn processed_store(root: &std::path::Path) -> std::path::PathBuf {
    let case_dir = root.join("run").join("case");
    fs::create_dir_all(&case_dir).unwrap();
    for (i, name) in ["wrfout_d01_0", "wrfout_d01_1", "wrfout_d01_2"].iter().enumerate() {
        write_wrfout(&case_dir.join(name), 60.0 * i as f64, 10.0 * i as f32).unwrap();
    }
    run(&config(root, "np.arange(0, 2000, 100)", 2)).unwrap().store_path
}

#[test]
fn test_viewer_extracts_views() {
    let dir = tempfile::tempdir().unwrap();
    let store = processed_store(dir.path());
    let viewer = StoreViewer::open(&store).unwrap();

    assert_eq!(viewer.vertical_dim(), Some("geopotential_height"));
    assert!(viewer.vars_2d().iter().any(|v| v == "T2"));
    assert!(viewer.vars_3d().iter().any(|v| v == "wind_speed"));
    assert!(!viewer.vars_3d().iter().any(|v| v == "T2"));
    assert_eq!(viewer.times().len(), 3);
    let crs = viewer.crs().unwrap();
    assert_eq!(crs.lambert_parameters(), Some((10.0, 45.0, (30.0, 60.0))));

    let map = viewer.map_slice("T2", 1, 0).unwrap();
    assert_eq!(map.dim(), (NY, NX));
    assert_eq!(map[[0, 0]], 10.0);

    let section = viewer.cross_section("wind_speed", 0, CrossSection::Row(1)).unwrap();
    assert_eq!(section.dim(), (20, NX));
    assert!((section[[5, 0]] - 5.0).abs() < 1e-5);
    assert!(matches!(
        viewer.cross_section("T2", 0, CrossSection::Col(0)),
        Err(ViewerError::NotVertical(_))
    ));
    assert!(matches!(
        viewer.cross_section("wind_speed", 0, CrossSection::Col(NX)),
        Err(ViewerError::IndexOutOfRange { .. })
    ));

    let series = viewer.time_series("T2", (0, 1), 0).unwrap();
    let values: Vec<f32> = series.iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![0.0, 10.0, 20.0]);

    let profile = viewer.profile("wind_speed", 2, (1, 1)).unwrap();
    assert_eq!(profile.len(), 20);
    assert_eq!(profile[3].0, 300.0);
    assert!(profile[0].1.is_nan());

    let diff = viewer.compare("T2", 0, 2, 0).unwrap();
    assert!(diff.iter().all(|v| *v == 20.0));
}

#[test]
fn test_inspect_summary_and_csv() {
    let dir = tempfile::tempdir().unwrap();
    let store = processed_store(dir.path());

    let mut summary = Vec::new();
    let cfg = InspectConfig {
        store: store.clone(),
        variable: None,
        time: 0,
        level: 0,
        point: None,
        cross_section: None,
        compare: None,
        csv: false,
    };
    run_inspect(&cfg, &mut summary).unwrap();
    let text = String::from_utf8(summary).unwrap();
    assert!(text.contains("CRS: +proj=lcc"));
    assert!(text.contains("Vertical: geopotential_height (20 levels)"));
    assert!(text.contains("Coordinates: XLAT, XLONG, geopotential_height"));
    assert!(text.contains("PREPROCESS_CASE_NAME: case"));
    assert!(text.contains("wind_speed"));

    let mut csv = Vec::new();
    let cfg = InspectConfig {
        variable: Some("T2".to_string()),
        time: 2,
        csv: true,
        ..cfg
    };
    run_inspect(&cfg, &mut csv).unwrap();
    assert_eq!(String::from_utf8(csv).unwrap(), "20,20\n20,20\n");

    let cfg = InspectConfig {
        variable: None,
        point: Some((0, 0)),
        ..cfg
    };
    assert!(matches!(run_inspect(&cfg, &mut Vec::new()), Err(ViewerError::NoVariable)));
}
