//! WRF-specific post-processing applied right after loading: destaggering
//! and the diagnostic fields every downstream step relies on.

use super::utils::{annotate, is_staggered_dim, unstaggered_dim};
use super::{Dataset, Field, SchemaError};
use crate::config::Constants;
use crate::math::physics::grid_to_earth_wind;
use ndarray::{ArrayD, Axis, Slice, Zip};
use tracing::debug;

/// WRF stores potential temperature as a perturbation from this base (K)
pub const THETA_BASE: f32 = 300.0;

/// Average adjacent edge values onto cell centres along every staggered axis
pub fn destagger(field: &Field) -> Field {
    let mut data = field.data.clone();
    let mut dims = field.dims.clone();

    for axis in 0..dims.len() {
        if !is_staggered_dim(&dims[axis]) {
            continue;
        }
        let n = data.len_of(Axis(axis));
        if n >= 2 {
            let lo = data.slice_axis(Axis(axis), Slice::from(..n - 1));
            let hi = data.slice_axis(Axis(axis), Slice::from(1..));
            let centred = (&lo + &hi) * 0.5f32;
            data = centred;
        }
        dims[axis] = unstaggered_dim(&dims[axis]).to_string();
    }

    Field {
        name: field.name.clone(),
        dims,
        data,
        attrs: field.attrs.clone(),
    }
}

/// Element-wise combination of two same-shaped fields
fn combine(
    name: &str,
    a: &Field,
    b: &Field,
    op: impl Fn(f32, f32) -> f32,
) -> Result<Field, SchemaError> {
    if a.shape() != b.shape() {
        return Err(SchemaError::ShapeMismatch {
            name: b.name.clone(),
            expected: a.shape().to_vec(),
            actual: b.shape().to_vec(),
        });
    }
    let mut out = ArrayD::<f32>::zeros(a.data.raw_dim());
    Zip::from(&mut out)
        .and(&a.data)
        .and(&b.data)
        .for_each(|o, &x, &y| *o = op(x, y));
    Ok(annotate(Field::new(name, &a.dims, out)?))
}

/// Add the derived WRF diagnostics: total pressure, geopotential (height),
/// full potential temperature and earth-relative winds. Inputs that are
/// absent are skipped; consumers report the missing variable themselves.
pub fn apply_wrf_diagnostics(ds: &mut Dataset, constants: &Constants) -> Result<(), SchemaError> {
    let mut added = Vec::new();

    if let (Some(p), Some(pb)) = (ds.variable("P"), ds.variable("PB")) {
        added.push(combine("air_pressure", p, pb, |a, b| a + b)?);
    }

    if let (Some(ph), Some(phb)) = (ds.variable("PH"), ds.variable("PHB")) {
        let g = constants.g as f32;
        let geopotential = combine("geopotential", ph, phb, |a, b| a + b)?;
        let height = geopotential.data.mapv(|v| v / g);
        added.push(annotate(Field::new(
            "geopotential_height",
            &geopotential.dims,
            height,
        )?));
        added.push(geopotential);
    }

    if let Some(t) = ds.variable("T") {
        let theta = t.data.mapv(|v| v + THETA_BASE);
        added.push(annotate(Field::new("air_potential_temperature", &t.dims, theta)?));
    }

    if let (Some(sina), Some(cosa)) = (ds.variable("SINALPHA"), ds.variable("COSALPHA")) {
        for (u, v, east, north) in [
            ("U", "V", "wind_east", "wind_north"),
            ("U10", "V10", "wind_east_10", "wind_north_10"),
        ] {
            if let (Some(u), Some(v)) = (ds.variable(u), ds.variable(v)) {
                let (e, n) = rotate_winds(u, v, sina, cosa)?;
                added.push(annotate(Field::new(east, &u.dims, e)?));
                added.push(annotate(Field::new(north, &u.dims, n)?));
            }
        }
    } else {
        debug!("SINALPHA/COSALPHA not present; skipping earth-relative winds");
    }

    for field in added {
        debug!(name = %field.name, shape = ?field.shape(), "adding diagnostic");
        ds.insert_variable(field);
    }
    Ok(())
}

/// Rotate grid-relative winds with the map rotation (2-D) fields, which are
/// broadcast over the vertical axis of 3-D winds
fn rotate_winds(
    u: &Field,
    v: &Field,
    sina: &Field,
    cosa: &Field,
) -> Result<(ArrayD<f32>, ArrayD<f32>), SchemaError> {
    if u.shape() != v.shape() {
        return Err(SchemaError::ShapeMismatch {
            name: v.name.clone(),
            expected: u.shape().to_vec(),
            actual: v.shape().to_vec(),
        });
    }

    let mismatch = |f: &Field| SchemaError::ShapeMismatch {
        name: f.name.clone(),
        expected: u.shape().to_vec(),
        actual: f.shape().to_vec(),
    };
    let (sin_view, cos_view) = if u.data.ndim() == sina.data.ndim() + 1 {
        (sina.data.view().insert_axis(Axis(1)), cosa.data.view().insert_axis(Axis(1)))
    } else {
        (sina.data.view(), cosa.data.view())
    };
    let sin_b = sin_view.broadcast(u.data.raw_dim()).ok_or_else(|| mismatch(sina))?;
    let cos_b = cos_view.broadcast(u.data.raw_dim()).ok_or_else(|| mismatch(cosa))?;

    let mut east = ArrayD::<f32>::zeros(u.data.raw_dim());
    let mut north = ArrayD::<f32>::zeros(u.data.raw_dim());
    Zip::from(&mut east)
        .and(&mut north)
        .and(&u.data)
        .and(&v.data)
        .and(&sin_b)
        .and(&cos_b)
        .for_each(|e, n, &uu, &vv, &s, &c| {
            let (ue, vn) = grid_to_earth_wind(uu as f64, vv as f64, s as f64, c as f64);
            *e = ue as f32;
            *n = vn as f32;
        });
    Ok((east, north))
}
