use ndarray::{Array3, ArrayView1, ArrayView3, ArrayViewMut1, Axis, Zip};
use num_traits::Float;

/// Generic linear interpolation between two values
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Linear interpolation between two points (traditional interface)
pub fn linear_interpolate<T: Float>(x0: T, y0: T, x1: T, y1: T, x: T) -> T {
    if x == x0 || x1 == x0 {
        y0
    } else if x == x1 {
        y1
    } else {
        lin_interp(y0, y1, (x - x0) / (x1 - x0))
    }
}

/// Find the segment `[k, k+1]` of a monotonic column that brackets
/// `target`, with the fractional position inside it. Works for increasing
/// and decreasing columns; segments touching a NaN are skipped. Returns
/// `None` when the target lies outside the column range.
pub fn find_bracket<T: Float>(column: ArrayView1<T>, target: T) -> Option<(usize, T)> {
    if target.is_nan() || column.len() < 2 {
        return match column.first() {
            Some(&only) if only == target => Some((0, T::zero())),
            _ => None,
        };
    }
    for k in 0..column.len() - 1 {
        let (r0, r1) = (column[k], column[k + 1]);
        if r0.is_nan() || r1.is_nan() {
            continue;
        }
        if target == r0 {
            return Some((k, T::zero()));
        }
        if target == r1 {
            return Some((k, T::one()));
        }
        let (lo, hi) = if r0 <= r1 { (r0, r1) } else { (r1, r0) };
        if lo < target && target < hi {
            return Some((k, (target - r0) / (r1 - r0)));
        }
    }
    None
}

/// Interpolate one column of `values`, located at `reference`, onto
/// `targets`. Targets outside the reference range become NaN; a target
/// equal to a reference value yields that level's value exactly.
pub fn interp_column<T: Float>(
    reference: ArrayView1<T>,
    values: ArrayView1<T>,
    targets: &[T],
    mut out: ArrayViewMut1<T>,
) {
    for (o, &target) in out.iter_mut().zip(targets) {
        *o = match find_bracket(reference, target) {
            Some((k, fac)) if fac == T::zero() => values[k],
            Some((k, fac)) if fac == T::one() => values[k + 1],
            Some((k, fac)) => lin_interp(values[k], values[k + 1], fac),
            None => T::nan(),
        };
    }
}

/// Resample a `[level, y, x]` block onto `targets` column by column. The
/// result has shape `[targets.len(), y, x]`.
pub fn interp_levels<T: Float>(
    reference: ArrayView3<T>,
    values: ArrayView3<T>,
    targets: &[T],
) -> Array3<T> {
    let (_, ny, nx) = values.dim();
    let mut out = Array3::from_elem((targets.len(), ny, nx), T::nan());

    Zip::from(out.lanes_mut(Axis(0)))
        .and(reference.lanes(Axis(0)))
        .and(values.lanes(Axis(0)))
        .for_each(|o, r, v| interp_column(r, v, targets, o));

    out
}
