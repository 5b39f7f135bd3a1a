use crate::model::Timestamp;
use crate::model::grid::TimeGrid;

///
/// Linear-mode alignment for voltages and summary scalars.
///
/// Non-finite samples are removed first; with fewer than two finite samples the
/// whole output is missing. No extrapolation: grid points outside the finite
/// samples' span stay NaN. A grid point that lands exactly on a sample reproduces
/// that sample's value bit-for-bit.
///
pub fn align_linear(grid: &TimeGrid, times: &[Timestamp], values: &[f64]) -> Vec<f64> {
    debug_assert_eq!(times.len(), values.len());

    let mut xs = Vec::with_capacity(times.len());
    let mut ys = Vec::with_capacity(values.len());
    for (&t, &v) in times.iter().zip(values) {
        if v.is_finite() {
            xs.push(t);
            ys.push(v);
        }
    }

    if xs.len() < 2 {
        return vec![f64::NAN; grid.len()]
    }

    interp_onto(grid, &xs, &ys, false)
}

///
/// Forward-fill-mode alignment for temperatures.
///
/// Missing samples take the most recent preceding finite value (leading missings
/// stay missing), the filled series is linearly interpolated between its samples,
/// and the last known value holds to the end of the grid - the output at a grid
/// point is defined exactly when some finite sample exists at or before it.
///
pub fn align_ffill(grid: &TimeGrid, times: &[Timestamp], values: &[f64]) -> Vec<f64> {
    debug_assert_eq!(times.len(), values.len());

    let filled = forward_fill(values);

    let first = match filled.iter().position(|v| v.is_finite()) {
        Some(first) => first,
        None => return vec![f64::NAN; grid.len()],
    };

    interp_onto(grid, &times[first..], &filled[first..], true)
}

///
/// Replace each missing value with the most recent preceding finite one. Leading
/// missings remain missing.
///
pub fn forward_fill(values: &[f64]) -> Vec<f64> {
    let mut last = f64::NAN;
    values.iter()
        .map(|&v| {
            if v.is_finite() {
                last = v;
            }
            last
        })
        .collect()
}

///
/// Piecewise-linear interpolation of (xs, ys) onto the grid. xs must be strictly
/// increasing and ys all finite. Grid points before xs[0] are NaN; points after
/// the last sample either hold the last value (`hold_right`) or are NaN.
///
fn interp_onto(grid: &TimeGrid, xs: &[Timestamp], ys: &[f64], hold_right: bool) -> Vec<f64> {
    debug_assert!(!xs.is_empty());
    debug_assert!(xs.windows(2).all(|pair| pair[0] < pair[1]));

    let mut out = Vec::with_capacity(grid.len());
    let mut j = 0;

    for g in grid.iter() {
        while j + 1 < xs.len() && xs[j + 1] <= g {
            j += 1;
        }

        let value = if g < xs[0] {
            f64::NAN
        } else if g == xs[j] {
            ys[j] // Exact at sample points.
        } else if j + 1 < xs.len() {
            let span = (xs[j + 1] - xs[j]) as f64;
            let frac = (g - xs[j]) as f64 / span;
            ys[j] + (ys[j + 1] - ys[j]) * frac
        } else if hold_right {
            ys[j]
        } else {
            f64::NAN
        };

        out.push(value);
    }

    out
}
