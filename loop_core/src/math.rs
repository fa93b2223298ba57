//! Small numeric helpers shared by the correction engines.

/// Arithmetic mean; 0.0 for an empty slice.
#[inline]
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Ordinary least-squares fit of `ys` against `xs`, returned as
/// `(slope, intercept)`. `None` when fewer than two points or when the X
/// variance is degenerate.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mean_x = average(xs);
    let mean_y = average(ys);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx == 0.0 || !sxx.is_finite() {
        return None;
    }
    let slope = sxy / sxx;
    if !slope.is_finite() {
        return None;
    }
    Some((slope, mean_y - slope * mean_x))
}

/// Projection of the point (1, 1) onto the line `a*x + b*y = c`.
///
/// Used by the parameter estimator to split an observed discrepancy between
/// two candidate multipliers. Degenerate lines project to (1, 1), i.e. "no
/// adjustment".
pub fn project_to_line(a: f64, b: f64, c: f64) -> (f64, f64) {
    let dot = a * a + b * b;
    if dot == 0.0 {
        (1.0, 1.0)
    } else {
        let x = (b * b - a * b + a * c) / dot;
        let y = (a * a - a * b + b * c) / dot;
        (x, y)
    }
}
