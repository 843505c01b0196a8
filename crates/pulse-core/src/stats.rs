//! Statistical primitives shared by the aggregator and the detectors.
//!
//! All quantiles use linear interpolation between closest ranks; standard
//! deviation is the population form (the window is the whole population of
//! the day or history being described, not a sample of it).

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. Returns 0.0 for fewer than two values.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Quantile `p` in [0,1] by linear interpolation between closest ranks.
/// Returns 0.0 for an empty slice.
pub fn quantile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-finite value in quantile"));
    let pos = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let frac = pos - lower as f64;
    if lower + 1 < sorted.len() {
        sorted[lower] + frac * (sorted[lower + 1] - sorted[lower])
    } else {
        sorted[lower]
    }
}

/// Interpolated median.
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// First and third quartiles (interpolated).
pub fn quartiles(values: &[f64]) -> (f64, f64) {
    (quantile(values, 0.25), quantile(values, 0.75))
}

/// Pearson correlation coefficient of two equal-length series.
/// Returns `None` when either series has zero variance or fewer than two
/// points (r is undefined there).
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mx;
        let dy = ys[i] - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Ordinary least-squares line over `values` with x = 0..n.
/// Returns `(slope, intercept)`; a single point yields a flat line.
pub fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    if n == 1 {
        return (0.0, values[0]);
    }
    let mx = (n - 1) as f64 / 2.0;
    let my = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, v) in values.iter().enumerate() {
        let dx = i as f64 - mx;
        num += dx * (v - my);
        den += dx * dx;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };
    (slope, my - slope * mx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        // classic population-stddev example
        assert!((population_std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_median_interpolates_even_counts() {
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < 1e-12);
        assert!((median(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_quartiles_interpolated() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (q1, q3) = quartiles(&values);
        assert!((q1 - 2.0).abs() < 1e-12);
        assert!((q3 - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [2.0, 4.0, 6.0, 8.0, 10.0];
        let r = pearson(&xs, &ys).unwrap();
        assert!((r - 1.0).abs() < 1e-12);

        let inverse: Vec<f64> = ys.iter().map(|y| -y).collect();
        let r = pearson(&xs, &inverse).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_undefined_for_flat_series() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let flat = [3.0; 5];
        assert!(pearson(&xs, &flat).is_none());
    }

    #[test]
    fn test_linear_fit_recovers_line() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let (slope, intercept) = linear_fit(&values);
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 3.0).abs() < 1e-9);
    }
}
