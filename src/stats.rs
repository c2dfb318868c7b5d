use crate::models::QuartileSummary;

/// Sorts a copy of `values`, dropping NaNs.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Linear interpolation between order statistics (h = (n - 1) * p).
/// `sorted_values` must already be ascending.
pub fn quantile(sorted_values: &[f64], p: f64) -> Option<f64> {
    if sorted_values.is_empty() {
        return None;
    }

    let p = p.clamp(0.0, 1.0);
    let h = (sorted_values.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let lower = sorted_values[lo];
    let upper = sorted_values[hi];
    Some(lower + (h - lo as f64) * (upper - lower))
}

pub fn median(sorted_values: &[f64]) -> Option<f64> {
    quantile(sorted_values, 0.5)
}

pub fn quartiles(values: &[f64]) -> Option<QuartileSummary> {
    let values = sorted(values);
    Some(QuartileSummary {
        median: median(&values)?,
        q1: quantile(&values, 0.25)?,
        q3: quantile(&values, 0.75)?,
    })
}

/// Median and 90th percentile of an unsorted sample.
pub fn median_and_p90(values: &[f64]) -> (Option<f64>, Option<f64>) {
    let values = sorted(values);
    (median(&values), quantile(&values, 0.9))
}
