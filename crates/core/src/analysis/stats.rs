//! Aggregation over view counts. Empty input yields 0 rather than an error.

pub fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

pub fn median(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Linear-interpolation percentile: `k = (n - 1) * p / 100`, interpolated between
/// the floor and ceiling ranks. `p` is clamped to [0, 100].
pub fn percentile(values: &[u64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let k = (sorted.len() - 1) as f64 * p / 100.0;
    let lo = k.floor() as usize;
    let hi = k.ceil() as usize;
    if lo == hi {
        return sorted[lo] as f64;
    }
    let weight = k - lo as f64;
    sorted[lo] as f64 * (1.0 - weight) + sorted[hi] as f64 * weight
}

/// Share of `part` in `whole` as a percentage rounded to one decimal.
pub fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn sorted(values: &[u64]) -> Vec<u64> {
    let mut out = values.to_vec();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_linearly() {
        assert_eq!(percentile(&[1, 2, 3, 4], 75.0), 3.25);
        assert_eq!(percentile(&[4, 1, 3, 2], 75.0), 3.25);
        assert_eq!(percentile(&[10, 20, 30], 50.0), 20.0);
        assert_eq!(percentile(&[5], 75.0), 5.0);
    }

    #[test]
    fn percentile_bounds() {
        let v = [7, 1, 9, 3];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 9.0);
        assert_eq!(percentile(&v, 250.0), 9.0);
        assert_eq!(percentile(&v, -3.0), 1.0);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(percentile(&[], 75.0), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3, 1, 2]), 2.0);
        assert_eq!(median(&[4, 1, 3, 2]), 2.5);
        assert_eq!(median(&[u64::MAX, u64::MAX]), u64::MAX as f64);
    }

    #[test]
    fn pct_rounds_to_one_decimal() {
        assert_eq!(pct(1, 3), 33.3);
        assert_eq!(pct(2, 3), 66.7);
        assert_eq!(pct(0, 0), 0.0);
    }
}
