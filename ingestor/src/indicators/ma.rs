/// Mean of the first `window` values (most recent first). Uses whatever is
/// available when the series is shorter than the window.
pub fn simple(values: &[f64], window: usize) -> f64 {
    let take = values.len().min(window);
    if take == 0 {
        return 0.0;
    }
    values[..take].iter().sum::<f64>() / take as f64
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_only_the_head_of_the_series() {
        let closes = [10.0, 8.0, 6.0, 4.0, 2.0, 100.0];
        assert_eq!(simple(&closes, 5), 6.0);
    }

    #[test]
    fn short_series_uses_available_values() {
        assert_eq!(simple(&[10.0, 12.0], 20), 11.0);
        assert_eq!(simple(&[], 5), 0.0);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(10.005_000_1), 10.01);
        assert_eq!(round2(9.994), 9.99);
    }
}
