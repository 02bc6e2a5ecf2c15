pub const PERIOD: usize = 20;
pub const WIDTH: f64 = 2.0;

/// Upper and lower band around `mean` using the population standard
/// deviation of the trailing [`PERIOD`] closes (most recent first).
///
/// With fewer than [`PERIOD`] closes the bands collapse onto the mean.
pub fn bands(closes: &[f64], mean: f64) -> (f64, f64) {
    if closes.len() < PERIOD {
        return (mean, mean);
    }

    let window = &closes[..PERIOD];
    let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / PERIOD as f64;
    let sigma = variance.sqrt();

    (mean + WIDTH * sigma, mean - WIDTH * sigma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_history_collapses_bands() {
        assert_eq!(bands(&[10.0, 11.0, 12.0], 11.0), (11.0, 11.0));
    }

    #[test]
    fn symmetric_bands_around_mean() {
        // Alternating 9/11 has mean 10 and population sigma 1.
        let closes: Vec<f64> = (0..PERIOD).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 }).collect();
        let (up, low) = bands(&closes, 10.0);
        assert!((up - 12.0).abs() < 1e-12);
        assert!((low - 8.0).abs() < 1e-12);
    }
}
