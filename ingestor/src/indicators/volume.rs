use crate::time::TOTAL_TRADING_MINUTES;

pub const MAX_SAMPLES: usize = 5;

/// Today's volume relative to the trailing baseline for the same intraday
/// bucket, normalized by the share of the session that has elapsed.
///
/// The baseline averages the first 1-5 `samples` (most recent first). When
/// the scaled baseline is not positive (no samples, session not started)
/// today's own volume is used instead, which yields a ratio of 1.
pub fn volume_ratio(volume: i64, samples: &[i64], elapsed_minutes: u32) -> f64 {
    let take = samples.len().min(MAX_SAMPLES);
    let average = if take == 0 {
        0.0
    } else {
        samples[..take].iter().sum::<i64>() as f64 / take as f64
    };

    let share = elapsed_minutes.min(TOTAL_TRADING_MINUTES) as f64 / TOTAL_TRADING_MINUTES as f64;
    let mut baseline = average * share;
    if baseline <= 0.0 {
        baseline = volume as f64;
    }

    if baseline <= 0.0 {
        return 0.0;
    }

    volume as f64 / baseline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_session_compares_against_plain_average() {
        assert_eq!(volume_ratio(3_000, &[1_000, 2_000, 3_000], 240), 1.5);
    }

    #[test]
    fn partial_session_scales_the_baseline() {
        // Half the session elapsed: a baseline of 2000 becomes 1000.
        assert_eq!(volume_ratio(1_500, &[2_000], 120), 1.5);
    }

    #[test]
    fn only_five_most_recent_samples_count() {
        let samples = [100, 100, 100, 100, 100, 10_000];
        assert_eq!(volume_ratio(200, &samples, 240), 2.0);
    }

    #[test]
    fn zero_denominator_falls_back_to_own_volume() {
        assert_eq!(volume_ratio(1_000, &[], 120), 1.0);
        assert_eq!(volume_ratio(1_000, &[500], 0), 1.0);
        assert_eq!(volume_ratio(0, &[], 0), 0.0);
    }
}
