use common::models::Tick;

/// Number of most recent ticks averaged for the surge numerator.
const RECENT_VOLUME_SPAN: usize = 5;

/// Mean absolute tick-to-tick relative price change; 0 with fewer than
/// two ticks.
pub fn volatility(ticks: &[Tick]) -> f64 {
    if ticks.len() < 2 {
        return 0.0;
    }
    let sum: f64 = ticks
        .windows(2)
        .map(|pair| ((pair[1].price - pair[0].price) / pair[0].price).abs())
        .sum();
    sum / (ticks.len() - 1) as f64
}

/// Recent average volume over full-window average volume; 0 until the
/// window holds `capacity` ticks or when the denominator is 0.
pub fn volume_surge(ticks: &[Tick], capacity: usize) -> f64 {
    if ticks.len() < capacity {
        return 0.0;
    }
    let span = RECENT_VOLUME_SPAN.min(ticks.len());
    let recent: f64 =
        ticks[ticks.len() - span..].iter().map(|t| t.volume as f64).sum::<f64>() / span as f64;
    let average: f64 =
        ticks.iter().map(|t| t.volume as f64).sum::<f64>() / ticks.len() as f64;
    if average > 0.0 { recent / average } else { 0.0 }
}

/// Relative price change from the oldest to the newest tick in the
/// window; 0 with fewer than two ticks.
pub fn momentum(ticks: &[Tick]) -> f64 {
    if ticks.len() < 2 {
        return 0.0;
    }
    let first = ticks[0].price;
    let last = ticks[ticks.len() - 1].price;
    (last - first) / first
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ticks(data: &[(f64, i64)]) -> Vec<Tick> {
        data.iter()
            .map(|&(price, volume)| Tick::new(price, volume, Utc::now()))
            .collect()
    }

    #[test]
    fn volatility_averages_absolute_changes() {
        // 100 -> 102 (+2%), 102 -> 99.96 (-2%)
        let t = ticks(&[(100.0, 1), (102.0, 1), (99.96, 1)]);
        assert!((volatility(&t) - 0.02).abs() < 1e-9);
        assert_eq!(volatility(&t[..1]), 0.0);
    }

    #[test]
    fn momentum_spans_the_window() {
        let t = ticks(&[(100.0, 1), (90.0, 1), (105.0, 1)]);
        assert!((momentum(&t) - 0.05).abs() < 1e-12);
        assert_eq!(momentum(&t[..1]), 0.0);
    }

    #[test]
    fn volume_surge_requires_a_full_window() {
        let mut data = vec![(100.0, 100); 9];
        assert_eq!(volume_surge(&ticks(&data), 10), 0.0);

        data.push((100.0, 100));
        // uniform volume: surge ratio 1.0
        assert!((volume_surge(&ticks(&data), 10) - 1.0).abs() < 1e-12);

        // last five ticks at triple volume: recent 300 vs average 200
        let spiky: Vec<(f64, i64)> = (0..10)
            .map(|i| (100.0, if i >= 5 { 300 } else { 100 }))
            .collect();
        assert!((volume_surge(&ticks(&spiky), 10) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn volume_surge_zero_volume_denominator() {
        let flat = vec![(100.0, 0); 10];
        assert_eq!(volume_surge(&ticks(&flat), 10), 0.0);
    }
}
