use watch_core::{AlertEvent, AlertKind, RunSettings};

/// Detects a strictly increasing run over the last `k` recorded prices.
#[derive(Debug, Clone, Copy)]
pub struct RunDetector {
    settings: RunSettings,
}

impl Default for RunDetector {
    fn default() -> Self {
        Self::new(RunSettings::default())
    }
}

impl RunDetector {
    pub fn new(settings: RunSettings) -> Self {
        Self { settings }
    }

    /// Number of most recent samples the detector needs.
    pub fn window(&self) -> usize {
        self.settings.consecutive_periods()
    }

    /// Evaluate a most-recent-first price window.
    ///
    /// Returns `None` when history is shorter than the window, when any step
    /// is flat or decreasing, when the oldest price is zero, or when the total
    /// change stays under the threshold.
    pub fn evaluate(&self, asset_id: &str, recent_prices: &[f64]) -> Option<AlertEvent> {
        let k = self.window();
        if recent_prices.len() < k {
            tracing::debug!(
                "Run check skipped for {}: {} of {} samples",
                asset_id,
                recent_prices.len(),
                k
            );
            return None;
        }

        let chronological: Vec<f64> = recent_prices[..k].iter().rev().copied().collect();

        if !chronological.windows(2).all(|w| w[0] < w[1]) {
            return None;
        }

        let first = chronological[0];
        let last = chronological[k - 1];
        if first <= 0.0 {
            tracing::debug!("Run check skipped for {}: oldest price is {}", asset_id, first);
            return None;
        }

        let total_change = (last - first) / first * 100.0;
        if total_change >= self.settings.threshold_percent() {
            tracing::info!(
                "Run detected for {}: {:.2}% over {} periods",
                asset_id,
                total_change,
                k
            );
            Some(AlertEvent {
                asset_id: asset_id.to_string(),
                kind: AlertKind::RunAlert,
                magnitude_percent: total_change,
                periods_considered: k,
                threshold_percent: self.settings.threshold_percent(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(threshold: f64, periods: usize) -> RunDetector {
        RunDetector::new(RunSettings::new(threshold, periods).unwrap())
    }

    /// Oldest-first prices to the most-recent-first order the store returns.
    fn newest_first(prices: &[f64]) -> Vec<f64> {
        prices.iter().rev().copied().collect()
    }

    #[test]
    fn test_run_triggers() {
        let d = detector(15.0, 5);
        let window = newest_first(&[100.0, 105.0, 110.0, 115.0, 120.0]);

        let alert = d.evaluate("ether", &window).unwrap();
        assert_eq!(alert.kind, AlertKind::RunAlert);
        assert!((alert.magnitude_percent - 20.0).abs() < 1e-9);
        assert_eq!(alert.periods_considered, 5);
    }

    #[test]
    fn test_broken_run_does_not_trigger() {
        let d = detector(15.0, 5);
        let window = newest_first(&[100.0, 105.0, 110.0, 115.0, 90.0]);
        assert!(d.evaluate("ether", &window).is_none());
    }

    #[test]
    fn test_any_single_break_cancels_run() {
        let d = detector(5.0, 5);
        let base = [100.0, 110.0, 120.0, 130.0, 140.0];
        assert!(d.evaluate("ether", &newest_first(&base)).is_some());

        for i in 0..base.len() {
            let mut broken = base;
            // make position i equal to a neighbour so one step is flat
            broken[i] = if i == 0 { base[1] } else { base[i - 1] };
            assert!(
                d.evaluate("ether", &newest_first(&broken)).is_none(),
                "break at index {} should cancel the run",
                i
            );
        }
    }

    #[test]
    fn test_flat_step_breaks_run() {
        let d = detector(1.0, 3);
        assert!(d.evaluate("ether", &newest_first(&[100.0, 100.0, 120.0])).is_none());
    }

    #[test]
    fn test_insufficient_history_never_triggers() {
        for k in 2..8 {
            let d = detector(0.001, k);
            let prices: Vec<f64> = (0..k - 1).map(|i| 100.0 * (i as f64 + 1.0)).collect();
            assert!(d.evaluate("ether", &newest_first(&prices)).is_none());
        }
    }

    #[test]
    fn test_below_threshold_does_not_trigger() {
        let d = detector(25.0, 5);
        let window = newest_first(&[100.0, 105.0, 110.0, 115.0, 120.0]);
        assert!(d.evaluate("ether", &window).is_none());
    }

    #[test]
    fn test_exact_threshold_triggers() {
        let d = detector(20.0, 2);
        assert!(d.evaluate("ether", &newest_first(&[100.0, 120.0])).is_some());
    }

    #[test]
    fn test_zero_start_price_is_not_a_run() {
        let d = detector(10.0, 3);
        assert!(d.evaluate("ether", &newest_first(&[0.0, 1.0, 2.0])).is_none());
    }

    #[test]
    fn test_only_window_is_considered() {
        let d = detector(10.0, 3);
        // older samples beyond the window would break the run
        let window = vec![130.0, 120.0, 110.0, 500.0, 1.0];
        let alert = d.evaluate("ether", &window).unwrap();
        assert!((alert.magnitude_percent - 18.181818181818183).abs() < 1e-9);
    }

    #[test]
    fn test_default_window() {
        assert_eq!(RunDetector::default().window(), 5);
    }
}
