use watch_core::{AlertEvent, AlertKind};

/// Compares one period's 24h change against the asset's threshold.
///
/// No hysteresis: a sustained breach alerts again on every cycle.
pub struct ThresholdDetector;

impl ThresholdDetector {
    pub fn evaluate(
        asset_id: &str,
        change_24h_percent: f64,
        threshold_percent: f64,
    ) -> Option<AlertEvent> {
        if change_24h_percent >= threshold_percent {
            tracing::info!(
                "Threshold breach for {}: {:.2}% >= {}%",
                asset_id,
                change_24h_percent,
                threshold_percent
            );
            Some(AlertEvent {
                asset_id: asset_id.to_string(),
                kind: AlertKind::ThresholdAlert,
                magnitude_percent: change_24h_percent,
                periods_considered: 1,
                threshold_percent,
            })
        } else {
            None
        }
    }
}
