use serde::{Deserialize, Serialize};
use ta::Next;
use ta::indicators::RelativeStrengthIndex;

pub const DEFAULT_RSI_WINDOW: usize = 14;

/// How average gain and loss are formed over the trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiSmoothing {
    /// Plain rolling mean of the last `window` gains and losses.
    #[default]
    Simple,
    /// Exponentially smoothed averages (ta crate).
    Exponential,
}

/// RSI for every close. The first `window` positions are always `None`,
/// as is every position of a series shorter than `window + 1`.
pub fn compute_rsi(closes: &[f64], window: usize, smoothing: RsiSmoothing) -> Vec<Option<f64>> {
    match smoothing {
        RsiSmoothing::Simple => simple_rsi(closes, window),
        RsiSmoothing::Exponential => exponential_rsi(closes, window),
    }
}

/// Most recent defined RSI value, if any.
pub fn latest_rsi(closes: &[f64], window: usize, smoothing: RsiSmoothing) -> Option<f64> {
    compute_rsi(closes, window, smoothing)
        .into_iter()
        .rev()
        .find_map(|value| value)
}

fn simple_rsi(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window == 0 || closes.len() < window + 1 {
        return out;
    }

    // deltas[k] is the change into closes[k + 1]
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let window_f = window as f64;

    for (i, slot) in out.iter_mut().enumerate().skip(window) {
        let (gain_sum, loss_sum) = deltas[i - window..i]
            .iter()
            .fold((0.0_f64, 0.0_f64), |(g, l), &d| (g + d.max(0.0), l + (-d).max(0.0)));
        *slot = Some(rsi_from_averages(gain_sum / window_f, loss_sum / window_f));
    }
    out
}

fn exponential_rsi(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window == 0 || closes.len() < window + 1 {
        return out;
    }
    let Ok(mut indicator) = RelativeStrengthIndex::new(window) else {
        return out;
    };

    for (i, &close) in closes.iter().enumerate() {
        let value = indicator.next(close);
        if i >= window {
            out[i] = Some(if value.is_finite() { value } else { 50.0 });
        }
    }
    out
}

/// Zero loss means price only rose (100); zero gain and zero loss is a flat
/// market, pinned at 50 instead of the NaN the raw formula gives.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(series: &[Option<f64>]) -> Vec<f64> {
        series.iter().filter_map(|v| *v).collect()
    }

    #[test]
    fn short_series_has_no_values() {
        for len in 0..=DEFAULT_RSI_WINDOW {
            let closes: Vec<f64> = (0..len).map(|x| 100.0 + x as f64).collect();
            let rsi = compute_rsi(&closes, DEFAULT_RSI_WINDOW, RsiSmoothing::Simple);
            assert_eq!(rsi.len(), len);
            assert!(rsi.iter().all(Option::is_none));
        }
    }

    #[test]
    fn output_matches_input_length_with_leading_gap() {
        let closes: Vec<f64> = (0..40).map(|x| 50.0 + (x as f64 * 0.7).sin()).collect();
        let rsi = compute_rsi(&closes, 14, RsiSmoothing::Simple);
        assert_eq!(rsi.len(), closes.len());
        assert!(rsi[..14].iter().all(Option::is_none));
        assert!(rsi[14..].iter().all(Option::is_some));
    }

    #[test]
    fn rising_prices_give_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let values = defined(&compute_rsi(&closes, 14, RsiSmoothing::Simple));
        assert_eq!(values.len(), 16);
        assert!(values.iter().all(|&v| v == 100.0));
    }

    #[test]
    fn falling_prices_give_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let values = defined(&compute_rsi(&closes, 14, RsiSmoothing::Simple));
        assert!(!values.is_empty());
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn flat_prices_give_50() {
        let closes = vec![100.0; 30];
        let values = defined(&compute_rsi(&closes, 14, RsiSmoothing::Simple));
        assert!(!values.is_empty());
        assert!(values.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn mixed_series_single_value() {
        let closes = [
            44.0, 44.25, 44.5, 43.75, 44.5, 45.0, 45.25, 45.5, 45.0, 44.25, 44.0, 43.5, 44.0,
            44.5, 45.0,
        ];
        let rsi = compute_rsi(&closes, 14, RsiSmoothing::Simple);
        let values = defined(&rsi);
        assert_eq!(values.len(), 1);
        assert!(rsi[14].is_some());

        // gains 3.75, losses 2.75 over the window
        let value = values[0];
        assert!(value > 40.0 && value < 60.0);
        assert!((value - 57.692307692307686).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn window_only_sees_trailing_deltas() {
        // One early drop followed by 14 rises: the drop leaves the window.
        let mut closes = vec![10.0, 9.0];
        closes.extend((0..15).map(|x| 10.0 + x as f64));
        let rsi = compute_rsi(&closes, 14, RsiSmoothing::Simple);
        assert_eq!(rsi.last().copied().flatten(), Some(100.0));
        assert!(rsi[14].unwrap() < 100.0);
    }

    #[test]
    fn deterministic_output() {
        let closes: Vec<f64> = (0..60).map(|x| 20.0 + ((x * 7) % 11) as f64 * 0.3).collect();
        let a = compute_rsi(&closes, 14, RsiSmoothing::Simple);
        let b = compute_rsi(&closes, 14, RsiSmoothing::Simple);
        assert_eq!(a, b);
    }

    #[test]
    fn latest_rsi_picks_last_defined_value() {
        let closes: Vec<f64> = (1..=20).rev().map(|x| x as f64).collect();
        assert_eq!(latest_rsi(&closes, 14, RsiSmoothing::Simple), Some(0.0));
        assert_eq!(latest_rsi(&closes[..14], 14, RsiSmoothing::Simple), None);
    }

    #[test]
    fn zero_window_yields_nothing() {
        let rsi = compute_rsi(&[1.0, 2.0, 3.0], 0, RsiSmoothing::Simple);
        assert!(rsi.iter().all(Option::is_none));
    }

    #[test]
    fn exponential_variant_is_bounded_with_same_gap() {
        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let rsi = compute_rsi(&closes, 14, RsiSmoothing::Exponential);
        assert_eq!(rsi.len(), closes.len());
        assert!(rsi[..14].iter().all(Option::is_none));
        for value in defined(&rsi) {
            assert!((0.0..=100.0).contains(&value), "RSI {value} out of range");
        }
        assert!(compute_rsi(&closes[..10], 14, RsiSmoothing::Exponential)
            .iter()
            .all(Option::is_none));
    }
}
