use crate::models::{AnalysisRecord, Trend};

const RISE_FACTOR: f64 = 1.1;
const FALL_FACTOR: f64 = 0.9;

pub fn get_trend_indicator(records: &[AnalysisRecord], window: usize) -> Trend {
    let counts: Vec<f64> = records.iter().map(|r| r.case_count).collect();
    trend_from_counts(&counts, window)
}

/// Compares the moving average of the last `window` points with the one
/// ending a step earlier. The two windows share `window - 1` points.
pub fn trend_from_counts(counts: &[f64], window: usize) -> Trend {
    if window == 0 || counts.len() < window + 1 {
        return Trend::InsufficientData;
    }

    let n = counts.len();
    let average = |slice: &[f64]| slice.iter().sum::<f64>() / window as f64;
    let recent = average(&counts[n - window..]);
    let previous = average(&counts[n - 1 - window..n - 1]);

    if recent > previous * RISE_FACTOR {
        Trend::Increasing
    } else if recent < previous * FALL_FACTOR {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}
