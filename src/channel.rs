use log::debug;

use crate::error::{ChannelError, ChannelResult};
use crate::models::{CaseObservation, ChannelThreshold, EPI_WEEKS};
use crate::stats::{mean, percentile, population_std, round_to};

pub const Q1_PERCENTILE: f64 = 25.0;
pub const MEDIAN_PERCENTILE: f64 = 50.0;
pub const Q3_PERCENTILE: f64 = 75.0;
pub const Q85_PERCENTILE: f64 = 85.0;

#[derive(Debug, Clone, PartialEq)]
pub enum WeekSample {
    Observed(Vec<f64>),
    /// The week had no baseline observations; the pooled baseline stands in.
    WholeBaseline(Vec<f64>),
}

impl WeekSample {
    pub fn values(&self) -> &[f64] {
        match self {
            Self::Observed(values) | Self::WholeBaseline(values) => values,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::WholeBaseline(_))
    }
}

pub fn week_sample(baseline: &[CaseObservation], week: u32) -> WeekSample {
    let observed: Vec<f64> = baseline
        .iter()
        .filter(|o| o.epi_week == week)
        .map(|o| o.case_count)
        .collect();

    if observed.is_empty() {
        WeekSample::WholeBaseline(baseline.iter().map(|o| o.case_count).collect())
    } else {
        WeekSample::Observed(observed)
    }
}

pub fn calculate_channel(
    unit: &str,
    baseline: &[CaseObservation],
) -> ChannelResult<Vec<ChannelThreshold>> {
    if baseline.is_empty() {
        return Err(ChannelError::NoBaselineData {
            unit: unit.to_string(),
        });
    }

    let mut channel = Vec::with_capacity(EPI_WEEKS as usize);
    for week in 1..=EPI_WEEKS {
        let sample = week_sample(baseline, week);
        if sample.is_fallback() {
            debug!("{unit}: week {week} has no baseline observations, using pooled baseline");
        }
        channel.push(threshold_from_sample(week, &sample));
    }
    Ok(channel)
}

fn threshold_from_sample(epi_week: u32, sample: &WeekSample) -> ChannelThreshold {
    let values = sample.values();
    let at = |p: f64| round_to(percentile(values, p).unwrap_or(0.0), 1);

    ChannelThreshold {
        epi_week,
        q1: at(Q1_PERCENTILE),
        median: at(MEDIAN_PERCENTILE),
        q3: at(Q3_PERCENTILE),
        q85: at(Q85_PERCENTILE),
        mean: round_to(mean(values).unwrap_or(0.0), 1),
        std: round_to(population_std(values).unwrap_or(0.0), 1),
        n_observations: values.len(),
        used_fallback: sample.is_fallback(),
    }
}
