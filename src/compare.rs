use std::collections::{BTreeMap, HashMap};

use crate::models::{
    CaseObservation, ChannelThreshold, CurrentYearTotals, YearComparison, YearTotals,
};
use crate::stats::{mean, ratio_or, round_to};

/// Totals per baseline year set against the current year.
///
/// The baseline average total is the pooled baseline sum divided by the
/// number of baseline years, not the mean of the yearly totals.
pub fn compare_years(
    baseline: &[CaseObservation],
    current: &[CaseObservation],
    channel: &[ChannelThreshold],
) -> YearComparison {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for observation in baseline {
        by_year
            .entry(observation.year)
            .or_default()
            .push(observation.case_count);
    }

    let years: BTreeMap<i32, YearTotals> = by_year
        .iter()
        .map(|(year, counts)| (*year, totals(counts)))
        .collect();

    let baseline_counts: Vec<f64> = baseline.iter().map(|o| o.case_count).collect();
    let baseline_total: f64 = baseline_counts.iter().sum();
    let baseline_avg_total = ratio_or(baseline_total, by_year.len() as f64, 0.0);

    let medians: HashMap<u32, f64> = channel.iter().map(|r| (r.epi_week, r.median)).collect();
    let current_counts: Vec<f64> = current.iter().map(|o| o.case_count).collect();
    let current_total: f64 = current_counts.iter().sum();
    let expected: f64 = current
        .iter()
        .filter_map(|o| medians.get(&o.epi_week))
        .sum();

    YearComparison {
        years,
        current: CurrentYearTotals {
            total_cases: current_total,
            avg_weekly: round_to(mean(&current_counts).unwrap_or(0.0), 1),
            weeks_reported: current.len(),
            expected_cases: round_to(expected, 1),
            percent_vs_baseline: round_to(
                ratio_or(current_total - baseline_avg_total, baseline_avg_total, 0.0) * 100.0,
                1,
            ),
        },
        baseline_avg: YearTotals {
            total_cases: round_to(baseline_avg_total, 1),
            avg_weekly: round_to(mean(&baseline_counts).unwrap_or(0.0), 1),
        },
    }
}

fn totals(counts: &[f64]) -> YearTotals {
    YearTotals {
        total_cases: counts.iter().sum(),
        avg_weekly: round_to(mean(counts).unwrap_or(0.0), 1),
    }
}
