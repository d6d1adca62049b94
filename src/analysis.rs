use log::{debug, warn};
use serde::Serialize;

use crate::alerts::detect_alerts;
use crate::channel::calculate_channel;
use crate::compare::compare_years;
use crate::config::ChannelConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::models::{
    AlertSummary, AnalysisRecord, BaselineValidation, CaseObservation, ChannelThreshold,
    DashboardSummary, ThresholdPercentile, Trend, YearComparison, ZoneDistribution,
};
use crate::normalize::{interpolate_baseline, validate_baseline};
use crate::summary::{alert_summary, dashboard_summary, zone_distribution};
use crate::trend::get_trend_indicator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisMetadata {
    pub unit: String,
    pub current_year: i32,
    pub threshold: ThresholdPercentile,
    pub consecutive_weeks: usize,
    pub baseline_years: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAnalysis {
    pub metadata: AnalysisMetadata,
    pub validation: BaselineValidation,
    pub channel: Vec<ChannelThreshold>,
    pub analysis: Vec<AnalysisRecord>,
    pub alert_summary: AlertSummary,
    pub zone_distribution: ZoneDistribution,
    pub year_comparisons: YearComparison,
    pub trend: Trend,
    pub dashboard: DashboardSummary,
}

/// `current` is expected to be cut at the current week by the caller.
pub fn analyze_unit(
    unit: &str,
    current_year: i32,
    baseline: &[CaseObservation],
    current: &[CaseObservation],
    config: &ChannelConfig,
) -> ChannelResult<ChannelAnalysis> {
    config.validate()?;

    if baseline.is_empty() {
        return Err(ChannelError::NoBaselineData {
            unit: unit.to_string(),
        });
    }
    if current.is_empty() {
        return Err(ChannelError::NoCurrentData {
            unit: unit.to_string(),
        });
    }

    let validation = validate_baseline(baseline, config.min_baseline_weeks);
    if !validation.is_valid {
        warn!("{unit}: {}", validation.message);
    }

    let max_gap = if config.interpolate_missing {
        config.max_interpolation_gap
    } else {
        0
    };
    let prepared = interpolate_baseline(baseline, max_gap);

    let mut current = current.to_vec();
    current.sort_by_key(|o| (o.year, o.epi_week));

    let channel = calculate_channel(unit, &prepared)?;
    let analysis = detect_alerts(&current, &channel, config);
    debug!(
        "{unit}: {} weeks analysed, {} raw alerts",
        analysis.len(),
        analysis.iter().filter(|r| r.is_alert).count()
    );

    let mut baseline_years: Vec<i32> = prepared.iter().map(|o| o.year).collect();
    baseline_years.sort_unstable();
    baseline_years.dedup();

    Ok(ChannelAnalysis {
        metadata: AnalysisMetadata {
            unit: unit.to_string(),
            current_year,
            threshold: config.threshold_percentile,
            consecutive_weeks: config.consecutive_weeks,
            baseline_years,
        },
        validation,
        alert_summary: alert_summary(&analysis),
        zone_distribution: zone_distribution(&analysis),
        year_comparisons: compare_years(&prepared, &current, &channel),
        trend: get_trend_indicator(&analysis, config.trend_window),
        dashboard: dashboard_summary(&analysis),
        channel,
        analysis,
    })
}
