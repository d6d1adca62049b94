use crate::models::{
    AlertSummary, AlertZone, AnalysisRecord, DashboardSummary, ZoneDistribution, ZoneShare,
};
use crate::stats::round_to;

pub fn alert_summary(records: &[AnalysisRecord]) -> AlertSummary {
    let mut confirmed: Vec<&AnalysisRecord> =
        records.iter().filter(|r| r.is_confirmed_alert).collect();

    if confirmed.is_empty() {
        return AlertSummary {
            total_alert_weeks: 0,
            alert_weeks: Vec::new(),
            max_cases_week: None,
            max_cases: 0.0,
            avg_deviation: 0.0,
            total_excess_cases: 0.0,
        };
    }

    confirmed.sort_by(|a, b| {
        b.case_count
            .partial_cmp(&a.case_count)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let deviations: Vec<f64> = confirmed.iter().filter_map(|r| r.deviation_percent).collect();
    let avg_deviation = if deviations.is_empty() {
        0.0
    } else {
        deviations.iter().sum::<f64>() / deviations.len() as f64
    };
    let excess: f64 = confirmed
        .iter()
        .filter_map(|r| r.deviation_from_median)
        .sum();

    AlertSummary {
        total_alert_weeks: confirmed.len(),
        alert_weeks: confirmed.iter().map(|r| r.epi_week).collect(),
        max_cases_week: Some(confirmed[0].epi_week),
        max_cases: confirmed[0].case_count,
        avg_deviation: round_to(avg_deviation, 1),
        total_excess_cases: round_to(excess, 1),
    }
}

pub fn zone_distribution(records: &[AnalysisRecord]) -> ZoneDistribution {
    let evaluated = records.iter().filter(|r| r.alert_zone.is_some()).count();
    let share = |zone: AlertZone| {
        let count = records
            .iter()
            .filter(|r| r.alert_zone == Some(zone))
            .count();
        ZoneShare {
            count,
            percentage: if evaluated > 0 {
                round_to(count as f64 / evaluated as f64 * 100.0, 1)
            } else {
                0.0
            },
        }
    };

    ZoneDistribution {
        success: share(AlertZone::Success),
        safety: share(AlertZone::Safety),
        alert: share(AlertZone::Alert),
        epidemic: share(AlertZone::Epidemic),
    }
}

/// Percent change from `expected`; a zero expectation reads as 0% when
/// nothing was observed either and 100% otherwise.
pub fn deviation_percentage(observed: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        if observed == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        round_to((observed - expected) / expected * 100.0, 1)
    }
}

pub fn dashboard_summary(records: &[AnalysisRecord]) -> DashboardSummary {
    let total_weeks = records.len();
    let alert_weeks: Vec<u32> = records
        .iter()
        .filter(|r| r.is_alert)
        .map(|r| r.epi_week)
        .collect();
    let latest = records.iter().max_by_key(|r| (r.year, r.epi_week));

    let total_cases: f64 = records.iter().map(|r| r.case_count).sum();
    let expected_cases: f64 = records.iter().filter_map(|r| r.median).sum();

    DashboardSummary {
        total_weeks_monitored: total_weeks,
        total_alert_weeks: alert_weeks.len(),
        current_week: latest.map(|r| r.epi_week),
        current_week_cases: latest.map(|r| r.case_count).unwrap_or(0.0),
        current_week_status: latest.and_then(|r| r.alert_status),
        total_cases_ytd: total_cases,
        expected_cases_ytd: round_to(expected_cases, 1),
        deviation_percent: deviation_percentage(total_cases, expected_cases),
        alert_rate: if total_weeks > 0 {
            round_to(alert_weeks.len() as f64 / total_weeks as f64 * 100.0, 1)
        } else {
            0.0
        },
        alert_weeks_list: alert_weeks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::detect_alerts;
    use crate::config::ChannelConfig;
    use crate::models::{CaseObservation, ChannelThreshold};

    fn channel() -> Vec<ChannelThreshold> {
        (1..=52)
            .map(|epi_week| ChannelThreshold {
                epi_week,
                q1: 5.0,
                median: 10.0,
                q3: 15.0,
                q85: 18.0,
                mean: 10.0,
                std: 3.0,
                n_observations: 5,
                used_fallback: false,
            })
            .collect()
    }

    fn analyse(counts: &[f64]) -> Vec<AnalysisRecord> {
        let current: Vec<CaseObservation> = counts
            .iter()
            .enumerate()
            .map(|(i, c)| CaseObservation::new(2025, i as u32 + 1, *c))
            .collect();
        detect_alerts(&current, &channel(), &ChannelConfig::default())
    }

    #[test]
    fn summary_of_quiet_year_is_empty() {
        let summary = alert_summary(&analyse(&[1.0, 2.0, 3.0]));
        assert_eq!(summary.total_alert_weeks, 0);
        assert!(summary.alert_weeks.is_empty());
        assert_eq!(summary.max_cases_week, None);
    }

    #[test]
    fn summary_orders_alerts_by_cases() {
        let records = analyse(&[20.0, 3.0, 30.0, 16.0]);
        let summary = alert_summary(&records);
        assert_eq!(summary.total_alert_weeks, 3);
        assert_eq!(summary.alert_weeks, vec![3, 1, 4]);
        assert_eq!(summary.max_cases_week, Some(3));
        assert_eq!(summary.max_cases, 30.0);
        // (100 + 200 + 60) / 3
        assert_eq!(summary.avg_deviation, 120.0);
        assert_eq!(summary.total_excess_cases, 36.0);
    }

    #[test]
    fn summaries_do_not_reorder_records() {
        let records = analyse(&[20.0, 3.0, 30.0, 16.0]);
        let before = records.clone();
        let _ = alert_summary(&records);
        let _ = zone_distribution(&records);
        let _ = dashboard_summary(&records);
        assert_eq!(records, before);
    }

    #[test]
    fn zone_distribution_counts_every_zone() {
        let records = analyse(&[20.0, 12.0, 7.0, 2.0]);
        let distribution = zone_distribution(&records);
        for zone in AlertZone::ALL {
            assert_eq!(distribution.get(zone).count, 1);
            assert_eq!(distribution.get(zone).percentage, 25.0);
        }
        let empty = zone_distribution(&[]);
        assert_eq!(empty.epidemic.percentage, 0.0);
    }

    #[test]
    fn dashboard_reports_latest_week() {
        let records = analyse(&[20.0, 12.0, 7.0, 2.0]);
        let dashboard = dashboard_summary(&records);
        assert_eq!(dashboard.total_weeks_monitored, 4);
        assert_eq!(dashboard.total_alert_weeks, 1);
        assert_eq!(dashboard.alert_weeks_list, vec![1]);
        assert_eq!(dashboard.current_week, Some(4));
        assert_eq!(dashboard.current_week_cases, 2.0);
        assert_eq!(dashboard.current_week_status, Some("LOW TRANSMISSION"));
        assert_eq!(dashboard.total_cases_ytd, 41.0);
        assert_eq!(dashboard.expected_cases_ytd, 40.0);
        assert_eq!(dashboard.deviation_percent, 2.5);
        assert_eq!(dashboard.alert_rate, 25.0);
    }

    #[test]
    fn deviation_percentage_handles_zero_expectation() {
        assert_eq!(deviation_percentage(0.0, 0.0), 0.0);
        assert_eq!(deviation_percentage(3.0, 0.0), 100.0);
        assert_eq!(deviation_percentage(15.0, 10.0), 50.0);
    }
}
