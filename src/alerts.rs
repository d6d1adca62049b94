use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::config::ChannelConfig;
use crate::models::{AlertZone, AnalysisRecord, CaseObservation, ChannelThreshold};
use crate::stats::{ratio_or, round_to};

pub const OUTLIER_Z: f64 = 2.0;

pub fn detect_alerts(
    current: &[CaseObservation],
    channel: &[ChannelThreshold],
    config: &ChannelConfig,
) -> Vec<AnalysisRecord> {
    let by_week: HashMap<u32, &ChannelThreshold> =
        channel.iter().map(|row| (row.epi_week, row)).collect();

    let mut records: Vec<AnalysisRecord> = current
        .iter()
        .map(|observation| match by_week.get(&observation.epi_week) {
            Some(row) => evaluate_week(observation, row, config),
            None => {
                debug!(
                    "week {} of {} has no channel row; skipping evaluation",
                    observation.epi_week, observation.year
                );
                unmatched_week(observation)
            }
        })
        .collect();

    let confirmed = if config.apply_consecutive_rule {
        let raw: Vec<u32> = records
            .iter()
            .filter(|r| r.is_alert)
            .map(|r| r.epi_week)
            .collect();
        detect_consecutive_alerts(&raw, config.consecutive_weeks)
    } else {
        records
            .iter()
            .filter(|r| r.is_alert)
            .map(|r| r.epi_week)
            .collect()
    };

    for record in records.iter_mut() {
        record.is_confirmed_alert = record.is_alert && confirmed.contains(&record.epi_week);
    }
    records
}

fn evaluate_week(
    observation: &CaseObservation,
    row: &ChannelThreshold,
    config: &ChannelConfig,
) -> AnalysisRecord {
    let cases = observation.case_count;
    let threshold = config.threshold_percentile.pick(row);
    let zone = AlertZone::classify(cases, row.q1, row.median, row.q3);
    let deviation = cases - row.median;
    let z_score = round_to(ratio_or(cases - row.mean, row.std, 0.0), 2);

    AnalysisRecord {
        year: observation.year,
        epi_week: observation.epi_week,
        case_count: cases,
        q1: Some(row.q1),
        median: Some(row.median),
        q3: Some(row.q3),
        q85: Some(row.q85),
        mean: Some(row.mean),
        std: Some(row.std),
        threshold_value: Some(threshold),
        is_alert: cases > threshold,
        alert_zone: Some(zone),
        alert_color: Some(zone.color()),
        alert_status: Some(zone.status()),
        deviation_from_median: Some(deviation),
        deviation_percent: Some(round_to(ratio_or(deviation, row.median, 0.0) * 100.0, 1)),
        z_score: Some(z_score),
        is_statistical_outlier: z_score.abs() > OUTLIER_Z,
        is_confirmed_alert: false,
    }
}

fn unmatched_week(observation: &CaseObservation) -> AnalysisRecord {
    AnalysisRecord {
        year: observation.year,
        epi_week: observation.epi_week,
        case_count: observation.case_count,
        q1: None,
        median: None,
        q3: None,
        q85: None,
        mean: None,
        std: None,
        threshold_value: None,
        is_alert: false,
        alert_zone: None,
        alert_color: None,
        alert_status: None,
        deviation_from_median: None,
        deviation_percent: None,
        z_score: None,
        is_statistical_outlier: false,
        is_confirmed_alert: false,
    }
}

/// Weeks belonging to a run of at least `consecutive_weeks` consecutive
/// alert weeks. The result is a set: callers must not rely on its order.
pub fn detect_consecutive_alerts(alert_weeks: &[u32], consecutive_weeks: usize) -> HashSet<u32> {
    if consecutive_weeks <= 1 {
        return alert_weeks.iter().copied().collect();
    }

    let sorted: Vec<u32> = alert_weeks
        .iter()
        .copied()
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();

    let mut confirmed = HashSet::new();
    let mut run_start = 0;
    for idx in 1..=sorted.len() {
        let run_continues = idx < sorted.len() && sorted[idx] == sorted[idx - 1] + 1;
        if run_continues {
            continue;
        }
        if idx - run_start >= consecutive_weeks {
            confirmed.extend(&sorted[run_start..idx]);
        }
        run_start = idx;
    }
    confirmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::calculate_channel;
    use crate::models::ThresholdPercentile;
    use proptest::prelude::*;

    fn row(epi_week: u32, q1: f64, median: f64, q3: f64, q85: f64) -> ChannelThreshold {
        ChannelThreshold {
            epi_week,
            q1,
            median,
            q3,
            q85,
            mean: median,
            std: 2.0,
            n_observations: 5,
            used_fallback: false,
        }
    }

    fn week(epi_week: u32, cases: f64) -> CaseObservation {
        CaseObservation::new(2025, epi_week, cases)
    }

    fn set(weeks: &[u32]) -> HashSet<u32> {
        weeks.iter().copied().collect()
    }

    #[test]
    fn value_equal_to_threshold_is_not_an_alert() {
        let channel = vec![row(1, 5.0, 10.0, 15.0, 18.0)];
        let config = ChannelConfig::default();
        let records = detect_alerts(&[week(1, 15.0)], &channel, &config);
        assert!(!records[0].is_alert);
        assert_eq!(records[0].alert_zone, Some(AlertZone::Alert));

        let records = detect_alerts(&[week(1, 15.0 + 1e-9)], &channel, &config);
        assert!(records[0].is_alert);
        assert_eq!(records[0].alert_zone, Some(AlertZone::Epidemic));
    }

    #[test]
    fn q85_threshold_raises_the_bar() {
        let channel = vec![row(1, 5.0, 10.0, 15.0, 18.0)];
        let config = ChannelConfig {
            threshold_percentile: ThresholdPercentile::Q85,
            ..ChannelConfig::default()
        };
        let records = detect_alerts(&[week(1, 17.0)], &channel, &config);
        assert!(!records[0].is_alert);
        assert_eq!(records[0].threshold_value, Some(18.0));
        assert_eq!(records[0].alert_zone, Some(AlertZone::Epidemic));
    }

    #[test]
    fn zones_follow_breakpoint_priority() {
        let channel = vec![row(1, 5.0, 10.0, 15.0, 18.0)];
        let config = ChannelConfig::default();
        let zones: Vec<_> = [20.0, 12.0, 7.0, 5.0, 0.0]
            .iter()
            .map(|c| detect_alerts(&[week(1, *c)], &channel, &config)[0].alert_zone)
            .collect();
        assert_eq!(
            zones,
            vec![
                Some(AlertZone::Epidemic),
                Some(AlertZone::Alert),
                Some(AlertZone::Safety),
                Some(AlertZone::Success),
                Some(AlertZone::Success),
            ]
        );
        let record = &detect_alerts(&[week(1, 20.0)], &channel, &config)[0];
        assert_eq!(record.alert_color, Some("#e74c3c"));
        assert_eq!(record.alert_status, Some("EPIDEMIC ALERT"));
    }

    #[test]
    fn flat_baseline_guards_divisions() {
        let baseline: Vec<CaseObservation> = (2020..2025)
            .flat_map(|y| (1..=52).map(move |w| CaseObservation::new(y, w, 10.0)))
            .collect();
        let channel = calculate_channel("flat", &baseline).unwrap();
        let records = detect_alerts(&[week(3, 20.0)], &channel, &ChannelConfig::default());
        let record = &records[0];
        assert!(record.is_alert);
        assert_eq!(record.z_score, Some(0.0));
        assert!(!record.is_statistical_outlier);
        assert_eq!(record.deviation_percent, Some(100.0));
        assert_eq!(record.deviation_from_median, Some(10.0));
    }

    #[test]
    fn zero_median_yields_zero_deviation_percent() {
        let channel = vec![row(1, 0.0, 0.0, 0.0, 0.0)];
        let records = detect_alerts(&[week(1, 4.0)], &channel, &ChannelConfig::default());
        assert_eq!(records[0].deviation_percent, Some(0.0));
        assert!(records[0].is_alert);
    }

    #[test]
    fn z_score_flags_outliers() {
        let channel = vec![row(1, 5.0, 10.0, 15.0, 18.0)];
        let records = detect_alerts(&[week(1, 15.0)], &channel, &ChannelConfig::default());
        assert_eq!(records[0].z_score, Some(2.5));
        assert!(records[0].is_statistical_outlier);
    }

    #[test]
    fn weeks_without_channel_row_are_not_evaluated() {
        let channel = vec![row(1, 5.0, 10.0, 15.0, 18.0)];
        let records = detect_alerts(&[week(53, 400.0)], &channel, &ChannelConfig::default());
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_alert);
        assert!(!records[0].is_confirmed_alert);
        assert_eq!(records[0].alert_zone, None);
        assert_eq!(records[0].z_score, None);
    }

    #[test]
    fn consecutive_rule_keeps_whole_runs() {
        assert_eq!(detect_consecutive_alerts(&[1, 2, 3, 5, 6], 2), set(&[1, 2, 3, 5, 6]));
        assert_eq!(detect_consecutive_alerts(&[1, 3, 5], 2), set(&[]));
        assert_eq!(detect_consecutive_alerts(&[1, 2, 3, 5, 6], 3), set(&[1, 2, 3]));
        assert_eq!(detect_consecutive_alerts(&[6, 5, 5, 9], 2), set(&[5, 6]));
        assert_eq!(detect_consecutive_alerts(&[4, 9], 1), set(&[4, 9]));
        assert_eq!(detect_consecutive_alerts(&[], 2), set(&[]));
    }

    #[test]
    fn confirmation_applies_consecutive_rule() {
        let channel: Vec<ChannelThreshold> = (1..=6).map(|w| row(w, 5.0, 10.0, 15.0, 18.0)).collect();
        let current: Vec<CaseObservation> = [20.0, 21.0, 3.0, 30.0, 4.0, 4.0]
            .iter()
            .enumerate()
            .map(|(i, c)| week(i as u32 + 1, *c))
            .collect();

        let immediate = detect_alerts(&current, &channel, &ChannelConfig::default());
        let confirmed: Vec<u32> = immediate
            .iter()
            .filter(|r| r.is_confirmed_alert)
            .map(|r| r.epi_week)
            .collect();
        assert_eq!(confirmed, vec![1, 2, 4]);

        let config = ChannelConfig::default().with_consecutive_weeks(2);
        let ruled = detect_alerts(&current, &channel, &config);
        let confirmed: Vec<u32> = ruled
            .iter()
            .filter(|r| r.is_confirmed_alert)
            .map(|r| r.epi_week)
            .collect();
        assert_eq!(confirmed, vec![1, 2]);
        assert!(ruled[3].is_alert);
    }

    proptest! {
        #[test]
        fn confirmed_weeks_are_alerts_in_long_enough_runs(
            weeks in proptest::collection::btree_set(1u32..=52, 0..30),
            n in 1usize..5,
        ) {
            let input: Vec<u32> = weeks.iter().copied().collect();
            let confirmed = detect_consecutive_alerts(&input, n);
            for week in &confirmed {
                prop_assert!(weeks.contains(week));
                let mut lo = *week;
                while lo > 1 && weeks.contains(&(lo - 1)) {
                    lo -= 1;
                }
                let mut hi = *week;
                while weeks.contains(&(hi + 1)) {
                    hi += 1;
                }
                prop_assert!((hi - lo + 1) as usize >= n);
            }
            if n == 1 {
                prop_assert_eq!(confirmed.len(), weeks.len());
            }
        }
    }
}
