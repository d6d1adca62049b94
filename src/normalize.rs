use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::{debug, warn};

use crate::models::{
    BaselineValidation, CaseObservation, InterpolatedWeek, UnitObservation, YearCoverage,
    EPI_WEEKS,
};

pub fn safe_float(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

pub fn validate_baseline(dataset: &[CaseObservation], min_weeks: usize) -> BaselineValidation {
    let mut weeks_by_year: BTreeMap<i32, BTreeSet<u32>> = BTreeMap::new();
    for observation in dataset {
        weeks_by_year
            .entry(observation.year)
            .or_default()
            .insert(observation.epi_week);
    }

    let coverage: BTreeMap<i32, YearCoverage> = weeks_by_year
        .into_iter()
        .map(|(year, weeks)| {
            let weeks_present = weeks.len();
            (
                year,
                YearCoverage {
                    weeks_present,
                    coverage_percent: weeks_present as f64 / EPI_WEEKS as f64 * 100.0,
                    is_sufficient: weeks_present >= min_weeks,
                },
            )
        })
        .collect();

    let insufficient: Vec<i32> = coverage
        .iter()
        .filter(|(_, stats)| !stats.is_sufficient)
        .map(|(year, _)| *year)
        .collect();

    if insufficient.is_empty() {
        BaselineValidation {
            is_valid: true,
            message: "Baseline data validation passed".to_string(),
            coverage,
        }
    } else {
        BaselineValidation {
            is_valid: false,
            message: format!(
                "Insufficient data for years: {insufficient:?}. Minimum {min_weeks} weeks required."
            ),
            coverage,
        }
    }
}

/// Lays one year's observations over weeks 1..=52 and fills every gap of at
/// most `max_gap` weeks: interior gaps linearly, a trailing gap with the last
/// reported value. Longer gaps and a leading gap stay missing. Repeated
/// weeks are summed.
pub fn interpolate_missing_weeks(series: &[CaseObservation], max_gap: usize) -> Vec<InterpolatedWeek> {
    let len = EPI_WEEKS as usize;
    let mut values: Vec<Option<f64>> = vec![None; len];
    for observation in series {
        if (1..=EPI_WEEKS).contains(&observation.epi_week) {
            let slot = &mut values[observation.epi_week as usize - 1];
            if let Some(existing) = slot {
                warn!(
                    "duplicate rows for {} week {}; summing",
                    observation.year, observation.epi_week
                );
                *existing += observation.case_count;
            } else {
                *slot = Some(observation.case_count);
            }
        }
    }

    let mut interpolated = vec![false; len];
    let mut idx = 0;
    while idx < len {
        if values[idx].is_some() {
            idx += 1;
            continue;
        }
        let start = idx;
        while idx < len && values[idx].is_none() {
            idx += 1;
        }
        let gap = idx - start;
        if start == 0 || gap > max_gap {
            continue;
        }
        if idx == len {
            let last = values[start - 1];
            for slot in start..idx {
                values[slot] = last;
                interpolated[slot] = true;
            }
            continue;
        }
        if let (Some(left), Some(right)) = (values[start - 1], values[idx]) {
            let step = (right - left) / (gap + 1) as f64;
            for (offset, slot) in (start..idx).enumerate() {
                values[slot] = Some(left + step * (offset + 1) as f64);
                interpolated[slot] = true;
            }
        }
    }

    values
        .into_iter()
        .zip(interpolated)
        .enumerate()
        .map(|(i, (case_count, is_interpolated))| InterpolatedWeek {
            epi_week: i as u32 + 1,
            case_count,
            is_interpolated,
        })
        .collect()
}

/// Fills short gaps year by year and drops weeks that remain missing.
pub fn interpolate_baseline(baseline: &[CaseObservation], max_gap: usize) -> Vec<CaseObservation> {
    let mut by_year: BTreeMap<i32, Vec<CaseObservation>> = BTreeMap::new();
    for observation in baseline {
        by_year.entry(observation.year).or_default().push(*observation);
    }

    let mut filled = Vec::with_capacity(baseline.len());
    for (year, series) in by_year {
        let weeks = interpolate_missing_weeks(&series, max_gap);
        let added = weeks.iter().filter(|w| w.is_interpolated).count();
        if added > 0 {
            debug!("interpolated {added} missing weeks in baseline year {year}");
        }
        filled.extend(weeks.into_iter().filter_map(|week| {
            week.case_count
                .map(|count| CaseObservation::new(year, week.epi_week, count))
        }));
    }
    filled
}

pub fn aggregate_to_parent(
    rows: &[UnitObservation],
    hierarchy: &HashMap<String, String>,
) -> BTreeMap<String, Vec<CaseObservation>> {
    let mut totals: BTreeMap<String, BTreeMap<(i32, u32), f64>> = BTreeMap::new();
    for row in rows {
        let Some(parent) = hierarchy.get(&row.unit) else {
            debug!("facility {} has no parent unit; skipping", row.unit);
            continue;
        };
        *totals
            .entry(parent.clone())
            .or_default()
            .entry((row.observation.year, row.observation.epi_week))
            .or_insert(0.0) += row.observation.case_count;
    }

    totals
        .into_iter()
        .map(|(parent, weeks)| {
            let series = weeks
                .into_iter()
                .map(|((year, week), count)| CaseObservation::new(year, week, count))
                .collect();
            (parent, series)
        })
        .collect()
}

pub fn epi_week_of(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

pub fn epi_week_start(year: i32, week: u32) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
}

pub fn format_week_label(week: u32) -> String {
    format!("Week {week:02}")
}

pub fn format_week_range(year: i32, week: u32) -> String {
    match epi_week_start(year, week) {
        Some(start) => {
            let end = start + Duration::days(6);
            format!(
                "Week {week:02} ({} - {})",
                start.format("%b %d"),
                end.format("%b %d")
            )
        }
        None => format_week_label(week),
    }
}

pub fn parse_period(period: &str) -> Option<(i32, u32)> {
    let (year, week) = period.trim().split_once('W')?;
    if year.len() != 4 {
        return None;
    }
    let year = year.parse().ok()?;
    let week: u32 = week.parse().ok()?;
    (1..=53).contains(&week).then_some((year, week))
}
