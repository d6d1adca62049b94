use std::collections::BTreeMap;

use log::debug;

use crate::models::{
    ClassThresholds, IncidenceRecord, PeriodCases, RankedUnit, RiskTier, UnitClass,
    WeeklyIncidence,
};
use crate::stats::{percentile, round_to};

pub const DEFAULT_MULTIPLIER: f64 = 1000.0;

/// Cases per `multiplier` population, or `None` when the population is
/// unknown or not positive.
pub fn calculate_incidence(cases: f64, population: Option<f64>, multiplier: f64) -> Option<f64> {
    match population {
        Some(population) if population > 0.0 => {
            Some(round_to(cases / population * multiplier, 2))
        }
        _ => None,
    }
}

/// Assigns every unit a tier based on where its incidence sits among the
/// valid incidences.
///
/// Fewer than four valid values fall back to a median split; none at all
/// leaves every unit as `NO_DATA`.
pub fn calculate_quartile_classification(
    incidence_by_unit: &BTreeMap<String, Option<f64>>,
) -> (BTreeMap<String, UnitClass>, ClassThresholds) {
    let valid: Vec<f64> = incidence_by_unit.values().flatten().copied().collect();

    if valid.is_empty() {
        let classes = incidence_by_unit
            .keys()
            .map(|unit| (unit.clone(), UnitClass::new(RiskTier::NoData, None)))
            .collect();
        return (classes, ClassThresholds::Unavailable {});
    }

    if valid.len() < 4 {
        let median = percentile(&valid, 50.0).unwrap_or(0.0);
        debug!(
            "only {} valid incidences; classifying around median {median}",
            valid.len()
        );
        let classes = incidence_by_unit
            .iter()
            .map(|(unit, incidence)| {
                let tier = match incidence {
                    None => RiskTier::NoData,
                    Some(value) if *value <= median => RiskTier::Low,
                    Some(_) => RiskTier::High,
                };
                (unit.clone(), UnitClass::new(tier, *incidence))
            })
            .collect();
        return (classes, ClassThresholds::Median { median });
    }

    let q25 = percentile(&valid, 25.0).unwrap_or(0.0);
    let q50 = percentile(&valid, 50.0).unwrap_or(0.0);
    let q75 = percentile(&valid, 75.0).unwrap_or(0.0);

    let classes = incidence_by_unit
        .iter()
        .map(|(unit, incidence)| {
            let tier = match incidence {
                None => RiskTier::NoData,
                Some(value) if *value <= q25 => RiskTier::Q1,
                Some(value) if *value <= q50 => RiskTier::Q2,
                Some(value) if *value <= q75 => RiskTier::Q3,
                Some(_) => RiskTier::Q4,
            };
            (
                unit.clone(),
                UnitClass::new(tier, incidence.map(|v| round_to(v, 2))),
            )
        })
        .collect();

    (
        classes,
        ClassThresholds::Quartiles {
            q25: round_to(q25, 2),
            q50: round_to(q50, 2),
            q75: round_to(q75, 2),
        },
    )
}

/// Valid units ranked from highest to lowest incidence. Ties keep the
/// map's key order.
pub fn rank_orgunits_by_incidence(incidence_by_unit: &BTreeMap<String, Option<f64>>) -> Vec<RankedUnit> {
    let mut valid: Vec<(&String, f64)> = incidence_by_unit
        .iter()
        .filter_map(|(unit, incidence)| incidence.map(|value| (unit, value)))
        .collect();

    valid.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    valid
        .into_iter()
        .enumerate()
        .map(|(idx, (unit, incidence))| RankedUnit {
            unit: unit.clone(),
            incidence,
            rank: idx + 1,
        })
        .collect()
}

pub fn calculate_weekly_incidence(
    rows: &[PeriodCases],
    population: &BTreeMap<String, Option<u64>>,
    multiplier: f64,
) -> Vec<WeeklyIncidence> {
    rows.iter()
        .map(|row| {
            let pop = population.get(&row.unit).copied().flatten();
            WeeklyIncidence {
                unit: row.unit.clone(),
                period: row.period.clone(),
                cases: row.cases,
                population: pop,
                incidence: calculate_incidence(row.cases, pop.map(|p| p as f64), multiplier),
            }
        })
        .collect()
}

/// Units present in either map appear once; a unit with no case total is
/// treated as zero cases.
pub fn build_incidence_records(
    cases: &BTreeMap<String, f64>,
    population: &BTreeMap<String, Option<u64>>,
    multiplier: f64,
) -> (Vec<IncidenceRecord>, ClassThresholds) {
    let mut units: Vec<&String> = cases.keys().chain(population.keys()).collect();
    units.sort();
    units.dedup();

    let incidence: BTreeMap<String, Option<f64>> = units
        .iter()
        .map(|unit| {
            let total = cases.get(*unit).copied().unwrap_or(0.0);
            let pop = population.get(*unit).copied().flatten();
            (
                (*unit).clone(),
                calculate_incidence(total, pop.map(|p| p as f64), multiplier),
            )
        })
        .collect();

    let (classes, thresholds) = calculate_quartile_classification(&incidence);

    let records = units
        .into_iter()
        .map(|unit| {
            let tier = classes
                .get(unit)
                .map(|c| c.quartile)
                .unwrap_or(RiskTier::NoData);
            IncidenceRecord {
                unit: unit.clone(),
                cases: cases.get(unit).copied().unwrap_or(0.0),
                population: population.get(unit).copied().flatten(),
                incidence_per_1000: incidence.get(unit).copied().flatten(),
                quartile_label: tier,
                color: tier.color(),
            }
        })
        .collect();

    (records, thresholds)
}
