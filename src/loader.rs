use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use log::warn;

use crate::models::{CaseObservation, PeriodCases, UnitObservation};
use crate::normalize::{parse_period, safe_float};

const DEFAULT_UNIT: &str = "all";

pub fn load_observations(path: &Path) -> anyhow::Result<Vec<UnitObservation>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open case data {}", path.display()))?;
    read_observations(file).with_context(|| format!("failed to read {}", path.display()))
}

/// Reads weekly case rows. Each row needs `year` and `epi_week`, or a
/// `period` such as `2024W07`; non-numeric counts become zero.
pub fn read_observations<R: Read>(reader: R) -> anyhow::Result<Vec<UnitObservation>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        #[serde(default)]
        orgunit: Option<String>,
        #[serde(default)]
        year: Option<i32>,
        #[serde(default)]
        epi_week: Option<u32>,
        #[serde(default)]
        period: Option<String>,
        #[serde(default, alias = "case_count", alias = "value")]
        confirmed_cases: Option<String>,
    }

    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let week = match (row.year, row.epi_week) {
            (Some(year), Some(week)) => Some((year, week)),
            _ => row.period.as_deref().and_then(parse_period),
        };
        let Some((year, epi_week)) = week else {
            warn!("row {} has no usable year/week; skipping", line + 1);
            continue;
        };

        rows.push(UnitObservation {
            unit: row
                .orgunit
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            observation: CaseObservation::new(
                year,
                epi_week,
                row.confirmed_cases.as_deref().map(safe_float).unwrap_or(0.0),
            ),
        });
    }

    Ok(rows)
}

pub fn load_population(path: &Path) -> anyhow::Result<BTreeMap<String, Option<u64>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open population data {}", path.display()))?;
    read_population(file).with_context(|| format!("failed to read {}", path.display()))
}

pub fn read_population<R: Read>(reader: R) -> anyhow::Result<BTreeMap<String, Option<u64>>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        orgunit: String,
        #[serde(default)]
        population: Option<String>,
    }

    let mut reader = csv::Reader::from_reader(reader);
    let mut population = BTreeMap::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let value = row
            .population
            .as_deref()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64);
        population.insert(row.orgunit, value);
    }

    Ok(population)
}

pub fn load_hierarchy(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open hierarchy {}", path.display()))?;
    read_hierarchy(file).with_context(|| format!("failed to read {}", path.display()))
}

pub fn read_hierarchy<R: Read>(reader: R) -> anyhow::Result<HashMap<String, String>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        facility: String,
        parent: String,
    }

    let mut reader = csv::Reader::from_reader(reader);
    let mut hierarchy = HashMap::new();
    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        hierarchy.insert(row.facility, row.parent);
    }
    Ok(hierarchy)
}

pub fn group_by_unit(rows: &[UnitObservation]) -> BTreeMap<String, Vec<CaseObservation>> {
    let mut grouped: BTreeMap<String, Vec<CaseObservation>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.unit.clone())
            .or_default()
            .push(row.observation);
    }
    grouped
}

/// Splits one unit's series into the baseline window
/// `[current_year - baseline_years, current_year - 1]` and the current
/// year up to `current_week`.
pub fn split_observations(
    series: &[CaseObservation],
    current_year: i32,
    current_week: u32,
    baseline_years: u32,
) -> (Vec<CaseObservation>, Vec<CaseObservation>) {
    let first_year = current_year - baseline_years as i32;
    let baseline = series
        .iter()
        .filter(|o| o.year >= first_year && o.year < current_year)
        .copied()
        .collect();
    let current = series
        .iter()
        .filter(|o| o.year == current_year && o.epi_week <= current_week)
        .copied()
        .collect();
    (baseline, current)
}

pub fn case_totals(rows: &[UnitObservation], year: Option<i32>) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        if year.is_some_and(|y| y != row.observation.year) {
            continue;
        }
        *totals.entry(row.unit.clone()).or_insert(0.0) += row.observation.case_count;
    }
    totals
}

pub fn period_cases(rows: &[UnitObservation], year: Option<i32>) -> Vec<PeriodCases> {
    rows.iter()
        .filter(|row| year.map_or(true, |y| y == row.observation.year))
        .map(|row| PeriodCases {
            unit: row.unit.clone(),
            period: format!("{}W{:02}", row.observation.year, row.observation.epi_week),
            cases: row.observation.case_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_year_week_and_period_rows() {
        let data = "orgunit,year,epi_week,period,confirmed_cases\n\
                    Gulu,2024,3,,12\n\
                    Gulu,,,2024W04,n/a\n\
                    Lira,2023,52,,7.5\n\
                    Lira,,,garbage,4\n";
        let rows = read_observations(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].observation, CaseObservation::new(2024, 3, 12.0));
        assert_eq!(rows[1].observation, CaseObservation::new(2024, 4, 0.0));
        assert_eq!(rows[2].unit, "Lira");
    }

    #[test]
    fn accepts_case_count_header_without_unit() {
        let data = "year,epi_week,case_count\n2022,1,3\n";
        let rows = read_observations(data.as_bytes()).unwrap();
        assert_eq!(rows[0].unit, "all");
        assert_eq!(rows[0].observation.case_count, 3.0);
    }

    #[test]
    fn population_blanks_are_unknown() {
        let data = "orgunit,population\nGulu,325000\nLira,\nKitgum,unknown\n";
        let population = read_population(data.as_bytes()).unwrap();
        assert_eq!(population["Gulu"], Some(325000));
        assert_eq!(population["Lira"], None);
        assert_eq!(population["Kitgum"], None);
    }

    #[test]
    fn reads_facility_hierarchy() {
        let data = "facility,parent\nAwach HC,Gulu\nLalogi HC,Gulu\n";
        let hierarchy = read_hierarchy(data.as_bytes()).unwrap();
        assert_eq!(hierarchy.len(), 2);
        assert_eq!(hierarchy["Awach HC"], "Gulu");
    }

    #[test]
    fn splits_baseline_window_and_current_cutoff() {
        let series: Vec<CaseObservation> = (2017..=2025)
            .flat_map(|year| (1..=52).map(move |week| CaseObservation::new(year, week, 1.0)))
            .collect();
        let (baseline, current) = split_observations(&series, 2025, 10, 5);
        assert_eq!(baseline.len(), 5 * 52);
        assert!(baseline.iter().all(|o| (2020..=2024).contains(&o.year)));
        assert_eq!(current.len(), 10);
    }

    #[test]
    fn totals_and_periods_by_unit() {
        let data = "orgunit,year,epi_week,confirmed_cases\n\
                    Gulu,2024,1,5\nGulu,2024,2,6\nGulu,2023,2,100\nLira,2024,1,2\n";
        let rows = read_observations(data.as_bytes()).unwrap();
        let totals = case_totals(&rows, Some(2024));
        assert_eq!(totals["Gulu"], 11.0);
        assert_eq!(totals["Lira"], 2.0);
        assert_eq!(case_totals(&rows, None)["Gulu"], 111.0);

        let periods = period_cases(&rows, Some(2024));
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].period, "2024W01");

        let grouped = group_by_unit(&rows);
        assert_eq!(grouped["Gulu"].len(), 3);
    }
}
