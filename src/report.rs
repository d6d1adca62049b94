use std::fmt::Write;
use std::io;

use crate::analysis::ChannelAnalysis;
use crate::models::{AlertZone, ClassThresholds, IncidenceRecord, RankedUnit};
use crate::normalize::format_week_range;

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

pub fn build_report(result: &ChannelAnalysis) -> String {
    let meta = &result.metadata;
    let mut output = String::new();

    let _ = writeln!(output, "# Endemic Channel Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}), threshold {}, baseline years {:?}",
        meta.unit,
        meta.current_year,
        meta.threshold.as_str(),
        meta.baseline_years
    );
    if !result.validation.is_valid {
        let _ = writeln!(output);
        let _ = writeln!(output, "> Warning: {}", result.validation.message);
    }

    let dashboard = &result.dashboard;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Situation");
    match dashboard.current_week {
        Some(week) => {
            let _ = writeln!(
                output,
                "- {}: {} cases ({})",
                format_week_range(meta.current_year, week),
                dashboard.current_week_cases,
                dashboard.current_week_status.unwrap_or("NOT EVALUATED")
            );
        }
        None => {
            let _ = writeln!(output, "- No weeks monitored.");
        }
    }
    let _ = writeln!(
        output,
        "- Year to date: {} cases against {} expected ({:+.1}%)",
        dashboard.total_cases_ytd, dashboard.expected_cases_ytd, dashboard.deviation_percent
    );
    let _ = writeln!(
        output,
        "- Alert rate: {:.1}% of {} weeks, trend {}",
        dashboard.alert_rate,
        dashboard.total_weeks_monitored,
        result.trend.as_str()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Confirmed Alerts");
    let summary = &result.alert_summary;
    if summary.total_alert_weeks == 0 {
        let _ = writeln!(output, "No confirmed alerts this year.");
    } else {
        let _ = writeln!(
            output,
            "- {} weeks, peak in week {} with {} cases",
            summary.total_alert_weeks,
            summary.max_cases_week.unwrap_or_default(),
            summary.max_cases
        );
        let _ = writeln!(
            output,
            "- Average deviation {:.1}%, {:.1} excess cases above median",
            summary.avg_deviation, summary.total_excess_cases
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Zone Distribution");
    for zone in AlertZone::ALL.iter().rev() {
        let share = result.zone_distribution.get(*zone);
        let _ = writeln!(
            output,
            "- {}: {} weeks ({:.1}%)",
            zone.name(),
            share.count,
            share.percentage
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Year Comparison");
    for (year, totals) in &result.year_comparisons.years {
        let _ = writeln!(
            output,
            "- {}: {} cases ({:.1} per week)",
            year, totals.total_cases, totals.avg_weekly
        );
    }
    let comparison = &result.year_comparisons;
    let _ = writeln!(
        output,
        "- Baseline average: {:.1} cases; current {} cases ({:+.1}%)",
        comparison.baseline_avg.total_cases,
        comparison.current.total_cases,
        comparison.current.percent_vs_baseline
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Detail");
    let _ = writeln!(output, "| Week | Cases | Median | Q3 | Zone | Deviation % | Z |");
    let _ = writeln!(output, "|---|---|---|---|---|---|---|");
    for record in &result.analysis {
        let flag = if record.is_confirmed_alert { " *" } else { "" };
        let _ = writeln!(
            output,
            "| {}{} | {} | {} | {} | {} | {} | {} |",
            record.epi_week,
            flag,
            record.case_count,
            fmt_opt(record.median),
            fmt_opt(record.q3),
            record.alert_status.unwrap_or("-"),
            fmt_opt(record.deviation_percent),
            record
                .z_score
                .map_or_else(|| "-".to_string(), |z| format!("{z:.2}"))
        );
    }

    output
}

pub fn build_incidence_report(
    records: &[IncidenceRecord],
    thresholds: &ClassThresholds,
    ranked: &[RankedUnit],
    limit: usize,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Incidence Classification");
    match thresholds {
        ClassThresholds::Quartiles { q25, q50, q75 } => {
            let _ = writeln!(output, "Quartile breakpoints: {q25} / {q50} / {q75} per 1,000");
        }
        ClassThresholds::Median { median } => {
            let _ = writeln!(output, "Too few units for quartiles; median split at {median} per 1,000");
        }
        ClassThresholds::Unavailable {} => {
            let _ = writeln!(output, "No unit has a usable population.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Incidence");
    if ranked.is_empty() {
        let _ = writeln!(output, "No units with incidence data.");
    } else {
        for unit in ranked.iter().take(limit) {
            let _ = writeln!(
                output,
                "{}. {} ({:.2} per 1,000)",
                unit.rank, unit.unit, unit.incidence
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Units");
    for record in records {
        let _ = writeln!(
            output,
            "- {}: {} cases, population {}, incidence {}, {}",
            record.unit,
            record.cases,
            record
                .population
                .map_or_else(|| "unknown".to_string(), |p| p.to_string()),
            record
                .incidence_per_1000
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}")),
            record.quartile_label.label()
        );
    }

    output
}

pub fn write_analysis_csv<W: io::Write>(result: &ChannelAnalysis, writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "Epi Week",
        "Cases",
        "Q1 (25th)",
        "Median (50th)",
        "Q3 (75th)",
        "Q85 (85th)",
        "Is Alert",
        "Confirmed",
        "Alert Zone",
        "Status",
        "Deviation %",
        "Z Score",
    ])?;

    let cell = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    for record in &result.analysis {
        csv_writer.write_record([
            record.epi_week.to_string(),
            record.case_count.to_string(),
            cell(record.q1),
            cell(record.median),
            cell(record.q3),
            cell(record.q85),
            record.is_alert.to_string(),
            record.is_confirmed_alert.to_string(),
            record.alert_zone.map(|z| z.key()).unwrap_or_default().to_string(),
            record.alert_status.unwrap_or_default().to_string(),
            cell(record.deviation_percent),
            cell(record.z_score),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_unit;
    use crate::config::ChannelConfig;
    use crate::incidence::{build_incidence_records, rank_orgunits_by_incidence};
    use crate::models::CaseObservation;
    use std::collections::BTreeMap;

    fn sample_analysis() -> ChannelAnalysis {
        let baseline: Vec<CaseObservation> = (2020..2025)
            .flat_map(|year| (1..=52).map(move |week| CaseObservation::new(year, week, 10.0)))
            .collect();
        let current = vec![
            CaseObservation::new(2025, 1, 8.0),
            CaseObservation::new(2025, 2, 25.0),
        ];
        analyze_unit("Gulu", 2025, &baseline, &current, &ChannelConfig::default()).unwrap()
    }

    #[test]
    fn report_includes_core_sections() {
        let report = build_report(&sample_analysis());
        assert!(report.contains("# Endemic Channel Report"));
        assert!(report.contains("Generated for Gulu (2025)"));
        assert!(report.contains("## Confirmed Alerts"));
        assert!(report.contains("- 1 weeks, peak in week 2 with 25 cases"));
        assert!(report.contains("- Epidemic Alert: 1 weeks (50.0%)"));
        assert!(report.contains("| 2 * | 25 |"));
        assert!(report.contains("Week 02 (Jan 06 - Jan 12)"));
    }

    #[test]
    fn incidence_report_lists_ranked_units() {
        let cases = BTreeMap::from([("Gulu".to_string(), 50.0), ("Lira".to_string(), 5.0)]);
        let population = BTreeMap::from([
            ("Gulu".to_string(), Some(10_000)),
            ("Lira".to_string(), Some(10_000)),
            ("Amuru".to_string(), None),
        ]);
        let (records, thresholds) = build_incidence_records(&cases, &population, 1000.0);
        let incidence: BTreeMap<String, Option<f64>> = records
            .iter()
            .map(|r| (r.unit.clone(), r.incidence_per_1000))
            .collect();
        let ranked = rank_orgunits_by_incidence(&incidence);
        let report = build_incidence_report(&records, &thresholds, &ranked, 10);
        assert!(report.contains("median split"));
        assert!(report.contains("1. Gulu (5.00 per 1,000)"));
        assert!(report.contains("- Amuru: 0 cases, population unknown, incidence n/a, No Data"));
    }

    #[test]
    fn csv_export_has_a_row_per_week() {
        let mut buffer = Vec::new();
        write_analysis_csv(&sample_analysis(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Epi Week,Cases"));
        assert!(lines[2].contains("epidemic"));
    }
}
