use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const EPI_WEEKS: u32 = 52;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaseObservation {
    pub year: i32,
    pub epi_week: u32,
    pub case_count: f64,
}

impl CaseObservation {
    pub fn new(year: i32, epi_week: u32, case_count: f64) -> Self {
        Self {
            year,
            epi_week,
            case_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitObservation {
    pub unit: String,
    pub observation: CaseObservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelThreshold {
    pub epi_week: u32,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub q85: f64,
    pub mean: f64,
    pub std: f64,
    pub n_observations: usize,
    /// Set when the week had no baseline observations and the whole
    /// baseline distribution was used instead.
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPercentile {
    Q3,
    Q85,
}

impl ThresholdPercentile {
    pub fn pick(self, channel: &ChannelThreshold) -> f64 {
        match self {
            Self::Q3 => channel.q3,
            Self::Q85 => channel.q85,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Q3 => "q3",
            Self::Q85 => "q85",
        }
    }
}

impl std::str::FromStr for ThresholdPercentile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "q3" => Ok(Self::Q3),
            "q85" => Ok(Self::Q85),
            other => Err(format!("unknown threshold percentile '{other}' (expected q3 or q85)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertZone {
    Success,
    Safety,
    Alert,
    Epidemic,
}

impl AlertZone {
    pub const ALL: [AlertZone; 4] = [
        AlertZone::Success,
        AlertZone::Safety,
        AlertZone::Alert,
        AlertZone::Epidemic,
    ];

    /// Places a case count against the q1 / median / q3 breakpoints.
    pub fn classify(case_count: f64, q1: f64, median: f64, q3: f64) -> Self {
        if case_count > q3 {
            Self::Epidemic
        } else if case_count > median {
            Self::Alert
        } else if case_count > q1 {
            Self::Safety
        } else {
            Self::Success
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Epidemic => "#e74c3c",
            Self::Alert => "#f39c12",
            Self::Safety => "#27ae60",
            Self::Success => "#2ecc71",
        }
    }

    pub fn status(self) -> &'static str {
        match self {
            Self::Epidemic => "EPIDEMIC ALERT",
            Self::Alert => "ALERT ZONE",
            Self::Safety => "NORMAL",
            Self::Success => "LOW TRANSMISSION",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Epidemic => "Epidemic Alert",
            Self::Alert => "Alert Zone",
            Self::Safety => "Safety Zone",
            Self::Success => "Success Zone",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Epidemic => "epidemic",
            Self::Alert => "alert",
            Self::Safety => "safety",
            Self::Success => "success",
        }
    }
}

/// One current-year week joined with its channel row.
///
/// Channel-derived fields are `None` when the week had no matching channel
/// row; such weeks are never alerts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub year: i32,
    pub epi_week: u32,
    pub case_count: f64,
    pub q1: Option<f64>,
    pub median: Option<f64>,
    pub q3: Option<f64>,
    pub q85: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub threshold_value: Option<f64>,
    pub is_alert: bool,
    pub alert_zone: Option<AlertZone>,
    pub alert_color: Option<&'static str>,
    pub alert_status: Option<&'static str>,
    pub deviation_from_median: Option<f64>,
    pub deviation_percent: Option<f64>,
    pub z_score: Option<f64>,
    pub is_statistical_outlier: bool,
    pub is_confirmed_alert: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSummary {
    pub total_alert_weeks: usize,
    /// Confirmed alert weeks, highest case count first.
    pub alert_weeks: Vec<u32>,
    pub max_cases_week: Option<u32>,
    pub max_cases: f64,
    pub avg_deviation: f64,
    pub total_excess_cases: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneShare {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneDistribution {
    pub success: ZoneShare,
    pub safety: ZoneShare,
    pub alert: ZoneShare,
    pub epidemic: ZoneShare,
}

impl ZoneDistribution {
    pub fn get(&self, zone: AlertZone) -> ZoneShare {
        match zone {
            AlertZone::Success => self.success,
            AlertZone::Safety => self.safety,
            AlertZone::Alert => self.alert,
            AlertZone::Epidemic => self.epidemic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_weeks_monitored: usize,
    pub total_alert_weeks: usize,
    pub alert_weeks_list: Vec<u32>,
    pub current_week: Option<u32>,
    pub current_week_cases: f64,
    pub current_week_status: Option<&'static str>,
    pub total_cases_ytd: f64,
    pub expected_cases_ytd: f64,
    pub deviation_percent: f64,
    pub alert_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearTotals {
    pub total_cases: f64,
    pub avg_weekly: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurrentYearTotals {
    pub total_cases: f64,
    pub avg_weekly: f64,
    pub weeks_reported: usize,
    /// Sum of channel medians over the weeks reported so far.
    pub expected_cases: f64,
    pub percent_vs_baseline: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearComparison {
    pub years: BTreeMap<i32, YearTotals>,
    pub current: CurrentYearTotals,
    pub baseline_avg: YearTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearCoverage {
    pub weeks_present: usize,
    pub coverage_percent: f64,
    pub is_sufficient: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineValidation {
    pub is_valid: bool,
    pub message: String,
    pub coverage: BTreeMap<i32, YearCoverage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InterpolatedWeek {
    pub epi_week: u32,
    pub case_count: Option<f64>,
    pub is_interpolated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RiskTier {
    #[serde(rename = "NO_DATA")]
    NoData,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "HIGH")]
    High,
    Q1,
    Q2,
    Q3,
    Q4,
}

impl RiskTier {
    pub fn color(self) -> &'static str {
        match self {
            Self::NoData => "#BDBDBD",
            Self::Low | Self::Q1 => "#4CAF50",
            Self::Q2 => "#FFEB3B",
            Self::Q3 => "#FF9800",
            Self::High | Self::Q4 => "#F44336",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoData => "No Data",
            Self::Low => "Below Median",
            Self::High => "Above Median",
            Self::Q1 => "Q1 (Low)",
            Self::Q2 => "Q2 (Moderate)",
            Self::Q3 => "Q3 (Elevated)",
            Self::Q4 => "Q4 (High)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitClass {
    pub quartile: RiskTier,
    pub color: &'static str,
    pub label: &'static str,
    pub incidence: Option<f64>,
}

impl UnitClass {
    pub fn new(quartile: RiskTier, incidence: Option<f64>) -> Self {
        Self {
            quartile,
            color: quartile.color(),
            label: quartile.label(),
            incidence,
        }
    }
}

/// Breakpoints used by the incidence classification, shaped by how many
/// valid incidences were available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClassThresholds {
    Quartiles { q25: f64, q50: f64, q75: f64 },
    Median { median: f64 },
    Unavailable {},
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidenceRecord {
    pub unit: String,
    pub cases: f64,
    pub population: Option<u64>,
    pub incidence_per_1000: Option<f64>,
    pub quartile_label: RiskTier,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedUnit {
    pub unit: String,
    pub incidence: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodCases {
    pub unit: String,
    pub period: String,
    pub cases: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyIncidence {
    pub unit: String,
    pub period: String,
    pub cases: f64,
    pub population: Option<u64>,
    pub incidence: Option<f64>,
}
