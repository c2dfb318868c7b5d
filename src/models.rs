use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Waiting,
    Scheduled,
    Completed,
    Cancelled,
    Returned,
    Unknown(String),
}

impl RequestStatus {
    pub fn parse(raw: &str) -> Self {
        match fold_token(raw).as_str() {
            "aguardando" | "waiting" | "pendente" => RequestStatus::Waiting,
            "agendado" | "scheduled" => RequestStatus::Scheduled,
            "realizado" | "concluido" | "completed" => RequestStatus::Completed,
            "cancelado" | "cancelled" | "canceled" => RequestStatus::Cancelled,
            "devolvido" | "returned" => RequestStatus::Returned,
            _ => RequestStatus::Unknown(raw.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RequestStatus::Waiting => "Aguardando",
            RequestStatus::Scheduled => "Agendado",
            RequestStatus::Completed => "Realizado",
            RequestStatus::Cancelled => "Cancelado",
            RequestStatus::Returned => "Devolvido",
            RequestStatus::Unknown(raw) => raw,
        }
    }
}

/// Lowercases and strips the Portuguese diacritics that show up in exported
/// status columns ("Concluído", "Devolvído").
fn fold_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CareRequestRecord {
    pub id: String,
    pub request_date: Option<NaiveDate>,
    pub specialty: String,
    pub priority: String,
    pub status: RequestStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub origin_unit: String,
    pub destination_service: String,
    pub procedure: Option<String>,
    pub origin_team: Option<String>,
    pub regulation_center: Option<String>,
    pub destination_municipality: Option<String>,
    pub channel: Option<String>,
    pub patient_id: Option<String>,
}

impl CareRequestRecord {
    /// Days from request to scheduling, when both dates exist and are in order.
    pub fn scheduling_delay_days(&self) -> Option<i64> {
        let requested = self.request_date?;
        let scheduled = self.scheduled_date?;
        let days = (scheduled - requested).num_days();
        (days >= 0).then_some(days)
    }

    pub fn has_out_of_order_dates(&self) -> bool {
        matches!(
            (self.request_date, self.scheduled_date),
            (Some(requested), Some(scheduled)) if scheduled < requested
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitTimeRecord {
    pub request_date: NaiveDate,
    pub wait_days: f64,
    pub specialty: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowParseWarning {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn succ(self) -> Self {
        if self.month == 12 {
            YearMonth {
                year: self.year + 1,
                month: 1,
            }
        } else {
            YearMonth {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Number of months from `self` to `other`, counting both ends.
    pub fn span_to(self, other: YearMonth) -> i64 {
        let start = self.year as i64 * 12 + self.month as i64;
        let end = other.year as i64 * 12 + other.month as i64;
        end - start + 1
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuartileSummary {
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
}

impl QuartileSummary {
    pub fn median_days(&self) -> i64 {
        self.median.round() as i64
    }

    pub fn q1_days(&self) -> i64 {
        self.q1.round() as i64
    }

    pub fn q3_days(&self) -> i64 {
        self.q3.round() as i64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub month: YearMonth,
    pub count: usize,
    pub summary: Option<QuartileSummary>,
}

impl MonthlyAggregate {
    pub fn no_data(month: YearMonth) -> Self {
        MonthlyAggregate {
            month,
            count: 0,
            summary: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.summary.is_some()
    }
}

/// Chart-ready parallel arrays; `None` statistics mark months without data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub months: Vec<String>,
    pub counts: Vec<usize>,
    pub median: Vec<Option<i64>>,
    pub q1: Vec<Option<i64>>,
    pub q3: Vec<Option<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total: usize,
    pub waiting: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub cancelled_or_returned: usize,
    pub median_delay_days: Option<f64>,
    pub p90_delay_days: Option<f64>,
    pub delay_sample_size: usize,
    pub out_of_order_excluded: usize,
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiUnit {
    Count,
    Days,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCard {
    pub label: &'static str,
    pub value: Option<f64>,
    pub unit: KpiUnit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub group: String,
    pub total: usize,
    pub waiting: usize,
    pub median_delay_days: Option<f64>,
    pub p90_delay_days: Option<f64>,
}
