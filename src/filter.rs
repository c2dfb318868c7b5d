use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::error::AnalyticsError;
use crate::ingest::{
    self, COL_CHANNEL, COL_DESTINATION_MUNICIPALITY, COL_DESTINATION_SERVICE, COL_ID,
    COL_ORIGIN_TEAM, COL_ORIGIN_UNIT, COL_PATIENT_ID, COL_PRIORITY, COL_PROCEDURE,
    COL_REGULATION_CENTER, COL_SPECIALTY, COL_STATUS,
};
use crate::models::{CareRequestRecord, WaitTimeRecord};

/// Selections containing any of these mean "every value".
pub const ALL_SENTINELS: &[&str] = &["*", "(Todas)", "(Todos)"];

/// A row that can be narrowed by categorical columns and a request-date window.
pub trait Filterable {
    const FILTER_COLUMNS: &'static [&'static str];

    fn column_value(&self, column: &str) -> Option<&str>;

    fn request_date(&self) -> Option<NaiveDate>;
}

impl Filterable for CareRequestRecord {
    const FILTER_COLUMNS: &'static [&'static str] = &[
        COL_ID,
        COL_SPECIALTY,
        COL_PRIORITY,
        COL_STATUS,
        COL_ORIGIN_UNIT,
        COL_DESTINATION_SERVICE,
        COL_PROCEDURE,
        COL_ORIGIN_TEAM,
        COL_REGULATION_CENTER,
        COL_DESTINATION_MUNICIPALITY,
        COL_CHANNEL,
        COL_PATIENT_ID,
    ];

    fn column_value(&self, column: &str) -> Option<&str> {
        match column {
            COL_ID => Some(&self.id),
            COL_SPECIALTY => Some(&self.specialty),
            COL_PRIORITY => Some(&self.priority),
            COL_STATUS => Some(self.status.label()),
            COL_ORIGIN_UNIT => Some(&self.origin_unit),
            COL_DESTINATION_SERVICE => Some(&self.destination_service),
            COL_PROCEDURE => self.procedure.as_deref(),
            COL_ORIGIN_TEAM => self.origin_team.as_deref(),
            COL_REGULATION_CENTER => self.regulation_center.as_deref(),
            COL_DESTINATION_MUNICIPALITY => self.destination_municipality.as_deref(),
            COL_CHANNEL => self.channel.as_deref(),
            COL_PATIENT_ID => self.patient_id.as_deref(),
            _ => None,
        }
    }

    fn request_date(&self) -> Option<NaiveDate> {
        self.request_date
    }
}

impl Filterable for WaitTimeRecord {
    const FILTER_COLUMNS: &'static [&'static str] = &[COL_SPECIALTY, COL_ORIGIN_UNIT];

    fn column_value(&self, column: &str) -> Option<&str> {
        match column {
            COL_SPECIALTY => Some(&self.specialty),
            COL_ORIGIN_UNIT => Some(&self.unit),
            _ => None,
        }
    }

    fn request_date(&self) -> Option<NaiveDate> {
        Some(self.request_date)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    selections: BTreeMap<String, BTreeSet<String>>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds allowed values for `column`, merging with any earlier selection.
    pub fn select<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self
            .selections
            .entry(column.trim().to_lowercase())
            .or_default();
        for value in values {
            let value = value.as_ref().trim();
            if !value.is_empty() {
                entry.insert(value.to_string());
            }
        }
        self
    }

    /// Parses `column=v1,v2` as given on the command line.
    pub fn select_assignment(self, raw: &str) -> Result<Self, AnalyticsError> {
        let (column, values) = raw.split_once('=').ok_or_else(|| {
            AnalyticsError::InvalidFilter(format!("expected column=values, got {raw:?}"))
        })?;
        if column.trim().is_empty() {
            return Err(AnalyticsError::InvalidFilter(format!(
                "missing column name in {raw:?}"
            )));
        }
        Ok(self.select(column, values.split(',')))
    }

    pub fn with_window(
        mut self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Self, AnalyticsError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AnalyticsError::InvalidFilter(format!(
                    "date window starts after it ends ({from} > {to})"
                )));
            }
        }
        self.from = from;
        self.to = to;
        Ok(self)
    }

    /// Rejects columns the record type cannot be filtered on.
    pub fn validate_for<T: Filterable>(&self) -> Result<(), AnalyticsError> {
        match self
            .selections
            .keys()
            .find(|column| !T::FILTER_COLUMNS.contains(&column.as_str()))
        {
            Some(column) => Err(AnalyticsError::InvalidFilter(format!(
                "cannot filter on {column:?}; expected one of {}",
                T::FILTER_COLUMNS.join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// Selections that actually restrict rows. Empty sets and sets holding a
    /// sentinel are skipped so an unset control never zeroes the result.
    fn active(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.selections.iter().filter(|(_, values)| {
            !values.is_empty()
                && !values
                    .iter()
                    .any(|value| ALL_SENTINELS.contains(&value.as_str()))
        })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.active().next().is_none()
    }

    pub fn matches<T: Filterable>(&self, record: &T) -> bool {
        if self.from.is_some() || self.to.is_some() {
            let Some(date) = record.request_date() else {
                return false;
            };
            if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
                return false;
            }
        }

        self.active().all(|(column, allowed)| {
            record
                .column_value(column)
                .is_some_and(|value| allowed.contains(value))
        })
    }

    pub fn apply<T: Filterable + Clone>(&self, records: &[T]) -> Vec<T> {
        let filtered: Vec<T> = records
            .iter()
            .filter(|record| self.matches(*record))
            .cloned()
            .collect();
        log::debug!("filter kept {} of {} rows", filtered.len(), records.len());
        filtered
    }

    /// Human-readable summary for report headers.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .active()
            .map(|(column, values)| {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                format!("{} em [{}]", column, values.join(", "))
            })
            .collect();
        match (self.from, self.to) {
            (Some(from), Some(to)) => parts.push(format!("de {from} a {to}")),
            (Some(from), None) => parts.push(format!("a partir de {from}")),
            (None, Some(to)) => parts.push(format!("até {to}")),
            (None, None) => {}
        }
        if parts.is_empty() {
            "todas as solicitações".to_string()
        } else {
            parts.join("; ")
        }
    }
}

pub fn parse_window_date(raw: &str) -> Result<NaiveDate, AnalyticsError> {
    ingest::parse_date(raw).ok_or_else(|| AnalyticsError::InvalidDate(raw.to_string()))
}
