use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{
    CareRequestRecord, ChartSeries, MonthlyAggregate, WaitTimeRecord, YearMonth,
};
use crate::stats;

/// A row that contributes one measurement, in days, to the month of its date.
pub trait Measured {
    fn period_date(&self) -> Option<NaiveDate>;

    fn measure(&self) -> Option<f64>;
}

impl Measured for WaitTimeRecord {
    fn period_date(&self) -> Option<NaiveDate> {
        Some(self.request_date)
    }

    fn measure(&self) -> Option<f64> {
        Some(self.wait_days)
    }
}

/// Care requests are measured by their request-to-scheduling delay.
impl Measured for CareRequestRecord {
    fn period_date(&self) -> Option<NaiveDate> {
        self.request_date
    }

    fn measure(&self) -> Option<f64> {
        self.scheduling_delay_days().map(|days| days as f64)
    }
}

/// Earliest and latest dated row; `None` when nothing carries a date.
pub fn date_span<T: Measured>(records: &[T]) -> Option<(NaiveDate, NaiveDate)> {
    records
        .iter()
        .filter_map(|record| record.period_date())
        .fold(None, |span, date| match span {
            None => Some((date, date)),
            Some((min, max)) => Some((min.min(date), max.max(date))),
        })
}

/// Sparse per-month statistics, ascending. Rows lacking a date or a
/// measurement are left out and months without rows are not emitted.
pub fn aggregate_by_month<T: Measured>(records: &[T]) -> Vec<MonthlyAggregate> {
    let mut buckets: BTreeMap<YearMonth, Vec<f64>> = BTreeMap::new();

    for record in records {
        let (Some(date), Some(value)) = (record.period_date(), record.measure()) else {
            continue;
        };
        buckets
            .entry(YearMonth::from_date(date))
            .or_default()
            .push(value);
    }

    buckets
        .into_iter()
        .map(|(month, values)| MonthlyAggregate {
            month,
            count: values.len(),
            summary: stats::quartiles(&values),
        })
        .collect()
}

/// Every month from the first to the last inclusive.
pub fn month_range(first: YearMonth, last: YearMonth) -> Vec<YearMonth> {
    let mut months = Vec::with_capacity(first.span_to(last).max(0) as usize);
    let mut current = first;
    while current <= last {
        months.push(current);
        current = current.succ();
    }
    months
}

/// Reindexes sparse aggregates onto the gapless month axis of `span`.
/// Months with no aggregate get an explicit no-data entry; aggregates outside
/// the span are discarded.
pub fn assemble_series(
    aggregates: &[MonthlyAggregate],
    span: Option<(NaiveDate, NaiveDate)>,
) -> Vec<MonthlyAggregate> {
    let Some((start, end)) = span else {
        return Vec::new();
    };

    let by_month: BTreeMap<YearMonth, &MonthlyAggregate> = aggregates
        .iter()
        .map(|aggregate| (aggregate.month, aggregate))
        .collect();

    month_range(YearMonth::from_date(start), YearMonth::from_date(end))
        .into_iter()
        .map(|month| match by_month.get(&month) {
            Some(aggregate) if aggregate.count > 0 => (*aggregate).clone(),
            _ => MonthlyAggregate::no_data(month),
        })
        .collect()
}

/// Aggregates `filtered` on the month axis of the unfiltered `base`, so the
/// axis does not shrink when a filter empties a month.
pub fn monthly_series<T: Measured>(base: &[T], filtered: &[T]) -> Vec<MonthlyAggregate> {
    let sparse = aggregate_by_month(filtered);
    let dense = assemble_series(&sparse, date_span(base));
    log::debug!(
        "{} months with data across a {}-month axis",
        dense.iter().filter(|entry| entry.has_data()).count(),
        dense.len()
    );
    dense
}

pub fn chart_series(series: &[MonthlyAggregate]) -> ChartSeries {
    ChartSeries {
        months: series.iter().map(|entry| entry.month.to_string()).collect(),
        counts: series.iter().map(|entry| entry.count).collect(),
        median: series
            .iter()
            .map(|entry| entry.summary.map(|s| s.median_days()))
            .collect(),
        q1: series
            .iter()
            .map(|entry| entry.summary.map(|s| s.q1_days()))
            .collect(),
        q3: series
            .iter()
            .map(|entry| entry.summary.map(|s| s.q3_days()))
            .collect(),
    }
}
