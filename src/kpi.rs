use std::collections::HashMap;

use serde::Serialize;

use crate::models::{
    CareRequestRecord, GroupSummary, KpiCard, KpiSummary, KpiUnit, RequestStatus,
};
use crate::stats;

pub fn compute_kpis(records: &[CareRequestRecord]) -> KpiSummary {
    let mut waiting = 0;
    let mut scheduled = 0;
    let mut completed = 0;
    let mut cancelled_or_returned = 0;
    let mut out_of_order_excluded = 0;
    let mut delays = Vec::new();

    for record in records {
        match record.status {
            RequestStatus::Waiting => waiting += 1,
            RequestStatus::Scheduled => scheduled += 1,
            RequestStatus::Completed => completed += 1,
            RequestStatus::Cancelled | RequestStatus::Returned => cancelled_or_returned += 1,
            RequestStatus::Unknown(_) => {}
        }

        if let Some(days) = record.scheduling_delay_days() {
            delays.push(days as f64);
        } else if record.has_out_of_order_dates() {
            out_of_order_excluded += 1;
        }
    }

    if out_of_order_excluded > 0 {
        log::warn!(
            "{} requests scheduled before their request date were left out of delay statistics",
            out_of_order_excluded
        );
    }

    let total = records.len();
    let (median_delay_days, p90_delay_days) = stats::median_and_p90(&delays);

    KpiSummary {
        total,
        waiting,
        scheduled,
        completed,
        cancelled_or_returned,
        median_delay_days,
        p90_delay_days,
        delay_sample_size: delays.len(),
        out_of_order_excluded,
        cancellation_rate: if total == 0 {
            0.0
        } else {
            cancelled_or_returned as f64 / total as f64
        },
    }
}

impl KpiSummary {
    pub fn cards(&self) -> Vec<KpiCard> {
        vec![
            KpiCard {
                label: "Fila atual (aguardando)",
                value: Some(self.waiting as f64),
                unit: KpiUnit::Count,
            },
            KpiCard {
                label: "Agendadas",
                value: Some(self.scheduled as f64),
                unit: KpiUnit::Count,
            },
            KpiCard {
                label: "Realizadas",
                value: Some(self.completed as f64),
                unit: KpiUnit::Count,
            },
            KpiCard {
                label: "Canceladas/devolvidas",
                value: Some(self.cancelled_or_returned as f64),
                unit: KpiUnit::Count,
            },
            KpiCard {
                label: "Tempo até agendamento (mediana)",
                value: self.median_delay_days,
                unit: KpiUnit::Days,
            },
            KpiCard {
                label: "Tempo até agendamento (P90)",
                value: self.p90_delay_days,
                unit: KpiUnit::Days,
            },
            KpiCard {
                label: "Taxa de cancelamento",
                value: Some(self.cancellation_rate * 100.0),
                unit: KpiUnit::Percentage,
            },
        ]
    }
}

/// JSON shape for the presentation layer: every scalar plus the labelled cards.
#[derive(Debug, Serialize)]
pub struct KpiPayload<'a> {
    #[serde(flatten)]
    pub summary: &'a KpiSummary,
    pub cards: Vec<KpiCard>,
}

impl KpiSummary {
    pub fn payload(&self) -> KpiPayload<'_> {
        KpiPayload {
            summary: self,
            cards: self.cards(),
        }
    }
}

impl KpiCard {
    pub fn formatted_value(&self) -> String {
        match (self.value, self.unit) {
            (None, _) => "—".to_string(),
            (Some(value), KpiUnit::Count) => format!("{}", value as i64),
            (Some(value), KpiUnit::Days) => format!("{} dias", value.round() as i64),
            (Some(value), KpiUnit::Percentage) => format!("{value:.1}%"),
        }
    }
}

/// Per-group breakdown, largest groups first.
pub fn summarize_by<F>(records: &[CareRequestRecord], key: F) -> Vec<GroupSummary>
where
    F: Fn(&CareRequestRecord) -> &str,
{
    let mut groups: HashMap<&str, Vec<&CareRequestRecord>> = HashMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record);
    }

    let mut summaries: Vec<GroupSummary> = groups
        .into_iter()
        .map(|(group, members)| {
            let delays: Vec<f64> = members
                .iter()
                .filter_map(|record| record.scheduling_delay_days())
                .map(|days| days as f64)
                .collect();
            let (median_delay_days, p90_delay_days) = stats::median_and_p90(&delays);
            GroupSummary {
                group: if group.is_empty() {
                    "(sem informação)".to_string()
                } else {
                    group.to_string()
                },
                total: members.len(),
                waiting: members
                    .iter()
                    .filter(|record| record.status == RequestStatus::Waiting)
                    .count(),
                median_delay_days,
                p90_delay_days,
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.group.cmp(&b.group)));
    summaries
}

pub fn summarize_by_specialty(records: &[CareRequestRecord]) -> Vec<GroupSummary> {
    summarize_by(records, |record| record.specialty.as_str())
}

pub fn summarize_by_unit(records: &[CareRequestRecord]) -> Vec<GroupSummary> {
    summarize_by(records, |record| record.origin_unit.as_str())
}

/// Most recent requests first; undated rows sink to the end.
pub fn detail_sample(records: &[CareRequestRecord], limit: usize) -> Vec<CareRequestRecord> {
    let mut recent = records.to_vec();
    recent.sort_by(|a, b| b.request_date.cmp(&a.request_date));
    recent.truncate(limit);
    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn request(
        specialty: &str,
        status: RequestStatus,
        requested: Option<(i32, u32, u32)>,
        scheduled: Option<(i32, u32, u32)>,
    ) -> CareRequestRecord {
        let date = |ymd: (i32, u32, u32)| NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap();
        CareRequestRecord {
            id: format!("{specialty}-{requested:?}"),
            request_date: requested.map(date),
            specialty: specialty.to_string(),
            priority: "P2".to_string(),
            status,
            scheduled_date: scheduled.map(date),
            completion_date: None,
            origin_unit: "UBS Central".to_string(),
            destination_service: "Hospital Regional".to_string(),
            procedure: None,
            origin_team: None,
            regulation_center: None,
            destination_municipality: None,
            channel: None,
            patient_id: None,
        }
    }

    fn sample() -> Vec<CareRequestRecord> {
        vec![
            request("Cardiologia", RequestStatus::Waiting, Some((2024, 1, 3)), None),
            request("Cardiologia", RequestStatus::Scheduled, Some((2024, 1, 5)), Some((2024, 1, 15))),
            request("Ortopedia", RequestStatus::Completed, Some((2024, 2, 1)), Some((2024, 2, 21))),
            request("Ortopedia", RequestStatus::Cancelled, Some((2024, 2, 10)), None),
            request("Ortopedia", RequestStatus::Returned, Some((2024, 3, 1)), Some((2024, 2, 20))),
            request("Dermatologia", RequestStatus::Unknown("Em análise".into()), None, None),
        ]
    }

    #[test]
    fn counts_statuses_and_rate() {
        let kpis = compute_kpis(&sample());
        assert_eq!(kpis.total, 6);
        assert_eq!(kpis.waiting, 1);
        assert_eq!(kpis.scheduled, 1);
        assert_eq!(kpis.completed, 1);
        assert_eq!(kpis.cancelled_or_returned, 2);
        assert!((kpis.cancellation_rate - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_order_dates_are_excluded_from_delays() {
        let kpis = compute_kpis(&sample());
        assert_eq!(kpis.delay_sample_size, 2);
        assert_eq!(kpis.out_of_order_excluded, 1);
        assert_eq!(kpis.median_delay_days, Some(15.0));
        assert!((kpis.p90_delay_days.unwrap() - 19.0).abs() < 1e-9);
    }

    #[test]
    fn empty_table_has_zero_rate_and_no_delays() {
        let kpis = compute_kpis(&[]);
        assert_eq!(kpis.total, 0);
        assert_eq!(kpis.waiting, 0);
        assert_eq!(kpis.cancellation_rate, 0.0);
        assert_eq!(kpis.median_delay_days, None);
        assert_eq!(kpis.cards()[4].formatted_value(), "—");
    }

    #[test]
    fn cancellation_rate_stays_within_unit_interval() {
        let all_cancelled: Vec<CareRequestRecord> = (0..3)
            .map(|_| request("Cardiologia", RequestStatus::Cancelled, None, None))
            .collect();
        assert_eq!(compute_kpis(&all_cancelled).cancellation_rate, 1.0);
        let rate = compute_kpis(&sample()).cancellation_rate;
        assert!((0.0..=1.0).contains(&rate));
    }

    #[test]
    fn cards_carry_units() {
        let cards = compute_kpis(&sample()).cards();
        assert_eq!(cards[0].formatted_value(), "1");
        assert_eq!(cards[4].unit, KpiUnit::Days);
        assert_eq!(cards[4].formatted_value(), "15 dias");
        assert_eq!(cards[6].formatted_value(), "33.3%");
    }

    #[test]
    fn json_payload_keeps_scalars_next_to_cards() {
        let kpis = compute_kpis(&sample());
        let json = serde_json::to_value(kpis.payload()).unwrap();
        assert_eq!(json["total"], 6);
        assert_eq!(json["delay_sample_size"], 2);
        assert_eq!(json["out_of_order_excluded"], 1);
        assert_eq!(json["cards"].as_array().unwrap().len(), 7);
        assert_eq!(json["cards"][4]["unit"], "days");
    }

    #[test]
    fn groups_sorted_by_size_then_name() {
        let groups = summarize_by_specialty(&sample());
        let names: Vec<(&str, usize)> = groups.iter().map(|g| (g.group.as_str(), g.total)).collect();
        assert_eq!(
            names,
            vec![("Ortopedia", 3), ("Cardiologia", 2), ("Dermatologia", 1)]
        );
        assert_eq!(groups[1].waiting, 1);
        assert_eq!(groups[1].median_delay_days, Some(10.0));
        assert_eq!(groups[0].median_delay_days, Some(20.0));
    }

    #[test]
    fn unit_breakdown_labels_blank_groups() {
        let mut rows = sample();
        rows[0].origin_unit = String::new();
        let groups = summarize_by_unit(&rows);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().any(|g| g.group == "(sem informação)"));
    }

    #[test]
    fn detail_sample_is_recent_first_and_truncated() {
        let sample = detail_sample(&sample(), 3);
        let dates: Vec<Option<NaiveDate>> = sample.iter().map(|r| r.request_date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 1),
                NaiveDate::from_ymd_opt(2024, 2, 10),
                NaiveDate::from_ymd_opt(2024, 2, 1),
            ]
        );
    }
}
