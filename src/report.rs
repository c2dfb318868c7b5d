use std::fmt::Write;

use crate::aggregate;
use crate::filter::FilterSet;
use crate::kpi;
use crate::models::{
    CareRequestRecord, GroupSummary, KpiSummary, MonthlyAggregate, RowParseWarning,
};

fn days_cell(value: Option<i64>) -> String {
    value.map_or_else(|| "—".to_string(), |days| days.to_string())
}

fn delay_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "—".to_string(), |days| format!("{:.0}", days.round()))
}

pub fn render_kpis(kpis: &KpiSummary) -> String {
    let mut output = String::new();
    for card in kpis.cards() {
        let _ = writeln!(output, "{:<34} {}", card.label, card.formatted_value());
    }
    let _ = writeln!(output, "{:<34} {}", "Total de solicitações", kpis.total);
    let _ = writeln!(
        output,
        "{:<34} {}",
        "Base do tempo até agendamento", kpis.delay_sample_size
    );
    if kpis.out_of_order_excluded > 0 {
        let _ = writeln!(
            output,
            "Nota: {} solicitações com agendamento anterior à solicitação foram excluídas do cálculo de tempo.",
            kpis.out_of_order_excluded
        );
    }
    output
}

pub fn render_series_table(series: &[MonthlyAggregate]) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<8} {:>7} {:>7} {:>7} {:>7}",
        "Mês", "N", "Q1", "Mediana", "Q3"
    );
    for entry in series {
        let _ = writeln!(
            output,
            "{:<8} {:>7} {:>7} {:>7} {:>7}",
            entry.month.to_string(),
            entry.count,
            days_cell(entry.summary.map(|s| s.q1_days())),
            days_cell(entry.summary.map(|s| s.median_days())),
            days_cell(entry.summary.map(|s| s.q3_days())),
        );
    }
    output
}

/// Text output of the wait-time command. Row warnings are always listed, so a
/// file whose rows were all dropped still explains why.
pub fn render_wait_times(
    filters: &FilterSet,
    series: &[MonthlyAggregate],
    matched: usize,
    warnings: &[RowParseWarning],
    warning_limit: usize,
) -> String {
    let mut output = String::new();
    if series.is_empty() {
        let _ = writeln!(output, "Nenhuma linha com data de solicitação válida.");
    } else {
        if matched == 0 {
            let _ = writeln!(output, "Nenhuma linha corresponde aos filtros selecionados.");
        }
        let _ = writeln!(output, "Tempo de espera (dias), {}:", filters.describe());
        output.push_str(&render_series_table(series));
    }
    output.push_str(&render_warnings(warnings, warning_limit));
    output
}

pub fn render_warnings(warnings: &[RowParseWarning], limit: usize) -> String {
    let mut output = String::new();
    if warnings.is_empty() {
        return output;
    }
    let _ = writeln!(output, "{} linhas com valores ignorados:", warnings.len());
    for warning in warnings.iter().take(limit) {
        let _ = writeln!(output, "- linha {}: {}", warning.row, warning.reason);
    }
    if warnings.len() > limit {
        let _ = writeln!(output, "- ... e mais {}", warnings.len() - limit);
    }
    output
}

fn write_group_table(output: &mut String, heading: &str, groups: &[GroupSummary]) {
    if groups.is_empty() {
        let _ = writeln!(output, "Nenhuma solicitação no filtro atual.");
        return;
    }
    let _ = writeln!(output, "| {heading} | Solicitações | Aguardando | Mediana | P90 |");
    let _ = writeln!(output, "|---|---:|---:|---:|---:|");
    for group in groups {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            group.group,
            group.total,
            group.waiting,
            delay_cell(group.median_delay_days),
            delay_cell(group.p90_delay_days),
        );
    }
}

/// Markdown report of the queue: KPIs, monthly scheduling delay on the full
/// month axis of `base`, specialty and unit breakdowns, recent requests.
pub fn build_report(
    filters: &FilterSet,
    base: &[CareRequestRecord],
    filtered: &[CareRequestRecord],
    warnings: &[RowParseWarning],
    detail_rows: usize,
) -> String {
    let kpis = kpi::compute_kpis(filtered);
    let series = aggregate::monthly_series(base, filtered);
    let specialties = kpi::summarize_by_specialty(filtered);
    let units = kpi::summarize_by_unit(filtered);
    let details = kpi::detail_sample(filtered, detail_rows);

    let mut output = String::new();

    let _ = writeln!(output, "# Relatório da Fila de Regulação");
    let _ = writeln!(
        output,
        "Filtro: {} ({} de {} solicitações)",
        filters.describe(),
        filtered.len(),
        base.len()
    );
    if !warnings.is_empty() {
        let _ = writeln!(
            output,
            "{} linhas tiveram valores ignorados na importação.",
            warnings.len()
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Indicadores");

    if filtered.is_empty() {
        let _ = writeln!(output, "Nenhuma solicitação corresponde aos filtros selecionados.");
    }
    for card in kpis.cards() {
        let _ = writeln!(output, "- {}: {}", card.label, card.formatted_value());
    }
    if kpis.out_of_order_excluded > 0 {
        let _ = writeln!(
            output,
            "- Excluídas do tempo até agendamento (agendamento antes da solicitação): {}",
            kpis.out_of_order_excluded
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tempo até agendamento por mês (dias)");

    if series.is_empty() {
        let _ = writeln!(output, "Sem datas de solicitação válidas.");
    } else {
        let _ = writeln!(output, "| Mês | N | Q1 | Mediana | Q3 |");
        let _ = writeln!(output, "|---|---:|---:|---:|---:|");
        for entry in &series {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                entry.month,
                entry.count,
                days_cell(entry.summary.map(|s| s.q1_days())),
                days_cell(entry.summary.map(|s| s.median_days())),
                days_cell(entry.summary.map(|s| s.q3_days())),
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Por especialidade");
    write_group_table(&mut output, "Especialidade", &specialties);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Por unidade solicitante");
    write_group_table(&mut output, "Unidade", &units);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Solicitações recentes");

    if details.is_empty() {
        let _ = writeln!(output, "Nenhuma solicitação no filtro atual.");
    } else {
        for record in &details {
            let requested = record
                .request_date
                .map_or_else(|| "sem data".to_string(), |date| date.to_string());
            let _ = writeln!(
                output,
                "- {} ({}, {}) em {}: {} → {}",
                record.id,
                record.specialty,
                record.priority,
                requested,
                record.status.label(),
                record.destination_service
            );
        }
    }

    output
}
