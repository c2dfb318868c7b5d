use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::AnalyticsError;
use crate::ingest::{
    COL_CHANNEL, COL_COMPLETION_DATE, COL_DESTINATION_MUNICIPALITY, COL_DESTINATION_SERVICE,
    COL_ID, COL_ORIGIN_TEAM, COL_ORIGIN_UNIT, COL_PATIENT_ID, COL_PRIORITY, COL_PROCEDURE,
    COL_REGULATION_CENTER, COL_REQUEST_DATE, COL_SCHEDULED_DATE, COL_SPECIALTY, COL_STATUS,
};
use crate::models::CareRequestRecord;

const EXPORT_COLUMNS: &[&str] = &[
    COL_ID,
    COL_REQUEST_DATE,
    COL_SPECIALTY,
    COL_PRIORITY,
    COL_STATUS,
    COL_SCHEDULED_DATE,
    COL_COMPLETION_DATE,
    COL_ORIGIN_UNIT,
    COL_DESTINATION_SERVICE,
    COL_PROCEDURE,
    COL_ORIGIN_TEAM,
    COL_REGULATION_CENTER,
    COL_DESTINATION_MUNICIPALITY,
    COL_CHANNEL,
    COL_PATIENT_ID,
];

fn date_field(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Writes requests with canonical headers; unparseable dates come out blank.
pub fn write_care_requests<W: Write>(
    writer: W,
    records: &[CareRequestRecord],
    delimiter: u8,
) -> Result<(), AnalyticsError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    writer.write_record(EXPORT_COLUMNS)?;

    for record in records {
        writer.write_record([
            record.id.as_str(),
            date_field(record.request_date).as_str(),
            record.specialty.as_str(),
            record.priority.as_str(),
            record.status.label(),
            date_field(record.scheduled_date).as_str(),
            date_field(record.completion_date).as_str(),
            record.origin_unit.as_str(),
            record.destination_service.as_str(),
            record.procedure.as_deref().unwrap_or_default(),
            record.origin_team.as_deref().unwrap_or_default(),
            record.regulation_center.as_deref().unwrap_or_default(),
            record.destination_municipality.as_deref().unwrap_or_default(),
            record.channel.as_deref().unwrap_or_default(),
            record.patient_id.as_deref().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn export_care_requests(
    path: &Path,
    records: &[CareRequestRecord],
    delimiter: u8,
) -> Result<usize, AnalyticsError> {
    let file = std::fs::File::create(path)?;
    write_care_requests(file, records, delimiter)?;
    log::info!("exported {} requests to {}", records.len(), path.display());
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{load_care_requests, read_care_requests};
    use crate::models::RequestStatus;
    use pretty_assertions::assert_eq;

    const CSV: &str = "data_solicitacao,especialidade,prioridade,status,data_agendamento,data_realizacao,unidade_solicitante,servico_destino,canal\n\
        05/02/2024,Cardiologia,P1,cancelled,,,UBS Central,HU,Telefone\n";

    #[test]
    fn exported_rows_read_back_with_same_values() {
        let original = read_care_requests(CSV.as_bytes(), b',').unwrap().records;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filtrado.csv");

        let written = export_care_requests(&path, &original, b',').unwrap();
        assert_eq!(written, 1);

        let reread = load_care_requests(&path, b',').unwrap();
        assert!(reread.warnings.is_empty());
        let record = &reread.records[0];
        assert_eq!(record.id, original[0].id);
        assert_eq!(record.request_date, NaiveDate::from_ymd_opt(2024, 2, 5));
        assert_eq!(record.status, RequestStatus::Cancelled);
        assert_eq!(record.channel.as_deref(), Some("Telefone"));
    }

    #[test]
    fn header_uses_canonical_columns() {
        let mut buffer = Vec::new();
        write_care_requests(&mut buffer, &[], b';').unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.trim_end(), EXPORT_COLUMNS.join(";"));
    }
}
