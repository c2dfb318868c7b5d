use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use csv::{ByteRecord, StringRecord};
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::models::{CareRequestRecord, RequestStatus, RowParseWarning, WaitTimeRecord};

pub const COL_ID: &str = "id_solicitacao";
pub const COL_REQUEST_DATE: &str = "data_solicitacao";
pub const COL_SPECIALTY: &str = "especialidade";
pub const COL_PRIORITY: &str = "prioridade";
pub const COL_STATUS: &str = "status";
pub const COL_SCHEDULED_DATE: &str = "data_agendamento";
pub const COL_COMPLETION_DATE: &str = "data_realizacao";
pub const COL_ORIGIN_UNIT: &str = "unidade_solicitante";
pub const COL_DESTINATION_SERVICE: &str = "servico_destino";
pub const COL_PROCEDURE: &str = "procedimento";
pub const COL_ORIGIN_TEAM: &str = "equipe_origem";
pub const COL_REGULATION_CENTER: &str = "central_regulacao";
pub const COL_DESTINATION_MUNICIPALITY: &str = "municipio_destino";
pub const COL_CHANNEL: &str = "canal";
pub const COL_PATIENT_ID: &str = "paciente_id";
pub const COL_WAIT_DAYS: &str = "tempo_espera_dias";

pub const CARE_REQUEST_REQUIRED: &[&str] = &[
    COL_REQUEST_DATE,
    COL_SPECIALTY,
    COL_PRIORITY,
    COL_STATUS,
    COL_SCHEDULED_DATE,
    COL_COMPLETION_DATE,
    COL_ORIGIN_UNIT,
    COL_DESTINATION_SERVICE,
];

pub const WAIT_TIME_REQUIRED: &[&str] = &[
    COL_REQUEST_DATE,
    COL_WAIT_DAYS,
    COL_SPECIALTY,
    COL_ORIGIN_UNIT,
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Records that survived row-level coercion plus what was dropped or blanked.
#[derive(Debug)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub warnings: Vec<RowParseWarning>,
}

/// Header positions, matched case-insensitively on trimmed names.
#[derive(Debug)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let mut positions = HashMap::new();
        for (idx, name) in headers.iter().enumerate() {
            positions
                .entry(name.trim().to_lowercase())
                .or_insert(idx);
        }
        ColumnIndex { positions }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    /// Schema pass: fails with every absent required column, in contract order.
    pub fn validate(&self, required: &[&str]) -> Result<(), AnalyticsError> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|column| !self.contains(column))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AnalyticsError::missing_columns(missing))
        }
    }

    /// Trimmed cell value; blank cells and absent columns read as `None`.
    pub fn get<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        let idx = *self.positions.get(column)?;
        record
            .get(idx)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Parses a date cell. `%Y` takes 1 to 4 digits, so two-digit years such as
/// `05/03/24` are rejected rather than landing in year 24.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_date_shapes(raw.trim()).filter(|date| date.year() >= 1000)
}

fn parse_date_shapes(raw: &str) -> Option<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.date_naive());
    }
    // "2024-03-05 10:00:00-03" and similar offsets chrono won't take whole.
    raw.get(..10)
        .filter(|_| raw.len() > 10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Accepts `.` or `,` as the decimal separator.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let normalized = if raw.contains(',') && !raw.contains('.') {
        raw.replace(',', ".")
    } else {
        raw.to_string()
    };
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn warn_row(warnings: &mut Vec<RowParseWarning>, row: usize, reason: String) {
    log::warn!("row {}: {}", row, reason);
    warnings.push(RowParseWarning { row, reason });
}

/// Header names decoded lossily; non-UTF-8 names (Latin-1 exports) only
/// matter if they are required, and required names are ASCII.
fn read_columns<R: Read>(reader: &mut csv::Reader<R>) -> Result<ColumnIndex, AnalyticsError> {
    let headers = StringRecord::from_byte_record_lossy(reader.byte_headers()?.clone());
    Ok(ColumnIndex::from_headers(&headers))
}

/// Decodes one row cell by cell; bytes that are not UTF-8 are replaced
/// instead of costing the whole row.
fn decode_row(
    record: ByteRecord,
    row: usize,
    warnings: &mut Vec<RowParseWarning>,
) -> StringRecord {
    if let Some(field) = record
        .iter()
        .position(|cell| std::str::from_utf8(cell).is_err())
    {
        warn_row(
            warnings,
            row,
            format!("non-UTF-8 bytes replaced in field {}", field + 1),
        );
    }
    StringRecord::from_byte_record_lossy(record)
}

/// Optional date cell: blank is fine, garbage is blanked with a warning.
fn lenient_date(
    columns: &ColumnIndex,
    record: &StringRecord,
    column: &str,
    row: usize,
    warnings: &mut Vec<RowParseWarning>,
) -> Option<NaiveDate> {
    let raw = columns.get(record, column)?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        warn_row(warnings, row, format!("unparseable {column} {raw:?}"));
    }
    parsed
}

pub fn read_care_requests<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<Ingested<CareRequestRecord>, AnalyticsError> {
    let mut reader = csv_reader(reader, delimiter);
    let columns = read_columns(&mut reader)?;
    columns.validate(CARE_REQUEST_REQUIRED)?;

    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for (idx, result) in reader.byte_records().enumerate() {
        let row = idx + 2;
        let record = match result {
            Ok(record) => decode_row(record, row, &mut warnings),
            Err(err) => {
                warn_row(&mut warnings, row, format!("unreadable row: {err}"));
                continue;
            }
        };

        let text = |column: &str| columns.get(&record, column).unwrap_or_default().to_string();
        let optional = |column: &str| columns.get(&record, column).map(str::to_string);

        let request_date = lenient_date(&columns, &record, COL_REQUEST_DATE, row, &mut warnings);
        if columns.get(&record, COL_REQUEST_DATE).is_none() {
            warn_row(&mut warnings, row, format!("missing {COL_REQUEST_DATE}"));
        }

        records.push(CareRequestRecord {
            id: optional(COL_ID).unwrap_or_else(|| format!("import-{}", Uuid::new_v4())),
            request_date,
            specialty: text(COL_SPECIALTY),
            priority: text(COL_PRIORITY),
            status: RequestStatus::parse(&text(COL_STATUS)),
            scheduled_date: lenient_date(&columns, &record, COL_SCHEDULED_DATE, row, &mut warnings),
            completion_date: lenient_date(
                &columns,
                &record,
                COL_COMPLETION_DATE,
                row,
                &mut warnings,
            ),
            origin_unit: text(COL_ORIGIN_UNIT),
            destination_service: text(COL_DESTINATION_SERVICE),
            procedure: optional(COL_PROCEDURE),
            origin_team: optional(COL_ORIGIN_TEAM),
            regulation_center: optional(COL_REGULATION_CENTER),
            destination_municipality: optional(COL_DESTINATION_MUNICIPALITY),
            channel: optional(COL_CHANNEL),
            patient_id: optional(COL_PATIENT_ID),
        });
    }

    log::info!(
        "ingested {} care requests ({} row warnings)",
        records.len(),
        warnings.len()
    );
    Ok(Ingested { records, warnings })
}

pub fn read_wait_times<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<Ingested<WaitTimeRecord>, AnalyticsError> {
    let mut reader = csv_reader(reader, delimiter);
    let columns = read_columns(&mut reader)?;
    columns.validate(WAIT_TIME_REQUIRED)?;

    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for (idx, result) in reader.byte_records().enumerate() {
        let row = idx + 2;
        let record = match result {
            Ok(record) => decode_row(record, row, &mut warnings),
            Err(err) => {
                warn_row(&mut warnings, row, format!("unreadable row: {err}"));
                continue;
            }
        };

        let raw_date = columns.get(&record, COL_REQUEST_DATE).unwrap_or_default();
        let Some(request_date) = parse_date(raw_date) else {
            warn_row(
                &mut warnings,
                row,
                format!("dropped: unparseable {COL_REQUEST_DATE} {raw_date:?}"),
            );
            continue;
        };

        let raw_wait = columns.get(&record, COL_WAIT_DAYS).unwrap_or_default();
        let Some(wait_days) = parse_number(raw_wait).filter(|days| *days >= 0.0) else {
            warn_row(
                &mut warnings,
                row,
                format!("dropped: invalid {COL_WAIT_DAYS} {raw_wait:?}"),
            );
            continue;
        };

        records.push(WaitTimeRecord {
            request_date,
            wait_days,
            specialty: columns
                .get(&record, COL_SPECIALTY)
                .unwrap_or_default()
                .to_string(),
            unit: columns
                .get(&record, COL_ORIGIN_UNIT)
                .unwrap_or_default()
                .to_string(),
        });
    }

    log::info!(
        "ingested {} wait-time rows ({} dropped)",
        records.len(),
        warnings.len()
    );
    Ok(Ingested { records, warnings })
}

pub fn load_care_requests(
    path: &Path,
    delimiter: u8,
) -> Result<Ingested<CareRequestRecord>, AnalyticsError> {
    let file = std::fs::File::open(path)?;
    read_care_requests(file, delimiter)
}

pub fn load_wait_times(
    path: &Path,
    delimiter: u8,
) -> Result<Ingested<WaitTimeRecord>, AnalyticsError> {
    let file = std::fs::File::open(path)?;
    read_wait_times(file, delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const CARE_HEADER: &str = "id_solicitacao,data_solicitacao,especialidade,prioridade,status,data_agendamento,data_realizacao,unidade_solicitante,servico_destino";

    fn care_csv(rows: &[&str]) -> String {
        let mut out = String::from(CARE_HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn parses_supported_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        for raw in [
            "2024-03-05",
            "05/03/2024",
            "2024/03/05",
            "2024-03-05 14:30:00",
            "2024-03-05T14:30:00.250",
            "2024-03-05T14:30:00-03:00",
            "2024-03-05 14:30:00-03",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("05/03/24"), None);
        assert_eq!(parse_date("24-03-05"), None);
        assert_eq!(parse_date("2024-13-40"), None);
    }

    #[test]
    fn parses_numbers_with_either_separator() {
        assert_eq!(parse_number("12"), Some(12.0));
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("doze"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn missing_request_date_column_is_named_exactly() {
        let csv = "id_solicitacao,especialidade,prioridade,status,data_agendamento,data_realizacao,unidade_solicitante,servico_destino\n1,Cardiologia,P1,Aguardando,,,UBS Central,HU";
        let err = read_care_requests(csv.as_bytes(), b',').unwrap_err();
        match err {
            AnalyticsError::MissingColumns { missing } => {
                assert_eq!(missing, vec!["data_solicitacao".to_string()])
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn headers_match_case_insensitively_and_extra_columns_are_ignored() {
        let csv = " Data_Solicitacao ,TEMPO_ESPERA_DIAS,especialidade,unidade_solicitante,observacao\n2024-01-10,5,Cardiologia,UBS Central,ignored";
        let ingested = read_wait_times(csv.as_bytes(), b',').unwrap();
        assert_eq!(ingested.records.len(), 1);
        assert_eq!(ingested.records[0].wait_days, 5.0);
        assert!(ingested.warnings.is_empty());
    }

    #[test]
    fn wait_time_rows_with_bad_cells_are_dropped_not_fatal() {
        let csv = "data_solicitacao,tempo_espera_dias,especialidade,unidade_solicitante\n\
                   2024-01-10,5,Cardiologia,UBS Central\n\
                   ontem,7,Cardiologia,UBS Central\n\
                   2024-01-12,sete,Ortopedia,UBS Norte\n\
                   2024-01-13,-2,Ortopedia,UBS Norte\n\
                   2024-01-14,3,Ortopedia,UBS Norte";
        let ingested = read_wait_times(csv.as_bytes(), b',').unwrap();
        assert_eq!(ingested.records.len(), 2);
        let rows: Vec<usize> = ingested.warnings.iter().map(|w| w.row).collect();
        assert_eq!(rows, vec![3, 4, 5]);
    }

    #[test]
    fn care_requests_keep_rows_with_unparseable_dates() {
        let csv = care_csv(&[
            "1,2024-01-10,Cardiologia,P1,Aguardando,,,UBS Central,HU",
            "2,invalida,Ortopedia,P2,Agendado,2024-01-20,,UBS Norte,HU",
            ",2024-02-01,Ortopedia,P3,Cancelado,xx,,UBS Norte,HU",
        ]);
        let ingested = read_care_requests(csv.as_bytes(), b',').unwrap();
        assert_eq!(ingested.records.len(), 3);
        assert_eq!(ingested.records[1].request_date, None);
        assert_eq!(ingested.records[1].status, RequestStatus::Scheduled);
        assert_eq!(ingested.records[2].scheduled_date, None);
        assert!(ingested.records[2].id.starts_with("import-"));
        assert_eq!(ingested.warnings.len(), 2);
    }

    #[test]
    fn optional_columns_are_read_when_present() {
        let csv = "data_solicitacao;especialidade;prioridade;status;data_agendamento;data_realizacao;unidade_solicitante;servico_destino;canal;paciente_id\n\
                   10/01/2024;Cardiologia;P1;Realizado;15/01/2024;20/01/2024;UBS Central;HU;Telefone;";
        let ingested = read_care_requests(csv.as_bytes(), b';').unwrap();
        let record = &ingested.records[0];
        assert_eq!(record.channel.as_deref(), Some("Telefone"));
        assert_eq!(record.patient_id, None);
        assert_eq!(record.procedure, None);
        assert_eq!(record.scheduling_delay_days(), Some(5));
    }

    #[test]
    fn two_digit_years_are_dropped_with_a_warning() {
        let csv = "data_solicitacao,tempo_espera_dias,especialidade,unidade_solicitante\n\
                   05/03/24,5,Cardiologia,UBS Central\n\
                   2024-06-01,7,Cardiologia,UBS Central";
        let ingested = read_wait_times(csv.as_bytes(), b',').unwrap();
        assert_eq!(ingested.records.len(), 1);
        assert_eq!(ingested.warnings.len(), 1);
        assert_eq!(ingested.warnings[0].row, 2);
    }

    #[test]
    fn latin1_extra_header_is_ignored() {
        let mut csv = b"data_solicitacao,tempo_espera_dias,especialidade,unidade_solicitante,observa".to_vec();
        csv.extend_from_slice(&[0xE7, 0xE3]);
        csv.extend_from_slice(b"o\n2024-01-10,5,Cardiologia,UBS Central,nada\n");
        let ingested = read_wait_times(csv.as_slice(), b',').unwrap();
        assert_eq!(ingested.records.len(), 1);
        assert!(ingested.warnings.is_empty());
    }

    #[test]
    fn latin1_cell_keeps_the_care_request() {
        let mut csv = format!("{CARE_HEADER},municipio_destino\n").into_bytes();
        csv.extend_from_slice(b"1,2024-01-10,Cardiologia,P1,Aguardando,,,UBS Central,HU,S");
        csv.push(0xE3);
        csv.extend_from_slice(b"o Paulo\n");
        let ingested = read_care_requests(csv.as_slice(), b',').unwrap();
        assert_eq!(ingested.records.len(), 1);
        assert_eq!(ingested.records[0].status, RequestStatus::Waiting);
        let municipality = ingested.records[0].destination_municipality.as_deref().unwrap();
        assert!(municipality.starts_with('S') && municipality.ends_with("o Paulo"));
        assert_eq!(ingested.warnings.len(), 1);
        assert!(ingested.warnings[0].reason.contains("field 10"));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            care_csv(&["1,2024-01-10,Cardiologia,P1,Aguardando,,,UBS Central,HU"])
        )
        .unwrap();
        let ingested = load_care_requests(file.path(), b',').unwrap();
        assert_eq!(ingested.records.len(), 1);
    }

    #[test]
    fn empty_upload_reports_all_required_columns() {
        let err = read_wait_times("".as_bytes(), b',').unwrap_err();
        match err {
            AnalyticsError::MissingColumns { missing } => {
                assert_eq!(missing.len(), WAIT_TIME_REQUIRED.len())
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
