use crate::pipeline::{BatchOutcome, LabeledRecord};
use thiserror::Error;

/// Suggested file name for the CSV download
pub const DOWNLOAD_FILE_NAME: &str = "analise_sentimento.csv";

/// Suggested file name for the Excel download
pub const XLSX_FILE_NAME: &str = "analise_sentimento.xlsx";

/// Columns appended after the original ones
pub const RESULT_COLUMNS: [&str; 2] = ["normalized_text", "sentiment"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),

    #[error("exported CSV is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[cfg(feature = "web")]
    #[error("failed to write Excel workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Header row of an export: the original columns, then the result columns
pub fn export_headers(outcome: &BatchOutcome) -> Vec<&str> {
    outcome
        .headers
        .iter()
        .map(String::as_str)
        .chain(RESULT_COLUMNS)
        .collect()
}

fn export_row(record: &LabeledRecord) -> impl Iterator<Item = &str> {
    record
        .record
        .values
        .iter()
        .map(String::as_str)
        .chain([record.normalized_text.as_str(), record.sentiment.as_str()])
}

/// Convert a batch outcome to CSV
///
/// Writes every original column followed by `normalized_text` and
/// `sentiment`, one line per labelled record. Quoting is handled by the
/// csv writer.
///
/// # Examples
/// ```
/// use sentiment_portal::downloader::to_csv;
/// use sentiment_portal::loader::from_csv;
/// use sentiment_portal::pipeline::BatchPipeline;
///
/// let dataset = from_csv(b"id,Message\n1,Excelente produto\n").unwrap();
/// let outcome = BatchPipeline::default().run_dataset(&dataset, "Message").unwrap();
///
/// let csv = to_csv(&outcome).unwrap();
/// assert!(csv.starts_with("id,Message,normalized_text,sentiment\n"));
/// ```
pub fn to_csv(outcome: &BatchOutcome) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(export_headers(outcome))?;
    for record in &outcome.records {
        writer.write_record(export_row(record))?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Convert a batch outcome to XLSX, with the same layout as [`to_csv`]
#[cfg(feature = "web")]
pub fn to_xlsx(outcome: &BatchOutcome) -> Result<Vec<u8>, ExportError> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Resultados")?;

    let bold = Format::new().set_bold();
    for (c, header) in export_headers(outcome).into_iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, header, &bold)?;
    }

    for (r, record) in outcome.records.iter().enumerate() {
        for (c, value) in export_row(record).enumerate() {
            worksheet.write_string((r + 1) as u32, c as u16, value)?;
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Sentiment;
    use crate::pipeline::{DropCounters, Record};

    fn outcome() -> BatchOutcome {
        let labeled = |row: usize, values: &[&str], normalized: &str, sentiment| LabeledRecord {
            record: Record {
                row,
                raw_text: values[1].to_string(),
                values: values.iter().map(|v| v.to_string()).collect(),
            },
            normalized_text: normalized.to_string(),
            sentiment,
        };

        BatchOutcome {
            headers: vec!["id".to_string(), "Message".to_string()],
            text_column: "Message".to_string(),
            input_len: 3,
            records: vec![
                labeled(0, &["1", "Ótimo, \"recomendo\""], "ótimo recomendo", Sentiment::Positive),
                labeled(2, &["3", "Demorou demais"], "demorou demais", Sentiment::Negative),
            ],
            counters: DropCounters {
                empty_after_normalize: 1,
                classifier_error: 0,
            },
        }
    }

    #[test]
    fn csv_appends_result_columns() {
        let csv = to_csv(&outcome()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "id,Message,normalized_text,sentiment");
        assert_eq!(lines[1], "1,\"Ótimo, \"\"recomendo\"\"\",ótimo recomendo,positive");
        assert_eq!(lines[2], "3,Demorou demais,demorou demais,negative");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn csv_round_trips_through_reader() {
        let csv = to_csv(&outcome()).unwrap();
        let dataset = crate::loader::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(dataset.rows[0][1], "Ótimo, \"recomendo\"");
        assert_eq!(dataset.rows[1][3], "negative");
    }

    #[test]
    fn empty_outcome_has_only_headers() {
        let mut outcome = outcome();
        outcome.records.clear();
        assert_eq!(to_csv(&outcome).unwrap(), "id,Message,normalized_text,sentiment\n");
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_has_same_layout() {
        let bytes = to_xlsx(&outcome()).unwrap();
        let dataset = crate::loader::load_dataset("resultado.xlsx", &bytes).unwrap();

        assert_eq!(
            dataset.headers,
            vec!["id", "Message", "normalized_text", "sentiment"]
        );
        assert_eq!(dataset.rows.len(), 2);
        assert_eq!(dataset.rows[1][3], "negative");
    }
}
