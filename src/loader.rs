use crate::pipeline::Record;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const UTF8_BOM: &str = "\u{feff}";

/// Errors raised while reading an uploaded dataset
///
/// Each one aborts the load it came from and nothing else.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Unsupported file extension: {0}")]
    UnsupportedFormat(String),

    #[error("File has no extension")]
    MissingExtension,

    #[error("File has no header row")]
    Empty,

    #[error("Column '{0}' not found")]
    UnknownColumn(String),

    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid Excel file: {0}")]
    Excel(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A table of text cells with a header row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub headers: Vec<String>,

    /// Data rows, each exactly `headers.len()` cells long
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset, padding short rows with empty cells
    ///
    /// Cells past the last header are discarded.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, InputError> {
        if headers.is_empty() {
            return Err(InputError::Empty);
        }

        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Turn each row into a [`Record`] whose text is `column`
    ///
    /// # Errors
    /// * `InputError::UnknownColumn` if no header is named `column`
    pub fn records(&self, column: &str) -> Result<Vec<Record>, InputError> {
        let index = self
            .column_index(column)
            .ok_or_else(|| InputError::UnknownColumn(column.to_string()))?;

        Ok(self
            .rows
            .iter()
            .enumerate()
            .map(|(row, values)| Record {
                row,
                raw_text: values[index].clone(),
                values: values.clone(),
            })
            .collect())
    }
}

/// Parse CSV bytes; the first record is the header row
///
/// # Examples
/// ```
/// use sentiment_portal::loader::from_csv;
///
/// let dataset = from_csv(b"id,Message\n1,\"Muito bom, recomendo\"\n2\n").unwrap();
/// assert_eq!(dataset.headers, vec!["id", "Message"]);
/// assert_eq!(dataset.rows[0][1], "Muito bom, recomendo");
/// assert_eq!(dataset.rows[1], vec!["2", ""]);
/// ```
pub fn from_csv(bytes: &[u8]) -> Result<Dataset, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches(UTF8_BOM) } else { h };
            h.trim().to_string()
        })
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(InputError::Empty);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(String::from).collect());
    }

    Dataset::new(headers, rows)
}

/// Parse the first sheet of an Excel workbook; its first row is the header
#[cfg(feature = "web")]
pub fn from_excel(bytes: &[u8]) -> Result<Dataset, InputError> {
    use calamine::{Reader, open_workbook_auto_from_rs};
    use std::io::Cursor;

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| InputError::Excel(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| InputError::Excel("No sheets found in Excel file".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| InputError::Excel(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| cell_to_string(c).trim().to_string()).collect(),
        None => return Err(InputError::Empty),
    };

    if headers.iter().all(String::is_empty) {
        return Err(InputError::Empty);
    }

    let rows = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Dataset::new(headers, rows)
}

#[cfg(feature = "web")]
fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data;

    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Whole numbers come back as floats from most writers
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

#[cfg(not(feature = "web"))]
pub fn from_excel(_bytes: &[u8]) -> Result<Dataset, InputError> {
    Err(InputError::Excel(
        "Excel support requires the 'web' feature".to_string(),
    ))
}

/// Detect the format from the file name and parse the bytes
///
/// # Examples
/// ```
/// use sentiment_portal::loader::{InputError, load_dataset};
///
/// assert!(load_dataset("opinioes.CSV", b"Message\nbom\n").is_ok());
/// assert!(matches!(
///     load_dataset("opinioes.txt", b""),
///     Err(InputError::UnsupportedFormat(ext)) if ext == "txt"
/// ));
/// ```
pub fn load_dataset(filename: &str, bytes: &[u8]) -> Result<Dataset, InputError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    let dataset = match extension.as_deref() {
        Some("csv") => from_csv(bytes),
        Some("xlsx") | Some("xls") => from_excel(bytes),
        Some(ext) => Err(InputError::UnsupportedFormat(ext.to_string())),
        None => Err(InputError::MissingExtension),
    }?;

    log::info!(
        "Loaded '{}': {} rows, {} columns",
        filename,
        dataset.len(),
        dataset.headers.len()
    );

    Ok(dataset)
}

/// Read and parse a dataset from disk
pub fn load_path(path: impl AsRef<Path>) -> Result<Dataset, InputError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    load_dataset(filename, &bytes)
}
