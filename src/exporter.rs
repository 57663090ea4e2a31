use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use crate::models::Application;

pub const EXPORT_HEADERS: [&str; 9] = [
    "ID",
    "Company",
    "Position",
    "Location",
    "Date Applied",
    "Source",
    "Status",
    "Salary",
    "Notes",
];

const SHEET_NAME: &str = "Applications";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("cannot detect export format of {0}; pass --format")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" => Some(ExportFormat::Excel),
            _ => None,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            other => Err(format!("unknown export format '{}' (csv, excel)", other)),
        }
    }
}

pub fn export_row(app: &Application, date_format: &str) -> [String; 9] {
    [
        app.id.clone(),
        app.company_name.clone(),
        app.position.clone(),
        app.location.clone().unwrap_or_default(),
        app.formatted_date(date_format),
        app.source.clone().unwrap_or_default(),
        app.status.to_string(),
        app.salary_expectation.clone().unwrap_or_default(),
        app.notes.clone().unwrap_or_default(),
    ]
}

/// Writes `apps` to `path`, returning the number of rows written.
pub fn export(
    apps: &[Application],
    path: &Path,
    format: Option<ExportFormat>,
    date_format: &str,
) -> Result<usize, ExportError> {
    let format = format
        .or_else(|| ExportFormat::from_path(path))
        .ok_or_else(|| ExportError::UnknownFormat(path.display().to_string()))?;
    let written = match format {
        ExportFormat::Csv => export_csv(apps, path, date_format)?,
        ExportFormat::Excel => export_xlsx(apps, path, date_format)?,
    };
    info!(path = %path.display(), ?format, rows = written, "exported applications");
    Ok(written)
}

/// UTF-8 with a byte-order mark so spreadsheet tools detect the encoding.
/// Rows are written in a single pass; on failure, earlier rows remain.
pub fn export_csv(apps: &[Application], path: &Path, date_format: &str) -> Result<usize, ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = BufWriter::new(File::create(path).map_err(io_err)?);
    file.write_all("\u{feff}".as_bytes()).map_err(io_err)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(EXPORT_HEADERS)?;
    for app in apps {
        writer.write_record(export_row(app, date_format))?;
    }
    writer.flush().map_err(io_err)?;
    Ok(apps.len())
}

pub fn export_xlsx(apps: &[Application], path: &Path, date_format: &str) -> Result<usize, ExportError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, app) in apps.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in export_row(app, date_format).iter().enumerate() {
            sheet.write_string(row, col as u16, value)?;
        }
    }
    sheet.autofit();

    workbook.save(path)?;
    Ok(apps.len())
}
