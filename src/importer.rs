//! Import of application records from CSV, Excel and JSON sources.
//!
//! An import moves through `FileSelected -> FieldsMapped -> Validated ->
//! Importing -> Completed`:
//!
//! - [`ImportSource::open`] reads only the external field names.
//! - [`ImportSource::map_fields`] applies a [`FieldMapping`] and loads the rows.
//! - [`MappedImport::validate`] reports rows missing mandatory fields without
//!   removing them.
//! - [`MappedImport::start`] hands the rows to an [`ImportRun`], which inserts
//!   them one at a time, skipping rows that still lack a mandatory field, and
//!   can be cancelled between rows.

use calamine::{open_workbook_auto, Data, DataType, Reader, Sheets};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::TrackerError;
use crate::models::{ApplicationDraft, Status, TargetField};

/// Dates in import sources must use this format; anything else is dropped.
pub const IMPORT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to open workbook: {0}")]
    Workbook(String),

    #[error("workbook has no worksheets")]
    NoWorksheet,

    #[error("source has no header row")]
    NoHeaderRow,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported JSON structure: {0}")]
    Structure(String),

    #[error("source contains no data rows")]
    Empty,

    #[error("cannot detect import format of {0}; pass --format")]
    UnknownFormat(String),

    #[error("mapped column '{0}' does not exist in the source")]
    UnknownColumn(String),

    #[error("no columns are mapped to application fields")]
    EmptyMapping,

    #[error(transparent)]
    Store(#[from] TrackerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Excel,
    Json,
}

impl ImportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(ImportFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(ImportFormat::Excel),
            "json" => Some(ImportFormat::Json),
            _ => None,
        }
    }
}

impl FromStr for ImportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ImportFormat::Csv),
            "excel" | "xlsx" => Ok(ImportFormat::Excel),
            "json" => Ok(ImportFormat::Json),
            other => Err(format!("unknown import format '{}' (csv, excel, json)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    FileSelected,
    FieldsMapped,
    Validated,
    Importing,
    Completed,
    Cancelled,
}

// --- Field mapping ---

/// Ordered correspondence from external field names to internal fields.
/// Several external fields may target the same internal field; the one that
/// comes later in the source wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<(String, TargetField)>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, external: &str, target: TargetField) {
        let external = clean_header(external);
        match self.entries.iter_mut().find(|(name, _)| *name == external) {
            Some(entry) => entry.1 = target,
            None => self.entries.push((external, target)),
        }
    }

    /// Parses `External Column=internal_field`.
    pub fn parse_pair(&mut self, pair: &str) -> Result<(), String> {
        let (external, target) = pair
            .rsplit_once('=')
            .ok_or_else(|| format!("expected COLUMN=field, got '{}'", pair))?;
        let target: TargetField = target.parse().map_err(|e| format!("{}", e))?;
        if external.trim().is_empty() {
            return Err(format!("missing column name in '{}'", pair));
        }
        self.insert(external, target);
        Ok(())
    }

    /// Maps every header whose name matches an internal field name or an
    /// export column label.
    pub fn infer(headers: &[String]) -> Self {
        let mut mapping = Self::new();
        for header in headers {
            let key = normalize_key(header);
            let target = TargetField::ALL.into_iter().find(|field| {
                normalize_key(field.as_str()) == key || normalize_key(field.export_label()) == key
            });
            if let Some(target) = target {
                mapping.insert(header, target);
            }
        }
        mapping
    }

    pub fn target_for(&self, external: &str) -> Option<TargetField> {
        self.entries
            .iter()
            .find(|(name, _)| name == external)
            .map(|(_, target)| *target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TargetField)> {
        self.entries.iter().map(|(name, target)| (name.as_str(), *target))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn clean_header(s: &str) -> String {
    s.replace('\u{feff}', "").trim().to_string()
}

// --- FileSelected ---

enum SourceData {
    Csv { path: PathBuf, delimiter: u8 },
    Excel { path: PathBuf },
    Json {
        rows: Vec<Vec<String>>,
        document: serde_json::Value,
    },
}

pub struct ImportSource {
    format: ImportFormat,
    headers: Vec<String>,
    data: SourceData,
}

impl ImportSource {
    pub fn open(path: &Path, format: Option<ImportFormat>, delimiter: char) -> Result<Self, ImportError> {
        let format = format
            .or_else(|| ImportFormat::from_path(path))
            .ok_or_else(|| ImportError::UnknownFormat(path.display().to_string()))?;

        let source = match format {
            ImportFormat::Csv => {
                let delimiter = delimiter as u8;
                let headers = {
                    let mut reader = csv_reader(path, delimiter)?;
                    reader.headers()?.iter().map(clean_header).collect::<Vec<_>>()
                };
                Self {
                    format,
                    headers,
                    data: SourceData::Csv {
                        path: path.to_path_buf(),
                        delimiter,
                    },
                }
            }
            ImportFormat::Excel => {
                let headers = excel_header_row(path)?;
                Self {
                    format,
                    headers: headers.iter().map(|h| clean_header(h)).collect(),
                    data: SourceData::Excel {
                        path: path.to_path_buf(),
                    },
                }
            }
            ImportFormat::Json => {
                let text = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json_str(&text)?
            }
        };

        if source.headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::NoHeaderRow);
        }
        info!(path = %path.display(), format = ?source.format, columns = source.headers.len(), "opened import source");
        Ok(source)
    }

    /// Reads pasted JSON, e.g. from stdin, to the end.
    pub fn from_json_reader<R: Read>(mut reader: R) -> Result<Self, ImportError> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|source| ImportError::Io {
                path: PathBuf::from("<stdin>"),
                source,
            })?;
        Self::from_json_str(&text)
    }

    /// Accepts a flat JSON object (one record) or an array of flat objects.
    pub fn from_json_str(text: &str) -> Result<Self, ImportError> {
        let document: serde_json::Value = serde_json::from_str(text)?;
        let objects = match &document {
            serde_json::Value::Object(map) => vec![map],
            serde_json::Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    serde_json::Value::Object(map) => Ok(map),
                    other => Err(ImportError::Structure(format!(
                        "array element {} is {}, expected an object",
                        i + 1,
                        json_kind(other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(ImportError::Structure(format!(
                    "top level is {}, expected an object or an array of objects",
                    json_kind(other)
                )));
            }
        };

        let mut headers: Vec<String> = Vec::new();
        for object in &objects {
            for key in object.keys() {
                let key = clean_header(key);
                if !headers.contains(&key) {
                    headers.push(key);
                }
            }
        }
        if headers.is_empty() {
            return Err(ImportError::Empty);
        }

        let rows = objects
            .iter()
            .map(|object| {
                let values: HashMap<String, String> = object
                    .iter()
                    .map(|(k, v)| (clean_header(k), json_value_to_string(v)))
                    .collect();
                headers
                    .iter()
                    .map(|h| values.get(h).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Self {
            format: ImportFormat::Json,
            headers,
            data: SourceData::Json { rows, document },
        })
    }

    pub fn format(&self) -> ImportFormat {
        self.format
    }

    pub fn phase(&self) -> ImportPhase {
        ImportPhase::FileSelected
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Key/value pairs of the first JSON record, for previewing pasted JSON.
    pub fn json_preview(&self) -> Option<Vec<(String, String)>> {
        match &self.data {
            SourceData::Json { rows, .. } => rows.first().map(|row| {
                self.headers.iter().cloned().zip(row.iter().cloned()).collect()
            }),
            _ => None,
        }
    }

    /// The JSON document re-indented, keys in their original order.
    pub fn json_pretty(&self) -> Option<String> {
        match &self.data {
            SourceData::Json { document, .. } => serde_json::to_string_pretty(document).ok(),
            _ => None,
        }
    }

    pub fn map_fields(self, mapping: &FieldMapping) -> Result<MappedImport, ImportError> {
        if mapping.is_empty() {
            return Err(ImportError::EmptyMapping);
        }
        if let Some((missing, _)) = mapping
            .iter()
            .find(|(name, _)| !self.headers.iter().any(|h| h.as_str() == *name))
        {
            return Err(ImportError::UnknownColumn(missing.to_string()));
        }

        let targets: Vec<Option<TargetField>> =
            self.headers.iter().map(|h| mapping.target_for(h)).collect();

        let raw_rows = match self.data {
            SourceData::Csv { path, delimiter } => {
                let mut reader = csv_reader(&path, delimiter)?;
                let mut rows = Vec::new();
                for record in reader.records() {
                    rows.push(record?.iter().map(str::to_string).collect::<Vec<_>>());
                }
                rows
            }
            SourceData::Excel { path } => excel_rows(&path)?.into_iter().skip(1).collect(),
            SourceData::Json { rows, .. } => rows,
        };

        let rows: Vec<MappedRow> = raw_rows
            .into_iter()
            .enumerate()
            .filter(|(_, values)| values.iter().any(|v| !v.trim().is_empty()))
            .map(|(i, values)| {
                let mut fields = HashMap::new();
                for (target, value) in targets.iter().zip(values.iter()) {
                    if let Some(target) = target {
                        fields.insert(*target, value.trim().to_string());
                    }
                }
                MappedRow { row: i + 1, fields }
            })
            .collect();

        if rows.is_empty() {
            return Err(ImportError::Empty);
        }
        debug!(rows = rows.len(), "mapped import rows");
        Ok(MappedImport {
            rows,
            phase: ImportPhase::FieldsMapped,
        })
    }
}

fn csv_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<File>, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(file))
}

fn open_first_sheet(path: &Path) -> Result<(Sheets<BufReader<File>>, String), ImportError> {
    if !path.exists() {
        return Err(ImportError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        });
    }
    let workbook = open_workbook_auto(path).map_err(|e| ImportError::Workbook(e.to_string()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ImportError::NoWorksheet)?;
    Ok((workbook, sheet))
}

/// The first row of the first worksheet. `.xlsx` sheets are streamed cell by
/// cell and reading stops at the second row; other formats load the sheet.
fn excel_header_row(path: &Path) -> Result<Vec<String>, ImportError> {
    let (mut workbook, sheet) = open_first_sheet(path)?;
    let Sheets::Xlsx(xlsx) = &mut workbook else {
        return excel_rows(path)?
            .into_iter()
            .next()
            .ok_or(ImportError::NoHeaderRow);
    };

    let mut cells = xlsx
        .worksheet_cells_reader(&sheet)
        .map_err(|e| ImportError::Workbook(e.to_string()))?;
    let first_col = cells.dimensions().start.1;
    let mut header_row = None;
    let mut headers: Vec<String> = Vec::new();
    while let Some(cell) = cells
        .next_cell()
        .map_err(|e| ImportError::Workbook(e.to_string()))?
    {
        let (row, col) = cell.get_position();
        if *header_row.get_or_insert(row) != row {
            break;
        }
        let idx = col.saturating_sub(first_col) as usize;
        if headers.len() <= idx {
            headers.resize(idx + 1, String::new());
        }
        headers[idx] = cell_to_string(&Data::from(cell.get_value().clone()));
    }
    if header_row.is_none() {
        return Err(ImportError::NoHeaderRow);
    }
    Ok(headers)
}

/// All rows of the first worksheet, header included, as strings.
fn excel_rows(path: &Path) -> Result<Vec<Vec<String>>, ImportError> {
    let (mut workbook, sheet) = open_first_sheet(path)?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ImportError::Workbook(e.to_string()))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(_) => cell
            .as_date()
            .map(|d| d.format(IMPORT_DATE_FORMAT).to_string())
            .unwrap_or_else(|| cell.to_string()),
        _ => cell.to_string(),
    }
}

fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// --- FieldsMapped / Validated ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRow {
    /// 1-based position among the source's data rows.
    pub row: usize,
    pub fields: HashMap<TargetField, String>,
}

impl MappedRow {
    pub fn get(&self, field: TargetField) -> Option<&str> {
        self.fields
            .get(&field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn missing(&self, mandatory: &[TargetField]) -> Vec<TargetField> {
        mandatory
            .iter()
            .copied()
            .filter(|field| self.get(*field).is_none())
            .collect()
    }

    /// Builds the record for this row along with any non-fatal conversion warnings.
    pub fn to_draft(&self) -> (ApplicationDraft, Vec<String>) {
        let mut warnings = Vec::new();
        let owned = |field| self.get(field).map(str::to_string);

        let date_applied = self.get(TargetField::DateApplied).and_then(|raw| {
            match NaiveDate::parse_from_str(raw, IMPORT_DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(_) => {
                    warnings.push(format!(
                        "Row {}: date '{}' is not YYYY-MM-DD, stored without a date",
                        self.row, raw
                    ));
                    None
                }
            }
        });

        let status = match self.get(TargetField::Status) {
            None => Status::default(),
            Some(raw) => raw.parse::<Status>().unwrap_or_else(|_| {
                warnings.push(format!(
                    "Row {}: unknown status '{}', stored as {}",
                    self.row,
                    raw,
                    Status::default()
                ));
                Status::default()
            }),
        };

        let draft = ApplicationDraft {
            company_name: owned(TargetField::CompanyName).unwrap_or_default(),
            position: owned(TargetField::Position).unwrap_or_default(),
            location: owned(TargetField::Location),
            date_applied,
            source: owned(TargetField::Source),
            status,
            salary_expectation: owned(TargetField::SalaryExpectation),
            notes: owned(TargetField::Notes),
            resume_file: None,
            cover_letter_file: None,
        };
        (draft, warnings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowIssue {
    pub row: usize,
    pub field: TargetField,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: Missing mandatory field '{}'", self.row, self.field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<RowIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of distinct rows with at least one issue.
    pub fn rows_affected(&self) -> usize {
        let mut rows: Vec<usize> = self.issues.iter().map(|i| i.row).collect();
        rows.dedup();
        rows.len()
    }
}

pub struct MappedImport {
    rows: Vec<MappedRow>,
    phase: ImportPhase,
}

impl MappedImport {
    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn rows(&self) -> &[MappedRow] {
        &self.rows
    }

    /// Advisory check: reports every missing mandatory field, drops nothing.
    pub fn validate(&mut self, mandatory: &[TargetField]) -> ValidationReport {
        self.phase = ImportPhase::Validated;
        let issues = self
            .rows
            .iter()
            .flat_map(|row| {
                row.missing(mandatory)
                    .into_iter()
                    .map(move |field| RowIssue { row: row.row, field })
            })
            .collect();
        ValidationReport { issues }
    }

    pub fn start(self, mandatory: &[TargetField]) -> ImportRun {
        ImportRun {
            rows: self.rows,
            mandatory: mandatory.to_vec(),
            next: 0,
            phase: ImportPhase::Importing,
            summary: ImportSummary::default(),
        }
    }
}

// --- Importing / Completed ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted {
        row: usize,
        id: String,
        warnings: Vec<String>,
    },
    Skipped {
        row: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub total: usize,
    pub inserted: Vec<String>,
    pub skipped: Vec<usize>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} of {} rows ({} skipped)",
            self.inserted.len(),
            self.total,
            self.skipped.len()
        )?;
        if self.cancelled {
            write!(f, ", cancelled after row {}", self.inserted.len() + self.skipped.len())?;
        }
        Ok(())
    }
}

pub struct ImportRun {
    rows: Vec<MappedRow>,
    mandatory: Vec<TargetField>,
    next: usize,
    phase: ImportPhase,
    summary: ImportSummary,
}

impl ImportRun {
    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.next,
            total: self.rows.len(),
        }
    }

    /// Processes the next row. Returns `None` once every row is done or the
    /// run was cancelled. Rows already inserted stay committed.
    pub fn step(&mut self, db: &Database) -> Result<Option<RowOutcome>, ImportError> {
        if self.phase != ImportPhase::Importing {
            return Ok(None);
        }
        let Some(row) = self.rows.get(self.next) else {
            self.phase = ImportPhase::Completed;
            return Ok(None);
        };

        let missing = row.missing(&self.mandatory);
        let outcome = if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
            warn!(row = row.row, missing = ?names, "skipping import row");
            RowOutcome::Skipped {
                row: row.row,
                reason: format!("missing {}", names.join(", ")),
            }
        } else {
            let (draft, warnings) = row.to_draft();
            match db.create_application(&draft) {
                Ok(app) => {
                    debug!(row = row.row, id = %app.id, "imported row");
                    RowOutcome::Inserted {
                        row: row.row,
                        id: app.id,
                        warnings,
                    }
                }
                Err(TrackerError::Validation { field }) => {
                    warn!(row = row.row, field, "skipping import row");
                    RowOutcome::Skipped {
                        row: row.row,
                        reason: format!("missing {}", field),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.next += 1;
        self.summary.total = self.rows.len();
        match &outcome {
            RowOutcome::Inserted { id, warnings, .. } => {
                self.summary.inserted.push(id.clone());
                self.summary.warnings.extend(warnings.iter().cloned());
            }
            RowOutcome::Skipped { row, .. } => self.summary.skipped.push(*row),
        }
        if self.next == self.rows.len() {
            self.phase = ImportPhase::Completed;
        }
        Ok(Some(outcome))
    }

    pub fn cancel(&mut self) {
        if self.phase == ImportPhase::Importing {
            info!(processed = self.next, total = self.rows.len(), "import cancelled");
            self.phase = ImportPhase::Cancelled;
            self.summary.cancelled = true;
        }
    }

    /// Runs the remaining rows, calling `on_row` after each one. Returning
    /// `ControlFlow::Break` from the callback cancels before the next row.
    pub fn run<F>(mut self, db: &Database, mut on_row: F) -> Result<ImportSummary, ImportError>
    where
        F: FnMut(Progress, &RowOutcome) -> ControlFlow<()>,
    {
        while let Some(outcome) = self.step(db)? {
            if on_row(self.progress(), &outcome).is_break() {
                self.cancel();
            }
        }
        Ok(self.finish())
    }

    pub fn finish(mut self) -> ImportSummary {
        self.summary.total = self.rows.len();
        info!(
            phase = ?self.phase(),
            inserted = self.summary.inserted.len(),
            skipped = self.summary.skipped.len(),
            cancelled = self.summary.cancelled,
            "import finished"
        );
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationFilter;
    use std::io::Write;

    const MANDATORY: [TargetField; 2] = [TargetField::CompanyName, TargetField::Position];

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn mapping_of(pairs: &[(&str, TargetField)]) -> FieldMapping {
        let mut mapping = FieldMapping::new();
        for (external, target) in pairs {
            mapping.insert(external, *target);
        }
        mapping
    }

    fn standard_mapping() -> FieldMapping {
        mapping_of(&[
            ("Company", TargetField::CompanyName),
            ("Role", TargetField::Position),
            ("City", TargetField::Location),
            ("Applied On", TargetField::DateApplied),
            ("Stage", TargetField::Status),
        ])
    }

    #[test]
    fn row_missing_position_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "apps.csv",
            "Company,Role,City,Applied On,Stage\n\
             Acme,Engineer,Berlin,2024-03-01,Applied\n\
             Globex,,Paris,2024-03-02,Interview\n\
             Initech,Analyst,Austin,2024-03-03,Offer\n",
        );
        let db = Database::open_in_memory().unwrap();
        let before = db.count_applications().unwrap();

        let source = ImportSource::open(&path, None, ',').unwrap();
        assert_eq!(source.phase(), ImportPhase::FileSelected);
        assert_eq!(source.headers(), ["Company", "Role", "City", "Applied On", "Stage"]);

        let mut mapped = source.map_fields(&standard_mapping()).unwrap();
        let report = mapped.validate(&MANDATORY);
        assert_eq!(mapped.phase(), ImportPhase::Validated);
        assert_eq!(report.issues, vec![RowIssue { row: 2, field: TargetField::Position }]);
        assert_eq!(report.issues[0].to_string(), "Row 2: Missing mandatory field 'position'");
        assert_eq!(mapped.rows().len(), 3);

        let summary = mapped.start(&MANDATORY).run(&db, |_, _| ControlFlow::Continue(())).unwrap();
        assert_eq!(summary.inserted, vec!["AC001".to_string(), "IN001".to_string()]);
        assert_eq!(summary.skipped, vec![2]);
        assert!(!summary.cancelled);
        assert_eq!(db.count_applications().unwrap(), before + 2);

        let acme = db.get_application("AC001").unwrap().unwrap();
        assert_eq!(acme.location.as_deref(), Some("Berlin"));
        assert_eq!(acme.date_applied, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(db.status_history("AC001").unwrap().len(), 1);
        assert_eq!(db.get_application("IN001").unwrap().unwrap().status, Status::Offer);
    }

    #[test]
    fn cancelling_keeps_rows_already_inserted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "apps.csv",
            "company_name,position\nAcme,Engineer\nGlobex,Analyst\nInitech,Tester\n",
        );
        let db = Database::open_in_memory().unwrap();
        let mapped = ImportSource::open(&path, None, ',')
            .unwrap()
            .map_fields(&FieldMapping::infer(&["company_name".into(), "position".into()]))
            .unwrap();

        let mut seen = Vec::new();
        let summary = mapped
            .start(&MANDATORY)
            .run(&db, |progress, _| {
                seen.push(progress);
                if progress.processed == 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.inserted.len(), 1);
        assert_eq!(seen, vec![Progress { processed: 1, total: 3 }]);
        assert_eq!(db.count_applications().unwrap(), 1);
    }

    #[test]
    fn stepping_walks_phases_in_order() {
        let db = Database::open_in_memory().unwrap();
        let source =
            ImportSource::from_json_str(r#"{"company_name": "Acme", "position": "Engineer"}"#)
                .unwrap();
        let mapping = FieldMapping::infer(source.headers());
        let mapped = source.map_fields(&mapping).unwrap();
        assert_eq!(mapped.phase(), ImportPhase::FieldsMapped);

        let mut run = mapped.start(&MANDATORY);
        assert_eq!(run.phase(), ImportPhase::Importing);
        assert!(matches!(run.step(&db).unwrap(), Some(RowOutcome::Inserted { .. })));
        assert_eq!(run.phase(), ImportPhase::Completed);
        assert!(run.step(&db).unwrap().is_none());
        assert_eq!(run.finish().inserted.len(), 1);
    }

    #[test]
    fn later_column_wins_for_shared_target_and_unmapped_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "apps.csv",
            "\u{feff}Company,Title,Job Title,Ignored\nAcme,Dev,Senior Dev,whatever\n",
        );
        let source = ImportSource::open(&path, Some(ImportFormat::Csv), ',').unwrap();
        assert_eq!(source.headers()[0], "Company");

        let mapping = mapping_of(&[
            ("Company", TargetField::CompanyName),
            ("Title", TargetField::Position),
            ("Job Title", TargetField::Position),
        ]);
        let mapped = source.map_fields(&mapping).unwrap();
        let row = &mapped.rows()[0];
        assert_eq!(row.get(TargetField::Position), Some("Senior Dev"));
        assert_eq!(row.fields.len(), 2);
    }

    #[test]
    fn mapping_unknown_column_is_rejected() {
        let source = ImportSource::from_json_str(r#"{"company": "Acme"}"#).unwrap();
        let mapping = mapping_of(&[("employer", TargetField::CompanyName)]);
        assert!(matches!(
            source.map_fields(&mapping),
            Err(ImportError::UnknownColumn(name)) if name == "employer"
        ));
    }

    #[test]
    fn parse_pair_validates_target() {
        let mut mapping = FieldMapping::new();
        mapping.parse_pair("Job Title=position").unwrap();
        assert_eq!(mapping.target_for("Job Title"), Some(TargetField::Position));
        assert!(mapping.parse_pair("Pay=salary").is_err());
        assert!(mapping.parse_pair("no equals sign").is_err());
    }

    #[test]
    fn bad_date_and_unknown_status_do_not_fail_row() {
        let db = Database::open_in_memory().unwrap();
        let source = ImportSource::from_json_str(
            r#"[{"company_name": "Acme", "position": "Engineer", "date_applied": "01-03-2024", "status": "ghosted"}]"#,
        )
        .unwrap();
        let mapping = FieldMapping::infer(source.headers());
        let summary = source
            .map_fields(&mapping)
            .unwrap()
            .start(&MANDATORY)
            .run(&db, |_, _| ControlFlow::Continue(()))
            .unwrap();

        assert_eq!(summary.inserted.len(), 1);
        assert_eq!(summary.warnings.len(), 2);
        let app = db.get_application(&summary.inserted[0]).unwrap().unwrap();
        assert_eq!(app.date_applied, None);
        assert_eq!(app.status, Status::Applied);
    }

    #[test]
    fn json_object_is_previewed_as_key_values() {
        let source =
            ImportSource::from_json_str(r#"{"company_name": "Acme", "salary_expectation": 90000, "notes": null}"#)
                .unwrap();
        let preview = source.json_preview().unwrap();
        assert!(preview.contains(&("salary_expectation".to_string(), "90000".to_string())));
        assert!(preview.contains(&("notes".to_string(), String::new())));
    }

    #[test]
    fn json_keys_keep_their_pasted_order() {
        let source =
            ImportSource::from_json_str(r#"{"position": "Dev", "company_name": "Acme", "notes": "x"}"#)
                .unwrap();
        assert_eq!(source.headers(), ["position", "company_name", "notes"]);
        let keys: Vec<String> = source.json_preview().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["position", "company_name", "notes"]);

        let pretty = source.json_pretty().unwrap();
        assert_eq!(
            pretty,
            "{\n  \"position\": \"Dev\",\n  \"company_name\": \"Acme\",\n  \"notes\": \"x\"\n}"
        );
    }

    #[test]
    fn pasted_json_array_is_imported() {
        let pasted = br#"[
            {"company_name": "Acme", "position": "Engineer", "status": "Interview"},
            {"company_name": "Globex"}
        ]"#;
        let source = ImportSource::from_json_reader(&pasted[..]).unwrap();
        assert_eq!(source.format(), ImportFormat::Json);
        let mapping = FieldMapping::infer(source.headers());

        let db = Database::open_in_memory().unwrap();
        let summary = source
            .map_fields(&mapping)
            .unwrap()
            .start(&MANDATORY)
            .run(&db, |_, _| ControlFlow::Continue(()))
            .unwrap();
        assert_eq!(summary.inserted, vec!["AC001".to_string()]);
        assert_eq!(summary.skipped, vec![2]);
        assert_eq!(db.get_application("AC001").unwrap().unwrap().status, Status::Interview);
        assert_eq!(db.count_applications().unwrap(), 1);
    }

    #[test]
    fn blank_rows_keep_source_row_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "apps.csv", "company_name,position\n,\nAcme,\nGlobex,Engineer\n");
        let source = ImportSource::open(&path, None, ',').unwrap();
        let mapping = FieldMapping::infer(source.headers());
        let mut mapped = source.map_fields(&mapping).unwrap();
        assert_eq!(mapped.rows().len(), 2);

        let report = mapped.validate(&MANDATORY);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].to_string(), "Row 2: Missing mandatory field 'position'");

        let db = Database::open_in_memory().unwrap();
        let summary = mapped.start(&MANDATORY).run(&db, |_, _| ControlFlow::Continue(())).unwrap();
        assert_eq!(summary.skipped, vec![2]);
        assert_eq!(summary.inserted, vec!["GL001".to_string()]);
    }

    #[test]
    fn malformed_sources_fail_before_mapping() {
        assert!(matches!(
            ImportSource::from_json_str("{not json"),
            Err(ImportError::Json(_))
        ));
        assert!(matches!(
            ImportSource::from_json_str("[1, 2]"),
            Err(ImportError::Structure(_))
        ));
        assert!(matches!(
            ImportSource::from_json_str("\"text\""),
            Err(ImportError::Structure(_))
        ));
        assert!(matches!(
            ImportSource::open(Path::new("/nonexistent/apps.csv"), None, ','),
            Err(ImportError::Io { .. })
        ));
        assert!(matches!(
            ImportSource::open(Path::new("apps.txt"), None, ','),
            Err(ImportError::UnknownFormat(_))
        ));
    }

    #[test]
    fn header_only_csv_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "apps.csv", "company_name,position\n");
        let source = ImportSource::open(&path, None, ',').unwrap();
        let mapping = FieldMapping::infer(source.headers());
        assert!(matches!(source.map_fields(&mapping), Err(ImportError::Empty)));
    }

    #[test]
    fn semicolon_delimiter_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "apps.csv", "Company;Position\nAcme;Engineer\n");
        let source = ImportSource::open(&path, None, ';').unwrap();
        assert_eq!(source.headers(), ["Company", "Position"]);
        let mapping = FieldMapping::infer(source.headers());
        let mapped = source.map_fields(&mapping).unwrap();
        assert_eq!(mapped.rows()[0].get(TargetField::CompanyName), Some("Acme"));
    }

    #[test]
    fn excel_first_sheet_is_imported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["company_name", "position", "date_applied"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "Acme").unwrap();
        sheet.write_string(1, 1, "Engineer").unwrap();
        sheet.write_string(1, 2, "2024-05-06").unwrap();
        sheet.write_string(2, 0, "Globex").unwrap();
        sheet.write_number(2, 1, 42).unwrap();
        workbook.save(&path).unwrap();

        let db = Database::open_in_memory().unwrap();
        let source = ImportSource::open(&path, None, ',').unwrap();
        assert_eq!(source.format(), ImportFormat::Excel);
        assert_eq!(source.headers(), ["company_name", "position", "date_applied"]);
        let mapping = FieldMapping::infer(source.headers());
        let summary = source
            .map_fields(&mapping)
            .unwrap()
            .start(&MANDATORY)
            .run(&db, |_, _| ControlFlow::Continue(()))
            .unwrap();

        assert_eq!(summary.inserted.len(), 2);
        let acme = db.get_application("AC001").unwrap().unwrap();
        assert_eq!(acme.date_applied, NaiveDate::from_ymd_opt(2024, 5, 6));
        let globex = db.get_application("GL001").unwrap().unwrap();
        assert_eq!(globex.position, "42");
        assert_eq!(db.list_applications(&ApplicationFilter::default()).unwrap().len(), 2);
    }
}
