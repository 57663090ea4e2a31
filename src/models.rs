use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Applied,
    #[serde(rename = "Phone Screen")]
    PhoneScreen,
    Interview,
    Offer,
    Rejected,
    Withdrawn,
    Hired,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Applied,
        Status::PhoneScreen,
        Status::Interview,
        Status::Offer,
        Status::Rejected,
        Status::Withdrawn,
        Status::Hired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Applied => "Applied",
            Status::PhoneScreen => "Phone Screen",
            Status::Interview => "Interview",
            Status::Offer => "Offer",
            Status::Rejected => "Rejected",
            Status::Withdrawn => "Withdrawn",
            Status::Hired => "Hired",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    /// Accepts the display name or its snake_case form, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().to_lowercase() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Status selection for listing: everything, or one exact status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl FromStr for StatusFilter {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationFilter {
    pub status: StatusFilter,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub company_name: String,
    pub position: String,
    pub location: Option<String>,
    pub date_applied: Option<NaiveDate>,
    pub source: Option<String>,
    pub status: Status,
    pub salary_expectation: Option<String>,
    pub notes: Option<String>,
    pub resume_file: Option<String>,
    pub cover_letter_file: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Application {
    pub fn formatted_date(&self, format: &str) -> String {
        self.date_applied
            .map(|d| d.format(format).to_string())
            .unwrap_or_default()
    }

    pub fn to_draft(&self) -> ApplicationDraft {
        ApplicationDraft {
            company_name: self.company_name.clone(),
            position: self.position.clone(),
            location: self.location.clone(),
            date_applied: self.date_applied,
            source: self.source.clone(),
            status: self.status,
            salary_expectation: self.salary_expectation.clone(),
            notes: self.notes.clone(),
            resume_file: self.resume_file.clone(),
            cover_letter_file: self.cover_letter_file.clone(),
        }
    }
}

/// Editable fields of an application, used for both create and edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationDraft {
    pub company_name: String,
    pub position: String,
    pub location: Option<String>,
    pub date_applied: Option<NaiveDate>,
    pub source: Option<String>,
    pub status: Status,
    pub salary_expectation: Option<String>,
    pub notes: Option<String>,
    pub resume_file: Option<String>,
    pub cover_letter_file: Option<String>,
}

impl ApplicationDraft {
    pub fn new(company_name: &str, position: &str) -> Self {
        Self {
            company_name: company_name.to_string(),
            position: position.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: i64,
    pub application_id: String,
    pub old_status: Option<Status>,
    pub new_status: Status,
    pub changed_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub application_id: String,
    pub name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub application_id: String,
    pub remind_at: NaiveDateTime,
    pub message: String,
    pub done: bool,
}

/// Internal fields an imported column can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetField {
    CompanyName,
    Position,
    Location,
    DateApplied,
    Source,
    Status,
    SalaryExpectation,
    Notes,
}

impl TargetField {
    pub const ALL: [TargetField; 8] = [
        TargetField::CompanyName,
        TargetField::Position,
        TargetField::Location,
        TargetField::DateApplied,
        TargetField::Source,
        TargetField::Status,
        TargetField::SalaryExpectation,
        TargetField::Notes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetField::CompanyName => "company_name",
            TargetField::Position => "position",
            TargetField::Location => "location",
            TargetField::DateApplied => "date_applied",
            TargetField::Source => "source",
            TargetField::Status => "status",
            TargetField::SalaryExpectation => "salary_expectation",
            TargetField::Notes => "notes",
        }
    }

    /// Column label used by the exporter for this field.
    pub fn export_label(&self) -> &'static str {
        match self {
            TargetField::CompanyName => "Company",
            TargetField::Position => "Position",
            TargetField::Location => "Location",
            TargetField::DateApplied => "Date Applied",
            TargetField::Source => "Source",
            TargetField::Status => "Status",
            TargetField::SalaryExpectation => "Salary",
            TargetField::Notes => "Notes",
        }
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field '{0}' (expected one of: {known})", known = known_field_names())]
pub struct UnknownField(pub String);

fn known_field_names() -> String {
    let known: Vec<&str> = TargetField::ALL.iter().map(|t| t.as_str()).collect();
    known.join(", ")
}

impl FromStr for TargetField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        TargetField::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(key))
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}
