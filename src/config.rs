use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::Database;
use crate::models::TargetField;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file; defaults to the platform data directory.
    pub database: Option<PathBuf>,
    /// Tracing filter used when RUST_LOG is unset.
    pub log_level: Option<String>,
    pub import: ImportSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub delimiter: char,
    /// Rows missing any of these are skipped on import. Defaults to
    /// `company_name` and `position`, the fields the store itself requires;
    /// the desktop tool this replaces required all eight mapped fields.
    pub mandatory_fields: Vec<TargetField>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            delimiter: ',',
            mandatory_fields: vec![TargetField::CompanyName, TargetField::Position],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub date_format: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            date_format: "%d-%m-%Y".to_string(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default config file if one exists. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        if !config.import.delimiter.is_ascii() {
            anyhow::bail!("import.delimiter must be a single ASCII character");
        }
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "applyme")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(Database::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.import.delimiter, ',');
        assert_eq!(
            config.import.mandatory_fields,
            vec![TargetField::CompanyName, TargetField::Position]
        );
        assert_eq!(config.export.date_format, "%d-%m-%Y");
        assert!(config.database.is_none());
    }

    #[test]
    fn sections_override_individual_keys() {
        let config = Config::parse(
            r#"
            database = "/tmp/jobs.db"
            log_level = "debug"

            [import]
            delimiter = ";"
            mandatory_fields = ["company_name", "position", "status"]

            [export]
            date_format = "%Y-%m-%d"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/jobs.db"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.import.delimiter, ';');
        assert_eq!(config.import.mandatory_fields.len(), 3);
        assert_eq!(config.export.date_format, "%Y-%m-%d");
    }

    #[test]
    fn unknown_mandatory_field_is_rejected() {
        let err = Config::parse("[import]\nmandatory_fields = [\"salary\"]").unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());

        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "log_level = \"info\"").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("info"));
    }
}
