use chrono::{NaiveDateTime, Local};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{TrackerError, TrackerResult};
use crate::identifier;
use crate::models::{
    Application, ApplicationDraft, ApplicationFilter, Contact, NewContact, Reminder, Status,
    StatusChange, StatusFilter,
};

const APPLICATION_COLUMNS: &str = "id, company_name, position, location, date_applied, source, status,
     salary_expectation, notes, resume_file, cover_letter_file, created_at, updated_at";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> TrackerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> TrackerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "applyme") {
            proj_dirs.data_dir().join("applyme.db")
        } else {
            PathBuf::from("applyme.db")
        }
    }

    pub fn init(&self) -> TrackerResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                company_name TEXT NOT NULL CHECK (length(trim(company_name)) > 0),
                position TEXT NOT NULL CHECK (length(trim(position)) > 0),
                location TEXT,
                date_applied TEXT,
                source TEXT,
                status TEXT NOT NULL DEFAULT 'Applied' CHECK (status IN
                    ('Applied', 'Phone Screen', 'Interview', 'Offer', 'Rejected', 'Withdrawn', 'Hired')),
                salary_expectation TEXT,
                notes TEXT,
                resume_file TEXT,
                cover_letter_file TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                old_status TEXT,
                new_status TEXT NOT NULL,
                changed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                role TEXT,
                email TEXT,
                phone TEXT,
                notes TEXT
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                remind_at TEXT NOT NULL,
                message TEXT NOT NULL,
                done INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
            CREATE INDEX IF NOT EXISTS idx_applications_created ON applications(created_at);
            CREATE INDEX IF NOT EXISTS idx_history_application ON status_history(application_id);
            CREATE INDEX IF NOT EXISTS idx_contacts_application ON contacts(application_id);
            CREATE INDEX IF NOT EXISTS idx_reminders_application ON reminders(application_id);
            "#,
        )?;
        Ok(())
    }

    pub fn is_initialized(&self) -> TrackerResult<bool> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        Ok(tables > 0)
    }

    // --- Application operations ---

    pub fn create_application(&self, draft: &ApplicationDraft) -> TrackerResult<Application> {
        let draft = normalize(draft)?;
        let now = now();

        let tx = self.conn.unchecked_transaction()?;
        let id = next_identifier_with(&tx, &draft.company_name)?;
        tx.execute(
            "INSERT INTO applications (id, company_name, position, location, date_applied, source,
                 status, salary_expectation, notes, resume_file, cover_letter_file, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                id,
                draft.company_name,
                draft.position,
                draft.location,
                draft.date_applied,
                draft.source,
                draft.status,
                draft.salary_expectation,
                draft.notes,
                draft.resume_file,
                draft.cover_letter_file,
                now,
            ],
        )?;
        record_status_change(&tx, &id, None, draft.status, now)?;
        tx.commit()?;

        info!(%id, company = %draft.company_name, "created application");
        Ok(Application {
            id,
            company_name: draft.company_name,
            position: draft.position,
            location: draft.location,
            date_applied: draft.date_applied,
            source: draft.source,
            status: draft.status,
            salary_expectation: draft.salary_expectation,
            notes: draft.notes,
            resume_file: draft.resume_file,
            cover_letter_file: draft.cover_letter_file,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces every editable field of `id`. A status change is appended to
    /// the history only when it differs from the stored status.
    pub fn update_application(&self, id: &str, draft: &ApplicationDraft) -> TrackerResult<Application> {
        let draft = normalize(draft)?;
        let now = now();

        let tx = self.conn.unchecked_transaction()?;
        let old_status: Status = tx
            .query_row("SELECT status FROM applications WHERE id = ?1", [id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))?;

        tx.execute(
            "UPDATE applications SET company_name = ?2, position = ?3, location = ?4,
                 date_applied = ?5, source = ?6, status = ?7, salary_expectation = ?8, notes = ?9,
                 resume_file = ?10, cover_letter_file = ?11, updated_at = ?12
             WHERE id = ?1",
            params![
                id,
                draft.company_name,
                draft.position,
                draft.location,
                draft.date_applied,
                draft.source,
                draft.status,
                draft.salary_expectation,
                draft.notes,
                draft.resume_file,
                draft.cover_letter_file,
                now,
            ],
        )?;
        if old_status != draft.status {
            record_status_change(&tx, id, Some(old_status), draft.status, now)?;
            info!(%id, from = %old_status, to = %draft.status, "status changed");
        }
        tx.commit()?;

        self.get_application(id)?
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))
    }

    /// Returns whether the status actually changed.
    pub fn set_status(&self, id: &str, status: Status) -> TrackerResult<bool> {
        let app = self
            .get_application(id)?
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))?;
        if app.status == status {
            return Ok(false);
        }
        let mut draft = app.to_draft();
        draft.status = status;
        self.update_application(id, &draft)?;
        Ok(true)
    }

    pub fn delete_application(&self, id: &str) -> TrackerResult<()> {
        let deleted = self.conn.execute("DELETE FROM applications WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(TrackerError::NotFound(id.to_string()));
        }
        info!(%id, "deleted application");
        Ok(())
    }

    pub fn get_application(&self, id: &str) -> TrackerResult<Option<Application>> {
        let sql = format!("SELECT {} FROM applications WHERE id = ?1", APPLICATION_COLUMNS);
        let app = self
            .conn
            .query_row(&sql, [id], Self::row_to_application)
            .optional()?;
        Ok(app)
    }

    pub fn list_applications(&self, filter: &ApplicationFilter) -> TrackerResult<Vec<Application>> {
        let mut sql = format!("SELECT {} FROM applications WHERE 1=1", APPLICATION_COLUMNS);
        let mut params: Vec<String> = vec![];

        if let StatusFilter::Only(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", params.len() + 1));
            params.push(status.as_str().to_string());
        }

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let n = params.len() + 1;
            sql.push_str(&format!(
                " AND (instr(lower(company_name), lower(?{n})) > 0 OR instr(lower(position), lower(?{n})) > 0)"
            ));
            params.push(search.to_string());
        }

        sql.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), Self::row_to_application)?;
        let apps = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(apps)
    }

    /// Resolves a record from its visible columns. Two records sharing all four
    /// values are indistinguishable here; the earliest inserted one wins.
    pub fn find_by_display_key(
        &self,
        company_name: &str,
        position: &str,
        location: Option<&str>,
        status: Status,
    ) -> TrackerResult<Option<Application>> {
        let sql = format!(
            "SELECT {} FROM applications
             WHERE company_name = ?1 AND position = ?2 AND location IS ?3 AND status = ?4
             ORDER BY rowid LIMIT 1",
            APPLICATION_COLUMNS
        );
        let location = location.map(str::trim).filter(|l| !l.is_empty());
        let app = self
            .conn
            .query_row(
                &sql,
                params![company_name.trim(), position.trim(), location, status],
                Self::row_to_application,
            )
            .optional()?;
        Ok(app)
    }

    pub fn count_applications(&self) -> TrackerResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn status_history(&self, application_id: &str) -> TrackerResult<Vec<StatusChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, old_status, new_status, changed_at
             FROM status_history WHERE application_id = ?1
             ORDER BY changed_at, id",
        )?;
        let rows = stmt.query_map([application_id], |row| {
            Ok(StatusChange {
                id: row.get(0)?,
                application_id: row.get(1)?,
                old_status: row.get(2)?,
                new_status: row.get(3)?,
                changed_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            company_name: row.get(1)?,
            position: row.get(2)?,
            location: row.get(3)?,
            date_applied: row.get(4)?,
            source: row.get(5)?,
            status: row.get(6)?,
            salary_expectation: row.get(7)?,
            notes: row.get(8)?,
            resume_file: row.get(9)?,
            cover_letter_file: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    // --- Contact operations ---

    pub fn add_contact(&self, application_id: &str, contact: &NewContact) -> TrackerResult<i64> {
        self.require_application(application_id)?;
        let name = contact.name.trim();
        if name.is_empty() {
            return Err(TrackerError::Validation { field: "name" });
        }
        self.conn.execute(
            "INSERT INTO contacts (application_id, name, role, email, phone, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                application_id,
                name,
                clean(&contact.role),
                clean(&contact.email),
                clean(&contact.phone),
                clean(&contact.notes),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_contacts(&self, application_id: &str) -> TrackerResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, name, role, email, phone, notes
             FROM contacts WHERE application_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([application_id], |row| {
            Ok(Contact {
                id: row.get(0)?,
                application_id: row.get(1)?,
                name: row.get(2)?,
                role: row.get(3)?,
                email: row.get(4)?,
                phone: row.get(5)?,
                notes: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete_contact(&self, contact_id: i64) -> TrackerResult<()> {
        let deleted = self.conn.execute("DELETE FROM contacts WHERE id = ?1", [contact_id])?;
        if deleted == 0 {
            return Err(TrackerError::NotFound(format!("contact #{}", contact_id)));
        }
        Ok(())
    }

    // --- Reminder operations ---

    pub fn add_reminder(
        &self,
        application_id: &str,
        remind_at: NaiveDateTime,
        message: &str,
    ) -> TrackerResult<i64> {
        self.require_application(application_id)?;
        let message = message.trim();
        if message.is_empty() {
            return Err(TrackerError::Validation { field: "message" });
        }
        self.conn.execute(
            "INSERT INTO reminders (application_id, remind_at, message) VALUES (?1, ?2, ?3)",
            params![application_id, remind_at, message],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_reminders(&self, application_id: Option<&str>) -> TrackerResult<Vec<Reminder>> {
        let mut sql = String::from(
            "SELECT id, application_id, remind_at, message, done FROM reminders",
        );
        if application_id.is_some() {
            sql.push_str(" WHERE application_id = ?1");
        }
        sql.push_str(" ORDER BY remind_at, id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(id) = application_id {
            stmt.query_map([id], Self::row_to_reminder)?
        } else {
            stmt.query_map([], Self::row_to_reminder)?
        };
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Open reminders due at or before `until`.
    pub fn list_due_reminders(&self, until: NaiveDateTime) -> TrackerResult<Vec<Reminder>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, remind_at, message, done FROM reminders
             WHERE done = 0 AND remind_at <= ?1 ORDER BY remind_at, id",
        )?;
        let rows = stmt.query_map([until], Self::row_to_reminder)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn mark_reminder_done(&self, reminder_id: i64) -> TrackerResult<()> {
        let updated = self
            .conn
            .execute("UPDATE reminders SET done = 1 WHERE id = ?1", [reminder_id])?;
        if updated == 0 {
            return Err(TrackerError::NotFound(format!("reminder #{}", reminder_id)));
        }
        Ok(())
    }

    fn row_to_reminder(row: &rusqlite::Row) -> rusqlite::Result<Reminder> {
        Ok(Reminder {
            id: row.get(0)?,
            application_id: row.get(1)?,
            remind_at: row.get(2)?,
            message: row.get(3)?,
            done: row.get(4)?,
        })
    }

    fn require_application(&self, id: &str) -> TrackerResult<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM applications WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(TrackerError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn next_identifier_with(conn: &Connection, company_name: &str) -> TrackerResult<String> {
    let prefix = identifier::prefix_for(company_name);
    let mut stmt = conn.prepare("SELECT id FROM applications WHERE substr(id, 1, length(?1)) = ?1")?;
    let ids = stmt
        .query_map([&prefix], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(identifier::next_for(&prefix, ids.iter().map(String::as_str)))
}

fn record_status_change(
    conn: &Connection,
    application_id: &str,
    old_status: Option<Status>,
    new_status: Status,
    at: NaiveDateTime,
) -> TrackerResult<()> {
    conn.execute(
        "INSERT INTO status_history (application_id, old_status, new_status, changed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![application_id, old_status, new_status, at],
    )?;
    Ok(())
}

fn normalize(draft: &ApplicationDraft) -> TrackerResult<ApplicationDraft> {
    let company_name = draft.company_name.trim();
    if company_name.is_empty() {
        return Err(TrackerError::Validation { field: "company_name" });
    }
    let position = draft.position.trim();
    if position.is_empty() {
        return Err(TrackerError::Validation { field: "position" });
    }
    Ok(ApplicationDraft {
        company_name: company_name.to_string(),
        position: position.to_string(),
        location: clean(&draft.location),
        date_applied: draft.date_applied,
        source: clean(&draft.source),
        status: draft.status,
        salary_expectation: clean(&draft.salary_expectation),
        notes: clean(&draft.notes),
        resume_file: clean(&draft.resume_file),
        cover_letter_file: clean(&draft.cover_letter_file),
    })
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn draft(company: &str, position: &str, status: Status) -> ApplicationDraft {
        ApplicationDraft {
            status,
            ..ApplicationDraft::new(company, position)
        }
    }

    #[test]
    fn identifiers_increase_within_prefix() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_application(&draft("Acme", "Engineer", Status::Applied)).unwrap();
        let second = db.create_application(&draft("acorn", "Designer", Status::Applied)).unwrap();
        let other = db.create_application(&draft("Globex", "Analyst", Status::Applied)).unwrap();

        assert_eq!(first.id, "AC001");
        assert_eq!(second.id, "AC002");
        assert_eq!(other.id, "GL001");
        assert_eq!(next_identifier_with(&db.conn, "Acme Labs").unwrap(), "AC003");
    }

    #[test]
    fn short_company_name_gets_short_prefix() {
        let db = Database::open_in_memory().unwrap();
        let app = db.create_application(&draft("X", "Engineer", Status::Applied)).unwrap();
        assert_eq!(app.id, "X001");
    }

    #[test]
    fn create_records_single_initial_history_entry() {
        let db = Database::open_in_memory().unwrap();
        let app = db.create_application(&draft("Acme", "Engineer", Status::Interview)).unwrap();

        let history = db.status_history(&app.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_status, None);
        assert_eq!(history[0].new_status, Status::Interview);
    }

    #[test]
    fn status_change_appends_history_only_when_different() {
        let db = Database::open_in_memory().unwrap();
        let app = db.create_application(&draft("Acme", "Engineer", Status::Applied)).unwrap();

        let mut edit = app.to_draft();
        edit.notes = Some("called back".to_string());
        db.update_application(&app.id, &edit).unwrap();
        assert_eq!(db.status_history(&app.id).unwrap().len(), 1);

        edit.status = Status::Offer;
        let updated = db.update_application(&app.id, &edit).unwrap();
        assert_eq!(updated.status, Status::Offer);
        assert_eq!(updated.notes.as_deref(), Some("called back"));
        assert!(updated.updated_at >= app.updated_at);

        let history = db.status_history(&app.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].old_status, Some(Status::Applied));
        assert_eq!(history[1].new_status, Status::Offer);

        assert!(!db.set_status(&app.id, Status::Offer).unwrap());
        assert!(db.set_status(&app.id, Status::Hired).unwrap());
        assert_eq!(db.status_history(&app.id).unwrap().len(), 3);
    }

    #[test]
    fn delete_cascades_to_children() {
        let db = Database::open_in_memory().unwrap();
        let app = db.create_application(&draft("Acme", "Engineer", Status::Applied)).unwrap();
        db.set_status(&app.id, Status::Interview).unwrap();
        db.add_contact(
            &app.id,
            &NewContact {
                name: "Dana".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        let at = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        db.add_reminder(&app.id, at, "follow up").unwrap();

        db.delete_application(&app.id).unwrap();

        assert!(db.get_application(&app.id).unwrap().is_none());
        assert!(db.status_history(&app.id).unwrap().is_empty());
        assert!(db.list_contacts(&app.id).unwrap().is_empty());
        assert!(db.list_reminders(Some(&app.id)).unwrap().is_empty());
        assert!(matches!(
            db.delete_application(&app.id),
            Err(TrackerError::NotFound(_))
        ));
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = db.create_application(&draft("  ", "Engineer", Status::Applied)).unwrap_err();
        assert!(matches!(err, TrackerError::Validation { field: "company_name" }));
        let err = db.create_application(&draft("Acme", "", Status::Applied)).unwrap_err();
        assert!(matches!(err, TrackerError::Validation { field: "position" }));
        assert_eq!(db.count_applications().unwrap(), 0);
    }

    #[test]
    fn update_missing_application_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .update_application("ZZ001", &draft("Acme", "Engineer", Status::Applied))
            .unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(id) if id == "ZZ001"));
    }

    #[test]
    fn list_is_newest_first_and_filters_intersect() {
        let db = Database::open_in_memory().unwrap();
        db.create_application(&draft("Acme", "Backend Engineer", Status::Applied)).unwrap();
        db.create_application(&draft("Globex", "Data Analyst", Status::Rejected)).unwrap();
        db.create_application(&draft("Initech", "Frontend engineer", Status::Rejected)).unwrap();

        let all = db.list_applications(&ApplicationFilter::default()).unwrap();
        let names: Vec<&str> = all.iter().map(|a| a.company_name.as_str()).collect();
        assert_eq!(names, vec!["Initech", "Globex", "Acme"]);

        let rejected = db
            .list_applications(&ApplicationFilter {
                status: StatusFilter::Only(Status::Rejected),
                search: None,
            })
            .unwrap();
        assert_eq!(rejected.len(), 2);
        assert!(rejected.iter().all(|a| a.status == Status::Rejected));

        let search = db
            .list_applications(&ApplicationFilter {
                status: StatusFilter::All,
                search: Some("ENGINEER".to_string()),
            })
            .unwrap();
        assert_eq!(search.len(), 2);

        let both = db
            .list_applications(&ApplicationFilter {
                status: StatusFilter::Only(Status::Rejected),
                search: Some("engineer".to_string()),
            })
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].company_name, "Initech");

        let by_company = db
            .list_applications(&ApplicationFilter {
                status: StatusFilter::All,
                search: Some("glo".to_string()),
            })
            .unwrap();
        assert_eq!(by_company.len(), 1);
    }

    #[test]
    fn display_key_lookup_returns_first_match() {
        let db = Database::open_in_memory().unwrap();
        let mut d = draft("Acme", "Engineer", Status::Applied);
        d.location = Some("Berlin".to_string());
        let first = db.create_application(&d).unwrap();
        db.create_application(&d).unwrap();
        db.create_application(&draft("Acme", "Engineer", Status::Applied)).unwrap();

        let found = db
            .find_by_display_key("Acme", "Engineer", Some("Berlin"), Status::Applied)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);

        let no_location = db
            .find_by_display_key("Acme", "Engineer", None, Status::Applied)
            .unwrap()
            .unwrap();
        assert_eq!(no_location.id, "AC003");

        assert!(db
            .find_by_display_key("Acme", "Engineer", Some("Berlin"), Status::Offer)
            .unwrap()
            .is_none());
    }

    #[test]
    fn reminders_due_excludes_done_and_future() {
        let db = Database::open_in_memory().unwrap();
        let app = db.create_application(&draft("Acme", "Engineer", Status::Applied)).unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2030, 1, d).unwrap().and_hms_opt(9, 0, 0).unwrap();

        let past = db.add_reminder(&app.id, day(1), "send thank-you").unwrap();
        db.add_reminder(&app.id, day(2), "prep interview").unwrap();
        db.add_reminder(&app.id, day(20), "check back").unwrap();
        db.mark_reminder_done(past).unwrap();

        let due = db.list_due_reminders(day(10)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].message, "prep interview");
        assert!(matches!(
            db.add_reminder("ZZ001", day(1), "nope"),
            Err(TrackerError::NotFound(_))
        ));
    }
}
