mod attachments;
mod config;
mod db;
mod error;
mod exporter;
mod identifier;
mod importer;
mod models;
mod tui;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use attachments::AttachmentKind;
use config::Config;
use db::Database;
use exporter::ExportFormat;
use importer::{FieldMapping, ImportFormat, ImportSource, RowOutcome};
use models::{Application, ApplicationDraft, ApplicationFilter, NewContact, Status, StatusFilter};

#[derive(Parser)]
#[command(name = "applyme")]
#[command(about = "Job application tracker - record, search, import and export applications")]
struct Cli {
    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Record a new application
    Add {
        /// Company name
        company: String,

        /// Position applied for
        position: String,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Edit fields of an application (pass an empty value to clear a field)
    Edit {
        /// Application ID
        id: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        position: Option<String>,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Change the status of an application
    Status {
        /// Application ID
        id: String,

        /// New status (Applied, "Phone Screen", Interview, Offer, Rejected, Withdrawn, Hired)
        status: Status,
    },

    /// List applications, newest first
    List {
        /// Filter by status, or "All"
        #[arg(short, long, default_value = "All")]
        status: StatusFilter,

        /// Case-insensitive match on company or position
        #[arg(short = 'q', long)]
        search: Option<String>,
    },

    /// Show application details
    Show {
        /// Application ID
        id: String,
    },

    /// Find an application by its visible columns
    Lookup {
        #[arg(long)]
        company: String,

        #[arg(long)]
        position: String,

        #[arg(long)]
        location: Option<String>,

        #[arg(long, default_value = "Applied")]
        status: Status,
    },

    /// Delete an application with its history, contacts and reminders
    Delete {
        /// Application ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the status history of an application
    History {
        /// Application ID
        id: String,
    },

    /// Import applications from CSV, Excel or JSON
    Import {
        /// Source file, or "-" to read pasted JSON from stdin
        file: PathBuf,

        /// Source format (csv, excel, json); detected from the extension by default
        #[arg(short, long)]
        format: Option<ImportFormat>,

        /// Field mapping as COLUMN=field; repeatable. Inferred from headers if omitted
        #[arg(short, long = "map")]
        map: Vec<String>,

        /// CSV delimiter (overrides the config file)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Show the source fields and mapping without importing (JSON is also pretty-printed)
        #[arg(long)]
        preview: bool,

        /// Validate rows without importing
        #[arg(long)]
        dry_run: bool,
    },

    /// Export applications to CSV or Excel
    Export {
        /// Destination file
        file: PathBuf,

        /// Output format (csv, excel); detected from the extension by default
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Only export applications with this status
        #[arg(short, long, default_value = "All")]
        status: StatusFilter,

        /// Only export applications matching this company or position
        #[arg(short = 'q', long)]
        search: Option<String>,
    },

    /// Open an attached resume or cover letter
    Open {
        /// Application ID
        id: String,

        /// Open the cover letter instead of the resume
        #[arg(long)]
        cover_letter: bool,
    },

    /// Manage contacts for an application
    Contact {
        #[command(subcommand)]
        command: ContactCommands,
    },

    /// Manage follow-up reminders
    Reminder {
        #[command(subcommand)]
        command: ReminderCommands,
    },

    /// Browse applications interactively
    Browse {
        #[arg(short, long, default_value = "All")]
        status: StatusFilter,

        #[arg(short = 'q', long)]
        search: Option<String>,
    },
}

#[derive(clap::Args)]
struct FieldArgs {
    #[arg(short, long)]
    location: Option<String>,

    /// Date applied (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,

    /// Where the posting was found
    #[arg(long)]
    source: Option<String>,

    #[arg(short, long)]
    status: Option<Status>,

    #[arg(long)]
    salary: Option<String>,

    #[arg(short, long)]
    notes: Option<String>,

    /// Path to the resume sent
    #[arg(long)]
    resume: Option<String>,

    /// Path to the cover letter sent
    #[arg(long)]
    cover_letter: Option<String>,
}

impl FieldArgs {
    fn apply(self, draft: &mut ApplicationDraft) -> Result<()> {
        if let Some(date) = self.date {
            draft.date_applied = parse_optional_date(&date)?;
        }
        if let Some(status) = self.status {
            draft.status = status;
        }
        let optional = [
            (self.location, &mut draft.location),
            (self.source, &mut draft.source),
            (self.salary, &mut draft.salary_expectation),
            (self.notes, &mut draft.notes),
            (self.resume, &mut draft.resume_file),
            (self.cover_letter, &mut draft.cover_letter_file),
        ];
        for (value, field) in optional {
            if let Some(value) = value {
                *field = Some(value);
            }
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum ContactCommands {
    /// Add a contact to an application
    Add {
        /// Application ID
        id: String,

        /// Contact name
        name: String,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List contacts of an application
    List {
        /// Application ID
        id: String,
    },

    /// Remove a contact
    Remove {
        /// Contact ID
        contact_id: i64,
    },
}

#[derive(Subcommand)]
enum ReminderCommands {
    /// Schedule a reminder for an application
    Add {
        /// Application ID
        id: String,

        /// When to remind ("YYYY-MM-DD" or "YYYY-MM-DD HH:MM")
        at: String,

        /// Reminder text
        message: String,
    },

    /// List reminders
    List {
        /// Only reminders for this application
        #[arg(long)]
        id: Option<String>,

        /// Only open reminders that are due now
        #[arg(long)]
        due: bool,
    },

    /// Mark a reminder as done
    Done {
        /// Reminder ID
        reminder_id: i64,
    },
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_deref().unwrap_or("warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config);

    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    if !matches!(cli.command, Commands::Init) && !db.is_initialized()? {
        bail!("Database not initialized. Run 'applyme init' first.");
    }

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Add {
            company,
            position,
            fields,
        } => {
            let mut draft = ApplicationDraft::new(&company, &position);
            fields.apply(&mut draft)?;
            let app = db.create_application(&draft)?;
            println!("Added application {} ({} at {})", app.id, app.position, app.company_name);
        }

        Commands::Edit {
            id,
            company,
            position,
            fields,
        } => {
            let app = require(&db, &id)?;
            let mut draft = app.to_draft();
            if let Some(company) = company {
                draft.company_name = company;
            }
            if let Some(position) = position {
                draft.position = position;
            }
            fields.apply(&mut draft)?;
            let updated = db.update_application(&id, &draft)?;
            println!("Updated application {}", updated.id);
            if updated.status != app.status {
                println!("Status: {} -> {}", app.status, updated.status);
            }
        }

        Commands::Status { id, status } => {
            if db.set_status(&id, status)? {
                println!("Marked {} as {}.", id, status);
            } else {
                println!("{} is already {}.", id, status);
            }
        }

        Commands::List { status, search } => {
            let apps = db.list_applications(&ApplicationFilter { status, search })?;
            print_table(&apps, &config.export.date_format);
        }

        Commands::Show { id } => {
            let app = require(&db, &id)?;
            print_details(&db, &app, &config.export.date_format)?;
        }

        Commands::Lookup {
            company,
            position,
            location,
            status,
        } => match db.find_by_display_key(&company, &position, location.as_deref(), status)? {
            Some(app) => print_details(&db, &app, &config.export.date_format)?,
            None => println!("No matching application."),
        },

        Commands::Delete { id, yes } => {
            let app = require(&db, &id)?;
            if !yes
                && !confirm(&format!(
                    "Delete {} ({} at {}) and its history? [y/N] ",
                    app.id, app.position, app.company_name
                ))?
            {
                println!("Cancelled.");
                return Ok(());
            }
            db.delete_application(&id)?;
            println!("Deleted application {}.", id);
        }

        Commands::History { id } => {
            require(&db, &id)?;
            print_history(&db, &id)?;
        }

        Commands::Import {
            file,
            format,
            map,
            delimiter,
            preview,
            dry_run,
        } => {
            run_import(&db, &config, file, format, &map, delimiter, preview, dry_run)?;
        }

        Commands::Export {
            file,
            format,
            status,
            search,
        } => {
            let apps = db.list_applications(&ApplicationFilter { status, search })?;
            let written = exporter::export(&apps, &file, format, &config.export.date_format)
                .with_context(|| format!("Failed to export to {}", file.display()))?;
            println!("Exported {} application(s) to {}", written, file.display());
        }

        Commands::Open { id, cover_letter } => {
            let app = require(&db, &id)?;
            let kind = if cover_letter {
                AttachmentKind::CoverLetter
            } else {
                AttachmentKind::Resume
            };
            attachments::open_attachment(&app, kind)
                .with_context(|| format!("Failed to open {} for {}", kind.label(), id))?;
        }

        Commands::Contact { command } => match command {
            ContactCommands::Add {
                id,
                name,
                role,
                email,
                phone,
                notes,
            } => {
                let contact_id = db.add_contact(
                    &id,
                    &NewContact {
                        name,
                        role,
                        email,
                        phone,
                        notes,
                    },
                )?;
                println!("Added contact #{} to {}", contact_id, id);
            }

            ContactCommands::List { id } => {
                require(&db, &id)?;
                let contacts = db.list_contacts(&id)?;
                if contacts.is_empty() {
                    println!("No contacts for {}.", id);
                } else {
                    println!("{:<6} {:<20} {:<16} {:<28} {:<14}", "ID", "NAME", "ROLE", "EMAIL", "PHONE");
                    println!("{}", "-".repeat(88));
                    for c in contacts {
                        println!(
                            "{:<6} {:<20} {:<16} {:<28} {:<14}",
                            c.id,
                            truncate(&c.name, 18),
                            truncate(&c.role.unwrap_or_default(), 14),
                            truncate(&c.email.unwrap_or_default(), 26),
                            c.phone.unwrap_or_default()
                        );
                    }
                }
            }

            ContactCommands::Remove { contact_id } => {
                db.delete_contact(contact_id)?;
                println!("Removed contact #{}.", contact_id);
            }
        },

        Commands::Reminder { command } => match command {
            ReminderCommands::Add { id, at, message } => {
                let remind_at = parse_reminder_time(&at)?;
                let reminder_id = db.add_reminder(&id, remind_at, &message)?;
                println!("Added reminder #{} for {} at {}", reminder_id, id, remind_at.format("%Y-%m-%d %H:%M"));
            }

            ReminderCommands::List { id, due } => {
                let reminders = if due {
                    db.list_due_reminders(chrono::Local::now().naive_local())?
                } else {
                    db.list_reminders(id.as_deref())?
                };
                let reminders: Vec<_> = reminders
                    .into_iter()
                    .filter(|r| id.as_deref().is_none_or(|id| r.application_id == id))
                    .collect();
                if reminders.is_empty() {
                    println!("No reminders.");
                } else {
                    println!("{:<6} {:<8} {:<17} {:<5} {}", "ID", "APP", "WHEN", "DONE", "MESSAGE");
                    println!("{}", "-".repeat(70));
                    for r in reminders {
                        println!(
                            "{:<6} {:<8} {:<17} {:<5} {}",
                            r.id,
                            r.application_id,
                            r.remind_at.format("%Y-%m-%d %H:%M"),
                            if r.done { "yes" } else { "" },
                            r.message
                        );
                    }
                }
            }

            ReminderCommands::Done { reminder_id } => {
                db.mark_reminder_done(reminder_id)?;
                println!("Reminder #{} done.", reminder_id);
            }
        },

        Commands::Browse { status, search } => {
            tui::run_browse(&db, ApplicationFilter { status, search }, &config.export.date_format)?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_import(
    db: &Database,
    config: &Config,
    file: PathBuf,
    format: Option<ImportFormat>,
    map: &[String],
    delimiter: Option<char>,
    preview: bool,
    dry_run: bool,
) -> Result<()> {
    let delimiter = delimiter.unwrap_or(config.import.delimiter);
    if !delimiter.is_ascii() {
        bail!("Delimiter must be a single ASCII character");
    }
    let source = if file.as_os_str() == "-" {
        ImportSource::from_json_reader(std::io::stdin().lock()).context("Failed to read JSON from stdin")?
    } else {
        ImportSource::open(&file, format, delimiter)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };
    debug!(phase = ?source.phase(), format = ?source.format(), fields = ?source.headers(), "import source ready");

    let mapping = if map.is_empty() {
        FieldMapping::infer(source.headers())
    } else {
        let mut mapping = FieldMapping::new();
        for pair in map {
            mapping.parse_pair(pair).map_err(|e| anyhow!(e))?;
        }
        mapping
    };

    if preview {
        if let Some(pretty) = source.json_pretty() {
            println!("{}\n", pretty);
        }
        if let Some(pairs) = source.json_preview() {
            println!("{:<30} {}", "KEY", "VALUE");
            println!("{}", "-".repeat(60));
            for (key, value) in pairs {
                println!("{:<30} {}", truncate(&key, 28), value);
            }
            println!();
        }
        println!("{:<30} {}", "SOURCE FIELD", "MAPPED TO");
        println!("{}", "-".repeat(50));
        for header in source.headers() {
            let target = mapping
                .target_for(header)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(dropped)".to_string());
            println!("{:<30} {}", truncate(header, 28), target);
        }
        return Ok(());
    }

    let mandatory = &config.import.mandatory_fields;
    let mut mapped = source.map_fields(&mapping)?;
    let report = mapped.validate(mandatory);
    debug!(phase = ?mapped.phase(), issues = report.issues.len(), "import rows validated");
    if !report.is_clean() {
        println!("Some rows contain missing fields ({} row(s) will be skipped):", report.rows_affected());
        for issue in &report.issues {
            println!("  {}", issue);
        }
        println!();
    }

    if dry_run {
        let total = mapped.rows().len();
        println!(
            "{} row(s) read, {} would be imported. (Dry run - nothing was imported)",
            total,
            total - report.rows_affected()
        );
        return Ok(());
    }

    let summary = mapped.start(mandatory).run(db, |progress, outcome| {
        match outcome {
            RowOutcome::Inserted { row, id, .. } => {
                eprintln!("  [{}/{}] row {} -> {}", progress.processed, progress.total, row, id)
            }
            RowOutcome::Skipped { row, reason } => {
                eprintln!("  [{}/{}] row {} skipped: {}", progress.processed, progress.total, row, reason)
            }
        }
        ControlFlow::Continue(())
    })?;

    println!("\n{}", summary);
    for warning in &summary.warnings {
        println!("  {}", warning);
    }
    println!("{} application(s) on record.", db.count_applications()?);
    Ok(())
}

fn require(db: &Database, id: &str) -> Result<Application> {
    db.get_application(id)?
        .ok_or_else(|| anyhow!("Application {} not found", id))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn parse_optional_date(s: &str) -> Result<Option<NaiveDate>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Some)
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

fn parse_reminder_time(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(at) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Ok(at);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid time '{}', expected YYYY-MM-DD [HH:MM]", s))?;
    Ok(date.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()))
}

fn print_table(apps: &[Application], date_format: &str) {
    if apps.is_empty() {
        println!("No applications found.");
        return;
    }
    println!(
        "{:<8} {:<13} {:<22} {:<24} {:<16} {:<10}",
        "ID", "STATUS", "COMPANY", "POSITION", "LOCATION", "APPLIED"
    );
    println!("{}", "-".repeat(98));
    for app in apps {
        println!(
            "{:<8} {:<13} {:<22} {:<24} {:<16} {:<10}",
            app.id,
            app.status,
            truncate(&app.company_name, 20),
            truncate(&app.position, 22),
            truncate(app.location.as_deref().unwrap_or("-"), 14),
            app.formatted_date(date_format)
        );
    }
}

fn print_details(db: &Database, app: &Application, date_format: &str) -> Result<()> {
    println!("Application {}", app.id);
    println!("Company: {}", app.company_name);
    println!("Position: {}", app.position);
    println!("Status: {}", app.status);
    if let Some(location) = &app.location {
        println!("Location: {}", location);
    }
    if app.date_applied.is_some() {
        println!("Applied: {}", app.formatted_date(date_format));
    }
    if let Some(source) = &app.source {
        println!("Source: {}", source);
    }
    if let Some(salary) = &app.salary_expectation {
        println!("Salary: {}", salary);
    }
    if let Some(resume) = &app.resume_file {
        println!("Resume: {}", resume);
    }
    if let Some(cover) = &app.cover_letter_file {
        println!("Cover letter: {}", cover);
    }
    println!("Created: {}", app.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated: {}", app.updated_at.format("%Y-%m-%d %H:%M"));
    if let Some(notes) = &app.notes {
        println!("\n--- Notes ---\n{}", notes);
    }

    println!();
    print_history(db, &app.id)?;

    let contacts = db.list_contacts(&app.id)?;
    if !contacts.is_empty() {
        println!("\nContacts ({}):", contacts.len());
        for c in contacts {
            let role = c.role.map(|r| format!(" ({})", r)).unwrap_or_default();
            let email = c.email.map(|e| format!(" <{}>", e)).unwrap_or_default();
            println!("  #{} {}{}{}", c.id, c.name, role, email);
        }
    }

    let reminders = db.list_reminders(Some(&app.id))?;
    if !reminders.is_empty() {
        println!("\nReminders ({}):", reminders.len());
        for r in reminders {
            let done = if r.done { " [done]" } else { "" };
            println!("  #{} {} {}{}", r.id, r.remind_at.format("%Y-%m-%d %H:%M"), r.message, done);
        }
    }
    Ok(())
}

fn print_history(db: &Database, id: &str) -> Result<()> {
    let history = db.status_history(id)?;
    println!("Status history:");
    for change in history {
        let from = change
            .old_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "(created)".to_string());
        println!(
            "  {}  {} -> {}",
            change.changed_at.format("%Y-%m-%d %H:%M"),
            from,
            change.new_status
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
