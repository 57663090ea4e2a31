use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::attachments::{self, AttachmentKind};
use crate::db::Database;
use crate::error::TrackerResult;
use crate::models::{Application, ApplicationFilter, Contact, Reminder, Status, StatusChange, StatusFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Normal,
    Search(String),
    ConfirmDelete,
}

struct AppState {
    apps: Vec<Application>,
    filter: ApplicationFilter,
    selected: usize,
    scroll_offset: u16,
    history: Vec<StatusChange>,
    contacts: Vec<Contact>,
    reminders: Vec<Reminder>,
    mode: Mode,
    message: Option<String>,
    date_format: String,
}

impl AppState {
    fn new(filter: ApplicationFilter, date_format: &str) -> Self {
        Self {
            apps: Vec::new(),
            filter,
            selected: 0,
            scroll_offset: 0,
            history: Vec::new(),
            contacts: Vec::new(),
            reminders: Vec::new(),
            mode: Mode::Normal,
            message: None,
            date_format: date_format.to_string(),
        }
    }

    fn current(&self) -> Option<&Application> {
        self.apps.get(self.selected)
    }

    /// Re-runs the query and keeps the same record selected when it is still listed.
    fn reload(&mut self, db: &Database) -> TrackerResult<()> {
        let keep = self.current().map(|a| a.id.clone());
        self.apps = db.list_applications(&self.filter)?;
        self.selected = keep
            .and_then(|id| self.apps.iter().position(|a| a.id == id))
            .unwrap_or(0)
            .min(self.apps.len().saturating_sub(1));
        self.load_details(db)
    }

    fn load_details(&mut self, db: &Database) -> TrackerResult<()> {
        self.scroll_offset = 0;
        let Some(id) = self.current().map(|a| a.id.clone()) else {
            self.history.clear();
            self.contacts.clear();
            self.reminders.clear();
            return Ok(());
        };
        self.history = db.status_history(&id)?;
        self.contacts = db.list_contacts(&id)?;
        self.reminders = db.list_reminders(Some(&id))?;
        Ok(())
    }

    fn next(&mut self) {
        if !self.apps.is_empty() && self.selected < self.apps.len() - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn cycle_status_filter(&mut self) {
        self.filter.status = next_status_filter(self.filter.status);
    }
}

fn next_status_filter(current: StatusFilter) -> StatusFilter {
    match current {
        StatusFilter::All => StatusFilter::Only(Status::ALL[0]),
        StatusFilter::Only(status) => {
            let idx = Status::ALL.iter().position(|s| *s == status).unwrap_or(0);
            Status::ALL
                .get(idx + 1)
                .map(|s| StatusFilter::Only(*s))
                .unwrap_or(StatusFilter::All)
        }
    }
}

pub fn run_browse(db: &Database, filter: ApplicationFilter, date_format: &str) -> Result<()> {
    let mut state = AppState::new(filter, date_format);
    state.reload(db)?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    db: &Database,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select(if state.apps.is_empty() { None } else { Some(state.selected) });
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let mode = state.mode.clone();
        let outcome = match mode {
            Mode::Search(mut query) => {
                match key.code {
                    KeyCode::Esc => state.mode = Mode::Normal,
                    KeyCode::Enter => {
                        let query = query.trim().to_string();
                        state.filter.search = (!query.is_empty()).then_some(query);
                        state.mode = Mode::Normal;
                        state.reload(db)?;
                    }
                    KeyCode::Backspace => {
                        query.pop();
                        state.mode = Mode::Search(query);
                    }
                    KeyCode::Char(c) => {
                        query.push(c);
                        state.mode = Mode::Search(query);
                    }
                    _ => {}
                }
                Ok(())
            }
            Mode::ConfirmDelete => {
                state.mode = Mode::Normal;
                match (key.code, state.current().map(|a| a.id.clone())) {
                    (KeyCode::Char('y') | KeyCode::Char('Y'), Some(id)) => db
                        .delete_application(&id)
                        .and_then(|_| {
                            state.message = Some(format!("Deleted {}", id));
                            state.reload(db)
                        }),
                    _ => {
                        state.message = Some("Delete cancelled".to_string());
                        Ok(())
                    }
                }
            }
            Mode::Normal => {
                state.message = None;
                let prev_selected = state.selected;
                let result = match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Down | KeyCode::Char('j') => {
                        state.next();
                        Ok(())
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        state.prev();
                        Ok(())
                    }
                    KeyCode::Char('J') | KeyCode::PageDown => {
                        state.scroll_down();
                        Ok(())
                    }
                    KeyCode::Char('K') | KeyCode::PageUp => {
                        state.scroll_up();
                        Ok(())
                    }
                    KeyCode::Char('/') => {
                        state.mode = Mode::Search(state.filter.search.clone().unwrap_or_default());
                        Ok(())
                    }
                    KeyCode::Char('f') => {
                        state.cycle_status_filter();
                        state.reload(db)
                    }
                    KeyCode::Char('d') => {
                        if state.current().is_some() {
                            state.mode = Mode::ConfirmDelete;
                        }
                        Ok(())
                    }
                    KeyCode::Char('o') => open_current(state, AttachmentKind::Resume),
                    KeyCode::Char('c') => open_current(state, AttachmentKind::CoverLetter),
                    KeyCode::Char(c @ '1'..='7') => {
                        let status = Status::ALL[(c as usize) - ('1' as usize)];
                        match state.current().map(|a| a.id.clone()) {
                            Some(id) => db.set_status(&id, status).and_then(|_| state.reload(db)),
                            None => Ok(()),
                        }
                    }
                    _ => Ok(()),
                };
                if result.is_ok() && state.selected != prev_selected {
                    state.load_details(db)?;
                }
                result
            }
        };

        // Failures are shown in the footer and leave the listing unchanged.
        if let Err(e) = outcome {
            state.message = Some(e.to_string());
        }
    }
    Ok(())
}

fn open_current(state: &mut AppState, kind: AttachmentKind) -> TrackerResult<()> {
    if let Some(app) = state.current() {
        attachments::open_attachment(app, kind)?;
        state.message = Some(format!("Opened {}", kind.label()));
    }
    Ok(())
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Applied => Color::Green,
        Status::PhoneScreen => Color::LightGreen,
        Status::Interview => Color::Yellow,
        Status::Offer => Color::Cyan,
        Status::Hired => Color::LightCyan,
        Status::Rejected => Color::Red,
        Status::Withdrawn => Color::DarkGray,
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    // Left panel: application list
    let items: Vec<ListItem> = state
        .apps
        .iter()
        .map(|app| {
            let company = if app.company_name.chars().count() > 20 {
                format!("{}...", app.company_name.chars().take(17).collect::<String>())
            } else {
                app.company_name.clone()
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<7} ", app.id),
                    Style::default().fg(status_color(app.status)),
                ),
                Span::raw(format!("{} | {}", company, app.position)),
            ]))
        })
        .collect();

    let filter_label = match state.filter.status {
        StatusFilter::All => "All".to_string(),
        StatusFilter::Only(status) => status.to_string(),
    };
    let search_label = state
        .filter
        .search
        .as_deref()
        .map(|q| format!(" \"{}\"", q))
        .unwrap_or_default();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Applications ({}) [{}]{} ",
            state.apps.len(),
            filter_label,
            search_label
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: application detail
    let detail = build_detail(state);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer: search input, notice, or help
    let footer = match (&state.mode, &state.message) {
        (Mode::Search(query), _) => Paragraph::new(format!(" search: {}_", query)),
        (Mode::ConfirmDelete, _) => Paragraph::new(" delete this application and its history? y/N")
            .style(Style::default().fg(Color::Red)),
        (Mode::Normal, Some(message)) => {
            Paragraph::new(format!(" {}", message)).style(Style::default().fg(Color::Yellow))
        }
        (Mode::Normal, None) => Paragraph::new(
            " j/k:navigate  J/K:scroll  /:search  f:filter  1-7:status  o:resume c:cover  d:delete  q:quit",
        )
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, rows[1]);
}

fn build_detail(state: &AppState) -> Text<'_> {
    let Some(app) = state.current() else {
        return Text::raw("No applications match");
    };

    let mut lines: Vec<Line> = Vec::new();
    let bold = Style::default().add_modifier(Modifier::BOLD);

    lines.push(Line::from(Span::styled(&app.position, bold)));
    lines.push(Line::from(format!("at {}", app.company_name)));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", app.status),
        Style::default().fg(status_color(app.status)),
    )));
    lines.push(Line::from(format!("ID: {}", app.id)));

    let optional = [
        ("Location", app.location.as_deref()),
        ("Source", app.source.as_deref()),
        ("Salary", app.salary_expectation.as_deref()),
        ("Resume", app.resume_file.as_deref()),
        ("Cover letter", app.cover_letter_file.as_deref()),
    ];
    if app.date_applied.is_some() {
        lines.push(Line::from(format!("Applied: {}", app.formatted_date(&state.date_format))));
    }
    for (label, value) in optional {
        if let Some(value) = value {
            lines.push(Line::from(format!("{}: {}", label, value)));
        }
    }
    lines.push(Line::from(""));

    if let Some(notes) = &app.notes {
        lines.push(Line::from(Span::styled("Notes", bold)));
        for line in textwrap::fill(notes, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
        lines.push(Line::from(""));
    }

    lines.push(Line::from(Span::styled("History", bold)));
    for change in &state.history {
        let from = change
            .old_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "created".to_string());
        lines.push(Line::from(format!(
            "  {}  {} -> {}",
            change.changed_at.format("%Y-%m-%d %H:%M"),
            from,
            change.new_status
        )));
    }

    if !state.contacts.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Contacts", bold)));
        for c in &state.contacts {
            let mut line = format!("  {}", c.name);
            if let Some(role) = &c.role {
                line.push_str(&format!(" ({})", role));
            }
            if let Some(email) = &c.email {
                line.push_str(&format!(" <{}>", email));
            }
            if let Some(phone) = &c.phone {
                line.push_str(&format!(" {}", phone));
            }
            lines.push(Line::from(line));
        }
    }

    if !state.reminders.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Reminders", bold)));
        for r in &state.reminders {
            let style = if r.done {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(
                format!("  {}  {}", r.remind_at.format("%Y-%m-%d %H:%M"), r.message),
                style,
            )));
        }
    }

    Text::from(lines)
}
