use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};
use crate::models::Application;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Resume,
    CoverLetter,
}

impl AttachmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            AttachmentKind::Resume => "resume",
            AttachmentKind::CoverLetter => "cover letter",
        }
    }

    pub fn path_of<'a>(&self, app: &'a Application) -> Option<&'a str> {
        match self {
            AttachmentKind::Resume => app.resume_file.as_deref(),
            AttachmentKind::CoverLetter => app.cover_letter_file.as_deref(),
        }
    }
}

/// Opens the attached file with the desktop's default application and waits
/// for the opener to hand it off. Attachments are referenced by path only, so
/// they may have moved.
pub fn open_attachment(app: &Application, kind: AttachmentKind) -> TrackerResult<()> {
    let path = kind.path_of(app).ok_or_else(|| {
        TrackerError::NotFound(format!("{} for {}", kind.label(), app.id))
    })?;
    let path = Path::new(path);
    if !path.exists() {
        return Err(TrackerError::NotFound(path.display().to_string()));
    }
    debug!(path = %path.display(), "opening attachment");
    launch(opener_command(path))
}

fn launch(mut cmd: Command) -> TrackerResult<()> {
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(std::io::Error::other(format!(
            "{} exited with {}",
            cmd.get_program().to_string_lossy(),
            status
        ))
        .into());
    }
    Ok(())
}

fn opener_command(path: &Path) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        cmd
    } else if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(path);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ApplicationDraft;

    #[test]
    fn missing_attachment_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let mut draft = ApplicationDraft::new("Acme", "Engineer");
        draft.resume_file = Some("/nonexistent/resume.pdf".to_string());
        let app = db.create_application(&draft).unwrap();

        assert!(matches!(
            open_attachment(&app, AttachmentKind::CoverLetter),
            Err(TrackerError::NotFound(msg)) if msg == "cover letter for AC001"
        ));
        assert!(matches!(
            open_attachment(&app, AttachmentKind::Resume),
            Err(TrackerError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn opener_is_waited_on_and_failure_reported() {
        assert!(launch(Command::new("true")).is_ok());
        assert!(matches!(launch(Command::new("false")), Err(TrackerError::Io(_))));
    }
}
