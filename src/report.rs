//! Session reports
//!
//! [`render`] turns a finished session into a [`Report`] without touching the
//! session, so rendering twice gives the same report.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::common::{exit, Result};
use crate::engine::{AbortReason, Session, SessionStatus, StepStatus};

/// Overall release decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ReleaseReady,
    NotReleaseReady,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReleaseReady => write!(f, "RELEASE READY"),
            Self::NotReleaseReady => write!(f, "NOT RELEASE READY"),
        }
    }
}

/// Status column of a report line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Passed,
    Failed,
    Skipped,
    Errored,
    NotRun,
}

impl From<StepStatus> for LineStatus {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::Passed => Self::Passed,
            StepStatus::Failed => Self::Failed,
            StepStatus::Skipped => Self::Skipped,
            StepStatus::Errored => Self::Errored,
        }
    }
}

impl LineStatus {
    fn label(&self) -> &'static str {
        match self {
            Self::Passed => "PASS",
            Self::Failed => "FAIL",
            Self::Skipped => "SKIP",
            Self::Errored => "ERROR",
            Self::NotRun => "NOT RUN",
        }
    }
}

/// One checklist step in the report, in registry order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    pub id: String,
    pub title: String,
    pub status: LineStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub checklist: String,
    pub status: SessionStatus,
    pub verdict: Verdict,
    /// Failed and errored step ids, in registry order
    pub failing: Vec<String>,
    pub lines: Vec<ReportLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: i32,
}

/// Build the report for a session
pub fn render(session: &Session) -> Report {
    let lines: Vec<ReportLine> = session
        .plan()
        .iter()
        .map(|planned| match session.result(&planned.id) {
            Some(result) => ReportLine {
                id: planned.id.clone(),
                title: planned.title.clone(),
                status: result.status.into(),
                attempts: result.attempts,
                note: result.operator_note.clone(),
                evidence: result.evidence.clone(),
            },
            None => ReportLine {
                id: planned.id.clone(),
                title: planned.title.clone(),
                status: LineStatus::NotRun,
                attempts: 0,
                note: None,
                evidence: None,
            },
        })
        .collect();

    let failing: Vec<String> = session
        .results()
        .iter()
        .filter(|r| r.status.blocks_release())
        .map(|r| r.step_id.clone())
        .collect();

    let status = session.status();
    let verdict = if status == SessionStatus::Completed && failing.is_empty() {
        Verdict::ReleaseReady
    } else {
        Verdict::NotReleaseReady
    };

    let exit_code = match status {
        SessionStatus::Completed if failing.is_empty() => exit::RELEASE_READY,
        SessionStatus::Completed => exit::COMPLETED_WITH_FAILURES,
        SessionStatus::Aborted => exit::ABORTED,
        SessionStatus::NotStarted if session.connection_error().is_some() => {
            exit::CONNECTION_ERROR
        }
        SessionStatus::NotStarted | SessionStatus::InProgress => exit::INTERNAL_ERROR,
    };

    Report {
        checklist: session.checklist().to_string(),
        status,
        verdict,
        failing,
        lines,
        abort_reason: session.abort_reason().cloned(),
        connection_error: session.connection_error().map(str::to_string),
        started_at: session.started_at(),
        finished_at: session.finished_at(),
        exit_code,
    }
}

impl Report {
    pub fn is_release_ready(&self) -> bool {
        self.verdict == Verdict::ReleaseReady
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain text rendering, used for `--report` files
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Checklist: {}", self.checklist);
        let _ = writeln!(out, "Session: {}", self.status);
        let _ = writeln!(out, "Verdict: {}", self.verdict);
        if !self.failing.is_empty() {
            let _ = writeln!(out, "Failing: {}", self.failing.join(", "));
        }
        if let Some(reason) = &self.abort_reason {
            let _ = writeln!(out, "Aborted: {}", reason);
        }
        if let Some(error) = &self.connection_error {
            let _ = writeln!(out, "Connection: {}", error);
        }
        let _ = writeln!(out);
        for line in &self.lines {
            let _ = write!(
                out,
                "[{:<7}] {} ({}) attempts={}",
                line.status.label(),
                line.id,
                line.title,
                line.attempts
            );
            if let Some(note) = &line.note {
                let _ = write!(out, " note=\"{}\"", note);
            }
            let _ = writeln!(out);
        }
        out
    }

    /// Coloured rendering on stdout
    pub fn print_console(&self) {
        println!("\n{} {}", "Report:".blue().bold(), self.checklist.white().bold());

        if !self.failing.is_empty() {
            println!(
                "  {} {}",
                "Failing:".red().bold(),
                self.failing.join(", ").red()
            );
        }
        if let Some(reason) = &self.abort_reason {
            println!("  {} {}", "Aborted:".yellow().bold(), reason);
        }
        if let Some(error) = &self.connection_error {
            println!("  {} {}", "Connection:".red().bold(), error);
        }

        println!();
        for line in &self.lines {
            let mark = match line.status {
                LineStatus::Passed => "✓".green(),
                LineStatus::Failed => "✗".red(),
                LineStatus::Errored => "!".red().bold(),
                LineStatus::Skipped => "-".yellow(),
                LineStatus::NotRun => "·".dimmed(),
            };
            print!("  {} {} {}", mark, line.id.bold(), line.title.dimmed());
            if line.attempts > 1 {
                print!(" {}", format!("({} attempts)", line.attempts).dimmed());
            }
            println!();
            if let Some(note) = &line.note {
                println!("      {}", note.italic());
            }
            if line.status == LineStatus::Errored {
                if let Some(evidence) = &line.evidence {
                    println!("      {}", evidence.dimmed());
                }
            }
        }

        let verdict = match self.verdict {
            Verdict::ReleaseReady => self.verdict.to_string().green().bold(),
            Verdict::NotReleaseReady => self.verdict.to_string().red().bold(),
        };
        println!("\n{} (session {})", verdict, self.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::{Registry, Step};
    use crate::common::Error;
    use crate::probe::ProbeSet;

    fn registry() -> Registry {
        Registry::new(
            "release",
            vec![
                Step::manual("a", "First", "ok"),
                Step::manual("b", "Second", "ok"),
            ],
            &ProbeSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_unstarted_session_lists_every_step_as_not_run() {
        let session = Session::new(&registry());
        let report = render(&session);

        assert_eq!(report.verdict, Verdict::NotReleaseReady);
        assert_eq!(report.exit_code, exit::INTERNAL_ERROR);
        assert!(report
            .lines
            .iter()
            .all(|l| l.status == LineStatus::NotRun));
    }

    #[test]
    fn test_connection_error_is_reported() {
        let mut session = Session::new(&registry());
        session.start_failed(&Error::Connection("refused".into()));

        let report = render(&session);
        assert_eq!(report.exit_code, exit::CONNECTION_ERROR);
        assert!(report.connection_error.as_deref().unwrap().contains("refused"));
        assert!(report.to_text().contains("Connection: Cannot connect to device: refused"));
    }

    #[test]
    fn test_json_uses_snake_case() {
        let report = render(&Session::new(&registry()));
        let json = report.to_json().unwrap();
        assert!(json.contains("\"not_release_ready\""));
        assert!(json.contains("\"not_run\""));
        assert!(json.contains("\"not_started\""));
    }
}
