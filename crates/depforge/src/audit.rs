//! Audit event log (C11): append-only JSONL record of every detection,
//! registry, consent, backup, install, and validation decision.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use depforge_types::{AuditEvent, AuditEventKind, PipelineError, Result};

pub const AUDIT_LOG_FILE: &str = "depforge-audit.jsonl";

pub fn audit_log_path(project_root: &Path) -> PathBuf {
    project_root.join(AUDIT_LOG_FILE)
}

fn event(kind: AuditEventKind, package: Option<String>, detail: impl Into<String>) -> AuditEvent {
    AuditEvent {
        timestamp: Utc::now(),
        kind,
        package,
        detail: detail.into(),
    }
}

pub fn detected_pm(manager_name: &str) -> AuditEvent {
    event(AuditEventKind::DetectedPm, None, manager_name.to_string())
}

pub fn ambiguous_pm(candidates: &[&str]) -> AuditEvent {
    event(AuditEventKind::AmbiguousPm, None, candidates.join(", "))
}

pub fn registry_verdict(package: &str, verdict: impl Into<String>) -> AuditEvent {
    event(AuditEventKind::RegistryVerdict, Some(package.to_string()), verdict)
}

pub fn consent_decision(package: &str, detail: impl Into<String>) -> AuditEvent {
    event(AuditEventKind::ConsentDecision, Some(package.to_string()), detail)
}

pub fn backup_created(path: &Path) -> AuditEvent {
    event(AuditEventKind::BackupCreated, None, path.display().to_string())
}

pub fn backup_restored(path: &Path) -> AuditEvent {
    event(AuditEventKind::BackupRestored, None, path.display().to_string())
}

pub fn backup_cleaned(path: &Path) -> AuditEvent {
    event(AuditEventKind::BackupCleaned, None, path.display().to_string())
}

pub fn install_outcome(category: &str, detail: impl Into<String>) -> AuditEvent {
    event(AuditEventKind::InstallOutcome, None, format!("{category}: {}", detail.into()))
}

pub fn validation_result(file: &Path, missing_count: usize) -> AuditEvent {
    event(
        AuditEventKind::ValidationResult,
        None,
        format!("{}: {missing_count} missing", file.display()),
    )
}

/// In-memory accumulator for one pipeline run, flushed to disk once at the
/// end via [`AuditLog::write_to_file`]. Mirrors the append-only on-disk
/// format so a partial run's log is always valid JSONL.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    pub fn all_events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append every recorded event to `path` as one JSON object per line.
    /// Creates the file (and its parent directory) if missing; never
    /// truncates an existing log.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = std::io::BufWriter::new(file);

        for event in &self.events {
            let line = serde_json::to_string(event)
                .map_err(|e| PipelineError::Config(format!("failed to serialize audit event: {e}")))?;
            writeln!(writer, "{line}")?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Read every event previously appended to `path`. Returns an empty log
    /// if the file does not exist.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(&line)
                .map_err(|e| PipelineError::Config(format!("corrupt audit log line: {e}")))?;
            events.push(event);
        }

        Ok(Self { events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_log_is_empty() {
        let log = AuditLog::new();
        assert!(log.is_empty());
    }

    #[test]
    fn record_appends_in_order() {
        let mut log = AuditLog::new();
        log.record(detected_pm("npm"));
        log.record(ambiguous_pm(&["npm", "pnpm"]));
        assert_eq!(log.len(), 2);
        assert!(matches!(log.all_events()[0].kind, AuditEventKind::DetectedPm));
        assert!(matches!(log.all_events()[1].kind, AuditEventKind::AmbiguousPm));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempdir().expect("tempdir");
        let path = audit_log_path(dir.path());

        let mut log = AuditLog::new();
        log.record(detected_pm("npm"));
        log.record(registry_verdict("zod", "exists"));
        log.write_to_file(&path).expect("write");

        let loaded = AuditLog::read_from_file(&path).expect("read");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn write_to_file_appends_across_calls() {
        let dir = tempdir().expect("tempdir");
        let path = audit_log_path(dir.path());

        let mut first = AuditLog::new();
        first.record(detected_pm("npm"));
        first.write_to_file(&path).expect("write first");

        let mut second = AuditLog::new();
        second.record(backup_cleaned(Path::new("package.json.bak")));
        second.write_to_file(&path).expect("write second");

        let loaded = AuditLog::read_from_file(&path).expect("read");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn read_from_file_returns_empty_log_when_missing() {
        let dir = tempdir().expect("tempdir");
        let loaded = AuditLog::read_from_file(&dir.path().join("nonexistent.jsonl")).expect("read");
        assert!(loaded.is_empty());
    }

    #[test]
    fn each_line_is_independently_valid_json() {
        let dir = tempdir().expect("tempdir");
        let path = audit_log_path(dir.path());

        let mut log = AuditLog::new();
        log.record(detected_pm("npm"));
        log.record(install_outcome("production", "ok"));
        log.write_to_file(&path).expect("write");

        let content = fs::read_to_string(&path).expect("read raw");
        for line in content.lines() {
            let _: AuditEvent = serde_json::from_str(line).expect("each line parses alone");
        }
    }
}
