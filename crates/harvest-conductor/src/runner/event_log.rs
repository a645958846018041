//! Append-only JSONL log of pipeline transitions, next to the checkpoint.

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use harvest_core::{now_rfc3339, JobStatus};

/// One line of `events.jsonl`, tagged by `type`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    JobStart {
        job_name: String,
        status: JobStatus,
        targets: usize,
    },
    StepStart {
        step: JobStatus,
    },
    StepPassed {
        step: JobStatus,
        duration_ms: u64,
    },
    StepSkipped {
        step: JobStatus,
        reason: String,
    },
    StepFailed {
        step: JobStatus,
        duration_ms: u64,
        error: String,
    },
    JobFinished {
        status: JobStatus,
        version: u32,
    },
}

/// An event as written: position in the log plus wall-clock time.
#[derive(Debug, Serialize)]
pub struct LoggedEvent {
    pub seq: u32,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

pub struct EventLogger {
    path: PathBuf,
    seq: u32,
}

impl EventLogger {
    /// Open the log at `path`. Sequence numbers continue after any lines a
    /// previous run left behind.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seq = fs::File::open(&path)
            .map(|f| BufReader::new(f).lines().count() as u32)
            .unwrap_or(0);
        Self { path, seq }
    }

    /// Record an event. Best-effort: write failures are logged, not raised.
    pub fn record(&mut self, event: Event) {
        let logged = LoggedEvent {
            seq: self.seq,
            ts: now_rfc3339(),
            event,
        };
        self.seq += 1;

        match serde_json::to_string(&logged) {
            Ok(line) => {
                if let Err(e) = append(&self.path, &line) {
                    tracing::warn!(path = %self.path.display(), error = %e, "event log write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "event serialization failed"),
        }
    }
}

fn append(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut out = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(out, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_events_are_tagged_snake_case() {
        let event = Event::StepPassed {
            step: JobStatus::ExtractSnapshots,
            duration_ms: 1200,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"step_passed""#));
        assert!(json.contains(r#""step":"extract_snapshots""#));
    }

    #[test]
    fn logged_event_flattens_the_payload() {
        let logged = LoggedEvent {
            seq: 5,
            ts: "2024-01-31T10:00:00Z".into(),
            event: Event::StepStart {
                step: JobStatus::IndexMetrics,
            },
        };
        let json = serde_json::to_string(&logged).unwrap();
        assert!(json.starts_with(r#"{"seq":5,"ts":"2024-01-31T10:00:00Z","type":"step_start""#));
    }

    #[test]
    fn sequence_continues_across_loggers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut log = EventLogger::new(&path);
        log.record(Event::StepStart {
            step: JobStatus::ValidateTargets,
        });
        log.record(Event::StepSkipped {
            step: JobStatus::ExtractEvents,
            reason: "events disabled".into(),
        });

        let mut again = EventLogger::new(&path);
        again.record(Event::JobFinished {
            status: JobStatus::Done,
            version: 14,
        });

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains(r#""seq":2"#));
        assert!(lines[1].contains(r#""type":"step_skipped""#));
    }
}
