// src/status/records.rs

//! Outcome and error records, and their one-line journal encoding.
//!
//! ```text
//! outcome: status:source:dest:table?:duration:attempts:session_id
//! error:   stage:source:dest:table?:attempt:message:session_id
//! ```
//!
//! `table?` is empty for whole-database tasks and `duration` is seconds
//! with millisecond precision. Messages may contain `:`; newlines are
//! flattened to spaces on encode.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::task::TaskId;
use crate::types::{Stage, TaskStatus};

/// Terminal result of one task. Exactly one per task per session.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub task: TaskId,
    pub status: TaskStatus,
    /// Wall-clock time since the first attempt started.
    pub duration: Duration,
    pub attempts: u32,
    pub session_id: String,
}

/// One failed stage of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub task: TaskId,
    pub stage: Stage,
    pub attempt: u32,
    pub message: String,
    pub session_id: String,
}

impl ErrorRecord {
    /// Whether this error was recorded for `task`.
    pub fn belongs_to(&self, task: &TaskId) -> bool {
        &self.task == task
    }
}

/// Parse failure for a journal line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RecordParseError(pub String);

impl fmt::Display for OutcomeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{:.3}:{}:{}",
            self.status,
            self.task.source,
            self.task.dest,
            self.task.table_name().unwrap_or(""),
            self.duration.as_secs_f64(),
            self.attempts,
            self.session_id
        )
    }
}

impl FromStr for OutcomeRecord {
    type Err = RecordParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim_end().split(':').collect();
        let [status, source, dest, table, duration, attempts, session_id] = fields.as_slice()
        else {
            return Err(RecordParseError(format!(
                "outcome line needs 7 fields, got {}: {line:?}",
                fields.len()
            )));
        };

        let status = status.parse::<TaskStatus>().map_err(RecordParseError)?;
        let secs: f64 = duration
            .parse()
            .map_err(|e| RecordParseError(format!("invalid duration '{duration}': {e}")))?;
        let duration = Duration::try_from_secs_f64(secs)
            .map_err(|e| RecordParseError(format!("invalid duration '{duration}': {e}")))?;
        let attempts = attempts
            .parse()
            .map_err(|e| RecordParseError(format!("invalid attempts '{attempts}': {e}")))?;

        Ok(OutcomeRecord {
            task: TaskId {
                source: source.to_string(),
                dest: dest.to_string(),
                table: optional(table),
            },
            status,
            duration,
            attempts,
            session_id: session_id.to_string(),
        })
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}",
            self.stage,
            self.task.source,
            self.task.dest,
            self.task.table_name().unwrap_or(""),
            self.attempt,
            flatten(&self.message),
            self.session_id
        )
    }
}

impl FromStr for ErrorRecord {
    type Err = RecordParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end();
        let (rest, session_id) = line
            .rsplit_once(':')
            .ok_or_else(|| RecordParseError(format!("error line missing session id: {line:?}")))?;

        let fields: Vec<&str> = rest.splitn(6, ':').collect();
        let [stage, source, dest, table, attempt, message] = fields.as_slice() else {
            return Err(RecordParseError(format!("error line needs 7 fields: {line:?}")));
        };

        Ok(ErrorRecord {
            task: TaskId {
                source: source.to_string(),
                dest: dest.to_string(),
                table: optional(table),
            },
            stage: stage.parse().map_err(RecordParseError)?,
            attempt: attempt
                .parse()
                .map_err(|e| RecordParseError(format!("invalid attempt '{attempt}': {e}")))?,
            message: message.to_string(),
            session_id: session_id.to_string(),
        })
    }
}

fn optional(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

fn flatten(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_line_matches_documented_layout() {
        let rec = OutcomeRecord {
            task: TaskId::table("shop", "local_shop", "orders"),
            status: TaskStatus::Succeeded,
            duration: Duration::from_millis(12_345),
            attempts: 2,
            session_id: "20260101-120000-42".into(),
        };
        let line = rec.to_string();
        assert_eq!(line, "Succeeded:shop:local_shop:orders:12.345:2:20260101-120000-42");
        assert_eq!(line.parse::<OutcomeRecord>().unwrap(), rec);
    }

    #[test]
    fn whole_database_outcome_has_empty_table_field() {
        let line = "Failed:crm:crm:::0.500:3:s1";
        let err = line.parse::<OutcomeRecord>();
        // Eight fields: the empty table plus a stray ':' is malformed.
        assert!(err.is_err());

        let rec: OutcomeRecord = "Failed:crm:crm::0.500:3:s1".parse().unwrap();
        assert_eq!(rec.task.table, None);
        assert_eq!(rec.status, TaskStatus::Failed);
    }

    #[test]
    fn error_message_may_contain_colons_and_newlines() {
        let rec = ErrorRecord {
            task: TaskId::database("shop", "shop_copy"),
            stage: Stage::Load,
            attempt: 1,
            message: "ERROR 1045: access denied\n  for user 'root'".into(),
            session_id: "s1".into(),
        };
        let line = rec.to_string();
        assert_eq!(
            line,
            "Load:shop:shop_copy::1:ERROR 1045: access denied for user 'root':s1"
        );

        let parsed: ErrorRecord = line.parse().unwrap();
        assert_eq!(parsed.message, "ERROR 1045: access denied for user 'root'");
        assert_eq!(parsed.stage, Stage::Load);
        assert!(parsed.belongs_to(&TaskId::database("shop", "shop_copy")));
        assert!(!parsed.belongs_to(&TaskId::database("shop", "shop_other")));
    }

    #[test]
    fn errors_for_the_same_table_are_told_apart_by_destination() {
        let rec: ErrorRecord = "Verify:shop:a:orders:2:0 rows:s1".parse().unwrap();
        assert_eq!(rec.task, TaskId::table("shop", "a", "orders"));
        assert!(!rec.belongs_to(&TaskId::table("shop", "b", "orders")));
    }

    #[test]
    fn garbage_lines_are_rejected() {
        assert!("nope".parse::<ErrorRecord>().is_err());
        assert!("Dump:shop:shop::1:msg:s1".parse::<ErrorRecord>().is_err());
        assert!("Load:shop::1:s1".parse::<ErrorRecord>().is_err());
        assert!("Maybe:a:b::1.0:1:s".parse::<OutcomeRecord>().is_err());
    }
}
