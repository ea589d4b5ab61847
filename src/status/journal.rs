// src/status/journal.rs

//! Append-only on-disk copy of a session's records.
//!
//! Two files per session under the journal directory:
//! `<session>.outcomes` and `<session>.errors`, one record per line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::debug;

use crate::errors::Result;
use crate::status::records::{ErrorRecord, OutcomeRecord};

/// Open journal files for one session.
#[derive(Debug)]
pub struct Journal {
    outcomes: File,
    errors: File,
}

/// Records read back from a journal.
#[derive(Debug, Default, Clone)]
pub struct JournalContents {
    pub outcomes: Vec<OutcomeRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl Journal {
    /// Create (or append to) the journal files for `session_id` in `dir`.
    pub fn create(dir: &Path, session_id: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating journal dir {}", dir.display()))?;

        let (outcomes_path, errors_path) = paths(dir, session_id);
        let outcomes = open_append(&outcomes_path)?;
        let errors = open_append(&errors_path)?;

        debug!(
            outcomes = %outcomes_path.display(),
            errors = %errors_path.display(),
            "session journal opened"
        );

        Ok(Self {
            outcomes,
            errors,
        })
    }

    pub fn append_outcome(&mut self, record: &OutcomeRecord) -> std::io::Result<()> {
        writeln!(self.outcomes, "{record}")?;
        self.outcomes.flush()
    }

    pub fn append_error(&mut self, record: &ErrorRecord) -> std::io::Result<()> {
        writeln!(self.errors, "{record}")?;
        self.errors.flush()
    }

    /// Read back the records of a finished (or crashed) session.
    pub fn load(dir: &Path, session_id: &str) -> Result<JournalContents> {
        let (outcomes_path, errors_path) = paths(dir, session_id);

        if !outcomes_path.exists() && !errors_path.exists() {
            return Err(anyhow!(
                "no journal for session '{session_id}' in {}",
                dir.display()
            )
            .into());
        }

        Ok(JournalContents {
            outcomes: read_lines(&outcomes_path)?,
            errors: read_lines(&errors_path)?,
        })
    }
}

fn paths(dir: &Path, session_id: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{session_id}.outcomes")),
        dir.join(format!("{session_id}.errors")),
    )
}

fn open_append(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening journal file {}", path.display()))?;
    Ok(file)
}

fn read_lines<T>(path: &Path) -> Result<Vec<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut records = Vec::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = line
            .parse::<T>()
            .with_context(|| format!("{}:{}", path.display(), idx + 1))?;
        records.push(record);
    }

    Ok(records)
}
