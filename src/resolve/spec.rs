// src/resolve/spec.rs

//! Grammar for unit specifications.
//!
//! ```text
//! unit      := source | source ":" tableSpec | source ":" dest ":" tableSpec
//! tableSpec := "*" | name ("," name)* | ""
//! ```
//!
//! An empty `tableSpec` selects the whole database. When `dest` is absent it
//! is derived from `source` with the configured prefix.

use std::fmt;
use std::str::FromStr;

use crate::errors::MirrorError;

/// Which part of a source database a unit covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelection {
    WholeDatabase,
    /// Explicit, de-duplicated table names in the order given.
    Tables(Vec<String>),
    /// `*`: every table the backend reports for the source.
    Wildcard,
}

/// A parsed unit specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub source: String,
    pub dest: Option<String>,
    pub tables: TableSelection,
}

impl UnitSpec {
    /// Destination name, derived from `source` when none was given.
    pub fn destination(&self, dest_prefix: &str) -> String {
        match &self.dest {
            Some(dest) => dest.clone(),
            None => format!("{dest_prefix}{}", self.source),
        }
    }
}

impl fmt::Display for UnitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)?;
        if let Some(dest) = &self.dest {
            write!(f, ":{dest}")?;
        }
        match &self.tables {
            TableSelection::WholeDatabase if self.dest.is_some() => f.write_str(":"),
            TableSelection::WholeDatabase => Ok(()),
            TableSelection::Wildcard => f.write_str(":*"),
            TableSelection::Tables(tables) => write!(f, ":{}", tables.join(",")),
        }
    }
}

impl FromStr for UnitSpec {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = s.trim();
        let fields: Vec<&str> = unit.split(':').map(str::trim).collect();

        let (source, dest, table_spec) = match fields.as_slice() {
            [source] => (*source, None, ""),
            [source, table_spec] => (*source, None, *table_spec),
            [source, dest, table_spec] => (*source, Some(*dest), *table_spec),
            _ => {
                return Err(MirrorError::resolution(
                    unit,
                    format!("expected 1 to 3 ':'-separated fields, got {}", fields.len()),
                ));
            }
        };

        let source = validate_name(unit, "source", source)?;
        let dest = dest
            .map(|d| validate_name(unit, "destination", d))
            .transpose()?;
        let tables = parse_table_spec(unit, table_spec)?;

        Ok(UnitSpec {
            source,
            dest,
            tables,
        })
    }
}

fn parse_table_spec(unit: &str, spec: &str) -> Result<TableSelection, MirrorError> {
    match spec {
        "" => Ok(TableSelection::WholeDatabase),
        "*" => Ok(TableSelection::Wildcard),
        list => {
            let mut tables: Vec<String> = Vec::new();
            for raw in list.split(',') {
                let name = validate_name(unit, "table", raw.trim())?;
                if name == "*" {
                    return Err(MirrorError::resolution(
                        unit,
                        "'*' cannot be combined with table names",
                    ));
                }
                if !tables.contains(&name) {
                    tables.push(name);
                }
            }
            Ok(TableSelection::Tables(tables))
        }
    }
}

fn validate_name(unit: &str, what: &str, name: &str) -> Result<String, MirrorError> {
    if name.is_empty() {
        return Err(MirrorError::resolution(unit, format!("empty {what} name")));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(MirrorError::resolution(
            unit,
            format!("{what} name '{name}' contains whitespace"),
        ));
    }
    Ok(name.to_string())
}
