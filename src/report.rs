use serde::Serialize;
use std::fmt;
use std::io;
use std::path::Path;

use crate::error::SkipReason;
use crate::schema::WorkUnit;
use crate::writer::{LoadOutcome, LoadPath};

pub const RUN_REPORT: &str = "RunReport.csv";

/// What happened to one work unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Loaded(LoadOutcome),
    Skipped {
        /// `api` or `store`
        origin: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub year: i32,
    pub geography: String,
    pub table_id: String,
    pub status: UnitStatus,
}

impl UnitOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self.status, UnitStatus::Loaded(_))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReportRow<'a> {
    year: i32,
    geography: &'a str,
    table: &'a str,
    status: &'a str,
    rows: Option<usize>,
    columns: Option<usize>,
    origin: Option<&'a str>,
    detail: Option<&'a str>,
}

/// Per-unit results of a run, in enumeration order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<UnitOutcome>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, unit: &WorkUnit, result: &Result<LoadOutcome, SkipReason>) {
        let status = match result {
            Ok(outcome) => UnitStatus::Loaded(outcome.clone()),
            Err(reason) => UnitStatus::Skipped {
                origin: reason.origin(),
                reason: reason.to_string(),
            },
        };
        self.outcomes.push(UnitOutcome {
            year: unit.year,
            geography: unit.geography.label(),
            table_id: unit.table.table_id.clone(),
            status,
        });
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn loaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_loaded()).count()
    }

    pub fn skipped(&self) -> usize {
        self.total() - self.loaded()
    }

    pub fn skipped_units(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.is_loaded())
    }

    pub fn write_csv(&self, path: &Path) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for outcome in &self.outcomes {
            let row = match &outcome.status {
                UnitStatus::Loaded(loaded) => ReportRow {
                    year: outcome.year,
                    geography: &outcome.geography,
                    table: &outcome.table_id,
                    status: match loaded.path {
                        LoadPath::Bulk => "loaded",
                        LoadPath::Wide => "loaded-wide",
                    },
                    rows: Some(loaded.rows),
                    columns: Some(loaded.columns),
                    origin: None,
                    detail: None,
                },
                UnitStatus::Skipped { origin, reason } => ReportRow {
                    year: outcome.year,
                    geography: &outcome.geography,
                    table: &outcome.table_id,
                    status: "skipped",
                    rows: None,
                    columns: None,
                    origin: Some(*origin),
                    detail: Some(reason.as_str()),
                },
            };
            writer.serialize(row)?;
        }
        writer.flush()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loaded {} of {} units ({} skipped)",
            self.loaded(),
            self.total(),
            self.skipped()
        )
    }
}
