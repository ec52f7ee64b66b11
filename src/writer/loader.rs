use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

use super::schema_gen::{generate_insert, to_wide};
use super::sqlite::{BulkLoadOptions, Warehouse, STORE_TARGET};
use crate::error::StoreError;
use crate::schema::{NormalizedRowSet, TableDef};

/// Literal INSERTs sent to the store per round trip on the wide path
const BATCH_SIZE: usize = 1000;

/// Which route a row-set took into the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    /// Normal table filled from the intermediate file
    Bulk,
    /// Sparse table filled row by row after the column limit was hit
    Wide,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub path: LoadPath,
    pub rows: usize,
    pub columns: usize,
}

/// Write a row-set as comma-separated text with one header row
pub fn write_intermediate(rows: &NormalizedRowSet, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(rows.column_names())?;
    for row in &rows.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Create the unit's table and load its rows.
///
/// `intermediate` must already hold the row-set as written by
/// [`write_intermediate`]. A table over the column limit is retried once in
/// the wide layout, keeping only the columns that carry a value in some row.
pub fn load_rowset(
    warehouse: &mut Warehouse,
    def: &TableDef,
    rows: &NormalizedRowSet,
    intermediate: &Path,
) -> Result<LoadOutcome, StoreError> {
    match warehouse.create_table(def) {
        Ok(()) => {
            let count =
                warehouse.bulk_load(&def.namespace, &def.name, intermediate, &BulkLoadOptions::default())?;
            Ok(LoadOutcome {
                path: LoadPath::Bulk,
                rows: count as usize,
                columns: def.columns.len(),
            })
        }
        Err(err) if err.is_column_limit() => {
            warn!(target: STORE_TARGET, "{}; retrying {} as a wide table", err, def.name);
            load_wide(warehouse, def, rows)
        }
        Err(err) => Err(err),
    }
}

fn load_wide(
    warehouse: &mut Warehouse,
    def: &TableDef,
    rows: &NormalizedRowSet,
) -> Result<LoadOutcome, StoreError> {
    warehouse.create_table(&to_wide(def))?;

    let kept = rows.project(&rows.non_empty_columns());
    let columns: Vec<&str> = kept.column_names().collect();

    if !columns.is_empty() {
        for chunk in kept.rows.chunks(BATCH_SIZE) {
            let batch: Vec<String> = chunk
                .iter()
                .map(|row| generate_insert(&def.namespace, &def.name, &columns, row))
                .collect();
            warehouse.execute(&def.namespace, &batch.join("\n"))?;
        }
    }

    info!(
        target: STORE_TARGET,
        "Loaded {} rows into wide table {} using {} of {} columns",
        kept.rows.len(),
        def.name,
        columns.len(),
        def.columns.len()
    );

    Ok(LoadOutcome {
        path: LoadPath::Wide,
        rows: if columns.is_empty() { 0 } else { kept.rows.len() },
        columns: columns.len(),
    })
}
