use rusqlite::limits::Limit;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::schema_gen::{
    generate_create_table, generate_metadata_table, qualified, quote_ident,
};
use crate::config::{WarehouseConfig, WIDE_MAX_COLUMNS};
use crate::error::StoreError;
use crate::schema::{MetadataTable, TableDef, METADATA_TABLES};

/// Log target for every warehouse statement
pub const STORE_TARGET: &str = "store";

/// Namespaces attached at once; SQLite's default ceiling is ten
const MAX_ATTACHED: usize = 8;

/// How a delimited file is read by [`Warehouse::bulk_load`]
#[derive(Debug, Clone)]
pub struct BulkLoadOptions {
    pub delimiter: u8,
    /// Leading records to skip, e.g. 1 for a header row
    pub skip_rows: usize,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            skip_rows: 1,
        }
    }
}

/// The SQLite warehouse: a main database plus one attached file per namespace
pub struct Warehouse {
    conn: Connection,
    config: WarehouseConfig,
    /// Attached namespaces, least recently used first
    attached: VecDeque<String>,
}

impl Warehouse {
    /// Open (or create) the warehouse without touching existing data
    pub fn open(config: &WarehouseConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(config.namespace_dir())?;

        let conn = Connection::open(config.main_path())?;
        conn.busy_timeout(config.busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Normal tables are held to config.max_columns in create_table;
        // SQLite itself only enforces the wide-table ceiling.
        conn.set_limit(Limit::SQLITE_LIMIT_COLUMN, WIDE_MAX_COLUMNS as i32);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS main.namespaces (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )?;

        debug!(target: STORE_TARGET, "Opened warehouse at {:?}", config.main_path());

        Ok(Self {
            conn,
            config: config.clone(),
            attached: VecDeque::new(),
        })
    }

    /// Drop the whole warehouse and start from an empty one.
    ///
    /// Exclusive access is taken first so that a warehouse still in use by
    /// another process fails here instead of being deleted underneath it.
    pub fn reset(config: &WarehouseConfig) -> Result<Self, StoreError> {
        let main = config.main_path();

        if main.exists() {
            let conn = Connection::open(&main)?;
            conn.busy_timeout(config.busy_timeout)?;
            conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| {
                row.get::<_, String>(0)
            })?;
            conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;")
                .map_err(|e| StoreError::statement("BEGIN EXCLUSIVE", e))?;
            drop(conn);

            for suffix in ["", "-wal", "-shm"] {
                let path = main.with_file_name(format!("{}.sqlite{}", config.database, suffix));
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }

        let namespace_dir = config.namespace_dir();
        if namespace_dir.exists() {
            fs::remove_dir_all(&namespace_dir)?;
        }

        warn!(target: STORE_TARGET, "Dropped and recreated warehouse {}", config.database);
        Self::open(config)
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn namespace_exists(&self, namespace: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM main.namespaces WHERE name = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create the namespace if it does not exist yet
    pub fn ensure_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        if !self.namespace_exists(namespace)? {
            self.conn.execute(
                "INSERT OR IGNORE INTO main.namespaces (name) VALUES (?1)",
                params![namespace],
            )?;
            info!(target: STORE_TARGET, "Created namespace {}", namespace);
        }
        self.attach(namespace)
    }

    /// Create the label crosswalk and table legend if they are missing
    pub fn create_metadata_tables(&mut self, namespace: &str) -> Result<(), StoreError> {
        for table in METADATA_TABLES {
            self.execute(namespace, &generate_metadata_table(namespace, table))?;
        }
        Ok(())
    }

    pub fn table_exists(&mut self, namespace: &str, table: &str) -> Result<bool, StoreError> {
        self.attach(namespace)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote_ident(namespace)
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params![table], |row| row.get(0))
            .map_err(|e| StoreError::statement(&sql, e))?;
        Ok(count > 0)
    }

    /// Create a data table, holding normal tables to the configured limit
    pub fn create_table(&mut self, def: &TableDef) -> Result<(), StoreError> {
        if !def.is_wide() && def.column_count() > self.config.max_columns {
            let err = StoreError::ColumnLimit {
                table: qualified(&def.namespace, &def.name),
                count: def.column_count(),
                max: self.config.max_columns,
            };
            warn!(target: STORE_TARGET, "{}", err);
            return Err(err);
        }

        self.execute(&def.namespace, &generate_create_table(def))
    }

    /// Run one statement in auto-commit mode
    pub fn execute(&mut self, namespace: &str, sql: &str) -> Result<(), StoreError> {
        self.attach(namespace)?;
        debug!(target: STORE_TARGET, "{}", abbreviate(sql));

        self.conn.execute_batch(sql).map_err(|e| {
            warn!(target: STORE_TARGET, "{} failed: {}", abbreviate(sql), e);
            StoreError::statement(abbreviate(sql), e)
        })
    }

    /// Append rows to a table by column name
    pub fn append_rows(
        &mut self,
        namespace: &str,
        table: &str,
        columns: &[&str],
        rows: &[Vec<String>],
    ) -> Result<usize, StoreError> {
        self.attach(namespace)?;

        let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified(namespace, table),
            quoted.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(|e| StoreError::statement(&sql, e))?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e| StoreError::statement(&sql, e))?;
            }
        }
        tx.commit()?;

        debug!(target: STORE_TARGET, "Appended {} rows to {}", rows.len(), qualified(namespace, table));
        Ok(rows.len())
    }

    /// Replace the contents of a metadata table
    pub fn replace_rows(
        &mut self,
        namespace: &str,
        table: &MetadataTable,
        rows: &[Vec<String>],
    ) -> Result<usize, StoreError> {
        self.execute(
            namespace,
            &format!("DELETE FROM {}", qualified(namespace, table.name)),
        )?;
        self.append_rows(namespace, table.name, table.columns, rows)
    }

    /// Load a delimited file into an existing table.
    ///
    /// The whole file goes in under one immediate transaction, which holds
    /// the write lock for the duration. Empty fields load as NULL.
    pub fn bulk_load(
        &mut self,
        namespace: &str,
        table: &str,
        path: &Path,
        options: &BulkLoadOptions,
    ) -> Result<u64, StoreError> {
        self.attach(namespace)?;
        let shown = path.display().to_string();
        let bulk_err = |message: String| StoreError::BulkLoad {
            path: shown.clone(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .from_path(path)
            .map_err(|e| bulk_err(e.to_string()))?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut count: u64 = 0;
        {
            let mut sql: Option<String> = None;
            for record in reader.records().skip(options.skip_rows) {
                let record = record.map_err(|e| bulk_err(e.to_string()))?;
                let sql = sql.get_or_insert_with(|| {
                    let placeholders: Vec<&str> = record.iter().map(|_| "?").collect();
                    format!(
                        "INSERT INTO {} VALUES ({})",
                        qualified(namespace, table),
                        placeholders.join(", ")
                    )
                });

                let mut stmt = tx
                    .prepare_cached(sql)
                    .map_err(|e| StoreError::statement(sql.as_str(), e))?;
                let values = record.iter().map(|f| if f.is_empty() { None } else { Some(f) });
                stmt.execute(params_from_iter(values))
                    .map_err(|e| bulk_err(format!("record {}: {}", count + 1, e)))?;
                count += 1;
            }
        }
        tx.commit()?;

        info!(target: STORE_TARGET, "Bulk loaded {} rows into {}", count, qualified(namespace, table));
        Ok(count)
    }

    /// Fold the write-ahead log back into the main database
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    fn attach(&mut self, namespace: &str) -> Result<(), StoreError> {
        if let Some(pos) = self.attached.iter().position(|a| a == namespace) {
            if let Some(name) = self.attached.remove(pos) {
                self.attached.push_back(name);
            }
            return Ok(());
        }

        if self.attached.len() >= MAX_ATTACHED {
            if let Some(oldest) = self.attached.pop_front() {
                let sql = format!("DETACH DATABASE {}", quote_ident(&oldest));
                self.conn
                    .execute_batch(&sql)
                    .map_err(|e| StoreError::statement(&sql, e))?;
            }
        }

        let path = self.config.namespace_path(namespace);
        let sql = format!("ATTACH DATABASE ?1 AS {}", quote_ident(namespace));
        self.conn
            .execute(&sql, params![path.to_string_lossy().into_owned()])
            .map_err(|e| StoreError::statement(&sql, e))?;
        self.attached.push_back(namespace.to_string());

        // journal_mode is per file; checkpoint only reaches WAL files
        let sql = format!("PRAGMA {}.journal_mode = WAL", quote_ident(namespace));
        self.conn
            .query_row(&sql, [], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::statement(&sql, e))?;
        Ok(())
    }
}

/// Long generated statements are cut down for logs and errors
fn abbreviate(sql: &str) -> String {
    const MAX: usize = 240;
    if sql.len() <= MAX {
        return sql.to_string();
    }
    let mut end = MAX;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &sql[..end], sql.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType, TABLE_LEGEND};
    use crate::writer::schema_gen::to_wide;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> WarehouseConfig {
        let mut config = WarehouseConfig::new(dir.path());
        config.max_columns = 4;
        config
    }

    fn def(columns: usize) -> TableDef {
        TableDef {
            namespace: "2020_ZCTA".into(),
            name: "B01001".into(),
            columns: (0..columns)
                .map(|i| ColumnDef {
                    name: format!("B01001_{:03}E", i + 1),
                    column_type: ColumnType::Integer,
                    sparse: false,
                })
                .collect(),
            column_set: None,
        }
    }

    #[test]
    fn test_namespace_is_idempotent_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        {
            let mut warehouse = Warehouse::open(&config).unwrap();
            warehouse.ensure_namespace("2020_ZCTA").unwrap();
            warehouse.ensure_namespace("2020_ZCTA").unwrap();
            warehouse.create_metadata_tables("2020_ZCTA").unwrap();
            warehouse.create_metadata_tables("2020_ZCTA").unwrap();
        }

        let mut warehouse = Warehouse::open(&config).unwrap();
        assert!(warehouse.namespace_exists("2020_ZCTA").unwrap());
        assert!(warehouse.table_exists("2020_ZCTA", "VariableLabels").unwrap());
        assert!(warehouse.table_exists("2020_ZCTA", "TableLegend").unwrap());
        assert!(config.namespace_path("2020_ZCTA").exists());
    }

    #[test]
    fn test_reset_drops_everything() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        {
            let mut warehouse = Warehouse::open(&config).unwrap();
            warehouse.ensure_namespace("2020_STATE").unwrap();
        }

        let warehouse = Warehouse::reset(&config).unwrap();
        assert!(!warehouse.namespace_exists("2020_STATE").unwrap());
        assert!(!config.namespace_path("2020_STATE").exists());
    }

    #[test]
    fn test_column_limit_applies_to_normal_tables_only() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(&config(&dir)).unwrap();
        warehouse.ensure_namespace("2020_ZCTA").unwrap();

        let err = warehouse.create_table(&def(5)).unwrap_err();
        assert!(err.is_column_limit());
        assert!(!warehouse.table_exists("2020_ZCTA", "B01001").unwrap());

        warehouse.create_table(&to_wide(&def(5))).unwrap();
        assert!(warehouse.table_exists("2020_ZCTA", "B01001").unwrap());
    }

    #[test]
    fn test_bulk_load_skips_header_and_nulls_empty_fields() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(&config(&dir)).unwrap();
        warehouse.ensure_namespace("2020_ZCTA").unwrap();
        warehouse.create_table(&def(2)).unwrap();

        let file = dir.path().join("load.txt");
        fs::write(&file, "B01001_001E,B01001_002E\n100,\n7,8\n").unwrap();

        let count = warehouse
            .bulk_load("2020_ZCTA", "B01001", &file, &BulkLoadOptions::default())
            .unwrap();
        assert_eq!(count, 2);

        let nulls: i64 = warehouse
            .conn
            .query_row(
                "SELECT COUNT(*) FROM \"2020_ZCTA\".\"B01001\" WHERE \"B01001_002E\" IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn test_namespace_files_use_wal_and_checkpoint_truncates() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let mut warehouse = Warehouse::open(&config).unwrap();
        warehouse.ensure_namespace("2020_ZCTA").unwrap();
        warehouse.create_table(&def(2)).unwrap();

        let mode: String = warehouse
            .conn
            .query_row("PRAGMA \"2020_ZCTA\".journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        let rows = vec![vec!["1".to_string(), "2".to_string()]];
        warehouse
            .append_rows("2020_ZCTA", "B01001", &["B01001_001E", "B01001_002E"], &rows)
            .unwrap();
        warehouse.checkpoint().unwrap();

        let wal = config.namespace_path("2020_ZCTA").with_extension("sqlite-wal");
        assert_eq!(fs::metadata(&wal).unwrap().len(), 0);
    }

    #[test]
    fn test_replace_rows_overwrites_legend() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(&config(&dir)).unwrap();
        warehouse.ensure_namespace("2020_ZCTA").unwrap();
        warehouse.create_metadata_tables("2020_ZCTA").unwrap();

        let rows = vec![vec!["B01001".to_string(), "Sex By Age".into(), "Total population".into()]];
        warehouse.replace_rows("2020_ZCTA", &TABLE_LEGEND, &rows).unwrap();
        warehouse.replace_rows("2020_ZCTA", &TABLE_LEGEND, &rows).unwrap();

        let count: i64 = warehouse
            .conn
            .query_row("SELECT COUNT(*) FROM \"2020_ZCTA\".\"TableLegend\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_least_recently_used_namespace_is_detached() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(&config(&dir)).unwrap();
        for year in 2000..2000 + MAX_ATTACHED as i32 + 3 {
            let ns = format!("{}_STATE", year);
            warehouse.ensure_namespace(&ns).unwrap();
            warehouse.create_metadata_tables(&ns).unwrap();
        }
        assert_eq!(warehouse.attached.len(), MAX_ATTACHED);
        assert!(warehouse.table_exists("2000_STATE", "TableLegend").unwrap());
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("SELECT 1"), "SELECT 1");
        let long = "x".repeat(500);
        assert!(abbreviate(&long).ends_with("(500 bytes)"));
    }
}
