use super::geography::Geography;

/// Column data type in the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    /// Type a data column by its name alone.
    ///
    /// Census variable ids end in `E` for estimates and `M` for margins of
    /// error; annotation columns (`EA`, `MA`) and geography columns stay text.
    /// Cell contents are never consulted.
    pub fn infer(name: &str) -> Self {
        if name == GEO_NAME_COLUMN || name.contains("Annotation") {
            return ColumnType::Text;
        }
        if name.ends_with('E') || name.ends_with('M') {
            ColumnType::Integer
        } else {
            ColumnType::Text
        }
    }

    /// Map the label API's predicate type vocabulary
    pub fn from_predicate(predicate: &str) -> Option<Self> {
        match predicate {
            "int" => Some(ColumnType::Integer),
            "string" => Some(ColumnType::Text),
            _ => None,
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Name of the geographic label column requested alongside every group
pub const GEO_NAME_COLUMN: &str = "NAME";

/// A named, typed column of a normalized row-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let column_type = ColumnType::infer(&name);
        Self { name, column_type }
    }
}

/// A cleaned API response: unique column names, rectangular rows, no nulls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRowSet {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<String>>,
}

impl NormalizedRowSet {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Indices of columns holding at least one non-empty cell
    pub fn non_empty_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&idx| self.rows.iter().any(|row| !row[idx].is_empty()))
            .collect()
    }

    /// Keep only the given columns, in the given order
    pub fn project(&self, indices: &[usize]) -> NormalizedRowSet {
        NormalizedRowSet {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

/// One entry of the ACS table list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table_id: String,
    pub title: String,
    pub universe: String,
}

impl TableDescriptor {
    pub fn new(
        table_id: impl Into<String>,
        title: impl Into<String>,
        universe: impl Into<String>,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            title: title.into(),
            universe: universe.into(),
        }
    }
}

/// Ordered table list for one run. Built once, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    tables: Vec<TableDescriptor>,
}

impl Catalog {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self { tables }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    pub fn first(&self) -> Option<&TableDescriptor> {
        self.tables.first()
    }

    pub fn position(&self, table_id: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.table_id == table_id)
    }

    pub fn get(&self, table_id: &str) -> Option<&TableDescriptor> {
        self.position(table_id).map(|i| &self.tables[i])
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }
}

/// A row of the `VariableLabels` crosswalk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub table_name: String,
    pub column_id: String,
    pub label: String,
    pub concept: String,
    pub predicate_type: String,
}

impl LabelRecord {
    pub fn into_row(self) -> Vec<String> {
        vec![
            self.table_name,
            self.column_id,
            self.label,
            self.concept,
            self.predicate_type,
        ]
    }
}

/// One (year, geography, table) fetch and load cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub year: i32,
    pub geography: Geography,
    pub table: TableDescriptor,
}

impl WorkUnit {
    pub fn namespace(&self) -> String {
        self.geography.namespace(self.year)
    }

    /// File stem of the intermediate CSV for this unit
    pub fn file_stem(&self) -> String {
        format!(
            "ACS_5Y_Estimates_{}_{}_{}",
            self.year,
            self.geography.label(),
            self.table.table_id
        )
    }
}

impl std::fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.year,
            self.geography.label(),
            self.table.table_id
        )
    }
}

/// Column of a table definition handed to the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub sparse: bool,
}

/// Structured CREATE TABLE input, rendered by the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub namespace: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Overflow column grouping all sparse columns; present only on wide tables
    pub column_set: Option<String>,
}

impl TableDef {
    pub fn is_wide(&self) -> bool {
        self.column_set.is_some()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len() + usize::from(self.column_set.is_some())
    }
}
