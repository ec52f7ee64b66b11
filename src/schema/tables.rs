//! Fixed-shape metadata tables created in every namespace

/// A metadata table whose columns are all unbounded text
#[derive(Debug)]
pub struct MetadataTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Human-readable labels for every column code of every loaded table
pub static VARIABLE_LABELS: MetadataTable = MetadataTable {
    name: "VariableLabels",
    columns: &["TableName", "ColumnID", "Label", "Concept", "PredicateType"],
};

/// Title and universe of every table in the catalog
pub static TABLE_LEGEND: MetadataTable = MetadataTable {
    name: "TableLegend",
    columns: &["TableName", "TableTitle", "TableUniverse"],
};

pub static METADATA_TABLES: &[&MetadataTable] = &[&VARIABLE_LABELS, &TABLE_LEGEND];
