use crate::schema::{ColumnDef, MetadataTable, NormalizedRowSet, TableDef};

/// Overflow column that groups every sparse column of a wide table
pub const COLUMN_SET_NAME: &str = "SpecialPurposeColumns";

/// Quote an identifier for SQLite, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a text value as a SQL literal; empty cells become NULL
pub fn quote_literal(value: &str) -> String {
    if value.is_empty() {
        "NULL".to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

pub fn qualified(namespace: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(namespace), quote_ident(table))
}

/// Build the table definition for a row-set, typing each column by name
pub fn synthesize(namespace: &str, table: &str, rows: &NormalizedRowSet) -> TableDef {
    TableDef {
        namespace: namespace.to_string(),
        name: table.to_string(),
        columns: rows
            .columns
            .iter()
            .map(|spec| ColumnDef {
                name: spec.name.clone(),
                column_type: spec.column_type,
                sparse: false,
            })
            .collect(),
        column_set: None,
    }
}

/// Reshape a definition into the wide-table layout: every column sparse,
/// plus the column set
pub fn to_wide(def: &TableDef) -> TableDef {
    TableDef {
        columns: def
            .columns
            .iter()
            .map(|c| ColumnDef {
                sparse: true,
                ..c.clone()
            })
            .collect(),
        column_set: Some(COLUMN_SET_NAME.to_string()),
        ..def.clone()
    }
}

/// Generate CREATE TABLE SQL for a table definition
pub fn generate_create_table(def: &TableDef) -> String {
    let mut sql = format!("CREATE TABLE {} (\n", qualified(&def.namespace, &def.name));
    let mut columns: Vec<String> = def
        .columns
        .iter()
        .map(|col| {
            // SQLite has no SPARSE storage; sparse columns are declared nullable
            let null = if col.sparse { " NULL" } else { "" };
            format!(
                "    {} {}{}",
                quote_ident(&col.name),
                col.column_type.sql_type(),
                null
            )
        })
        .collect();

    if let Some(set) = &def.column_set {
        columns.push(format!(
            "    {} TEXT GENERATED ALWAYS AS (NULL) VIRTUAL",
            quote_ident(set)
        ));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");
    sql
}

/// Generate the idempotent CREATE TABLE for a metadata table
pub fn generate_metadata_table(namespace: &str, table: &MetadataTable) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("    {} TEXT", quote_ident(c)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        qualified(namespace, table.name),
        columns.join(",\n")
    )
}

/// Generate a literal INSERT for one row
pub fn generate_insert(namespace: &str, table: &str, columns: &[&str], values: &[String]) -> String {
    let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let values: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        qualified(namespace, table),
        columns.join(", "),
        values.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType, VARIABLE_LABELS};

    fn rows() -> NormalizedRowSet {
        NormalizedRowSet {
            columns: vec![
                ColumnSpec::new("NAME"),
                ColumnSpec::new("B01001_001E"),
                ColumnSpec::new("B01001_001EA"),
                ColumnSpec::new("B01001_001M"),
            ],
            rows: vec![],
        }
    }

    #[test]
    fn test_synthesize_types_by_suffix() {
        let def = synthesize("2020_ZCTA", "B01001", &rows());
        let types: Vec<_> = def.columns.iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Text,
                ColumnType::Integer,
                ColumnType::Text,
                ColumnType::Integer
            ]
        );
        assert!(!def.is_wide());
        assert_eq!(def.column_count(), 4);
    }

    #[test]
    fn test_generate_create_table() {
        let sql = generate_create_table(&synthesize("2020_ZCTA", "B01001", &rows()));
        assert!(sql.starts_with("CREATE TABLE \"2020_ZCTA\".\"B01001\" ("));
        assert!(sql.contains("\"NAME\" TEXT,"));
        assert!(sql.contains("\"B01001_001E\" INTEGER,"));
        assert!(sql.contains("\"B01001_001EA\" TEXT,"));
        assert!(!sql.contains("GENERATED"));
    }

    #[test]
    fn test_wide_layout() {
        let wide = to_wide(&synthesize("2020_ZCTA", "B01001", &rows()));
        assert!(wide.is_wide());
        assert!(wide.columns.iter().all(|c| c.sparse));
        assert_eq!(wide.column_count(), 5);

        let sql = generate_create_table(&wide);
        assert!(sql.contains("\"B01001_001E\" INTEGER NULL"));
        assert!(sql.contains("\"SpecialPurposeColumns\" TEXT GENERATED ALWAYS AS (NULL) VIRTUAL"));
    }

    #[test]
    fn test_generate_insert_escapes_quotes() {
        let sql = generate_insert(
            "2020_COUNTY",
            "B01001",
            &["NAME", "B01001_001E", "B01001_002E"],
            &["Prince George's County".into(), "100".into(), "".into()],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"2020_COUNTY\".\"B01001\" (\"NAME\", \"B01001_001E\", \"B01001_002E\") \
             VALUES ('Prince George''s County', '100', NULL);"
        );
    }

    #[test]
    fn test_metadata_table_is_idempotent_text() {
        let sql = generate_metadata_table("2020_ZCTA", &VARIABLE_LABELS);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"2020_ZCTA\".\"VariableLabels\""));
        assert_eq!(sql.matches(" TEXT").count(), 5);
    }
}
