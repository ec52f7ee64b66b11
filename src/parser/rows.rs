use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::HashSet;

use crate::schema::{ColumnSpec, NormalizedRowSet};

/// Token the API prefixes to every ZIP code tabulation area name
pub const GEO_PREFIX: &str = "ZCTA5 ";

/// Reshape an API array-of-arrays (header first) into a normalized row-set.
///
/// Column names lose all whitespace and only the first of any duplicated
/// name is kept. Cell values lose the ZCTA prefix and nulls become empty
/// strings. A row whose width differs from the header is rejected.
pub fn normalize(raw: &[Vec<Value>]) -> Result<NormalizedRowSet> {
    let Some((header, data)) = raw.split_first() else {
        bail!("payload has no header row");
    };

    let mut seen = HashSet::new();
    let mut keep = Vec::new();
    let mut columns = Vec::new();

    for (idx, value) in header.iter().enumerate() {
        let name: String = cell_text(value)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if seen.insert(name.clone()) {
            keep.push(idx);
            columns.push(ColumnSpec::new(name));
        }
    }

    let mut rows = Vec::with_capacity(data.len());
    for (line, row) in data.iter().enumerate() {
        if row.len() != header.len() {
            bail!(
                "row {} has {} cells but the header has {}",
                line + 1,
                row.len(),
                header.len()
            );
        }
        rows.push(
            keep.iter()
                .map(|&idx| cell_text(&row[idx]).replace(GEO_PREFIX, ""))
                .collect(),
        );
    }

    Ok(NormalizedRowSet { columns, rows })
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use serde_json::json;

    fn raw(value: Value) -> Vec<Vec<Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_normalize_zcta_payload() {
        let rows = normalize(&raw(json!([
            ["NAME", "B01001_001E", "B01001_001EA", "zip code tabulation area"],
            ["ZCTA5 90210", "100", null, "90210"]
        ])))
        .unwrap();

        let names: Vec<_> = rows.column_names().collect();
        assert_eq!(names, vec!["NAME", "B01001_001E", "B01001_001EA", "zipcodetabulationarea"]);
        assert_eq!(rows.columns[1].column_type, ColumnType::Integer);
        assert_eq!(rows.columns[2].column_type, ColumnType::Text);
        assert_eq!(rows.rows, vec![vec!["90210", "100", "", "90210"]]);
    }

    #[test]
    fn test_duplicate_columns_keep_first_and_realign() {
        let rows = normalize(&raw(json!([
            ["NAME", "GEO_ID", "B1_001E", "GEO_ID"],
            ["a", "first", "1", "second"],
            ["b", "third", "2", "fourth"]
        ])))
        .unwrap();

        assert_eq!(rows.column_names().collect::<Vec<_>>(), vec!["NAME", "GEO_ID", "B1_001E"]);
        assert_eq!(rows.rows[0], vec!["a", "first", "1"]);
        assert_eq!(rows.rows[1], vec!["b", "third", "2"]);
    }

    #[test]
    fn test_whitespace_only_difference_counts_as_duplicate() {
        let rows = normalize(&raw(json!([["county", "coun ty"], ["1", "2"]]))).unwrap();
        assert_eq!(rows.columns.len(), 1);
        assert_eq!(rows.rows, vec![vec!["1"]]);
    }

    #[test]
    fn test_text_looking_estimates_still_integer() {
        let rows = normalize(&raw(json!([["B1_001E"], ["not a number"]]))).unwrap();
        assert_eq!(rows.columns[0].column_type, ColumnType::Integer);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let payload = raw(json!([["NAME", "B1_001M", "NAME"], ["ZCTA5 00601", "7", "x"]]));
        assert_eq!(normalize(&payload).unwrap(), normalize(&payload).unwrap());
    }

    #[test]
    fn test_ragged_rows_and_empty_payloads_fail() {
        assert!(normalize(&raw(json!([["NAME", "B1_001E"], ["x"]]))).is_err());
        assert!(normalize(&[]).is_err());
    }
}
