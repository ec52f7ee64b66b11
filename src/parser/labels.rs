use anyhow::{bail, Context, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::LabelFormat;
use crate::schema::{ColumnType, LabelRecord};

/// Separator the API uses between label segments, e.g. `Estimate!!Total:`
const SEGMENT_SEPARATOR: &str = "!!";

/// One variable as described by the group metadata endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLabel {
    pub column_id: String,
    pub label: String,
    pub concept: String,
    pub predicate_type: String,
}

pub fn parse_labels(body: &str, format: LabelFormat) -> Result<Vec<RawLabel>> {
    match format {
        LabelFormat::Html => parse_label_html(body),
        LabelFormat::Json => parse_label_json(body),
    }
}

/// Parse the first table of the HTML variables page.
///
/// The page closes the table with a summary row that is not a variable;
/// the last row is always dropped.
pub fn parse_label_html(html: &str) -> Result<Vec<RawLabel>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let table = document
        .select(&table_sel)
        .next()
        .context("Label page has no table")?;

    let mut rows = table
        .select(&row_sel)
        .map(|tr| tr.select(&cell_sel).map(cell_text).collect::<Vec<_>>());

    let header = rows.next().context("Label table is empty")?;
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("Label table has no '{}' column", name))
    };
    let name_col = column("Name")?;
    let label_col = column("Label")?;
    let concept_col = column("Concept")?;
    let predicate_col = column("Predicate Type")?;

    let mut labels: Vec<RawLabel> = rows
        .map(|cells| {
            let get = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
            RawLabel {
                column_id: get(name_col),
                label: get(label_col),
                concept: get(concept_col),
                predicate_type: get(predicate_col),
            }
        })
        .collect();
    labels.pop();

    Ok(labels)
}

fn selector(css: &str) -> Result<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Ok(sel),
        Err(e) => bail!("Invalid selector {}: {:?}", css, e),
    }
}

fn cell_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[derive(Debug, Deserialize)]
struct GroupDocument {
    variables: BTreeMap<String, VariableDocument>,
}

#[derive(Debug, Deserialize)]
struct VariableDocument {
    #[serde(default)]
    label: String,
    #[serde(default)]
    concept: String,
    #[serde(rename = "predicateType", default)]
    predicate_type: String,
}

/// Parse the JSON `variables` document
pub fn parse_label_json(json: &str) -> Result<Vec<RawLabel>> {
    let doc: GroupDocument = serde_json::from_str(json).context("Failed to parse label JSON")?;
    Ok(doc
        .variables
        .into_iter()
        .map(|(column_id, var)| RawLabel {
            column_id,
            label: var.label,
            concept: var.concept,
            predicate_type: var.predicate_type,
        })
        .collect())
}

/// Turn raw variable metadata into crosswalk rows for `table_id`.
///
/// Labels are title-cased and compacted the same way data column labels
/// are, and predicate types are mapped onto warehouse type names.
pub fn build_crosswalk(table_id: &str, raw: Vec<RawLabel>) -> Vec<LabelRecord> {
    raw.into_iter()
        .map(|r| {
            let predicate = join_segments(&r.predicate_type);
            let predicate_type = ColumnType::from_predicate(&predicate)
                .map(|t| t.sql_type().to_string())
                .unwrap_or(predicate);

            LabelRecord {
                table_name: join_segments(table_id),
                column_id: join_segments(&r.column_id),
                label: title_case(&join_segments(&r.label)).replace(' ', ""),
                concept: join_segments(&r.concept),
                predicate_type,
            }
        })
        .collect()
}

fn join_segments(s: &str) -> String {
    s.replace(SEGMENT_SEPARATOR, " ")
}

/// Capitalize the first letter of every run of letters, lowercase the rest
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;

    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<html><body>
        <table>
          <thead><tr><th>Name</th><th>Label</th><th>Concept</th><th>Required</th>
                     <th>Attributes</th><th>Limit</th><th>Predicate Type</th><th>Group</th></tr></thead>
          <tbody>
            <tr><td>B01001_001E</td><td>Estimate!!Total:</td><td>SEX BY AGE</td><td>not required</td>
                <td>B01001_001EA, B01001_001M</td><td>0</td><td>int</td><td>B01001</td></tr>
            <tr><td>B01001_001EA</td><td>Annotation of Estimate!!Total:</td><td>SEX BY AGE</td><td>not required</td>
                <td></td><td>0</td><td>string</td><td>B01001</td></tr>
            <tr><td colspan="8">2 variables</td></tr>
          </tbody>
        </table></body></html>"#;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("ESTIMATE total: male"), "Estimate Total: Male");
        assert_eq!(title_case("5 to 9 years"), "5 To 9 Years");
        assert_eq!(title_case("margin of error's"), "Margin Of Error'S");
    }

    #[test]
    fn test_parse_html_drops_trailing_row() {
        let labels = parse_label_html(HTML).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].column_id, "B01001_001E");
        assert_eq!(labels[0].predicate_type, "int");
        assert_eq!(labels[1].label, "Annotation of Estimate!!Total:");
    }

    #[test]
    fn test_parse_html_without_table_fails() {
        assert!(parse_label_html("<html><p>rate limited</p></html>").is_err());
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"variables": {
            "B01001_002E": {"label": "Estimate!!Total:!!Male:", "concept": "SEX BY AGE", "predicateType": "int"},
            "B01001_001E": {"label": "Estimate!!Total:", "concept": "SEX BY AGE", "predicateType": "int"}
        }}"#;
        let labels = parse_label_json(json).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].column_id, "B01001_001E");
    }

    #[test]
    fn test_build_crosswalk() {
        let rows = build_crosswalk("B01001", parse_label_html(HTML).unwrap());
        assert_eq!(
            rows[0],
            LabelRecord {
                table_name: "B01001".into(),
                column_id: "B01001_001E".into(),
                label: "EstimateTotal:".into(),
                concept: "SEX BY AGE".into(),
                predicate_type: "INTEGER".into(),
            }
        );
        assert_eq!(rows[1].label, "AnnotationOfEstimateTotal:");
        assert_eq!(rows[1].predicate_type, "TEXT");
    }
}
