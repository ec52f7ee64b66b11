use scraper::{Html, Selector};
use tracing::info;
use url::Url;

use super::client::{CensusClient, Transport, API_TARGET};
use super::workbook::{is_workbook, read_first_sheet};
use crate::error::{Error, Result};
use crate::schema::{Catalog, TableDescriptor};

const ID_HEADER: &str = "TableID";
const TITLE_HEADER: &str = "TableTitle";
const UNIVERSE_HEADER: &str = "TableUniverse";

/// Fetch the ACS table list and keep the tables of the configured family.
///
/// The manifest URL may serve the workbook itself or an HTML page linking to
/// it. Any failure here is fatal to the run: without a catalog there is no
/// work to do.
pub fn fetch_catalog<T: Transport>(client: &CensusClient<T>) -> Result<Catalog> {
    let config = client.config();

    let manifest = client
        .get(&config.manifest_url, config.catalog_timeout)
        .map_err(unavailable)?;

    let workbook = if is_workbook(&manifest.body) {
        manifest.body
    } else {
        let link = find_link(&manifest.text(), &config.manifest_link_name, &config.manifest_url)
            .ok_or_else(|| {
                Error::CatalogUnavailable(format!(
                    "No link named '{}' in {}",
                    config.manifest_link_name, config.manifest_url
                ))
            })?;
        info!(target: API_TARGET, "Table list found at {}", link);
        client
            .get(&link, config.catalog_timeout)
            .map_err(unavailable)?
            .body
    };

    let rows = read_first_sheet(&workbook).map_err(unavailable)?;
    let catalog = parse_table_list(&rows, &config.table_prefix)?;
    info!(target: API_TARGET, "Catalog holds {} tables", catalog.len());
    Ok(catalog)
}

fn unavailable(e: impl std::fmt::Display) -> Error {
    Error::CatalogUnavailable(e.to_string())
}

/// Resolve the `href` of the element whose `name` attribute matches
fn find_link(html: &str, name: &str, base: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("[name][href]").ok()?;
    let href = document
        .select(&selector)
        .find(|el| el.value().attr("name") == Some(name))?
        .value()
        .attr("href")?;
    Url::parse(base).ok()?.join(href).ok().map(String::from)
}

/// Turn worksheet rows into a catalog of tables whose id starts with `prefix`
pub fn parse_table_list(rows: &[Vec<String>], prefix: &str) -> Result<Catalog> {
    let compact = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();

    let header_idx = rows
        .iter()
        .position(|row| row.iter().any(|cell| compact(cell.as_str()) == ID_HEADER))
        .ok_or_else(|| Error::CatalogUnavailable("Table list has no 'Table ID' column".into()))?;
    let header: Vec<String> = rows[header_idx].iter().map(|c| compact(c.as_str())).collect();

    let column = |name: &str| {
        header.iter().position(|h| h == name).ok_or_else(|| {
            Error::CatalogUnavailable(format!("Table list has no '{}' column", name))
        })
    };
    let id_col = column(ID_HEADER)?;
    let title_col = column(TITLE_HEADER)?;
    let universe_col = column(UNIVERSE_HEADER)?;

    let mut tables: Vec<TableDescriptor> = Vec::new();
    for row in &rows[header_idx + 1..] {
        let table_id = cell(row, id_col);
        if !table_id.starts_with(prefix) || tables.iter().any(|t| t.table_id == table_id) {
            continue;
        }
        tables.push(TableDescriptor::new(
            table_id,
            clean_legend_text(cell(row, title_col)),
            clean_legend_text(&cell(row, universe_col).replace("Universe: ", "")),
        ));
    }

    Ok(Catalog::new(tables))
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or("")
}

/// Legend text must survive a comma-separated round trip unquoted
fn clean_legend_text(s: &str) -> String {
    s.replace('"', "").replace(',', "-")
}
