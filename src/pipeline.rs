//! The run driver: catalog, enumeration, provisioning, then one fetch and
//! load cycle per work unit.

use std::collections::HashSet;
use std::fs;
use tracing::{info, warn};

use crate::config::{RunConfig, WIDE_MAX_COLUMNS};
use crate::download::{fetch_catalog, redact_key, CensusClient, Transport, API_TARGET};
use crate::error::{Error, FetchError, Result, SkipReason};
use crate::filter::{enumerate_units, resolve_tables};
use crate::parser::{build_crosswalk, normalize, parse_labels};
use crate::report::RunSummary;
use crate::schema::{Catalog, LabelRecord, WorkUnit, TABLE_LEGEND, VARIABLE_LABELS};
use crate::ui::{Phase, Ui};
use crate::writer::{load_rowset, synthesize, write_intermediate, LoadOutcome, Warehouse, STORE_TARGET};

/// Reject configurations that cannot produce a useful run
pub fn validate(config: &RunConfig) -> Result<()> {
    if config.api.api_key.trim().is_empty() {
        return Err(Error::Configuration(
            "No Census API key given (use --apikey or CENSUS_API_KEY)".to_string(),
        ));
    }
    if config.geographies.is_empty() {
        return Err(Error::Configuration("No geographies selected".to_string()));
    }
    if config.warehouse.max_columns == 0 {
        return Err(Error::Configuration(
            "Maximum column count must be positive".to_string(),
        ));
    }
    if config.warehouse.max_columns > WIDE_MAX_COLUMNS {
        return Err(Error::Configuration(format!(
            "Maximum column count {} is above the store ceiling of {}; wider tables need the sparse layout",
            config.warehouse.max_columns, WIDE_MAX_COLUMNS
        )));
    }
    Ok(())
}

/// Run the whole pipeline and report what happened to each unit.
///
/// Only configuration, catalog and warehouse-open failures end the run
/// early. The catalog is read before the warehouse is reset, so an
/// unreachable catalog leaves existing data alone.
pub fn run<T: Transport, U: Ui>(config: &RunConfig, transport: &T, ui: &mut U) -> Result<RunSummary> {
    validate(config)?;
    fs::create_dir_all(&config.output_dir)?;
    let client = CensusClient::new(transport, &config.api);

    ui.set_phase(Phase::Catalog);
    ui.set_info(config.api.manifest_url.as_str());
    let catalog = fetch_catalog(&client)?;
    ui.log(format!("Catalog holds {} tables", catalog.len()));

    let tables = resolve_tables(&catalog, config.start_table.as_deref(), config.all_from_start)?;
    let units = enumerate_units(&config.years, &tables, &config.geographies);
    info!(
        "{} work units: years {}..{}, {} tables, {} geographies",
        units.len(),
        config.years.start,
        config.years.end,
        tables.len(),
        config.geographies.len()
    );

    ui.set_phase(Phase::Provisioning);
    let mut warehouse = if config.resume {
        ui.set_info("Resuming into existing warehouse");
        Warehouse::open(&config.warehouse)?
    } else {
        ui.set_info("Recreating warehouse");
        Warehouse::reset(&config.warehouse)?
    };
    provision(&mut warehouse, &units, &catalog, ui);

    ui.set_phase(Phase::Loading);
    let mut summary = RunSummary::new();
    let total = units.len() as u64;

    for (idx, unit) in units.iter().enumerate() {
        if ui.cancelled() {
            warn!("Run cancelled after {} of {} units", idx, units.len());
            ui.warn("Cancelled");
            break;
        }

        ui.set_info(unit.to_string());
        ui.set_progress(idx as u64, total, "Units");

        let result = process_unit(&client, &mut warehouse, unit, config);
        match &result {
            Ok(outcome) => {
                info!("{}: loaded {} rows ({:?})", unit, outcome.rows, outcome.path);
                ui.log(format!("{}: {} rows", unit, outcome.rows));
            }
            Err(reason) => {
                warn!("{}: skipped: {}", unit, reason);
                ui.warn(format!("{}: skipped ({})", unit, reason.origin()));
            }
        }
        summary.record(unit, &result);
        ui.set_counts(summary.loaded(), summary.skipped());

        if let Err(e) = warehouse.checkpoint() {
            warn!(target: STORE_TARGET, "Checkpoint after {} failed: {}", unit, e);
        }
    }

    ui.set_progress(total, total, "Units");
    info!("{}", summary);
    Ok(summary)
}

/// Create every namespace the units touch and refresh its table legend.
///
/// Failures are logged; the units of a broken namespace fail on their own.
fn provision<U: Ui>(warehouse: &mut Warehouse, units: &[WorkUnit], catalog: &Catalog, ui: &mut U) {
    let legend: Vec<Vec<String>> = catalog
        .iter()
        .map(|t| vec![t.table_id.clone(), t.title.clone(), t.universe.clone()])
        .collect();

    let mut seen = HashSet::new();
    for unit in units {
        let namespace = unit.namespace();
        if !seen.insert(namespace.clone()) {
            continue;
        }

        let provisioned = warehouse
            .ensure_namespace(&namespace)
            .and_then(|_| warehouse.create_metadata_tables(&namespace))
            .and_then(|_| warehouse.replace_rows(&namespace, &TABLE_LEGEND, &legend));

        match provisioned {
            Ok(_) => ui.log(format!("Namespace {} ready", namespace)),
            Err(e) => {
                warn!(target: STORE_TARGET, "Provisioning {} failed: {}", namespace, e);
                ui.warn(format!("Namespace {} not provisioned", namespace));
            }
        }
    }
}

/// Fetch, label and load one unit
pub fn process_unit<T: Transport>(
    client: &CensusClient<T>,
    warehouse: &mut Warehouse,
    unit: &WorkUnit,
    config: &RunConfig,
) -> std::result::Result<LoadOutcome, SkipReason> {
    let raw = client.fetch_data(unit)?;
    let rows = normalize(&raw).map_err(|e| FetchError::Malformed {
        url: redact_key(&client.data_url(unit)),
        message: e.to_string(),
    })?;

    let namespace = unit.namespace();
    load_labels(client, warehouse, unit, &namespace);

    let path = config.output_dir.join(format!("{}.txt", unit.file_stem()));
    write_intermediate(&rows, &path)?;

    let def = synthesize(&namespace, &unit.table.table_id, &rows);
    let outcome = load_rowset(warehouse, &def, &rows, &path)?;

    // A failed load keeps its file for inspection
    if config.cleanup {
        if let Err(e) = fs::remove_file(&path) {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }

    Ok(outcome)
}

/// Append the unit's label crosswalk. A failure here never blocks the data load.
fn load_labels<T: Transport>(
    client: &CensusClient<T>,
    warehouse: &mut Warehouse,
    unit: &WorkUnit,
    namespace: &str,
) {
    let body = match client.fetch_labels(unit) {
        Ok(body) => body,
        Err(e) => {
            warn!(target: API_TARGET, "Labels for {} unavailable: {}", unit, e);
            return;
        }
    };

    let raw = match parse_labels(&body, client.config().label_format) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(target: API_TARGET, "Labels for {} unreadable: {}", unit, e);
            return;
        }
    };

    let rows: Vec<Vec<String>> = build_crosswalk(&unit.table.table_id, raw)
        .into_iter()
        .map(LabelRecord::into_row)
        .collect();

    if let Err(e) = warehouse.append_rows(namespace, VARIABLE_LABELS.name, VARIABLE_LABELS.columns, &rows) {
        warn!(target: STORE_TARGET, "Labels for {} not stored: {}", unit, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, WarehouseConfig};
    use crate::filter::parse_years;
    use crate::schema::Geography;

    fn config() -> RunConfig {
        RunConfig {
            years: parse_years("2020").unwrap(),
            start_table: None,
            all_from_start: true,
            geographies: vec![Geography::Zcta],
            api: ApiConfig::new("secret"),
            warehouse: WarehouseConfig::new("warehouse"),
            resume: false,
            cleanup: false,
            output_dir: "out".into(),
        }
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(validate(&config()).is_ok());
    }

    #[test]
    fn test_validate_requires_key_and_geographies() {
        let mut no_key = config();
        no_key.api.api_key = "  ".into();
        assert!(matches!(validate(&no_key), Err(Error::Configuration(_))));

        let mut no_geo = config();
        no_geo.geographies.clear();
        assert!(matches!(validate(&no_geo), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_bounds_max_columns() {
        let mut at_ceiling = config();
        at_ceiling.warehouse.max_columns = WIDE_MAX_COLUMNS;
        assert!(validate(&at_ceiling).is_ok());

        let mut above = config();
        above.warehouse.max_columns = WIDE_MAX_COLUMNS + 1;
        assert!(matches!(validate(&above), Err(Error::Configuration(_))));

        let mut zero = config();
        zero.warehouse.max_columns = 0;
        assert!(matches!(validate(&zero), Err(Error::Configuration(_))));
    }
}
