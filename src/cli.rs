use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use std::path::PathBuf;

use crate::config::{
    ApiConfig, LabelFormat, RunConfig, WarehouseConfig, DEFAULT_DATABASE, DEFAULT_MANIFEST_URL,
    DEFAULT_MAX_COLUMNS,
};
use crate::error::{Error, Result};
use crate::filter::parse_years;
use crate::schema::{expand_geographies, Rollup};

#[derive(Parser, Debug)]
#[command(name = "acs-warehouse")]
#[command(version, about = "Load American Community Survey 5-year tables into SQLite")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch tables from the Census API and load them into the warehouse
    Load(LoadArgs),

    /// List the tables in the ACS table catalog
    ListTables {
        /// Page or workbook holding the table list
        #[arg(long, default_value = DEFAULT_MANIFEST_URL)]
        manifest_url: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// Year ("YYYY") or half-open range ("YYYY-YYYY") to load
    #[arg(short, long)]
    pub year: String,

    /// Table to load, or to start from; defaults to the first catalog table
    #[arg(short, long)]
    pub start: Option<String>,

    /// Load only the start table instead of every table from it onward
    #[arg(short, long)]
    pub alone: bool,

    /// Census API key
    #[arg(short = 'k', long, env = "CENSUS_API_KEY", hide_env_values = true)]
    pub apikey: String,

    /// Include the ZIP code tabulation area rollup
    #[arg(long)]
    pub zcta: bool,

    /// Include the state rollup
    #[arg(long)]
    pub state: bool,

    /// Include the county rollup
    #[arg(long)]
    pub county: bool,

    /// Include the block group rollup
    #[arg(long)]
    pub blockgroup: bool,

    /// Block group states by abbreviation (comma-separated); default all
    #[arg(long, value_delimiter = ',')]
    pub states: Vec<String>,

    /// Keep the existing warehouse and add to it
    #[arg(short, long)]
    pub resume: bool,

    /// Delete intermediate files once loaded
    #[arg(long)]
    pub cleanup: bool,

    /// Directory for intermediate files, logs and the run report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory holding the warehouse files; defaults to the output directory
    #[arg(long)]
    pub warehouse: Option<PathBuf>,

    /// Warehouse database name
    #[arg(long, default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Column limit for normal tables; wider tables use the sparse layout
    #[arg(long, default_value_t = DEFAULT_MAX_COLUMNS)]
    pub max_columns: usize,

    /// Format of the label metadata endpoint
    #[arg(long, value_enum, default_value_t = LabelFormat::Html)]
    pub labels: LabelFormat,

    /// Plain log output instead of the terminal UI
    #[arg(long)]
    pub no_tui: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

impl LoadArgs {
    /// Resolve the arguments into a run configuration.
    ///
    /// Year syntax, state abbreviations and the output directory are checked
    /// here, before anything touches the network or the warehouse.
    pub fn into_config(self) -> Result<RunConfig> {
        let years = parse_years(&self.year)?;

        let rollups: Vec<Rollup> = [
            (self.zcta, Rollup::Zcta),
            (self.state, Rollup::State),
            (self.county, Rollup::County),
            (self.blockgroup, Rollup::BlockGroup),
        ]
        .into_iter()
        .filter_map(|(selected, rollup)| selected.then_some(rollup))
        .collect();
        let geographies = expand_geographies(&rollups, &self.states)?;

        let output_dir = match self.output {
            Some(dir) => dir,
            None => default_output_dir()?,
        };

        let mut warehouse =
            WarehouseConfig::new(self.warehouse.unwrap_or_else(|| output_dir.clone()));
        warehouse.database = self.database;
        warehouse.max_columns = self.max_columns;

        let mut api = ApiConfig::new(self.apikey);
        api.label_format = self.labels;

        Ok(RunConfig {
            years,
            start_table: self.start,
            all_from_start: !self.alone,
            geographies,
            api,
            warehouse,
            resume: self.resume,
            cleanup: self.cleanup,
            output_dir,
        })
    }
}

/// Platform data directory, e.g. `~/.local/share/acs-warehouse`
pub fn default_output_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", "acs-warehouse")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| Error::Configuration("Could not determine a home directory".to_string()))
}
